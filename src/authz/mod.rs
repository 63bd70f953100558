//! Item-level authorization: ownership strategies and the gate.
//!
//! The gate answers the question: "may this user perform this action on
//! this item (or proposed data)?" Ownership always wins first — a caller
//! whose ownership id matches the item's ownership field holds the self
//! action implicitly. Otherwise the caller's scopes are matched against
//! the resource path and action, with any filter expression validated
//! against the item itself.

use metrics::counter;
use serde_json::Map;
use tracing::{debug, warn};

use crate::auth::User;
use crate::error::{CrudError, Result};
use crate::scope::grant::{document_satisfies, value_matches};
use crate::scope::{list_filter, Action, FilterExpr, ListFilter, ResourcePath, SelfAccess};

/// A JSON document projection of an entity or proposed data.
pub type Document = Map<String, serde_json::Value>;

// ═══════════════════════════════════════════════════════════════════════════════
// Ownership
// ═══════════════════════════════════════════════════════════════════════════════

/// Which entity attribute holds the owner id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerField {
    /// `user_id` — tenant-owned resources.
    UserId,
    /// `owner_id` — workspace-owned resources.
    OwnerId,
}

impl OwnerField {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UserId => "user_id",
            Self::OwnerId => "owner_id",
        }
    }
}

/// The single configurable ownership extraction strategy.
///
/// Router variants differ only in the ownership field and how the
/// caller's ownership id is derived; both live here rather than in
/// divergent subclass-style logic. The create-time resolver may differ
/// from the authorization-time one (e.g. stamping `user_id` while
/// authorizing by canonical uid).
#[derive(Debug, Clone, Copy)]
pub struct Ownership {
    field: OwnerField,
    resolve: fn(&User) -> String,
    resolve_create: Option<fn(&User) -> String>,
}

impl Ownership {
    /// Tenant-owned variant: ownership by `user_id`, authorized by the
    /// canonical uid, created items stamped with the user id.
    pub fn tenant_owned() -> Self {
        Self {
            field: OwnerField::UserId,
            resolve: |u| u.uid.clone(),
            resolve_create: Some(|u| u.user_id.clone()),
        }
    }

    /// Workspace-owned variant: ownership by `owner_id`, derived from the
    /// workspace id with a user-id fallback.
    pub fn workspace_owned() -> Self {
        Self {
            field: OwnerField::OwnerId,
            resolve: |u| u.workspace_id.clone().unwrap_or_else(|| u.user_id.clone()),
            resolve_create: None,
        }
    }

    /// Custom strategy for hosts with other ownership semantics.
    pub fn custom(field: OwnerField, resolve: fn(&User) -> String) -> Self {
        Self {
            field,
            resolve,
            resolve_create: None,
        }
    }

    /// Override the create-time owner id derivation.
    pub fn with_create_resolver(mut self, resolve_create: fn(&User) -> String) -> Self {
        self.resolve_create = Some(resolve_create);
        self
    }

    /// The entity attribute used for ownership checks and filters.
    pub fn field(&self) -> OwnerField {
        self.field
    }

    /// The caller's ownership id for authorization and list filters.
    pub fn owner_id_for(&self, user: &User) -> String {
        (self.resolve)(user)
    }

    /// The owner id stamped onto newly created items.
    pub fn owner_id_for_create(&self, user: &User) -> String {
        match self.resolve_create {
            Some(resolve) => resolve(user),
            None => self.owner_id_for(user),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Gate
// ═══════════════════════════════════════════════════════════════════════════════

/// Item-level authorization gate for one resource path.
#[derive(Debug, Clone)]
pub struct Gate {
    resource_path: ResourcePath,
    ownership: Ownership,
    self_access: bool,
    self_action: Action,
}

impl Gate {
    pub fn new(resource_path: ResourcePath, ownership: Ownership) -> Self {
        Self {
            resource_path,
            ownership,
            self_access: true,
            self_action: Action::Owner,
        }
    }

    /// Disable implicit owner self-access.
    pub fn without_self_access(mut self) -> Self {
        self.self_access = false;
        self
    }

    /// Use a different self action (default `owner`).
    pub fn with_self_action(mut self, action: Action) -> Self {
        self.self_action = action;
        self
    }

    pub fn resource_path(&self) -> &ResourcePath {
        &self.resource_path
    }

    pub fn ownership(&self) -> &Ownership {
        &self.ownership
    }

    pub fn self_access(&self) -> bool {
        self.self_access
    }

    /// Decide allow/deny for a single item-level action.
    ///
    /// `document` is the fetched item for read/update/delete, or the
    /// proposed data for create. Denials carry the resource path and
    /// action.
    pub fn authorize(
        &self,
        action: Action,
        user: Option<&User>,
        document: &Document,
    ) -> Result<()> {
        let Some(user) = user else {
            return Err(CrudError::unauthenticated());
        };

        let owner_id = self.ownership.owner_id_for(user);
        if self.self_access
            && document
                .get(self.ownership.field.as_str())
                .is_some_and(|actual| value_matches(&owner_id, actual))
        {
            // Self-access always includes the self action.
            debug!(path = %self.resource_path, %action, "allowed by ownership");
            return Ok(());
        }

        for grant in user
            .scopes
            .iter()
            .filter(|g| g.covers(&self.resource_path, action))
        {
            let satisfied = match grant.filter() {
                FilterExpr::Unrestricted => true,
                FilterExpr::Fields(map) => document_satisfies(map, document),
            };
            if satisfied {
                debug!(path = %self.resource_path, %action, "allowed by scope");
                return Ok(());
            }
        }

        warn!(
            path = %self.resource_path,
            %action,
            uid = %user.uid,
            "authorization denied"
        );
        counter!("crudgate_authz_denied_total", "action" => action.as_str()).increment(1);
        Err(CrudError::forbidden(
            self.resource_path.as_str(),
            action.as_str(),
        ))
    }

    /// Non-raising variant of [`Gate::authorize`].
    pub fn check(&self, action: Action, user: Option<&User>, document: &Document) -> bool {
        self.authorize(action, user, document).is_ok()
    }

    /// Compute the list-level filter for this resource (see
    /// [`crate::scope::list_filter`]).
    pub fn list_filter(&self, user: &User, action: Action) -> ListFilter {
        let owner_id = self.ownership.owner_id_for(user);
        let self_access = self.self_access.then_some(SelfAccess {
            owner_field: self.ownership.field.as_str(),
            owner_id: &owner_id,
            self_action: self.self_action,
        });
        list_filter(&user.scopes, &self.resource_path, action, self_access)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gate() -> Gate {
        Gate::new(
            ResourcePath::new("media", "api", "files"),
            Ownership::tenant_owned(),
        )
    }

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().expect("test doc must be an object").clone()
    }

    fn user_with_scopes(scopes: &[&str]) -> User {
        User::new("u1", "t1").with_scope_strings(scopes)
    }

    #[test]
    fn test_absent_user_is_unauthenticated() {
        let err = gate()
            .authorize(Action::Read, None, &doc(json!({})))
            .expect_err("must deny");
        assert!(matches!(err, CrudError::Unauthenticated));
    }

    #[test]
    fn test_owner_allowed_without_scopes() {
        let user = User::new("u1", "t1");
        let item = doc(json!({"uid": "f1", "user_id": "u1"}));
        // The self action covers every item-level action on owned items.
        for action in [Action::Read, Action::Update, Action::Delete] {
            assert!(gate().authorize(action, Some(&user), &item).is_ok());
        }
    }

    #[test]
    fn test_owner_denied_when_self_access_disabled() {
        let user = User::new("u1", "t1");
        let item = doc(json!({"uid": "f1", "user_id": "u1"}));
        let err = gate()
            .without_self_access()
            .authorize(Action::Read, Some(&user), &item)
            .expect_err("must deny");
        assert!(matches!(err, CrudError::Forbidden { .. }));
    }

    #[test]
    fn test_scope_filter_validated_against_item() {
        let user = user_with_scopes(&["media/api/files:read:workspace_id=w1"]);

        let in_scope = doc(json!({"user_id": "other", "workspace_id": "w1"}));
        assert!(gate().authorize(Action::Read, Some(&user), &in_scope).is_ok());

        let out_of_scope = doc(json!({"user_id": "other", "workspace_id": "w2"}));
        let err = gate()
            .authorize(Action::Read, Some(&user), &out_of_scope)
            .expect_err("must deny");
        assert!(matches!(err, CrudError::Forbidden { .. }));
    }

    #[test]
    fn test_denial_names_path_and_action() {
        let user = User::new("u1", "t1");
        let err = gate()
            .authorize(Action::Delete, Some(&user), &doc(json!({"user_id": "other"})))
            .expect_err("must deny");
        match err {
            CrudError::Forbidden {
                resource_path,
                action,
            } => {
                assert_eq!(resource_path, "media/api/files");
                assert_eq!(action, "delete");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unrestricted_scope_allows_any_item() {
        let user = user_with_scopes(&["media/api/files:delete"]);
        let item = doc(json!({"user_id": "other", "workspace_id": "w9"}));
        assert!(gate().authorize(Action::Delete, Some(&user), &item).is_ok());
    }

    #[test]
    fn test_workspace_strategy_fallback() {
        let ownership = Ownership::workspace_owned();

        let with_ws = User::new("u1", "t1").with_workspace("w1");
        assert_eq!(ownership.owner_id_for(&with_ws), "w1");

        let without_ws = User::new("u1", "t1");
        assert_eq!(ownership.owner_id_for(&without_ws), "u1");
    }

    #[test]
    fn test_workspace_owned_gate_matches_owner_id_field() {
        let gate = Gate::new(
            ResourcePath::new("media", "api", "files"),
            Ownership::workspace_owned(),
        );
        let user = User::new("u1", "t1").with_workspace("w1");
        let item = doc(json!({"owner_id": "w1"}));
        assert!(gate.authorize(Action::Update, Some(&user), &item).is_ok());
    }

    #[test]
    fn test_create_resolver_differs_from_authorize_resolver() {
        let ownership = Ownership::tenant_owned();
        let user = User::new("canonical-1", "t1").with_user_id("legacy-7");
        assert_eq!(ownership.owner_id_for(&user), "canonical-1");
        assert_eq!(ownership.owner_id_for_create(&user), "legacy-7");
    }
}
