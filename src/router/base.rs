//! The CRUD router base.
//!
//! Orchestrates authorization, pagination, and delegation to the
//! data-access collaborator for list/get/create/update/delete, plus the
//! self-scoped "mine" listing. Every operation is stateless per request;
//! suspension happens only at collaborator I/O boundaries.

use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::auth::User;
use crate::authz::{Document, Gate, Ownership};
use crate::config::ApiConfig;
use crate::error::{CrudError, Result};
use crate::scope::{Action, FilterMap, ListFilter, ResourcePath};

use super::store::{EntityData, EntityStore};

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// What a list operation does when the scope filter denies everything.
///
/// The two behaviors exist in the wild; which one applies is an explicit
/// choice, never an accident of which router variant was picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListDenyMode {
    /// Raise `Forbidden`. The default.
    #[default]
    Strict,
    /// Substitute an empty page. A deliberate usability exception for
    /// list endpoints only; item-level denials always raise.
    Lenient,
}

/// Per-router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Canonical resource path; stable for the router's lifetime.
    pub resource_path: ResourcePath,
    /// Ownership field and extraction strategy.
    pub ownership: Ownership,
    /// Whether owners implicitly see and act on their own entities.
    pub self_access: bool,
    /// The implicit action granted on owned entities.
    pub self_action: Action,
    /// List behavior on a scope-level deny.
    pub deny_mode: ListDenyMode,
    /// Hard ceiling for page sizes.
    pub max_page_size: u64,
    /// Page size when the caller does not supply one.
    pub default_page_size: u64,
    /// Auto-provision a singleton entity on an empty "mine" result.
    pub create_mine_if_missing: bool,
    /// Treat the resource as one-per-user: "mine" unwraps to a bare item.
    pub unique_per_user: bool,
}

impl RouterConfig {
    /// Configuration with standard defaults for a resource path.
    pub fn new(resource_path: ResourcePath, ownership: Ownership) -> Self {
        Self {
            resource_path,
            ownership,
            self_access: true,
            self_action: Action::Owner,
            deny_mode: ListDenyMode::Strict,
            max_page_size: 100,
            default_page_size: 10,
            create_mine_if_missing: false,
            unique_per_user: false,
        }
    }

    /// Derive the resource path from API config plus the entity kind.
    pub fn from_api<E: EntityData>(api: &ApiConfig, ownership: Ownership) -> Self {
        let mut cfg = Self::new(ResourcePath::from_config(api, E::KIND), ownership);
        cfg.max_page_size = api.page_max_limit;
        cfg.default_page_size = api.page_default_limit;
        cfg
    }

    pub fn with_deny_mode(mut self, mode: ListDenyMode) -> Self {
        self.deny_mode = mode;
        self
    }

    pub fn without_self_access(mut self) -> Self {
        self.self_access = false;
        self
    }

    pub fn with_self_action(mut self, action: Action) -> Self {
        self.self_action = action;
        self
    }

    pub fn with_auto_provision(mut self) -> Self {
        self.create_mine_if_missing = true;
        self
    }

    pub fn unique_per_user(mut self) -> Self {
        self.unique_per_user = true;
        self
    }

    fn gate(&self) -> Gate {
        let gate = Gate::new(self.resource_path.clone(), self.ownership)
            .with_self_action(self.self_action);
        if self.self_access {
            gate
        } else {
            gate.without_self_access()
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Pagination Envelope
// ═══════════════════════════════════════════════════════════════════════════════

/// List query parameters: `offset` (default 0) and `limit` (default 10,
/// server-clamped to the configured maximum).
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub offset: u64,
    pub limit: Option<u64>,
}

impl PageQuery {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self {
            offset,
            limit: Some(limit),
        }
    }
}

/// The paginated list envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

/// Result of a "mine" call: a page, or a bare item for one-per-user
/// resources.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MineResult<T> {
    Page(Page<T>),
    Item(T),
}

// ═══════════════════════════════════════════════════════════════════════════════
// CRUD Router
// ═══════════════════════════════════════════════════════════════════════════════

/// The reusable CRUD router base over a data-access collaborator.
pub struct CrudRouter<S: EntityStore> {
    store: S,
    config: RouterConfig,
    gate: Gate,
    list_projection: Option<fn(S::Entity) -> S::Entity>,
}

impl<S: EntityStore> CrudRouter<S> {
    pub fn new(store: S, config: RouterConfig) -> Self {
        let gate = config.gate();
        Self {
            store,
            config,
            gate,
            list_projection: None,
        }
    }

    /// Map list results through a list-facing projection (e.g. to trim
    /// detail-only fields) before returning them.
    pub fn with_list_projection(mut self, projection: fn(S::Entity) -> S::Entity) -> Self {
        self.list_projection = Some(projection);
        self
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    fn clamp_limit(&self, requested: Option<u64>) -> u64 {
        // A zero ceiling degrades to 1 rather than poisoning every list.
        let max = self.config.max_page_size.max(1);
        requested
            .unwrap_or(self.config.default_page_size)
            .clamp(1, max)
    }

    fn require_user<'a>(&self, user: Option<&'a User>) -> Result<&'a User> {
        user.ok_or_else(CrudError::unauthenticated)
    }

    /// Tenant-scoped fetch ignoring ownership, so a cross-tenant or
    /// missing id is a 404 while an ownership mismatch stays a 403.
    async fn fetch(&self, uid: &str, tenant_id: &str) -> Result<S::Entity> {
        self.store
            .get_item(uid, tenant_id, None)
            .await?
            .ok_or_else(|| CrudError::not_found(S::Entity::KIND, uid))
    }

    async fn list_page(
        &self,
        user: &User,
        query: PageQuery,
        filter: &ListFilter,
    ) -> Result<Page<S::Entity>> {
        let limit = self.clamp_limit(query.limit);
        let (items, total) = self
            .store
            .list_total_combined(query.offset, limit, &user.tenant_id, filter)
            .await?;

        let items = match self.list_projection {
            Some(project) => items.into_iter().map(project).collect(),
            None => items,
        };

        Ok(Page {
            items,
            total,
            offset: query.offset,
            limit,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// List entities visible to the caller.
    pub async fn list(&self, user: Option<&User>, query: PageQuery) -> Result<Page<S::Entity>> {
        let user = self.require_user(user)?;
        let filter = self.gate.list_filter(user, Action::Read);

        if filter.is_deny() {
            counter!("crudgate_list_denied_total").increment(1);
            match self.config.deny_mode {
                ListDenyMode::Strict => {
                    return Err(CrudError::forbidden(
                        self.config.resource_path.as_str(),
                        Action::Read.as_str(),
                    ));
                }
                ListDenyMode::Lenient => {
                    debug!(path = %self.config.resource_path, "lenient deny, empty page");
                    return Ok(Page {
                        items: Vec::new(),
                        total: 0,
                        offset: query.offset,
                        limit: self.clamp_limit(query.limit),
                    });
                }
            }
        }

        self.list_page(user, query, &filter).await
    }

    /// Retrieve one entity by id.
    pub async fn retrieve(&self, user: Option<&User>, uid: &str) -> Result<S::Entity> {
        let user = self.require_user(user)?;
        let item = self.fetch(uid, &user.tenant_id).await?;
        self.gate
            .authorize(Action::Read, Some(user), &item.document()?)?;
        Ok(item)
    }

    /// Create an entity from proposed data.
    ///
    /// The ownership field and tenant id are forcibly set from the
    /// authenticated user before authorization; client-supplied values are
    /// never trusted, and the gate evaluates the data that will actually
    /// persist.
    pub async fn create(&self, user: Option<&User>, mut data: Document) -> Result<S::Entity> {
        let user = self.require_user(user)?;

        data.insert(
            self.config.ownership.field().as_str().to_string(),
            json!(self.config.ownership.owner_id_for_create(user)),
        );
        data.insert("tenant_id".to_string(), json!(user.tenant_id));

        self.gate.authorize(Action::Create, Some(user), &data)?;
        self.store.create_item(data).await
    }

    /// Update an entity by id with a patch of explicitly-provided fields.
    ///
    /// Authorization runs against the existing item, not the patch.
    pub async fn update(
        &self,
        user: Option<&User>,
        uid: &str,
        patch: Document,
    ) -> Result<S::Entity> {
        let user = self.require_user(user)?;
        let item = self.fetch(uid, &user.tenant_id).await?;
        self.gate
            .authorize(Action::Update, Some(user), &item.document()?)?;
        self.store.update_item(item, patch).await
    }

    /// Delete an entity by id, returning its last known state.
    pub async fn delete(&self, user: Option<&User>, uid: &str) -> Result<S::Entity> {
        let user = self.require_user(user)?;
        let item = self.fetch(uid, &user.tenant_id).await?;
        self.gate
            .authorize(Action::Delete, Some(user), &item.document()?)?;
        self.store.delete_item(item).await
    }

    /// List the caller's own entities.
    ///
    /// Auto-provisions a singleton when configured and nothing exists;
    /// unwraps the page to a bare item for one-per-user resources.
    pub async fn mine(
        &self,
        user: Option<&User>,
        query: PageQuery,
    ) -> Result<MineResult<S::Entity>> {
        let user = self.require_user(user)?;
        let owner_id = self.config.ownership.owner_id_for(user);
        let owner_field = self.config.ownership.field().as_str();
        let filter = ListFilter::any_of(vec![FilterMap::from([(
            owner_field.to_string(),
            owner_id,
        )])]);

        let mut page = self.list_page(user, query, &filter).await?;

        if page.total == 0 && self.config.create_mine_if_missing {
            let mut data = Document::new();
            data.insert(
                owner_field.to_string(),
                json!(self.config.ownership.owner_id_for_create(user)),
            );
            data.insert("tenant_id".to_string(), json!(user.tenant_id));
            let created = self.store.create_item(data).await?;
            debug!(path = %self.config.resource_path, uid = created.uid(), "auto-provisioned");
            page.items = vec![created];
            page.total = 1;
        }

        if self.config.unique_per_user {
            return match page.items.into_iter().next() {
                Some(item) => Ok(MineResult::Item(item)),
                None => Err(CrudError::not_found(S::Entity::KIND, "mine")),
            };
        }

        Ok(MineResult::Page(page))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::memory::InMemoryStore;
    use crate::router::store::EntityData;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct File {
        uid: String,
        tenant_id: String,
        user_id: String,
        #[serde(default)]
        workspace_id: Option<String>,
        #[serde(default)]
        name: Option<String>,
    }

    impl EntityData for File {
        const KIND: &'static str = "file";

        fn uid(&self) -> &str {
            &self.uid
        }

        fn tenant_id(&self) -> &str {
            &self.tenant_id
        }
    }

    fn file(uid: &str, tenant: &str, owner: &str) -> File {
        File {
            uid: uid.to_string(),
            tenant_id: tenant.to_string(),
            user_id: owner.to_string(),
            workspace_id: None,
            name: None,
        }
    }

    fn router() -> CrudRouter<InMemoryStore<File>> {
        let config = RouterConfig::new(
            ResourcePath::new("media", "api", "files"),
            Ownership::tenant_owned(),
        );
        CrudRouter::new(InMemoryStore::new(), config)
    }

    fn router_with(config: RouterConfig) -> CrudRouter<InMemoryStore<File>> {
        CrudRouter::new(InMemoryStore::new(), config)
    }

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().expect("test doc must be an object").clone()
    }

    fn alice() -> User {
        User::new("alice", "t1")
    }

    #[tokio::test]
    async fn test_operations_require_a_user() {
        let r = router();
        assert!(matches!(
            r.list(None, PageQuery::default()).await,
            Err(CrudError::Unauthenticated)
        ));
        assert!(matches!(
            r.retrieve(None, "f1").await,
            Err(CrudError::Unauthenticated)
        ));
        assert!(matches!(
            r.create(None, Document::new()).await,
            Err(CrudError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn test_list_without_scopes_returns_only_owned() {
        let r = router();
        r.store.insert(file("f1", "t1", "alice"));
        r.store.insert(file("f2", "t1", "bob"));
        r.store.insert(file("f3", "t1", "alice"));

        let page = r.list(Some(&alice()), PageQuery::default()).await.unwrap();
        assert_eq!(page.total, 2);
        assert!(page.items.iter().all(|f| f.user_id == "alice"));
    }

    #[tokio::test]
    async fn test_list_strict_deny_raises() {
        let config = RouterConfig::new(
            ResourcePath::new("media", "api", "files"),
            Ownership::tenant_owned(),
        )
        .without_self_access();
        let r = router_with(config);
        r.store.insert(file("f1", "t1", "alice"));

        let err = r
            .list(Some(&alice()), PageQuery::default())
            .await
            .expect_err("must deny");
        assert!(matches!(err, CrudError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn test_list_lenient_deny_returns_empty_page() {
        let config = RouterConfig::new(
            ResourcePath::new("media", "api", "files"),
            Ownership::tenant_owned(),
        )
        .without_self_access()
        .with_deny_mode(ListDenyMode::Lenient);
        let r = router_with(config);
        r.store.insert(file("f1", "t1", "alice"));

        let page = r.list(Some(&alice()), PageQuery::default()).await.unwrap();
        assert_eq!(page.total, 0);
        assert!(page.items.is_empty());
        assert_eq!(page.limit, 10);
    }

    #[tokio::test]
    async fn test_list_scope_union_with_ownership() {
        let r = router();
        r.store.insert(File {
            workspace_id: Some("w1".to_string()),
            ..file("f1", "t1", "bob")
        });
        r.store.insert(file("f2", "t1", "alice"));
        r.store.insert(File {
            workspace_id: Some("w2".to_string()),
            ..file("f3", "t1", "carol")
        });

        let user = alice().with_scope_strings(&["media/api/files:read:workspace_id=w1"]);
        let page = r.list(Some(&user), PageQuery::default()).await.unwrap();
        // Scoped workspace w1 plus own file; w2 stays invisible.
        assert_eq!(page.total, 2);
        let uids: Vec<&str> = page.items.iter().map(|f| f.uid.as_str()).collect();
        assert_eq!(uids, vec!["f1", "f2"]);
    }

    #[tokio::test]
    async fn test_list_clamps_limit() {
        let r = router();
        for i in 0..5 {
            r.store.insert(file(&format!("f{i}"), "t1", "alice"));
        }

        let page = r
            .list(Some(&alice()), PageQuery::new(0, 10_000))
            .await
            .unwrap();
        assert_eq!(page.limit, 100);

        let page = r.list(Some(&alice()), PageQuery::new(0, 0)).await.unwrap();
        assert_eq!(page.limit, 1);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.total, 5);
    }

    #[tokio::test]
    async fn test_zero_max_page_size_clamps_to_one() {
        let mut config = RouterConfig::new(
            ResourcePath::new("media", "api", "files"),
            Ownership::tenant_owned(),
        );
        config.max_page_size = 0;
        let r = router_with(config);
        r.store.insert(file("f1", "t1", "alice"));
        r.store.insert(file("f2", "t1", "alice"));

        let page = r.list(Some(&alice()), PageQuery::default()).await.unwrap();
        assert_eq!(page.limit, 1);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn test_list_pagination_offset() {
        let r = router();
        for i in 0..5 {
            r.store.insert(file(&format!("f{i}"), "t1", "alice"));
        }

        let page = r.list(Some(&alice()), PageQuery::new(3, 10)).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.offset, 3);
        let uids: Vec<&str> = page.items.iter().map(|f| f.uid.as_str()).collect();
        assert_eq!(uids, vec!["f3", "f4"]);
    }

    #[tokio::test]
    async fn test_retrieve_cross_tenant_is_not_found() {
        let r = router();
        r.store.insert(file("f1", "t2", "alice"));

        // Tenant isolation happens at fetch, before authorization, so the
        // caller cannot distinguish "other tenant" from "does not exist".
        let err = r
            .retrieve(Some(&alice()), "f1")
            .await
            .expect_err("must not find");
        assert!(matches!(err, CrudError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_retrieve_unowned_without_scope_is_forbidden() {
        let r = router();
        r.store.insert(file("f1", "t1", "bob"));

        let err = r
            .retrieve(Some(&alice()), "f1")
            .await
            .expect_err("must deny");
        assert!(matches!(err, CrudError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn test_retrieve_owned() {
        let r = router();
        r.store.insert(file("f1", "t1", "alice"));

        let item = r.retrieve(Some(&alice()), "f1").await.unwrap();
        assert_eq!(item.uid, "f1");
    }

    #[tokio::test]
    async fn test_create_overrides_client_tenant_and_owner() {
        let r = router();
        let created = r
            .create(
                Some(&alice()),
                doc(json!({
                    "name": "report.pdf",
                    "tenant_id": "evil",
                    "user_id": "mallory"
                })),
            )
            .await
            .unwrap();

        assert_eq!(created.tenant_id, "t1");
        assert_eq!(created.user_id, "alice");
        assert_eq!(created.name.as_deref(), Some("report.pdf"));
    }

    #[tokio::test]
    async fn test_update_merges_only_provided_fields() {
        let r = router();
        r.store.insert(File {
            name: Some("old".to_string()),
            workspace_id: Some("w1".to_string()),
            ..file("f1", "t1", "alice")
        });

        let updated = r
            .update(Some(&alice()), "f1", doc(json!({"name": "new"})))
            .await
            .unwrap();
        assert_eq!(updated.name.as_deref(), Some("new"));
        assert_eq!(updated.workspace_id.as_deref(), Some("w1"));
    }

    #[tokio::test]
    async fn test_update_ownership_mismatch_leaves_entity_unchanged() {
        let r = router();
        r.store.insert(File {
            name: Some("old".to_string()),
            ..file("f1", "t1", "bob")
        });

        let err = r
            .update(Some(&alice()), "f1", doc(json!({"name": "new"})))
            .await
            .expect_err("must deny");
        assert!(matches!(err, CrudError::Forbidden { .. }));

        let bob = User::new("bob", "t1");
        let item = r.retrieve(Some(&bob), "f1").await.unwrap();
        assert_eq!(item.name.as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn test_delete_returns_last_state_and_removes() {
        let r = router();
        r.store.insert(file("f1", "t1", "alice"));

        let deleted = r.delete(Some(&alice()), "f1").await.unwrap();
        assert_eq!(deleted.uid, "f1");

        let err = r
            .retrieve(Some(&alice()), "f1")
            .await
            .expect_err("must be gone");
        assert!(matches!(err, CrudError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let r = router();
        let err = r
            .delete(Some(&alice()), "nope")
            .await
            .expect_err("must not find");
        assert!(matches!(err, CrudError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_scoped_user_can_update_unowned_matching_item() {
        let r = router();
        r.store.insert(File {
            workspace_id: Some("w1".to_string()),
            ..file("f1", "t1", "bob")
        });

        let user = alice().with_scope_strings(&["media/api/files:update:workspace_id=w1"]);
        let updated = r
            .update(Some(&user), "f1", doc(json!({"name": "renamed"})))
            .await
            .unwrap();
        assert_eq!(updated.name.as_deref(), Some("renamed"));
    }

    #[tokio::test]
    async fn test_mine_lists_only_owned() {
        let r = router();
        r.store.insert(file("f1", "t1", "alice"));
        r.store.insert(file("f2", "t1", "bob"));

        let result = r.mine(Some(&alice()), PageQuery::default()).await.unwrap();
        match result {
            MineResult::Page(page) => {
                assert_eq!(page.total, 1);
                assert_eq!(page.items[0].uid, "f1");
            }
            MineResult::Item(_) => panic!("expected a page"),
        }
    }

    #[tokio::test]
    async fn test_mine_auto_provisions_singleton() {
        let config = RouterConfig::new(
            ResourcePath::new("media", "api", "files"),
            Ownership::tenant_owned(),
        )
        .with_auto_provision();
        let r = router_with(config);

        let result = r.mine(Some(&alice()), PageQuery::default()).await.unwrap();
        match result {
            MineResult::Page(page) => {
                assert_eq!(page.total, 1);
                assert_eq!(page.items[0].user_id, "alice");
                assert_eq!(page.items[0].tenant_id, "t1");
            }
            MineResult::Item(_) => panic!("expected a page"),
        }
        assert_eq!(r.store.len(), 1);

        // A second call finds the provisioned item instead of creating more.
        let again = r.mine(Some(&alice()), PageQuery::default()).await.unwrap();
        match again {
            MineResult::Page(page) => assert_eq!(page.total, 1),
            MineResult::Item(_) => panic!("expected a page"),
        }
        assert_eq!(r.store.len(), 1);
    }

    #[tokio::test]
    async fn test_mine_unique_per_user_unwraps_item() {
        let config = RouterConfig::new(
            ResourcePath::new("media", "api", "files"),
            Ownership::tenant_owned(),
        )
        .with_auto_provision()
        .unique_per_user();
        let r = router_with(config);

        let result = r.mine(Some(&alice()), PageQuery::default()).await.unwrap();
        match result {
            MineResult::Item(item) => assert_eq!(item.user_id, "alice"),
            MineResult::Page(_) => panic!("expected a bare item"),
        }
    }

    #[tokio::test]
    async fn test_list_projection_applied() {
        let r = router().with_list_projection(|mut f| {
            f.name = None;
            f
        });
        r.store.insert(File {
            name: Some("secret".to_string()),
            ..file("f1", "t1", "alice")
        });

        let page = r.list(Some(&alice()), PageQuery::default()).await.unwrap();
        assert!(page.items[0].name.is_none());

        // Retrieve is unprojected.
        let item = r.retrieve(Some(&alice()), "f1").await.unwrap();
        assert_eq!(item.name.as_deref(), Some("secret"));
    }
}
