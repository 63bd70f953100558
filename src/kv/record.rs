//! Hash-map record persistence over Redis.
//!
//! Typed records mirror into one hash per record at key
//! `{namespace}:{kind}:{uid}`, with each field encoded per the rules in
//! [`super::codec`]. Saves overwrite the full hash; partial reads and
//! writes touch a single field. Change notification publishes the whole
//! record as JSON on the record class channel.
//!
//! All calls are single round-trips against the backend with no retries;
//! backend errors propagate unchanged.

use metrics::counter;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::authz::Document;
use crate::config::RedisConfig;
use crate::error::{CrudError, Result};

use super::codec::{decode_field, encode_field, FieldValue};

// ═══════════════════════════════════════════════════════════════════════════════
// Redis Record
// ═══════════════════════════════════════════════════════════════════════════════

/// A typed object mirrored into a backend hash-map.
///
/// Records must serialize to a JSON object; the serde projection defines
/// the hash fields. Deserialization tolerates missing fields through the
/// record's own serde defaults.
pub trait RedisRecord: Serialize + DeserializeOwned + Send + Sync {
    /// Record kind, the middle segment of the storage key.
    const KIND: &'static str;

    fn uid(&self) -> &str;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Record Store
// ═══════════════════════════════════════════════════════════════════════════════

/// Hash-map record store over a Redis connection.
pub struct RecordStore {
    client: redis::Client,
    namespace: String,
}

impl RecordStore {
    /// Connect and verify the backend is reachable.
    pub async fn connect(config: &RedisConfig, namespace: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())?;

        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        let namespace = namespace.into();
        info!(url = %config.url, namespace = %namespace, "record store connected");

        Ok(Self { client, namespace })
    }

    async fn get_conn(&self) -> Result<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Storage key for one record: `{namespace}:{kind}:{uid}`, with the
    /// namespace prefix omitted when empty.
    pub fn record_key<R: RedisRecord>(&self, uid: &str) -> String {
        if self.namespace.is_empty() {
            format!("{}:{}", R::KIND, uid)
        } else {
            format!("{}:{}:{}", self.namespace, R::KIND, uid)
        }
    }

    /// Channel for record change notifications: the key path minus uid.
    pub fn class_channel<R: RedisRecord>(&self) -> String {
        if self.namespace.is_empty() {
            R::KIND.to_string()
        } else {
            format!("{}:{}", self.namespace, R::KIND)
        }
    }

    fn encoded_fields<R: RedisRecord>(record: &R) -> Result<Vec<(String, String)>> {
        let document = record_document(record)?;
        Ok(document
            .into_iter()
            .map(|(field, value)| (field, encode_field(&value)))
            .collect())
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Whole-record operations
    // ───────────────────────────────────────────────────────────────────────────

    /// Fetch one record by uid, or `None` when no hash exists at its key.
    pub async fn get_by_key<R: RedisRecord>(&self, uid: &str) -> Result<Option<R>> {
        let mut conn = self.get_conn().await?;
        let key = self.record_key::<R>(uid);

        let raw: HashMap<String, Vec<u8>> = conn.hgetall(&key).await?;
        if raw.is_empty() {
            counter!("crudgate_kv_misses_total", "kind" => R::KIND).increment(1);
            return Ok(None);
        }

        let mut document = Document::new();
        for (field, bytes) in raw {
            document.insert(field, decode_field(&bytes)?.into_json());
        }

        counter!("crudgate_kv_hits_total", "kind" => R::KIND).increment(1);
        Ok(Some(serde_json::from_value(Value::Object(document))?))
    }

    /// Persist the full record, replacing any previous hash at its key.
    ///
    /// Delete and rewrite run as one transaction so stale fields from a
    /// previous save never survive.
    pub async fn save<R: RedisRecord>(&self, record: &R) -> Result<()> {
        let mut conn = self.get_conn().await?;
        let key = self.record_key::<R>(record.uid());
        let fields = Self::encoded_fields(record)?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.del(&key).ignore();
        pipe.hset_multiple(&key, &fields).ignore();
        let _: () = pipe.query_async(&mut conn).await?;

        debug!(key = %key, fields = fields.len(), "record saved");
        counter!("crudgate_kv_saves_total", "kind" => R::KIND).increment(1);
        Ok(())
    }

    /// Remove the record's hash.
    pub async fn delete<R: RedisRecord>(&self, record: &R) -> Result<()> {
        let mut conn = self.get_conn().await?;
        let key = self.record_key::<R>(record.uid());

        let _: () = conn.del(&key).await?;

        debug!(key = %key, "record deleted");
        counter!("crudgate_kv_deletes_total", "kind" => R::KIND).increment(1);
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Partial-field operations
    // ───────────────────────────────────────────────────────────────────────────

    /// Write a single field of the record without touching the rest of
    /// the hash. The field must exist on the record's serde projection.
    pub async fn save_field<R: RedisRecord>(&self, record: &R, field: &str) -> Result<()> {
        let document = record_document(record)?;
        let value = document.get(field).ok_or_else(|| {
            CrudError::Validation(format!("{} has no field named {field}", R::KIND))
        })?;

        let mut conn = self.get_conn().await?;
        let key = self.record_key::<R>(record.uid());
        let _: () = conn.hset(&key, field, encode_field(value)).await?;

        counter!("crudgate_kv_saves_total", "kind" => R::KIND).increment(1);
        Ok(())
    }

    /// Read a single field. Absent fields decode as [`FieldValue::None`].
    pub async fn get_field<R: RedisRecord>(&self, uid: &str, field: &str) -> Result<FieldValue> {
        let mut conn = self.get_conn().await?;
        let key = self.record_key::<R>(uid);

        let raw: Option<Vec<u8>> = conn.hget(&key, field).await?;
        match raw {
            Some(bytes) => decode_field(&bytes),
            None => Ok(FieldValue::None),
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Change notification
    // ───────────────────────────────────────────────────────────────────────────

    /// Publish the record as JSON on its class channel, optionally
    /// suffixed with an event key.
    pub async fn publish<R: RedisRecord>(&self, record: &R, event_key: Option<&str>) -> Result<()> {
        let channel = match event_key {
            Some(event) => format!("{}:{event}", self.class_channel::<R>()),
            None => self.class_channel::<R>(),
        };
        let payload = serde_json::to_string(record)?;

        let mut conn = self.get_conn().await?;
        let _: () = conn.publish(&channel, payload).await?;

        debug!(channel = %channel, "record published");
        counter!("crudgate_kv_publishes_total", "kind" => R::KIND).increment(1);
        Ok(())
    }
}

/// Project a record into its JSON document form.
fn record_document<R: RedisRecord>(record: &R) -> Result<Document> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        other => Err(CrudError::Validation(format!(
            "{} does not serialize to a document (got {other})",
            R::KIND
        ))),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
