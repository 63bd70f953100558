//! Key-value record store.
//!
//! This module provides:
//! - **Field codec**: schema-free string encoding for hash-map fields
//! - **Record store**: typed hash-map persistence with partial-field
//!   access and change notification

pub mod codec;
pub mod record;

pub use codec::{decode_field, encode_field, FieldValue, NONE_MARKER};
pub use record::{RecordStore, RedisRecord};
