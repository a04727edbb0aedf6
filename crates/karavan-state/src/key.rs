//! Cache keys.
//!
//! Every grouped cache is addressed by a [`GroupedKey`]: a coarse group
//! (usually the project id or resource name) plus a fine-grained item id.
//! Flat caches (environments, commits) use plain `String` keys.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Composite `(group, item)` key. Equality and hashing are structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedKey {
    pub group_id: String,
    pub item_id: String,
}

impl GroupedKey {
    pub fn create(group_id: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            item_id: item_id.into(),
        }
    }
}

impl fmt::Display for GroupedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group_id, self.item_id)
    }
}

/// A key that can address an entry in either backend.
///
/// The encoding is the storage key in the embedded store and the wire key
/// sent to the remote cache, so it must be injective and must never change
/// between releases or entries written earlier become unreachable.
pub trait CacheKey: Clone + Send + Sync + fmt::Display + 'static {
    fn encode(&self) -> String;

    /// Message type of a JSON-encoded key on the remote server; `None` for
    /// keys sent as plain text.
    const TYPE_NAME: Option<&'static str> = None;
}

impl CacheKey for GroupedKey {
    const TYPE_NAME: Option<&'static str> = Some("karavan.GroupedKey");

    fn encode(&self) -> String {
        // serde_json orders object keys, so the encoding is stable.
        serde_json::json!({
            "groupId": self.group_id,
            "itemId": self.item_id,
        })
        .to_string()
    }
}

impl CacheKey for String {
    fn encode(&self) -> String {
        self.clone()
    }
}
