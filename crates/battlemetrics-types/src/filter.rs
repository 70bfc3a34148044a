//! Server-side activity filter configuration
//!
//! Filters are opaque to the client: they are forwarded to the server during
//! the handshake and never evaluated locally. A value may appear in both the
//! whitelist and the blacklist of the same list; the server decides which wins.

use serde::{Deserialize, Serialize};

/// Filter target used for the server activity log
pub const ACTIVITY_TARGET: &str = "ACTIVITY";

/// How tag and type lists are combined by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagTypeMode {
    /// An event must satisfy both the tag and the type lists
    And,
    /// An event must satisfy either list
    Or,
}

/// Whitelist / blacklist pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterList {
    /// Values to include
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub whitelist: Vec<String>,
    /// Values to exclude
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blacklist: Vec<String>,
}

impl FilterList {
    /// Check if neither list has entries
    pub fn is_empty(&self) -> bool {
        self.whitelist.is_empty() && self.blacklist.is_empty()
    }
}

/// Filter specification sent for one filter target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityFilter {
    /// Tag/type matching mode
    #[serde(
        rename = "tagTypeMode",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub tag_type_mode: Option<TagTypeMode>,
    /// Tag classification
    #[serde(default)]
    pub tags: FilterList,
    /// Event type classification
    #[serde(default)]
    pub types: FilterList,
}

impl ActivityFilter {
    /// Create an empty filter
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tag/type matching mode
    pub fn with_mode(mut self, mode: TagTypeMode) -> Self {
        self.tag_type_mode = Some(mode);
        self
    }

    /// Add event types to the whitelist
    pub fn whitelist_types(mut self, types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.types.whitelist.extend(types.into_iter().map(Into::into));
        self
    }

    /// Add event types to the blacklist
    pub fn blacklist_types(mut self, types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.types.blacklist.extend(types.into_iter().map(Into::into));
        self
    }

    /// Add tags to the whitelist
    pub fn whitelist_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags.whitelist.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Add tags to the blacklist
    pub fn blacklist_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags.blacklist.extend(tags.into_iter().map(Into::into));
        self
    }
}
