//! Fetch match expressions and the notification payloads they produce.
//!
//! Matching and sorting are computed by the daemon; this peer only builds
//! the expression it announces and decodes the notifications that come
//! back.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Predicates applied to a path by the daemon.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathMatcher {
    /// Path contains this substring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
    /// Path starts with this prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_with: Option<String>,
    /// Path ends with this suffix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_with: Option<String>,
    /// Path equals this string exactly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<String>,
    /// Path differs from this string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals_not: Option<String>,
}

impl PathMatcher {
    /// Matcher for paths containing the given substring.
    #[must_use]
    pub fn contains(needle: impl Into<String>) -> Self {
        Self {
            contains: Some(needle.into()),
            ..Self::default()
        }
    }
}

/// Sort block requesting an ordered window over the matched paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortSpec {
    /// Order by path.
    #[serde(default, skip_serializing_if = "is_false")]
    pub by_path: bool,
    /// Deliver the window as a plain array.
    #[serde(default, skip_serializing_if = "is_false")]
    pub as_array: bool,
    /// First index of the window, inclusive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<u64>,
    /// Last index of the window, inclusive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<u64>,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

/// A complete fetch expression: path predicates plus an optional sort.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchExpr {
    /// Path predicates, absent to match every path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathMatcher>,
    /// Sort request; its presence switches the fetcher to batched
    /// notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortSpec>,
}

impl FetchExpr {
    /// Whether this expression requests sorted, batched notifications.
    #[must_use]
    pub fn is_sorted(&self) -> bool {
        self.sort.is_some()
    }
}

impl From<&str> for FetchExpr {
    /// A bare string fetches every path containing it.
    fn from(needle: &str) -> Self {
        Self {
            path: Some(PathMatcher::contains(needle)),
            sort: None,
        }
    }
}

impl From<String> for FetchExpr {
    fn from(needle: String) -> Self {
        Self {
            path: Some(PathMatcher::contains(needle)),
            sort: None,
        }
    }
}

/// Lifecycle event reported for a matching path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchEvent {
    /// The path appeared (or already existed when the fetch was set up).
    Add,
    /// The path's value changed.
    Change,
    /// The path was removed.
    Remove,
}

/// Per-path notification delivered to unsorted fetchers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchUpdate {
    /// Path the event concerns.
    pub path: String,
    /// What happened to the path.
    pub event: FetchEvent,
    /// Value after the event; null for removals and value-less methods.
    #[serde(default)]
    pub value: Value,
}

/// One row of a sorted window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortedEntry {
    /// Path occupying this index.
    pub path: String,
    /// Value at this index.
    #[serde(default)]
    pub value: Value,
    /// Position inside the daemon-maintained order.
    pub index: u64,
}

/// Batched notification delivered to sorted fetchers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortedUpdate {
    /// Rows whose index or value changed, in window order.
    pub changes: Vec<SortedEntry>,
    /// Total number of rows currently inside the window.
    pub n: u64,
}
