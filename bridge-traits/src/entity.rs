//! Entity Store Abstraction
//!
//! A small graph-shaped persistence contract: labelled nodes identified by a
//! single key attribute, carrying a JSON attribute map, connected by typed
//! edges.
//!
//! The store is the only place where concurrent writers meet, so every write
//! that must not race goes through [`EntityStore::merge_node`] with a
//! [`WriteGuard`]. The guard is evaluated atomically with the write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cmp::Ordering;

use crate::error::Result;

/// JSON attribute map stored on a node.
pub type Attributes = serde_json::Map<String, Value>;

/// Identity of a node: its label plus the attribute that keys it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub label: String,
    pub key_field: String,
    pub key: String,
}

impl NodeRef {
    pub fn new(
        label: impl Into<String>,
        key_field: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            key_field: key_field.into(),
            key: key.into(),
        }
    }
}

/// Condition on a single attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrPredicate {
    /// Attribute present and equal to `value`.
    Eq { field: String, value: Value },
    /// Attribute present and strictly less than `value`.
    Lt { field: String, value: Value },
}

impl AttrPredicate {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lt {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Self::Eq { field, .. } | Self::Lt { field, .. } => field,
        }
    }

    /// Evaluate against an attribute map. Missing or null attributes never match.
    pub fn matches(&self, attributes: &Attributes) -> bool {
        match self {
            Self::Eq { field, value } => attributes
                .get(field)
                .is_some_and(|actual| !actual.is_null() && actual == value),
            Self::Lt { field, value } => attributes
                .get(field)
                .and_then(|actual| compare_values(actual, value))
                .is_some_and(|ordering| ordering == Ordering::Less),
        }
    }
}

/// Orders two JSON scalars of the same kind; `None` when incomparable.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

/// Precondition for [`EntityStore::merge_node`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum WriteGuard {
    /// Create or update unconditionally.
    #[default]
    Always,
    /// Only create; an existing node is left untouched.
    IfAbsent,
    /// Create, or update an existing node matching at least one predicate.
    IfAbsentOrAny(Vec<AttrPredicate>),
}

/// What a guarded merge did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Created,
    Updated,
    /// The guard rejected the write.
    Skipped,
}

impl MergeOutcome {
    pub fn is_written(self) -> bool {
        !matches!(self, Self::Skipped)
    }
}

/// A node as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub node: NodeRef,
    pub attributes: Attributes,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NodeRecord {
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.attributes.get(field).and_then(Value::as_str)
    }

    /// Deserialize the attribute map into a typed record.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.attributes.clone()))?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub order: SortOrder,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }
}

/// A target node with the number of matching sources pointing at it.
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedCount {
    pub node: NodeRecord,
    pub count: u64,
}

/// Graph-shaped entity persistence.
///
/// Attribute writes use JSON merge-patch semantics: keys present in the
/// supplied map overwrite, a `null` value removes the key, absent keys are
/// preserved.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Create or update a node, subject to `guard`, atomically.
    async fn merge_node(
        &self,
        node: &NodeRef,
        attributes: Attributes,
        guard: WriteGuard,
    ) -> Result<MergeOutcome>;

    /// Point `from`'s `edge_type` edge at `to`.
    ///
    /// Edges are functional: a node has at most one outgoing edge of a given
    /// type, so merging again with a different target moves the edge.
    async fn merge_edge(&self, from: &NodeRef, edge_type: &str, to: &NodeRef) -> Result<()>;

    async fn find_node(&self, node: &NodeRef) -> Result<Option<NodeRecord>>;

    /// Nodes with `label` matching every predicate in `filter`.
    async fn list_nodes(
        &self,
        label: &str,
        filter: &[AttrPredicate],
        order_by: Option<&OrderBy>,
        limit: Option<usize>,
    ) -> Result<Vec<NodeRecord>>;

    /// For every `target_label` node, count incoming `edge_type` edges from
    /// sources matching every predicate in `source_filter`. Targets with no
    /// matching sources are omitted.
    async fn count_related(
        &self,
        target_label: &str,
        edge_type: &str,
        source_filter: &[AttrPredicate],
    ) -> Result<Vec<RelatedCount>>;
}
