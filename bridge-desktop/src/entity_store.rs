//! Entity Storage using SQLite
//!
//! Nodes live in a single table keyed by `(label, key_value)` with their
//! attributes as a JSON document; edges live in a second table with one row
//! per `(source, edge_type)`. Guarded merges compile to a single
//! `INSERT ... ON CONFLICT DO UPDATE ... WHERE ... RETURNING` statement, so
//! the guard check and the write are one atomic step.

use async_trait::async_trait;
use bridge_traits::{
    entity::{
        AttrPredicate, Attributes, EntityStore, MergeOutcome, NodeRecord, NodeRef, OrderBy,
        RelatedCount, SortOrder, WriteGuard,
    },
    error::{BridgeError, Result},
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{
    query::Query,
    sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow},
    Row, Sqlite,
};
use std::path::PathBuf;
use tracing::debug;

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS nodes (
        label TEXT NOT NULL,
        key_field TEXT NOT NULL,
        key_value TEXT NOT NULL,
        attributes TEXT NOT NULL DEFAULT '{}',
        revision INTEGER NOT NULL DEFAULT 1,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (label, key_value)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS edges (
        from_label TEXT NOT NULL,
        from_key TEXT NOT NULL,
        edge_type TEXT NOT NULL,
        to_label TEXT NOT NULL,
        to_key TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (from_label, from_key, edge_type)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_edges_target ON edges (to_label, to_key, edge_type)",
];

const NODE_COLUMNS: &str = "label, key_field, key_value, attributes, created_at, updated_at";

/// Scalar bound into a statement.
enum SqlValue {
    Text(String),
    Int(i64),
    Real(f64),
}

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// SQLite-backed entity store
pub struct SqliteEntityStore {
    pool: SqlitePool,
}

impl SqliteEntityStore {
    /// Open (or create) a store at the given database path
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BridgeError::Io)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to connect to DB: {}", e)))?;

        Self::init_schema(&pool).await?;
        debug!(path = ?db_path, "Initialized entity store");

        Ok(Self { pool })
    }

    /// Create an in-memory store (for testing)
    ///
    /// Pinned to one connection that never idles out, since every SQLite
    /// memory connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to connect to DB: {}", e)))?;

        Self::init_schema(&pool).await?;
        Ok(Self { pool })
    }

    async fn init_schema(pool: &SqlitePool) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(pool)
                .await
                .map_err(|e| db_error("create schema", e))?;
        }
        Ok(())
    }

    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }
}

fn db_error(action: &str, error: sqlx::Error) -> BridgeError {
    BridgeError::DatabaseError(format!("Failed to {}: {}", action, error))
}

/// Attribute names are spliced into JSON paths, so only plain identifiers pass.
fn validate_field(field: &str) -> Result<()> {
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(BridgeError::InvalidInput(format!(
            "Invalid attribute name: {:?}",
            field
        )))
    }
}

fn json_path(column: &str, field: &str) -> Result<String> {
    validate_field(field)?;
    Ok(format!("json_extract({}, '$.{}')", column, field))
}

fn sql_value(value: &Value) -> Result<SqlValue> {
    match value {
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        // json_extract yields 1/0 for JSON booleans
        Value::Bool(b) => Ok(SqlValue::Int(i64::from(*b))),
        Value::Number(n) => n
            .as_i64()
            .map(SqlValue::Int)
            .or_else(|| n.as_f64().map(SqlValue::Real))
            .ok_or_else(|| BridgeError::InvalidInput(format!("Unsupported number: {}", n))),
        other => Err(BridgeError::InvalidInput(format!(
            "Predicates compare scalars only, got {}",
            other
        ))),
    }
}

fn predicate_sql(column: &str, predicate: &AttrPredicate) -> Result<(String, SqlValue)> {
    match predicate {
        AttrPredicate::Eq { field, value } => {
            Ok((format!("{} = ?", json_path(column, field)?), sql_value(value)?))
        }
        AttrPredicate::Lt { field, value } => {
            Ok((format!("{} < ?", json_path(column, field)?), sql_value(value)?))
        }
    }
}

/// Compile predicates into `(clauses, binds)`.
fn predicates_sql(column: &str, predicates: &[AttrPredicate]) -> Result<(Vec<String>, Vec<SqlValue>)> {
    let mut clauses = Vec::with_capacity(predicates.len());
    let mut binds = Vec::with_capacity(predicates.len());
    for predicate in predicates {
        let (clause, bind) = predicate_sql(column, predicate)?;
        clauses.push(clause);
        binds.push(bind);
    }
    Ok((clauses, binds))
}

fn bind_all(mut query: SqliteQuery<'_>, values: Vec<SqlValue>) -> SqliteQuery<'_> {
    for value in values {
        query = match value {
            SqlValue::Text(s) => query.bind(s),
            SqlValue::Int(i) => query.bind(i),
            SqlValue::Real(f) => query.bind(f),
        };
    }
    query
}

fn timestamp(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

fn record_from_row(row: &SqliteRow) -> Result<NodeRecord> {
    let get_text = |column: &str| -> Result<String> {
        row.try_get::<String, _>(column)
            .map_err(|e| db_error("read row", e))
    };
    let get_int = |column: &str| -> Result<i64> {
        row.try_get::<i64, _>(column)
            .map_err(|e| db_error("read row", e))
    };

    let attributes: Attributes = serde_json::from_str(&get_text("attributes")?)?;
    Ok(NodeRecord {
        node: NodeRef::new(
            get_text("label")?,
            get_text("key_field")?,
            get_text("key_value")?,
        ),
        attributes,
        created_at: timestamp(get_int("created_at")?),
        updated_at: timestamp(get_int("updated_at")?),
    })
}

#[async_trait]
impl EntityStore for SqliteEntityStore {
    async fn merge_node(
        &self,
        node: &NodeRef,
        mut attributes: Attributes,
        guard: WriteGuard,
    ) -> Result<MergeOutcome> {
        validate_field(&node.key_field)?;
        attributes.insert(node.key_field.clone(), Value::String(node.key.clone()));
        let payload = serde_json::to_string(&attributes)?;
        let now = Self::now();

        let mut binds = vec![
            SqlValue::Text(node.label.clone()),
            SqlValue::Text(node.key_field.clone()),
            SqlValue::Text(node.key.clone()),
            SqlValue::Text(payload.clone()),
            SqlValue::Int(now),
            SqlValue::Int(now),
        ];

        let reclaim = match &guard {
            WriteGuard::Always => Some(Vec::new()),
            WriteGuard::IfAbsent => None,
            WriteGuard::IfAbsentOrAny(predicates) if predicates.is_empty() => None,
            WriteGuard::IfAbsentOrAny(predicates) => Some(predicates.clone()),
        };

        let on_conflict = match reclaim {
            None => "DO NOTHING".to_string(),
            Some(predicates) => {
                binds.push(SqlValue::Text(payload));
                binds.push(SqlValue::Int(now));
                let (clauses, predicate_binds) = predicates_sql("nodes.attributes", &predicates)?;
                binds.extend(predicate_binds);

                let mut update = String::from(
                    "DO UPDATE SET attributes = json_patch(nodes.attributes, ?), \
                     revision = nodes.revision + 1, updated_at = ?",
                );
                if !clauses.is_empty() {
                    update.push_str(" WHERE ");
                    update.push_str(&clauses.join(" OR "));
                }
                update
            }
        };

        let sql = format!(
            "INSERT INTO nodes (label, key_field, key_value, attributes, revision, created_at, updated_at) \
             VALUES (?, ?, ?, json_patch('{{}}', ?), 1, ?, ?) \
             ON CONFLICT(label, key_value) {} \
             RETURNING revision",
            on_conflict
        );

        let row = bind_all(sqlx::query(&sql), binds)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("merge node", e))?;

        let outcome = match row {
            None => MergeOutcome::Skipped,
            Some(row) => {
                let revision: i64 = row
                    .try_get("revision")
                    .map_err(|e| db_error("read revision", e))?;
                if revision == 1 {
                    MergeOutcome::Created
                } else {
                    MergeOutcome::Updated
                }
            }
        };

        debug!(label = %node.label, key = %node.key, outcome = ?outcome, "Merged node");
        Ok(outcome)
    }

    async fn merge_edge(&self, from: &NodeRef, edge_type: &str, to: &NodeRef) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO edges (from_label, from_key, edge_type, to_label, to_key, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(from_label, from_key, edge_type) DO UPDATE SET
                to_label = excluded.to_label,
                to_key = excluded.to_key
            "#,
        )
        .bind(&from.label)
        .bind(&from.key)
        .bind(edge_type)
        .bind(&to.label)
        .bind(&to.key)
        .bind(Self::now())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("merge edge", e))?;

        debug!(from = %from.key, edge_type, to = %to.key, "Merged edge");
        Ok(())
    }

    async fn find_node(&self, node: &NodeRef) -> Result<Option<NodeRecord>> {
        let sql = format!(
            "SELECT {} FROM nodes WHERE label = ? AND key_value = ?",
            NODE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(&node.label)
            .bind(&node.key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find node", e))?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn list_nodes(
        &self,
        label: &str,
        filter: &[AttrPredicate],
        order_by: Option<&OrderBy>,
        limit: Option<usize>,
    ) -> Result<Vec<NodeRecord>> {
        let (clauses, mut binds) = predicates_sql("attributes", filter)?;
        binds.insert(0, SqlValue::Text(label.to_string()));

        let mut sql = format!("SELECT {} FROM nodes WHERE label = ?", NODE_COLUMNS);
        for clause in &clauses {
            sql.push_str(" AND ");
            sql.push_str(clause);
        }

        match order_by {
            Some(order) => {
                let direction = match order.order {
                    SortOrder::Asc => "ASC",
                    SortOrder::Desc => "DESC",
                };
                sql.push_str(&format!(
                    " ORDER BY {} {}, key_value ASC",
                    json_path("attributes", &order.field)?,
                    direction
                ));
            }
            None => sql.push_str(" ORDER BY key_value ASC"),
        }

        if let Some(limit) = limit {
            sql.push_str(" LIMIT ?");
            binds.push(SqlValue::Int(i64::try_from(limit).unwrap_or(i64::MAX)));
        }

        let rows = bind_all(sqlx::query(&sql), binds)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list nodes", e))?;

        rows.iter().map(record_from_row).collect()
    }

    async fn count_related(
        &self,
        target_label: &str,
        edge_type: &str,
        source_filter: &[AttrPredicate],
    ) -> Result<Vec<RelatedCount>> {
        let (clauses, predicate_binds) = predicates_sql("s.attributes", source_filter)?;
        let mut binds = vec![
            SqlValue::Text(target_label.to_string()),
            SqlValue::Text(edge_type.to_string()),
        ];
        binds.extend(predicate_binds);

        let mut sql = String::from(
            "SELECT t.label AS label, t.key_field AS key_field, t.key_value AS key_value, \
             t.attributes AS attributes, t.created_at AS created_at, t.updated_at AS updated_at, \
             COUNT(*) AS related \
             FROM edges e \
             JOIN nodes t ON t.label = e.to_label AND t.key_value = e.to_key \
             JOIN nodes s ON s.label = e.from_label AND s.key_value = e.from_key \
             WHERE e.to_label = ? AND e.edge_type = ?",
        );
        for clause in &clauses {
            sql.push_str(" AND ");
            sql.push_str(clause);
        }
        sql.push_str(" GROUP BY t.label, t.key_value ORDER BY t.key_value ASC");

        let rows = bind_all(sqlx::query(&sql), binds)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("count related nodes", e))?;

        rows.iter()
            .map(|row| {
                let count: i64 = row
                    .try_get("related")
                    .map_err(|e| db_error("read count", e))?;
                Ok(RelatedCount {
                    node: record_from_row(row)?,
                    count: u64::try_from(count).unwrap_or_default(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn attrs(value: Value) -> Attributes {
        match value {
            Value::Object(map) => map,
            _ => Attributes::new(),
        }
    }

    fn asset(id: &str) -> NodeRef {
        NodeRef::new("Asset", "lightroom_id", id)
    }

    #[tokio::test]
    async fn test_merge_creates_then_patches() {
        let store = SqliteEntityStore::in_memory().await.unwrap();
        let node = asset("a1");

        let first = store
            .merge_node(
                &node,
                attrs(json!({"filename": "IMG_1.jpg", "camera": {"make": "Canon"}, "note": "x"})),
                WriteGuard::Always,
            )
            .await
            .unwrap();
        assert_eq!(first, MergeOutcome::Created);

        let second = store
            .merge_node(
                &node,
                attrs(json!({"camera": {"model": "R5"}, "note": null})),
                WriteGuard::Always,
            )
            .await
            .unwrap();
        assert_eq!(second, MergeOutcome::Updated);

        let record = store.find_node(&node).await.unwrap().unwrap();
        assert_eq!(record.get_str("lightroom_id"), Some("a1"));
        assert_eq!(record.get_str("filename"), Some("IMG_1.jpg"));
        assert_eq!(record.attributes["camera"], json!({"make": "Canon", "model": "R5"}));
        assert!(!record.attributes.contains_key("note"));
    }

    #[tokio::test]
    async fn test_if_absent_skips_existing() {
        let store = SqliteEntityStore::in_memory().await.unwrap();
        let node = asset("a1");

        let created = store
            .merge_node(&node, attrs(json!({"v": 1})), WriteGuard::IfAbsent)
            .await
            .unwrap();
        let skipped = store
            .merge_node(&node, attrs(json!({"v": 2})), WriteGuard::IfAbsent)
            .await
            .unwrap();

        assert_eq!(created, MergeOutcome::Created);
        assert_eq!(skipped, MergeOutcome::Skipped);
        let record = store.find_node(&node).await.unwrap().unwrap();
        assert_eq!(record.attributes["v"], json!(1));
    }

    #[tokio::test]
    async fn test_reclaim_only_when_predicate_matches() {
        let store = SqliteEntityStore::in_memory().await.unwrap();
        let node = asset("a1");
        let guard = WriteGuard::IfAbsentOrAny(vec![
            AttrPredicate::eq("sync_state", "failed"),
            AttrPredicate::lt("claim_expires_at", 1_000),
        ]);

        store
            .merge_node(
                &node,
                attrs(json!({"sync_state": "pending", "claim_expires_at": 5_000})),
                guard.clone(),
            )
            .await
            .unwrap();

        let live_claim = store
            .merge_node(&node, attrs(json!({"sync_state": "pending"})), guard.clone())
            .await
            .unwrap();
        assert_eq!(live_claim, MergeOutcome::Skipped);

        store
            .merge_node(&node, attrs(json!({"sync_state": "failed"})), WriteGuard::Always)
            .await
            .unwrap();
        let reclaimed = store
            .merge_node(&node, attrs(json!({"sync_state": "pending"})), guard.clone())
            .await
            .unwrap();
        assert_eq!(reclaimed, MergeOutcome::Updated);

        store
            .merge_node(
                &node,
                attrs(json!({"sync_state": "pending", "claim_expires_at": 10})),
                WriteGuard::Always,
            )
            .await
            .unwrap();
        let expired = store
            .merge_node(&node, attrs(json!({"sync_state": "pending"})), guard)
            .await
            .unwrap();
        assert_eq!(expired, MergeOutcome::Updated);
    }

    #[tokio::test]
    async fn test_concurrent_if_absent_has_single_winner() {
        let store = Arc::new(SqliteEntityStore::in_memory().await.unwrap());
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .merge_node(&asset("shared"), attrs(json!({"writer": i})), WriteGuard::IfAbsent)
                    .await
                    .unwrap()
            }));
        }

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap() == MergeOutcome::Created {
                created += 1;
            }
        }
        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn test_list_nodes_filter_order_limit() {
        let store = SqliteEntityStore::in_memory().await.unwrap();
        let rows = [
            ("a1", "2024-01-01T00:00:00Z", "synced", "alb"),
            ("a2", "2024-03-01T00:00:00Z", "synced", "alb"),
            ("a3", "2024-02-01T00:00:00Z", "pending", "alb"),
            ("a4", "2024-04-01T00:00:00Z", "synced", "other"),
        ];
        for (id, date, state, album) in rows {
            store
                .merge_node(
                    &asset(id),
                    attrs(json!({"capture_date": date, "sync_state": state, "album_id": album})),
                    WriteGuard::Always,
                )
                .await
                .unwrap();
        }

        let filter = [
            AttrPredicate::eq("album_id", "alb"),
            AttrPredicate::eq("sync_state", "synced"),
        ];
        let listed = store
            .list_nodes("Asset", &filter, Some(&OrderBy::desc("capture_date")), None)
            .await
            .unwrap();
        let ids: Vec<_> = listed.iter().map(|r| r.node.key.as_str()).collect();
        assert_eq!(ids, vec!["a2", "a1"]);

        let limited = store
            .list_nodes("Asset", &[], Some(&OrderBy::asc("capture_date")), Some(2))
            .await
            .unwrap();
        let ids: Vec<_> = limited.iter().map(|r| r.node.key.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a3"]);
    }

    #[tokio::test]
    async fn test_count_related_respects_source_filter() {
        let store = SqliteEntityStore::in_memory().await.unwrap();
        let album = NodeRef::new("Album", "lightroom_id", "alb");
        let empty_album = NodeRef::new("Album", "lightroom_id", "empty");
        store
            .merge_node(&album, attrs(json!({"name": "Reef Trip"})), WriteGuard::Always)
            .await
            .unwrap();
        store
            .merge_node(&empty_album, attrs(json!({"name": "Empty"})), WriteGuard::Always)
            .await
            .unwrap();

        for (id, state) in [("a1", "synced"), ("a2", "synced"), ("a3", "failed")] {
            store
                .merge_node(&asset(id), attrs(json!({"sync_state": state})), WriteGuard::Always)
                .await
                .unwrap();
            store.merge_edge(&asset(id), "IN_ALBUM", &album).await.unwrap();
        }
        // re-merging the same edge does not double count
        store.merge_edge(&asset("a1"), "IN_ALBUM", &album).await.unwrap();

        let counts = store
            .count_related("Album", "IN_ALBUM", &[AttrPredicate::eq("sync_state", "synced")])
            .await
            .unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].node.get_str("name"), Some("Reef Trip"));
        assert_eq!(counts[0].count, 2);
    }

    #[tokio::test]
    async fn test_edge_moves_to_new_target() {
        let store = SqliteEntityStore::in_memory().await.unwrap();
        let first = NodeRef::new("Album", "lightroom_id", "first");
        let second = NodeRef::new("Album", "lightroom_id", "second");
        for album in [&first, &second] {
            store
                .merge_node(album, Attributes::new(), WriteGuard::Always)
                .await
                .unwrap();
        }
        store
            .merge_node(&asset("a1"), Attributes::new(), WriteGuard::Always)
            .await
            .unwrap();

        store.merge_edge(&asset("a1"), "IN_ALBUM", &first).await.unwrap();
        store.merge_edge(&asset("a1"), "IN_ALBUM", &second).await.unwrap();

        let counts = store.count_related("Album", "IN_ALBUM", &[]).await.unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].node.node.key, "second");
    }

    #[tokio::test]
    async fn test_rejects_unsafe_field_names() {
        let store = SqliteEntityStore::in_memory().await.unwrap();
        let result = store
            .list_nodes("Asset", &[AttrPredicate::eq("x') OR 1=1 --", "y")], None, None)
            .await;
        assert!(matches!(result, Err(BridgeError::InvalidInput(_))));

        let result = store
            .merge_node(
                &NodeRef::new("Asset", "bad field", "a1"),
                Attributes::new(),
                WriteGuard::Always,
            )
            .await;
        assert!(matches!(result, Err(BridgeError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_file_backed_store_persists() {
        let dir = std::env::temp_dir().join(format!("entity-store-{}", uuid::Uuid::new_v4()));
        let path = dir.join("photos.db");

        {
            let store = SqliteEntityStore::new(path.clone()).await.unwrap();
            store
                .merge_node(&asset("a1"), attrs(json!({"v": 1})), WriteGuard::Always)
                .await
                .unwrap();
        }

        let reopened = SqliteEntityStore::new(path).await.unwrap();
        assert!(reopened.find_node(&asset("a1")).await.unwrap().is_some());
        let _ = std::fs::remove_dir_all(dir);
    }
}
