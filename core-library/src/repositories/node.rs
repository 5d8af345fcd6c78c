//! Node repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::NodeInfo;
use async_trait::async_trait;
use sqlx::{query, query_as, FromRow, SqlitePool};

#[async_trait]
pub trait NodeRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<NodeInfo>>;

    /// Lookup by normalized URL
    async fn find_by_url(&self, url: &str) -> Result<Option<NodeInfo>>;

    async fn find_all(&self) -> Result<Vec<NodeInfo>>;

    /// # Errors
    /// Fails when another node already uses the same URL.
    async fn insert(&self, node: &NodeInfo) -> Result<()>;

    /// # Errors
    /// Returns `NotFound` if the node does not exist.
    async fn update(&self, node: &NodeInfo) -> Result<()>;

    /// Deletes the node together with the file records fetched from it.
    async fn delete(&self, id: &str) -> Result<bool>;
}

#[derive(FromRow)]
struct NodeRow {
    id: String,
    name: String,
    url: String,
    api_key: Option<String>,
    is_enabled: bool,
    last_validated_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl From<NodeRow> for NodeInfo {
    fn from(row: NodeRow) -> Self {
        NodeInfo {
            id: row.id,
            name: row.name,
            url: row.url,
            api_key: row.api_key,
            is_enabled: row.is_enabled,
            last_validated_at: row.last_validated_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub struct SqliteNodeRepository {
    pool: SqlitePool,
}

impl SqliteNodeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn validate(node: &NodeInfo) -> Result<()> {
    if node.name.trim().is_empty() {
        return Err(LibraryError::invalid("name", "cannot be empty"));
    }
    if node.url.trim().is_empty() {
        return Err(LibraryError::invalid("url", "cannot be empty"));
    }
    Ok(())
}

#[async_trait]
impl NodeRepository for SqliteNodeRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<NodeInfo>> {
        let row = query_as::<_, NodeRow>("SELECT * FROM nodes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(NodeInfo::from))
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<NodeInfo>> {
        let row = query_as::<_, NodeRow>("SELECT * FROM nodes WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(NodeInfo::from))
    }

    async fn find_all(&self) -> Result<Vec<NodeInfo>> {
        let rows = query_as::<_, NodeRow>("SELECT * FROM nodes ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(NodeInfo::from).collect())
    }

    async fn insert(&self, node: &NodeInfo) -> Result<()> {
        validate(node)?;

        query(
            r#"
            INSERT INTO nodes (
                id, name, url, api_key, is_enabled, last_validated_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&node.id)
        .bind(&node.name)
        .bind(&node.url)
        .bind(&node.api_key)
        .bind(node.is_enabled)
        .bind(node.last_validated_at)
        .bind(node.created_at)
        .bind(node.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, node: &NodeInfo) -> Result<()> {
        validate(node)?;

        let result = query(
            r#"
            UPDATE nodes
            SET name = ?, url = ?, api_key = ?, is_enabled = ?, last_validated_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&node.name)
        .bind(&node.url)
        .bind(&node.api_key)
        .bind(node.is_enabled)
        .bind(node.last_validated_at)
        .bind(node.updated_at)
        .bind(&node.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::not_found("Node", &node.id));
        }

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = query("DELETE FROM nodes WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[tokio::test]
    async fn test_insert_and_lookup_by_url() {
        let repo = SqliteNodeRepository::new(create_test_pool().await.unwrap());
        let node = NodeInfo::new("den", "http://10.0.0.2:8080", Some("key".to_string()));

        repo.insert(&node).await.unwrap();

        let found = repo.find_by_url("http://10.0.0.2:8080").await.unwrap().unwrap();
        assert_eq!(found, node);
        assert!(repo.find_by_url("http://10.0.0.3:8080").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_url_is_unique() {
        let repo = SqliteNodeRepository::new(create_test_pool().await.unwrap());
        repo.insert(&NodeInfo::new("a", "http://peer:1", None))
            .await
            .unwrap();

        let result = repo.insert(&NodeInfo::new("b", "http://peer:1", None)).await;
        assert!(matches!(result, Err(LibraryError::Database(_))));
    }

    #[tokio::test]
    async fn test_update_toggles_enabled() {
        let repo = SqliteNodeRepository::new(create_test_pool().await.unwrap());
        let mut node = NodeInfo::new("den", "http://peer:2", None);
        repo.insert(&node).await.unwrap();

        node.is_enabled = false;
        repo.update(&node).await.unwrap();

        assert!(!repo.find_by_id(&node.id).await.unwrap().unwrap().is_enabled);
        assert_eq!(repo.find_all().await.unwrap().len(), 1);
        assert!(repo.delete(&node.id).await.unwrap());
    }
}
