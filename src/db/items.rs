//! Dispatch item database queries
//!
//! Items are the unit of dispatch work. The one-shot state transition is
//! enforced here with a compare-and-set UPDATE so a row can never leave a
//! terminal state, regardless of caller interleaving.

use crate::error::{Error, Result};
use crate::models::{DispatchItem, ItemDisposition, ItemState, SubstitutionData};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Insert a single item
pub async fn insert_item(pool: &SqlitePool, item: &DispatchItem) -> Result<()> {
    let substitution_data = serde_json::to_string(&item.substitution_data)
        .map_err(|e| Error::Internal(format!("Failed to serialize substitution data: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO dispatch_items (
            guid, campaign_id, recipient, state,
            substitution_data, created_at, completed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(item.guid.to_string())
    .bind(item.campaign_id.to_string())
    .bind(&item.recipient)
    .bind(item.state.to_db_string())
    .bind(&substitution_data)
    .bind(item.created_at.to_rfc3339())
    .bind(item.completed_at.map(|dt| dt.to_rfc3339()))
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert a batch of items in one transaction
///
/// All rows land or none do; a failed upload never leaves a partial batch
/// behind for the worker to find.
pub async fn insert_batch(pool: &SqlitePool, items: &[DispatchItem]) -> Result<()> {
    let mut tx = pool.begin().await?;

    for item in items {
        let substitution_data = serde_json::to_string(&item.substitution_data).map_err(|e| {
            Error::Internal(format!("Failed to serialize substitution data: {}", e))
        })?;

        sqlx::query(
            r#"
            INSERT INTO dispatch_items (
                guid, campaign_id, recipient, state,
                substitution_data, created_at, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(item.guid.to_string())
        .bind(item.campaign_id.to_string())
        .bind(&item.recipient)
        .bind(item.state.to_db_string())
        .bind(&substitution_data)
        .bind(item.created_at.to_rfc3339())
        .bind(item.completed_at.map(|dt| dt.to_rfc3339()))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(())
}

/// Load an item by id
pub async fn get_item(pool: &SqlitePool, item_id: Uuid) -> Result<Option<DispatchItem>> {
    let row = sqlx::query(
        r#"
        SELECT guid, campaign_id, recipient, state,
               substitution_data, created_at, completed_at
        FROM dispatch_items
        WHERE guid = ?
        "#,
    )
    .bind(item_id.to_string())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(item_from_row(&row)?)),
        None => Ok(None),
    }
}

/// List a campaign's items in admission order
pub async fn list_items_by_campaign(
    pool: &SqlitePool,
    campaign_id: Uuid,
) -> Result<Vec<DispatchItem>> {
    let rows = sqlx::query(
        r#"
        SELECT guid, campaign_id, recipient, state,
               substitution_data, created_at, completed_at
        FROM dispatch_items
        WHERE campaign_id = ?
        ORDER BY created_at ASC, rowid ASC
        "#,
    )
    .bind(campaign_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(item_from_row).collect()
}

/// Apply a terminal disposition to a PENDING item
///
/// The UPDATE only matches PENDING rows. Zero rows affected means the item
/// is either missing (`NotFound`) or already terminal (`InvalidTransition`);
/// a follow-up SELECT tells the two apart.
pub async fn transition_item(
    pool: &SqlitePool,
    item_id: Uuid,
    disposition: ItemDisposition,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE dispatch_items
        SET state = ?, completed_at = ?
        WHERE guid = ? AND state = 'PENDING'
        "#,
    )
    .bind(disposition.state().to_db_string())
    .bind(disposition.completed_at().map(|dt| dt.to_rfc3339()))
    .bind(item_id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 1 {
        return Ok(());
    }

    let state: Option<String> = sqlx::query_scalar("SELECT state FROM dispatch_items WHERE guid = ?")
        .bind(item_id.to_string())
        .fetch_optional(pool)
        .await?;

    match state {
        Some(state) => Err(Error::InvalidTransition(format!(
            "Item {} is already {}",
            item_id, state
        ))),
        None => Err(Error::NotFound(format!("Dispatch item not found: {}", item_id))),
    }
}

fn item_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<DispatchItem> {
    let guid: String = row.get("guid");
    let guid = Uuid::parse_str(&guid)
        .map_err(|e| Error::Internal(format!("Failed to parse item guid: {}", e)))?;

    let campaign_id: String = row.get("campaign_id");
    let campaign_id = Uuid::parse_str(&campaign_id)
        .map_err(|e| Error::Internal(format!("Failed to parse campaign_id: {}", e)))?;

    let state: String = row.get("state");
    let state = ItemState::from_str(&state)
        .ok_or_else(|| Error::Internal(format!("Unknown item state: {}", state)))?;

    let substitution_data: String = row.get("substitution_data");
    let substitution_data: SubstitutionData = serde_json::from_str(&substitution_data)
        .map_err(|e| Error::Internal(format!("Failed to parse substitution data: {}", e)))?;

    let created_at: String = row.get("created_at");
    let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| Error::Internal(format!("Failed to parse created_at: {}", e)))?
        .with_timezone(&chrono::Utc);

    let completed_at: Option<String> = row.get("completed_at");
    let completed_at = completed_at
        .map(|s| chrono::DateTime::parse_from_rfc3339(&s))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to parse completed_at: {}", e)))?
        .map(|dt| dt.with_timezone(&chrono::Utc));

    Ok(DispatchItem {
        guid,
        campaign_id,
        recipient: row.get("recipient"),
        state,
        substitution_data,
        created_at,
        completed_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::campaigns::{campaign_stats, insert_campaign};
    use crate::db::create_schema;
    use crate::models::Campaign;
    use chrono::Utc;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::collections::HashMap;

    // A single connection keeps every query on the same in-memory database
    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Should connect to in-memory database");
        create_schema(&pool).await.expect("Should create schema");
        pool
    }

    async fn test_campaign(pool: &SqlitePool) -> Campaign {
        let campaign = Campaign::new("test".to_string(), "Hello {name}".to_string());
        insert_campaign(pool, &campaign).await.unwrap();
        campaign
    }

    fn data(pairs: &[(&str, serde_json::Value)]) -> SubstitutionData {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_insert_and_get_item() {
        let pool = test_pool().await;
        let campaign = test_campaign(&pool).await;

        let item = DispatchItem::new(
            campaign.guid,
            "ada@example.com".to_string(),
            data(&[
                ("email", serde_json::json!("ada@example.com")),
                ("name", serde_json::json!("Ada")),
                ("score", serde_json::json!(42)),
            ]),
        );
        insert_item(&pool, &item).await.unwrap();

        let loaded = get_item(&pool, item.guid).await.unwrap().unwrap();
        assert_eq!(loaded.guid, item.guid);
        assert_eq!(loaded.campaign_id, campaign.guid);
        assert_eq!(loaded.recipient, "ada@example.com");
        assert_eq!(loaded.state, ItemState::Pending);
        assert_eq!(loaded.substitution_data["name"], serde_json::json!("Ada"));
        assert_eq!(loaded.substitution_data["score"], serde_json::json!(42));
        assert!(loaded.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_get_missing_item() {
        let pool = test_pool().await;

        let loaded = get_item(&pool, Uuid::new_v4()).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_insert_item_without_campaign_rejected() {
        let pool = test_pool().await;

        // Foreign keys are on for every pool connection
        let item = DispatchItem::new(
            Uuid::new_v4(),
            "ada@example.com".to_string(),
            SubstitutionData::new(),
        );
        let err = insert_item(&pool, &item).await.unwrap_err();
        assert!(matches!(err, Error::Database(_)));
    }

    #[tokio::test]
    async fn test_batch_insert_preserves_order() {
        let pool = test_pool().await;
        let campaign = test_campaign(&pool).await;

        let items: Vec<DispatchItem> = (0..5)
            .map(|i| {
                DispatchItem::new(
                    campaign.guid,
                    format!("user{}@example.com", i),
                    HashMap::new(),
                )
            })
            .collect();
        insert_batch(&pool, &items).await.unwrap();

        let listed = list_items_by_campaign(&pool, campaign.guid).await.unwrap();
        assert_eq!(listed.len(), 5);
        for (i, item) in listed.iter().enumerate() {
            assert_eq!(item.recipient, format!("user{}@example.com", i));
        }
    }

    #[tokio::test]
    async fn test_transition_to_sent_sets_completed_at() {
        let pool = test_pool().await;
        let campaign = test_campaign(&pool).await;

        let item = DispatchItem::new(campaign.guid, "a@example.com".to_string(), HashMap::new());
        insert_item(&pool, &item).await.unwrap();

        let completed_at = Utc::now();
        transition_item(&pool, item.guid, ItemDisposition::Sent { completed_at })
            .await
            .unwrap();

        let loaded = get_item(&pool, item.guid).await.unwrap().unwrap();
        assert_eq!(loaded.state, ItemState::Sent);
        assert_eq!(
            loaded.completed_at.map(|dt| dt.timestamp()),
            Some(completed_at.timestamp())
        );
    }

    #[tokio::test]
    async fn test_transition_to_failed_leaves_no_timestamp() {
        let pool = test_pool().await;
        let campaign = test_campaign(&pool).await;

        let item = DispatchItem::new(campaign.guid, "a@example.com".to_string(), HashMap::new());
        insert_item(&pool, &item).await.unwrap();

        transition_item(&pool, item.guid, ItemDisposition::Failed)
            .await
            .unwrap();

        let loaded = get_item(&pool, item.guid).await.unwrap().unwrap();
        assert_eq!(loaded.state, ItemState::Failed);
        assert!(loaded.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_transition_from_terminal_rejected() {
        let pool = test_pool().await;
        let campaign = test_campaign(&pool).await;

        let item = DispatchItem::new(campaign.guid, "a@example.com".to_string(), HashMap::new());
        insert_item(&pool, &item).await.unwrap();

        transition_item(&pool, item.guid, ItemDisposition::Failed)
            .await
            .unwrap();

        // Second transition must be rejected and must not disturb the row
        let err = transition_item(
            &pool,
            item.guid,
            ItemDisposition::Sent {
                completed_at: Utc::now(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition(_)));

        let loaded = get_item(&pool, item.guid).await.unwrap().unwrap();
        assert_eq!(loaded.state, ItemState::Failed);
        assert!(loaded.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_transition_missing_item() {
        let pool = test_pool().await;

        let err = transition_item(&pool, Uuid::new_v4(), ItemDisposition::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_stats_counts_by_state() {
        let pool = test_pool().await;
        let campaign = test_campaign(&pool).await;

        let items: Vec<DispatchItem> = (0..4)
            .map(|i| {
                DispatchItem::new(
                    campaign.guid,
                    format!("user{}@example.com", i),
                    HashMap::new(),
                )
            })
            .collect();
        insert_batch(&pool, &items).await.unwrap();

        transition_item(
            &pool,
            items[0].guid,
            ItemDisposition::Sent {
                completed_at: Utc::now(),
            },
        )
        .await
        .unwrap();
        transition_item(&pool, items[1].guid, ItemDisposition::Failed)
            .await
            .unwrap();

        let stats = campaign_stats(&pool, campaign.guid).await.unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending, 2);
    }
}
