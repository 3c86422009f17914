//! Campaign database queries

use crate::error::{Error, Result};
use crate::models::{Campaign, CampaignStats, CampaignStatus, ItemState};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Insert a new campaign
pub async fn insert_campaign(pool: &SqlitePool, campaign: &Campaign) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO campaigns (guid, name, prompt, status, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(campaign.guid.to_string())
    .bind(&campaign.name)
    .bind(&campaign.prompt)
    .bind(campaign.status.to_db_string())
    .bind(campaign.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a campaign by id
pub async fn get_campaign(pool: &SqlitePool, campaign_id: Uuid) -> Result<Option<Campaign>> {
    let row = sqlx::query(
        r#"
        SELECT guid, name, prompt, status, created_at
        FROM campaigns
        WHERE guid = ?
        "#,
    )
    .bind(campaign_id.to_string())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let status: String = row.get("status");
            let status = CampaignStatus::from_str(&status)
                .ok_or_else(|| Error::Internal(format!("Unknown campaign status: {}", status)))?;

            let created_at: String = row.get("created_at");
            let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
                .map_err(|e| Error::Internal(format!("Failed to parse created_at: {}", e)))?
                .with_timezone(&chrono::Utc);

            Ok(Some(Campaign {
                guid: campaign_id,
                name: row.get("name"),
                prompt: row.get("prompt"),
                status,
                created_at,
            }))
        }
        None => Ok(None),
    }
}

/// Check whether a campaign exists
pub async fn campaign_exists(pool: &SqlitePool, campaign_id: Uuid) -> Result<bool> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM campaigns WHERE guid = ?)")
        .bind(campaign_id.to_string())
        .fetch_one(pool)
        .await?;

    Ok(exists)
}

/// Count a campaign's items per state
///
/// Single grouped query; states with no items report zero.
pub async fn campaign_stats(pool: &SqlitePool, campaign_id: Uuid) -> Result<CampaignStats> {
    let rows = sqlx::query(
        r#"
        SELECT state, COUNT(*) AS count
        FROM dispatch_items
        WHERE campaign_id = ?
        GROUP BY state
        "#,
    )
    .bind(campaign_id.to_string())
    .fetch_all(pool)
    .await?;

    let mut stats = CampaignStats::default();
    for row in rows {
        let state: String = row.get("state");
        let count: i64 = row.get("count");
        match ItemState::from_str(&state) {
            Some(ItemState::Pending) => stats.pending = count,
            Some(ItemState::Sent) => stats.sent = count,
            Some(ItemState::Failed) => stats.failed = count,
            None => {
                return Err(Error::Internal(format!("Unknown item state: {}", state)));
            }
        }
        stats.total += count;
    }

    Ok(stats)
}
