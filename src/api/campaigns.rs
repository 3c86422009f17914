//! Campaign admission and status API handlers
//!
//! POST /api/campaign            - create a campaign
//! POST /api/upload/:campaign_id - admit a CSV batch of recipients
//! GET  /api/campaign/:campaign_id/status - per-state item counts

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{campaigns, items};
use crate::error::{ApiError, ApiResult};
use crate::models::{Campaign, CampaignStats, DispatchItem, RecipientRow};
use crate::AppState;

/// POST /api/campaign request
#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub prompt: String,
}

/// POST /api/campaign response
#[derive(Debug, Serialize)]
pub struct CreateCampaignResponse {
    pub id: Uuid,
}

/// POST /api/upload/:campaign_id response
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub campaign_id: Uuid,
    pub queued: usize,
}

/// POST /api/campaign
///
/// Create a campaign. Returns 201 with the new id.
pub async fn create_campaign(
    State(state): State<AppState>,
    Json(request): Json<CreateCampaignRequest>,
) -> ApiResult<(StatusCode, Json<CreateCampaignResponse>)> {
    if request.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Campaign name is required".to_string()));
    }
    if request.prompt.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Campaign prompt is required".to_string(),
        ));
    }

    let campaign = Campaign::new(request.name, request.prompt);
    campaigns::insert_campaign(&state.db, &campaign).await?;

    tracing::info!(campaign_id = %campaign.guid, name = %campaign.name, "Campaign created");

    Ok((
        StatusCode::CREATED,
        Json(CreateCampaignResponse { id: campaign.guid }),
    ))
}

/// POST /api/upload/:campaign_id
///
/// Admit a CSV batch. Every row becomes a PENDING item; the whole batch is
/// stored in one transaction before anything is enqueued, so the worker
/// never sees a partially admitted upload.
pub async fn upload_recipients(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
    body: String,
) -> ApiResult<Json<UploadResponse>> {
    if !campaigns::campaign_exists(&state.db, campaign_id).await? {
        return Err(ApiError::NotFound(format!(
            "Campaign not found: {}",
            campaign_id
        )));
    }

    let rows = parse_recipients(&body).map_err(ApiError::BadRequest)?;

    let items: Vec<DispatchItem> = rows
        .into_iter()
        .map(|row| DispatchItem::new(campaign_id, row.recipient, row.data))
        .collect();

    items::insert_batch(&state.db, &items).await?;

    // Enqueue in row order; FIFO dispatch follows admission order
    for item in &items {
        state
            .dispatcher
            .enqueue(item.guid)
            .map_err(|e| ApiError::Internal(e.to_string()))?;
    }

    tracing::info!(
        campaign_id = %campaign_id,
        queued = items.len(),
        "Recipient batch admitted"
    );

    Ok(Json(UploadResponse {
        campaign_id,
        queued: items.len(),
    }))
}

/// GET /api/campaign/:campaign_id/status
///
/// Per-state item counts for one campaign.
pub async fn campaign_status(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
) -> ApiResult<Json<CampaignStats>> {
    if !campaigns::campaign_exists(&state.db, campaign_id).await? {
        return Err(ApiError::NotFound(format!(
            "Campaign not found: {}",
            campaign_id
        )));
    }

    let stats = campaigns::campaign_stats(&state.db, campaign_id).await?;

    tracing::debug!(
        campaign_id = %campaign_id,
        total = stats.total,
        pending = stats.pending,
        "Status query"
    );

    Ok(Json(stats))
}

/// Parse an uploaded CSV body into recipient rows
///
/// The header row must include an `email` column; each data row needs a
/// non-empty address there. The full row, `email` included, becomes the
/// item's substitution data. Row numbers in errors count the header as
/// row 1.
fn parse_recipients(csv_text: &str) -> Result<Vec<RecipientRow>, String> {
    let mut reader = csv::Reader::from_reader(csv_text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| format!("Invalid CSV: {}", e))?
        .clone();
    if !headers.iter().any(|h| h == "email") {
        return Err("CSV must include an 'email' column".to_string());
    }

    let mut rows = Vec::new();
    for (idx, result) in reader
        .deserialize::<std::collections::HashMap<String, String>>()
        .enumerate()
    {
        let record = result.map_err(|e| format!("Row {}: {}", idx + 2, e))?;

        let recipient = record
            .get("email")
            .map(|s| s.trim())
            .unwrap_or_default()
            .to_string();
        if recipient.is_empty() {
            return Err(format!("Row {}: missing email address", idx + 2));
        }

        let data = record
            .into_iter()
            .map(|(key, value)| (key, serde_json::Value::String(value)))
            .collect();

        rows.push(RecipientRow { recipient, data });
    }

    if rows.is_empty() {
        return Err("CSV contains no recipient rows".to_string());
    }

    Ok(rows)
}

/// Build campaign routes
pub fn campaign_routes() -> Router<AppState> {
    Router::new()
        .route("/api/campaign", post(create_campaign))
        .route("/api/upload/:campaign_id", post(upload_recipients))
        .route("/api/campaign/:campaign_id/status", get(campaign_status))
}
