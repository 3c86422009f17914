//! Dispatch worker
//!
//! A single background task consumes the work queue. Each item goes through
//! the same sequence: load item and campaign, generate content, deliver over
//! SMTP, record the outcome. Failures settle the one item as FAILED and the
//! loop moves on; only the stop token ends it.

use crate::db::{campaigns, items};
use crate::dispatch::queue::QueueCommand;
use crate::error::{Error, Result};
use crate::models::{ItemDisposition, ItemState};
use crate::services::{ContentGenerator, DeliveryError, GenerationError, MessageDeliverer};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Everything the worker needs to process one item
#[derive(Clone)]
pub struct WorkerContext {
    /// Database connection pool
    pub db: SqlitePool,

    /// Content generation client
    pub generator: Arc<dyn ContentGenerator>,

    /// SMTP delivery client
    pub mailer: Arc<dyn MessageDeliverer>,
}

/// How processing one item ended
///
/// These are settled results; store or lookup failures surface as `Err`
/// from [`dispatch_item`] instead and leave the item PENDING.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Content generated, delivery accepted, item now SENT
    Delivered,
    /// Generation failed, item now FAILED
    GenerationFailed(GenerationError),
    /// Delivery failed, item now FAILED
    DeliveryFailed(DeliveryError),
    /// Item was already terminal when dequeued; nothing done
    AlreadySettled(ItemState),
}

/// Process a single dispatch item end to end
pub async fn dispatch_item(ctx: &WorkerContext, item_id: Uuid) -> Result<DispatchOutcome> {
    let item = items::get_item(&ctx.db, item_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Dispatch item not found: {}", item_id)))?;

    // A re-enqueued or replayed identifier can point at a settled item
    if item.state.is_terminal() {
        return Ok(DispatchOutcome::AlreadySettled(item.state));
    }

    let campaign = campaigns::get_campaign(&ctx.db, item.campaign_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Campaign not found: {}", item.campaign_id)))?;

    let content = match ctx
        .generator
        .generate(&campaign.prompt, &item.substitution_data)
        .await
    {
        Ok(content) => content,
        Err(e) => {
            items::transition_item(&ctx.db, item_id, ItemDisposition::Failed).await?;
            return Ok(DispatchOutcome::GenerationFailed(e));
        }
    };

    if let Err(e) = ctx.mailer.deliver(&item.recipient, &content).await {
        items::transition_item(&ctx.db, item_id, ItemDisposition::Failed).await?;
        return Ok(DispatchOutcome::DeliveryFailed(e));
    }

    items::transition_item(
        &ctx.db,
        item_id,
        ItemDisposition::Sent {
            completed_at: Utc::now(),
        },
    )
    .await?;

    Ok(DispatchOutcome::Delivered)
}

/// Worker loop: drain the queue until the stop token arrives
///
/// Also exits if every queue sender is dropped.
pub async fn run(ctx: WorkerContext, mut rx: mpsc::UnboundedReceiver<QueueCommand>) {
    info!("Dispatch worker started");

    while let Some(command) = rx.recv().await {
        let item_id = match command {
            QueueCommand::Dispatch(item_id) => item_id,
            QueueCommand::Shutdown => {
                info!("Dispatch worker received stop token");
                break;
            }
        };

        match dispatch_item(&ctx, item_id).await {
            Ok(DispatchOutcome::Delivered) => {
                info!(item_id = %item_id, "Item dispatched");
            }
            Ok(DispatchOutcome::GenerationFailed(e)) => {
                warn!(item_id = %item_id, error = %e, "Content generation failed");
            }
            Ok(DispatchOutcome::DeliveryFailed(e)) => {
                warn!(item_id = %item_id, error = %e, "Delivery failed");
            }
            Ok(DispatchOutcome::AlreadySettled(state)) => {
                warn!(
                    item_id = %item_id,
                    state = state.to_db_string(),
                    "Skipping item already settled"
                );
            }
            Err(e) => {
                error!(item_id = %item_id, error = %e, "Dispatch error, item skipped");
            }
        }
    }

    info!("Dispatch worker stopped");
}
