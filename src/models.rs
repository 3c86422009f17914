//! Domain models for mailforge
//!
//! A campaign owns a batch of dispatch items, one per recipient. Each item
//! moves through a two-step state machine:
//! PENDING → SENT (delivery confirmed) or PENDING → FAILED (any stage failed).
//! Both SENT and FAILED are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Per-recipient key/value pairs used for template substitution.
///
/// Stored as a JSON object in the database. CSV uploads produce string
/// values; the type stays JSON so callers admitting items directly can
/// carry numbers or nested data. Substitution renders strings without
/// quotes.
pub type SubstitutionData = HashMap<String, serde_json::Value>;

/// Dispatch item state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ItemState {
    /// Admitted, not yet processed by the worker
    Pending,
    /// Generated and delivered successfully
    Sent,
    /// Generation or delivery failed
    Failed,
}

impl ItemState {
    /// Parse state from its database string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ItemState::Pending),
            "SENT" => Some(ItemState::Sent),
            "FAILED" => Some(ItemState::Failed),
            _ => None,
        }
    }

    /// Convert to database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            ItemState::Pending => "PENDING",
            ItemState::Sent => "SENT",
            ItemState::Failed => "FAILED",
        }
    }

    /// Check if state is terminal (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemState::Sent | ItemState::Failed)
    }
}

/// Campaign lifecycle status
///
/// Campaigns are created in DRAFT and currently stay there; the column is
/// reserved for lifecycle automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CampaignStatus {
    Draft,
}

impl CampaignStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(CampaignStatus::Draft),
            _ => None,
        }
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "DRAFT",
        }
    }
}

impl Default for CampaignStatus {
    fn default() -> Self {
        CampaignStatus::Draft
    }
}

/// An email campaign: a name plus the prompt template used to generate
/// per-recipient message bodies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    /// Unique campaign identifier
    pub guid: Uuid,

    /// Human-readable campaign name
    pub name: String,

    /// Prompt template; `{key}` placeholders are filled from each
    /// recipient's substitution data before generation
    pub prompt: String,

    /// Lifecycle status
    pub status: CampaignStatus,

    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Campaign {
    /// Create new campaign in DRAFT
    pub fn new(name: String, prompt: String) -> Self {
        Self {
            guid: Uuid::new_v4(),
            name,
            prompt,
            status: CampaignStatus::Draft,
            created_at: Utc::now(),
        }
    }
}

/// A single unit of dispatch work: one recipient within one campaign
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchItem {
    /// Unique item identifier
    pub guid: Uuid,

    /// Owning campaign
    pub campaign_id: Uuid,

    /// Destination email address
    pub recipient: String,

    /// Current state
    pub state: ItemState,

    /// Template substitution values for this recipient
    pub substitution_data: SubstitutionData,

    /// Admission time
    pub created_at: DateTime<Utc>,

    /// Completion time; set on the PENDING → SENT transition only
    pub completed_at: Option<DateTime<Utc>>,
}

impl DispatchItem {
    /// Create new item in PENDING
    pub fn new(campaign_id: Uuid, recipient: String, substitution_data: SubstitutionData) -> Self {
        Self {
            guid: Uuid::new_v4(),
            campaign_id,
            recipient,
            state: ItemState::Pending,
            substitution_data,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Terminal disposition applied to a PENDING item
///
/// Carrying the completion time inside `Sent` keeps the pairing fixed:
/// SENT rows get a timestamp, FAILED rows never do.
#[derive(Debug, Clone, Copy)]
pub enum ItemDisposition {
    /// Delivery confirmed at the given time
    Sent { completed_at: DateTime<Utc> },
    /// Generation or delivery failed
    Failed,
}

impl ItemDisposition {
    /// Target state for this disposition
    pub fn state(&self) -> ItemState {
        match self {
            ItemDisposition::Sent { .. } => ItemState::Sent,
            ItemDisposition::Failed => ItemState::Failed,
        }
    }

    /// Completion timestamp, present only for SENT
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        match self {
            ItemDisposition::Sent { completed_at } => Some(*completed_at),
            ItemDisposition::Failed => None,
        }
    }
}

/// One recipient parsed from an uploaded CSV batch
#[derive(Debug, Clone)]
pub struct RecipientRow {
    /// Destination address (the `email` column)
    pub recipient: String,

    /// Full row contents, `email` column included
    pub data: SubstitutionData,
}

/// Per-state item counts for one campaign
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CampaignStats {
    pub total: i64,
    pub sent: i64,
    pub pending: i64,
    pub failed: i64,
}
