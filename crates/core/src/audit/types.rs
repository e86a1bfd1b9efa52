//! Audit entry types.

use chrono::{DateTime, Utc};
use merchant_shared::PageRequest;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::tenant::Actor;

/// What kind of entity an entry is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A ledger transaction.
    Transaction,
    /// A provider balance account.
    ProviderBalance,
    /// A daily closing row.
    DailyClosing,
    /// A webhook endpoint.
    WebhookEndpoint,
}

impl EntityType {
    /// Returns the string representation of the entity type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
            Self::ProviderBalance => "provider_balance",
            Self::DailyClosing => "daily_closing",
            Self::WebhookEndpoint => "webhook_endpoint",
        }
    }

    /// Parses an entity type from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "transaction" => Some(Self::Transaction),
            "provider_balance" => Some(Self::ProviderBalance),
            "daily_closing" => Some(Self::DailyClosing),
            "webhook_endpoint" => Some(Self::WebhookEndpoint),
            _ => None,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The state-changing action an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Transaction created.
    Create,
    /// Transaction approved.
    Approve,
    /// Transaction rejected.
    Reject,
    /// Transaction completed.
    Complete,
    /// Transaction reversed.
    Reverse,
    /// Transaction failed.
    Fail,
    /// Balance account opened.
    OpenBalance,
    /// Day closed for an account.
    CloseDay,
    /// Closed day recomputed on request.
    ForceCloseDay,
    /// Webhook endpoint registered.
    CreateWebhook,
    /// Webhook endpoint changed.
    UpdateWebhook,
}

impl AuditAction {
    /// All actions.
    pub const ALL: [Self; 11] = [
        Self::Create,
        Self::Approve,
        Self::Reject,
        Self::Complete,
        Self::Reverse,
        Self::Fail,
        Self::OpenBalance,
        Self::CloseDay,
        Self::ForceCloseDay,
        Self::CreateWebhook,
        Self::UpdateWebhook,
    ];

    /// Returns the string representation of the action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Complete => "complete",
            Self::Reverse => "reverse",
            Self::Fail => "fail",
            Self::OpenBalance => "open_balance",
            Self::CloseDay => "close_day",
            Self::ForceCloseDay => "force_close_day",
            Self::CreateWebhook => "create_webhook",
            Self::UpdateWebhook => "update_webhook",
        }
    }

    /// Parses an action from a string.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == s)
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one state-changing action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Entry ID.
    pub id: Uuid,
    /// Owning company.
    pub company_id: Uuid,
    /// Per-company append order; 0 until the log assigns it.
    pub sequence: i64,
    /// Who acted.
    pub actor: Actor,
    /// Entity kind.
    pub entity_type: EntityType,
    /// Entity ID.
    pub entity_id: Uuid,
    /// Action taken.
    pub action: AuditAction,
    /// Snapshot before the action, if the entity existed.
    pub before: Option<Value>,
    /// Snapshot after the action.
    pub after: Option<Value>,
    /// When the action committed.
    pub created_at: DateTime<Utc>,
}

/// Read filter for the audit log.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditQuery {
    /// Only entries about this entity.
    pub entity_id: Option<Uuid>,
    /// Page window.
    pub page: PageRequest,
}
