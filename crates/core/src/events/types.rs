//! Domain event types and the outbound payload shape.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use uuid::Uuid;

use crate::ledger::types::Transaction;

/// Kinds of events the system announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// A transaction was recorded.
    #[serde(rename = "transaction.created")]
    TransactionCreated,
    /// A pending transaction was approved.
    #[serde(rename = "transaction.approved")]
    TransactionApproved,
    /// A pending transaction was rejected.
    #[serde(rename = "transaction.rejected")]
    TransactionRejected,
    /// A transaction's balance effect was applied.
    #[serde(rename = "transaction.completed")]
    TransactionCompleted,
    /// An approved transaction failed.
    #[serde(rename = "transaction.failed")]
    TransactionFailed,
    /// A completed transaction was reversed.
    #[serde(rename = "transaction.reversed")]
    TransactionReversed,
    /// A customer was registered.
    #[serde(rename = "customer.created")]
    CustomerCreated,
    /// A customer passed KYC.
    #[serde(rename = "customer.kyc_verified")]
    CustomerKycVerified,
    /// A balance account was opened or moved outside a transaction.
    #[serde(rename = "balance.changed")]
    BalanceChanged,
}

impl EventType {
    /// All event types.
    pub const ALL: [Self; 9] = [
        Self::TransactionCreated,
        Self::TransactionApproved,
        Self::TransactionRejected,
        Self::TransactionCompleted,
        Self::TransactionFailed,
        Self::TransactionReversed,
        Self::CustomerCreated,
        Self::CustomerKycVerified,
        Self::BalanceChanged,
    ];

    /// Returns the wire name of the event type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransactionCreated => "transaction.created",
            Self::TransactionApproved => "transaction.approved",
            Self::TransactionRejected => "transaction.rejected",
            Self::TransactionCompleted => "transaction.completed",
            Self::TransactionFailed => "transaction.failed",
            Self::TransactionReversed => "transaction.reversed",
            Self::CustomerCreated => "customer.created",
            Self::CustomerKycVerified => "customer.kyc_verified",
            Self::BalanceChanged => "balance.changed",
        }
    }

    /// Parses an event type from its wire name.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.as_str() == s)
    }

    /// Customer events come from outside the ledger.
    #[must_use]
    pub fn is_customer(&self) -> bool {
        matches!(self, Self::CustomerCreated | Self::CustomerKycVerified)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A published event. Its JSON form is the webhook body and the live payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Unique event id; the outbox key.
    pub id: Uuid,
    /// Event type.
    #[serde(rename = "event")]
    pub event_type: EventType,
    /// Owning company.
    pub company_id: Uuid,
    /// Entity the event is about.
    pub entity_id: Uuid,
    /// Event-specific data.
    pub data: Value,
    /// When the causing change committed.
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    /// Creates an event.
    #[must_use]
    pub fn new(
        event_type: EventType,
        company_id: Uuid,
        entity_id: Uuid,
        data: Value,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            company_id,
            entity_id,
            data,
            occurred_at,
        }
    }

    /// Event for a committed transaction transition.
    ///
    /// `data` is `{"transaction": <snapshot>, "balance_after": <decimal|null>}`.
    #[must_use]
    pub fn for_transaction(
        event_type: EventType,
        tx: &Transaction,
        balance_after: Option<Decimal>,
    ) -> Self {
        Self::new(
            event_type,
            tx.company_id,
            tx.id,
            json!({ "transaction": tx, "balance_after": balance_after }),
            tx.updated_at,
        )
    }

    /// Serialized body, produced once per delivery.
    ///
    /// # Errors
    /// Returns the serializer error if `data` cannot be encoded.
    pub fn to_body(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Live broadcast topic of the owning company.
    #[must_use]
    pub fn topic(&self) -> String {
        dashboard_topic(self.company_id)
    }
}

/// Per-company live broadcast topic.
#[must_use]
pub fn dashboard_topic(company_id: Uuid) -> String {
    format!("admin_dashboard_{company_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        for event in EventType::ALL {
            assert_eq!(EventType::parse(event.as_str()), Some(event));
            assert_eq!(
                serde_json::to_value(event).unwrap(),
                Value::String(event.as_str().to_string())
            );
        }
        assert!(EventType::CustomerKycVerified.is_customer());
        assert!(!EventType::BalanceChanged.is_customer());
    }

    #[test]
    fn test_body_shape() {
        let company = Uuid::new_v4();
        let entity = Uuid::new_v4();
        let event = DomainEvent::new(
            EventType::CustomerCreated,
            company,
            entity,
            json!({"name": "Ama"}),
            Utc::now(),
        );

        let body: Value = serde_json::from_str(&event.to_body().unwrap()).unwrap();
        assert_eq!(body["id"], event.id.to_string());
        assert_eq!(body["event"], "customer.created");
        assert_eq!(body["company_id"], company.to_string());
        assert_eq!(body["entity_id"], entity.to_string());
        assert_eq!(body["data"]["name"], "Ama");
        assert!(body["occurred_at"].is_string());
        assert_eq!(event.topic(), format!("admin_dashboard_{company}"));
    }
}
