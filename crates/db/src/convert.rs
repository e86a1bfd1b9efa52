//! Conversions between `SeaORM` models and domain types.

use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::ActiveValue::{NotSet, Set};
use serde_json::Value;

use merchant_core::audit::{AuditAction, AuditEntry, EntityType};
use merchant_core::closing::DailyClosing;
use merchant_core::events::{DomainEvent, EventType};
use merchant_core::ledger::{
    BalanceMovement, Channel, Direction, MovementKind, Provider, ProviderBalance, ReversalRecord,
    Transaction, TransactionStatus,
};
use merchant_core::tenant::{Actor, Branch, Company, CompanySettings, Membership, Role};
use merchant_core::webhook::{DeliveryStatus, WebhookDelivery, WebhookEndpoint};

use crate::entities::{
    audit_entries, balance_movements, branches, companies, daily_closings, event_outbox,
    memberships, provider_balances, reversals, sea_orm_active_enums as db, transactions, webhook_deliveries,
    webhook_endpoints,
};

pub(crate) fn utc(at: DateTime<FixedOffset>) -> DateTime<Utc> {
    at.with_timezone(&Utc)
}

pub(crate) fn fixed(at: DateTime<Utc>) -> DateTime<FixedOffset> {
    at.fixed_offset()
}

fn to_u32(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

// ============================================================================
// Enums
// ============================================================================

impl From<db::MemberRole> for Role {
    fn from(value: db::MemberRole) -> Self {
        match value {
            db::MemberRole::Teller => Self::Teller,
            db::MemberRole::Manager => Self::Manager,
            db::MemberRole::Admin => Self::Admin,
            db::MemberRole::Owner => Self::Owner,
        }
    }
}

impl From<Role> for db::MemberRole {
    fn from(value: Role) -> Self {
        match value {
            Role::Teller => Self::Teller,
            Role::Manager => Self::Manager,
            Role::Admin => Self::Admin,
            Role::Owner => Self::Owner,
        }
    }
}

impl From<db::TransactionStatus> for TransactionStatus {
    fn from(value: db::TransactionStatus) -> Self {
        match value {
            db::TransactionStatus::Pending => Self::Pending,
            db::TransactionStatus::Approved => Self::Approved,
            db::TransactionStatus::Rejected => Self::Rejected,
            db::TransactionStatus::Completed => Self::Completed,
            db::TransactionStatus::Failed => Self::Failed,
            db::TransactionStatus::Reversed => Self::Reversed,
        }
    }
}

impl From<TransactionStatus> for db::TransactionStatus {
    fn from(value: TransactionStatus) -> Self {
        match value {
            TransactionStatus::Pending => Self::Pending,
            TransactionStatus::Approved => Self::Approved,
            TransactionStatus::Rejected => Self::Rejected,
            TransactionStatus::Completed => Self::Completed,
            TransactionStatus::Failed => Self::Failed,
            TransactionStatus::Reversed => Self::Reversed,
        }
    }
}

impl From<db::TransactionChannel> for Channel {
    fn from(value: db::TransactionChannel) -> Self {
        match value {
            db::TransactionChannel::Bank => Self::Bank,
            db::TransactionChannel::MobileMoney => Self::MobileMoney,
            db::TransactionChannel::Cash => Self::Cash,
        }
    }
}

impl From<Channel> for db::TransactionChannel {
    fn from(value: Channel) -> Self {
        match value {
            Channel::Bank => Self::Bank,
            Channel::MobileMoney => Self::MobileMoney,
            Channel::Cash => Self::Cash,
        }
    }
}

impl From<db::TransactionDirection> for Direction {
    fn from(value: db::TransactionDirection) -> Self {
        match value {
            db::TransactionDirection::In => Self::In,
            db::TransactionDirection::Out => Self::Out,
        }
    }
}

impl From<Direction> for db::TransactionDirection {
    fn from(value: Direction) -> Self {
        match value {
            Direction::In => Self::In,
            Direction::Out => Self::Out,
        }
    }
}

impl From<db::ProviderCode> for Provider {
    fn from(value: db::ProviderCode) -> Self {
        match value {
            db::ProviderCode::Mtn => Self::Mtn,
            db::ProviderCode::Vodafone => Self::Vodafone,
            db::ProviderCode::Airtel => Self::Airtel,
            db::ProviderCode::Tigo => Self::Tigo,
            db::ProviderCode::Ecobank => Self::Ecobank,
            db::ProviderCode::Fidelity => Self::Fidelity,
            db::ProviderCode::CalBank => Self::CalBank,
            db::ProviderCode::Cash => Self::Cash,
        }
    }
}

impl From<Provider> for db::ProviderCode {
    fn from(value: Provider) -> Self {
        match value {
            Provider::Mtn => Self::Mtn,
            Provider::Vodafone => Self::Vodafone,
            Provider::Airtel => Self::Airtel,
            Provider::Tigo => Self::Tigo,
            Provider::Ecobank => Self::Ecobank,
            Provider::Fidelity => Self::Fidelity,
            Provider::CalBank => Self::CalBank,
            Provider::Cash => Self::Cash,
        }
    }
}

impl From<db::MovementKind> for MovementKind {
    fn from(value: db::MovementKind) -> Self {
        match value {
            db::MovementKind::Opening => Self::Opening,
            db::MovementKind::Completion => Self::Completion,
            db::MovementKind::Reversal => Self::Reversal,
        }
    }
}

impl From<MovementKind> for db::MovementKind {
    fn from(value: MovementKind) -> Self {
        match value {
            MovementKind::Opening => Self::Opening,
            MovementKind::Completion => Self::Completion,
            MovementKind::Reversal => Self::Reversal,
        }
    }
}

impl From<db::DeliveryStatus> for DeliveryStatus {
    fn from(value: db::DeliveryStatus) -> Self {
        match value {
            db::DeliveryStatus::Pending => Self::Pending,
            db::DeliveryStatus::Delivered => Self::Delivered,
            db::DeliveryStatus::Failed => Self::Failed,
            db::DeliveryStatus::Exhausted => Self::Exhausted,
        }
    }
}

impl From<DeliveryStatus> for db::DeliveryStatus {
    fn from(value: DeliveryStatus) -> Self {
        match value {
            DeliveryStatus::Pending => Self::Pending,
            DeliveryStatus::Delivered => Self::Delivered,
            DeliveryStatus::Failed => Self::Failed,
            DeliveryStatus::Exhausted => Self::Exhausted,
        }
    }
}

// ============================================================================
// Tenants
// ============================================================================

pub(crate) fn company(model: companies::Model) -> Result<Company, serde_json::Error> {
    let settings: CompanySettings = serde_json::from_value(model.settings)?;
    Ok(Company {
        id: model.id,
        name: model.name,
        is_active: model.is_active,
        settings,
        created_at: utc(model.created_at),
    })
}

pub(crate) fn company_active(company: &Company) -> Result<companies::ActiveModel, serde_json::Error> {
    Ok(companies::ActiveModel {
        id: Set(company.id),
        name: Set(company.name.clone()),
        is_active: Set(company.is_active),
        settings: Set(serde_json::to_value(&company.settings)?),
        created_at: Set(fixed(company.created_at)),
        updated_at: Set(fixed(company.created_at)),
    })
}

pub(crate) fn branch(model: branches::Model) -> Branch {
    Branch {
        id: model.id,
        company_id: model.company_id,
        name: model.name,
    }
}

pub(crate) fn membership(model: memberships::Model, company_active: bool) -> Membership {
    Membership {
        id: model.id,
        user_id: model.user_id,
        company_id: model.company_id,
        role: model.role.into(),
        branch_id: model.branch_id,
        is_active: model.is_active,
        company_active,
    }
}

// ============================================================================
// Ledger
// ============================================================================

pub(crate) fn transaction(model: transactions::Model) -> Transaction {
    Transaction {
        id: model.id,
        company_id: model.company_id,
        branch_id: model.branch_id,
        reference: model.reference,
        channel: model.channel.into(),
        direction: model.direction.into(),
        provider: model.provider.into(),
        amount: model.amount,
        fee: model.fee,
        net_amount: model.net_amount,
        currency: model.currency,
        customer_ref: model.customer_ref,
        description: model.description,
        initiated_by: model.initiated_by,
        status: model.status.into(),
        requires_approval: model.requires_approval,
        approved_by: model.approved_by,
        approved_at: model.approved_at.map(utc),
        rejection_reason: model.rejection_reason,
        failure_reason: model.failure_reason,
        completed_at: model.completed_at.map(utc),
        reversed_by: model.reversed_by,
        reversed_at: model.reversed_at.map(utc),
        reversal_reason: model.reversal_reason,
        created_at: utc(model.created_at),
        updated_at: utc(model.updated_at),
    }
}

pub(crate) fn transaction_active(tx: &Transaction) -> transactions::ActiveModel {
    transactions::ActiveModel {
        id: Set(tx.id),
        company_id: Set(tx.company_id),
        branch_id: Set(tx.branch_id),
        reference: Set(tx.reference.clone()),
        channel: Set(tx.channel.into()),
        direction: Set(tx.direction.into()),
        provider: Set(tx.provider.into()),
        amount: Set(tx.amount),
        fee: Set(tx.fee),
        net_amount: Set(tx.net_amount),
        currency: Set(tx.currency.clone()),
        customer_ref: Set(tx.customer_ref.clone()),
        description: Set(tx.description.clone()),
        initiated_by: Set(tx.initiated_by),
        status: Set(tx.status.into()),
        requires_approval: Set(tx.requires_approval),
        approved_by: Set(tx.approved_by),
        approved_at: Set(tx.approved_at.map(fixed)),
        rejection_reason: Set(tx.rejection_reason.clone()),
        failure_reason: Set(tx.failure_reason.clone()),
        completed_at: Set(tx.completed_at.map(fixed)),
        reversed_by: Set(tx.reversed_by),
        reversed_at: Set(tx.reversed_at.map(fixed)),
        reversal_reason: Set(tx.reversal_reason.clone()),
        created_at: Set(fixed(tx.created_at)),
        updated_at: Set(fixed(tx.updated_at)),
    }
}

pub(crate) fn provider_balance(model: provider_balances::Model) -> ProviderBalance {
    ProviderBalance {
        id: model.id,
        company_id: model.company_id,
        branch_id: model.branch_id,
        provider: model.provider.into(),
        starting_balance: model.starting_balance,
        balance: model.balance,
        created_at: utc(model.created_at),
        updated_at: utc(model.updated_at),
    }
}

pub(crate) fn provider_balance_active(balance: &ProviderBalance) -> provider_balances::ActiveModel {
    provider_balances::ActiveModel {
        id: Set(balance.id),
        company_id: Set(balance.company_id),
        branch_id: Set(balance.branch_id),
        provider: Set(balance.provider.into()),
        starting_balance: Set(balance.starting_balance),
        balance: Set(balance.balance),
        created_at: Set(fixed(balance.created_at)),
        updated_at: Set(fixed(balance.updated_at)),
    }
}

pub(crate) fn movement(model: balance_movements::Model) -> BalanceMovement {
    BalanceMovement {
        id: model.id,
        company_id: model.company_id,
        branch_id: model.branch_id,
        provider: model.provider.into(),
        transaction_id: model.transaction_id,
        kind: model.kind.into(),
        delta: model.delta,
        balance_after: model.balance_after,
        created_at: utc(model.created_at),
    }
}

pub(crate) fn movement_active(movement: &BalanceMovement) -> balance_movements::ActiveModel {
    balance_movements::ActiveModel {
        id: Set(movement.id),
        seq: NotSet,
        company_id: Set(movement.company_id),
        branch_id: Set(movement.branch_id),
        provider: Set(movement.provider.into()),
        transaction_id: Set(movement.transaction_id),
        kind: Set(movement.kind.into()),
        delta: Set(movement.delta),
        balance_after: Set(movement.balance_after),
        created_at: Set(fixed(movement.created_at)),
    }
}

pub(crate) fn reversal(model: reversals::Model) -> ReversalRecord {
    ReversalRecord {
        id: model.id,
        company_id: model.company_id,
        original_transaction_id: model.original_transaction_id,
        reversed_by: model.reversed_by,
        reason: model.reason,
        delta: model.delta,
        created_at: utc(model.created_at),
    }
}

pub(crate) fn reversal_active(record: &ReversalRecord) -> reversals::ActiveModel {
    reversals::ActiveModel {
        id: Set(record.id),
        company_id: Set(record.company_id),
        original_transaction_id: Set(record.original_transaction_id),
        reversed_by: Set(record.reversed_by),
        reason: Set(record.reason.clone()),
        delta: Set(record.delta),
        created_at: Set(fixed(record.created_at)),
    }
}

// ============================================================================
// Audit
// ============================================================================

/// Rebuilds an audit entry; `None` if a stored label is unknown.
pub(crate) fn audit_entry(model: audit_entries::Model) -> Option<AuditEntry> {
    let actor = match (model.actor_kind.as_str(), model.actor_membership_id, model.actor_role) {
        ("member", Some(membership_id), Some(role)) => Actor::Member {
            membership_id,
            role: role.into(),
        },
        ("system", _, _) => Actor::System,
        _ => return None,
    };

    Some(AuditEntry {
        id: model.id,
        company_id: model.company_id,
        sequence: model.sequence,
        actor,
        entity_type: EntityType::parse(&model.entity_type)?,
        entity_id: model.entity_id,
        action: AuditAction::parse(&model.action)?,
        before: model.before,
        after: model.after,
        created_at: utc(model.created_at),
    })
}

pub(crate) fn audit_entry_active(entry: &AuditEntry) -> audit_entries::ActiveModel {
    audit_entries::ActiveModel {
        id: Set(entry.id),
        sequence: NotSet,
        company_id: Set(entry.company_id),
        actor_kind: Set(entry.actor.kind().to_string()),
        actor_membership_id: Set(entry.actor.membership_id()),
        actor_role: Set(entry.actor.role().map(Into::into)),
        entity_type: Set(entry.entity_type.as_str().to_string()),
        entity_id: Set(entry.entity_id),
        action: Set(entry.action.as_str().to_string()),
        before: Set(entry.before.clone()),
        after: Set(entry.after.clone()),
        created_at: Set(fixed(entry.created_at)),
    }
}

// ============================================================================
// Webhooks
// ============================================================================

fn event_types(value: &Value) -> Vec<EventType> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .filter_map(EventType::parse)
                .collect()
        })
        .unwrap_or_default()
}

fn event_types_value(events: &[EventType]) -> Value {
    Value::Array(
        events
            .iter()
            .map(|e| Value::String(e.as_str().to_string()))
            .collect(),
    )
}

pub(crate) fn endpoint(model: webhook_endpoints::Model) -> WebhookEndpoint {
    WebhookEndpoint {
        id: model.id,
        company_id: model.company_id,
        url: model.url,
        secret: model.secret,
        events: event_types(&model.events),
        is_active: model.is_active,
        failure_count: to_u32(model.failure_count),
        last_attempt_at: model.last_attempt_at.map(utc),
        created_at: utc(model.created_at),
        updated_at: utc(model.updated_at),
    }
}

pub(crate) fn endpoint_active(endpoint: &WebhookEndpoint) -> webhook_endpoints::ActiveModel {
    webhook_endpoints::ActiveModel {
        id: Set(endpoint.id),
        company_id: Set(endpoint.company_id),
        url: Set(endpoint.url.clone()),
        secret: Set(endpoint.secret.clone()),
        events: Set(event_types_value(&endpoint.events)),
        is_active: Set(endpoint.is_active),
        failure_count: Set(to_i32(endpoint.failure_count)),
        last_attempt_at: Set(endpoint.last_attempt_at.map(fixed)),
        created_at: Set(fixed(endpoint.created_at)),
        updated_at: Set(fixed(endpoint.updated_at)),
    }
}

/// Rebuilds a delivery; `None` if the stored event type is unknown.
pub(crate) fn delivery(model: webhook_deliveries::Model) -> Option<WebhookDelivery> {
    Some(WebhookDelivery {
        id: model.id,
        company_id: model.company_id,
        endpoint_id: model.endpoint_id,
        event_type: EventType::parse(&model.event_type)?,
        entity_id: model.entity_id,
        payload: model.payload,
        attempts: to_u32(model.attempts),
        status: model.status.into(),
        next_attempt_at: model.next_attempt_at.map(utc),
        last_error: model.last_error,
        last_status_code: model.last_status_code.and_then(|c| u16::try_from(c).ok()),
        delivered_at: model.delivered_at.map(utc),
        created_at: utc(model.created_at),
        updated_at: utc(model.updated_at),
    })
}

pub(crate) fn delivery_active(delivery: &WebhookDelivery) -> webhook_deliveries::ActiveModel {
    webhook_deliveries::ActiveModel {
        id: Set(delivery.id),
        company_id: Set(delivery.company_id),
        endpoint_id: Set(delivery.endpoint_id),
        event_type: Set(delivery.event_type.as_str().to_string()),
        entity_id: Set(delivery.entity_id),
        payload: Set(delivery.payload.clone()),
        attempts: Set(to_i32(delivery.attempts)),
        status: Set(delivery.status.into()),
        next_attempt_at: Set(delivery.next_attempt_at.map(fixed)),
        last_error: Set(delivery.last_error.clone()),
        last_status_code: Set(delivery.last_status_code.map(i32::from)),
        delivered_at: Set(delivery.delivered_at.map(fixed)),
        claim_token: Set(None),
        claimed_until: Set(None),
        created_at: Set(fixed(delivery.created_at)),
        updated_at: Set(fixed(delivery.updated_at)),
    }
}

// ============================================================================
// Outbox
// ============================================================================

pub(crate) fn outbox_active(
    event: &DomainEvent,
    fanned_out_at: Option<DateTime<Utc>>,
) -> Result<event_outbox::ActiveModel, serde_json::Error> {
    Ok(event_outbox::ActiveModel {
        id: Set(event.id),
        company_id: Set(event.company_id),
        event_type: Set(event.event_type.as_str().to_string()),
        entity_id: Set(event.entity_id),
        payload: Set(event.to_body()?),
        occurred_at: Set(fixed(event.occurred_at)),
        fanned_out_at: Set(fanned_out_at.map(fixed)),
        last_error: Set(None),
    })
}

pub(crate) fn outbox_event(model: &event_outbox::Model) -> Result<DomainEvent, serde_json::Error> {
    serde_json::from_str(&model.payload)
}

// ============================================================================
// Closings
// ============================================================================

pub(crate) fn closing(model: daily_closings::Model) -> DailyClosing {
    DailyClosing {
        id: model.id,
        company_id: model.company_id,
        branch_id: model.branch_id,
        provider: model.provider.into(),
        date: model.date,
        window_start: utc(model.window_start),
        window_end: utc(model.window_end),
        opening_balance: model.opening_balance,
        closing_balance: model.closing_balance,
        transaction_count: to_u32(model.transaction_count),
        live_balance: model.live_balance,
        discrepancy: model.discrepancy,
        created_at: utc(model.created_at),
        recomputed_at: model.recomputed_at.map(utc),
    }
}

pub(crate) fn closing_active(closing: &DailyClosing) -> daily_closings::ActiveModel {
    daily_closings::ActiveModel {
        id: Set(closing.id),
        company_id: Set(closing.company_id),
        branch_id: Set(closing.branch_id),
        provider: Set(closing.provider.into()),
        date: Set(closing.date),
        window_start: Set(fixed(closing.window_start)),
        window_end: Set(fixed(closing.window_end)),
        opening_balance: Set(closing.opening_balance),
        closing_balance: Set(closing.closing_balance),
        transaction_count: Set(to_i32(closing.transaction_count)),
        live_balance: Set(closing.live_balance),
        discrepancy: Set(closing.discrepancy),
        created_at: Set(fixed(closing.created_at)),
        recomputed_at: Set(closing.recomputed_at.map(fixed)),
    }
}
