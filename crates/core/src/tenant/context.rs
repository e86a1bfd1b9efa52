//! Tenant entities and the resolved request context.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::types::Channel;
use crate::tenant::role::Role;

/// Per-company ledger policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanySettings {
    /// Amounts above this need manager approval before completion.
    pub require_approval_above: Decimal,
    /// Whether provider balances may go negative.
    pub allow_overdraft: bool,
    /// ISO currency code stamped on new transactions.
    pub currency: String,
    /// Fee charged on inbound transactions, in percent.
    pub deposit_fee_percent: Decimal,
    /// Fee charged on outbound transactions, in percent.
    pub withdrawal_fee_percent: Decimal,
    /// Channels eligible for auto-approval under the threshold.
    pub auto_approve_channels: Vec<Channel>,
    /// Lowest initiator role eligible for auto-approval.
    pub auto_approve_min_role: Role,
}

impl Default for CompanySettings {
    fn default() -> Self {
        Self {
            require_approval_above: Decimal::new(1000, 0),
            allow_overdraft: false,
            currency: "GHS".to_string(),
            deposit_fee_percent: Decimal::ZERO,
            withdrawal_fee_percent: Decimal::ZERO,
            auto_approve_channels: Channel::ALL.to_vec(),
            auto_approve_min_role: Role::Teller,
        }
    }
}

/// A tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    /// Company ID.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// False once billing or an operator suspends the company.
    pub is_active: bool,
    /// Ledger policy.
    pub settings: CompanySettings,
    /// Signup time.
    pub created_at: DateTime<Utc>,
}

/// A physical location of a company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    /// Branch ID.
    pub id: Uuid,
    /// Owning company.
    pub company_id: Uuid,
    /// Display name.
    pub name: String,
}

/// A user's role within one company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// Membership ID; this is the actor recorded on transactions and audit entries.
    pub id: Uuid,
    /// The user.
    pub user_id: Uuid,
    /// The company.
    pub company_id: Uuid,
    /// Role within the company.
    pub role: Role,
    /// Home branch, if the member is bound to one.
    pub branch_id: Option<Uuid>,
    /// Membership flag.
    pub is_active: bool,
    /// Whether the owning company is active (not suspended).
    pub company_active: bool,
}

impl Membership {
    /// A membership counts for resolution only if both it and its company are active.
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        self.is_active && self.company_active
    }
}

/// Who performed an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Actor {
    /// A company member acting through a resolved context.
    Member {
        /// Acting membership.
        membership_id: Uuid,
        /// Role at the time of the action.
        role: Role,
    },
    /// Background processing (provider callbacks, schedulers).
    System,
}

impl Actor {
    /// Membership ID for member actors.
    #[must_use]
    pub const fn membership_id(&self) -> Option<Uuid> {
        match self {
            Self::Member { membership_id, .. } => Some(*membership_id),
            Self::System => None,
        }
    }

    /// Role for member actors.
    #[must_use]
    pub const fn role(&self) -> Option<Role> {
        match self {
            Self::Member { role, .. } => Some(*role),
            Self::System => None,
        }
    }

    /// Short label stored alongside audit entries.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Member { .. } => "member",
            Self::System => "system",
        }
    }
}

/// Immutable tenant scope for one request.
///
/// Every engine operation takes this explicitly; nothing downstream can
/// widen or swap the company it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    company_id: Uuid,
    membership_id: Uuid,
    user_id: Uuid,
    role: Role,
    branch_id: Option<Uuid>,
}

impl TenantContext {
    /// Builds a context from a membership the caller holds.
    #[must_use]
    pub fn from_membership(membership: &Membership) -> Self {
        Self {
            company_id: membership.company_id,
            membership_id: membership.id,
            user_id: membership.user_id,
            role: membership.role,
            branch_id: membership.branch_id,
        }
    }

    /// The acting company.
    #[must_use]
    pub const fn company_id(&self) -> Uuid {
        self.company_id
    }

    /// The acting membership.
    #[must_use]
    pub const fn membership_id(&self) -> Uuid {
        self.membership_id
    }

    /// The calling user.
    #[must_use]
    pub const fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// The caller's role in this company.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// The caller's home branch, if any.
    #[must_use]
    pub const fn branch_id(&self) -> Option<Uuid> {
        self.branch_id
    }

    /// The caller as an audit actor.
    #[must_use]
    pub const fn actor(&self) -> Actor {
        Actor::Member {
            membership_id: self.membership_id,
            role: self.role,
        }
    }
}
