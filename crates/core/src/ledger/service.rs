//! Ledger service for transaction validation and state transitions.
//!
//! This module holds the pure rules of the lifecycle: who may perform each
//! transition, from which status, and what the transition writes. Storage
//! and publication are the caller's concern; every function here either
//! returns the next state or a typed failure and never touches the outside.

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::ledger::error::LedgerError;
use crate::ledger::types::{
    Channel, Direction, NewTransaction, ProviderBalance, ReversalRecord, Transaction,
    TransactionStatus,
};
use crate::tenant::{Actor, Branch, Company, CompanySettings, Role, TenantContext};

/// Result of a completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The transaction moves to `Completed` with this state.
    Apply(Transaction),
    /// The transaction was already completed; nothing to do.
    AlreadyCompleted,
}

/// Stateless service for the transaction lifecycle.
///
/// All methods are associated functions that validate a transition against
/// the current state and the actor, returning the new state to persist.
pub struct LedgerService;

impl LedgerService {
    /// Validate a creation request against the company and its accounts.
    ///
    /// # Arguments
    /// * `company` - The acting company
    /// * `branch` - The branch named by the request, if it exists in the company
    /// * `input` - The creation payload
    /// * `account` - The `(branch, provider)` balance account, if opened
    ///
    /// # Errors
    /// * `Validation` for a non-positive amount, a provider outside the channel,
    ///   a foreign or missing branch, or an unopened account
    /// * `InsufficientBalance` for a bank or mobile-money withdrawal the
    ///   account cannot cover when overdraft is off
    pub fn validate_new(
        company: &Company,
        branch: Option<&Branch>,
        input: &NewTransaction,
        account: Option<&ProviderBalance>,
    ) -> Result<(), LedgerError> {
        if input.amount <= Decimal::ZERO {
            return Err(LedgerError::Validation("amount must be positive".into()));
        }
        if input.amount.normalize().scale() > 2 {
            return Err(LedgerError::Validation(
                "amount must have at most 2 decimal places".into(),
            ));
        }
        if input.provider.channel() != input.channel {
            return Err(LedgerError::Validation(format!(
                "provider {} does not serve channel {}",
                input.provider, input.channel
            )));
        }

        match branch {
            Some(b) if b.company_id == company.id && b.id == input.branch_id => {}
            _ => {
                return Err(LedgerError::Validation(format!(
                    "branch {} not found",
                    input.branch_id
                )));
            }
        }

        let Some(account) = account.filter(|a| {
            a.company_id == company.id
                && a.branch_id == input.branch_id
                && a.provider == input.provider
        }) else {
            return Err(LedgerError::Validation(format!(
                "no {} balance account is open at branch {}",
                input.provider, input.branch_id
            )));
        };

        let needs_cover = input.direction == Direction::Out
            && input.channel != Channel::Cash
            && !company.settings.allow_overdraft;
        if needs_cover && account.balance < input.amount {
            return Err(LedgerError::InsufficientBalance {
                available: account.balance,
                required: input.amount,
            });
        }

        Ok(())
    }

    /// Whether an amount is above the company's approval threshold.
    #[must_use]
    pub fn requires_approval(settings: &CompanySettings, amount: Decimal) -> bool {
        amount > settings.require_approval_above
    }

    /// Whether creation may skip the manager decision.
    ///
    /// Needs an amount at or under the threshold, a channel on the company's
    /// auto-approve list, and an initiator at or above the configured role.
    #[must_use]
    pub fn auto_approves(
        settings: &CompanySettings,
        amount: Decimal,
        channel: Channel,
        role: Role,
    ) -> bool {
        !Self::requires_approval(settings, amount)
            && settings.auto_approve_channels.contains(&channel)
            && role.at_least(settings.auto_approve_min_role)
    }

    /// Fee for an amount, rounded to cents.
    #[must_use]
    pub fn fee(settings: &CompanySettings, direction: Direction, amount: Decimal) -> Decimal {
        let percent = match direction {
            Direction::In => settings.deposit_fee_percent,
            Direction::Out => settings.withdrawal_fee_percent,
        };
        (amount * percent / Decimal::ONE_HUNDRED).round_dp(2)
    }

    /// Human-facing reference in the form `TXN-<unix-millis>-<nnn>`.
    #[must_use]
    pub fn generate_reference(now: DateTime<Utc>) -> String {
        let suffix: u16 = rand::rng().random_range(100..=999);
        format!("TXN-{}-{suffix}", now.timestamp_millis())
    }

    /// Build the initial state of a validated transaction.
    ///
    /// The transaction starts `Pending`, or `Approved` with no approver when
    /// the auto-approval rule applies.
    ///
    /// # Errors
    /// * `InsufficientRole` if the caller is below teller
    pub fn build(
        ctx: &TenantContext,
        company: &Company,
        input: NewTransaction,
        now: DateTime<Utc>,
    ) -> Result<Transaction, LedgerError> {
        Self::require_role(ctx.role(), Role::Teller)?;

        let settings = &company.settings;
        let fee = Self::fee(settings, input.direction, input.amount);
        let auto = Self::auto_approves(settings, input.amount, input.channel, ctx.role());

        Ok(Transaction {
            id: Uuid::new_v4(),
            company_id: company.id,
            branch_id: input.branch_id,
            reference: Self::generate_reference(now),
            channel: input.channel,
            direction: input.direction,
            provider: input.provider,
            amount: input.amount,
            fee,
            net_amount: input.amount - fee,
            currency: settings.currency.clone(),
            customer_ref: input.customer_ref,
            description: input.description,
            initiated_by: ctx.membership_id(),
            status: if auto {
                TransactionStatus::Approved
            } else {
                TransactionStatus::Pending
            },
            requires_approval: Self::requires_approval(settings, input.amount),
            approved_by: None,
            approved_at: auto.then_some(now),
            rejection_reason: None,
            failure_reason: None,
            completed_at: None,
            reversed_by: None,
            reversed_at: None,
            reversal_reason: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Approve a pending transaction.
    ///
    /// Checks run in this order: manager rank, self-approval, status, then the
    /// threshold (amounts above it need admin).
    ///
    /// # Errors
    /// * `Unauthorized` for a system actor
    /// * `InsufficientRole` below manager, or below admin over the threshold
    /// * `SelfApproval` if the actor initiated the transaction
    /// * `InvalidState` if not `Pending`
    pub fn approve(
        tx: &Transaction,
        actor: Actor,
        settings: &CompanySettings,
        now: DateTime<Utc>,
    ) -> Result<Transaction, LedgerError> {
        let (member, role) = Self::decider(tx, actor, "approve")?;
        if tx.amount > settings.require_approval_above {
            Self::require_role(role, Role::Admin)?;
        }

        let mut next = tx.clone();
        next.status = TransactionStatus::Approved;
        next.approved_by = Some(member);
        next.approved_at = Some(now);
        next.updated_at = now;
        Ok(next)
    }

    /// Reject a pending transaction.
    ///
    /// # Errors
    /// * `Unauthorized` for a system actor
    /// * `InsufficientRole` below manager
    /// * `SelfApproval` if the actor initiated the transaction
    /// * `InvalidState` if not `Pending`
    pub fn reject(
        tx: &Transaction,
        actor: Actor,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Transaction, LedgerError> {
        let (member, _) = Self::decider(tx, actor, "reject")?;

        let mut next = tx.clone();
        next.status = TransactionStatus::Rejected;
        next.approved_by = Some(member);
        next.rejection_reason = reason.filter(|r| !r.trim().is_empty());
        next.updated_at = now;
        Ok(next)
    }

    /// Complete an approved transaction.
    ///
    /// System actors and managers may complete anything approved; a teller
    /// may only complete their own transaction when it never needed approval.
    ///
    /// # Returns
    /// * `Completion::Apply` with the completed state
    /// * `Completion::AlreadyCompleted` if the transaction is already completed
    ///
    /// # Errors
    /// * `InsufficientRole` if the actor may not complete this transaction
    /// * `InvalidState` if neither `Approved` nor `Completed`
    pub fn complete(
        tx: &Transaction,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> Result<Completion, LedgerError> {
        if let Actor::Member {
            membership_id,
            role,
        } = actor
        {
            let own_auto = membership_id == tx.initiated_by && !tx.requires_approval;
            if !own_auto {
                Self::require_role(role, Role::Manager)?;
            }
        }

        match tx.status {
            TransactionStatus::Completed => Ok(Completion::AlreadyCompleted),
            TransactionStatus::Approved => {
                let mut next = tx.clone();
                next.status = TransactionStatus::Completed;
                next.completed_at = Some(now);
                next.updated_at = now;
                Ok(Completion::Apply(next))
            }
            status => Err(LedgerError::InvalidState {
                status,
                action: "complete",
            }),
        }
    }

    /// Reverse a completed transaction.
    ///
    /// # Returns
    /// The reversed state and the reversal record carrying the negated delta.
    ///
    /// # Errors
    /// * `Unauthorized` for a system actor
    /// * `InsufficientRole` below admin
    /// * `InvalidState` if not `Completed`
    pub fn reverse(
        tx: &Transaction,
        actor: Actor,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(Transaction, ReversalRecord), LedgerError> {
        let Actor::Member {
            membership_id,
            role,
        } = actor
        else {
            return Err(LedgerError::Unauthorized(
                "reversal requires a member actor".into(),
            ));
        };
        Self::require_role(role, Role::Admin)?;
        Self::require_status(tx, TransactionStatus::Completed, "reverse")?;

        let reason = reason.filter(|r| !r.trim().is_empty());
        let mut next = tx.clone();
        next.status = TransactionStatus::Reversed;
        next.reversed_by = Some(membership_id);
        next.reversed_at = Some(now);
        next.reversal_reason.clone_from(&reason);
        next.updated_at = now;

        let record = ReversalRecord {
            id: Uuid::new_v4(),
            company_id: tx.company_id,
            original_transaction_id: tx.id,
            reversed_by: membership_id,
            reason,
            delta: -Self::balance_delta(tx),
            created_at: now,
        };
        Ok((next, record))
    }

    /// Mark an approved transaction as failed. No balance effect.
    ///
    /// # Errors
    /// * `InsufficientRole` for a member below admin
    /// * `InvalidState` if not `Approved`
    pub fn fail(
        tx: &Transaction,
        actor: Actor,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Transaction, LedgerError> {
        if let Some(role) = actor.role() {
            Self::require_role(role, Role::Admin)?;
        }
        Self::require_status(tx, TransactionStatus::Approved, "fail")?;

        let mut next = tx.clone();
        next.status = TransactionStatus::Failed;
        next.failure_reason = reason.filter(|r| !r.trim().is_empty());
        next.updated_at = now;
        Ok(next)
    }

    /// Signed balance effect of completing `tx`: `+amount` in, `-amount` out.
    #[must_use]
    pub fn balance_delta(tx: &Transaction) -> Decimal {
        match tx.direction {
            Direction::In => tx.amount,
            Direction::Out => -tx.amount,
        }
    }

    /// Check if a status transition is valid.
    ///
    /// Valid transitions:
    /// - Pending → Approved (approve)
    /// - Pending → Rejected (reject)
    /// - Approved → Completed (complete)
    /// - Approved → Failed (fail)
    /// - Completed → Reversed (reverse)
    #[must_use]
    pub fn is_valid_transition(from: TransactionStatus, to: TransactionStatus) -> bool {
        matches!(
            (from, to),
            (
                TransactionStatus::Pending,
                TransactionStatus::Approved | TransactionStatus::Rejected
            ) | (
                TransactionStatus::Approved,
                TransactionStatus::Completed | TransactionStatus::Failed
            ) | (TransactionStatus::Completed, TransactionStatus::Reversed)
        )
    }

    /// Shared gate for approve and reject.
    fn decider(
        tx: &Transaction,
        actor: Actor,
        action: &'static str,
    ) -> Result<(Uuid, Role), LedgerError> {
        let Actor::Member {
            membership_id,
            role,
        } = actor
        else {
            return Err(LedgerError::Unauthorized(format!(
                "{action} requires a member actor"
            )));
        };
        Self::require_role(role, Role::Manager)?;
        if membership_id == tx.initiated_by {
            return Err(LedgerError::SelfApproval);
        }
        Self::require_status(tx, TransactionStatus::Pending, action)?;
        Ok((membership_id, role))
    }

    fn require_role(role: Role, required: Role) -> Result<(), LedgerError> {
        if role.at_least(required) {
            Ok(())
        } else {
            Err(LedgerError::InsufficientRole { role, required })
        }
    }

    fn require_status(
        tx: &Transaction,
        expected: TransactionStatus,
        action: &'static str,
    ) -> Result<(), LedgerError> {
        if tx.status == expected {
            Ok(())
        } else {
            Err(LedgerError::InvalidState {
                status: tx.status,
                action,
            })
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ledger::types::Provider;
    use crate::tenant::Membership;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    pub(crate) fn company() -> Company {
        Company {
            id: Uuid::from_u128(1),
            name: "Accra Agents".into(),
            is_active: true,
            settings: CompanySettings::default(),
            created_at: Utc::now(),
        }
    }

    pub(crate) fn member(company_id: Uuid, role: Role) -> Membership {
        Membership {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            company_id,
            role,
            branch_id: None,
            is_active: true,
            company_active: true,
        }
    }

    pub(crate) fn branch(company_id: Uuid) -> Branch {
        Branch {
            id: Uuid::from_u128(10),
            company_id,
            name: "Makola".into(),
        }
    }

    pub(crate) fn input(amount: Decimal, direction: Direction) -> NewTransaction {
        NewTransaction {
            branch_id: Uuid::from_u128(10),
            channel: Channel::Bank,
            direction,
            provider: Provider::Ecobank,
            amount,
            customer_ref: None,
            description: None,
        }
    }

    pub(crate) fn account(company_id: Uuid, balance: Decimal) -> ProviderBalance {
        ProviderBalance {
            id: Uuid::new_v4(),
            company_id,
            branch_id: Uuid::from_u128(10),
            provider: Provider::Ecobank,
            starting_balance: balance,
            balance,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub(crate) fn tx_with(status: TransactionStatus, amount: Decimal) -> Transaction {
        let company = company();
        let teller = member(company.id, Role::Teller);
        let ctx = TenantContext::from_membership(&teller);
        let mut tx =
            LedgerService::build(&ctx, &company, input(amount, Direction::In), Utc::now()).unwrap();
        tx.status = status;
        tx.requires_approval = amount > company.settings.require_approval_above;
        tx
    }

    #[test]
    fn test_small_amount_auto_approves() {
        let company = company();
        let teller = member(company.id, Role::Teller);
        let ctx = TenantContext::from_membership(&teller);

        let tx = LedgerService::build(&ctx, &company, input(dec!(50), Direction::In), Utc::now())
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Approved);
        assert!(tx.approved_by.is_none());
        assert!(tx.approved_at.is_some());
        assert!(!tx.requires_approval);
        assert_eq!(tx.initiated_by, teller.id);
        assert_eq!(tx.currency, "GHS");
    }

    #[rstest]
    #[case(dec!(1000), TransactionStatus::Approved)]
    #[case(dec!(1000.01), TransactionStatus::Pending)]
    #[case(dec!(5000), TransactionStatus::Pending)]
    fn test_threshold_boundary(#[case] amount: Decimal, #[case] expected: TransactionStatus) {
        let company = company();
        let ctx = TenantContext::from_membership(&member(company.id, Role::Teller));
        let tx =
            LedgerService::build(&ctx, &company, input(amount, Direction::In), Utc::now()).unwrap();
        assert_eq!(tx.status, expected);
    }

    #[test]
    fn test_channel_policy_blocks_auto_approval() {
        let mut company = company();
        company.settings.auto_approve_channels = vec![Channel::Cash];
        let ctx = TenantContext::from_membership(&member(company.id, Role::Owner));

        let tx = LedgerService::build(&ctx, &company, input(dec!(10), Direction::In), Utc::now())
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert!(!tx.requires_approval);
    }

    #[test]
    fn test_role_policy_blocks_auto_approval() {
        let mut company = company();
        company.settings.auto_approve_min_role = Role::Manager;
        let ctx = TenantContext::from_membership(&member(company.id, Role::Teller));

        let tx = LedgerService::build(&ctx, &company, input(dec!(10), Direction::In), Utc::now())
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
    }

    #[test]
    fn test_fee_and_net_amount() {
        let mut company = company();
        company.settings.deposit_fee_percent = dec!(1.5);
        company.settings.withdrawal_fee_percent = dec!(2);
        let ctx = TenantContext::from_membership(&member(company.id, Role::Teller));

        let tx = LedgerService::build(&ctx, &company, input(dec!(333), Direction::In), Utc::now())
            .unwrap();
        assert_eq!(tx.fee, dec!(5.00));
        assert_eq!(tx.net_amount, dec!(328.00));
        assert_eq!(
            LedgerService::fee(&company.settings, Direction::Out, dec!(10.55)),
            dec!(0.21)
        );
    }

    #[test]
    fn test_reference_format() {
        let now = Utc::now();
        let reference = LedgerService::generate_reference(now);
        let parts: Vec<&str> = reference.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "TXN");
        assert_eq!(parts[1], now.timestamp_millis().to_string());
        let suffix: u16 = parts[2].parse().unwrap();
        assert!((100..=999).contains(&suffix));
    }

    #[rstest]
    #[case(dec!(0))]
    #[case(dec!(-5))]
    #[case(dec!(1.001))]
    fn test_validate_rejects_bad_amounts(#[case] amount: Decimal) {
        let company = company();
        let acct = account(company.id, dec!(100));
        let result = LedgerService::validate_new(
            &company,
            Some(&branch(company.id)),
            &input(amount, Direction::In),
            Some(&acct),
        );
        assert!(matches!(result, Err(LedgerError::Validation(_))));
    }

    #[rstest]
    #[case(dec!(50.000))]
    #[case(dec!(12.3400))]
    fn test_validate_accepts_trailing_zeros(#[case] amount: Decimal) {
        let company = company();
        let acct = account(company.id, dec!(100));
        let result = LedgerService::validate_new(
            &company,
            Some(&branch(company.id)),
            &input(amount, Direction::In),
            Some(&acct),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_provider_must_match_channel() {
        let company = company();
        let mut req = input(dec!(10), Direction::In);
        req.provider = Provider::Mtn;
        let acct = account(company.id, dec!(100));

        let result =
            LedgerService::validate_new(&company, Some(&branch(company.id)), &req, Some(&acct));
        assert!(matches!(result, Err(LedgerError::Validation(_))));
    }

    #[test]
    fn test_validate_foreign_branch() {
        let company = company();
        let foreign = branch(Uuid::from_u128(2));
        let acct = account(company.id, dec!(100));

        let result = LedgerService::validate_new(
            &company,
            Some(&foreign),
            &input(dec!(10), Direction::In),
            Some(&acct),
        );
        assert!(matches!(result, Err(LedgerError::Validation(_))));
        let result = LedgerService::validate_new(
            &company,
            None,
            &input(dec!(10), Direction::In),
            Some(&acct),
        );
        assert!(matches!(result, Err(LedgerError::Validation(_))));
    }

    #[test]
    fn test_validate_unopened_account() {
        let company = company();
        let result = LedgerService::validate_new(
            &company,
            Some(&branch(company.id)),
            &input(dec!(10), Direction::In),
            None,
        );
        assert!(matches!(result, Err(LedgerError::Validation(_))));
    }

    #[test]
    fn test_validate_withdrawal_cover() {
        let mut company = company();
        let acct = account(company.id, dec!(40));
        let b = branch(company.id);

        let result = LedgerService::validate_new(
            &company,
            Some(&b),
            &input(dec!(50), Direction::Out),
            Some(&acct),
        );
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientBalance { available, required })
                if available == dec!(40) && required == dec!(50)
        ));

        company.settings.allow_overdraft = true;
        assert!(
            LedgerService::validate_new(
                &company,
                Some(&b),
                &input(dec!(50), Direction::Out),
                Some(&acct)
            )
            .is_ok()
        );
    }

    #[test]
    fn test_approve_rules() {
        let tx = tx_with(TransactionStatus::Pending, dec!(5000));
        let settings = CompanySettings::default();
        let now = Utc::now();

        let teller = member(tx.company_id, Role::Teller);
        let manager = member(tx.company_id, Role::Manager);
        let admin = member(tx.company_id, Role::Admin);
        let as_actor = |m: &Membership| TenantContext::from_membership(m).actor();

        assert!(matches!(
            LedgerService::approve(&tx, as_actor(&teller), &settings, now),
            Err(LedgerError::InsufficientRole { required: Role::Manager, .. })
        ));
        assert!(matches!(
            LedgerService::approve(&tx, as_actor(&manager), &settings, now),
            Err(LedgerError::InsufficientRole { required: Role::Admin, .. })
        ));

        let approved = LedgerService::approve(&tx, as_actor(&admin), &settings, now).unwrap();
        assert_eq!(approved.status, TransactionStatus::Approved);
        assert_eq!(approved.approved_by, Some(admin.id));
        assert_eq!(approved.approved_at, Some(now));
    }

    #[test]
    fn test_manager_approves_under_threshold() {
        let tx = tx_with(TransactionStatus::Pending, dec!(900));
        let manager = member(tx.company_id, Role::Manager);
        let actor = TenantContext::from_membership(&manager).actor();

        let approved =
            LedgerService::approve(&tx, actor, &CompanySettings::default(), Utc::now()).unwrap();
        assert_eq!(approved.approved_by, Some(manager.id));
    }

    #[test]
    fn test_self_approval_rejected() {
        let tx = tx_with(TransactionStatus::Pending, dec!(5000));
        let initiator = Actor::Member {
            membership_id: tx.initiated_by,
            role: Role::Owner,
        };

        assert!(matches!(
            LedgerService::approve(&tx, initiator, &CompanySettings::default(), Utc::now()),
            Err(LedgerError::SelfApproval)
        ));
        assert!(matches!(
            LedgerService::reject(&tx, initiator, None, Utc::now()),
            Err(LedgerError::SelfApproval)
        ));
    }

    #[test]
    fn test_system_cannot_decide() {
        let tx = tx_with(TransactionStatus::Pending, dec!(5000));
        assert!(matches!(
            LedgerService::approve(&tx, Actor::System, &CompanySettings::default(), Utc::now()),
            Err(LedgerError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_reject_records_reason() {
        let tx = tx_with(TransactionStatus::Pending, dec!(5000));
        let manager = member(tx.company_id, Role::Manager);
        let actor = TenantContext::from_membership(&manager).actor();

        let rejected =
            LedgerService::reject(&tx, actor, Some("duplicate".into()), Utc::now()).unwrap();
        assert_eq!(rejected.status, TransactionStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("duplicate"));
    }

    #[test]
    fn test_complete_is_idempotent() {
        let tx = tx_with(TransactionStatus::Completed, dec!(10));
        assert_eq!(
            LedgerService::complete(&tx, Actor::System, Utc::now()).unwrap(),
            Completion::AlreadyCompleted
        );
    }

    #[test]
    fn test_complete_permissions() {
        let tx = tx_with(TransactionStatus::Approved, dec!(5000));
        let initiator = Actor::Member {
            membership_id: tx.initiated_by,
            role: Role::Teller,
        };
        assert!(matches!(
            LedgerService::complete(&tx, initiator, Utc::now()),
            Err(LedgerError::InsufficientRole { .. })
        ));

        let small = tx_with(TransactionStatus::Approved, dec!(10));
        let initiator = Actor::Member {
            membership_id: small.initiated_by,
            role: Role::Teller,
        };
        assert!(matches!(
            LedgerService::complete(&small, initiator, Utc::now()),
            Ok(Completion::Apply(next)) if next.status == TransactionStatus::Completed
        ));
        assert!(LedgerService::complete(&tx, Actor::System, Utc::now()).is_ok());
    }

    #[test]
    fn test_reverse_negates_delta() {
        let tx = tx_with(TransactionStatus::Completed, dec!(5000));
        let admin = member(tx.company_id, Role::Admin);
        let actor = TenantContext::from_membership(&admin).actor();

        let (reversed, record) =
            LedgerService::reverse(&tx, actor, Some("customer dispute".into()), Utc::now())
                .unwrap();
        assert_eq!(reversed.status, TransactionStatus::Reversed);
        assert_eq!(reversed.reversed_by, Some(admin.id));
        assert_eq!(record.delta, dec!(-5000));
        assert_eq!(record.original_transaction_id, tx.id);
        assert_eq!(record.delta + LedgerService::balance_delta(&tx), Decimal::ZERO);
    }

    #[test]
    fn test_reverse_needs_admin() {
        let tx = tx_with(TransactionStatus::Completed, dec!(50));
        let manager = member(tx.company_id, Role::Manager);
        let actor = TenantContext::from_membership(&manager).actor();
        assert!(matches!(
            LedgerService::reverse(&tx, actor, None, Utc::now()),
            Err(LedgerError::InsufficientRole { required: Role::Admin, .. })
        ));
    }

    #[test]
    fn test_fail_from_approved_only() {
        let approved = tx_with(TransactionStatus::Approved, dec!(50));
        let failed =
            LedgerService::fail(&approved, Actor::System, Some("provider timeout".into()), Utc::now())
                .unwrap();
        assert_eq!(failed.status, TransactionStatus::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("provider timeout"));

        let pending = tx_with(TransactionStatus::Pending, dec!(50));
        assert!(matches!(
            LedgerService::fail(&pending, Actor::System, None, Utc::now()),
            Err(LedgerError::InvalidState { status: TransactionStatus::Pending, .. })
        ));
    }

    #[test]
    fn test_balance_delta_sign() {
        let mut tx = tx_with(TransactionStatus::Completed, dec!(75));
        assert_eq!(LedgerService::balance_delta(&tx), dec!(75));
        tx.direction = Direction::Out;
        assert_eq!(LedgerService::balance_delta(&tx), dec!(-75));
    }

    #[test]
    fn test_is_valid_transition() {
        use TransactionStatus::{Approved, Completed, Failed, Pending, Rejected, Reversed};

        assert!(LedgerService::is_valid_transition(Pending, Approved));
        assert!(LedgerService::is_valid_transition(Pending, Rejected));
        assert!(LedgerService::is_valid_transition(Approved, Completed));
        assert!(LedgerService::is_valid_transition(Approved, Failed));
        assert!(LedgerService::is_valid_transition(Completed, Reversed));

        assert!(!LedgerService::is_valid_transition(Pending, Completed));
        assert!(!LedgerService::is_valid_transition(Rejected, Approved));
        assert!(!LedgerService::is_valid_transition(Reversed, Completed));
        assert!(!LedgerService::is_valid_transition(Failed, Approved));
    }
}
