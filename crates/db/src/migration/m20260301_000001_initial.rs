//! Initial database migration.
//!
//! Creates the enums, tenant tables, ledger tables, audit log, webhook queue,
//! daily closings, the audit immutability trigger, and row-level security.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: ENUMS
        // ============================================================
        db.execute_unprepared(ENUMS_SQL).await?;

        // ============================================================
        // PART 2: TENANTS
        // ============================================================
        db.execute_unprepared(TENANTS_SQL).await?;

        // ============================================================
        // PART 3: LEDGER
        // ============================================================
        db.execute_unprepared(LEDGER_SQL).await?;

        // ============================================================
        // PART 4: AUDIT LOG
        // ============================================================
        db.execute_unprepared(AUDIT_SQL).await?;

        // ============================================================
        // PART 5: WEBHOOKS
        // ============================================================
        db.execute_unprepared(WEBHOOKS_SQL).await?;

        // ============================================================
        // PART 6: DAILY CLOSINGS
        // ============================================================
        db.execute_unprepared(CLOSINGS_SQL).await?;

        // ============================================================
        // PART 7: ROW-LEVEL SECURITY
        // ============================================================
        db.execute_unprepared(RLS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

// ============================================================
// SQL CONSTANTS
// ============================================================

const ENUMS_SQL: &str = r"
CREATE TYPE member_role AS ENUM ('teller', 'manager', 'admin', 'owner');

CREATE TYPE transaction_status AS ENUM (
    'pending',
    'approved',
    'rejected',
    'completed',
    'failed',
    'reversed'
);

CREATE TYPE transaction_channel AS ENUM ('bank', 'mobile_money', 'cash');

CREATE TYPE transaction_direction AS ENUM ('in', 'out');

CREATE TYPE provider_code AS ENUM (
    'mtn',
    'vodafone',
    'airtel',
    'tigo',
    'ecobank',
    'fidelity',
    'cal_bank',
    'cash'
);

CREATE TYPE movement_kind AS ENUM ('opening', 'completion', 'reversal');

CREATE TYPE delivery_status AS ENUM ('pending', 'delivered', 'failed', 'exhausted');
";

const TENANTS_SQL: &str = r"
CREATE TABLE companies (
    id              UUID PRIMARY KEY,
    name            VARCHAR(255) NOT NULL,
    is_active       BOOLEAN NOT NULL DEFAULT true,
    settings        JSONB NOT NULL DEFAULT '{}'::JSONB,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE branches (
    id              UUID PRIMARY KEY,
    company_id      UUID NOT NULL REFERENCES companies(id) ON DELETE RESTRICT,
    name            VARCHAR(255) NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX idx_branches_company ON branches(company_id);

CREATE TABLE memberships (
    id              UUID PRIMARY KEY,
    user_id         UUID NOT NULL,
    company_id      UUID NOT NULL REFERENCES companies(id) ON DELETE RESTRICT,
    role            member_role NOT NULL,
    branch_id       UUID REFERENCES branches(id),
    is_active       BOOLEAN NOT NULL DEFAULT true,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT uq_memberships_user_company UNIQUE (user_id, company_id)
);

CREATE INDEX idx_memberships_user ON memberships(user_id);
";

const LEDGER_SQL: &str = r"
CREATE TABLE provider_balances (
    id                  UUID PRIMARY KEY,
    company_id          UUID NOT NULL REFERENCES companies(id) ON DELETE RESTRICT,
    branch_id           UUID NOT NULL REFERENCES branches(id),
    provider            provider_code NOT NULL,
    starting_balance    NUMERIC(14, 2) NOT NULL,
    balance             NUMERIC(14, 2) NOT NULL,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT uq_provider_balances_account UNIQUE (company_id, branch_id, provider)
);

CREATE TABLE transactions (
    id                  UUID PRIMARY KEY,
    company_id          UUID NOT NULL REFERENCES companies(id) ON DELETE RESTRICT,
    branch_id           UUID NOT NULL REFERENCES branches(id),
    reference           VARCHAR(32) NOT NULL UNIQUE,
    channel             transaction_channel NOT NULL,
    direction           transaction_direction NOT NULL,
    provider            provider_code NOT NULL,
    amount              NUMERIC(14, 2) NOT NULL CHECK (amount > 0),
    fee                 NUMERIC(14, 2) NOT NULL DEFAULT 0,
    net_amount          NUMERIC(14, 2) NOT NULL,
    currency            VARCHAR(3) NOT NULL,
    customer_ref        VARCHAR(100),
    description         TEXT,
    initiated_by        UUID NOT NULL REFERENCES memberships(id),
    status              transaction_status NOT NULL DEFAULT 'pending',
    requires_approval   BOOLEAN NOT NULL DEFAULT false,
    approved_by         UUID REFERENCES memberships(id),
    approved_at         TIMESTAMPTZ,
    rejection_reason    TEXT,
    failure_reason      TEXT,
    completed_at        TIMESTAMPTZ,
    reversed_by         UUID REFERENCES memberships(id),
    reversed_at         TIMESTAMPTZ,
    reversal_reason     TEXT,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX idx_transactions_company_created ON transactions(company_id, created_at DESC);
CREATE INDEX idx_transactions_company_status ON transactions(company_id, status);

CREATE TABLE balance_movements (
    id                  UUID PRIMARY KEY,
    seq                 BIGSERIAL NOT NULL,
    company_id          UUID NOT NULL REFERENCES companies(id) ON DELETE RESTRICT,
    branch_id           UUID NOT NULL REFERENCES branches(id),
    provider            provider_code NOT NULL,
    transaction_id      UUID REFERENCES transactions(id),
    kind                movement_kind NOT NULL,
    delta               NUMERIC(14, 2) NOT NULL,
    balance_after       NUMERIC(14, 2) NOT NULL,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX idx_balance_movements_account
    ON balance_movements(company_id, branch_id, provider, created_at, seq);

CREATE TABLE reversals (
    id                          UUID PRIMARY KEY,
    company_id                  UUID NOT NULL REFERENCES companies(id) ON DELETE RESTRICT,
    original_transaction_id     UUID NOT NULL UNIQUE REFERENCES transactions(id),
    reversed_by                 UUID NOT NULL REFERENCES memberships(id),
    reason                      TEXT,
    delta                       NUMERIC(14, 2) NOT NULL,
    created_at                  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
";

const AUDIT_SQL: &str = r"
CREATE TABLE audit_entries (
    id                      UUID PRIMARY KEY,
    sequence                BIGSERIAL NOT NULL,
    company_id              UUID NOT NULL REFERENCES companies(id) ON DELETE RESTRICT,
    actor_kind              VARCHAR(16) NOT NULL,
    actor_membership_id     UUID,
    actor_role              member_role,
    entity_type             VARCHAR(32) NOT NULL,
    entity_id               UUID NOT NULL,
    action                  VARCHAR(32) NOT NULL,
    before                  JSONB,
    after                   JSONB,
    created_at              TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX idx_audit_entries_company_sequence ON audit_entries(company_id, sequence);
CREATE INDEX idx_audit_entries_entity ON audit_entries(company_id, entity_id, sequence);

CREATE OR REPLACE FUNCTION reject_audit_mutation()
RETURNS TRIGGER AS $$
BEGIN
    RAISE EXCEPTION 'Audit entries are append-only';
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_audit_entries_immutable
BEFORE UPDATE OR DELETE ON audit_entries
FOR EACH ROW
EXECUTE FUNCTION reject_audit_mutation();
";

const WEBHOOKS_SQL: &str = r"
CREATE TABLE webhook_endpoints (
    id                  UUID PRIMARY KEY,
    company_id          UUID NOT NULL REFERENCES companies(id) ON DELETE RESTRICT,
    url                 VARCHAR(500) NOT NULL,
    secret              VARCHAR(128) NOT NULL,
    events              JSONB NOT NULL DEFAULT '[]'::JSONB,
    is_active           BOOLEAN NOT NULL DEFAULT true,
    failure_count       INTEGER NOT NULL DEFAULT 0,
    last_attempt_at     TIMESTAMPTZ,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX idx_webhook_endpoints_company ON webhook_endpoints(company_id);

CREATE TABLE webhook_deliveries (
    id                  UUID PRIMARY KEY,
    company_id          UUID NOT NULL REFERENCES companies(id) ON DELETE RESTRICT,
    endpoint_id         UUID NOT NULL REFERENCES webhook_endpoints(id),
    event_type          VARCHAR(64) NOT NULL,
    entity_id           UUID NOT NULL,
    payload             TEXT NOT NULL,
    attempts            INTEGER NOT NULL DEFAULT 0,
    status              delivery_status NOT NULL DEFAULT 'pending',
    next_attempt_at     TIMESTAMPTZ,
    last_error          TEXT,
    last_status_code    INTEGER,
    delivered_at        TIMESTAMPTZ,
    claim_token         UUID,
    claimed_until       TIMESTAMPTZ,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX idx_webhook_deliveries_due
    ON webhook_deliveries(next_attempt_at)
    WHERE status IN ('pending', 'failed');
CREATE INDEX idx_webhook_deliveries_endpoint
    ON webhook_deliveries(endpoint_id, created_at DESC);

-- Events written by the committing transaction, drained by webhook fan-out.
CREATE TABLE event_outbox (
    id                  UUID PRIMARY KEY,
    company_id          UUID NOT NULL REFERENCES companies(id) ON DELETE RESTRICT,
    event_type          VARCHAR(64) NOT NULL,
    entity_id           UUID NOT NULL,
    payload             TEXT NOT NULL,
    occurred_at         TIMESTAMPTZ NOT NULL,
    fanned_out_at       TIMESTAMPTZ,
    last_error          TEXT
);

CREATE INDEX idx_event_outbox_pending
    ON event_outbox(occurred_at)
    WHERE fanned_out_at IS NULL;
";

const CLOSINGS_SQL: &str = r"
CREATE TABLE daily_closings (
    id                  UUID PRIMARY KEY,
    company_id          UUID NOT NULL REFERENCES companies(id) ON DELETE RESTRICT,
    branch_id           UUID NOT NULL REFERENCES branches(id),
    provider            provider_code NOT NULL,
    date                DATE NOT NULL,
    window_start        TIMESTAMPTZ NOT NULL,
    window_end          TIMESTAMPTZ NOT NULL,
    opening_balance     NUMERIC(14, 2) NOT NULL,
    closing_balance     NUMERIC(14, 2) NOT NULL,
    transaction_count   INTEGER NOT NULL DEFAULT 0,
    live_balance        NUMERIC(14, 2) NOT NULL,
    discrepancy         NUMERIC(14, 2) NOT NULL,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    recomputed_at       TIMESTAMPTZ,

    CONSTRAINT uq_daily_closings_account_date UNIQUE (company_id, branch_id, provider, date)
);
";

const RLS_SQL: &str = r"
-- ============================================================
-- ROW-LEVEL SECURITY POLICIES
-- Requests run with SET LOCAL app.current_company_id = '<uuid>';
-- cross-tenant background passes run with SET LOCAL app.system_scope = 'on'.
-- ============================================================

ALTER TABLE companies ENABLE ROW LEVEL SECURITY;
ALTER TABLE branches ENABLE ROW LEVEL SECURITY;
ALTER TABLE memberships ENABLE ROW LEVEL SECURITY;
ALTER TABLE provider_balances ENABLE ROW LEVEL SECURITY;
ALTER TABLE transactions ENABLE ROW LEVEL SECURITY;
ALTER TABLE balance_movements ENABLE ROW LEVEL SECURITY;
ALTER TABLE reversals ENABLE ROW LEVEL SECURITY;
ALTER TABLE audit_entries ENABLE ROW LEVEL SECURITY;
ALTER TABLE webhook_endpoints ENABLE ROW LEVEL SECURITY;
ALTER TABLE webhook_deliveries ENABLE ROW LEVEL SECURITY;
ALTER TABLE event_outbox ENABLE ROW LEVEL SECURITY;
ALTER TABLE daily_closings ENABLE ROW LEVEL SECURITY;

CREATE POLICY tenant_isolation ON companies
    USING (
        id = NULLIF(current_setting('app.current_company_id', true), '')::UUID
        OR current_setting('app.system_scope', true) = 'on'
    );

CREATE POLICY tenant_isolation ON branches
    USING (
        company_id = NULLIF(current_setting('app.current_company_id', true), '')::UUID
        OR current_setting('app.system_scope', true) = 'on'
    );

CREATE POLICY tenant_isolation ON memberships
    USING (
        company_id = NULLIF(current_setting('app.current_company_id', true), '')::UUID
        OR current_setting('app.system_scope', true) = 'on'
    );

CREATE POLICY tenant_isolation ON provider_balances
    USING (
        company_id = NULLIF(current_setting('app.current_company_id', true), '')::UUID
        OR current_setting('app.system_scope', true) = 'on'
    );

CREATE POLICY tenant_isolation ON transactions
    USING (
        company_id = NULLIF(current_setting('app.current_company_id', true), '')::UUID
        OR current_setting('app.system_scope', true) = 'on'
    );

CREATE POLICY tenant_isolation ON balance_movements
    USING (
        company_id = NULLIF(current_setting('app.current_company_id', true), '')::UUID
        OR current_setting('app.system_scope', true) = 'on'
    );

CREATE POLICY tenant_isolation ON reversals
    USING (
        company_id = NULLIF(current_setting('app.current_company_id', true), '')::UUID
        OR current_setting('app.system_scope', true) = 'on'
    );

CREATE POLICY tenant_isolation ON audit_entries
    USING (
        company_id = NULLIF(current_setting('app.current_company_id', true), '')::UUID
        OR current_setting('app.system_scope', true) = 'on'
    );

CREATE POLICY tenant_isolation ON webhook_endpoints
    USING (
        company_id = NULLIF(current_setting('app.current_company_id', true), '')::UUID
        OR current_setting('app.system_scope', true) = 'on'
    );

CREATE POLICY tenant_isolation ON webhook_deliveries
    USING (
        company_id = NULLIF(current_setting('app.current_company_id', true), '')::UUID
        OR current_setting('app.system_scope', true) = 'on'
    );

CREATE POLICY tenant_isolation ON event_outbox
    USING (
        company_id = NULLIF(current_setting('app.current_company_id', true), '')::UUID
        OR current_setting('app.system_scope', true) = 'on'
    );

CREATE POLICY tenant_isolation ON daily_closings
    USING (
        company_id = NULLIF(current_setting('app.current_company_id', true), '')::UUID
        OR current_setting('app.system_scope', true) = 'on'
    );
";

const DROP_ALL_SQL: &str = r"
DROP TABLE IF EXISTS daily_closings CASCADE;
DROP TABLE IF EXISTS event_outbox CASCADE;
DROP TABLE IF EXISTS webhook_deliveries CASCADE;
DROP TABLE IF EXISTS webhook_endpoints CASCADE;
DROP TABLE IF EXISTS audit_entries CASCADE;
DROP TABLE IF EXISTS reversals CASCADE;
DROP TABLE IF EXISTS balance_movements CASCADE;
DROP TABLE IF EXISTS transactions CASCADE;
DROP TABLE IF EXISTS provider_balances CASCADE;
DROP TABLE IF EXISTS memberships CASCADE;
DROP TABLE IF EXISTS branches CASCADE;
DROP TABLE IF EXISTS companies CASCADE;

DROP FUNCTION IF EXISTS reject_audit_mutation() CASCADE;

DROP TYPE IF EXISTS delivery_status;
DROP TYPE IF EXISTS movement_kind;
DROP TYPE IF EXISTS provider_code;
DROP TYPE IF EXISTS transaction_direction;
DROP TYPE IF EXISTS transaction_channel;
DROP TYPE IF EXISTS transaction_status;
DROP TYPE IF EXISTS member_role;
";
