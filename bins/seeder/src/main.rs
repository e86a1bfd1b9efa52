//! Database seeder for `MerchantPlus` development and testing.
//!
//! Provisions a demo company with two branches, one member per role, and
//! opened balance accounts, then prints an access token per member.
//! Running it twice only prints fresh tokens.
//!
//! Usage: cargo run --bin seeder

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use merchant_core::ledger::{LedgerError, Provider};
use merchant_core::tenant::{
    Branch, Company, CompanySettings, Membership, Role, TenantContext, TenantDirectory,
};
use merchant_db::{LedgerRepository, TenantRepository};
use merchant_engine::{EventBus, LedgerEngine, NewBalance};
use merchant_shared::config::BusConfig;
use merchant_shared::{AppConfig, JwtConfig, JwtService};

const COMPANY_ID: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0001);
const ACCRA_BRANCH_ID: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0011);
const KUMASI_BRANCH_ID: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0012);

/// `(user id, membership id, role, branch)`.
const MEMBERS: [(u128, u128, Role, Option<Uuid>); 3] = [
    (0x101, 0x201, Role::Admin, None),
    (0x102, 0x202, Role::Manager, Some(ACCRA_BRANCH_ID)),
    (0x103, 0x203, Role::Teller, Some(ACCRA_BRANCH_ID)),
];

/// Opening floats in whole cedis.
const BALANCES: [(Uuid, Provider, i64); 6] = [
    (ACCRA_BRANCH_ID, Provider::Mtn, 5_000),
    (ACCRA_BRANCH_ID, Provider::Vodafone, 3_000),
    (ACCRA_BRANCH_ID, Provider::Ecobank, 20_000),
    (ACCRA_BRANCH_ID, Provider::Cash, 2_000),
    (KUMASI_BRANCH_ID, Provider::Mtn, 4_000),
    (KUMASI_BRANCH_ID, Provider::Cash, 1_500),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::load().context("Failed to load configuration")?;

    println!("Connecting to database...");
    let db = merchant_db::connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;
    let tenants = TenantRepository::new(db.clone());

    let members = memberships();
    let admin = &members[0];
    let existing = tenants
        .memberships_for_user(admin.user_id)
        .await
        .context("Failed to read memberships")?;

    if existing.is_empty() {
        println!("Seeding demo company...");
        seed_company(&tenants, &members).await?;

        println!("Opening balance accounts...");
        let bus = Arc::new(EventBus::new(BusConfig::default()));
        let ledger = LedgerEngine::new(Arc::new(LedgerRepository::new(db)), bus.clone());
        open_balances(&ledger, &TenantContext::from_membership(admin)).await?;
        bus.shutdown().await;
    } else {
        println!("Demo company already exists, skipping...");
    }

    let jwt = JwtService::new(JwtConfig {
        secret: config.jwt.secret.clone(),
        access_token_expires_secs: 24 * 60 * 60,
    });
    println!();
    println!("Company: {COMPANY_ID}");
    for member in &members {
        let token = jwt
            .generate_access_token(member.user_id)
            .context("Failed to issue token")?;
        println!("{:<8} user {}  token {token}", member.role.as_str(), member.user_id);
    }
    println!();
    println!("Seeding complete!");
    Ok(())
}

fn memberships() -> Vec<Membership> {
    MEMBERS
        .iter()
        .map(|&(user, id, role, branch_id)| Membership {
            id: Uuid::from_u128(id),
            user_id: Uuid::from_u128(user),
            company_id: COMPANY_ID,
            role,
            branch_id,
            is_active: true,
            company_active: true,
        })
        .collect()
}

async fn seed_company(tenants: &TenantRepository, members: &[Membership]) -> anyhow::Result<()> {
    let company = Company {
        id: COMPANY_ID,
        name: "Demo Mobile Money Agency".to_string(),
        is_active: true,
        settings: CompanySettings::default(),
        created_at: Utc::now(),
    };
    tenants.create_company(&company).await?;
    println!("  Created company: {}", company.name);

    for (id, name) in [(ACCRA_BRANCH_ID, "Accra Central"), (KUMASI_BRANCH_ID, "Kumasi Adum")] {
        tenants
            .create_branch(&Branch {
                id,
                company_id: COMPANY_ID,
                name: name.to_string(),
            })
            .await?;
        println!("  Created branch: {name}");
    }

    for membership in members {
        tenants.create_membership(membership).await?;
        println!("  Created {} membership", membership.role);
    }
    Ok(())
}

async fn open_balances(ledger: &LedgerEngine, admin: &TenantContext) -> anyhow::Result<()> {
    for (branch_id, provider, amount) in BALANCES {
        let input = NewBalance {
            branch_id,
            provider,
            starting_balance: Decimal::from(amount),
        };
        match ledger.open_balance(admin, input).await {
            Ok(balance) => println!("  Opened {provider} at {}", balance.balance),
            Err(LedgerError::DuplicateAccount) => {
                println!("  {provider} already open, skipping...");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
