//! # Seed Data Generator
//!
//! Populates a development database with one outlet, a small coffee menu,
//! the membership tiers, a loyalty setting, sample vouchers and two users.
//!
//! ## Usage
//! ```bash
//! cargo run -p kopi-db --bin seed
//!
//! # Specify database path
//! cargo run -p kopi-db --bin seed -- --db ./data/kopi.db
//! ```

use chrono::{Duration, Utc};
use std::env;

use kopi_core::voucher::{CustomerEligibility, DiscountKind};
use kopi_core::{
    LoyaltySetting, MembershipTier, Modifier, Money, OptionValue, OrderType, Product,
    ProductOption, Role, User, Voucher,
};
use kopi_db::migrations::migration_status;
use kopi_db::{Database, DbConfig};

const OUTLET_ID: &str = "kemang-01";

/// (id, name, base price)
const COFFEES: &[(&str, &str, i64)] = &[
    ("americano", "Americano", 28_000),
    ("latte", "Caffe Latte", 35_000),
    ("cappuccino", "Cappuccino", 35_000),
    ("kopi-susu", "Es Kopi Susu Gula Aren", 25_000),
    ("mocha", "Caffe Mocha", 38_000),
];

/// (id, name, base price)
const PASTRIES: &[(&str, &str, i64)] = &[
    ("croissant", "Butter Croissant", 22_000),
    ("banana-bread", "Banana Bread", 24_000),
];

/// (id, level, name, min, max)
const TIERS: &[(&str, i64, &str, i64, Option<i64>)] = &[
    ("bronze", 1, "Bronze", 0, Some(500)),
    ("silver", 2, "Silver", 500, Some(2_000)),
    ("gold", 3, "Gold", 2_000, None),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./kopi_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Kopi Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./kopi_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Kopi Seed Data Generator");
    println!("========================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    let (total, applied) = migration_status(db.pool()).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied ({}/{})", applied, total);

    if db.outlets().get_outlet(OUTLET_ID).await?.is_some() {
        println!("⚠ Outlet {} already exists", OUTLET_ID);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    // Outlet & tables
    db.outlets().insert_outlet(OUTLET_ID, "Kopi Kemang", true).await?;
    for n in 1..=8 {
        db.outlets()
            .insert_table(&format!("{}-t{}", OUTLET_ID, n), OUTLET_ID, &format!("T{}", n))
            .await?;
    }
    println!("✓ Outlet with 8 tables");

    // Catalog
    let catalog = db.catalog();
    catalog.insert_category("coffee", "Coffee").await?;
    catalog.insert_category("pastry", "Pastry").await?;

    for (id, name, price) in COFFEES {
        catalog.insert_product(&coffee(id, name, *price)).await?;
    }
    for (id, name, price) in PASTRIES {
        catalog
            .insert_product(&Product {
                id: id.to_string(),
                category_id: "pastry".to_string(),
                name: name.to_string(),
                base_price: Money::from_rupiah(*price),
                is_available: true,
                options: vec![],
                modifiers: vec![],
            })
            .await?;
    }
    println!("✓ {} products", COFFEES.len() + PASTRIES.len());

    // Loyalty
    for (id, level, name, min, max) in TIERS {
        db.loyalty()
            .insert_tier(&MembershipTier {
                id: id.to_string(),
                level: *level,
                name: name.to_string(),
                min_points: *min,
                max_points: *max,
                benefits: None,
            })
            .await?;
    }
    db.loyalty()
        .insert_setting(
            &LoyaltySetting {
                id: "default".to_string(),
                is_enabled: true,
                points_per_item: 10,
                point_value_idr: 100,
                min_redeem_points: 50,
                max_redeem_points: Some(1_000),
                max_redeem_percentage: 50,
            },
            Utc::now(),
        )
        .await?;
    println!("✓ {} tiers and loyalty setting", TIERS.len());

    // Vouchers
    for voucher in vouchers() {
        db.vouchers().insert(&voucher).await?;
    }
    println!("✓ Sample vouchers (KOPI10, HEMAT15K, NEWBIE, FREESHOT)");

    // Users
    let now = Utc::now();
    db.users()
        .insert(&User {
            id: "demo-customer".to_string(),
            name: "Demo Customer".to_string(),
            role: Role::Customer,
            outlet_id: None,
            points_balance: 0,
            tier_id: None,
            created_at: now,
        })
        .await?;
    db.users()
        .insert(&User {
            id: "demo-barista".to_string(),
            name: "Demo Barista".to_string(),
            role: Role::Staff,
            outlet_id: Some(OUTLET_ID.to_string()),
            points_balance: 0,
            tier_id: None,
            created_at: now,
        })
        .await?;
    println!("✓ Users demo-customer and demo-barista");

    println!();
    println!("✓ Seed complete!");

    Ok(())
}

/// A coffee with size and milk options and an extra-shot modifier.
fn coffee(id: &str, name: &str, price: i64) -> Product {
    let value = |suffix: &str, name: &str, delta: i64| OptionValue {
        id: format!("{}-{}", id, suffix),
        name: name.to_string(),
        price_delta: Money::from_rupiah(delta),
    };

    Product {
        id: id.to_string(),
        category_id: "coffee".to_string(),
        name: name.to_string(),
        base_price: Money::from_rupiah(price),
        is_available: true,
        options: vec![
            ProductOption {
                id: format!("{}-size", id),
                name: "Size".to_string(),
                min_select: 1,
                max_select: 1,
                values: vec![
                    value("regular", "Regular", 0),
                    value("large", "Large", 5_000),
                ],
            },
            ProductOption {
                id: format!("{}-milk", id),
                name: "Milk".to_string(),
                min_select: 0,
                max_select: 1,
                values: vec![value("oat", "Oat Milk", 8_000), value("almond", "Almond Milk", 8_000)],
            },
        ],
        modifiers: vec![
            Modifier {
                id: format!("{}-shot", id),
                name: "Extra Shot".to_string(),
                price: Money::from_rupiah(6_000),
                is_available: true,
            },
            Modifier {
                id: format!("{}-syrup", id),
                name: "Vanilla Syrup".to_string(),
                price: Money::from_rupiah(4_000),
                is_available: true,
            },
        ],
    }
}

fn vouchers() -> Vec<Voucher> {
    let now = Utc::now();
    let base = Voucher {
        id: String::new(),
        code: String::new(),
        name: String::new(),
        discount: DiscountKind::Fixed {
            amount: Money::zero(),
        },
        min_order: Money::zero(),
        starts_at: Some(now - Duration::days(1)),
        ends_at: Some(now + Duration::days(90)),
        usage_limit: None,
        used_count: 0,
        per_user_limit: None,
        order_types: vec![],
        product_ids: vec![],
        category_ids: vec![],
        eligibility: CustomerEligibility::All,
        eligible_user_ids: vec![],
        points_cost: None,
        is_redeemable: false,
        is_active: true,
    };

    vec![
        Voucher {
            id: "v-kopi10".to_string(),
            code: "KOPI10".to_string(),
            name: "10% off, up to Rp10.000".to_string(),
            discount: DiscountKind::Percentage {
                percent: 10,
                max_discount: Some(Money::from_rupiah(10_000)),
            },
            min_order: Money::from_rupiah(50_000),
            usage_limit: Some(500),
            per_user_limit: Some(3),
            ..base.clone()
        },
        Voucher {
            id: "v-hemat15k".to_string(),
            code: "HEMAT15K".to_string(),
            name: "Rp15.000 off pickup and delivery".to_string(),
            discount: DiscountKind::Fixed {
                amount: Money::from_rupiah(15_000),
            },
            min_order: Money::from_rupiah(75_000),
            order_types: vec![OrderType::Pickup, OrderType::Delivery],
            ..base.clone()
        },
        Voucher {
            id: "v-newbie".to_string(),
            code: "NEWBIE".to_string(),
            name: "50% off your first coffee".to_string(),
            discount: DiscountKind::Percentage {
                percent: 50,
                max_discount: Some(Money::from_rupiah(20_000)),
            },
            category_ids: vec!["coffee".to_string()],
            eligibility: CustomerEligibility::NewUser,
            per_user_limit: Some(1),
            ..base.clone()
        },
        Voucher {
            id: "v-freeshot".to_string(),
            code: "FREESHOT".to_string(),
            name: "Rp6.000 off, bought with points".to_string(),
            discount: DiscountKind::Fixed {
                amount: Money::from_rupiah(6_000),
            },
            points_cost: Some(60),
            is_redeemable: true,
            ..base
        },
    ]
}
