//! # Seed Data Generator
//!
//! Populates the database with a demo grocery store for development.
//!
//! ## Usage
//! ```bash
//! # Seed the full catalog (default)
//! cargo run -p kirana-db --bin seed
//!
//! # Seed fewer products
//! cargo run -p kirana-db --bin seed -- --count 10
//!
//! # Specify database path
//! cargo run -p kirana-db --bin seed -- --db ./data/kirana.db
//! ```
//!
//! ## Generated Data
//! - Grocery products for `store-demo`, each with a low-stock threshold
//! - One live flash sale on the first product (30% off, 50 units)
//! - The `WELCOME20` coupon (20% off, min ₹299, max ₹100)
//! - A `demo-user` wallet holding ₹1,000
//! - One ₹500 gift card, valid for a year

use chrono::{Duration, Utc};
use kirana_core::{Money, OfferType};
use kirana_db::{Database, DbConfig, NewDiscount, NewFlashSale, NewOffer, NewProduct};
use std::env;

const STORE_ID: &str = "store-demo";
const DEMO_USER: &str = "demo-user";

/// (name, price in paise, stock, low-stock threshold)
const CATALOG: &[(&str, i64, i64, i64)] = &[
    ("Aashirvaad Atta 5kg", 28_500, 40, 8),
    ("India Gate Basmati Rice 1kg", 14_900, 60, 10),
    ("Amul Gold Milk 1L", 6_800, 120, 20),
    ("Amul Butter 500g", 27_500, 30, 5),
    ("Amul Pure Ghee 1L", 65_000, 15, 3),
    ("Tata Salt 1kg", 2_800, 200, 25),
    ("Fortune Sunflower Oil 1L", 15_500, 45, 8),
    ("Toor Dal 1kg", 16_000, 50, 10),
    ("Moong Dal 1kg", 14_000, 35, 8),
    ("Brooke Bond Red Label Tea 500g", 27_000, 25, 5),
    ("Nescafe Classic 100g", 33_500, 20, 4),
    ("Britannia Good Day 200g", 4_000, 80, 15),
    ("Parle-G 800g", 9_000, 70, 12),
    ("Maggi Noodles 12-pack", 16_800, 55, 10),
    ("Haldiram Bhujia 400g", 11_000, 40, 8),
    ("Onion 1kg", 4_500, 150, 30),
    ("Potato 1kg", 3_500, 150, 30),
    ("Tomato 1kg", 4_000, 100, 20),
    ("Surf Excel Matic 2kg", 49_900, 18, 4),
    ("Vim Dishwash Bar 3-pack", 6_000, 60, 10),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut count: usize = CATALOG.len();
    let mut db_path = String::from("./kirana_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(CATALOG.len());
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Kirana Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!(
                    "  -c, --count <N>    Number of products to insert (default: {})",
                    CATALOG.len()
                );
                println!("  -d, --db <PATH>    Database file path (default: ./kirana_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }
    let count = count.clamp(1, CATALOG.len());

    println!("🌱 Kirana Seed Data Generator");
    println!("============================");
    println!("Database: {}", db_path);
    println!("Products: {}", count);
    println!();

    // Connect to database
    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    // Check existing products
    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    println!();
    println!("Inserting products...");
    let start = std::time::Instant::now();

    let mut products = Vec::with_capacity(count);
    for (name, paise, stock, threshold) in CATALOG.iter().take(count) {
        let new = NewProduct::new(STORE_ID, *name, Money::from_cents(*paise), *stock)
            .low_stock_threshold(*threshold);
        match db.products().insert_product(&new).await {
            Ok(product) => products.push(product),
            Err(e) => eprintln!("Failed to insert {}: {}", name, e),
        }
    }
    println!("✓ Inserted {} products in {:?}", products.len(), start.elapsed());

    let now = Utc::now();

    if let Some(first) = products.first() {
        let sale = db
            .flash_sales()
            .create_flash_sale(&NewFlashSale {
                product_id: first.id.clone(),
                discount_percent: 30,
                start_time: now - Duration::minutes(5),
                end_time: now + Duration::hours(6),
                max_quantity: 50,
            })
            .await?;
        let price = db.flash_sales().flash_price(&sale.id).await?;
        println!("✓ Flash sale on {}: {} ({} units)", first.name, price, sale.max_quantity);
    }

    let coupon = db
        .offers()
        .create_offer(&NewOffer {
            code: Some("WELCOME20".to_string()),
            title: "20% off your first order".to_string(),
            discount: NewDiscount::Percent {
                percent: 20,
                max_discount: Some(Money::from_rupees(100)),
            },
            min_order_amount: Money::from_rupees(299),
            offer_type: OfferType::SiteWide,
            store_id: None,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(90),
        })
        .await?;
    println!("✓ Coupon {}", coupon.code.as_deref().unwrap_or("-"));

    let funded = db
        .wallets()
        .add_money(DEMO_USER, Money::from_rupees(1000), Some("seed-topup"))
        .await?;
    println!("✓ Wallet {}: {}", DEMO_USER, funded.balance);

    let card = db
        .gift_cards()
        .issue(Money::from_rupees(500), now + Duration::days(365))
        .await?;
    println!("✓ Gift card {} ({})", card.code, card.amount());

    println!();
    println!("✓ Seed complete!");

    Ok(())
}
