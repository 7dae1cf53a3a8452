//! # Seed Data Generator
//!
//! Populates a development database with products, variants, customers
//! and carts ready for checkout.
//!
//! ## Usage
//! ```bash
//! # 50 products, 10 customers (default)
//! cargo run -p holdfast-db --bin seed
//!
//! # Custom amounts and path
//! cargo run -p holdfast-db --bin seed -- --products 200 --customers 25 --db ./data/holdfast.db
//! ```
//!
//! ## Generated Data
//! - Products across a few categories; every third one gets size variants
//!   (variant stock only, parent stock 0)
//! - Customers `customer-001`.. with credit cycling 3, 2, 1
//! - One cart per customer holding two lines

use std::env;
use tracing_subscriber::EnvFilter;

use holdfast_core::{CreditPolicy, SkuRef};
use holdfast_db::{Database, DbConfig};

/// Product names for realistic test data
const PRODUCTS: &[(&str, &[&str])] = &[
    (
        "Home",
        &["Desk Lamp", "Throw Pillow", "Wall Clock", "Ceramic Vase", "Candle Set"],
    ),
    (
        "Apparel",
        &["T-Shirt", "Hoodie", "Running Socks", "Baseball Cap", "Rain Jacket"],
    ),
    (
        "Kitchen",
        &["Chef Knife", "Cutting Board", "Coffee Grinder", "Kettle", "Mixing Bowls"],
    ),
    (
        "Outdoor",
        &["Water Bottle", "Day Pack", "Camping Mug", "Headlamp", "Trekking Poles"],
    ),
];

/// Size variants: (name, price addon in cents)
const SIZES: &[(&str, i64)] = &[("Small", 0), ("Medium", 200), ("Large", 400)];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut product_count: usize = 50;
    let mut customer_count: usize = 10;
    let mut db_path = String::from("./holdfast_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--products" | "-p" => {
                if i + 1 < args.len() {
                    product_count = args[i + 1].parse().unwrap_or(50);
                    i += 1;
                }
            }
            "--customers" | "-u" => {
                if i + 1 < args.len() {
                    customer_count = args[i + 1].parse().unwrap_or(10);
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
                println!("Holdfast Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -p, --products <N>   Number of products to generate (default: 50)");
                println!("  -u, --customers <N>  Number of customers with carts (default: 10)");
                println!("  -d, --db <PATH>      Database file path (default: ./holdfast_dev.db)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Holdfast Seed Data Generator");
    println!("================================");
    println!("Database:  {}", db_path);
    println!("Products:  {}", product_count);
    println!("Customers: {}", customer_count);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.catalog().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    // Products
    println!();
    println!("Generating products...");

    let start = std::time::Instant::now();
    let catalog = db.catalog();
    let mut skus: Vec<SkuRef> = Vec::new();

    let names = PRODUCTS
        .iter()
        .flat_map(|(category, names)| names.iter().map(move |name| (*category, *name)))
        .cycle()
        .take(product_count);

    for (seed, (category, name)) in names.enumerate() {
        let price_cents = 499 + ((seed * 37) % 4000) as i64;
        let full_name = format!("{} {} #{:03}", category, name, seed);

        if seed % 3 == 0 {
            let parent = catalog.insert_product(&full_name, price_cents, 0).await?;
            for (size_idx, (size, addon)) in SIZES.iter().enumerate() {
                let stock = ((seed + size_idx * 7) % 25) as i64 + 1;
                let variant = catalog
                    .insert_variant(&parent.product_id, size, price_cents + addon, stock)
                    .await?;
                skus.push(variant);
            }
        } else {
            let stock = (seed % 40) as i64 + 5;
            let sku = catalog.insert_product(&full_name, price_cents, stock).await?;
            if seed % 5 == 0 {
                catalog.set_discount(&sku, Some(price_cents * 80 / 100)).await?;
            }
            skus.push(sku);
        }
    }

    println!("✓ Generated {} stock units in {:?}", skus.len(), start.elapsed());

    // Customers and carts
    println!();
    println!("Generating customers and carts...");

    let policy = CreditPolicy::default();
    let max_balance = policy.max_balance();

    for n in 0..customer_count {
        let user_id = format!("customer-{:03}", n + 1);
        let balance = max_balance - (n as i64 % max_balance.max(1));
        db.credits().set_balance(&user_id, balance).await?;

        if skus.is_empty() {
            continue;
        }

        let cart_id = db.carts().create_cart(&user_id).await?;
        for offset in 0..2 {
            let sku = &skus[(n * 2 + offset) % skus.len()];
            // Carts are priced from the catalog, discount included
            let unit = catalog
                .get_stock_unit(sku)
                .await?
                .ok_or_else(|| format!("stock unit {} not found", sku))?;
            db.carts()
                .add_item(&cart_id, sku, 1 + offset as i64, unit.effective_price().cents())
                .await?;
        }

        println!("  {} credit={} cart={}", user_id, balance, cart_id);
    }

    println!();
    println!("✓ Seed complete!");

    Ok(())
}
