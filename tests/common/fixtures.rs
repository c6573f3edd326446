//! Seeded databases and API page fixtures

use serde_json::{Value, json};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;

/// Create a file-backed SQLite pool in a fresh temp dir
///
/// The temp dir must outlive the pool.
pub async fn create_pool() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("reporting.db").display());
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await
        .unwrap();
    (pool, dir)
}

/// Create `table` with `rows` sequential rows (`id` starts at 1)
pub async fn seed_table(pool: &SqlitePool, table: &str, rows: i64) {
    sqlx::query(&format!(
        "CREATE TABLE {table} (id INTEGER PRIMARY KEY, amount REAL NOT NULL, status TEXT)"
    ))
    .execute(pool)
    .await
    .unwrap();

    let mut tx = pool.begin().await.unwrap();
    for id in 1..=rows {
        sqlx::query(&format!(
            "INSERT INTO {table} (id, amount, status) VALUES (?, ?, ?)"
        ))
        .bind(id)
        .bind(id as f64 / 4.0)
        .bind(if id % 3 == 0 { "refunded" } else { "settled" })
        .execute(&mut *tx)
        .await
        .unwrap();
    }
    tx.commit().await.unwrap();
}

/// One reporting API page of `count` transactions starting after `offset`
pub fn transaction_page(offset: u64, count: u64, total_pages: u32) -> Value {
    let details: Vec<Value> = (offset..offset + count)
        .map(|i| {
            json!({
                "transaction_info": {"transaction_id": format!("TX{i:05}")},
                "amount": {"currency_code": "EUR", "value": format!("{}.00", i % 90 + 10)},
            })
        })
        .collect();
    json!({
        "transaction_details": details,
        "total_pages": total_pages,
        "page": 1,
    })
}
