use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

/// A fully constructed listing row. `raw_region` keeps the scraped location
/// text as-is; `region_id` is the resolved canonical reference, null when the
/// location did not resolve.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub listing_id: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub city: Option<String>,
    pub raw_region: Option<String>,
    pub seller_type: Option<String>,
    pub price: Option<i64>,
    pub currency: Option<String>,
    pub brand: Option<String>,
    pub fuel: Option<String>,
    pub model_year: Option<i64>,
    pub mileage_km: Option<i64>,
    pub region_id: Option<i64>,
    pub scraped_at: DateTime<Utc>,
}

/// Whether an upsert created a row or replaced one. For metrics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
}

const UPSERT_SQL: &str = "
INSERT INTO cars (listing_id, title, url, city, region, seller_type,
                  price, currency, brand, fuel, model_year, mileage_km,
                  region_id, scraped_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
ON CONFLICT(listing_id) DO UPDATE SET
  title = excluded.title,
  url = excluded.url,
  city = excluded.city,
  region = excluded.region,
  seller_type = excluded.seller_type,
  price = excluded.price,
  currency = excluded.currency,
  brand = excluded.brand,
  fuel = excluded.fuel,
  model_year = excluded.model_year,
  mileage_km = excluded.mileage_km,
  region_id = excluded.region_id,
  scraped_at = excluded.scraped_at
";

const SELECT_SQL: &str = "
SELECT listing_id, title, url, city, region, seller_type,
       price, currency, brand, fuel, model_year, mileage_km,
       region_id, scraped_at
FROM cars WHERE listing_id = ?1
";

/// Durable listing table keyed by `listing_id`. One row per identifier; a
/// re-scrape replaces the whole row, it is never partially merged.
pub struct ListingStore<'c> {
    conn: &'c mut Connection,
}

impl<'c> ListingStore<'c> {
    pub fn new(conn: &'c mut Connection) -> Self {
        Self { conn }
    }

    /// Whole-row upsert. The exists-check and the write run inside one
    /// immediate transaction, so concurrent writers for the same identifier
    /// serialize and the outcome classification stays accurate.
    pub fn upsert(&mut self, listing: &Listing) -> Result<UpsertOutcome> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Failed to begin upsert transaction")?;

        let existed: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM cars WHERE listing_id = ?1)",
            params![listing.listing_id],
            |row| row.get(0),
        )?;

        tx.execute(
            UPSERT_SQL,
            params![
                listing.listing_id,
                listing.title,
                listing.url,
                listing.city,
                listing.raw_region,
                listing.seller_type,
                listing.price,
                listing.currency,
                listing.brand,
                listing.fuel,
                listing.model_year,
                listing.mileage_km,
                listing.region_id,
                listing.scraped_at,
            ],
        )
        .with_context(|| format!("Failed to upsert listing {}", listing.listing_id))?;

        tx.commit().context("Failed to commit upsert")?;

        Ok(if existed {
            UpsertOutcome::Replaced
        } else {
            UpsertOutcome::Inserted
        })
    }

    pub fn get(&self, listing_id: &str) -> Result<Option<Listing>> {
        self.conn
            .query_row(SELECT_SQL, params![listing_id], listing_from_row)
            .optional()
            .with_context(|| format!("Failed to read listing {}", listing_id))
    }

    pub fn count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM cars", [], |row| row.get(0))
            .context("Failed to count listings")
    }
}

fn listing_from_row(row: &rusqlite::Row) -> rusqlite::Result<Listing> {
    Ok(Listing {
        listing_id: row.get(0)?,
        title: row.get(1)?,
        url: row.get(2)?,
        city: row.get(3)?,
        raw_region: row.get(4)?,
        seller_type: row.get(5)?,
        price: row.get(6)?,
        currency: row.get(7)?,
        brand: row.get(8)?,
        fuel: row.get(9)?,
        model_year: row.get(10)?,
        mileage_km: row.get(11)?,
        region_id: row.get(12)?,
        scraped_at: row.get(13)?,
    })
}
