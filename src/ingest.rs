use std::io::BufRead;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, info};

use crate::registry::RegionRegistry;
use crate::resolver::{resolve, Resolution, ResolutionLevel};
use crate::store::{Listing, ListingStore, UpsertOutcome};

/// A raw listing tuple as the scraper emits it. Only `listing_id` (or `url`
/// as a fallback key) is required; numeric fields coerce leniently so one
/// malformed value never discards the record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawListing {
    pub listing_id: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub seller_type: Option<String>,
    #[serde(deserialize_with = "lenient_int")]
    pub price: Option<i64>,
    pub currency: Option<String>,
    pub brand: Option<String>,
    pub fuel: Option<String>,
    #[serde(deserialize_with = "lenient_int")]
    pub model_year: Option<i64>,
    #[serde(deserialize_with = "lenient_int")]
    pub mileage_km: Option<i64>,
    pub scraped_at: Option<DateTime<Utc>>,
}

/// Accept integers as numbers or as scraped strings like "180 000" or
/// "15.000"; anything unparseable becomes null.
fn lenient_int<'de, D: Deserializer<'de>>(de: D) -> Result<Option<i64>, D::Error> {
    let value = Value::deserialize(de)?;
    Ok(coerce_int(&value))
}

fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !matches!(c, ' ' | '.' | '\u{a0}'))
                .collect();
            if cleaned.is_empty() {
                None
            } else {
                cleaned.parse().ok()
            }
        }
        _ => None,
    }
}

/// Per-record ingest outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted { resolved: bool },
    Replaced { resolved: bool },
    /// Record had neither `listing_id` nor `url`; nothing to key it by.
    Skipped,
}

/// Totals for one ingest run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub inserted: u64,
    pub replaced: u64,
    pub unresolved: u64,
    pub skipped: u64,
}

impl IngestSummary {
    pub fn upserted(&self) -> u64 {
        self.inserted + self.replaced
    }

    fn tally(&mut self, outcome: IngestOutcome) {
        match outcome {
            IngestOutcome::Inserted { resolved } => {
                self.inserted += 1;
                if !resolved {
                    self.unresolved += 1;
                }
            }
            IngestOutcome::Replaced { resolved } => {
                self.replaced += 1;
                if !resolved {
                    self.unresolved += 1;
                }
            }
            IngestOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Orchestrates raw listing → region resolution → upsert. Owns its
/// connection; concurrent workers each run their own `Ingestor` against the
/// same database file.
pub struct Ingestor {
    conn: Connection,
    level: ResolutionLevel,
}

impl Ingestor {
    pub fn new(conn: Connection) -> Self {
        Self::with_level(conn, ResolutionLevel::default())
    }

    pub fn with_level(conn: Connection, level: ResolutionLevel) -> Self {
        Self { conn, level }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn into_connection(self) -> Connection {
        self.conn
    }

    /// Ingest a single raw listing: resolve its location (scraped `region`
    /// text preferred over `city`), then upsert the full row.
    pub fn ingest(&mut self, raw: &RawListing) -> Result<IngestOutcome> {
        let Some(listing_id) = raw.listing_id.clone().or_else(|| raw.url.clone()) else {
            debug!("record without listing_id or url skipped");
            return Ok(IngestOutcome::Skipped);
        };

        let candidate = raw
            .region
            .as_deref()
            .or(raw.city.as_deref())
            .unwrap_or("");
        let region_id = {
            let registry = RegionRegistry::new(&self.conn);
            resolve(&registry, candidate, self.level)?
                .into_region()
                .map(|r| r.id)
        };

        let listing = Listing {
            listing_id,
            title: raw.title.clone(),
            url: raw.url.clone(),
            city: raw.city.clone(),
            raw_region: raw.region.clone(),
            seller_type: raw.seller_type.clone(),
            price: raw.price,
            currency: raw.currency.clone(),
            brand: raw.brand.clone(),
            fuel: raw.fuel.clone(),
            model_year: raw.model_year,
            mileage_km: raw.mileage_km,
            region_id,
            scraped_at: raw.scraped_at.unwrap_or_else(Utc::now),
        };

        let mut store = ListingStore::new(&mut self.conn);
        let outcome = store.upsert(&listing)?;
        let resolved = region_id.is_some();
        Ok(match outcome {
            UpsertOutcome::Inserted => IngestOutcome::Inserted { resolved },
            UpsertOutcome::Replaced => IngestOutcome::Replaced { resolved },
        })
    }

    /// Ingest a stream of JSONL records, one raw listing per line. Blank
    /// lines are skipped; a malformed line aborts the run.
    pub fn ingest_jsonl<R: BufRead>(&mut self, reader: R) -> Result<IngestSummary> {
        let mut summary = IngestSummary::default();

        for line in reader.lines() {
            let line = line.context("Failed to read line")?;
            if line.trim().is_empty() {
                continue;
            }
            let raw: RawListing =
                serde_json::from_str(&line).context("Failed to parse listing record")?;
            summary.tally(self.ingest(&raw)?);
        }

        info!(
            inserted = summary.inserted,
            replaced = summary.replaced,
            unresolved = summary.unresolved,
            skipped = summary.skipped,
            "ingest finished"
        );
        Ok(summary)
    }
}

/// Re-resolve listings whose region reference is still null and fill it in.
/// Returns how many rows were updated.
pub fn backfill_regions(conn: &Connection, level: ResolutionLevel) -> Result<u64> {
    let pending: Vec<(String, Option<String>, Option<String>)> = {
        let mut stmt =
            conn.prepare("SELECT listing_id, city, region FROM cars WHERE region_id IS NULL")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
        rows.collect::<rusqlite::Result<_>>()?
    };

    let registry = RegionRegistry::new(conn);
    let mut updated = 0u64;
    for (listing_id, city, raw_region) in pending {
        let candidate = raw_region.as_deref().or(city.as_deref()).unwrap_or("");
        if let Resolution::Resolved(region) = resolve(&registry, candidate, level)? {
            conn.execute(
                "UPDATE cars SET region_id = ?1 WHERE listing_id = ?2",
                params![region.id, listing_id],
            )
            .with_context(|| format!("Failed to backfill listing {}", listing_id))?;
            updated += 1;
        }
    }
    Ok(updated)
}
