use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

/// Durable schema for listings, regions and aliases.
///
/// `name_norm` / `alias_norm` hold the accent-free lowercase comparison key
/// produced by [`crate::normalize::normalize_key`]; the unique indexes on
/// them make name uniqueness and alias lookup case-insensitive.
const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS regions (
    id INTEGER PRIMARY KEY,
    level TEXT NOT NULL CHECK (level IN ('district', 'municipality')),
    code TEXT UNIQUE,
    name TEXT NOT NULL,
    name_norm TEXT NOT NULL,
    geom_key TEXT NOT NULL,
    parent_code TEXT,
    UNIQUE (level, name_norm)
);

CREATE TABLE IF NOT EXISTS region_aliases (
    id INTEGER PRIMARY KEY,
    region_id INTEGER NOT NULL REFERENCES regions(id) ON DELETE CASCADE,
    alias TEXT NOT NULL,
    alias_norm TEXT NOT NULL UNIQUE
);

CREATE INDEX IF NOT EXISTS idx_region_aliases_region_id ON region_aliases(region_id);

CREATE TABLE IF NOT EXISTS cars (
    listing_id TEXT PRIMARY KEY,
    title TEXT,
    url TEXT,
    city TEXT,
    region TEXT,
    seller_type TEXT,
    price INTEGER,
    currency TEXT,
    brand TEXT,
    fuel TEXT,
    model_year INTEGER,
    mileage_km INTEGER,
    region_id INTEGER REFERENCES regions(id),
    scraped_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cars_region_id ON cars(region_id);
";

/// Open a database connection with the pragmas the ingest path relies on.
///
/// WAL keeps readers unblocked while writers commit; the busy timeout lets
/// concurrent ingest workers serialize instead of failing fast.
pub fn open(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database {:?}", db_path))?;
    apply_pragmas(&conn)?;
    Ok(conn)
}

/// In-memory connection with the same pragmas, for tests.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
    apply_pragmas(&conn)?;
    Ok(conn)
}

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = 5000;",
    )
    .context("Failed to apply connection pragmas")?;
    Ok(())
}

/// Create all tables and indexes, then upgrade older databases in place.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)
        .context("Failed to create schema")?;
    ensure_region_column(conn)?;
    Ok(())
}

/// Databases created before region resolution existed lack `cars.region_id`.
fn ensure_region_column(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare("PRAGMA table_info(cars)")?;
    let columns: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<_>>()?;

    if !columns.iter().any(|c| c == "region_id") {
        conn.execute_batch(
            "ALTER TABLE cars ADD COLUMN region_id INTEGER REFERENCES regions(id);
             CREATE INDEX IF NOT EXISTS idx_cars_region_id ON cars(region_id);",
        )
        .context("Failed to add region_id column")?;
    }
    Ok(())
}
