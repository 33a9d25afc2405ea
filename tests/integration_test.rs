//! End-to-end tests over a real database file: seed, ingest JSONL, re-ingest,
//! and concurrent upserts from multiple worker connections.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::thread;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use listings_to_sqlite::{
    backfill_regions, db, resolve, seed, IngestOutcome, Ingestor, ListingStore, RawListing,
    RegionRegistry, Resolution, ResolutionLevel,
};

fn new_db(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("listings.db");
    let conn = db::open(&path).expect("Failed to open database");
    db::init_schema(&conn).expect("Failed to create schema");
    seed::seed_registry(&conn).expect("Failed to seed registry");
    path
}

fn ingestor_for(path: &Path) -> Ingestor {
    Ingestor::new(db::open(path).expect("Failed to open database"))
}

#[test]
fn test_jsonl_ingest_end_to_end() {
    let dir = TempDir::new().unwrap();
    let path = new_db(&dir);

    let jsonl = r#"
{"listing_id": "id1", "title": "Volkswagen Golf 1.6 TDI", "city": "Amadora", "region": "Lisbon", "price": "14.950", "currency": "EUR", "mileage_km": "98 000", "model_year": 2017}
{"listing_id": "id2", "title": "Renault Clio", "city": "Setubal", "price": 7500}
{"listing_id": "id3", "title": "Fiat Panda", "city": "Nonexistent Place", "price": "call us"}
{"title": "no key at all"}
"#;

    let mut ingestor = ingestor_for(&path);
    let summary = ingestor.ingest_jsonl(Cursor::new(jsonl)).unwrap();
    assert_eq!(summary.inserted, 3);
    assert_eq!(summary.replaced, 0);
    assert_eq!(summary.unresolved, 1);
    assert_eq!(summary.skipped, 1);

    let mut conn = ingestor.into_connection();

    // id1 resolved through the "Lisbon" alias to the Lisboa district
    let lisboa_id: i64 = {
        let registry = RegionRegistry::new(&conn);
        registry.find_by_exact_name("Lisboa").unwrap().unwrap().id
    };
    let mut store = ListingStore::new(&mut conn);

    let id1 = store.get("id1").unwrap().unwrap();
    assert_eq!(id1.region_id, Some(lisboa_id));
    assert_eq!(id1.price, Some(14_950));
    assert_eq!(id1.mileage_km, Some(98_000));

    // id2 resolved via city fallback, id3 stored with null region and price
    let id2 = store.get("id2").unwrap().unwrap();
    assert!(id2.region_id.is_some());
    let id3 = store.get("id3").unwrap().unwrap();
    assert_eq!(id3.region_id, None);
    assert_eq!(id3.price, None);
    assert_eq!(id3.title.as_deref(), Some("Fiat Panda"));
}

#[test]
fn test_reingest_is_idempotent_and_bumps_scraped_at() {
    let dir = TempDir::new().unwrap();
    let path = new_db(&dir);
    let mut ingestor = ingestor_for(&path);

    let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
    let t2 = Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap();

    let mut raw = RawListing {
        listing_id: Some("id1".to_string()),
        region: Some("Braganca".to_string()),
        price: Some(9_900),
        scraped_at: Some(t1),
        ..RawListing::default()
    };

    assert!(matches!(
        ingestor.ingest(&raw).unwrap(),
        IngestOutcome::Inserted { resolved: true }
    ));

    raw.scraped_at = Some(t2);
    assert!(matches!(
        ingestor.ingest(&raw).unwrap(),
        IngestOutcome::Replaced { resolved: true }
    ));

    let mut conn = ingestor.into_connection();
    let mut store = ListingStore::new(&mut conn);
    assert_eq!(store.count().unwrap(), 1);
    let stored = store.get("id1").unwrap().unwrap();
    assert_eq!(stored.scraped_at, t2);
}

#[test]
fn test_concurrent_upserts_same_listing_leave_one_consistent_row() {
    const WORKERS: i64 = 8;

    let dir = TempDir::new().unwrap();
    let path = new_db(&dir);

    thread::scope(|scope| {
        for n in 0..WORKERS {
            let path = path.clone();
            scope.spawn(move || {
                let mut ingestor = ingestor_for(&path);
                let raw = RawListing {
                    listing_id: Some("contested".to_string()),
                    region: Some("Porto".to_string()),
                    // Payload fields move together; a torn row would mix them
                    price: Some(1_000 + n),
                    mileage_km: Some(10_000 + n),
                    ..RawListing::default()
                };
                ingestor.ingest(&raw).expect("ingest failed");
            });
        }
    });

    let mut conn = db::open(&path).unwrap();
    let mut store = ListingStore::new(&mut conn);
    assert_eq!(store.count().unwrap(), 1);

    let stored = store.get("contested").unwrap().unwrap();
    let price = stored.price.unwrap();
    let mileage = stored.mileage_km.unwrap();
    assert!((1_000..1_000 + WORKERS).contains(&price));
    // The row matches exactly one payload, not an interleaving of two
    assert_eq!(mileage - 10_000, price - 1_000);
}

#[test]
fn test_concurrent_upserts_different_listings_all_land() {
    const WORKERS: i64 = 6;

    let dir = TempDir::new().unwrap();
    let path = new_db(&dir);

    thread::scope(|scope| {
        for n in 0..WORKERS {
            let path = path.clone();
            scope.spawn(move || {
                let mut ingestor = ingestor_for(&path);
                let raw = RawListing {
                    listing_id: Some(format!("id{}", n)),
                    city: Some("Faro".to_string()),
                    price: Some(n),
                    ..RawListing::default()
                };
                ingestor.ingest(&raw).expect("ingest failed");
            });
        }
    });

    let mut conn = db::open(&path).unwrap();
    let mut store = ListingStore::new(&mut conn);
    assert_eq!(store.count().unwrap(), WORKERS);
    for n in 0..WORKERS {
        let stored = store.get(&format!("id{}", n)).unwrap().unwrap();
        assert_eq!(stored.price, Some(n));
    }
}

#[test]
fn test_operator_appends_visible_to_resolution_and_backfill() {
    let dir = TempDir::new().unwrap();
    let path = new_db(&dir);

    // Listing arrives before the municipality is known
    let mut ingestor = ingestor_for(&path);
    let raw = RawListing {
        listing_id: Some("id1".to_string()),
        region: Some("Cascais".to_string()),
        ..RawListing::default()
    };
    assert!(matches!(
        ingestor.ingest(&raw).unwrap(),
        IngestOutcome::Inserted { resolved: false }
    ));
    let conn = ingestor.into_connection();

    // Operator links a district code and appends the municipality
    let (lisboa_id, cascais_district): (i64, i64) = {
        let registry = RegionRegistry::new(&conn);
        let lisboa = registry.find_by_exact_name("Lisboa").unwrap().unwrap();
        let linked = registry
            .add_region(
                listings_to_sqlite::RegionLevel::District,
                "Lisboa Norte",
                Some("11"),
                "Lisboa Norte",
                None,
            )
            .unwrap();
        let cascais = registry
            .add_region(
                listings_to_sqlite::RegionLevel::Municipality,
                "Cascais",
                Some("1105"),
                "Cascais",
                Some("11"),
            )
            .unwrap();
        assert_eq!(cascais.parent_code.as_deref(), Some("11"));

        // New entries are immediately visible to lookups
        let hit = resolve(&registry, "cascais", ResolutionLevel::District).unwrap();
        assert_eq!(hit, Resolution::Resolved(linked.clone()));
        (lisboa.id, linked.id)
    };
    assert_ne!(lisboa_id, cascais_district);

    let updated = backfill_regions(&conn, ResolutionLevel::District).unwrap();
    assert_eq!(updated, 1);

    let region_id: Option<i64> = conn
        .query_row(
            "SELECT region_id FROM cars WHERE listing_id = 'id1'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(region_id, Some(cascais_district));
}
