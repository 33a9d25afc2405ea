use anyhow::{anyhow, Context, Result};
use listings_to_sqlite::{
    backfill_regions,
    cli::{Cli, Commands},
    db, resolve, seed,
    registry::RegionRegistry,
    Ingestor, Resolution,
};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    init_tracing("listings_to_sqlite=info")?;
    let cli = Cli::parse_args();

    match cli.command {
        Commands::Init { db } => {
            open_ready(&db)?;
            println!(
                "Initialized {:?} with {} districts and {} aliases",
                db,
                seed::DISTRICTS.len(),
                seed::DISTRICT_ALIASES.len()
            );
        }

        Commands::Ingest { db, input, level } => {
            let start = Instant::now();

            let conn = open_ready(&db)?;
            let file =
                File::open(&input).with_context(|| format!("Failed to open {:?}", input))?;

            let mut ingestor = Ingestor::with_level(conn, level.into());
            let summary = ingestor.ingest_jsonl(BufReader::new(file))?;

            let elapsed = start.elapsed();
            println!(
                "Upserted {} listings into {:?} ({} new, {} refreshed, {} unresolved, {} skipped) in {:.1}s",
                summary.upserted(),
                db,
                summary.inserted,
                summary.replaced,
                summary.unresolved,
                summary.skipped,
                elapsed.as_secs_f64()
            );
        }

        Commands::Resolve {
            db,
            location,
            level,
        } => {
            let conn = open_ready(&db)?;
            let registry = RegionRegistry::new(&conn);
            match resolve(&registry, &location, level.into())? {
                Resolution::Resolved(region) => {
                    println!("{} ({})", region.name, region.level.as_str());
                }
                Resolution::Unresolved => println!("unresolved"),
            }
        }

        Commands::Backfill { db, level } => {
            let conn = open_ready(&db)?;
            let updated = backfill_regions(&conn, level.into())?;
            println!("Backfilled {} listings", updated);
        }

        Commands::AddRegion {
            db,
            name,
            level,
            code,
            geom_key,
            parent_code,
        } => {
            let conn = open_ready(&db)?;
            let registry = RegionRegistry::new(&conn);
            let geom_key = geom_key.as_deref().unwrap_or(&name);
            let region = registry.add_region(
                level.into(),
                &name,
                code.as_deref(),
                geom_key,
                parent_code.as_deref(),
            )?;
            println!("Added {} '{}' (id {})", region.level.as_str(), region.name, region.id);
        }

        Commands::AddAlias { db, region, alias } => {
            let conn = open_ready(&db)?;
            let registry = RegionRegistry::new(&conn);
            let target = registry
                .find_by_exact_name(&region)?
                .with_context(|| format!("No region named '{}'", region))?;
            registry.add_alias(target.id, &alias)?;
            println!("'{}' now resolves to {}", alias, target.name);
        }

        Commands::ListRegions { db } => {
            let conn = open_ready(&db)?;
            let registry = RegionRegistry::new(&conn);
            for region in registry.list()? {
                let aliases = registry.aliases_for(region.id)?;
                if aliases.is_empty() {
                    println!("{} ({})", region.name, region.level.as_str());
                } else {
                    println!(
                        "{} ({}) aliases: {}",
                        region.name,
                        region.level.as_str(),
                        aliases.join(", ")
                    );
                }
            }
        }
    }

    Ok(())
}

/// Open the database with schema ensured and districts seeded, the way the
/// original write path did on every call.
fn open_ready(path: &Path) -> Result<rusqlite::Connection> {
    let conn = db::open(path)?;
    db::init_schema(&conn)?;
    seed::seed_registry(&conn)?;
    Ok(conn)
}

fn init_tracing(default_filter: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow!("failed to initialize tracing: {}", e))
}
