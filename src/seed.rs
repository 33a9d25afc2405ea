use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::info;

use crate::registry::{RegionLevel, RegionRegistry, RegistryError};

/// The 18 districts of continental Portugal. Seeded with `geom_key` equal to
/// the canonical name; external codes are assigned by operators later.
pub const DISTRICTS: &[&str] = &[
    "Aveiro",
    "Beja",
    "Braga",
    "Bragança",
    "Castelo Branco",
    "Coimbra",
    "Évora",
    "Faro",
    "Guarda",
    "Leiria",
    "Lisboa",
    "Portalegre",
    "Porto",
    "Santarém",
    "Setúbal",
    "Viana do Castelo",
    "Vila Real",
    "Viseu",
];

/// Spelling variants seen in scraped listings: English exonyms, accent-less
/// and hyphenated forms.
pub const DISTRICT_ALIASES: &[(&str, &str)] = &[
    ("Lisbon", "Lisboa"),
    ("Setubal", "Setúbal"),
    ("Evora", "Évora"),
    ("Braganca", "Bragança"),
    ("Santarem", "Santarém"),
    ("Viana-do-Castelo", "Viana do Castelo"),
    ("Vila-Real", "Vila Real"),
];

/// Seed the registry with the fixed districts and their alias set.
///
/// Idempotent: districts already present are left untouched, so this can run
/// on every startup the way the original write path ensured its seed rows.
pub fn seed_registry(conn: &Connection) -> Result<()> {
    let registry = RegionRegistry::new(conn);
    let mut added = 0usize;

    for name in DISTRICTS {
        match registry.add_region(RegionLevel::District, name, None, name, None) {
            Ok(_) => added += 1,
            Err(RegistryError::DuplicateName { .. }) => {}
            Err(e) => return Err(e.into()),
        }
    }

    for (alias, canonical) in DISTRICT_ALIASES {
        let region = registry
            .find_by_exact_name(canonical)?
            .with_context(|| format!("Seed alias '{}' targets unknown district", alias))?;
        registry.add_alias(region.id, alias)?;
    }

    if added > 0 {
        info!(districts = added, "seeded region registry");
    }
    Ok(())
}
