use tracing::debug;

use crate::normalize::normalize_key;
use crate::registry::{Region, RegionLevel, RegionRegistry, RegistryError};

/// What the caller wants back when the matched region is a municipality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionLevel {
    /// Roll municipalities up to their owning district. Analytics consumers
    /// key off districts, so this is the default.
    #[default]
    District,
    /// Return whatever matched, municipality or district.
    MostSpecific,
}

/// Outcome of resolving a raw location string. Unresolved is a normal result
/// for freeform scraped text, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved(Region),
    Unresolved,
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    pub fn into_region(self) -> Option<Region> {
        match self {
            Self::Resolved(region) => Some(region),
            Self::Unresolved => None,
        }
    }
}

/// Resolve a raw location string to a canonical region.
///
/// Matching is exact over the normalized key, canonical names first, then
/// aliases. No fuzzy matching: a wrong district assignment is worse than an
/// unresolved one.
pub fn resolve(
    registry: &RegionRegistry,
    raw: &str,
    level: ResolutionLevel,
) -> Result<Resolution, RegistryError> {
    if normalize_key(raw).is_empty() {
        return Ok(Resolution::Unresolved);
    }

    let hit = match registry.find_by_exact_name(raw)? {
        Some(region) => Some(region),
        None => registry.find_by_alias(raw)?,
    };

    let Some(region) = hit else {
        debug!(location = raw, "location did not resolve");
        return Ok(Resolution::Unresolved);
    };

    if level == ResolutionLevel::District && region.level == RegionLevel::Municipality {
        // A district-level answer needs the parent link; without one the
        // municipality match cannot be surfaced as a district.
        let Some(code) = region.parent_code.as_deref() else {
            debug!(name = %region.name, "municipality has no parent district");
            return Ok(Resolution::Unresolved);
        };
        return Ok(match registry.find_by_code(code)? {
            Some(parent) => Resolution::Resolved(parent),
            None => Resolution::Unresolved,
        });
    }

    Ok(Resolution::Resolved(region))
}
