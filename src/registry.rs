use rusqlite::{params, Connection, OptionalExtension};
use std::str::FromStr;
use thiserror::Error;

use crate::normalize::normalize_key;

/// Administrative level of a canonical region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionLevel {
    District,
    Municipality,
}

impl RegionLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::District => "district",
            Self::Municipality => "municipality",
        }
    }
}

impl FromStr for RegionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "district" => Ok(Self::District),
            "municipality" => Ok(Self::Municipality),
            other => Err(format!("unknown region level '{}'", other)),
        }
    }
}

/// A canonical region record. `name` keeps its diacritics; matching goes
/// through the normalized key columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub id: i64,
    pub level: RegionLevel,
    pub code: Option<String>,
    pub name: String,
    pub geom_key: String,
    pub parent_code: Option<String>,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("region name must not be empty")]
    EmptyName,
    #[error("{level} '{name}' already exists")]
    DuplicateName { level: &'static str, name: String },
    #[error("alias '{alias}' already resolves to '{bound_to}'")]
    AmbiguousAlias { alias: String, bound_to: String },
    #[error("parent code '{code}' does not match any district")]
    UnknownParent { code: String },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

const REGION_COLUMNS: &str = "id, level, code, name, geom_key, parent_code";

/// Canonical regions and their alias sets. Seeded once, append-only: regions
/// and aliases are added, never renamed or deleted.
pub struct RegionRegistry<'c> {
    conn: &'c Connection,
}

impl<'c> RegionRegistry<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Insert a new canonical region. Fails if `(level, name)` already exists
    /// (case- and diacritic-insensitively) or if a municipality's
    /// `parent_code` matches no district.
    pub fn add_region(
        &self,
        level: RegionLevel,
        name: &str,
        code: Option<&str>,
        geom_key: &str,
        parent_code: Option<&str>,
    ) -> Result<Region, RegistryError> {
        let name_norm = normalize_key(name);
        if name_norm.is_empty() {
            return Err(RegistryError::EmptyName);
        }

        let tx = self.conn.unchecked_transaction()?;

        if let Some(parent) = parent_code {
            let parent_exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM regions WHERE level = 'district' AND code = ?1)",
                params![parent],
                |row| row.get(0),
            )?;
            if !parent_exists {
                return Err(RegistryError::UnknownParent {
                    code: parent.to_string(),
                });
            }
        }

        let taken: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM regions WHERE level = ?1 AND name_norm = ?2)",
            params![level.as_str(), name_norm],
            |row| row.get(0),
        )?;
        if taken {
            return Err(RegistryError::DuplicateName {
                level: level.as_str(),
                name: name.to_string(),
            });
        }

        tx.execute(
            "INSERT INTO regions (level, code, name, name_norm, geom_key, parent_code)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![level.as_str(), code, name, name_norm, geom_key, parent_code],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(Region {
            id,
            level,
            code: code.map(str::to_string),
            name: name.to_string(),
            geom_key: geom_key.to_string(),
            parent_code: parent_code.map(str::to_string),
        })
    }

    /// Bind a spelling variant to a region. Re-adding an alias to the region
    /// it already points at is a no-op; binding it to a different region is
    /// rejected and leaves the registry unchanged.
    pub fn add_alias(&self, region_id: i64, alias: &str) -> Result<(), RegistryError> {
        let alias_norm = normalize_key(alias);
        if alias_norm.is_empty() {
            return Err(RegistryError::EmptyName);
        }

        let tx = self.conn.unchecked_transaction()?;

        let existing: Option<(i64, String)> = tx
            .query_row(
                "SELECT a.region_id, r.name
                 FROM region_aliases a
                 JOIN regions r ON r.id = a.region_id
                 WHERE a.alias_norm = ?1",
                params![alias_norm],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match existing {
            Some((bound_id, _)) if bound_id == region_id => Ok(()),
            Some((_, bound_to)) => Err(RegistryError::AmbiguousAlias {
                alias: alias.to_string(),
                bound_to,
            }),
            None => {
                tx.execute(
                    "INSERT INTO region_aliases (region_id, alias, alias_norm)
                     VALUES (?1, ?2, ?3)",
                    params![region_id, alias, alias_norm],
                )?;
                tx.commit()?;
                Ok(())
            }
        }
    }

    /// Case- and diacritic-insensitive lookup by canonical name. Districts
    /// win over same-named municipalities.
    pub fn find_by_exact_name(&self, name: &str) -> Result<Option<Region>, RegistryError> {
        let key = normalize_key(name);
        if key.is_empty() {
            return Ok(None);
        }
        let sql = format!(
            "SELECT {REGION_COLUMNS} FROM regions WHERE name_norm = ?1
             ORDER BY CASE level WHEN 'district' THEN 0 ELSE 1 END
             LIMIT 1"
        );
        let region = self
            .conn
            .query_row(&sql, params![key], region_from_row)
            .optional()?;
        Ok(region)
    }

    /// Case- and diacritic-insensitive lookup by registered alias.
    pub fn find_by_alias(&self, alias: &str) -> Result<Option<Region>, RegistryError> {
        let key = normalize_key(alias);
        if key.is_empty() {
            return Ok(None);
        }
        let sql = format!(
            "SELECT r.{} FROM region_aliases a
             JOIN regions r ON r.id = a.region_id
             WHERE a.alias_norm = ?1
             LIMIT 1",
            REGION_COLUMNS.replace(", ", ", r.")
        );
        let region = self
            .conn
            .query_row(&sql, params![key], region_from_row)
            .optional()?;
        Ok(region)
    }

    /// Lookup by external region code (used for municipality → district rollup).
    pub fn find_by_code(&self, code: &str) -> Result<Option<Region>, RegistryError> {
        let sql = format!("SELECT {REGION_COLUMNS} FROM regions WHERE code = ?1");
        let region = self
            .conn
            .query_row(&sql, params![code], region_from_row)
            .optional()?;
        Ok(region)
    }

    /// All regions, districts first, each level ordered by name.
    pub fn list(&self) -> Result<Vec<Region>, RegistryError> {
        let sql = format!(
            "SELECT {REGION_COLUMNS} FROM regions
             ORDER BY CASE level WHEN 'district' THEN 0 ELSE 1 END, name"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let regions = stmt
            .query_map([], region_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(regions)
    }

    /// Registered alias spellings for one region.
    pub fn aliases_for(&self, region_id: i64) -> Result<Vec<String>, RegistryError> {
        let mut stmt = self
            .conn
            .prepare("SELECT alias FROM region_aliases WHERE region_id = ?1 ORDER BY alias")?;
        let aliases = stmt
            .query_map(params![region_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(aliases)
    }
}

fn region_from_row(row: &rusqlite::Row) -> rusqlite::Result<Region> {
    let level_str: String = row.get(1)?;
    let level = level_str.parse::<RegionLevel>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, e.into())
    })?;
    Ok(Region {
        id: row.get(0)?,
        level,
        code: row.get(2)?,
        name: row.get(3)?,
        geom_key: row.get(4)?,
        parent_code: row.get(5)?,
    })
}
