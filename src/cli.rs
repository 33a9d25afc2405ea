use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::registry::RegionLevel;
use crate::resolver::ResolutionLevel;

#[derive(Parser, Debug)]
#[command(name = "listings-to-sqlite")]
#[command(version, about = "Ingest scraped vehicle listings into SQLite with canonical regions")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Resolution policy exposed on the command line.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum LevelArg {
    #[default]
    District,
    MostSpecific,
}

impl From<LevelArg> for ResolutionLevel {
    fn from(arg: LevelArg) -> Self {
        match arg {
            LevelArg::District => Self::District,
            LevelArg::MostSpecific => Self::MostSpecific,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum RegionLevelArg {
    #[default]
    District,
    Municipality,
}

impl From<RegionLevelArg> for RegionLevel {
    fn from(arg: RegionLevelArg) -> Self {
        match arg {
            RegionLevelArg::District => Self::District,
            RegionLevelArg::Municipality => Self::Municipality,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the schema and seed the 18 districts with their aliases
    Init {
        /// SQLite database path
        db: PathBuf,
    },

    /// Ingest raw listing records from a JSONL file
    Ingest {
        /// SQLite database path
        db: PathBuf,

        /// JSONL file, one raw listing per line
        input: PathBuf,

        /// Resolution policy for the stored region reference
        #[arg(short, long, value_enum, default_value_t = LevelArg::District)]
        level: LevelArg,
    },

    /// Resolve a single location string against the registry
    Resolve {
        /// SQLite database path
        db: PathBuf,

        /// Raw location text, e.g. "Viana-do-Castelo"
        location: String,

        #[arg(short, long, value_enum, default_value_t = LevelArg::District)]
        level: LevelArg,
    },

    /// Re-resolve listings whose region reference is still unset
    Backfill {
        /// SQLite database path
        db: PathBuf,

        #[arg(short, long, value_enum, default_value_t = LevelArg::District)]
        level: LevelArg,
    },

    /// Append a canonical region
    AddRegion {
        /// SQLite database path
        db: PathBuf,

        /// Canonical display name (diacritics preserved)
        name: String,

        #[arg(long, value_enum, default_value_t = RegionLevelArg::Municipality)]
        level: RegionLevelArg,

        /// External region code
        #[arg(long)]
        code: Option<String>,

        /// Geometry lookup key (defaults to the name)
        #[arg(long)]
        geom_key: Option<String>,

        /// Enclosing district's code, for municipalities
        #[arg(long)]
        parent_code: Option<String>,
    },

    /// Append a spelling variant for an existing region
    AddAlias {
        /// SQLite database path
        db: PathBuf,

        /// Canonical name of the owning region
        region: String,

        /// The new spelling variant
        alias: String,
    },

    /// List canonical regions and their aliases
    ListRegions {
        /// SQLite database path
        db: PathBuf,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
