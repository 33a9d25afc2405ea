pub mod cli;
pub mod db;
pub mod ingest;
pub mod normalize;
pub mod registry;
pub mod resolver;
pub mod seed;
pub mod store;

pub use ingest::{backfill_regions, IngestOutcome, IngestSummary, Ingestor, RawListing};
pub use registry::{Region, RegionLevel, RegionRegistry, RegistryError};
pub use resolver::{resolve, Resolution, ResolutionLevel};
pub use store::{Listing, ListingStore, UpsertOutcome};
