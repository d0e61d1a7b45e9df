pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod store;

pub use connection::{connect, connect_with_settings, DbPool};
pub use fixtures::{ClinicSeedDataset, SeedResult, VerificationResult};
pub use store::{MemoryRecordStore, RecordStore, SqlRecordStore, StoreError};
