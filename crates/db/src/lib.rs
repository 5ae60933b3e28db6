pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{
    begin_immediate, connect, connect_with_settings, table_exists, DbPool, DbTransaction,
};
pub use fixtures::{DemoSeedDataset, SeedResult, VerificationResult};
pub use repositories::RepositoryError;
