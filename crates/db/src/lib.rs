pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod seed;

pub use connection::{connect, connect_with_settings, DbPool};
pub use repositories::{
    FlowRepository, InMemoryFlowRepository, InMemoryUserRepository, RepositoryError,
    SqlFlowRepository, SqlUserRepository, UserRepository,
};
pub use seed::DemoSeedDataset;
