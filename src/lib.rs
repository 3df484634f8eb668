pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod repository;
pub mod schedule;
pub mod store;
pub mod sweeper;
pub mod wal;
