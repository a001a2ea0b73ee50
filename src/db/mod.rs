pub mod cache;
mod connection;
pub mod helpers;
mod migrations;
pub mod models;
mod repositories;

pub use cache::{LocalCache, MemoryCache};
pub use connection::Database;
