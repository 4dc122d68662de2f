//! ms-db: database access and persistence layer.
//!
//! This crate provides SQLite-backed storage with connection pooling,
//! embedded migrations, typed models, and query modules for libraries,
//! library roots, media records, jobs and images.

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
