//! Persistence layer for herald
//!
//! Provides [`SqliteDocumentStore`], the on-disk implementation of
//! [`herald_core::DocumentStore`] that holds channel records.

pub mod sqlite;

pub use sqlite::SqliteDocumentStore;
