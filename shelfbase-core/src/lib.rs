// shelfbase-core/src/lib.rs
// Book catalog service over an embedded document store

pub mod aggregation;
pub mod book;
pub mod catalog;
pub mod config;
pub mod connection;
pub mod document;
pub mod error;
pub mod find_options;
pub mod index;
pub mod logging;
pub mod query;
pub mod reports;
pub mod store;
pub mod value_utils;

// Public exports
pub use book::{seed_books, Book, BookField, PartialBook};
pub use catalog::{CatalogService, GenreCount, SortOrder, DEFAULT_PAGE_SIZE};
pub use config::ShelfConfig;
pub use connection::{with_connection, Connection, SharedStore};
pub use document::DocumentId;
pub use error::{Result, ShelfError};
pub use find_options::FindOptions;
pub use index::{IndexDirection, IndexSpec};
pub use logging::LogLevel;
pub use query::Query;
pub use reports::{AuthorCount, DecadeCount, GenreAverage};
pub use store::{DocumentStore, FileStore, MemoryStore, StoreUri, UpdateResult};
