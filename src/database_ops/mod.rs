//! Storage access for both backends: pooled connections, dataset loading and
//! the document / relational write paths.

pub mod db;
pub mod document_store;
pub mod loader;
pub mod populate;
pub mod relational_store;

pub use db::Db;
pub use document_store::{DocumentStore, InsertSummary};
pub use loader::load_documents;
pub use populate::{populate_document_store, populate_relational_store, PopulateSummary};
pub use relational_store::RelationalStore;
