//! TradeHub Storage Library
//!
//! Document store abstraction and the chunked blob layer built on top of it.
//!
//! # Path format
//!
//! Paths alternate collection and document segments, separated by `/`:
//!
//! - blob metadata document: `products-images/{id}`
//! - chunk documents: `products-images/{id}/chunks/chunk{i}`
//!
//! Paths must not contain `..`, empty segments or a leading `/`. Path
//! construction is centralized in the `keys` module so all backends agree.

pub mod blob;
pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod traits;

// Re-export commonly used types
pub use blob::{BlobStore, FetchedBlob, StoreRequest};
pub use factory::create_document_store;
#[cfg(feature = "storage-local")]
pub use local::LocalDocumentStore;
pub use memory::MemoryDocumentStore;
pub use tradehub_core::StorageBackend;
pub use traits::{DocumentStore, StorageError, StorageResult, WriteBatch, WriteOp};
