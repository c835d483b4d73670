//! Default collaborator implementations for tests and embedding.

pub mod in_memory_adapters;

pub use in_memory_adapters::InMemoryAdapterLookup;
