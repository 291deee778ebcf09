//! Gateway implementations.

pub mod memory;
pub mod pinecone;

pub use memory::{GatewayCall, MemoryStore, Readiness};
pub use pinecone::PineconeClient;
