//! Vector store integration for the Pinecone target.
//!
//! This crate treats the vector store as a capability interface
//! (`VectorStoreGateway`): list, create, delete and describe indexes,
//! read aggregate stats, and upsert vectors.
//!
//! # Providers
//! - **Pinecone**: REST control plane + data plane (default)
//! - **Memory**: in-process store for dry runs and tests
//!
//! # Example
//! ```no_run
//! use pinesink_vector::{VectorStoreGateway, providers::PineconeClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = PineconeClient::new("https://controller.us-west1-gcp.pinecone.io", "api-key")?;
//! for name in client.list_indexes().await? {
//!     println!("{}", name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod factory;
pub mod gateway;
pub mod providers;
pub mod types;

// Re-export main types
pub use factory::create_gateway;
pub use gateway::VectorStoreGateway;
pub use providers::{GatewayCall, MemoryStore, PineconeClient, Readiness};
pub use types::{
    IndexDescriptor, IndexSpec, IndexStats, IndexStatus, Metadata, Metric, NamespaceStats,
    VectorRecord,
};
