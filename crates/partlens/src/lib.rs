//! OEM spare-part number resolution.
//!
//! Turns a free-text part request plus partial vehicle data into an
//! authoritative manufacturer part number with a calibrated confidence,
//! by fusing evidence from catalog scrapers, marketplaces, web search,
//! inference, vision, and a self-learning local store.

pub mod config;
pub mod consensus;
pub mod enrich;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod health;
pub mod learning;
pub mod llm;
pub mod metrics;
pub mod resolver;
pub mod sources;
pub mod store;
pub mod types;
pub mod validate;
pub mod variants;

// Re-export the primary surface for convenience
pub use config::ResolverConfig;
pub use error::{AdapterError, InferenceError, ResolveError};
pub use resolver::{PartResolver, PartResolverBuilder};
pub use types::{
    Candidate, ConsensusResult, PartCategory, PartQuery, PartVariant, ResolutionRequest,
    ResolutionResult, ValidationOutcome, VariantResult, Vehicle,
};

pub use uuid::Uuid;
