pub mod engine;
pub mod merge;

pub use engine::ConsensusEngine;
pub use merge::{normalize_oem, CandidateMerger};
