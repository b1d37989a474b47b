#![allow(clippy::needless_range_loop)]
#![allow(clippy::len_without_is_empty)]

pub mod circuit;
pub mod export;
pub mod field;
pub mod gadgets;
pub mod groth16;
pub mod keystore;
pub mod pipeline;
pub mod poseidon2;
pub mod utils;

pub use pipeline::{PipelineConfig, ProofPipeline, WrappedProof};
pub use utils::errors::{PipelineError, Stage, WrapError};
