use std::path::PathBuf;

use ark_relations::r1cs::SynthesisError;
use strum_macros::Display;
use thiserror::Error;

use crate::field::CurveId;

#[derive(Error, Debug)]
pub enum WrapError {
    #[error("failed to read {}: {source}", path.display())]
    InputRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse input: {0}")]
    InputParse(String),
    #[error("malformed constraint program: {0}")]
    Circuit(String),
    #[error("circuit is not satisfied by the assignment: {0}")]
    Solve(String),
    #[error("failed to compile circuit: {0}")]
    Compile(String),
    #[error("compiled circuit targets {found}, expected {expected}")]
    CurveMismatch { expected: CurveId, found: CurveId },
    #[error("failed to read key material from {}: {reason}", path.display())]
    KeyRead { path: PathBuf, reason: String },
    #[error("failed to write key material to {}: {reason}", path.display())]
    KeyWrite { path: PathBuf, reason: String },
    #[error("groth16 setup failed: {0}")]
    Setup(SynthesisError),
    #[error("groth16 proving failed: {0}")]
    Prove(SynthesisError),
    #[error("proof verification failed: {0}")]
    Verify(String),
    #[error("export failed: {0}")]
    Export(String),
}

/// Pipeline stage that produced a failure.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum Stage {
    ReadInput,
    Solve,
    Compile,
    Setup,
    LoadVerifyingKey,
    LoadProvingKey,
    Prove,
    Verify,
    PersistKeys,
    Export,
}

#[derive(Error, Debug)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: WrapError,
}

impl PipelineError {
    pub fn new(stage: Stage, source: WrapError) -> Self {
        Self { stage, source }
    }
}

/// Tags a stage's result with the stage name, for `map_err`.
pub fn at(stage: Stage) -> impl FnOnce(WrapError) -> PipelineError {
    move |source| PipelineError::new(stage, source)
}
