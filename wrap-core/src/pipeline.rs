//! Setup and prove orchestration.
//!
//! `ProofPipeline` owns its configuration and key store; key material flows
//! through the stage functions by value instead of living in shared state.
//! Every failure is tagged with the [`Stage`] that produced it.

use std::{
    marker::PhantomData,
    path::{Path, PathBuf},
    sync::Arc,
};

use ark_groth16::{Proof, ProvingKey, VerifyingKey};
use ark_std::rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    circuit::{CircuitParams, ConstraintProgram, VerifierCircuit, WitnessInput},
    export::{ContractInputs, OnChainProof},
    field::{CurveId, InnerField, InnerFieldId},
    groth16::{self, FullWitness, R1csMatrices, Solved, WrapCurve},
    keystore::{FileKeyStore, KeyStore},
    utils::{
        errors::{at, PipelineError, Stage, WrapError},
        fs::write_atomically,
    },
};

pub const DEFAULT_DATA_DIR: &str = "./data";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub witness: PathBuf,
    pub constraints: PathBuf,
    pub proving_key: PathBuf,
    pub verifying_key: PathBuf,
    /// Compiled circuit written by setup and reused by prove when set.
    pub compiled_circuit: Option<PathBuf>,
    pub proof: PathBuf,
    pub verifier_contract: PathBuf,
    pub curve: CurveId,
    pub inner_field: InnerFieldId,
    pub poseidon2_seed: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::in_dir(Path::new(DEFAULT_DATA_DIR))
    }
}

impl PipelineConfig {
    /// The standard file names under `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            witness: dir.join("groth16_witness.json"),
            constraints: dir.join("constraints.json"),
            proving_key: dir.join("vm_pk"),
            verifying_key: dir.join("vm_vk"),
            compiled_circuit: None,
            proof: dir.join("proof.data"),
            verifier_contract: dir.join("verifier.sol"),
            curve: CurveId::default(),
            inner_field: InnerFieldId::default(),
            poseidon2_seed: 0,
        }
    }

    pub fn key_store(&self) -> FileKeyStore {
        FileKeyStore {
            proving_key: self.proving_key.clone(),
            verifying_key: self.verifying_key.clone(),
            compiled_circuit: self.compiled_circuit.clone(),
        }
    }
}

/// A proof that passed local verification, with its public witness.
#[derive(Clone, Debug, PartialEq)]
pub struct WrappedProof<E: WrapCurve> {
    pub proof: Proof<E>,
    pub public_inputs: Vec<E::ScalarField>,
}

pub struct ProofPipeline<E: WrapCurve, I: InnerField, S: KeyStore = FileKeyStore> {
    config: PipelineConfig,
    keys: S,
    params: Arc<CircuitParams<E::ScalarField, I>>,
    _curve: PhantomData<fn() -> E>,
}

impl<E: WrapCurve, I: InnerField> ProofPipeline<E, I> {
    pub fn from_config(config: PipelineConfig) -> Result<Self, WrapError> {
        let keys = config.key_store();
        Self::new(config, keys)
    }
}

impl<E: WrapCurve, I: InnerField, S: KeyStore> ProofPipeline<E, I, S> {
    /// Fails when the configuration names a different curve or inner field
    /// than the pipeline is instantiated with.
    pub fn new(config: PipelineConfig, keys: S) -> Result<Self, WrapError> {
        if config.curve != E::ID {
            return Err(WrapError::CurveMismatch {
                expected: E::ID,
                found: config.curve,
            });
        }
        if config.inner_field != I::ID {
            return Err(WrapError::InputParse(format!(
                "pipeline emulates {}, configuration asks for {}",
                I::ID,
                config.inner_field
            )));
        }
        let params = Arc::new(CircuitParams::from_seed(config.poseidon2_seed));
        Ok(Self {
            config,
            keys,
            params,
            _curve: PhantomData,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn keys(&self) -> &S {
        &self.keys
    }

    fn read_input(&self) -> Result<(Arc<ConstraintProgram>, WitnessInput), PipelineError> {
        let program =
            ConstraintProgram::read(&self.config.constraints).map_err(at(Stage::ReadInput))?;
        let witness = WitnessInput::read(&self.config.witness).map_err(at(Stage::ReadInput))?;
        Ok((Arc::new(program), witness))
    }

    /// Builds the circuit twice from the same input, as template and as
    /// assignment, and checks the assignment satisfies every constraint.
    #[tracing::instrument(skip_all, name = "ProofPipeline::solve")]
    pub fn solve(&self) -> Result<Solved<E::ScalarField, I>, PipelineError> {
        let (program, input) = self.read_input()?;
        let witness = Arc::new(
            input
                .parse::<E::ScalarField, I>()
                .map_err(at(Stage::ReadInput))?,
        );
        let new_circuit = || {
            VerifierCircuit::new(program.clone(), Arc::clone(&witness), self.params.clone())
                .map_err(at(Stage::Solve))
        };
        let template = new_circuit()?;
        let assignment = new_circuit()?;
        groth16::solve(template, assignment).map_err(at(Stage::Solve))
    }

    fn solve_and_compile(
        &self,
    ) -> Result<(FullWitness<E::ScalarField>, R1csMatrices<E::ScalarField>), PipelineError> {
        let solved = self.solve()?;
        let matrices = match self.keys.load_compiled().map_err(at(Stage::Compile))? {
            Some(compiled) => E::unwrap_compiled(compiled).map_err(at(Stage::Compile))?,
            None => groth16::compile(solved.template).map_err(at(Stage::Compile))?,
        };
        Ok((solved.witness, matrices))
    }

    /// Solve, compile, run the circuit-specific setup, prove and verify once
    /// with the fresh keys, then persist them.
    #[tracing::instrument(skip_all, name = "ProofPipeline::setup")]
    pub fn setup<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
    ) -> Result<(ProvingKey<E>, VerifyingKey<E>), PipelineError> {
        let Solved { template, witness } = self.solve()?;
        let matrices = groth16::compile(template.clone()).map_err(at(Stage::Compile))?;
        let (pk, vk) = groth16::setup::<E, I, R>(template, rng).map_err(at(Stage::Setup))?;

        let proof = groth16::prove(&pk, &matrices, &witness, rng).map_err(at(Stage::Prove))?;
        groth16::verify(&vk, witness.public(), &proof).map_err(at(Stage::Verify))?;
        info!(curve = %E::ID, "setup self-check passed");

        self.keys.save_proving_key(&pk).map_err(at(Stage::PersistKeys))?;
        self.keys.save_verifying_key(&vk).map_err(at(Stage::PersistKeys))?;
        self.keys
            .save_compiled(&E::wrap_compiled(matrices))
            .map_err(at(Stage::PersistKeys))?;
        info!(
            proving_key = %self.config.proving_key.display(),
            verifying_key = %self.config.verifying_key.display(),
            "keys saved"
        );
        Ok((pk, vk))
    }

    /// Everything up to and including the mandatory local verification.
    ///
    /// The verifying key is loaded first. Proving key loading and the
    /// solve/compile of the circuit then run concurrently and are both
    /// joined; either failure aborts before proving starts.
    #[tracing::instrument(skip_all, name = "ProofPipeline::prove_and_verify")]
    pub fn prove_and_verify<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
    ) -> Result<WrappedProof<E>, PipelineError> {
        let vk = self
            .keys
            .load_verifying_key::<E>()
            .map_err(at(Stage::LoadVerifyingKey))?;

        let (pk, compiled) = rayon::join(
            || self.keys.load_proving_key::<E>(),
            || self.solve_and_compile(),
        );
        let pk = pk.map_err(at(Stage::LoadProvingKey))?;
        let (witness, matrices) = compiled?;

        let proof = groth16::prove(&pk, &matrices, &witness, rng).map_err(at(Stage::Prove))?;
        groth16::verify(&vk, witness.public(), &proof).map_err(at(Stage::Verify))?;
        info!(public_inputs = witness.public().len(), "proof verified");
        Ok(WrappedProof {
            proof,
            public_inputs: witness.public().to_vec(),
        })
    }

    /// Proves, verifies, and writes `proof.data`.
    #[tracing::instrument(skip_all, name = "ProofPipeline::prove")]
    pub fn prove<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
    ) -> Result<(WrappedProof<E>, OnChainProof), PipelineError> {
        let wrapped = self.prove_and_verify(rng)?;
        let on_chain =
            OnChainProof::new(&wrapped.proof, &wrapped.public_inputs).map_err(at(Stage::Export))?;
        on_chain
            .write_proof_data(&self.config.proof)
            .map_err(at(Stage::Export))?;
        info!(path = %self.config.proof.display(), "proof written");
        Ok((wrapped, on_chain))
    }

    /// Renders the verifier contract for the stored verifying key.
    #[tracing::instrument(skip_all, name = "ProofPipeline::export_verifier_contract")]
    pub fn export_verifier_contract(&self) -> Result<(), PipelineError> {
        let vk = self
            .keys
            .load_verifying_key::<E>()
            .map_err(at(Stage::LoadVerifyingKey))?;
        let source = E::verifier_contract(&vk).map_err(at(Stage::Export))?;
        let path = &self.config.verifier_contract;
        write_atomically(path, |w| std::io::Write::write_all(w, source.as_bytes()))
            .map_err(|e| WrapError::Export(format!("writing {}: {e}", path.display())))
            .map_err(at(Stage::Export))?;
        info!(path = %path.display(), "verifier contract written");
        Ok(())
    }

    /// Builds the contract-inputs JSON from the written `proof.data` and the
    /// witness's vkey hash, and writes it to `out`.
    #[tracing::instrument(skip_all, name = "ProofPipeline::contract_inputs")]
    pub fn contract_inputs(
        &self,
        public_values: &str,
        out: &Path,
    ) -> Result<ContractInputs, PipelineError> {
        let witness = WitnessInput::read(&self.config.witness).map_err(at(Stage::ReadInput))?;
        let data = std::fs::read_to_string(&self.config.proof)
            .map_err(|source| WrapError::InputRead {
                path: self.config.proof.clone(),
                source,
            })
            .map_err(at(Stage::ReadInput))?;
        let on_chain = OnChainProof::from_proof_data(&data).map_err(at(Stage::ReadInput))?;
        let inputs = ContractInputs::new(&on_chain, &witness.vkey_hash, public_values)
            .map_err(at(Stage::Export))?;
        inputs.write(out).map_err(at(Stage::Export))?;
        info!(path = %out.display(), "contract inputs written");
        Ok(inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{BabyBear, KoalaBear};
    use ark_bn254::Bn254;

    #[test]
    fn default_paths_live_under_data() {
        let config = PipelineConfig::default();
        assert_eq!(config.proving_key, Path::new("./data/vm_pk"));
        assert_eq!(config.verifying_key, Path::new("./data/vm_vk"));
        assert_eq!(config.witness, Path::new("./data/groth16_witness.json"));
        assert_eq!(config.proof, Path::new("./data/proof.data"));
        assert_eq!(config.curve, CurveId::Bn254);
    }

    #[test]
    fn config_fields_default_when_missing() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"curve": "bls12_381", "poseidon2_seed": 7}"#).unwrap();
        assert_eq!(config.curve, CurveId::Bls12_381);
        assert_eq!(config.poseidon2_seed, 7);
        assert_eq!(config.verifier_contract, Path::new("./data/verifier.sol"));
    }

    #[test]
    fn mismatched_configuration_is_rejected() {
        let config = PipelineConfig {
            curve: CurveId::Bls12_381,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            ProofPipeline::<Bn254, KoalaBear>::from_config(config),
            Err(WrapError::CurveMismatch { .. })
        ));

        let config = PipelineConfig::default();
        assert!(ProofPipeline::<Bn254, BabyBear>::from_config(config).is_err());
    }

    #[test]
    fn missing_witness_fails_in_read_input() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline =
            ProofPipeline::<Bn254, KoalaBear>::from_config(PipelineConfig::in_dir(dir.path()))
                .unwrap();
        let err = pipeline.solve().err().unwrap();
        assert_eq!(err.stage, Stage::ReadInput);
        assert!(matches!(err.source, WrapError::InputRead { .. }));
    }
}
