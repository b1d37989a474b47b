//! Groth16 over the verifier circuit: solving, compiling to R1CS matrices,
//! circuit-specific setup, proving from pre-compiled matrices and
//! verification.
//!
//! The compiled constraint system is curve-specific. [`CompiledCircuit`] tags
//! it with the curve it was compiled for, and converting it back to the
//! matrices of another curve is a typed error.

use std::io::{Read, Write};

use alloy_primitives::U256;
use ark_bls12_381::Bls12_381;
use ark_bn254::Bn254;
use ark_ec::pairing::Pairing;
use ark_ff::{PrimeField, UniformRand};
use ark_groth16::{Groth16, Proof, ProvingKey, VerifyingKey};
use ark_relations::r1cs::{
    ConstraintMatrices, ConstraintSynthesizer, ConstraintSystem, OptimizationGoal,
    SynthesisMode,
};
use ark_serialize::{
    CanonicalDeserialize, CanonicalSerialize, Compress, SerializationError, Valid, Validate,
};
use ark_snark::SNARK;
use ark_std::rand::{CryptoRng, RngCore};
use tracing::info;

use crate::{
    circuit::VerifierCircuit,
    export,
    field::{CurveId, InnerField},
    utils::errors::WrapError,
};
use common::constants::EVM_PROOF_WORDS;

/// Sparse R1CS matrices of a compiled circuit, as consumed by the prover.
///
/// Validated deserialization also checks the shape, see
/// [`R1csMatrices::check_shape`].
#[derive(Clone, Debug, PartialEq, Eq, CanonicalSerialize)]
pub struct R1csMatrices<F: PrimeField> {
    pub num_instance_variables: usize,
    pub num_witness_variables: usize,
    pub num_constraints: usize,
    pub a: Vec<Vec<(F, usize)>>,
    pub b: Vec<Vec<(F, usize)>>,
    pub c: Vec<Vec<(F, usize)>>,
}

impl<F: PrimeField> R1csMatrices<F> {
    /// Every matrix has one row per constraint and only indexes variables of
    /// the assignment.
    pub fn check_shape(&self) -> Result<(), String> {
        let columns = self
            .num_instance_variables
            .checked_add(self.num_witness_variables)
            .ok_or("variable count overflows")?;
        for (name, matrix) in [("a", &self.a), ("b", &self.b), ("c", &self.c)] {
            if matrix.len() != self.num_constraints {
                return Err(format!(
                    "matrix {name} has {} rows for {} constraints",
                    matrix.len(),
                    self.num_constraints
                ));
            }
            if let Some((_, column)) = matrix.iter().flatten().find(|(_, col)| *col >= columns) {
                return Err(format!(
                    "matrix {name} references variable {column}, assignment has {columns}"
                ));
            }
        }
        Ok(())
    }

    fn to_constraint_matrices(&self) -> ConstraintMatrices<F> {
        let non_zero = |m: &Vec<Vec<(F, usize)>>| m.iter().map(Vec::len).sum();
        ConstraintMatrices {
            num_instance_variables: self.num_instance_variables,
            num_witness_variables: self.num_witness_variables,
            num_constraints: self.num_constraints,
            a_num_non_zero: non_zero(&self.a),
            b_num_non_zero: non_zero(&self.b),
            c_num_non_zero: non_zero(&self.c),
            a: self.a.clone(),
            b: self.b.clone(),
            c: self.c.clone(),
        }
    }
}

impl<F: PrimeField> Valid for R1csMatrices<F> {
    fn check(&self) -> Result<(), SerializationError> {
        self.check_shape()
            .map_err(|_| SerializationError::InvalidData)
    }
}

impl<F: PrimeField> CanonicalDeserialize for R1csMatrices<F> {
    fn deserialize_with_mode<R: Read>(
        mut reader: R,
        compress: Compress,
        validate: Validate,
    ) -> Result<Self, SerializationError> {
        let matrices = Self {
            num_instance_variables: usize::deserialize_with_mode(&mut reader, compress, validate)?,
            num_witness_variables: usize::deserialize_with_mode(&mut reader, compress, validate)?,
            num_constraints: usize::deserialize_with_mode(&mut reader, compress, validate)?,
            a: Vec::deserialize_with_mode(&mut reader, compress, validate)?,
            b: Vec::deserialize_with_mode(&mut reader, compress, validate)?,
            c: Vec::deserialize_with_mode(&mut reader, compress, validate)?,
        };
        if let Validate::Yes = validate {
            matrices.check()?;
        }
        Ok(matrices)
    }
}

impl<F: PrimeField> From<ConstraintMatrices<F>> for R1csMatrices<F> {
    fn from(m: ConstraintMatrices<F>) -> Self {
        Self {
            num_instance_variables: m.num_instance_variables,
            num_witness_variables: m.num_witness_variables,
            num_constraints: m.num_constraints,
            a: m.a,
            b: m.b,
            c: m.c,
        }
    }
}

/// A compiled constraint system for one of the supported curves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompiledCircuit {
    Bn254(R1csMatrices<ark_bn254::Fr>),
    Bls12_381(R1csMatrices<ark_bls12_381::Fr>),
}

impl CompiledCircuit {
    pub fn curve(&self) -> CurveId {
        match self {
            CompiledCircuit::Bn254(_) => CurveId::Bn254,
            CompiledCircuit::Bls12_381(_) => CurveId::Bls12_381,
        }
    }

    pub fn num_constraints(&self) -> usize {
        match self {
            CompiledCircuit::Bn254(m) => m.num_constraints,
            CompiledCircuit::Bls12_381(m) => m.num_constraints,
        }
    }
}

impl Valid for CompiledCircuit {
    fn check(&self) -> Result<(), SerializationError> {
        match self {
            CompiledCircuit::Bn254(m) => m.check(),
            CompiledCircuit::Bls12_381(m) => m.check(),
        }
    }
}

impl CanonicalSerialize for CompiledCircuit {
    fn serialize_with_mode<W: Write>(
        &self,
        mut writer: W,
        compress: Compress,
    ) -> Result<(), SerializationError> {
        self.curve().tag().serialize_with_mode(&mut writer, compress)?;
        match self {
            CompiledCircuit::Bn254(m) => m.serialize_with_mode(writer, compress),
            CompiledCircuit::Bls12_381(m) => m.serialize_with_mode(writer, compress),
        }
    }

    fn serialized_size(&self, compress: Compress) -> usize {
        1 + match self {
            CompiledCircuit::Bn254(m) => m.serialized_size(compress),
            CompiledCircuit::Bls12_381(m) => m.serialized_size(compress),
        }
    }
}

impl CanonicalDeserialize for CompiledCircuit {
    fn deserialize_with_mode<R: Read>(
        mut reader: R,
        compress: Compress,
        validate: Validate,
    ) -> Result<Self, SerializationError> {
        let tag = u8::deserialize_with_mode(&mut reader, compress, validate)?;
        match CurveId::from_tag(tag) {
            Some(CurveId::Bn254) => Ok(CompiledCircuit::Bn254(
                R1csMatrices::deserialize_with_mode(reader, compress, validate)?,
            )),
            Some(CurveId::Bls12_381) => Ok(CompiledCircuit::Bls12_381(
                R1csMatrices::deserialize_with_mode(reader, compress, validate)?,
            )),
            None => Err(SerializationError::InvalidData),
        }
    }
}

/// A pairing curve the wrapper can target.
pub trait WrapCurve: Pairing {
    const ID: CurveId;

    fn wrap_compiled(matrices: R1csMatrices<Self::ScalarField>) -> CompiledCircuit;

    fn unwrap_compiled(
        compiled: CompiledCircuit,
    ) -> Result<R1csMatrices<Self::ScalarField>, WrapError>;

    /// Proof points as EVM words, in verifier-contract order.
    fn on_chain_words(proof: &Proof<Self>) -> Result<[U256; EVM_PROOF_WORDS], WrapError>;

    /// Solidity source of a verifier hard-coding `vk`.
    fn verifier_contract(vk: &VerifyingKey<Self>) -> Result<String, WrapError>;
}

impl WrapCurve for Bn254 {
    const ID: CurveId = CurveId::Bn254;

    fn wrap_compiled(matrices: R1csMatrices<Self::ScalarField>) -> CompiledCircuit {
        CompiledCircuit::Bn254(matrices)
    }

    fn unwrap_compiled(
        compiled: CompiledCircuit,
    ) -> Result<R1csMatrices<Self::ScalarField>, WrapError> {
        match compiled {
            CompiledCircuit::Bn254(m) => Ok(m),
            other => Err(WrapError::CurveMismatch {
                expected: Self::ID,
                found: other.curve(),
            }),
        }
    }

    fn on_chain_words(proof: &Proof<Self>) -> Result<[U256; EVM_PROOF_WORDS], WrapError> {
        export::bn254_proof_words(proof)
    }

    fn verifier_contract(vk: &VerifyingKey<Self>) -> Result<String, WrapError> {
        export::solidity::render_verifier(vk)
    }
}

impl WrapCurve for Bls12_381 {
    const ID: CurveId = CurveId::Bls12_381;

    fn wrap_compiled(matrices: R1csMatrices<Self::ScalarField>) -> CompiledCircuit {
        CompiledCircuit::Bls12_381(matrices)
    }

    fn unwrap_compiled(
        compiled: CompiledCircuit,
    ) -> Result<R1csMatrices<Self::ScalarField>, WrapError> {
        match compiled {
            CompiledCircuit::Bls12_381(m) => Ok(m),
            other => Err(WrapError::CurveMismatch {
                expected: Self::ID,
                found: other.curve(),
            }),
        }
    }

    fn on_chain_words(_proof: &Proof<Self>) -> Result<[U256; EVM_PROOF_WORDS], WrapError> {
        Err(WrapError::Export(format!(
            "{} proofs have no EVM encoding",
            Self::ID
        )))
    }

    fn verifier_contract(_vk: &VerifyingKey<Self>) -> Result<String, WrapError> {
        Err(WrapError::Export(format!(
            "no on-chain verifier for {}",
            Self::ID
        )))
    }
}

/// Assignment of a satisfied circuit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FullWitness<F: PrimeField> {
    /// Instance assignment, starting with the constant one.
    pub instance: Vec<F>,
    pub witness: Vec<F>,
}

impl<F: PrimeField> FullWitness<F> {
    /// The public witness: instance assignment without the leading one.
    pub fn public(&self) -> &[F] {
        &self.instance[1..]
    }

    fn full_assignment(&self) -> Vec<F> {
        self.instance.iter().chain(&self.witness).copied().collect()
    }
}

/// Result of a successful solve: the template to compile and the assignment.
pub struct Solved<F: PrimeField, I: InnerField> {
    pub template: VerifierCircuit<F, I>,
    pub witness: FullWitness<F>,
}

/// Synthesizes `assignment` with values and checks every constraint.
#[tracing::instrument(skip_all, name = "groth16::solve")]
pub fn solve<F: PrimeField, I: InnerField>(
    template: VerifierCircuit<F, I>,
    assignment: VerifierCircuit<F, I>,
) -> Result<Solved<F, I>, WrapError> {
    let cs = ConstraintSystem::<F>::new_ref();
    cs.set_optimization_goal(OptimizationGoal::Constraints);
    assignment
        .generate_constraints(cs.clone())
        .map_err(|e| WrapError::Solve(e.to_string()))?;
    cs.finalize();

    let satisfied = cs
        .is_satisfied()
        .map_err(|e| WrapError::Solve(e.to_string()))?;
    if !satisfied {
        let which = cs
            .which_is_unsatisfied()
            .ok()
            .flatten()
            .unwrap_or_else(|| "unknown constraint".to_string());
        return Err(WrapError::Solve(which));
    }

    let witness = {
        let inner = cs
            .borrow()
            .ok_or_else(|| WrapError::Solve("constraint system was dropped".into()))?;
        FullWitness {
            instance: inner.instance_assignment.clone(),
            witness: inner.witness_assignment.clone(),
        }
    };
    info!(
        constraints = cs.num_constraints(),
        public_inputs = witness.public().len(),
        "solved with success"
    );
    Ok(Solved { template, witness })
}

/// Compiles the template into R1CS matrices, exactly as setup does.
#[tracing::instrument(skip_all, name = "groth16::compile")]
pub fn compile<F: PrimeField, I: InnerField>(
    template: VerifierCircuit<F, I>,
) -> Result<R1csMatrices<F>, WrapError> {
    let cs = ConstraintSystem::<F>::new_ref();
    cs.set_optimization_goal(OptimizationGoal::Constraints);
    cs.set_mode(SynthesisMode::Setup);
    template
        .generate_constraints(cs.clone())
        .map_err(|e| WrapError::Compile(e.to_string()))?;
    cs.finalize();
    let matrices = cs
        .to_matrices()
        .ok_or_else(|| WrapError::Compile("constraint matrices unavailable".into()))?;
    info!(constraints = matrices.num_constraints, "compiled circuit");
    Ok(matrices.into())
}

#[tracing::instrument(skip_all, name = "groth16::setup")]
pub fn setup<E: WrapCurve, I: InnerField, R: RngCore + CryptoRng>(
    template: VerifierCircuit<E::ScalarField, I>,
    rng: &mut R,
) -> Result<(ProvingKey<E>, VerifyingKey<E>), WrapError> {
    Groth16::<E>::circuit_specific_setup(template, rng).map_err(WrapError::Setup)
}

/// Proves from pre-compiled matrices, skipping a second synthesis.
#[tracing::instrument(skip_all, name = "groth16::prove")]
pub fn prove<E: WrapCurve, R: RngCore + CryptoRng>(
    pk: &ProvingKey<E>,
    matrices: &R1csMatrices<E::ScalarField>,
    witness: &FullWitness<E::ScalarField>,
    rng: &mut R,
) -> Result<Proof<E>, WrapError> {
    matrices.check_shape().map_err(WrapError::Compile)?;
    let columns = matrices.num_instance_variables + matrices.num_witness_variables;
    if pk.a_query.len() != columns
        || pk.b_g1_query.len() != columns
        || pk.b_g2_query.len() != columns
        || pk.l_query.len() != matrices.num_witness_variables
    {
        return Err(WrapError::Compile(format!(
            "proving key does not fit a circuit with {columns} variables"
        )));
    }
    if matrices.num_instance_variables != witness.instance.len()
        || matrices.num_witness_variables != witness.witness.len()
    {
        return Err(WrapError::Compile(format!(
            "compiled circuit has {}/{} instance/witness variables, assignment has {}/{}",
            matrices.num_instance_variables,
            matrices.num_witness_variables,
            witness.instance.len(),
            witness.witness.len()
        )));
    }
    let r = E::ScalarField::rand(rng);
    let s = E::ScalarField::rand(rng);
    Groth16::<E>::create_proof_with_reduction_and_matrices(
        pk,
        r,
        s,
        &matrices.to_constraint_matrices(),
        matrices.num_instance_variables,
        matrices.num_constraints,
        &witness.full_assignment(),
    )
    .map_err(WrapError::Prove)
}

/// Verifies `proof`; a rejected proof is an error, never `Ok(false)`.
#[tracing::instrument(skip_all, name = "groth16::verify")]
pub fn verify<E: WrapCurve>(
    vk: &VerifyingKey<E>,
    public: &[E::ScalarField],
    proof: &Proof<E>,
) -> Result<(), WrapError> {
    match Groth16::<E>::verify(vk, public, proof) {
        Ok(true) => Ok(()),
        Ok(false) => Err(WrapError::Verify("pairing check rejected the proof".into())),
        Err(e) => Err(WrapError::Verify(e.to_string())),
    }
}
