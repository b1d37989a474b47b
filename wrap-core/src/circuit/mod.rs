//! The verifier circuit: interprets a [`ConstraintProgram`] over a parsed
//! witness and binds the two public inputs.

pub mod program;
pub mod witness;

use std::{collections::HashMap, sync::Arc};

use ark_ff::PrimeField;
use ark_r1cs_std::{
    alloc::AllocVar,
    boolean::Boolean,
    eq::EqGadget,
    fields::{fp::FpVar, FieldVar},
    select::CondSelectGadget,
    R1CSVar,
};
use ark_relations::{
    ns,
    r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError},
};

pub use program::{ConstraintProgram, Instruction, Kind, ProgramBounds};
pub use witness::{ParsedWitness, WitnessInput};

use crate::{
    field::{BinomialExtension, InnerField},
    gadgets::{bits::compose_le, bits::enforce_bit_length, ExtVar, FeltVar},
    poseidon2::{inner_params, outer_params, Poseidon2Chip, Poseidon2Params},
    utils::errors::WrapError,
};
use common::constants::{
    DIGEST_TOP_BYTE_MASK, INNER_FIELD_BITS, INNER_PERMUTATION_WIDTH, OUTER_PERMUTATION_WIDTH,
};

/// Poseidon2 instances the program's `permute` and `permute_inner`
/// instructions run.
#[derive(Clone, Debug)]
pub struct CircuitParams<F: PrimeField, I: InnerField> {
    pub outer: Poseidon2Params<F, OUTER_PERMUTATION_WIDTH>,
    pub inner: Poseidon2Params<I, INNER_PERMUTATION_WIDTH>,
}

impl<F: PrimeField, I: InnerField> CircuitParams<F, I> {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            outer: outer_params(seed),
            inner: inner_params(seed),
        }
    }
}

/// `NewCircuit(input)`: cheap to clone, deterministic in its inputs. Two
/// instances built from the same program have the same constraint topology
/// whatever values the witness carries.
#[derive(Clone, Debug)]
pub struct VerifierCircuit<F: PrimeField, I: InnerField> {
    program: Arc<ConstraintProgram>,
    witness: Arc<ParsedWitness<F, I>>,
    params: Arc<CircuitParams<F, I>>,
}

fn first_byte_bits() -> usize {
    DIGEST_TOP_BYTE_MASK.count_ones() as usize
}

impl<F: PrimeField, I: InnerField> VerifierCircuit<F, I> {
    pub fn new(
        program: Arc<ConstraintProgram>,
        witness: Arc<ParsedWitness<F, I>>,
        params: Arc<CircuitParams<F, I>>,
    ) -> Result<Self, WrapError> {
        params.outer.validate()?;
        params.inner.validate()?;
        program.validate(Self::bounds(&witness))?;
        for inst in &program.instructions {
            match inst {
                Instruction::ImmVar { value, .. } => {
                    witness::parse_outer::<F>(value, "imm_var")
                        .map_err(|e| WrapError::Circuit(e.to_string()))?;
                }
                Instruction::ImmFelt { value, .. } => {
                    witness::parse_inner::<I>(value, "imm_felt")
                        .map_err(|e| WrapError::Circuit(e.to_string()))?;
                }
                Instruction::ImmExt { value, .. } => {
                    for limb in value {
                        witness::parse_inner::<I>(limb, "imm_ext")
                            .map_err(|e| WrapError::Circuit(e.to_string()))?;
                    }
                }
                _ => {}
            }
        }
        Ok(Self {
            program,
            witness,
            params,
        })
    }

    fn bounds(witness: &ParsedWitness<F, I>) -> ProgramBounds {
        let usable_bits = F::MODULUS_BIT_SIZE as usize - 1;
        ProgramBounds {
            num_vars: witness.vars.len(),
            num_felts: witness.felts.len(),
            num_exts: witness.exts.len(),
            max_var_bits: usable_bits,
            max_packed_felts: usable_bits / INNER_FIELD_BITS,
        }
    }

    /// Public inputs in allocation order: `[vkey_hash, committed_values_digest]`.
    pub fn public_inputs(&self) -> Vec<F> {
        vec![self.witness.vkey_hash, self.witness.committed_values_digest]
    }

    pub fn witness(&self) -> &ParsedWitness<F, I> {
        &self.witness
    }
}

struct Interpreter<'a, F: PrimeField, I: InnerField> {
    cs: ConstraintSystemRef<F>,
    witness: &'a ParsedWitness<F, I>,
    outer: Poseidon2Chip<FpVar<F>, OUTER_PERMUTATION_WIDTH>,
    inner: Poseidon2Chip<FeltVar<F, I>, INNER_PERMUTATION_WIDTH>,
    public: [FpVar<F>; 2],
    vars: HashMap<&'a str, FpVar<F>>,
    felts: HashMap<&'a str, FeltVar<F, I>>,
    exts: HashMap<&'a str, ExtVar<F, I>>,
}

fn lookup<'m, T>(map: &'m HashMap<&str, T>, name: &str) -> Result<&'m T, SynthesisError> {
    // validated programs never reference an undefined name
    map.get(name).ok_or(SynthesisError::AssignmentMissing)
}

impl<'a, F: PrimeField, I: InnerField> Interpreter<'a, F, I> {
    fn var(&self, name: &str) -> Result<&FpVar<F>, SynthesisError> {
        lookup(&self.vars, name)
    }

    fn felt(&self, name: &str) -> Result<&FeltVar<F, I>, SynthesisError> {
        lookup(&self.felts, name)
    }

    fn ext(&self, name: &str) -> Result<&ExtVar<F, I>, SynthesisError> {
        lookup(&self.exts, name)
    }

    /// Reads a var as a boolean, constraining it to be 0 or 1.
    fn boolean(&self, name: &str) -> Result<Boolean<F>, SynthesisError> {
        let v = self.var(name)?;
        if let FpVar::Constant(c) = v {
            return match (c.is_zero(), c.is_one()) {
                (true, _) => Ok(Boolean::FALSE),
                (_, true) => Ok(Boolean::TRUE),
                _ => Err(SynthesisError::Unsatisfiable),
            };
        }
        let bit = Boolean::new_witness(self.cs.clone(), || v.value().map(|x| x.is_one()))?;
        FpVar::from(bit.clone()).enforce_equal(v)?;
        Ok(bit)
    }

    fn imm_outer(value: &str) -> Result<F, SynthesisError> {
        witness::parse_outer(value, "imm").map_err(|_| SynthesisError::Unsatisfiable)
    }

    fn imm_inner(value: &str) -> Result<I, SynthesisError> {
        witness::parse_inner(value, "imm").map_err(|_| SynthesisError::Unsatisfiable)
    }

    fn pack_felts(&self, names: &[String]) -> Result<FpVar<F>, SynthesisError> {
        let shift = F::from(1u64 << INNER_FIELD_BITS);
        let mut acc = FpVar::zero();
        for name in names {
            acc = acc * shift + self.felt(name)?.to_canonical_var()?;
        }
        Ok(acc)
    }

    fn pack_bytes(&self, names: &[String]) -> Result<FpVar<F>, SynthesisError> {
        let byte_shift = F::from(256u64);
        let mut acc = FpVar::zero();
        for (i, name) in names.iter().enumerate() {
            let bits = self.felt(name)?.to_bits_le(8)?;
            let byte = if i == 0 {
                compose_le(&bits[..first_byte_bits()])
            } else {
                compose_le(&bits)
            };
            acc = acc * byte_shift + byte;
        }
        Ok(acc)
    }

    fn exec(&mut self, inst: &'a Instruction) -> Result<(), SynthesisError> {
        use Instruction::*;
        match inst {
            ImmVar { out, value } => {
                self.vars
                    .insert(out, FpVar::constant(Self::imm_outer(value)?));
            }
            WitnessVar { out, index } => {
                let value = self.witness.vars.get(*index).copied();
                let var = FpVar::new_witness(ns!(self.cs, "witness_var"), || {
                    value.ok_or(SynthesisError::AssignmentMissing)
                })?;
                self.vars.insert(out, var);
            }
            AddVar { out, a, b } => {
                let v = self.var(a)? + self.var(b)?;
                self.vars.insert(out, v);
            }
            SubVar { out, a, b } => {
                let v = self.var(a)? - self.var(b)?;
                self.vars.insert(out, v);
            }
            MulVar { out, a, b } => {
                let v = self.var(a)? * self.var(b)?;
                self.vars.insert(out, v);
            }
            InvVar { out, a } => {
                let v = self.var(a)?.inverse()?;
                self.vars.insert(out, v);
            }
            AssertEqVar { a, b } => self.var(a)?.enforce_equal(self.var(b)?)?,
            AssertNeVar { a, b } => self.var(a)?.enforce_not_equal(self.var(b)?)?,
            SelectVar { out, cond, a, b } => {
                let c = self.boolean(cond)?;
                let v = FpVar::conditionally_select(&c, self.var(a)?, self.var(b)?)?;
                self.vars.insert(out, v);
            }
            Num2bitsVar { out, a } => {
                let bits = enforce_bit_length(self.var(a)?, out.len())?;
                for (name, bit) in out.iter().zip(bits) {
                    self.vars.insert(name, FpVar::from(bit));
                }
            }
            Permute { state } => {
                let mut values = [
                    self.var(&state[0])?.clone(),
                    self.var(&state[1])?.clone(),
                    self.var(&state[2])?.clone(),
                ];
                self.outer.permute_mut(&mut values)?;
                for (name, v) in state.iter().zip(values) {
                    self.vars.insert(name, v);
                }
            }

            ImmFelt { out, value } => {
                self.felts
                    .insert(out, FeltVar::constant(Self::imm_inner(value)?));
            }
            WitnessFelt { out, index } => {
                let value = self.witness.felts.get(*index).copied();
                let felt = FeltVar::new_witness(self.cs.clone(), || {
                    value.ok_or(SynthesisError::AssignmentMissing)
                })?;
                self.felts.insert(out, felt);
            }
            AddFelt { out, a, b } => {
                let v = self.felt(a)?.add(self.felt(b)?)?;
                self.felts.insert(out, v);
            }
            SubFelt { out, a, b } => {
                let v = self.felt(a)?.sub(self.felt(b)?)?;
                self.felts.insert(out, v);
            }
            MulFelt { out, a, b } => {
                let v = self.felt(a)?.mul(self.felt(b)?)?;
                self.felts.insert(out, v);
            }
            DivFelt { out, a, b } => {
                let v = self.felt(a)?.div(self.felt(b)?)?;
                self.felts.insert(out, v);
            }
            NegFelt { out, a } => {
                let v = self.felt(a)?.neg()?;
                self.felts.insert(out, v);
            }
            InvFelt { out, a } => {
                let v = self.felt(a)?.inverse()?;
                self.felts.insert(out, v);
            }
            AssertEqFelt { a, b } => self.felt(a)?.assert_equal(self.felt(b)?)?,
            AssertNeFelt { a, b } => self.felt(a)?.assert_not_equal(self.felt(b)?)?,
            SelectFelt { out, cond, a, b } => {
                let c = self.boolean(cond)?;
                let v = FeltVar::select(&c, self.felt(a)?, self.felt(b)?)?;
                self.felts.insert(out, v);
            }
            Num2bitsFelt { out, a } => {
                let bits = self.felt(a)?.to_bits_le(out.len())?;
                for (name, bit) in out.iter().zip(bits) {
                    self.vars.insert(name, FpVar::from(bit));
                }
            }
            ReduceFelt { out, a } => {
                let v = self.felt(a)?.reduce()?;
                self.felts.insert(out, v);
            }
            PermuteInner { state } => {
                let mut values: [FeltVar<F, I>; INNER_PERMUTATION_WIDTH] = Default::default();
                for (v, name) in values.iter_mut().zip(state) {
                    *v = self.felt(name)?.clone();
                }
                let permuted = self.inner.permute_reduced(&values)?;
                for (name, v) in state.iter().zip(permuted) {
                    self.felts.insert(name, v);
                }
            }
            PackFelts { out, felts } => {
                let v = self.pack_felts(felts)?;
                self.vars.insert(out, v);
            }
            PackBytes { out, bytes } => {
                let v = self.pack_bytes(bytes)?;
                self.vars.insert(out, v);
            }

            ImmExt { out, value } => {
                let mut limbs = [I::zero(); 4];
                for (limb, s) in limbs.iter_mut().zip(value) {
                    *limb = Self::imm_inner(s)?;
                }
                self.exts
                    .insert(out, ExtVar::constant(BinomialExtension::new(limbs)));
            }
            WitnessExt { out, index } => {
                let value = self.witness.exts.get(*index).copied();
                let ext = ExtVar::new_witness(self.cs.clone(), value)?;
                self.exts.insert(out, ext);
            }
            AddExt { out, a, b } => {
                let v = self.ext(a)?.add(self.ext(b)?)?;
                self.exts.insert(out, v);
            }
            SubExt { out, a, b } => {
                let v = self.ext(a)?.sub(self.ext(b)?)?;
                self.exts.insert(out, v);
            }
            MulExt { out, a, b } => {
                let v = self.ext(a)?.mul(self.ext(b)?)?;
                self.exts.insert(out, v);
            }
            DivExt { out, a, b } => {
                let v = self.ext(a)?.div(self.ext(b)?)?;
                self.exts.insert(out, v);
            }
            NegExt { out, a } => {
                let v = self.ext(a)?.neg()?;
                self.exts.insert(out, v);
            }
            InvExt { out, a } => {
                let v = self.ext(a)?.inverse()?;
                self.exts.insert(out, v);
            }
            AddExtFelt { out, a, b } => {
                let v = self.ext(a)?.add_base(self.felt(b)?)?;
                self.exts.insert(out, v);
            }
            MulExtFelt { out, a, b } => {
                let v = self.ext(a)?.mul_base(self.felt(b)?)?;
                self.exts.insert(out, v);
            }
            AssertEqExt { a, b } => self.ext(a)?.assert_equal(self.ext(b)?)?,
            SelectExt { out, cond, a, b } => {
                let c = self.boolean(cond)?;
                let v = ExtVar::select(&c, self.ext(a)?, self.ext(b)?)?;
                self.exts.insert(out, v);
            }
            FeltsToExt { out, felts } => {
                let mut limbs: [FeltVar<F, I>; 4] = Default::default();
                for (limb, name) in limbs.iter_mut().zip(felts) {
                    *limb = self.felt(name)?.clone();
                }
                self.exts.insert(out, ExtVar(limbs));
            }
            ExtToFelts { out, a } => {
                let limbs = self.ext(a)?.limbs().clone();
                for (name, limb) in out.iter().zip(limbs) {
                    self.felts.insert(name, limb);
                }
            }
            ReduceExt { out, a } => {
                let v = self.ext(a)?.reduce()?;
                self.exts.insert(out, v);
            }

            CommitVkeyHash { value } => self.var(value)?.enforce_equal(&self.public[0])?,
            CommitCommittedValuesDigest { value } => {
                self.var(value)?.enforce_equal(&self.public[1])?
            }
        }
        Ok(())
    }
}

impl<F: PrimeField, I: InnerField> ConstraintSynthesizer<F> for VerifierCircuit<F, I> {
    #[tracing::instrument(skip_all, name = "VerifierCircuit::generate_constraints")]
    fn generate_constraints(self, cs: ConstraintSystemRef<F>) -> Result<(), SynthesisError> {
        let witness = self.witness.as_ref();
        let vkey_hash = FpVar::new_input(ns!(cs, "vkey_hash"), || Ok(witness.vkey_hash))?;
        let digest = FpVar::new_input(ns!(cs, "committed_values_digest"), || {
            Ok(witness.committed_values_digest)
        })?;

        // parameters were validated in `VerifierCircuit::new`
        let outer = Poseidon2Chip::new(self.params.outer.clone())
            .map_err(|_| SynthesisError::Unsatisfiable)?;
        let inner = Poseidon2Chip::new(self.params.inner.clone())
            .map_err(|_| SynthesisError::Unsatisfiable)?;

        let mut interpreter = Interpreter {
            cs: cs.clone(),
            witness,
            outer,
            inner,
            public: [vkey_hash, digest],
            vars: HashMap::new(),
            felts: HashMap::new(),
            exts: HashMap::new(),
        };
        for inst in &self.program.instructions {
            interpreter.exec(inst)?;
        }
        tracing::debug!(
            instructions = self.program.instructions.len(),
            constraints = cs.num_constraints(),
            "synthesized verifier circuit"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        field::{BabyBear, KoalaBear},
        gadgets::field_to_biguint,
        poseidon2::Poseidon2,
    };
    use ark_bn254::Fr;
    use ark_relations::r1cs::{ConstraintSystem, OptimizationGoal, SynthesisMode};
    use common::field_conversion::{pack_bytes, pack_felts};

    pub(crate) const ADDITION_PROGRAM: &str =
        include_str!("../../tests/fixtures/addition_program.json");
    pub(crate) const ADDITION_WITNESS: &str =
        include_str!("../../tests/fixtures/addition_witness.json");

    fn build<I: InnerField>(
        program: &ConstraintProgram,
        input: &WitnessInput,
    ) -> VerifierCircuit<Fr, I> {
        VerifierCircuit::new(
            Arc::new(program.clone()),
            Arc::new(input.parse().unwrap()),
            Arc::new(CircuitParams::from_seed(0)),
        )
        .unwrap()
    }

    fn solve<I: InnerField>(circuit: VerifierCircuit<Fr, I>) -> (bool, usize, usize) {
        let cs = ConstraintSystem::<Fr>::new_ref();
        cs.set_optimization_goal(OptimizationGoal::Constraints);
        circuit.generate_constraints(cs.clone()).unwrap();
        cs.finalize();
        (
            cs.is_satisfied().unwrap(),
            cs.num_constraints(),
            cs.num_witness_variables(),
        )
    }

    fn addition() -> (ConstraintProgram, WitnessInput) {
        (
            serde_json::from_str(ADDITION_PROGRAM).unwrap(),
            serde_json::from_str(ADDITION_WITNESS).unwrap(),
        )
    }

    #[test]
    fn addition_program_is_satisfied() {
        let (program, input) = addition();
        let circuit = build::<KoalaBear>(&program, &input);
        assert_eq!(circuit.public_inputs(), vec![Fr::from(3u64), Fr::from(12345u64)]);
        assert!(solve(circuit).0);
    }

    #[test]
    fn wrong_public_value_is_unsatisfied() {
        let (program, mut input) = addition();
        input.vkey_hash = "4".into();
        assert!(!solve(build::<KoalaBear>(&program, &input)).0);
    }

    #[test]
    fn topology_does_not_depend_on_values() {
        let (program, input) = addition();
        let mut other = input.clone();
        other.vars = vec!["10".into(), "20".into(), "999".into()];
        other.vkey_hash = "7".into();

        let (_, c1, w1) = solve(build::<KoalaBear>(&program, &input));
        let (_, c2, w2) = solve(build::<KoalaBear>(&program, &input));
        let (ok, c3, w3) = solve(build::<KoalaBear>(&program, &other));
        assert_eq!((c1, w1), (c2, w2));
        assert_eq!((c1, w1), (c3, w3));
        assert!(!ok);
    }

    #[test]
    fn setup_mode_synthesis_needs_no_values() {
        let (program, input) = addition();
        let cs = ConstraintSystem::<Fr>::new_ref();
        cs.set_mode(SynthesisMode::Setup);
        build::<BabyBear>(&program, &input)
            .generate_constraints(cs.clone())
            .unwrap();
        assert_eq!(cs.num_instance_variables(), 3);
    }

    #[test]
    fn constructor_rejects_bad_immediates() {
        let (mut program, input) = addition();
        program.instructions.insert(
            0,
            Instruction::ImmFelt {
                out: "big".into(),
                value: KoalaBear::MODULUS_U64.to_string(),
            },
        );
        let result = VerifierCircuit::<Fr, KoalaBear>::new(
            Arc::new(program),
            Arc::new(input.parse().unwrap()),
            Arc::new(CircuitParams::from_seed(0)),
        );
        assert!(matches!(result, Err(WrapError::Circuit(_))));
    }

    fn dec(value: Fr) -> String {
        field_to_biguint(&value).to_string()
    }

    fn names(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{prefix}{i}")).collect()
    }

    /// Digest felts through the inner permutation, packed into the vkey hash;
    /// byte felts packed into the committed-values digest; plus extension
    /// arithmetic and an outer permutation checked against native values.
    fn rich_program<I: InnerField>() -> (ConstraintProgram, WitnessInput) {
        use Instruction::*;
        let params = CircuitParams::<Fr, I>::from_seed(0);
        let state_in: [I; 16] = core::array::from_fn(|i| I::from(i as u64 * 31 + 1));
        let state_out = Poseidon2::new(params.inner.clone()).unwrap().permute(state_in);
        let bytes: Vec<u64> = (0..32).map(|i| 255 - i).collect();
        let outer_out = Poseidon2::new(params.outer.clone())
            .unwrap()
            .permute([Fr::from(1u64), Fr::from(2u64), Fr::from(3u64)]);

        let a = BinomialExtension::<I>::new([1u64, 2, 3, 4].map(I::from));
        let b = BinomialExtension::<I>::new([5u64, 0, 7, 9].map(I::from));
        let expected = (a * b + a) * b.inverse().unwrap();

        let mut insts = vec![];
        let state = names("s", 16);
        for (i, name) in state.iter().enumerate() {
            insts.push(WitnessFelt { out: name.clone(), index: i });
        }
        insts.push(PermuteInner { state: state.clone() });
        insts.push(PackFelts { out: "vk".into(), felts: state[..8].to_vec() });
        insts.push(CommitVkeyHash { value: "vk".into() });

        let byte_names = names("b", 32);
        for (i, name) in byte_names.iter().enumerate() {
            insts.push(WitnessFelt { out: name.clone(), index: 16 + i });
        }
        insts.push(PackBytes { out: "digest".into(), bytes: byte_names });
        insts.push(CommitCommittedValuesDigest { value: "digest".into() });

        insts.push(WitnessExt { out: "a".into(), index: 0 });
        insts.push(WitnessExt { out: "b".into(), index: 1 });
        insts.push(MulExt { out: "ab".into(), a: "a".into(), b: "b".into() });
        insts.push(AddExt { out: "ab_a".into(), a: "ab".into(), b: "a".into() });
        insts.push(DivExt { out: "q".into(), a: "ab_a".into(), b: "b".into() });
        insts.push(ImmExt {
            out: "want".into(),
            value: expected.0.map(|l| l.as_canonical_u64().to_string()),
        });
        insts.push(AssertEqExt { a: "q".into(), b: "want".into() });
        insts.push(ExtToFelts {
            out: ["q0".into(), "q1".into(), "q2".into(), "q3".into()],
            a: "q".into(),
        });
        insts.push(ImmVar { out: "one".into(), value: "1".into() });
        insts.push(SelectFelt {
            out: "picked".into(),
            cond: "one".into(),
            a: "q3".into(),
            b: "q0".into(),
        });
        insts.push(AssertEqFelt { a: "picked".into(), b: "q3".into() });

        for (i, name) in ["x0", "x1", "x2"].into_iter().enumerate() {
            insts.push(WitnessVar { out: name.into(), index: i });
        }
        insts.push(Permute { state: ["x0".into(), "x1".into(), "x2".into()] });
        insts.push(ImmVar { out: "want_x2".into(), value: dec(outer_out[2]) });
        insts.push(AssertEqVar { a: "x2".into(), b: "want_x2".into() });

        let digest_felts: Vec<u64> = state_out[..8].iter().map(|f| f.as_canonical_u64()).collect();
        let input = WitnessInput {
            vars: vec!["1".into(), "2".into(), "3".into()],
            felts: state_in
                .iter()
                .map(|f| f.as_canonical_u64().to_string())
                .chain(bytes.iter().map(u64::to_string))
                .collect(),
            exts: [a, b]
                .iter()
                .map(|e| e.0.map(|l| l.as_canonical_u64().to_string()))
                .collect(),
            vkey_hash: dec(pack_felts::<Fr>(&digest_felts)),
            committed_values_digest: dec(pack_bytes::<Fr>(
                &bytes.iter().map(|b| *b as u8).collect::<Vec<_>>(),
            )),
        };
        (ConstraintProgram::new(insts), input)
    }

    #[test]
    fn rich_program_matches_native_computation() {
        let (program, input) = rich_program::<BabyBear>();
        assert!(solve(build::<BabyBear>(&program, &input)).0);
        let (program, input) = rich_program::<KoalaBear>();
        assert!(solve(build::<KoalaBear>(&program, &input)).0);
    }

    #[test]
    fn tampered_byte_breaks_digest_binding() {
        let (program, mut input) = rich_program::<KoalaBear>();
        input.felts[16 + 31] = "0".into();
        assert!(!solve(build::<KoalaBear>(&program, &input)).0);
    }

    fn witness_vars(n: usize) -> Vec<Instruction> {
        (0..n)
            .map(|index| Instruction::WitnessVar {
                out: format!("v{index}"),
                index,
            })
            .collect()
    }

    /// Commits `v0` as the vkey hash and `v1` as the committed-values digest.
    fn with_commits(mut insts: Vec<Instruction>) -> ConstraintProgram {
        insts.push(Instruction::CommitVkeyHash { value: "v0".into() });
        insts.push(Instruction::CommitCommittedValuesDigest { value: "v1".into() });
        ConstraintProgram::new(insts)
    }

    fn imm_ext<I: InnerField>(out: &str, value: BinomialExtension<I>) -> Instruction {
        Instruction::ImmExt {
            out: out.into(),
            value: value.0.map(|l| l.as_canonical_u64().to_string()),
        }
    }

    fn input_for<I: InnerField>(
        vars: &[&str],
        felts: &[I],
        exts: &[BinomialExtension<I>],
    ) -> WitnessInput {
        WitnessInput {
            vars: vars.iter().map(|v| v.to_string()).collect(),
            felts: felts.iter().map(|f| f.as_canonical_u64().to_string()).collect(),
            exts: exts
                .iter()
                .map(|e| e.0.map(|l| l.as_canonical_u64().to_string()))
                .collect(),
            vkey_hash: vars[0].into(),
            committed_values_digest: vars[1].into(),
        }
    }

    fn ext_felt_program<I: InnerField>(
        a: BinomialExtension<I>,
        b: BinomialExtension<I>,
        f: I,
    ) -> ConstraintProgram {
        use Instruction::*;
        let zero = I::zero();
        let lifted = BinomialExtension::new([f, zero, zero, zero]);
        let scaled = BinomialExtension::new(a.0.map(|l| l * f));

        let mut insts = witness_vars(2);
        insts.push(WitnessExt { out: "a".into(), index: 0 });
        insts.push(WitnessExt { out: "b".into(), index: 1 });
        insts.push(WitnessFelt { out: "f".into(), index: 0 });

        insts.push(AddExtFelt { out: "a_plus_f".into(), a: "a".into(), b: "f".into() });
        insts.push(imm_ext("want_add", a + lifted));
        insts.push(AssertEqExt { a: "a_plus_f".into(), b: "want_add".into() });

        insts.push(MulExtFelt { out: "a_times_f".into(), a: "a".into(), b: "f".into() });
        insts.push(ReduceExt { out: "a_times_f_r".into(), a: "a_times_f".into() });
        insts.push(imm_ext("want_mul", scaled));
        insts.push(AssertEqExt { a: "a_times_f_r".into(), b: "want_mul".into() });

        insts.push(SubExt { out: "diff".into(), a: "a".into(), b: "b".into() });
        insts.push(NegExt { out: "neg".into(), a: "diff".into() });
        insts.push(imm_ext("want_neg", b - a));
        insts.push(AssertEqExt { a: "neg".into(), b: "want_neg".into() });

        insts.push(InvExt { out: "inv".into(), a: "b".into() });
        insts.push(imm_ext("want_inv", b.inverse().unwrap()));
        insts.push(AssertEqExt { a: "inv".into(), b: "want_inv".into() });

        insts.push(ExtToFelts {
            out: ["a0".into(), "a1".into(), "a2".into(), "a3".into()],
            a: "a".into(),
        });
        insts.push(FeltsToExt {
            out: "a_again".into(),
            felts: ["a0".into(), "a1".into(), "a2".into(), "a3".into()],
        });
        insts.push(AssertEqExt { a: "a_again".into(), b: "a".into() });

        insts.push(MulFelt { out: "f2".into(), a: "f".into(), b: "f".into() });
        insts.push(MulFelt { out: "f3".into(), a: "f2".into(), b: "f".into() });
        insts.push(ReduceFelt { out: "f3_r".into(), a: "f3".into() });
        insts.push(ImmFelt {
            out: "want_f3".into(),
            value: (f * f * f).as_canonical_u64().to_string(),
        });
        insts.push(AssertEqFelt { a: "f3_r".into(), b: "want_f3".into() });
        with_commits(insts)
    }

    fn check_ext_felt_ops<I: InnerField>() {
        let a = BinomialExtension::<I>::new([I::MODULUS_U64 - 1, 2, 3, 4].map(I::from));
        let b = BinomialExtension::<I>::new([5u64, 0, 7, 9].map(I::from));
        let f = I::from(I::MODULUS_U64 - 12345);
        let program = ext_felt_program(a, b, f);

        let input = input_for(&["1", "2"], &[f], &[a, b]);
        assert!(solve(build::<I>(&program, &input)).0);

        let input = input_for(&["1", "2"], &[f + I::one()], &[a, b]);
        assert!(!solve(build::<I>(&program, &input)).0);
    }

    #[test]
    fn ext_felt_arithmetic_matches_native() {
        check_ext_felt_ops::<BabyBear>();
        check_ext_felt_ops::<KoalaBear>();
    }

    fn var_program() -> ConstraintProgram {
        use Instruction::*;
        let mut insts = witness_vars(3);
        insts.push(InvVar { out: "inv".into(), a: "v0".into() });
        insts.push(MulVar { out: "unit".into(), a: "inv".into(), b: "v0".into() });
        insts.push(ImmVar { out: "one".into(), value: "1".into() });
        insts.push(ImmVar { out: "zero".into(), value: "0".into() });
        insts.push(AssertEqVar { a: "unit".into(), b: "one".into() });
        insts.push(AssertNeVar { a: "v0".into(), b: "v1".into() });

        let bits = names("bit", 4);
        insts.push(Num2bitsVar { out: bits.clone(), a: "v2".into() });
        for (bit, want) in bits.into_iter().zip(["one", "zero", "one", "one"]) {
            insts.push(AssertEqVar { a: bit, b: want.into() });
        }

        insts.push(ImmFelt { out: "f".into(), value: "7".into() });
        insts.push(WitnessFelt { out: "g".into(), index: 0 });
        insts.push(AssertNeFelt { a: "f".into(), b: "g".into() });
        with_commits(insts)
    }

    #[test]
    fn var_operations_hold_for_valid_values() {
        let program = var_program();
        let ok = input_for::<KoalaBear>(&["6", "3", "13"], &[KoalaBear::from(8u64)], &[]);
        assert!(solve(build::<KoalaBear>(&program, &ok)).0);

        // equal operands of assert_ne
        let same = input_for::<KoalaBear>(&["6", "6", "13"], &[KoalaBear::from(8u64)], &[]);
        assert!(!solve(build::<KoalaBear>(&program, &same)).0);
        let same_felt = input_for::<KoalaBear>(&["6", "3", "13"], &[KoalaBear::from(7u64)], &[]);
        assert!(!solve(build::<KoalaBear>(&program, &same_felt)).0);

        // 29 needs five bits
        let wide = input_for::<KoalaBear>(&["6", "3", "29"], &[KoalaBear::from(8u64)], &[]);
        assert!(!solve(build::<KoalaBear>(&program, &wide)).0);

        let zero = input_for::<KoalaBear>(&["0", "3", "13"], &[KoalaBear::from(8u64)], &[]);
        assert!(!solve(build::<KoalaBear>(&program, &zero)).0);
    }

    /// Selects between two equal operands, so the condition's booleanity is
    /// the only constraint that can fail.
    fn select_program(ext: bool) -> ConstraintProgram {
        use Instruction::*;
        let mut insts = witness_vars(3);
        if ext {
            insts.push(WitnessExt { out: "e".into(), index: 0 });
            insts.push(SelectExt {
                out: "picked".into(),
                cond: "v2".into(),
                a: "e".into(),
                b: "e".into(),
            });
        } else {
            insts.push(SelectVar {
                out: "picked".into(),
                cond: "v2".into(),
                a: "v0".into(),
                b: "v0".into(),
            });
        }
        with_commits(insts)
    }

    #[test]
    fn select_condition_must_be_boolean() {
        let e = BinomialExtension::<BabyBear>::new([1u64, 2, 3, 4].map(BabyBear::from));
        for ext in [false, true] {
            let program = select_program(ext);
            for (cond, satisfied) in [("0", true), ("1", true), ("2", false)] {
                let input = input_for(&["5", "6", cond], &[], &[e]);
                assert_eq!(
                    solve(build::<BabyBear>(&program, &input)).0,
                    satisfied,
                    "ext = {ext}, cond = {cond}"
                );
            }
        }
    }
}
