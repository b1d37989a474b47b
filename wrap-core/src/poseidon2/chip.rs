use ark_ff::{Field, PrimeField, Zero};
use ark_r1cs_std::fields::fp::FpVar;
use ark_relations::r1cs::SynthesisError;

use super::Poseidon2Params;
use crate::{
    field::InnerField,
    gadgets::{reduce_state, FeltVar},
    utils::errors::WrapError,
};

/// Circuit value the Poseidon2 chip can permute.
pub trait PermutationVar: Clone {
    type Constant: Field;

    fn constant(c: Self::Constant) -> Self;
    fn add(&self, other: &Self) -> Result<Self, SynthesisError>;
    fn add_constant(&self, c: Self::Constant) -> Result<Self, SynthesisError>;
    fn mul(&self, other: &Self) -> Result<Self, SynthesisError>;
    fn mul_constant(&self, c: Self::Constant) -> Result<Self, SynthesisError>;

    /// Brings the value back into a compact representation before it is
    /// raised to the S-box power.
    fn normalize(&self) -> Result<Self, SynthesisError> {
        Ok(self.clone())
    }

    fn double(&self) -> Result<Self, SynthesisError> {
        self.add(self)
    }
}

impl<F: PrimeField> PermutationVar for FpVar<F> {
    type Constant = F;

    fn constant(c: F) -> Self {
        FpVar::Constant(c)
    }

    fn add(&self, other: &Self) -> Result<Self, SynthesisError> {
        Ok(self + other)
    }

    fn add_constant(&self, c: F) -> Result<Self, SynthesisError> {
        Ok(self + c)
    }

    fn mul(&self, other: &Self) -> Result<Self, SynthesisError> {
        Ok(self * other)
    }

    fn mul_constant(&self, c: F) -> Result<Self, SynthesisError> {
        Ok(self * c)
    }
}

impl<F: PrimeField, I: InnerField> PermutationVar for FeltVar<F, I> {
    type Constant = I;

    fn constant(c: I) -> Self {
        FeltVar::constant(c)
    }

    fn add(&self, other: &Self) -> Result<Self, SynthesisError> {
        FeltVar::add(self, other)
    }

    fn add_constant(&self, c: I) -> Result<Self, SynthesisError> {
        FeltVar::add_constant(self, c)
    }

    fn mul(&self, other: &Self) -> Result<Self, SynthesisError> {
        FeltVar::mul(self, other)
    }

    fn mul_constant(&self, c: I) -> Result<Self, SynthesisError> {
        FeltVar::mul_constant(self, c)
    }

    fn normalize(&self) -> Result<Self, SynthesisError> {
        self.reduce()
    }
}

/// Poseidon2 over circuit variables of width `WIDTH`.
pub struct Poseidon2Chip<V: PermutationVar, const WIDTH: usize> {
    params: Poseidon2Params<V::Constant, WIDTH>,
    zero: V,
}

impl<V: PermutationVar, const WIDTH: usize> Poseidon2Chip<V, WIDTH> {
    pub fn new(params: Poseidon2Params<V::Constant, WIDTH>) -> Result<Self, WrapError> {
        params.validate()?;
        Ok(Self {
            params,
            zero: V::constant(<V::Constant as Zero>::zero()),
        })
    }

    /// Internal linear layer: `state[i] = state[i] * diag[i] + Σ state`.
    pub fn diffusion_permute_mut(&self, state: &mut [V; WIDTH]) -> Result<(), SynthesisError> {
        let mut sum = self.zero.clone();
        for s in state.iter() {
            sum = sum.add(s)?;
        }
        for (s, d) in state.iter_mut().zip(&self.params.internal_diag) {
            *s = s.mul_constant(*d)?.add(&sum)?;
        }
        Ok(())
    }

    fn apply_mat4(x: &mut [V]) -> Result<(), SynthesisError> {
        let t01 = x[0].add(&x[1])?;
        let t23 = x[2].add(&x[3])?;
        let t0123 = t01.add(&t23)?;
        let t01123 = t0123.add(&x[1])?;
        let t01233 = t0123.add(&x[3])?;
        // x[0] and x[2] are read below, overwrite them last
        x[3] = t01233.add(&x[0].double()?)?;
        x[1] = t01123.add(&x[2].double()?)?;
        x[0] = t01123.add(&t01)?;
        x[2] = t01233.add(&t23)?;
        Ok(())
    }

    pub fn external_linear_permute_mut(&self, state: &mut [V; WIDTH]) -> Result<(), SynthesisError> {
        if WIDTH == 3 {
            return add_sum_to_each(state);
        }
        for chunk in state.chunks_exact_mut(4) {
            Self::apply_mat4(chunk)?;
        }
        let mut sums: [V; 4] = core::array::from_fn(|_| self.zero.clone());
        for (i, s) in state.iter().enumerate() {
            sums[i % 4] = sums[i % 4].add(s)?;
        }
        for (i, s) in state.iter_mut().enumerate() {
            *s = s.add(&sums[i % 4])?;
        }
        Ok(())
    }

    fn sbox(&self, x: &V) -> Result<V, SynthesisError> {
        let base = x.normalize()?;
        let mut exp = self.params.sbox_degree;
        let mut acc: Option<V> = None;
        let mut square = base;
        loop {
            if exp & 1 == 1 {
                acc = Some(match acc {
                    Some(a) => a.mul(&square)?,
                    None => square.clone(),
                });
            }
            exp >>= 1;
            if exp == 0 {
                break;
            }
            square = square.mul(&square)?;
        }
        acc.ok_or(SynthesisError::Unsatisfiable)
    }

    fn full_round(&self, state: &mut [V; WIDTH], round: usize) -> Result<(), SynthesisError> {
        for (s, rc) in state.iter_mut().zip(&self.params.external_rc[round]) {
            *s = self.sbox(&s.add_constant(*rc)?)?;
        }
        self.external_linear_permute_mut(state)
    }

    pub fn permute_mut(&self, state: &mut [V; WIDTH]) -> Result<(), SynthesisError> {
        let half = self.params.rounds_f / 2;
        self.external_linear_permute_mut(state)?;
        for round in 0..half {
            self.full_round(state, round)?;
        }
        for rc in &self.params.internal_rc {
            state[0] = self.sbox(&state[0].add_constant(*rc)?)?;
            self.diffusion_permute_mut(state)?;
        }
        for round in half..self.params.rounds_f {
            self.full_round(state, round)?;
        }
        Ok(())
    }
}

fn add_sum_to_each<V: PermutationVar>(state: &mut [V]) -> Result<(), SynthesisError> {
    let mut iter = state.iter();
    let Some(first) = iter.next() else {
        return Ok(());
    };
    let mut sum = first.clone();
    for s in iter {
        sum = sum.add(s)?;
    }
    for s in state.iter_mut() {
        *s = s.add(&sum)?;
    }
    Ok(())
}

impl<V: PermutationVar> Poseidon2Chip<V, 3> {
    /// Width-3 external layer: every slot gets the sum of all three added.
    pub fn external_linear_permute_mut_width3(
        &self,
        state: &mut [V; 3],
    ) -> Result<(), SynthesisError> {
        add_sum_to_each(state)
    }
}

impl<F: PrimeField, I: InnerField, const WIDTH: usize> Poseidon2Chip<FeltVar<F, I>, WIDTH> {
    /// Permutes an emulated state and leaves every element canonical.
    pub fn permute_reduced(
        &self,
        state: &[FeltVar<F, I>; WIDTH],
    ) -> Result<[FeltVar<F, I>; WIDTH], SynthesisError> {
        let mut out = state.clone();
        self.permute_mut(&mut out)?;
        reduce_state(&out)
    }
}
