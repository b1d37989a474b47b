//! Poseidon2 permutation: shared parameters, a native reference
//! implementation, and the R1CS chip in [`chip`].

pub mod chip;

pub use chip::{PermutationVar, Poseidon2Chip};

use ark_ff::{Field, PrimeField};
use rand_chacha::{rand_core::SeedableRng, ChaCha20Rng};

use crate::{field::InnerField, utils::errors::WrapError};
use common::constants::{
    INNER_PERMUTATION_WIDTH, OUTER_PARTIAL_ROUNDS, OUTER_PERMUTATION_WIDTH,
    OUTER_SBOX_DEGREE, POSEIDON2_FULL_ROUNDS,
};

/// Round structure and constants of one Poseidon2 instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Poseidon2Params<T: Field, const WIDTH: usize> {
    pub rounds_f: usize,
    pub rounds_p: usize,
    pub sbox_degree: u64,
    /// One row of `WIDTH` constants per full round.
    pub external_rc: Vec<Vec<T>>,
    /// One constant per partial round, added to the first element.
    pub internal_rc: Vec<T>,
    /// Diagonal of the internal matrix `diag + 1·1ᵀ`.
    pub internal_diag: Vec<T>,
}

pub(crate) fn is_supported_width(width: usize) -> bool {
    width == 3 || (width >= 4 && width % 4 == 0)
}

impl<T: Field, const WIDTH: usize> Poseidon2Params<T, WIDTH> {
    pub fn validate(&self) -> Result<(), WrapError> {
        let invalid = |msg: String| Err(WrapError::Circuit(format!("poseidon2: {msg}")));
        if !is_supported_width(WIDTH) {
            return invalid(format!("unsupported state width {WIDTH}"));
        }
        if self.rounds_f == 0 || self.rounds_f % 2 != 0 {
            return invalid(format!("full rounds must be even, got {}", self.rounds_f));
        }
        if self.sbox_degree < 3 || self.sbox_degree % 2 == 0 {
            return invalid(format!("unsupported s-box degree {}", self.sbox_degree));
        }
        if self.external_rc.len() != self.rounds_f
            || self.external_rc.iter().any(|row| row.len() != WIDTH)
        {
            return invalid(format!(
                "expected {} external round constant rows of width {WIDTH}",
                self.rounds_f
            ));
        }
        if self.internal_rc.len() != self.rounds_p {
            return invalid(format!(
                "expected {} internal round constants, got {}",
                self.rounds_p,
                self.internal_rc.len()
            ));
        }
        if self.internal_diag.len() != WIDTH {
            return invalid(format!(
                "internal diagonal has {} entries, width is {WIDTH}",
                self.internal_diag.len()
            ));
        }
        Ok(())
    }

    /// Samples round constants from a seeded ChaCha20 stream. The diagonal is
    /// sampled too unless one is given.
    pub fn sample(
        seed: u64,
        rounds_p: usize,
        sbox_degree: u64,
        internal_diag: Option<Vec<T>>,
    ) -> Self {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let external_rc = (0..POSEIDON2_FULL_ROUNDS)
            .map(|_| (0..WIDTH).map(|_| T::rand(&mut rng)).collect())
            .collect();
        let internal_rc = (0..rounds_p).map(|_| T::rand(&mut rng)).collect();
        let internal_diag = internal_diag.unwrap_or_else(|| {
            (0..WIDTH)
                .map(|_| loop {
                    let d = T::rand(&mut rng);
                    if !d.is_zero() && d != T::one() {
                        break d;
                    }
                })
                .collect()
        });
        Self {
            rounds_f: POSEIDON2_FULL_ROUNDS,
            rounds_p,
            sbox_degree,
            external_rc,
            internal_rc,
            internal_diag,
        }
    }
}

/// Width-3 instance over the outer field.
pub fn outer_params<F: PrimeField>(
    seed: u64,
) -> Poseidon2Params<F, OUTER_PERMUTATION_WIDTH> {
    Poseidon2Params::sample(
        seed,
        OUTER_PARTIAL_ROUNDS,
        OUTER_SBOX_DEGREE,
        Some(vec![F::one(), F::one(), F::from(2u64)]),
    )
}

/// Width-16 instance over the inner field.
pub fn inner_params<I: InnerField>(
    seed: u64,
) -> Poseidon2Params<I, INNER_PERMUTATION_WIDTH> {
    Poseidon2Params::sample(
        seed.wrapping_add(1),
        I::PARTIAL_ROUNDS,
        I::SBOX_DEGREE,
        Some(I::INTERNAL_DIAG_16.iter().map(|&d| I::from(d)).collect()),
    )
}

/// Native Poseidon2, used to compute hints and to cross-check the chip.
#[derive(Clone, Debug)]
pub struct Poseidon2<T: Field, const WIDTH: usize> {
    params: Poseidon2Params<T, WIDTH>,
}

impl<T: Field, const WIDTH: usize> Poseidon2<T, WIDTH> {
    pub fn new(params: Poseidon2Params<T, WIDTH>) -> Result<Self, WrapError> {
        params.validate()?;
        Ok(Self { params })
    }

    fn sbox(&self, x: T) -> T {
        x.pow([self.params.sbox_degree])
    }

    pub fn internal_linear_layer(&self, state: &mut [T; WIDTH]) {
        let sum: T = state.iter().sum();
        for (s, d) in state.iter_mut().zip(&self.params.internal_diag) {
            *s = *s * d + sum;
        }
    }

    pub fn external_linear_layer(&self, state: &mut [T; WIDTH]) {
        if WIDTH == 3 {
            let sum: T = state.iter().sum();
            state.iter_mut().for_each(|s| *s += sum);
            return;
        }
        for chunk in state.chunks_exact_mut(4) {
            let (x0, x1, x2, x3) = (chunk[0], chunk[1], chunk[2], chunk[3]);
            chunk[0] = x0.double() + x1.double() + x1 + x2 + x3;
            chunk[1] = x0 + x1.double() + x2.double() + x2 + x3;
            chunk[2] = x0 + x1 + x2.double() + x3.double() + x3;
            chunk[3] = x0.double() + x0 + x1 + x2 + x3.double();
        }
        let mut sums = [T::zero(); 4];
        for (i, s) in state.iter().enumerate() {
            sums[i % 4] += s;
        }
        for (i, s) in state.iter_mut().enumerate() {
            *s += sums[i % 4];
        }
    }

    fn full_round(&self, state: &mut [T; WIDTH], round: usize) {
        for (s, rc) in state.iter_mut().zip(&self.params.external_rc[round]) {
            *s = self.sbox(*s + rc);
        }
        self.external_linear_layer(state);
    }

    pub fn permute_mut(&self, state: &mut [T; WIDTH]) {
        let half = self.params.rounds_f / 2;
        self.external_linear_layer(state);
        for round in 0..half {
            self.full_round(state, round);
        }
        for rc in &self.params.internal_rc {
            state[0] = self.sbox(state[0] + rc);
            self.internal_linear_layer(state);
        }
        for round in half..self.params.rounds_f {
            self.full_round(state, round);
        }
    }

    pub fn permute(&self, mut state: [T; WIDTH]) -> [T; WIDTH] {
        self.permute_mut(&mut state);
        state
    }
}
