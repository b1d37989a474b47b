//! R1CS gadgets for emulating the inner field inside the outer circuit.

pub mod bits;
pub mod embedding;
pub mod ext;
pub mod felt;

pub use embedding::{enforce_canonical, enforce_reduction, reduce_slow, reduce_state};
pub use ext::ExtVar;
pub use felt::FeltVar;

use ark_ff::{BigInteger, PrimeField};
use num::BigUint;

pub(crate) fn field_to_biguint<F: PrimeField>(value: &F) -> BigUint {
    BigUint::from_bytes_le(&value.into_bigint().to_bytes_le())
}

pub(crate) fn biguint_to_field<F: PrimeField>(value: &BigUint) -> F {
    F::from_le_bytes_mod_order(&value.to_bytes_le())
}
