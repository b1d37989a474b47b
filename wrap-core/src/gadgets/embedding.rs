//! Slow modular reduction of outer-field values into the inner field.
//!
//! An inner-field element is carried in one outer-field variable together
//! with an inclusive upper bound on its integer value. Arithmetic lets the
//! bound grow; before it could wrap around the outer modulus the value is
//! reduced by witnessing `x = q * p + r` and range-checking `q` and `r`.

use ark_ff::PrimeField;
use ark_r1cs_std::{
    alloc::AllocVar,
    eq::EqGadget,
    fields::{fp::FpVar, FieldVar},
    R1CSVar,
};
use ark_relations::r1cs::SynthesisError;
use num::BigUint;

use super::{
    biguint_to_field, bits::enforce_bit_length, field_to_biguint, felt::FeltVar,
};
use crate::field::InnerField;
use common::constants::INNER_FIELD_BITS;

/// Largest bit length a felt bound may reach before it has to be reduced.
pub fn safe_bound_bits<F: PrimeField>() -> u64 {
    F::MODULUS_BIT_SIZE as u64 - 2
}

/// Constrains `value` to be a canonical inner-field element, i.e. `value < p`.
pub fn enforce_canonical<F: PrimeField, I: InnerField>(
    value: &FpVar<F>,
) -> Result<(), SynthesisError> {
    enforce_bit_length(value, INNER_FIELD_BITS)?;
    let p_minus_one = FpVar::constant(F::from(I::MODULUS_U64 - 1));
    enforce_bit_length(&(p_minus_one - value), INNER_FIELD_BITS)?;
    Ok(())
}

/// Checks that `remainder` is the canonical reduction of `value` modulo the
/// inner prime, given the witnessed `quotient` and the bound `max` on `value`.
pub fn enforce_reduction<F: PrimeField, I: InnerField>(
    value: &FpVar<F>,
    quotient: &FpVar<F>,
    remainder: &FpVar<F>,
    max: &BigUint,
) -> Result<(), SynthesisError> {
    debug_assert!(max.bits() <= safe_bound_bits::<F>());
    let quotient_bits = (max / I::MODULUS_U64).bits() as usize;
    enforce_bit_length(quotient, quotient_bits)?;
    enforce_canonical::<F, I>(remainder)?;
    (quotient * F::from(I::MODULUS_U64) + remainder).enforce_equal(value)
}

/// Returns the canonical reduction of `value`, whose integer value is at most
/// `max`.
pub fn reduce_slow<F: PrimeField, I: InnerField>(
    value: &FpVar<F>,
    max: &BigUint,
) -> Result<FpVar<F>, SynthesisError> {
    let p = BigUint::from(I::MODULUS_U64);
    if value.is_constant() {
        let reduced = field_to_biguint(&value.value()?) % &p;
        return Ok(FpVar::constant(biguint_to_field(&reduced)));
    }

    let cs = value.cs();
    let hint = value.value().ok().map(|v| {
        let n = field_to_biguint(&v);
        (&n / &p, &n % &p)
    });
    let quotient = FpVar::new_witness(ark_relations::ns!(cs, "quotient"), || {
        hint.as_ref()
            .map(|(q, _)| biguint_to_field::<F>(q))
            .ok_or(SynthesisError::AssignmentMissing)
    })?;
    let remainder = FpVar::new_witness(ark_relations::ns!(cs, "remainder"), || {
        hint.as_ref()
            .map(|(_, r)| biguint_to_field::<F>(r))
            .ok_or(SynthesisError::AssignmentMissing)
    })?;

    enforce_reduction::<F, I>(value, &quotient, &remainder, max)?;
    Ok(remainder)
}

/// Reduces every element of a permutation state.
pub fn reduce_state<F: PrimeField, I: InnerField, const N: usize>(
    state: &[FeltVar<F, I>; N],
) -> Result<[FeltVar<F, I>; N], SynthesisError> {
    let mut out = state.clone();
    for felt in out.iter_mut() {
        *felt = felt.reduce()?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{BabyBear, KoalaBear};
    use ark_bn254::Fr;
    use ark_relations::r1cs::ConstraintSystem;

    fn witness(cs: &ark_relations::r1cs::ConstraintSystemRef<Fr>, v: u64) -> FpVar<Fr> {
        FpVar::new_witness(cs.clone(), || Ok(Fr::from(v))).unwrap()
    }

    #[test]
    fn canonical_check_rejects_modulus() {
        let p = KoalaBear::MODULUS_U64;
        for (v, ok) in [(0, true), (p - 1, true), (p, false), ((1 << 31) - 1, false)] {
            let cs = ConstraintSystem::<Fr>::new_ref();
            enforce_canonical::<Fr, KoalaBear>(&witness(&cs, v)).unwrap();
            assert_eq!(cs.is_satisfied().unwrap(), ok, "value {v}");
        }
    }

    #[test]
    fn reduction_matches_native_remainder() {
        let p = BabyBear::MODULUS_U64;
        let x = 5 * p + 17;
        let cs = ConstraintSystem::<Fr>::new_ref();
        let r = reduce_slow::<Fr, BabyBear>(&witness(&cs, x), &BigUint::from(8 * p)).unwrap();
        assert_eq!(r.value().unwrap(), Fr::from(17u64));
        assert!(cs.is_satisfied().unwrap());
    }

    #[test]
    fn aliased_remainder_is_unsatisfied() {
        let p = BabyBear::MODULUS_U64;
        let x = 42;
        let y = x + p;
        let max = BigUint::from(2 * p);

        // honest hint for y is (1, x)
        let cs = ConstraintSystem::<Fr>::new_ref();
        let (value, q, r) = (witness(&cs, y), witness(&cs, 1), witness(&cs, x));
        enforce_reduction::<Fr, BabyBear>(&value, &q, &r, &max).unwrap();
        assert!(cs.is_satisfied().unwrap());

        // passing y through as its own remainder must not verify
        let cs = ConstraintSystem::<Fr>::new_ref();
        let (value, q, r) = (witness(&cs, y), witness(&cs, 0), witness(&cs, y));
        enforce_reduction::<Fr, BabyBear>(&value, &q, &r, &max).unwrap();
        assert!(!cs.is_satisfied().unwrap());
    }

    #[test]
    fn oversized_quotient_is_unsatisfied() {
        let p = BabyBear::MODULUS_U64;
        let cs = ConstraintSystem::<Fr>::new_ref();
        // bound allows a single-bit quotient, the witness claims three
        let (value, q, r) = (witness(&cs, 3 * p + 1), witness(&cs, 3), witness(&cs, 1));
        enforce_reduction::<Fr, BabyBear>(&value, &q, &r, &BigUint::from(p + 10)).unwrap();
        assert!(!cs.is_satisfied().unwrap());
    }
}
