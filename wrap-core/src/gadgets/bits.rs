use ark_ff::{BigInteger, PrimeField};
use ark_r1cs_std::{
    alloc::AllocVar,
    boolean::Boolean,
    eq::EqGadget,
    fields::{fp::FpVar, FieldVar},
    R1CSVar,
};
use ark_relations::r1cs::SynthesisError;

/// Decomposes `value` into `num_bits` little-endian booleans and constrains
/// their weighted sum to equal `value`. Unsatisfiable when the value does not
/// fit in `num_bits` bits.
///
/// `num_bits` must stay below the field's bit size, otherwise the
/// decomposition is not unique.
pub fn enforce_bit_length<F: PrimeField>(
    value: &FpVar<F>,
    num_bits: usize,
) -> Result<Vec<Boolean<F>>, SynthesisError> {
    debug_assert!(num_bits < F::MODULUS_BIT_SIZE as usize);

    if value.is_constant() {
        let bits = value.value()?.into_bigint().to_bits_le();
        if bits[num_bits.min(bits.len())..].iter().any(|b| *b) {
            return Err(SynthesisError::Unsatisfiable);
        }
        return Ok(bits[..num_bits]
            .iter()
            .map(|b| Boolean::constant(*b))
            .collect());
    }

    let cs = value.cs();
    let bit_values = value.value().ok().map(|v| v.into_bigint().to_bits_le());
    let bits = (0..num_bits)
        .map(|i| {
            Boolean::new_witness(cs.clone(), || {
                bit_values
                    .as_ref()
                    .map(|bits| bits[i])
                    .ok_or(SynthesisError::AssignmentMissing)
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    compose_le(&bits).enforce_equal(value)?;
    Ok(bits)
}

/// Σ bits[i] * 2^i as a linear combination (no constraints added).
pub fn compose_le<F: PrimeField>(bits: &[Boolean<F>]) -> FpVar<F> {
    let mut acc = FpVar::zero();
    let mut coeff = F::one();
    for bit in bits {
        acc += FpVar::from(bit.clone()) * coeff;
        coeff.double_in_place();
    }
    acc
}
