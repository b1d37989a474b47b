use std::marker::PhantomData;

use ark_ff::PrimeField;
use ark_r1cs_std::{
    alloc::AllocVar,
    boolean::Boolean,
    eq::EqGadget,
    fields::{fp::FpVar, FieldVar},
    select::CondSelectGadget,
    R1CSVar,
};
use ark_relations::r1cs::{ConstraintSystemRef, SynthesisError};
use num::{BigUint, ToPrimitive};

use super::{
    biguint_to_field,
    bits::enforce_bit_length,
    embedding::{enforce_canonical, reduce_slow, safe_bound_bits},
    field_to_biguint,
};
use crate::field::InnerField;
use common::constants::INNER_FIELD_BITS;

/// An inner-field element emulated in one outer-field variable.
///
/// `max` is an inclusive bound on the integer the variable holds. The value
/// is congruent (mod p) to the represented element but is only canonical
/// when `max < p`.
#[derive(Clone, Debug)]
pub struct FeltVar<F: PrimeField, I: InnerField> {
    var: FpVar<F>,
    max: BigUint,
    _inner: PhantomData<I>,
}

impl<F: PrimeField, I: InnerField> FeltVar<F, I> {
    fn unchecked(var: FpVar<F>, max: BigUint) -> Self {
        debug_assert!(max.bits() <= safe_bound_bits::<F>());
        Self {
            var,
            max,
            _inner: PhantomData,
        }
    }

    fn modulus() -> BigUint {
        BigUint::from(I::MODULUS_U64)
    }

    fn fits(max: &BigUint) -> bool {
        max.bits() <= safe_bound_bits::<F>()
    }

    pub fn constant(value: I) -> Self {
        Self::unchecked(
            FpVar::constant(value.lift()),
            BigUint::from(value.as_canonical_u64()),
        )
    }

    pub fn zero() -> Self {
        Self::constant(I::zero())
    }

    /// Allocates a witness and constrains it to be canonical.
    pub fn new_witness(
        cs: ConstraintSystemRef<F>,
        f: impl FnOnce() -> Result<I, SynthesisError>,
    ) -> Result<Self, SynthesisError> {
        let var = FpVar::new_witness(cs, || f().map(|v| v.lift::<F>()))?;
        Self::embed_canonical(var)
    }

    /// Takes an outer variable already known to hold a value below `2^31` and
    /// constrains it to be below p.
    pub fn embed_canonical(var: FpVar<F>) -> Result<Self, SynthesisError> {
        enforce_canonical::<F, I>(&var)?;
        Ok(Self::unchecked(var, Self::modulus() - 1u32))
    }

    pub fn var(&self) -> &FpVar<F> {
        &self.var
    }

    pub fn max(&self) -> &BigUint {
        &self.max
    }

    pub fn is_canonical(&self) -> bool {
        self.max < Self::modulus()
    }

    pub fn is_constant(&self) -> bool {
        self.var.is_constant()
    }

    pub fn cs(&self) -> ConstraintSystemRef<F> {
        self.var.cs()
    }

    /// The represented inner-field element, if an assignment is available.
    pub fn value(&self) -> Result<I, SynthesisError> {
        let n = field_to_biguint(&self.var.value()?) % Self::modulus();
        n.to_u64()
            .and_then(I::from_canonical_u64)
            .ok_or(SynthesisError::Unsatisfiable)
    }

    pub fn reduce(&self) -> Result<Self, SynthesisError> {
        if self.is_canonical() {
            return Ok(self.clone());
        }
        let var = reduce_slow::<F, I>(&self.var, &self.max)?;
        Ok(Self::unchecked(var, Self::modulus() - 1u32))
    }

    fn reduce_pair(&self, other: &Self) -> Result<(Self, Self), SynthesisError> {
        Ok((self.reduce()?, other.reduce()?))
    }

    pub fn add(&self, other: &Self) -> Result<Self, SynthesisError> {
        let (a, b) = if Self::fits(&(&self.max + &other.max)) {
            (self.clone(), other.clone())
        } else {
            self.reduce_pair(other)?
        };
        Ok(Self::unchecked(&a.var + &b.var, a.max + b.max))
    }

    /// `self - other`, lifted by the smallest multiple of p above `other.max`
    /// so the integer never goes negative.
    pub fn sub(&self, other: &Self) -> Result<Self, SynthesisError> {
        let p = Self::modulus();
        let offset_for = |b: &Self| (&b.max + &p - 1u32) / &p * &p;
        let (a, b) = if Self::fits(&(&self.max + offset_for(other))) {
            (self.clone(), other.clone())
        } else {
            self.reduce_pair(other)?
        };
        let offset = offset_for(&b);
        let var = &a.var + FpVar::constant(biguint_to_field::<F>(&offset)) - &b.var;
        Ok(Self::unchecked(var, a.max + offset))
    }

    pub fn neg(&self) -> Result<Self, SynthesisError> {
        Self::zero().sub(self)
    }

    pub fn mul(&self, other: &Self) -> Result<Self, SynthesisError> {
        let (a, b) = if Self::fits(&(&self.max * &other.max)) {
            (self.clone(), other.clone())
        } else {
            self.reduce_pair(other)?
        };
        Ok(Self::unchecked(&a.var * &b.var, a.max * b.max))
    }

    pub fn add_constant(&self, c: I) -> Result<Self, SynthesisError> {
        self.add(&Self::constant(c))
    }

    pub fn mul_constant(&self, c: I) -> Result<Self, SynthesisError> {
        let c_int = BigUint::from(c.as_canonical_u64());
        let a = if Self::fits(&(&self.max * &c_int)) {
            self.clone()
        } else {
            self.reduce()?
        };
        Ok(Self::unchecked(&a.var * c.lift::<F>(), a.max * c_int))
    }

    /// Multiplicative inverse. Unsatisfiable for zero.
    pub fn inverse(&self) -> Result<Self, SynthesisError> {
        let a = self.reduce()?;
        if a.is_constant() {
            let inv = a.value()?.inverse().ok_or(SynthesisError::Unsatisfiable)?;
            return Ok(Self::constant(inv));
        }
        let hint = a.value().ok().map(|v| v.inverse().unwrap_or_else(I::zero));
        let inv = Self::new_witness(a.cs(), || hint.ok_or(SynthesisError::AssignmentMissing))?;
        a.mul(&inv)?.assert_equal(&Self::constant(I::one()))?;
        Ok(inv)
    }

    pub fn div(&self, other: &Self) -> Result<Self, SynthesisError> {
        self.mul(&other.inverse()?)
    }

    /// Constrains both elements to be equal modulo p.
    pub fn assert_equal(&self, other: &Self) -> Result<(), SynthesisError> {
        let (a, b) = self.reduce_pair(other)?;
        a.var.enforce_equal(&b.var)
    }

    pub fn assert_not_equal(&self, other: &Self) -> Result<(), SynthesisError> {
        let (a, b) = self.reduce_pair(other)?;
        a.var.enforce_not_equal(&b.var)
    }

    pub fn select(cond: &Boolean<F>, t: &Self, f: &Self) -> Result<Self, SynthesisError> {
        let var = FpVar::conditionally_select(cond, &t.var, &f.var)?;
        Ok(Self::unchecked(var, (&t.max).max(&f.max).clone()))
    }

    /// Little-endian bits of the canonical value. Fewer than 31 bits also
    /// constrains the value to fit in `num_bits`.
    pub fn to_bits_le(&self, num_bits: usize) -> Result<Vec<Boolean<F>>, SynthesisError> {
        let a = self.reduce()?;
        let mut bits = enforce_bit_length(&a.var, num_bits.min(INNER_FIELD_BITS))?;
        bits.resize(num_bits, Boolean::FALSE);
        Ok(bits)
    }

    /// Outer variable of the canonical value.
    pub fn to_canonical_var(&self) -> Result<FpVar<F>, SynthesisError> {
        Ok(self.reduce()?.var)
    }
}

impl<F: PrimeField, I: InnerField> Default for FeltVar<F, I> {
    fn default() -> Self {
        Self::zero()
    }
}
