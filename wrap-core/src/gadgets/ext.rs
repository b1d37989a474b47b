use ark_ff::PrimeField;
use ark_r1cs_std::boolean::Boolean;
use ark_relations::r1cs::{ConstraintSystemRef, SynthesisError};

use super::felt::FeltVar;
use crate::field::{BinomialExtension, InnerField};
use common::constants::EXT_DEGREE;

/// Element of the degree-4 binomial extension `I[x] / (x^4 - W)`, one felt
/// per coefficient.
#[derive(Clone, Debug)]
pub struct ExtVar<F: PrimeField, I: InnerField>(pub [FeltVar<F, I>; EXT_DEGREE]);

impl<F: PrimeField, I: InnerField> ExtVar<F, I> {
    pub fn constant(value: BinomialExtension<I>) -> Self {
        Self(value.0.map(FeltVar::constant))
    }

    pub fn zero() -> Self {
        Self::constant(BinomialExtension::zero())
    }

    pub fn new_witness(
        cs: ConstraintSystemRef<F>,
        value: Option<BinomialExtension<I>>,
    ) -> Result<Self, SynthesisError> {
        let mut limbs: [FeltVar<F, I>; EXT_DEGREE] = Default::default();
        for (i, limb) in limbs.iter_mut().enumerate() {
            *limb = FeltVar::new_witness(cs.clone(), || {
                value
                    .map(|v| v.0[i])
                    .ok_or(SynthesisError::AssignmentMissing)
            })?;
        }
        Ok(Self(limbs))
    }

    pub fn limbs(&self) -> &[FeltVar<F, I>; EXT_DEGREE] {
        &self.0
    }

    pub fn cs(&self) -> ConstraintSystemRef<F> {
        self.0
            .iter()
            .fold(ConstraintSystemRef::None, |cs, limb| cs.or(limb.cs()))
    }

    pub fn is_constant(&self) -> bool {
        self.0.iter().all(FeltVar::is_constant)
    }

    pub fn value(&self) -> Result<BinomialExtension<I>, SynthesisError> {
        let mut out = BinomialExtension::zero();
        for (dst, limb) in out.0.iter_mut().zip(&self.0) {
            *dst = limb.value()?;
        }
        Ok(out)
    }

    fn zip_with(
        &self,
        other: &Self,
        op: impl Fn(&FeltVar<F, I>, &FeltVar<F, I>) -> Result<FeltVar<F, I>, SynthesisError>,
    ) -> Result<Self, SynthesisError> {
        let mut limbs: [FeltVar<F, I>; EXT_DEGREE] = Default::default();
        for (i, limb) in limbs.iter_mut().enumerate() {
            *limb = op(&self.0[i], &other.0[i])?;
        }
        Ok(Self(limbs))
    }

    pub fn add(&self, other: &Self) -> Result<Self, SynthesisError> {
        self.zip_with(other, FeltVar::add)
    }

    pub fn sub(&self, other: &Self) -> Result<Self, SynthesisError> {
        self.zip_with(other, FeltVar::sub)
    }

    pub fn neg(&self) -> Result<Self, SynthesisError> {
        Self::zero().sub(self)
    }

    pub fn reduce(&self) -> Result<Self, SynthesisError> {
        let mut limbs = self.0.clone();
        for limb in limbs.iter_mut() {
            *limb = limb.reduce()?;
        }
        Ok(Self(limbs))
    }

    pub fn mul(&self, other: &Self) -> Result<Self, SynthesisError> {
        let (a, b) = (self.reduce()?, other.reduce()?);
        let nonresidue = I::from(I::EXT_NONRESIDUE);
        let mut low: [FeltVar<F, I>; EXT_DEGREE] = Default::default();
        let mut high: [FeltVar<F, I>; EXT_DEGREE] = Default::default();
        for i in 0..EXT_DEGREE {
            for j in 0..EXT_DEGREE {
                let product = a.0[i].mul(&b.0[j])?;
                let k = i + j;
                if k < EXT_DEGREE {
                    low[k] = low[k].add(&product)?;
                } else {
                    high[k - EXT_DEGREE] = high[k - EXT_DEGREE].add(&product)?;
                }
            }
        }
        for (l, h) in low.iter_mut().zip(&high) {
            *l = l.add(&h.mul_constant(nonresidue)?)?;
        }
        Ok(Self(low))
    }

    pub fn add_base(&self, felt: &FeltVar<F, I>) -> Result<Self, SynthesisError> {
        let mut out = self.clone();
        out.0[0] = out.0[0].add(felt)?;
        Ok(out)
    }

    pub fn mul_base(&self, felt: &FeltVar<F, I>) -> Result<Self, SynthesisError> {
        let mut limbs = self.0.clone();
        for limb in limbs.iter_mut() {
            *limb = limb.mul(felt)?;
        }
        Ok(Self(limbs))
    }

    /// Multiplicative inverse. Unsatisfiable for zero.
    pub fn inverse(&self) -> Result<Self, SynthesisError> {
        if self.is_constant() {
            let inv = self.value()?.inverse().ok_or(SynthesisError::Unsatisfiable)?;
            return Ok(Self::constant(inv));
        }
        let hint = self
            .value()
            .ok()
            .map(|v| v.inverse().unwrap_or_else(BinomialExtension::zero));
        let inv = Self::new_witness(self.cs(), hint)?;
        self.mul(&inv)?
            .assert_equal(&Self::constant(BinomialExtension::one()))?;
        Ok(inv)
    }

    pub fn div(&self, other: &Self) -> Result<Self, SynthesisError> {
        self.mul(&other.inverse()?)
    }

    pub fn assert_equal(&self, other: &Self) -> Result<(), SynthesisError> {
        for (a, b) in self.0.iter().zip(&other.0) {
            a.assert_equal(b)?;
        }
        Ok(())
    }

    pub fn select(cond: &Boolean<F>, t: &Self, f: &Self) -> Result<Self, SynthesisError> {
        t.zip_with(f, |a, b| FeltVar::select(cond, a, b))
    }
}
