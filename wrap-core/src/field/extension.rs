use std::ops::{Add, Mul, Neg, Sub};

use ark_ff::Zero;
use common::constants::EXT_DEGREE;

use super::InnerField;

/// Element of the degree-4 binomial extension I[x] / (x^4 - W), stored as
/// coefficients of 1, x, x^2, x^3.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BinomialExtension<I: InnerField>(pub [I; EXT_DEGREE]);

impl<I: InnerField> BinomialExtension<I> {
    pub fn new(limbs: [I; EXT_DEGREE]) -> Self {
        Self(limbs)
    }

    pub fn zero() -> Self {
        Self([I::zero(); EXT_DEGREE])
    }

    pub fn one() -> Self {
        let mut limbs = [I::zero(); EXT_DEGREE];
        limbs[0] = I::one();
        Self(limbs)
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(Zero::is_zero)
    }

    pub fn nonresidue() -> I {
        I::from(I::EXT_NONRESIDUE)
    }

    /// Inverse via the norm down to the quadratic subfield I[y] / (y^2 - W),
    /// y = x^2. `None` for zero.
    pub fn inverse(&self) -> Option<Self> {
        let w = Self::nonresidue();
        let [a0, a1, a2, a3] = self.0;
        // a * conj(a) = b0 + b1 y with conj(a) = a0 - a1 x + a2 x^2 - a3 x^3
        let b0 = a0.square() + w * a2.square() - w * (a1 * a3).double();
        let b1 = (a0 * a2).double() - a1.square() - w * a3.square();
        let norm = b0.square() - w * b1.square();
        let norm_inv = norm.inverse()?;
        let b_inv = Self([b0 * norm_inv, I::zero(), -b1 * norm_inv, I::zero()]);
        let conj = Self([a0, -a1, a2, -a3]);
        Some(conj * b_inv)
    }
}

impl<I: InnerField> Add for BinomialExtension<I> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        let mut limbs = self.0;
        for (limb, r) in limbs.iter_mut().zip(rhs.0) {
            *limb += r;
        }
        Self(limbs)
    }
}

impl<I: InnerField> Sub for BinomialExtension<I> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self + (-rhs)
    }
}

impl<I: InnerField> Neg for BinomialExtension<I> {
    type Output = Self;

    fn neg(self) -> Self {
        Self(self.0.map(|limb| -limb))
    }
}

impl<I: InnerField> Mul for BinomialExtension<I> {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        let w = Self::nonresidue();
        let mut limbs = [I::zero(); EXT_DEGREE];
        for i in 0..EXT_DEGREE {
            for j in 0..EXT_DEGREE {
                let term = self.0[i] * rhs.0[j];
                if i + j < EXT_DEGREE {
                    limbs[i + j] += term;
                } else {
                    limbs[i + j - EXT_DEGREE] += w * term;
                }
            }
        }
        Self(limbs)
    }
}
