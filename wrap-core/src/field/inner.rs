use ark_ff::{
    fields::{Fp64, MontBackend, MontConfig},
    PrimeField,
};

use super::InnerFieldId;

#[derive(MontConfig)]
#[modulus = "2013265921"]
#[generator = "31"]
pub struct BabyBearConfig;
/// p = 2^31 - 2^27 + 1
pub type BabyBear = Fp64<MontBackend<BabyBearConfig, 1>>;

#[derive(MontConfig)]
#[modulus = "2130706433"]
#[generator = "3"]
pub struct KoalaBearConfig;
/// p = 2^31 - 2^24 + 1
pub type KoalaBear = Fp64<MontBackend<KoalaBearConfig, 1>>;

/// A 31-bit prime field a STARK transcript can be produced over.
pub trait InnerField: PrimeField {
    const ID: InnerFieldId;
    const MODULUS_U64: u64;
    /// W in the extension modulus x^4 - W.
    const EXT_NONRESIDUE: u64;
    /// Degree of the Poseidon2 S-box for the width-16 permutation.
    const SBOX_DEGREE: u64;
    const PARTIAL_ROUNDS: usize;
    /// Canonical diagonal of the width-16 internal matrix `diag + 1·1ᵀ`.
    const INTERNAL_DIAG_16: [u64; 16];

    fn as_canonical_u64(&self) -> u64 {
        self.into_bigint().as_ref()[0]
    }

    fn from_canonical_u64(value: u64) -> Option<Self> {
        (value < Self::MODULUS_U64).then(|| Self::from(value))
    }

    /// Canonical value lifted into another (larger) prime field.
    fn lift<F: PrimeField>(&self) -> F {
        F::from(self.as_canonical_u64())
    }
}

impl InnerField for BabyBear {
    const ID: InnerFieldId = InnerFieldId::BabyBear;
    const MODULUS_U64: u64 = 2013265921;
    const EXT_NONRESIDUE: u64 = 11;
    const SBOX_DEGREE: u64 = 7;
    const PARTIAL_ROUNDS: usize = 13;
    const INTERNAL_DIAG_16: [u64; 16] = {
        const P: u64 = 2013265921;
        [
            P - 2,
            1,
            2,
            (P + 1) >> 1,
            3,
            4,
            (P - 1) >> 1,
            P - 3,
            P - 4,
            P - ((P - 1) >> 8),
            P - ((P - 1) >> 2),
            P - ((P - 1) >> 3),
            P - 15,
            (P - 1) >> 8,
            (P - 1) >> 4,
            15,
        ]
    };
}

impl InnerField for KoalaBear {
    const ID: InnerFieldId = InnerFieldId::KoalaBear;
    const MODULUS_U64: u64 = 2130706433;
    const EXT_NONRESIDUE: u64 = 3;
    const SBOX_DEGREE: u64 = 3;
    const PARTIAL_ROUNDS: usize = 20;
    const INTERNAL_DIAG_16: [u64; 16] = {
        const P: u64 = 2130706433;
        [
            P - 2,
            1,
            2,
            (P + 1) >> 1,
            3,
            4,
            (P - 1) >> 1,
            P - 3,
            P - 4,
            P - ((P - 1) >> 8),
            P - ((P - 1) >> 3),
            P - 127,
            (P - 1) >> 8,
            (P - 1) >> 3,
            (P - 1) >> 4,
            127,
        ]
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ff::{Field, One};

    fn check_modulus<I: InnerField>() {
        let minus_one = -I::one();
        assert_eq!(minus_one.as_canonical_u64(), I::MODULUS_U64 - 1);
        assert!(I::MODULUS_U64 < 1 << 31);
        assert_eq!(I::from_canonical_u64(I::MODULUS_U64), None);
    }

    #[test]
    fn moduli_match_declared_constants() {
        check_modulus::<BabyBear>();
        check_modulus::<KoalaBear>();
    }

    fn check_internal_diag<I: InnerField>(tail: u64) {
        let diag = I::INTERNAL_DIAG_16.map(|d| I::from_canonical_u64(d).unwrap());
        let two = I::from(2u64);
        assert_eq!(diag[0], -two);
        assert_eq!(diag[3] * two, I::one());
        assert_eq!(diag[6] * two, -I::one());
        assert_eq!(diag[7], -I::from(3u64));
        assert_eq!(diag[9] * I::from(256u64), I::one());
        assert_eq!(diag[13] * I::from(256u64), -I::one());
        assert_eq!(diag[14] * I::from(16u64), -I::one());
        assert_eq!(diag[15], I::from(tail));
        let mut seen = diag.to_vec();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 16);
    }

    #[test]
    fn internal_diagonals_are_pinned() {
        check_internal_diag::<BabyBear>(15);
        check_internal_diag::<KoalaBear>(127);
        assert_eq!(BabyBear::INTERNAL_DIAG_16[13], 7864320);
        assert_eq!(KoalaBear::INTERNAL_DIAG_16[13], 8323072);
    }

    #[test]
    fn lift_preserves_canonical_value() {
        let x = BabyBear::from(123456789u64);
        let lifted: ark_bn254::Fr = x.lift();
        assert_eq!(lifted, ark_bn254::Fr::from(123456789u64));
        assert_eq!(x.inverse().unwrap() * x, BabyBear::one());
    }
}
