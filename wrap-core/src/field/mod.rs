//! Field configuration for the wrapper.
//!
//! The *inner* field is the small prime field the STARK transcript was
//! produced over; its elements are emulated inside the circuit. The *outer*
//! field is the scalar field of the pairing curve the Groth16 proof lives on.

pub mod extension;
pub mod inner;

use serde::{Deserialize, Serialize};
use strum_macros::Display;

pub use extension::BinomialExtension;
pub use inner::{BabyBear, InnerField, KoalaBear};

/// Pairing curve of the outer proof. Selected at configuration time.
#[derive(
    Clone, Copy, Debug, Default, Display, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum CurveId {
    #[default]
    #[strum(serialize = "bn254")]
    Bn254,
    #[strum(serialize = "bls12-381")]
    Bls12_381,
}

impl CurveId {
    pub fn tag(self) -> u8 {
        match self {
            CurveId::Bn254 => 0,
            CurveId::Bls12_381 => 1,
        }
    }

    /// Only BN254 has pairing precompiles on the EVM.
    pub fn has_evm_verifier(self) -> bool {
        matches!(self, CurveId::Bn254)
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(CurveId::Bn254),
            1 => Some(CurveId::Bls12_381),
            _ => None,
        }
    }
}

#[derive(
    Clone, Copy, Debug, Default, Display, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum InnerFieldId {
    #[strum(serialize = "babybear")]
    BabyBear,
    #[default]
    #[strum(serialize = "koalabear")]
    KoalaBear,
}
