use std::path::Path;

use ark_ff::{BigInteger, PrimeField};
use num::{BigUint, ToPrimitive};
use serde::{Deserialize, Serialize};

use crate::{
    field::{BinomialExtension, InnerField},
    utils::errors::WrapError,
};
use common::constants::EXT_DEGREE;

/// Witness JSON emitted by the zkVM next to the constraint program. Every
/// value is a decimal string.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessInput {
    #[serde(default)]
    pub vars: Vec<String>,
    #[serde(default)]
    pub felts: Vec<String>,
    #[serde(default)]
    pub exts: Vec<[String; EXT_DEGREE]>,
    pub vkey_hash: String,
    pub committed_values_digest: String,
}

/// [`WitnessInput`] with every value parsed into its field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedWitness<F: PrimeField, I: InnerField> {
    pub vars: Vec<F>,
    pub felts: Vec<I>,
    pub exts: Vec<BinomialExtension<I>>,
    pub vkey_hash: F,
    pub committed_values_digest: F,
}

fn parse_decimal(value: &str, what: &str) -> Result<BigUint, WrapError> {
    BigUint::parse_bytes(value.trim().as_bytes(), 10)
        .ok_or_else(|| WrapError::InputParse(format!("{what}: `{value}` is not a decimal integer")))
}

/// Parses a canonical element of the outer field.
pub fn parse_outer<F: PrimeField>(value: &str, what: &str) -> Result<F, WrapError> {
    let n = parse_decimal(value, what)?;
    let modulus = BigUint::from_bytes_le(&F::MODULUS.to_bytes_le());
    if n >= modulus {
        return Err(WrapError::InputParse(format!(
            "{what}: {value} is not below the outer field modulus"
        )));
    }
    Ok(F::from_le_bytes_mod_order(&n.to_bytes_le()))
}

/// Parses a canonical element of the inner field.
pub fn parse_inner<I: InnerField>(value: &str, what: &str) -> Result<I, WrapError> {
    parse_decimal(value, what)?
        .to_u64()
        .and_then(I::from_canonical_u64)
        .ok_or_else(|| {
            WrapError::InputParse(format!(
                "{what}: {value} is not below the inner field modulus {}",
                I::MODULUS_U64
            ))
        })
}

impl WitnessInput {
    pub fn read(path: &Path) -> Result<Self, WrapError> {
        let contents = std::fs::read_to_string(path).map_err(|source| WrapError::InputRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents)
            .map_err(|e| WrapError::InputParse(format!("witness {}: {e}", path.display())))
    }

    pub fn parse<F: PrimeField, I: InnerField>(&self) -> Result<ParsedWitness<F, I>, WrapError> {
        let vars = self
            .vars
            .iter()
            .enumerate()
            .map(|(i, v)| parse_outer(v, &format!("vars[{i}]")))
            .collect::<Result<_, _>>()?;
        let felts = self
            .felts
            .iter()
            .enumerate()
            .map(|(i, v)| parse_inner(v, &format!("felts[{i}]")))
            .collect::<Result<_, _>>()?;
        let exts = self
            .exts
            .iter()
            .enumerate()
            .map(|(i, limbs)| {
                let mut out = BinomialExtension::zero();
                for (j, limb) in limbs.iter().enumerate() {
                    out.0[j] = parse_inner(limb, &format!("exts[{i}][{j}]"))?;
                }
                Ok(out)
            })
            .collect::<Result<_, WrapError>>()?;
        Ok(ParsedWitness {
            vars,
            felts,
            exts,
            vkey_hash: parse_outer(&self.vkey_hash, "vkey_hash")?,
            committed_values_digest: parse_outer(
                &self.committed_values_digest,
                "committed_values_digest",
            )?,
        })
    }
}
