//! On-chain encodings of a wrapped proof: `proof.data`, ABI calldata for the
//! generated verifier, and the contract-inputs JSON.

pub mod solidity;

use std::path::Path;

use alloy_primitives::U256;
use alloy_sol_types::{sol, SolCall};
use ark_bn254::{Bn254, Fq, G1Affine, G2Affine};
use ark_ff::PrimeField;
use ark_groth16::Proof;
use serde::{Deserialize, Serialize};

use crate::{
    groth16::WrapCurve,
    utils::{errors::WrapError, fs::write_atomically},
};
use common::{
    constants::{EVM_PROOF_WORDS, NUM_PUBLIC_INPUTS},
    field_conversion::{decimal_to_hex_word, field_to_u256, u256_to_hex_word},
};

sol! {
    function verifyProof(uint256[8] proof, uint256[2] input) external view;
}

fn word<F: PrimeField>(value: &F) -> Result<U256, WrapError> {
    field_to_u256(value)
        .ok_or_else(|| WrapError::Export(format!("{value} does not fit in a 256-bit word")))
}

/// `[x, y]`, with the point at infinity as `[0, 0]`.
pub(crate) fn g1_words(p: &G1Affine) -> Result<[U256; 2], WrapError> {
    if p.infinity {
        return Ok([U256::ZERO; 2]);
    }
    Ok([word::<Fq>(&p.x)?, word::<Fq>(&p.y)?])
}

/// `[x.c1, x.c0, y.c1, y.c0]`, the order the pairing precompile reads.
pub(crate) fn g2_words(p: &G2Affine) -> Result<[U256; 4], WrapError> {
    if p.infinity {
        return Ok([U256::ZERO; 4]);
    }
    Ok([
        word(&p.x.c1)?,
        word(&p.x.c0)?,
        word(&p.y.c1)?,
        word(&p.y.c0)?,
    ])
}

/// A.x, A.y, B.x.c1, B.x.c0, B.y.c1, B.y.c0, C.x, C.y
pub fn bn254_proof_words(proof: &Proof<Bn254>) -> Result<[U256; EVM_PROOF_WORDS], WrapError> {
    let [ax, ay] = g1_words(&proof.a)?;
    let [bx1, bx0, by1, by0] = g2_words(&proof.b)?;
    let [cx, cy] = g1_words(&proof.c)?;
    Ok([ax, ay, bx1, bx0, by1, by0, cx, cy])
}

/// A proof and its public inputs as EVM words.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OnChainProof {
    pub proof: [U256; EVM_PROOF_WORDS],
    pub public_inputs: Vec<U256>,
}

impl OnChainProof {
    pub fn new<E: WrapCurve>(
        proof: &Proof<E>,
        public: &[E::ScalarField],
    ) -> Result<Self, WrapError> {
        Ok(Self {
            proof: E::on_chain_words(proof)?,
            public_inputs: public.iter().map(word).collect::<Result<_, _>>()?,
        })
    }

    /// Comma-separated 0x-prefixed words: the proof, then the public inputs.
    pub fn to_proof_data(&self) -> String {
        self.proof
            .iter()
            .chain(&self.public_inputs)
            .map(u256_to_hex_word)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn from_proof_data(data: &str) -> Result<Self, WrapError> {
        let words = data
            .trim()
            .split(',')
            .map(|w| {
                let w = w.trim();
                let digits = w.strip_prefix("0x").unwrap_or(w);
                U256::from_str_radix(digits, 16)
                    .map_err(|e| WrapError::InputParse(format!("proof word `{w}`: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if words.len() < EVM_PROOF_WORDS {
            return Err(WrapError::InputParse(format!(
                "proof data has {} words, expected at least {EVM_PROOF_WORDS}",
                words.len()
            )));
        }
        let mut proof = [U256::ZERO; EVM_PROOF_WORDS];
        proof.copy_from_slice(&words[..EVM_PROOF_WORDS]);
        Ok(Self {
            proof,
            public_inputs: words[EVM_PROOF_WORDS..].to_vec(),
        })
    }

    pub fn write_proof_data(&self, path: &Path) -> Result<(), WrapError> {
        write_atomically(path, |w| {
            std::io::Write::write_all(w, self.to_proof_data().as_bytes())
        })
        .map_err(|e| WrapError::Export(format!("writing {}: {e}", path.display())))
    }

    /// ABI-encoded `verifyProof(uint256[8],uint256[2])` call.
    pub fn calldata(&self) -> Result<Vec<u8>, WrapError> {
        let input: [U256; NUM_PUBLIC_INPUTS] =
            self.public_inputs.as_slice().try_into().map_err(|_| {
                WrapError::Export(format!(
                    "verifier takes {NUM_PUBLIC_INPUTS} public inputs, proof carries {}",
                    self.public_inputs.len()
                ))
            })?;
        Ok(verifyProofCall {
            proof: self.proof,
            input,
        }
        .abi_encode())
    }
}

/// Arguments the calling application passes to its verifier contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractInputs {
    #[serde(rename = "riscvVKey")]
    pub riscv_vkey: String,
    pub proof: Vec<String>,
    #[serde(rename = "publicValues")]
    pub public_values: String,
}

impl ContractInputs {
    /// `vkey_hash` is the decimal value from the witness file; `public_values`
    /// is the 0x-prefixed hex stream of the guest's public values.
    pub fn new(
        proof: &OnChainProof,
        vkey_hash: &str,
        public_values: &str,
    ) -> Result<Self, WrapError> {
        let riscv_vkey = decimal_to_hex_word(vkey_hash)
            .ok_or_else(|| WrapError::InputParse(format!("vkey hash `{vkey_hash}`")))?;
        let public_values = public_values.trim();
        let valid_hex = public_values
            .strip_prefix("0x")
            .is_some_and(|digits| digits.chars().all(|c| c.is_ascii_hexdigit()));
        if !valid_hex {
            return Err(WrapError::InputParse(format!(
                "public values `{public_values}` are not 0x-prefixed hex"
            )));
        }
        Ok(Self {
            riscv_vkey,
            proof: proof.proof.iter().map(u256_to_hex_word).collect(),
            public_values: public_values.to_string(),
        })
    }

    pub fn write(&self, path: &Path) -> Result<(), WrapError> {
        write_atomically(path, |w| {
            serde_json::to_writer_pretty(w, self).map_err(std::io::Error::from)
        })
        .map_err(|e| WrapError::Export(format!("writing {}: {e}", path.display())))
    }
}
