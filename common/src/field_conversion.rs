use alloy_primitives::{hex, U256};
use ark_ff::{BigInteger, PrimeField};

use crate::constants::{DIGEST_TOP_BYTE_MASK, INNER_FIELD_BITS};

/// Packs canonical inner-field limbs into one outer element, most significant
/// limb first, shifting by 31 bits per limb.
pub fn pack_felts<F: PrimeField>(felts: &[u64]) -> F {
    let shift = F::from(1u64 << INNER_FIELD_BITS);
    felts
        .iter()
        .fold(F::zero(), |acc, felt| acc * shift + F::from(*felt))
}

/// Packs a big-endian byte string into one outer element. The top three bits
/// of the first byte are dropped so a 32-byte digest always fits.
pub fn pack_bytes<F: PrimeField>(bytes: &[u8]) -> F {
    let radix = F::from(256u64);
    bytes.iter().enumerate().fold(F::zero(), |acc, (i, byte)| {
        let byte = if i == 0 {
            byte & DIGEST_TOP_BYTE_MASK
        } else {
            *byte
        };
        acc * radix + F::from(byte as u64)
    })
}

/// Canonical integer of a field element as an EVM word. `None` for fields
/// wider than 256 bits whose value does not fit.
pub fn field_to_u256<F: PrimeField>(f: &F) -> Option<U256> {
    U256::try_from_le_slice(&f.into_bigint().to_bytes_le())
}

pub fn u256_to_hex_word(word: &U256) -> String {
    format!("0x{}", hex::encode(word.to_be_bytes::<32>()))
}

/// Re-encodes a decimal string (the witness JSON convention) as a 0x-prefixed
/// 32-byte hex word.
pub fn decimal_to_hex_word(decimal: &str) -> Option<String> {
    U256::from_str_radix(decimal.trim(), 10)
        .ok()
        .map(|word| u256_to_hex_word(&word))
}
