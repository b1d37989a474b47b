/// Number of limbs in an inner-field extension element.
pub const EXT_DEGREE: usize = 4;

/// State width of the Poseidon2 permutation over the inner field.
pub const INNER_PERMUTATION_WIDTH: usize = 16;
/// State width of the Poseidon2 permutation over the outer field.
pub const OUTER_PERMUTATION_WIDTH: usize = 3;

pub const POSEIDON2_FULL_ROUNDS: usize = 8;
pub const OUTER_PARTIAL_ROUNDS: usize = 56;
pub const OUTER_SBOX_DEGREE: u64 = 5;

/// Every inner field supported here has a modulus below 2^31.
pub const INNER_FIELD_BITS: usize = 31;

pub const COMMITTED_VALUES_DIGEST_BYTES: usize = 32;

/// Only the low five bits of the first digest byte survive packing into a
/// 254-bit field element.
pub const DIGEST_TOP_BYTE_MASK: u8 = 0x1f;

pub const NUM_PUBLIC_INPUTS: usize = 2;

/// Words in a serialized Groth16 proof on the EVM (A: 2, B: 4, C: 2).
pub const EVM_PROOF_WORDS: usize = 8;
