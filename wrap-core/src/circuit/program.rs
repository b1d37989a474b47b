//! The constraint program: the recursive STARK verifier lowered to
//! straight-line circuit instructions over named values.

use std::{collections::HashMap, path::Path};

use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::utils::errors::WrapError;
use common::constants::{
    COMMITTED_VALUES_DIGEST_BYTES, EXT_DEGREE, INNER_FIELD_BITS, INNER_PERMUTATION_WIDTH,
    OUTER_PERMUTATION_WIDTH,
};

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum Kind {
    Var,
    Felt,
    Ext,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    ImmVar { out: String, value: String },
    WitnessVar { out: String, index: usize },
    AddVar { out: String, a: String, b: String },
    SubVar { out: String, a: String, b: String },
    MulVar { out: String, a: String, b: String },
    InvVar { out: String, a: String },
    AssertEqVar { a: String, b: String },
    AssertNeVar { a: String, b: String },
    SelectVar { out: String, cond: String, a: String, b: String },
    Num2bitsVar { out: Vec<String>, a: String },
    Permute { state: [String; OUTER_PERMUTATION_WIDTH] },

    ImmFelt { out: String, value: String },
    WitnessFelt { out: String, index: usize },
    AddFelt { out: String, a: String, b: String },
    SubFelt { out: String, a: String, b: String },
    MulFelt { out: String, a: String, b: String },
    DivFelt { out: String, a: String, b: String },
    NegFelt { out: String, a: String },
    InvFelt { out: String, a: String },
    AssertEqFelt { a: String, b: String },
    AssertNeFelt { a: String, b: String },
    SelectFelt { out: String, cond: String, a: String, b: String },
    Num2bitsFelt { out: Vec<String>, a: String },
    ReduceFelt { out: String, a: String },
    PermuteInner { state: Vec<String> },
    PackFelts { out: String, felts: Vec<String> },
    PackBytes { out: String, bytes: Vec<String> },

    ImmExt { out: String, value: [String; EXT_DEGREE] },
    WitnessExt { out: String, index: usize },
    AddExt { out: String, a: String, b: String },
    SubExt { out: String, a: String, b: String },
    MulExt { out: String, a: String, b: String },
    DivExt { out: String, a: String, b: String },
    NegExt { out: String, a: String },
    InvExt { out: String, a: String },
    AddExtFelt { out: String, a: String, b: String },
    MulExtFelt { out: String, a: String, b: String },
    AssertEqExt { a: String, b: String },
    SelectExt { out: String, cond: String, a: String, b: String },
    FeltsToExt { out: String, felts: [String; EXT_DEGREE] },
    ExtToFelts { out: [String; EXT_DEGREE], a: String },
    ReduceExt { out: String, a: String },

    CommitVkeyHash { value: String },
    CommitCommittedValuesDigest { value: String },
}

/// A JSON list of [`Instruction`]s.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstraintProgram {
    pub instructions: Vec<Instruction>,
}

/// Sizes a program is checked against before synthesis.
#[derive(Clone, Copy, Debug)]
pub struct ProgramBounds {
    pub num_vars: usize,
    pub num_felts: usize,
    pub num_exts: usize,
    /// Widest decomposition a `num2bits_var` may request.
    pub max_var_bits: usize,
    /// Most felts `pack_felts` can fit in one outer element.
    pub max_packed_felts: usize,
}

struct Checker<'a> {
    bounds: ProgramBounds,
    kinds: HashMap<&'a str, Kind>,
    commits: [usize; 2],
}

impl<'a> Checker<'a> {
    fn define(&mut self, name: &'a str, kind: Kind) -> Result<(), String> {
        if self.kinds.insert(name, kind).is_some() {
            return Err(format!("`{name}` is defined twice"));
        }
        Ok(())
    }

    fn expect(&self, name: &str, kind: Kind) -> Result<(), String> {
        match self.kinds.get(name) {
            None => Err(format!("`{name}` is used before it is defined")),
            Some(found) if *found != kind => {
                Err(format!("`{name}` is a {found}, expected a {kind}"))
            }
            Some(_) => Ok(()),
        }
    }

    fn binary(&mut self, out: &'a str, a: &str, b: &str, kind: Kind) -> Result<(), String> {
        self.expect(a, kind)?;
        self.expect(b, kind)?;
        self.define(out, kind)
    }

    fn unary(&mut self, out: &'a str, a: &str, kind: Kind) -> Result<(), String> {
        self.expect(a, kind)?;
        self.define(out, kind)
    }

    fn index(index: usize, len: usize, what: &str) -> Result<(), String> {
        if index >= len {
            return Err(format!("{what} witness index {index} out of range ({len} given)"));
        }
        Ok(())
    }

    fn check(&mut self, inst: &'a Instruction) -> Result<(), String> {
        use Instruction::*;
        use Kind::*;
        match inst {
            ImmVar { out, .. } => self.define(out, Var),
            WitnessVar { out, index } => {
                Self::index(*index, self.bounds.num_vars, "var")?;
                self.define(out, Var)
            }
            AddVar { out, a, b } | SubVar { out, a, b } | MulVar { out, a, b } => {
                self.binary(out, a, b, Var)
            }
            InvVar { out, a } => self.unary(out, a, Var),
            AssertEqVar { a, b } | AssertNeVar { a, b } => {
                self.expect(a, Var)?;
                self.expect(b, Var)
            }
            SelectVar { out, cond, a, b } => {
                self.expect(cond, Var)?;
                self.binary(out, a, b, Var)
            }
            Num2bitsVar { out, a } => {
                if out.len() > self.bounds.max_var_bits {
                    return Err(format!(
                        "num2bits_var of `{a}` asks for {} bits, at most {} allowed",
                        out.len(),
                        self.bounds.max_var_bits
                    ));
                }
                self.expect(a, Var)?;
                out.iter().try_for_each(|bit| self.define(bit, Var))
            }
            Permute { state } => state.iter().try_for_each(|s| self.expect(s, Var)),

            ImmFelt { out, .. } => self.define(out, Felt),
            WitnessFelt { out, index } => {
                Self::index(*index, self.bounds.num_felts, "felt")?;
                self.define(out, Felt)
            }
            AddFelt { out, a, b }
            | SubFelt { out, a, b }
            | MulFelt { out, a, b }
            | DivFelt { out, a, b } => self.binary(out, a, b, Felt),
            NegFelt { out, a } | InvFelt { out, a } | ReduceFelt { out, a } => {
                self.unary(out, a, Felt)
            }
            AssertEqFelt { a, b } | AssertNeFelt { a, b } => {
                self.expect(a, Felt)?;
                self.expect(b, Felt)
            }
            SelectFelt { out, cond, a, b } => {
                self.expect(cond, Var)?;
                self.binary(out, a, b, Felt)
            }
            Num2bitsFelt { out, a } => {
                if out.len() > INNER_FIELD_BITS {
                    return Err(format!(
                        "num2bits_felt of `{a}` asks for {} bits, at most {INNER_FIELD_BITS} allowed",
                        out.len()
                    ));
                }
                self.expect(a, Felt)?;
                out.iter().try_for_each(|bit| self.define(bit, Var))
            }
            PermuteInner { state } => {
                if state.len() != INNER_PERMUTATION_WIDTH {
                    return Err(format!(
                        "permute_inner takes {INNER_PERMUTATION_WIDTH} felts, got {}",
                        state.len()
                    ));
                }
                state.iter().try_for_each(|s| self.expect(s, Felt))
            }
            PackFelts { out, felts } => {
                if felts.is_empty() || felts.len() > self.bounds.max_packed_felts {
                    return Err(format!(
                        "pack_felts takes 1 to {} felts, got {}",
                        self.bounds.max_packed_felts,
                        felts.len()
                    ));
                }
                felts.iter().try_for_each(|f| self.expect(f, Felt))?;
                self.define(out, Var)
            }
            PackBytes { out, bytes } => {
                if bytes.len() != COMMITTED_VALUES_DIGEST_BYTES {
                    return Err(format!(
                        "pack_bytes takes {COMMITTED_VALUES_DIGEST_BYTES} bytes, got {}",
                        bytes.len()
                    ));
                }
                bytes.iter().try_for_each(|b| self.expect(b, Felt))?;
                self.define(out, Var)
            }

            ImmExt { out, .. } => self.define(out, Ext),
            WitnessExt { out, index } => {
                Self::index(*index, self.bounds.num_exts, "ext")?;
                self.define(out, Ext)
            }
            AddExt { out, a, b }
            | SubExt { out, a, b }
            | MulExt { out, a, b }
            | DivExt { out, a, b } => self.binary(out, a, b, Ext),
            NegExt { out, a } | InvExt { out, a } | ReduceExt { out, a } => {
                self.unary(out, a, Ext)
            }
            AddExtFelt { out, a, b } | MulExtFelt { out, a, b } => {
                self.expect(a, Ext)?;
                self.expect(b, Felt)?;
                self.define(out, Ext)
            }
            AssertEqExt { a, b } => {
                self.expect(a, Ext)?;
                self.expect(b, Ext)
            }
            SelectExt { out, cond, a, b } => {
                self.expect(cond, Var)?;
                self.binary(out, a, b, Ext)
            }
            FeltsToExt { out, felts } => {
                felts.iter().try_for_each(|f| self.expect(f, Felt))?;
                self.define(out, Ext)
            }
            ExtToFelts { out, a } => {
                self.expect(a, Ext)?;
                out.iter().try_for_each(|f| self.define(f, Felt))
            }

            CommitVkeyHash { value } => {
                self.commits[0] += 1;
                self.expect(value, Var)
            }
            CommitCommittedValuesDigest { value } => {
                self.commits[1] += 1;
                self.expect(value, Var)
            }
        }
    }
}

impl ConstraintProgram {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    pub fn read(path: &Path) -> Result<Self, WrapError> {
        let contents = std::fs::read_to_string(path).map_err(|source| WrapError::InputRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents)
            .map_err(|e| WrapError::InputParse(format!("constraint program {}: {e}", path.display())))
    }

    /// Checks names, kinds, witness indices, bit widths and that each public
    /// value is committed exactly once.
    pub fn validate(&self, bounds: ProgramBounds) -> Result<(), WrapError> {
        let mut checker = Checker {
            bounds,
            kinds: HashMap::new(),
            commits: [0; 2],
        };
        for (pos, inst) in self.instructions.iter().enumerate() {
            checker
                .check(inst)
                .map_err(|msg| WrapError::Circuit(format!("instruction {pos}: {msg}")))?;
        }
        for (count, name) in checker
            .commits
            .iter()
            .zip(["vkey_hash", "committed_values_digest"])
        {
            if *count != 1 {
                return Err(WrapError::Circuit(format!(
                    "{name} must be committed exactly once, found {count} commits"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> ProgramBounds {
        ProgramBounds {
            num_vars: 2,
            num_felts: 1,
            num_exts: 0,
            max_var_bits: 253,
            max_packed_felts: 8,
        }
    }

    fn parse(json: &str) -> ConstraintProgram {
        serde_json::from_str(json).unwrap()
    }

    const COMMITS: &str = r#"
        {"op": "commit_vkey_hash", "value": "a"},
        {"op": "commit_committed_values_digest", "value": "a"}"#;

    #[test]
    fn parses_tagged_instructions() {
        let program = parse(&format!(
            r#"[{{"op": "witness_var", "out": "a", "index": 1}},
                {{"op": "imm_felt", "out": "f", "value": "7"}},
                {{"op": "num2bits_felt", "out": ["b0", "b1", "b2"], "a": "f"}},
                {COMMITS}]"#
        ));
        assert_eq!(
            program.instructions[0],
            Instruction::WitnessVar {
                out: "a".into(),
                index: 1
            }
        );
        program.validate(bounds()).unwrap();
    }

    #[test]
    fn rejects_malformed_programs() {
        let cases = [
            // undefined operand
            r#"{"op": "add_var", "out": "c", "a": "a", "b": "zz"}"#,
            // kind mismatch
            r#"{"op": "imm_felt", "out": "f", "value": "1"},
               {"op": "add_var", "out": "c", "a": "a", "b": "f"}"#,
            // witness index out of range
            r#"{"op": "witness_felt", "out": "f", "index": 1}"#,
            // redefinition
            r#"{"op": "imm_var", "out": "a", "value": "1"}"#,
            // too many bits for a felt
            r#"{"op": "imm_felt", "out": "f", "value": "1"},
               {"op": "num2bits_felt", "out": ["x","x1","x2","x3","x4","x5","x6","x7","x8","x9","x10","x11","x12","x13","x14","x15","x16","x17","x18","x19","x20","x21","x22","x23","x24","x25","x26","x27","x28","x29","x30","x31"], "a": "f"}"#,
        ];
        for body in cases {
            let program = parse(&format!(
                r#"[{{"op": "witness_var", "out": "a", "index": 0}}, {body}, {COMMITS}]"#
            ));
            assert!(
                matches!(program.validate(bounds()), Err(WrapError::Circuit(_))),
                "accepted: {body}"
            );
        }
    }

    #[test]
    fn commits_must_appear_exactly_once() {
        let missing = parse(
            r#"[{"op": "witness_var", "out": "a", "index": 0},
                {"op": "commit_vkey_hash", "value": "a"}]"#,
        );
        assert!(missing.validate(bounds()).is_err());

        let duplicated = parse(&format!(
            r#"[{{"op": "witness_var", "out": "a", "index": 0}}, {COMMITS},
                {{"op": "commit_vkey_hash", "value": "a"}}]"#
        ));
        assert!(duplicated.validate(bounds()).is_err());
    }
}
