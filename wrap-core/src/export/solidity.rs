use std::fmt::Write;

use alloy_primitives::U256;
use ark_bn254::Bn254;
use ark_groth16::VerifyingKey;

use super::{g1_words, g2_words};
use crate::utils::errors::WrapError;
use common::field_conversion::u256_to_hex_word;

const TEMPLATE: &str = include_str!("Groth16Verifier.sol.template");

fn g2_substitutions(name: &str, words: [U256; 4]) -> [(String, String); 4] {
    let [x1, x0, y1, y0] = words.map(|w| u256_to_hex_word(&w));
    [
        (format!("{{{{{name}_X1}}}}"), x1),
        (format!("{{{{{name}_X0}}}}"), x0),
        (format!("{{{{{name}_Y1}}}}"), y1),
        (format!("{{{{{name}_Y0}}}}"), y0),
    ]
}

/// Renders a self-contained Solidity verifier for `vk`. The verifier exposes
/// `verifyProof(uint256[8], uint256[n])`, reverting on an invalid proof.
pub fn render_verifier(vk: &VerifyingKey<Bn254>) -> Result<String, WrapError> {
    if vk.gamma_abc_g1.is_empty() {
        return Err(WrapError::Export("verifying key has no IC points".into()));
    }
    let num_public = vk.gamma_abc_g1.len() - 1;

    let mut ic_points = String::new();
    for (i, point) in vk.gamma_abc_g1.iter().enumerate() {
        let [x, y] = g1_words(point)?;
        // Writing into a String cannot fail.
        let _ = writeln!(
            ic_points,
            "        points[{i}] = [uint256({}), uint256({})];",
            u256_to_hex_word(&x),
            u256_to_hex_word(&y)
        );
    }

    let [alpha_x, alpha_y] = g1_words(&vk.alpha_g1)?;
    let mut substitutions = vec![
        ("{{ALPHA_X}}".to_string(), u256_to_hex_word(&alpha_x)),
        ("{{ALPHA_Y}}".to_string(), u256_to_hex_word(&alpha_y)),
        ("{{IC_LENGTH}}".to_string(), vk.gamma_abc_g1.len().to_string()),
        ("{{NUM_PUBLIC}}".to_string(), num_public.to_string()),
        (
            "{{IC_POINTS}}".to_string(),
            ic_points.trim_end().to_string(),
        ),
    ];
    substitutions.extend(g2_substitutions("BETA", g2_words(&vk.beta_g2)?));
    substitutions.extend(g2_substitutions("GAMMA", g2_words(&vk.gamma_g2)?));
    substitutions.extend(g2_substitutions("DELTA", g2_words(&vk.delta_g2)?));

    let rendered = substitutions
        .iter()
        .fold(TEMPLATE.to_string(), |acc, (key, value)| {
            acc.replace(key, value)
        });
    if rendered.contains("{{") {
        return Err(WrapError::Export(
            "verifier template has unfilled placeholders".into(),
        ));
    }
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_bn254::{G1Affine, G2Affine};
    use ark_ec::AffineRepr;

    fn toy_vk(num_public: usize) -> VerifyingKey<Bn254> {
        VerifyingKey {
            alpha_g1: G1Affine::generator(),
            beta_g2: G2Affine::generator(),
            gamma_g2: G2Affine::generator(),
            delta_g2: G2Affine::generator(),
            gamma_abc_g1: vec![G1Affine::generator(); num_public + 1],
        }
    }

    #[test]
    fn renders_every_placeholder() {
        let source = render_verifier(&toy_vk(2)).unwrap();
        assert!(!source.contains("{{"));
        assert!(source.contains("uint256[2] calldata input"));
        assert!(source.contains("uint256[2][3] memory points"));
        assert_eq!(source.matches("        points[").count(), 3);
        assert!(source.contains(&format!("ALPHA_X = 0x{:0>64};", "1")));
        assert!(source.contains(&format!("ALPHA_Y = 0x{:0>64};", "2")));
    }

    #[test]
    fn beta_is_written_with_the_high_coefficient_first() {
        let vk = toy_vk(2);
        let source = render_verifier(&vk).unwrap();
        let [x1, x0, ..] = g2_words(&vk.beta_g2).unwrap();
        assert!(source.contains(&format!("BETA_X1 = {};", u256_to_hex_word(&x1))));
        assert!(source.contains(&format!("BETA_X0 = {};", u256_to_hex_word(&x0))));
    }

    #[test]
    fn empty_ic_is_rejected() {
        let mut vk = toy_vk(0);
        vk.gamma_abc_g1.clear();
        assert!(matches!(render_verifier(&vk), Err(WrapError::Export(_))));
    }
}
