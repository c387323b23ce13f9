//! Beta value / M-value conversion for methylation arrays

use crate::data::IntensityMatrix;
use crate::error::{ArrayError, Result};

/// Default clamp offset keeping beta values inside (0, 1)
pub const DEFAULT_BETA_OFFSET: f64 = 1e-6;

/// Fail unless every observed value is a beta value in [0, 1]
pub fn validate_beta(matrix: &IntensityMatrix) -> Result<()> {
    let values = matrix.values();
    for ((i, j), &v) in values.indexed_iter() {
        if !v.is_nan() && !(0.0..=1.0).contains(&v) {
            return Err(ArrayError::InvalidInput {
                reason: format!(
                    "beta value {} outside [0, 1] for probe '{}' in sample '{}'",
                    v,
                    matrix.probe_ids()[i],
                    matrix.sample_ids()[j]
                ),
            });
        }
    }
    Ok(())
}

/// M = log2(beta / (1 - beta)), with beta clamped to [offset, 1 - offset]
pub fn beta_to_m(matrix: &IntensityMatrix, offset: f64) -> Result<IntensityMatrix> {
    if !(offset > 0.0 && offset < 0.5) {
        return Err(ArrayError::config(format!("beta offset must be in (0, 0.5), got {}", offset)));
    }
    validate_beta(matrix)?;
    let m = matrix.values().mapv(|b| {
        let b = b.clamp(offset, 1.0 - offset);
        (b / (1.0 - b)).log2()
    });
    matrix.with_values(m)
}

/// Inverse of [`beta_to_m`]
pub fn m_to_beta(matrix: &IntensityMatrix) -> Result<IntensityMatrix> {
    let beta = matrix.values().mapv(|m| {
        let e = m.exp2();
        e / (1.0 + e)
    });
    matrix.with_values(beta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn betas() -> IntensityMatrix {
        IntensityMatrix::new(
            array![[0.5, 0.8], [0.0, 1.0], [f64::NAN, 0.2]],
            vec!["cg1".into(), "cg2".into(), "cg3".into()],
            vec!["s1".into(), "s2".into()],
        )
        .unwrap()
    }

    #[test]
    fn test_beta_to_m() {
        let m = beta_to_m(&betas(), DEFAULT_BETA_OFFSET).unwrap();
        let v = m.values();
        assert!(v[[0, 0]].abs() < 1e-12);
        assert!((v[[0, 1]] - 2.0).abs() < 1e-12);
        // clamped extremes stay finite and symmetric
        assert!(v[[1, 0]].is_finite() && v[[1, 1]].is_finite());
        assert!((v[[1, 0]] + v[[1, 1]]).abs() < 1e-6);
        assert!(v[[2, 0]].is_nan());
    }

    #[test]
    fn test_m_to_beta_inverts() {
        let m = beta_to_m(&betas(), DEFAULT_BETA_OFFSET).unwrap();
        let back = m_to_beta(&m).unwrap();
        assert!((back.values()[[0, 1]] - 0.8).abs() < 1e-12);
        assert!((back.values()[[2, 1]] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let matrix = IntensityMatrix::new(array![[1.5]], vec!["cg1".into()], vec!["s1".into()]).unwrap();
        let err = beta_to_m(&matrix, DEFAULT_BETA_OFFSET).unwrap_err();
        assert!(err.to_string().contains("cg1"));
    }
}
