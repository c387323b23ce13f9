//! Moderated statistics and multiple testing for differential analysis

mod ebayes;
mod fdr;
mod pvalue;

pub use ebayes::{ebayes, fit_f_dist, EbayesFit, EbayesParams, VariancePrior};
pub use fdr::{adjust_pvalues, benjamini_hochberg, benjamini_yekutieli, bonferroni, holm, AdjustMethod};
pub use pvalue::{pvalue_t, t_cdf, t_quantile};

use crate::data::IntensityMatrix;
use crate::error::{ArrayError, Result};
use crate::io::{DiffRecord, ModelResult};
use crate::model::{lm_fit, ContrastFit, ContrastSpec, DesignMatrix};

/// Fit, moderate and adjust: one record per row of `matrix`, in row order
pub fn differential_analysis(
    matrix: &IntensityMatrix,
    design: &DesignMatrix,
    contrast: &ContrastSpec,
    params: &EbayesParams,
    adjust: AdjustMethod,
) -> Result<ModelResult> {
    if !(params.proportion > 0.0 && params.proportion < 1.0) {
        return Err(ArrayError::config(format!(
            "proportion of differential rows must be in (0, 1), got {}",
            params.proportion
        )));
    }
    let fit = lm_fit(matrix, design)?;
    let contrast_fit = fit.contrast(design, contrast)?;
    let moderated = ebayes(&contrast_fit, params);
    Ok(model_result(&contrast_fit, &moderated, adjust))
}

/// Assemble typed records from a contrast fit and its moderated statistics
pub fn model_result(fit: &ContrastFit, moderated: &EbayesFit, adjust: AdjustMethod) -> ModelResult {
    let adjusted = adjust_pvalues(&moderated.p_value, adjust);
    let records: Vec<DiffRecord> = (0..fit.n_probes())
        .map(|i| {
            if !fit.estimate[i].is_finite() {
                return DiffRecord::missing(&fit.probe_ids[i], fit.ave[i]);
            }
            DiffRecord {
                probe_id: fit.probe_ids[i].clone(),
                log_fc: fit.estimate[i],
                ave_expr: fit.ave[i],
                t: moderated.t[i],
                p_value: moderated.p_value[i],
                adj_p_value: adjusted[i],
                b: moderated.b[i],
            }
        })
        .collect();

    let tested = records.iter().filter(|r| r.p_value.is_finite()).count();
    log::info!(
        "Contrast {}: {} of {} rows tested, prior df = {:.3}",
        fit.contrast,
        tested,
        records.len(),
        moderated.prior.df
    );

    ModelResult {
        contrast: fit.contrast.clone(),
        records,
        df_prior: moderated.prior.df,
        s2_prior: moderated.prior.s2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SampleAnnotation;
    use crate::model::DesignBuilder;
    use ndarray::Array2;

    #[test]
    fn test_records_follow_row_order() {
        let samples: Vec<String> = (0..6).map(|j| format!("s{}", j)).collect();
        let mut ann = SampleAnnotation::new(samples.clone()).unwrap();
        ann.add_levels("group", ["a", "a", "a", "b", "b", "b"].iter().map(|s| s.to_string()).collect())
            .unwrap();
        let design = DesignBuilder::new(&ann).group("group").build().unwrap();
        let contrast = ContrastSpec::difference(&design, "b", "a").unwrap();

        let values = Array2::from_shape_fn((30, 6), |(i, j)| {
            let noise = (((i * 31 + j * 17) % 13) as f64 - 6.0) * 0.05;
            let effect = if i == 4 && j >= 3 { 3.0 } else { 0.0 };
            8.0 + noise + effect
        });
        let matrix = IntensityMatrix::new(values, (0..30).map(|i| format!("p{}", i)).collect(), samples).unwrap();

        let result =
            differential_analysis(&matrix, &design, &contrast, &EbayesParams::default(), AdjustMethod::Bh).unwrap();
        assert_eq!(result.n_probes(), 30);
        assert_eq!(result.records[4].probe_id, "p4");
        assert!(result.records[4].log_fc > 2.5);
        let top = result.top_table(Some(1));
        assert_eq!(top[0].probe_id, "p4");
        for r in &result.records {
            assert!(r.adj_p_value >= r.p_value);
        }
    }

    #[test]
    fn test_group_without_observations_reported_missing() {
        let samples: Vec<String> = (0..6).map(|j| format!("s{}", j)).collect();
        let mut ann = SampleAnnotation::new(samples.clone()).unwrap();
        ann.add_levels("group", ["a", "a", "a", "b", "b", "b"].iter().map(|s| s.to_string()).collect())
            .unwrap();
        let design = DesignBuilder::new(&ann).group("group").build().unwrap();
        let contrast = ContrastSpec::difference(&design, "b", "a").unwrap();

        let values = Array2::from_shape_fn((10, 6), |(i, j)| {
            if i == 2 && j >= 3 {
                f64::NAN
            } else {
                5.0 + (((i * 7 + j * 3) % 5) as f64) * 0.1
            }
        });
        let matrix = IntensityMatrix::new(values, (0..10).map(|i| format!("p{}", i)).collect(), samples).unwrap();

        let result =
            differential_analysis(&matrix, &design, &contrast, &EbayesParams::default(), AdjustMethod::Bh).unwrap();
        let row = &result.records[2];
        assert_eq!(row.probe_id, "p2");
        assert!(row.log_fc.is_nan());
        assert!(row.p_value.is_nan() && row.adj_p_value.is_nan() && row.b.is_nan());
        assert!(row.ave_expr.is_finite());
        assert!(result.records[3].p_value.is_finite());
    }
}
