use anyhow::{Context, Result};
use polars::prelude::*;

use crate::df_utils::add_chi2_from_p;
use crate::error::EscoreError;
use crate::types::{TraitGroupStat, TraitWeight, WeightFallback};

/// Mean 1-df chi-square of one trait's association results. Uses the CHI2
/// column when the input carries one, otherwise derives it from P.
pub fn group_stat(trait_id: &str, df: &DataFrame) -> Result<TraitGroupStat> {
    let df = add_chi2_from_p(df.clone(), "P")?;
    let chi = df.column("CHI2")?.as_series().context("CHI2")?.f64()?;

    let mut sum = 0.0;
    let mut n = 0usize;
    for v in chi.into_iter().flatten() {
        if !v.is_finite() {
            continue;
        }
        if v < 0.0 {
            return Err(EscoreError::InvalidArgument(format!(
                "Negative chi-square statistic in trait {trait_id}"
            ))
            .into());
        }
        sum += v;
        n += 1;
    }
    if n == 0 {
        return Err(EscoreError::InvalidArgument(format!(
            "No usable chi-square statistics for trait {trait_id}"
        ))
        .into());
    }

    Ok(TraitGroupStat {
        trait_id: trait_id.to_string(),
        mean_chi2: sum / n as f64,
    })
}

/// `max(0, mean_chi2 - 1)` per trait, normalized so the group sums to 1.
/// When no trait is inflated above the null expectation of 1 the division
/// is undefined; the fallback then assigns uniform or all-zero weights and
/// the returned flag records that it fired.
pub fn normalize_weights(
    stats: &[TraitGroupStat],
    fallback: WeightFallback,
) -> (Vec<TraitWeight>, bool) {
    let raw: Vec<f64> = stats.iter().map(|s| (s.mean_chi2 - 1.0).max(0.0)).collect();
    let total: f64 = raw.iter().sum();

    if total > 0.0 {
        let weights = stats
            .iter()
            .zip(&raw)
            .map(|(s, r)| TraitWeight {
                trait_id: s.trait_id.clone(),
                weight: r / total,
            })
            .collect();
        return (weights, false);
    }

    let value = match fallback {
        WeightFallback::Uniform if !stats.is_empty() => 1.0 / stats.len() as f64,
        _ => 0.0,
    };
    let weights = stats
        .iter()
        .map(|s| TraitWeight {
            trait_id: s.trait_id.clone(),
            weight: value,
        })
        .collect();
    (weights, true)
}
