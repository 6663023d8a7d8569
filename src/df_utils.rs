use anyhow::{Context, Result};
use polars::prelude::*;
use statrs::distribution::{ContinuousCDF, Normal};

use crate::error::EscoreError;
use crate::qc::check_range_f64;
use crate::types::{PValuePolicy, RunSummary};

pub fn ensure_utf8(mut df: DataFrame, cols: &[&str]) -> Result<DataFrame> {
    for col in cols {
        if let Ok(column) = df.column(col)
            && let Some(series) = column.as_series()
            && series.dtype() != &DataType::String
        {
            let mut casted = series.cast(&DataType::String)?;
            casted.rename((*col).into());
            df.with_column(casted.into_column())?;
        }
    }
    Ok(df)
}

pub fn ensure_f64(mut df: DataFrame, cols: &[&str]) -> Result<DataFrame> {
    for col in cols {
        if let Ok(column) = df.column(col)
            && let Some(series) = column.as_series()
            && series.dtype() != &DataType::Float64
        {
            let mut casted = series.cast(&DataType::Float64)?;
            casted.rename((*col).into());
            df.with_column(casted.into_column())?;
        }
    }
    Ok(df)
}

pub fn filter_missing(mut df: DataFrame, col: &str) -> Result<(DataFrame, usize)> {
    if df.column(col).is_err() {
        return Ok((df, 0));
    }
    let before = df.height();
    let column = df.column(col)?;
    let series = column.as_series().context("series")?;
    let mask = match series.dtype() {
        DataType::Float64 => series.is_not_null() & series.f64()?.is_not_nan(),
        _ => series.is_not_null(),
    };
    df = df.filter(&mask)?;
    let removed = before.saturating_sub(df.height());
    Ok((df, removed))
}

/// Enforces the configured out-of-range p-value policy on one column.
/// Missing values are dropped and counted as skipped regardless of policy;
/// nothing is ever coerced silently.
pub fn apply_p_policy(
    mut df: DataFrame,
    p_col: &str,
    policy: PValuePolicy,
    input_name: &str,
) -> Result<(DataFrame, RunSummary)> {
    let mut summary = RunSummary::default();

    let (df_tmp, removed) = filter_missing(df, p_col)?;
    df = df_tmp;
    summary.skipped += removed;

    let p = df.column(p_col)?.as_series().context("p-value column")?.f64()?;
    let too_high = p.into_iter().flatten().filter(|v| *v > 1.0).count();
    let too_low = p.into_iter().flatten().filter(|v| *v <= 0.0).count();

    match policy {
        PValuePolicy::Floor(min_p) => {
            check_range_f64(min_p, 0.0, 1.0, true, "min.p.floor")?;
            if too_high > 0 {
                return Err(EscoreError::InvalidPValue {
                    input: input_name.to_string(),
                    detail: format!("{too_high} value(s) above 1 cannot be floored"),
                }
                .into());
            }
            let floored = p.into_iter().flatten().filter(|v| *v < min_p).count();
            if floored > 0 {
                let raised = p.apply(|v| v.map(|x| x.max(min_p))).into_series();
                let mut series = raised;
                series.rename(p_col.into());
                df.with_column(series.into_column())?;
                summary.floored += floored;
            }
        }
        PValuePolicy::Reject => {
            let bad = too_high + too_low;
            if bad > 0 {
                return Err(EscoreError::InvalidPValue {
                    input: input_name.to_string(),
                    detail: format!("{bad} value(s) outside (0, 1]"),
                }
                .into());
            }
        }
        PValuePolicy::Skip => {
            let bad = too_high + too_low;
            if bad > 0 {
                let mask: BooleanChunked = p
                    .into_iter()
                    .map(|v| v.map(|x| x > 0.0 && x <= 1.0))
                    .collect();
                df = df.filter(&mask)?;
                summary.skipped += bad;
            }
        }
    }

    Ok((df, summary))
}

/// `-log10(p)` of `src` appended as `dst`. Callers run the p-value policy
/// first so the transform only ever sees values in (0, 1].
pub fn neg_log10_column(mut df: DataFrame, src: &str, dst: &str) -> Result<DataFrame> {
    let p = df.column(src)?.as_series().context("p-value column")?.f64()?;
    let logp = p.apply(|v| v.map(|x| -x.log10())).into_series();
    let mut series = logp;
    series.rename(dst.into());
    df.with_column(series.into_column())?;
    Ok(df)
}

/// Derives a 1-df chi-square column from P when the input carries none.
/// Uses the normal quantile of p/2, which stays finite down to the
/// smallest representable p-values.
pub fn add_chi2_from_p(mut df: DataFrame, p_col: &str) -> Result<DataFrame> {
    if df.column("CHI2").is_ok() {
        return Ok(df);
    }
    let p = df.column(p_col)?.as_series().context("p-value column")?.f64()?;
    let normal = Normal::new(0.0, 1.0).context("normal distribution")?;

    let chi: Float64Chunked = p
        .into_iter()
        .map(|v| match v {
            Some(x) if x > 0.0 && x <= 1.0 => {
                let z = normal.inverse_cdf(x / 2.0);
                Some(z * z)
            }
            _ => None,
        })
        .collect();

    let mut series = chi.into_series();
    series.rename("CHI2".into());
    df.with_column(series.into_column())?;
    Ok(df)
}
