use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use polars::prelude::*;

use crate::df_utils::{apply_p_policy, ensure_f64, ensure_utf8, neg_log10_column};
use crate::io::{read_table, write_table};
use crate::logging::{log_line, log_summary, open_run_log};
use crate::merge::{NamedFrame, merge_on_variant, require_column};
use crate::qc::{check_file_exists, check_nonneg_f64};
use crate::schema::{ColumnMapConfig, resolve_column_map};
use crate::types::{DeltaCategory, PValuePolicy, RunSummary};

/// Set names used to namespace the merged columns, so the two p-value
/// columns come out as `P_uncond` and `P_cond`.
pub const UNCOND: &str = "uncond";
pub const COND: &str = "cond";

#[derive(Debug, Clone)]
pub struct DeltaConfig {
    pub epsilon: f64,
    pub p_policy: PValuePolicy,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        DeltaConfig {
            epsilon: 0.1,
            p_policy: PValuePolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeltaPipelineConfig {
    pub uncond: PathBuf,
    pub cond: PathBuf,
    pub output: PathBuf,
    pub delta: DeltaConfig,
    pub column_names: HashMap<String, String>,
    pub log_name: Option<String>,
}

/// Total over all finite deltas; ties at either boundary count as stable.
pub fn classify(delta: f64, epsilon: f64) -> DeltaCategory {
    if delta > epsilon {
        DeltaCategory::Increased
    } else if delta < -epsilon {
        DeltaCategory::Decreased
    } else {
        DeltaCategory::Stable
    }
}

/// Merges the two result sets and appends `LOGP_UNCOND`, `LOGP_COND`,
/// `DELTA` and `CATEGORY` columns. Pure apart from the policy counters.
pub fn delta_table(
    uncond: DataFrame,
    cond: DataFrame,
    config: &DeltaConfig,
) -> Result<(DataFrame, RunSummary)> {
    check_nonneg_f64(config.epsilon, "epsilon")?;
    require_column(&uncond, "P", UNCOND)?;
    require_column(&cond, "P", COND)?;

    let mut summary = RunSummary::default();
    let (uncond, s) = apply_p_policy(uncond, "P", config.p_policy, UNCOND)?;
    summary.absorb(s);
    let (cond, s) = apply_p_policy(cond, "P", config.p_policy, COND)?;
    summary.absorb(s);

    let sets = [
        NamedFrame {
            name: UNCOND.to_string(),
            df: uncond,
        },
        NamedFrame {
            name: COND.to_string(),
            df: cond,
        },
    ];
    let mut merged = merge_on_variant(&sets)?;

    merged = neg_log10_column(merged, "P_uncond", "LOGP_UNCOND")?;
    merged = neg_log10_column(merged, "P_cond", "LOGP_COND")?;

    let logp_u = merged
        .column("LOGP_UNCOND")?
        .as_series()
        .context("LOGP_UNCOND")?
        .f64()?;
    let logp_c = merged
        .column("LOGP_COND")?
        .as_series()
        .context("LOGP_COND")?
        .f64()?;

    let delta: Float64Chunked = logp_c
        .into_iter()
        .zip(logp_u)
        .map(|(c, u)| match (c, u) {
            (Some(c), Some(u)) => Some(c - u),
            _ => None,
        })
        .collect();
    let labels: Vec<Option<&str>> = delta
        .into_iter()
        .map(|v| v.map(|d| classify(d, config.epsilon).label()))
        .collect();

    let mut delta_series = delta.into_series();
    delta_series.rename("DELTA".into());
    merged.with_column(delta_series.into_column())?;

    let category = Series::new("CATEGORY".into(), labels);
    merged.with_column(category.into_column())?;

    Ok((merged, summary))
}

/// File-level pipeline behind `escore delta`: read both result sets, contrast
/// them, write the classified table and a run log.
pub fn delta(config: &DeltaPipelineConfig) -> Result<(DataFrame, RunSummary)> {
    check_file_exists(&config.uncond, "uncond")?;
    check_file_exists(&config.cond, "cond")?;

    let mut log = open_run_log(config.log_name.as_deref(), &[], "delta")?;
    log_line(
        &mut log,
        "Contrasting unconditional and conditional association results.",
        true,
    )?;

    let uncond = load_association(&config.uncond, &config.column_names, &mut log)?;
    log_line(
        &mut log,
        &format!(
            "{} variants read from {}",
            uncond.height(),
            config.uncond.display()
        ),
        true,
    )?;
    let cond = load_association(&config.cond, &config.column_names, &mut log)?;
    log_line(
        &mut log,
        &format!(
            "{} variants read from {}",
            cond.height(),
            config.cond.display()
        ),
        true,
    )?;

    let (table, summary) = delta_table(uncond, cond, &config.delta)?;
    log_line(
        &mut log,
        &format!("{} variants present in both result sets", table.height()),
        true,
    )?;
    log_summary(&mut log, &summary)?;

    write_table(&table, &config.output)?;
    log_line(
        &mut log,
        &format!("Delta table written to {}", config.output.display()),
        true,
    )?;

    Ok((table, summary))
}

fn load_association(
    file: &Path,
    column_names: &HashMap<String, String>,
    log: &mut File,
) -> Result<DataFrame> {
    let mut df = read_table(file)?;
    let headers: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let map = resolve_column_map(
        &headers,
        &ColumnMapConfig::association(column_names.clone(), file.display().to_string()),
    )?;
    for msg in &map.info {
        log_line(log, msg, false)?;
    }
    for msg in &map.warnings {
        log_line(log, msg, true)?;
    }
    df.set_column_names(&map.headers)?;
    df = ensure_utf8(df, &["SNP"])?;
    df = ensure_f64(df, &["P", "CHI2", "EFFECT", "N"])?;
    Ok(df)
}
