use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use polars::prelude::*;
use rayon::prelude::*;

use crate::df_utils::{apply_p_policy, ensure_f64, ensure_utf8};
use crate::error::EscoreError;
use crate::io::{read_table, write_table};
use crate::logging::{log_line, log_summary, open_run_log};
use crate::merge::{NamedFrame, check_unique_variants, merge_on_variant, merge_on_variant_full};
use crate::parallel::{collect_indexed, resolve_threads, run_in_pool};
use crate::qc::{check_equal_length, check_file_exists};
use crate::schema::{ColumnMapConfig, resolve_column_map};
use crate::types::{
    MissingTraitPolicy, PValuePolicy, RunSummary, TraitGroupStat, TraitWeight, WeightFallback,
};
use crate::weights::{group_stat, normalize_weights};

/// One tier of the aggregation: weights are normalized within a group, and
/// group contributions are summed into the composite score.
#[derive(Debug, Clone)]
pub struct TraitGroup {
    pub name: String,
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct EscoreConfig {
    pub groups: Vec<TraitGroup>,
    pub output: PathBuf,
    pub missing_policy: MissingTraitPolicy,
    pub weight_fallback: WeightFallback,
    pub p_policy: PValuePolicy,
    pub trait_names: Option<Vec<String>>,
    pub column_names: HashMap<String, String>,
    pub parallel: bool,
    pub cores: Option<usize>,
    pub log_name: Option<String>,
}

/// A loaded trait reduced to its join key and p-value, plus the weight its
/// group assigned to it.
#[derive(Debug, Clone)]
pub struct WeightedTrait {
    pub name: String,
    pub group_idx: usize,
    pub weight: f64,
    pub df: DataFrame,
}

struct LoadedTrait {
    name: String,
    group_idx: usize,
    df: DataFrame,
    stat: TraitGroupStat,
    summary: RunSummary,
}

/// Pipeline behind `escore score`: load every trait, derive inflation
/// weights per group, aggregate, write the scored table and a run log.
pub fn escore(config: &EscoreConfig) -> Result<(DataFrame, RunSummary)> {
    validate_config(config)?;

    let names = resolve_trait_names(config)?;
    let mut log = open_run_log(config.log_name.as_deref(), &names, "escore")?;
    log_line(
        &mut log,
        &format!(
            "Computing composite E-scores over {} trait(s) in {} group(s).",
            names.len(),
            config.groups.len()
        ),
        true,
    )?;

    let mut summary = RunSummary::default();
    let loaded = if config.parallel {
        log_line(
            &mut log,
            "As parallel loading was requested, logs of each trait will be saved separately.",
            true,
        )?;
        load_parallel(config, &names)?
    } else {
        load_sequential(config, &names, &mut log)?
    };
    for t in &loaded {
        summary.absorb(t.summary);
    }

    let weighted = assign_weights(config, &loaded, &mut summary, &mut log)?;
    let (table, score_summary) = escore_table(&weighted, config.missing_policy)?;
    summary.absorb(score_summary);

    log_line(
        &mut log,
        &format!("{} variant(s) scored", table.height()),
        true,
    )?;
    log_summary(&mut log, &summary)?;

    write_table(&table, &config.output)?;
    log_line(
        &mut log,
        &format!("E-score table written to {}", config.output.display()),
        true,
    )?;

    Ok((table, summary))
}

/// Aggregates already-weighted traits into one `SNP`/`E_SCORE` row per
/// variant admitted by the missing-trait policy, sorted by descending score.
pub fn escore_table(
    traits: &[WeightedTrait],
    missing_policy: MissingTraitPolicy,
) -> Result<(DataFrame, RunSummary)> {
    if traits.is_empty() {
        return Err(EscoreError::InvalidArgument("no traits to aggregate".to_string()).into());
    }
    let mut summary = RunSummary::default();

    let sets: Vec<NamedFrame> = traits
        .iter()
        .map(|t| NamedFrame {
            name: t.name.clone(),
            df: t.df.clone(),
        })
        .collect();
    let merged = match missing_policy {
        MissingTraitPolicy::Intersect => merge_on_variant(&sets)?,
        MissingTraitPolicy::Renormalize | MissingTraitPolicy::Fail => {
            merge_on_variant_full(&sets)?
        }
    };

    let group_count = traits.iter().map(|t| t.group_idx).max().unwrap_or(0) + 1;
    let mut handles: Vec<(usize, f64, Float64Chunked)> = Vec::with_capacity(traits.len());
    for t in traits {
        let ca = merged
            .column(&format!("P_{}", t.name))?
            .as_series()
            .context("merged p-value column")?
            .f64()?
            .clone();
        handles.push((t.group_idx, t.weight, ca));
    }
    let snp = merged.column("SNP")?.as_series().context("SNP")?.clone();

    let height = merged.height();
    let mut scores = Vec::with_capacity(height);
    for i in 0..height {
        let mut total = 0.0;
        let mut row_renormalized = false;
        for g in 0..group_count {
            let mut present_weight = 0.0;
            let mut contrib = 0.0;
            let mut group_missing = false;
            for (gi, w, ca) in &handles {
                if *gi != g {
                    continue;
                }
                match ca.get(i) {
                    Some(p) => {
                        present_weight += w;
                        contrib += w * -p.log10();
                    }
                    None => group_missing = true,
                }
            }
            if group_missing {
                match missing_policy {
                    MissingTraitPolicy::Fail => {
                        let id = snp.str()?.get(i).unwrap_or("<unknown>").to_string();
                        return Err(EscoreError::InvalidArgument(format!(
                            "variant {id} is missing a p-value for one or more traits"
                        ))
                        .into());
                    }
                    MissingTraitPolicy::Renormalize => {
                        if present_weight > 0.0 {
                            contrib /= present_weight;
                            row_renormalized = true;
                        }
                    }
                    MissingTraitPolicy::Intersect => {
                        // unreachable after an inner join; keep the row out
                        contrib = 0.0;
                    }
                }
            }
            total += contrib;
        }
        if row_renormalized {
            summary.renormalized += 1;
        }
        scores.push(total);
    }

    let escore_series = Series::new("E_SCORE".into(), scores);
    let out = DataFrame::new_with_height(height, vec![snp.into(), escore_series.into()])?;
    let out = out.sort(
        ["E_SCORE"],
        SortMultipleOptions::default().with_order_descending(true),
    )?;
    Ok((out, summary))
}

fn validate_config(config: &EscoreConfig) -> Result<()> {
    if config.groups.is_empty() {
        return Err(
            EscoreError::InvalidArgument("no input summary statistics given".to_string()).into(),
        );
    }
    for group in &config.groups {
        if group.files.is_empty() {
            return Err(EscoreError::InvalidArgument(format!(
                "Trait group {} has no input files",
                group.name
            ))
            .into());
        }
    }
    let total: usize = config.groups.iter().map(|g| g.files.len()).sum();
    if let Some(names) = &config.trait_names {
        check_equal_length(total, names.len(), "files", "trait.names")?;
    }
    for group in &config.groups {
        for file in &group.files {
            check_file_exists(file, "input")?;
        }
    }
    Ok(())
}

fn resolve_trait_names(config: &EscoreConfig) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut flat_idx = 0usize;
    for group in &config.groups {
        for file in &group.files {
            let name = if let Some(given) = &config.trait_names {
                given[flat_idx].clone()
            } else {
                file.file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("trait")
                    .to_string()
            };
            names.push(name);
            flat_idx += 1;
        }
    }

    let mut seen = HashSet::new();
    for name in &names {
        if !seen.insert(name.clone()) {
            return Err(EscoreError::InvalidArgument(format!(
                "Trait name {name} appears more than once; trait names must be unique"
            ))
            .into());
        }
    }
    Ok(names)
}

fn load_sequential(
    config: &EscoreConfig,
    names: &[String],
    log: &mut File,
) -> Result<Vec<LoadedTrait>> {
    let mut loaded = Vec::new();
    let mut flat_idx = 0usize;
    for (group_idx, group) in config.groups.iter().enumerate() {
        for file in &group.files {
            loaded.push(load_trait(
                config,
                &names[flat_idx],
                group_idx,
                file,
                log,
            )?);
            flat_idx += 1;
        }
    }
    Ok(loaded)
}

fn load_parallel(config: &EscoreConfig, names: &[String]) -> Result<Vec<LoadedTrait>> {
    let mut tasks: Vec<(usize, usize, PathBuf)> = Vec::new();
    let mut flat_idx = 0usize;
    for (group_idx, group) in config.groups.iter().enumerate() {
        for file in &group.files {
            tasks.push((flat_idx, group_idx, file.clone()));
            flat_idx += 1;
        }
    }

    let threads = resolve_threads(config.cores, tasks.len());
    let run = || {
        tasks
            .par_iter()
            .map(|(idx, group_idx, file)| {
                let mut log = open_trait_log(&names[*idx])?;
                let trait_data =
                    load_trait(config, &names[*idx], *group_idx, file, &mut log)?;
                Ok((*idx, trait_data))
            })
            .collect::<Vec<Result<(usize, LoadedTrait)>>>()
    };

    let results = run_in_pool(threads, "build escore thread pool", run)?;
    collect_indexed(results)
}

fn open_trait_log(trait_name: &str) -> Result<File> {
    let mut name = trait_name.replace('/', "");
    if name.is_empty() {
        name = "trait".to_string();
    }
    let path = format!("{name}_escore.log");
    Ok(File::create(path)?)
}

fn load_trait(
    config: &EscoreConfig,
    trait_name: &str,
    group_idx: usize,
    file: &Path,
    log: &mut File,
) -> Result<LoadedTrait> {
    log_line(
        log,
        &format!("Loading summary statistics for {}", file.display()),
        true,
    )?;

    let mut df = read_table(file)?;
    let headers: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let map = resolve_column_map(
        &headers,
        &ColumnMapConfig::association(config.column_names.clone(), file.display().to_string()),
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

    let (df, summary) = apply_p_policy(df, "P", config.p_policy, trait_name)?;
    if summary.skipped > 0 {
        log_line(
            log,
            &format!(
                "{} row(s) removed from {} due to missing or out-of-range p-values",
                summary.skipped,
                file.display()
            ),
            true,
        )?;
    }
    check_unique_variants(&df, trait_name)?;

    let stat = group_stat(trait_name, &df)?;
    log_line(
        log,
        &format!(
            "{trait_name}: mean chi-square {:.4}, inflation above null {:.4}",
            stat.mean_chi2,
            (stat.mean_chi2 - 1.0).max(0.0)
        ),
        true,
    )?;

    let df = df.select(["SNP", "P"])?;
    Ok(LoadedTrait {
        name: trait_name.to_string(),
        group_idx,
        df,
        stat,
        summary,
    })
}

/// Normalizes weights within each group and attaches them to the loaded
/// traits. The full weight set is fixed here, before any scoring starts.
fn assign_weights(
    config: &EscoreConfig,
    loaded: &[LoadedTrait],
    summary: &mut RunSummary,
    log: &mut File,
) -> Result<Vec<WeightedTrait>> {
    let mut weighted = Vec::with_capacity(loaded.len());
    for (group_idx, group) in config.groups.iter().enumerate() {
        let stats: Vec<TraitGroupStat> = loaded
            .iter()
            .filter(|t| t.group_idx == group_idx)
            .map(|t| t.stat.clone())
            .collect();
        let (weights, degenerate) = normalize_weights(&stats, config.weight_fallback);
        if degenerate {
            summary.degenerate_groups += 1;
            log_line(
                log,
                &format!(
                    "No trait in group {} shows inflation above the null; applying the {} fallback.",
                    group.name,
                    match config.weight_fallback {
                        WeightFallback::Uniform => "uniform-weight",
                        WeightFallback::Zero => "zero-weight",
                    }
                ),
                true,
            )?;
        }
        let by_name: HashMap<&str, f64> = weights
            .iter()
            .map(|w: &TraitWeight| (w.trait_id.as_str(), w.weight))
            .collect();
        for t in loaded.iter().filter(|t| t.group_idx == group_idx) {
            let weight = by_name.get(t.name.as_str()).copied().unwrap_or(0.0);
            log_line(
                log,
                &format!("{}: weight {:.4} within group {}", t.name, weight, group.name),
                true,
            )?;
            weighted.push(WeightedTrait {
                name: t.name.clone(),
                group_idx,
                weight,
                df: t.df.clone(),
            });
        }
    }
    Ok(weighted)
}
