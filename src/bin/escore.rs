use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use escore::delta::{DeltaConfig, DeltaPipelineConfig, delta};
use escore::escore::{EscoreConfig, TraitGroup, escore};
use escore::logging::init_tracing;
use escore::types::{DEFAULT_P_FLOOR, MissingTraitPolicy, PValuePolicy, WeightFallback};

#[derive(Parser)]
#[command(name = "escore")]
#[command(about = "Conditional-GWAS delta and inflation-weighted E-score integration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Contrast an unconditional against a conditional association run.
    Delta {
        #[arg(long, required = true)]
        uncond: PathBuf,
        #[arg(long, required = true)]
        cond: PathBuf,
        #[arg(long, required = true)]
        output: PathBuf,
        #[arg(long, default_value_t = 0.1)]
        epsilon: f64,
        #[arg(long)]
        min_p_floor: Option<f64>,
        #[arg(long)]
        reject_invalid_p: bool,
        #[arg(long)]
        skip_invalid_p: bool,
        #[arg(long)]
        snp_col: Option<String>,
        #[arg(long)]
        p_col: Option<String>,
        #[arg(long)]
        log_name: Option<String>,
    },
    /// Aggregate inflation-weighted composite E-scores across traits.
    Score {
        /// Input summary statistics forming a single trait group.
        #[arg(long)]
        input: Vec<PathBuf>,
        /// Named trait group as NAME:file1,file2,... (repeatable).
        #[arg(long)]
        group: Vec<String>,
        #[arg(long, required = true)]
        output: PathBuf,
        #[arg(long, default_value = "intersect")]
        missing_policy: String,
        #[arg(long, default_value = "uniform")]
        weight_fallback: String,
        #[arg(long)]
        min_p_floor: Option<f64>,
        #[arg(long)]
        reject_invalid_p: bool,
        #[arg(long)]
        skip_invalid_p: bool,
        #[arg(long)]
        trait_names: Option<String>,
        #[arg(long)]
        parallel: bool,
        #[arg(long)]
        cores: Option<usize>,
        #[arg(long)]
        snp_col: Option<String>,
        #[arg(long)]
        p_col: Option<String>,
        #[arg(long)]
        log_name: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Delta {
            uncond,
            cond,
            output,
            epsilon,
            min_p_floor,
            reject_invalid_p,
            skip_invalid_p,
            snp_col,
            p_col,
            log_name,
        } => {
            let config = DeltaPipelineConfig {
                uncond,
                cond,
                output,
                delta: DeltaConfig {
                    epsilon,
                    p_policy: resolve_p_policy(min_p_floor, reject_invalid_p, skip_invalid_p)?,
                },
                column_names: column_overrides(snp_col, p_col),
                log_name,
            };
            delta(&config)?;
        }
        Command::Score {
            input,
            group,
            output,
            missing_policy,
            weight_fallback,
            min_p_floor,
            reject_invalid_p,
            skip_invalid_p,
            trait_names,
            parallel,
            cores,
            snp_col,
            p_col,
            log_name,
        } => {
            let groups = resolve_groups(input, &group)?;
            let config = EscoreConfig {
                groups,
                output,
                missing_policy: parse_missing_policy(&missing_policy)?,
                weight_fallback: parse_weight_fallback(&weight_fallback)?,
                p_policy: resolve_p_policy(min_p_floor, reject_invalid_p, skip_invalid_p)?,
                trait_names: trait_names.map(|s| parse_name_list(&s)),
                column_names: column_overrides(snp_col, p_col),
                parallel,
                cores,
                log_name,
            };
            escore(&config)?;
        }
    }

    Ok(())
}

fn resolve_p_policy(
    min_p_floor: Option<f64>,
    reject: bool,
    skip: bool,
) -> anyhow::Result<PValuePolicy> {
    match (min_p_floor, reject, skip) {
        (Some(_), true, _) | (Some(_), _, true) | (None, true, true) => Err(anyhow::anyhow!(
            "--min-p-floor, --reject-invalid-p and --skip-invalid-p are mutually exclusive"
        )),
        (Some(floor), false, false) => Ok(PValuePolicy::Floor(floor)),
        (None, true, false) => Ok(PValuePolicy::Reject),
        (None, false, true) => Ok(PValuePolicy::Skip),
        (None, false, false) => Ok(PValuePolicy::Floor(DEFAULT_P_FLOOR)),
    }
}

fn parse_missing_policy(value: &str) -> anyhow::Result<MissingTraitPolicy> {
    match value.to_ascii_lowercase().as_str() {
        "intersect" => Ok(MissingTraitPolicy::Intersect),
        "renormalize" => Ok(MissingTraitPolicy::Renormalize),
        "fail" => Ok(MissingTraitPolicy::Fail),
        other => Err(anyhow::anyhow!(
            "unknown missing-trait policy {other}; expected intersect, renormalize or fail"
        )),
    }
}

fn parse_weight_fallback(value: &str) -> anyhow::Result<WeightFallback> {
    match value.to_ascii_lowercase().as_str() {
        "uniform" => Ok(WeightFallback::Uniform),
        "zero" => Ok(WeightFallback::Zero),
        other => Err(anyhow::anyhow!(
            "unknown weight fallback {other}; expected uniform or zero"
        )),
    }
}

fn parse_name_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn column_overrides(snp_col: Option<String>, p_col: Option<String>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    if let Some(col) = snp_col {
        map.insert("SNP".to_string(), col);
    }
    if let Some(col) = p_col {
        map.insert("P".to_string(), col);
    }
    map
}

/// A flat `--input` list forms one anonymous group; `--group NAME:a,b` flags
/// give the two-tier form. Mixing the two is rejected.
fn resolve_groups(input: Vec<PathBuf>, group_specs: &[String]) -> anyhow::Result<Vec<TraitGroup>> {
    if !input.is_empty() && !group_specs.is_empty() {
        return Err(anyhow::anyhow!(
            "use either --input or --group, not both"
        ));
    }
    if !input.is_empty() {
        return Ok(vec![TraitGroup {
            name: "all".to_string(),
            files: input,
        }]);
    }

    let mut groups = Vec::new();
    for spec in group_specs {
        let (name, files) = spec
            .split_once(':')
            .with_context(|| format!("group {spec} is not of the form NAME:file1,file2"))?;
        let files: Vec<PathBuf> = files
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect();
        if name.trim().is_empty() || files.is_empty() {
            return Err(anyhow::anyhow!(
                "group {spec} is not of the form NAME:file1,file2"
            ));
        }
        groups.push(TraitGroup {
            name: name.trim().to_string(),
            files,
        });
    }
    if groups.is_empty() {
        return Err(anyhow::anyhow!("no input summary statistics given"));
    }
    Ok(groups)
}
