use std::fs::File;
use std::io::Write;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub fn log_line(log: &mut File, message: &str, print: bool) -> Result<()> {
    if print {
        info!("{message}");
    }
    writeln!(log, "{message}")?;
    Ok(())
}

pub fn warn_line(log: &mut File, message: &str) -> Result<()> {
    warn!("{message}");
    writeln!(log, "{message}")?;
    Ok(())
}

/// Run log named `{base}_{suffix}.log` where `base` is the user-provided log
/// name, else the joined trait names, else the suffix itself.
pub fn open_run_log(log_name: Option<&str>, trait_names: &[String], suffix: &str) -> Result<File> {
    let base = if let Some(name) = log_name {
        name.to_string()
    } else if !trait_names.is_empty() {
        let mut joined = trait_names.join("_");
        joined = joined.replace('/', "");
        if joined.len() > 200 {
            joined.truncate(100);
        }
        if joined.is_empty() {
            suffix.to_string()
        } else {
            joined
        }
    } else {
        suffix.to_string()
    };
    let path = format!("{base}_{suffix}.log");
    let file = File::create(path)?;
    Ok(file)
}

/// Every policy branch taken during a run ends up in the log, so floored or
/// skipped records stay visible to the caller.
pub fn log_summary(log: &mut File, summary: &crate::types::RunSummary) -> Result<()> {
    if summary.floored > 0 {
        log_line(
            log,
            &format!(
                "{} p-value(s) were raised to the configured floor before the log transform",
                summary.floored
            ),
            true,
        )?;
    }
    if summary.skipped > 0 {
        log_line(
            log,
            &format!(
                "{} row(s) were skipped due to missing or out-of-range p-values",
                summary.skipped
            ),
            true,
        )?;
    }
    if summary.renormalized > 0 {
        log_line(
            log,
            &format!(
                "{} variant(s) were scored with renormalized weights due to missing traits",
                summary.renormalized
            ),
            true,
        )?;
    }
    if summary.degenerate_groups > 0 {
        log_line(
            log,
            &format!(
                "{} trait group(s) showed no inflation above the null; fallback weights were used",
                summary.degenerate_groups
            ),
            true,
        )?;
    }
    if summary.is_clean() {
        log_line(log, "No records required policy intervention.", true)?;
    }
    Ok(())
}
