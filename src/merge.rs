use anyhow::{Context, Result};
use polars::prelude::*;

use crate::error::EscoreError;

/// One association result set with the name that namespaces its columns
/// after merging.
#[derive(Debug, Clone)]
pub struct NamedFrame {
    pub name: String,
    pub df: DataFrame,
}

pub fn require_column(df: &DataFrame, column: &str, input: &str) -> Result<()> {
    if df.column(column).is_err() {
        return Err(EscoreError::MissingColumn {
            input: input.to_string(),
            column: column.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Duplicated variant ids make a join ambiguous, so they abort the run.
pub fn check_unique_variants(df: &DataFrame, input: &str) -> Result<()> {
    require_column(df, "SNP", input)?;
    let snp = df.column("SNP")?.as_series().context("SNP")?;
    let unique = snp.n_unique()?;
    if unique < df.height() {
        return Err(EscoreError::DuplicateVariant {
            input: input.to_string(),
            count: df.height() - unique,
        }
        .into());
    }
    Ok(())
}

fn suffix_columns(mut df: DataFrame, name: &str) -> Result<DataFrame> {
    let cols: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    for col in cols {
        if col != "SNP" {
            df.rename(&col, format!("{col}_{name}").into())?;
        }
    }
    Ok(df)
}

/// Inner-joins the named result sets on the variant id, left to right. Every
/// non-key column comes out as `{column}_{set name}`, so same-named fields
/// from different sets never collide.
pub fn merge_on_variant(sets: &[NamedFrame]) -> Result<DataFrame> {
    let mut iter = sets.iter();
    let first = iter
        .next()
        .ok_or_else(|| EscoreError::InvalidArgument("no result sets to merge".to_string()))?;

    check_unique_variants(&first.df, &first.name)?;
    let mut merged = suffix_columns(first.df.clone(), &first.name)?;

    for set in iter {
        check_unique_variants(&set.df, &set.name)?;
        let right = suffix_columns(set.df.clone(), &set.name)?;
        merged = merged.join(&right, ["SNP"], ["SNP"], JoinType::Inner.into(), None)?;
    }

    Ok(merged)
}

/// Full outer join on the variant id, used when a missing-trait policy keeps
/// variants that some sets lack. Absent fields stay null.
pub fn merge_on_variant_full(sets: &[NamedFrame]) -> Result<DataFrame> {
    let mut iter = sets.iter();
    let first = iter
        .next()
        .ok_or_else(|| EscoreError::InvalidArgument("no result sets to merge".to_string()))?;

    check_unique_variants(&first.df, &first.name)?;
    let mut merged = suffix_columns(first.df.clone(), &first.name)?;

    for set in iter {
        check_unique_variants(&set.df, &set.name)?;
        let right = suffix_columns(set.df.clone(), &set.name)?;
        let args = JoinArgs::new(JoinType::Full).with_coalesce(JoinCoalesce::CoalesceColumns);
        merged = merged.join(&right, ["SNP"], ["SNP"], args, None)?;
    }

    Ok(merged)
}
