use std::collections::{HashMap, HashSet};

use crate::error::{EscoreError, Result};

#[derive(Debug, Clone)]
pub struct ColumnMap {
    pub headers: Vec<String>,
    pub warnings: Vec<String>,
    pub info: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ColumnMapConfig {
    pub userprovided: HashMap<String, String>,
    pub stop_on_missing: Vec<String>,
    pub warn_for_missing: Vec<String>,
    pub filename: Option<String>,
}

impl ColumnMapConfig {
    /// Association result sets must expose the join key and a p-value.
    pub fn association(userprovided: HashMap<String, String>, filename: String) -> Self {
        ColumnMapConfig {
            userprovided,
            stop_on_missing: vec!["SNP".into(), "P".into()],
            warn_for_missing: Vec::new(),
            filename: Some(filename),
        }
    }
}

pub fn normalize_headers(headers: &[String]) -> Vec<String> {
    headers
        .iter()
        .map(|h| h.trim().to_ascii_uppercase())
        .collect()
}

pub fn resolve_column_map(headers: &[String], config: &ColumnMapConfig) -> Result<ColumnMap> {
    let mut warnings = Vec::new();
    let mut info = Vec::new();

    let mut headers = normalize_headers(headers);

    let filename = config
        .filename
        .clone()
        .unwrap_or_else(|| "<unknown>".to_string());

    let mut synonyms: HashMap<&'static str, Vec<&'static str>> = HashMap::new();
    synonyms.insert(
        "SNP",
        vec![
            "SNP",
            "SNPID",
            "RSID",
            "RS_NUMBER",
            "RS_NUMBERS",
            "MARKERNAME",
            "ID",
            "SNP_ID",
            "VARIANTID",
            "VARIANT_ID",
            "RSIDS",
            "RS_ID",
        ],
    );
    synonyms.insert(
        "P",
        vec![
            "P",
            "PVALUE",
            "PVAL",
            "P_VALUE",
            "P-VALUE",
            "P.VALUE",
            "P_VAL",
            "P_LRT",
            "P_WALD",
            "P_SCORE",
            "GC_PVALUE",
        ],
    );
    synonyms.insert(
        "CHI2",
        vec!["CHI2", "CHISQ", "CHI_SQUARE", "CHI2_STAT", "X2"],
    );
    synonyms.insert(
        "EFFECT",
        vec![
            "OR",
            "B",
            "BETA",
            "LOG_ODDS",
            "EFFECTS",
            "EFFECT",
            "SIGNED_SUMSTAT",
            "EST",
            "BETA1",
            "LOGOR",
        ],
    );
    synonyms.insert(
        "N",
        vec![
            "N",
            "NCOMPLETESAMPLES",
            "TOTALSAMPLESIZE",
            "TOTALN",
            "TOTAL_N",
            "N_COMPLETE_SAMPLES",
            "SAMPLESIZE",
        ],
    );

    let full_names: HashMap<&'static str, &'static str> = [
        ("P", "P-value"),
        ("SNP", "variant id"),
        ("CHI2", "chi-square statistic"),
        ("EFFECT", "beta or effect"),
        ("N", "sample size"),
    ]
    .into_iter()
    .collect();

    let mut stop_on_missing = HashSet::new();
    for col in &config.stop_on_missing {
        stop_on_missing.insert(col.to_ascii_uppercase());
    }

    let mut warn_for_missing = HashSet::new();
    for col in &config.warn_for_missing {
        warn_for_missing.insert(col.to_ascii_uppercase());
    }

    let mut user_map: HashMap<String, String> = HashMap::new();
    for (k, v) in &config.userprovided {
        user_map.insert(k.to_ascii_uppercase(), v.to_ascii_uppercase());
    }

    for (canonical, syns) in synonyms.iter() {
        if let Some(user_col) = user_map.get(*canonical) {
            let mut matched = false;
            for h in headers.iter_mut() {
                if h == user_col {
                    *h = canonical.to_string();
                    matched = true;
                }
            }
            if matched {
                info.push(format!(
                    "Interpreting the {user_col} column as the {canonical} column, as requested."
                ));
                continue;
            }
            if stop_on_missing.contains(*canonical) {
                return Err(EscoreError::MissingColumn {
                    input: filename,
                    column: user_col.clone(),
                });
            }
            warnings.push(format!(
                "Requested column {user_col} not found in {filename}."
            ));
            continue;
        }

        if headers.iter().any(|h| h == *canonical) {
            info.push(format!(
                "Interpreting the {canonical} column as the {canonical} column."
            ));
        } else {
            let mut matched = false;
            for h in headers.iter_mut() {
                if syns.contains(&h.as_str()) {
                    *h = canonical.to_string();
                    matched = true;
                }
            }
            if matched {
                info.push(format!("Interpreting a synonym as the {canonical} column."));
            } else if stop_on_missing.contains(*canonical) {
                return Err(EscoreError::MissingColumn {
                    input: filename,
                    column: canonical.to_string(),
                });
            } else if warn_for_missing.contains(*canonical) {
                if let Some(full) = full_names.get(*canonical) {
                    warnings.push(format!(
                        "Cannot find a {full} column in {filename}; it will be derived where needed."
                    ));
                } else {
                    warnings.push(format!("Cannot find {canonical} column in {filename}."));
                }
            }
        }

        let count = headers.iter().filter(|h| h.as_str() == *canonical).count();
        if count > 1 {
            warnings.push(format!(
                "Multiple columns interpreted as {canonical} in {filename}; keeping the first and renaming the rest {canonical}2, {canonical}3, ..."
            ));
            let mut seen = 0usize;
            for h in headers.iter_mut() {
                if h.as_str() == *canonical {
                    seen += 1;
                    if seen > 1 {
                        *h = format!("{canonical}{seen}");
                    }
                }
            }
        }
    }

    Ok(ColumnMap {
        headers,
        warnings,
        info,
    })
}
