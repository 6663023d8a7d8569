use polars::prelude::*;

use escore::delta::{DeltaConfig, DeltaPipelineConfig, classify, delta, delta_table};
use escore::merge::{NamedFrame, merge_on_variant};
use escore::types::{DeltaCategory, PValuePolicy};

fn assoc(snps: &[&str], pvals: &[f64]) -> DataFrame {
    df!("SNP" => snps, "P" => pvals).expect("build frame")
}

fn f64_col(frame: &DataFrame, name: &str) -> Vec<f64> {
    frame
        .column(name)
        .expect("column")
        .as_series()
        .expect("series")
        .f64()
        .expect("f64")
        .into_iter()
        .map(|v| v.expect("value"))
        .collect()
}

fn categories(frame: &DataFrame) -> Vec<String> {
    frame
        .column("CATEGORY")
        .expect("CATEGORY")
        .as_series()
        .expect("series")
        .str()
        .expect("str")
        .into_iter()
        .map(|v| v.expect("label").to_string())
        .collect()
}

#[test]
fn classification_is_total_and_boundaries_are_stable() {
    let eps = 0.1;
    assert_eq!(classify(0.2, eps), DeltaCategory::Increased);
    assert_eq!(classify(-0.2, eps), DeltaCategory::Decreased);
    assert_eq!(classify(0.0, eps), DeltaCategory::Stable);
    // ties at exactly +/- epsilon are excluded from both strict branches
    assert_eq!(classify(eps, eps), DeltaCategory::Stable);
    assert_eq!(classify(-eps, eps), DeltaCategory::Stable);
    assert_eq!(classify(eps + 1e-12, eps), DeltaCategory::Increased);
    assert_eq!(classify(-eps - 1e-12, eps), DeltaCategory::Decreased);
    // zero threshold leaves only an exact tie stable
    assert_eq!(classify(0.0, 0.0), DeltaCategory::Stable);
    assert_eq!(classify(1e-15, 0.0), DeltaCategory::Increased);
}

#[test]
fn significance_increase_is_detected() {
    let uncond = assoc(&["rsX"], &[1e-3]);
    let cond = assoc(&["rsX"], &[1e-8]);
    let (table, summary) =
        delta_table(uncond, cond, &DeltaConfig::default()).expect("delta table");

    assert_eq!(table.height(), 1);
    assert!((f64_col(&table, "LOGP_UNCOND")[0] - 3.0).abs() < 1e-10);
    assert!((f64_col(&table, "LOGP_COND")[0] - 8.0).abs() < 1e-10);
    assert!((f64_col(&table, "DELTA")[0] - 5.0).abs() < 1e-10);
    assert_eq!(
        categories(&table),
        vec!["growth-specific / significance increased".to_string()]
    );
    assert!(summary.is_clean());
}

#[test]
fn significance_decrease_is_detected() {
    let uncond = assoc(&["rsX"], &[1e-8]);
    let cond = assoc(&["rsX"], &[1e-3]);
    let (table, _) = delta_table(uncond, cond, &DeltaConfig::default()).expect("delta table");

    assert!((f64_col(&table, "DELTA")[0] + 5.0).abs() < 1e-10);
    assert_eq!(
        categories(&table),
        vec!["confounded / significance decreased".to_string()]
    );
}

#[test]
fn small_shift_stays_stable() {
    let uncond = assoc(&["rsX"], &[1e-5]);
    let cond = assoc(&["rsX"], &[1.2e-5]);
    let (table, _) = delta_table(uncond, cond, &DeltaConfig::default()).expect("delta table");

    let delta = f64_col(&table, "DELTA")[0];
    assert!(delta.abs() < 0.1);
    assert!((delta.abs() - 0.0791812460476248).abs() < 1e-10);
    assert_eq!(categories(&table), vec!["stable".to_string()]);
}

#[test]
fn contrasting_a_run_against_itself_is_stable_everywhere() {
    let pvals = [1e-8, 1e-4, 0.03, 0.5, 1.0];
    let snps = ["rs1", "rs2", "rs3", "rs4", "rs5"];
    let (table, _) = delta_table(
        assoc(&snps, &pvals),
        assoc(&snps, &pvals),
        &DeltaConfig::default(),
    )
    .expect("delta table");

    assert_eq!(table.height(), 5);
    for delta in f64_col(&table, "DELTA") {
        assert_eq!(delta, 0.0);
    }
    for label in categories(&table) {
        assert_eq!(label, "stable");
    }
}

#[test]
fn p_of_one_maps_to_zero_log() {
    let (table, _) = delta_table(
        assoc(&["rs1"], &[1.0]),
        assoc(&["rs1"], &[1.0]),
        &DeltaConfig::default(),
    )
    .expect("delta table");
    assert_eq!(f64_col(&table, "LOGP_UNCOND")[0], 0.0);
    assert_eq!(f64_col(&table, "LOGP_COND")[0], 0.0);
}

#[test]
fn merge_keeps_only_the_intersection() {
    let left = assoc(&["rs1", "rs2", "rs3"], &[0.1, 0.2, 0.3]);
    let right = assoc(&["rs2", "rs3", "rs4"], &[0.4, 0.5, 0.6]);
    let sets = [
        NamedFrame {
            name: "uncond".to_string(),
            df: left,
        },
        NamedFrame {
            name: "cond".to_string(),
            df: right,
        },
    ];
    let merged = merge_on_variant(&sets).expect("merge");

    assert_eq!(merged.height(), 2);
    let snps: Vec<String> = merged
        .column("SNP")
        .expect("SNP")
        .as_series()
        .expect("series")
        .str()
        .expect("str")
        .into_iter()
        .map(|v| v.expect("id").to_string())
        .collect();
    assert!(snps.contains(&"rs2".to_string()));
    assert!(snps.contains(&"rs3".to_string()));
    // each source's fields live under its own suffix
    assert!(merged.column("P_uncond").is_ok());
    assert!(merged.column("P_cond").is_ok());
}

#[test]
fn duplicate_variant_ids_abort_the_merge() {
    let left = assoc(&["rs1", "rs1"], &[0.1, 0.2]);
    let right = assoc(&["rs1"], &[0.3]);
    let err = delta_table(left, right, &DeltaConfig::default())
        .expect_err("duplicates must fail");
    assert!(err.to_string().contains("duplicated variant id"));
    assert!(err.to_string().contains("uncond"));
}

#[test]
fn missing_p_column_aborts_the_run() {
    let uncond = df!("SNP" => ["rs1"], "BETA" => [0.3]).expect("build frame");
    let cond = assoc(&["rs1"], &[0.5]);
    let err = delta_table(uncond, cond, &DeltaConfig::default())
        .expect_err("missing P must fail");
    assert!(err.to_string().contains("missing column P"));
}

#[test]
fn zero_p_is_floored_and_counted() {
    let uncond = assoc(&["rs1", "rs2"], &[0.0, 0.5]);
    let cond = assoc(&["rs1", "rs2"], &[1e-4, 0.5]);
    let (table, summary) =
        delta_table(uncond, cond, &DeltaConfig::default()).expect("delta table");

    assert_eq!(summary.floored, 1);
    let logp = f64_col(&table, "LOGP_UNCOND");
    let floored = logp.iter().cloned().fold(f64::MIN, f64::max);
    assert!((floored - 300.0).abs() < 1e-9);
}

#[test]
fn zero_p_is_fatal_under_reject() {
    let config = DeltaConfig {
        epsilon: 0.1,
        p_policy: PValuePolicy::Reject,
    };
    let err = delta_table(
        assoc(&["rs1"], &[0.0]),
        assoc(&["rs1"], &[0.5]),
        &config,
    )
    .expect_err("reject policy must fail on p = 0");
    assert!(err.to_string().contains("invalid p-value"));
}

#[test]
fn out_of_range_rows_are_dropped_and_counted_under_skip() {
    let config = DeltaConfig {
        epsilon: 0.1,
        p_policy: PValuePolicy::Skip,
    };
    let uncond = assoc(&["rs1", "rs2", "rs3"], &[0.0, 0.5, 1.5]);
    let cond = assoc(&["rs1", "rs2", "rs3"], &[0.1, 0.5, 0.9]);
    let (table, summary) = delta_table(uncond, cond, &config).expect("delta table");

    assert_eq!(table.height(), 1);
    assert_eq!(summary.skipped, 2);
}

#[test]
fn negative_epsilon_is_rejected() {
    let config = DeltaConfig {
        epsilon: -0.1,
        p_policy: PValuePolicy::default(),
    };
    let err = delta_table(
        assoc(&["rs1"], &[0.5]),
        assoc(&["rs1"], &[0.5]),
        &config,
    )
    .expect_err("negative epsilon must fail");
    assert!(err.to_string().contains("epsilon"));
}

#[test]
fn delta_pipeline_round_trips_through_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let uncond_path = dir.path().join("uncond.tsv");
    let cond_path = dir.path().join("cond.tsv");
    let out_path = dir.path().join("delta.tsv");

    std::fs::write(&uncond_path, "SNP\tP\nrs1\t0.001\nrs2\t0.5\n").expect("write uncond");
    std::fs::write(&cond_path, "SNP\tP\nrs1\t1e-8\nrs2\t0.5\n").expect("write cond");

    let config = DeltaPipelineConfig {
        uncond: uncond_path,
        cond: cond_path,
        output: out_path.clone(),
        delta: DeltaConfig::default(),
        column_names: Default::default(),
        log_name: Some(dir.path().join("run").to_string_lossy().to_string()),
    };
    let (table, summary) = delta(&config).expect("delta pipeline");

    assert_eq!(table.height(), 2);
    assert!(summary.is_clean());
    let written = escore::io::read_table(&out_path).expect("read output");
    assert_eq!(written.height(), 2);
    assert!(written.column("CATEGORY").is_ok());
    assert!(written.column("DELTA").is_ok());
}
