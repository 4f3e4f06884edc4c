use ipsw_late::{IpswBuilder, IpswError};
use polars::prelude::*;

fn card_sample() -> DataFrame {
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some("tests/data/card_synthetic.csv".into()))
        .unwrap()
        .finish()
        .unwrap()
}

#[test]
fn test_rows_with_nulls_are_dropped() -> Result<(), Box<dyn std::error::Error>> {
    let df = df!(
        "y" => &[Some(1.0), Some(2.0), None, Some(1.5), Some(3.0), Some(2.5), Some(0.5), Some(2.2)],
        "d" => &[0.0, 1.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0],
        "z" => &[0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0],
        "x" => &[Some(0.3), Some(0.1), Some(0.9), None, Some(0.4), Some(0.8), Some(0.2), Some(0.6)],
        "unused" => &[None, None, None, None, Some(1.0), None, None, None]
    )?;

    let results = IpswBuilder::from_formula(df, "z ~ x", "y", "d")?
        .bootstrap_reps(0)
        .run()?;
    // Nulls in columns outside the model do not remove rows.
    assert_eq!(*results.n_obs(), 6);
    assert!(results.estimate().is_finite());
    Ok(())
}

#[test]
fn test_collinear_covariate_is_dropped() -> Result<(), Box<dyn std::error::Error>> {
    let df = card_sample();
    let exper = df.column("exper")?.cast(&DataType::Float64)?;
    let doubled = (exper.as_materialized_series() * 2.0).with_name("exper2".into());
    let mut with_duplicate = df.clone();
    with_duplicate.with_column(doubled)?;

    let base = IpswBuilder::from_formula(df, "nearc4 ~ exper + black", "lwage", "educ")?
        .bootstrap_reps(0)
        .run()?;
    let dup = IpswBuilder::from_formula(
        with_duplicate,
        "nearc4 ~ exper + black + exper2",
        "lwage",
        "educ",
    )?
    .bootstrap_reps(0)
    .run()?;

    assert_eq!(dup.dropped_covariates(), &vec!["exper2"]);
    assert_eq!(dup.covariates(), base.covariates());
    assert!((dup.estimate() - base.estimate()).abs() < 1e-10);
    Ok(())
}

#[test]
fn test_categorical_covariate_levels() -> Result<(), Box<dyn std::error::Error>> {
    let results = IpswBuilder::from_formula(
        card_sample(),
        "nearc4 ~ exper + black + south + smsa + C(region)",
        "lwage",
        "educ",
    )?
    .bootstrap_reps(30)
    .run()?;

    let covariates = results.covariates();
    assert_eq!(covariates[0], "intercept");
    assert!(!covariates.iter().any(|c| c == "region_1"));
    for level in ["region_2", "region_3", "region_4"] {
        assert!(covariates.iter().any(|c| c == level), "missing {}", level);
    }
    assert_eq!(*results.n_obs(), 400);
    let overlap = results.overlap();
    assert!(overlap.min > 0.0 && overlap.max < 1.0);
    Ok(())
}

#[test]
fn test_missing_column_is_reported() {
    let result = IpswBuilder::from_formula(card_sample(), "nearc4 ~ exper + tenure", "lwage", "educ")
        .unwrap()
        .bootstrap_reps(0)
        .run();
    match result {
        Err(IpswError::ColumnNotFound(name)) => assert_eq!(name, "tenure"),
        other => panic!("expected a missing column, got {:?}", other.map(|r| *r.estimate())),
    }
}

#[test]
fn test_binary_treatment_estimates_late() -> Result<(), Box<dyn std::error::Error>> {
    let results = IpswBuilder::from_formula(card_sample(), "nearc4 ~ exper + smsa", "lwage", "college")?
        .bootstrap_reps(0)
        .run()?;
    assert!(results.estimate().is_finite());
    assert!(*results.first_stage() != 0.0);
    Ok(())
}
