//! Numeric form of an IV dataset and its construction from a `DataFrame`.
use crate::formula::Formula;
use crate::IpswError;
use getset::Getters;
use nalgebra::{DMatrix, DVector};
use polars::prelude::*;
use std::collections::BTreeSet;

/// Outcome, treatment, instrument and propensity design matrix, row-aligned.
///
/// The design matrix always carries an intercept in its first column.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub")]
pub struct IvData {
    y: DVector<f64>,
    d: DVector<f64>,
    z: DVector<f64>,
    x: DMatrix<f64>,
    column_names: Vec<String>,
}

impl IvData {
    /// Builds an `IvData` after checking its invariants: at least one row,
    /// matching lengths, finite values and an instrument coded 0/1.
    pub fn new(
        y: DVector<f64>,
        d: DVector<f64>,
        z: DVector<f64>,
        x: DMatrix<f64>,
        column_names: Vec<String>,
    ) -> Result<Self, IpswError> {
        let n = y.len();
        if n == 0 {
            return Err(IpswError::Data("Dataset has no rows".to_string()));
        }
        if d.len() != n || z.len() != n || x.nrows() != n {
            return Err(IpswError::Data(format!(
                "Row counts differ: outcome {}, treatment {}, instrument {}, covariates {}",
                n,
                d.len(),
                z.len(),
                x.nrows()
            )));
        }
        if column_names.len() != x.ncols() {
            return Err(IpswError::Data(format!(
                "{} column names given for {} design columns",
                column_names.len(),
                x.ncols()
            )));
        }
        if let Some((row, value)) = z.iter().enumerate().find(|&(_, &v)| v != 0.0 && v != 1.0) {
            return Err(IpswError::Data(format!(
                "Instrument must be coded 0/1; found {} at row {}",
                value, row
            )));
        }
        for (field, values) in [("outcome", &y), ("treatment", &d)] {
            if let Some(row) = values.iter().position(|v| !v.is_finite()) {
                return Err(IpswError::Data(format!(
                    "Non-finite {} value at row {}",
                    field, row
                )));
            }
        }
        if let Some(pos) = x.iter().position(|v| !v.is_finite()) {
            let (row, col) = (pos % n, pos / n);
            return Err(IpswError::Data(format!(
                "Non-finite covariate '{}' at row {}",
                column_names[col], row
            )));
        }

        Ok(Self {
            y,
            d,
            z,
            x,
            column_names,
        })
    }

    /// Prepares the numeric data from a `DataFrame`.
    ///
    /// Rows with a null in any column the estimation reads are dropped first.
    /// Categorical covariates get one indicator per level except the first
    /// level in sorted order.
    pub fn from_dataframe(
        df: &DataFrame,
        outcome: &str,
        treatment: &str,
        formula: &Formula,
    ) -> Result<Self, IpswError> {
        let mut cols = vec![outcome.to_string(), treatment.to_string()];
        cols.extend(formula.columns());
        for c in &cols {
            if df.column(c).is_err() {
                return Err(IpswError::ColumnNotFound(c.clone()));
            }
        }

        let clean = df.drop_nulls(Some(cols.as_slice()))?;
        let dropped = df.height() - clean.height();
        if dropped > 0 {
            tracing::info!(dropped, "dropped rows with missing values");
        }
        if clean.height() == 0 {
            return Err(IpswError::Data(
                "No complete rows remain after dropping missing values".to_string(),
            ));
        }

        let y = DVector::from_vec(numeric_column(&clean, outcome)?);
        let d = DVector::from_vec(numeric_column(&clean, treatment)?);
        let z = DVector::from_vec(numeric_column(&clean, &formula.instrument)?);

        let mut columns: Vec<Vec<f64>> = vec![vec![1.0; clean.height()]];
        let mut column_names = vec!["intercept".to_string()];
        for name in &formula.covariates {
            columns.push(numeric_column(&clean, name)?);
            column_names.push(name.clone());
        }
        for name in &formula.categorical_covariates {
            for (dummy_name, dummy) in indicator_columns(&clean, name)? {
                columns.push(dummy);
                column_names.push(dummy_name);
            }
        }

        let x = DMatrix::from_fn(clean.height(), columns.len(), |i, j| columns[j][i]);
        IvData::new(y, d, z, x, column_names)
    }

    pub fn nrows(&self) -> usize {
        self.y.len()
    }

    /// Builds the resample whose row `i` is row `indices[i]` of `self`.
    pub fn resample(&self, indices: &[usize]) -> IvData {
        IvData {
            y: self.y.select_rows(indices),
            d: self.d.select_rows(indices),
            z: self.z.select_rows(indices),
            x: self.x.select_rows(indices),
            column_names: self.column_names.clone(),
        }
    }

    /// True when every row shares the same instrument value.
    pub fn instrument_is_constant(&self) -> bool {
        let first = self.z[0];
        self.z.iter().all(|&v| v == first)
    }

    /// True when the treatment only takes the values 0 and 1.
    pub fn treatment_is_binary(&self) -> bool {
        self.d.iter().all(|&v| v == 0.0 || v == 1.0)
    }
}

fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<f64>, IpswError> {
    let column = df
        .column(name)
        .map_err(|_| IpswError::ColumnNotFound(name.to_string()))?;
    let cast = column.cast(&DataType::Float64)?;
    cast.f64()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.ok_or_else(|| {
                IpswError::Data(format!(
                    "Column '{}' has a non-numeric value at row {}",
                    name, row
                ))
            })
        })
        .collect()
}

fn indicator_columns(df: &DataFrame, name: &str) -> Result<Vec<(String, Vec<f64>)>, IpswError> {
    let column = df
        .column(name)
        .map_err(|_| IpswError::ColumnNotFound(name.to_string()))?;
    let cast = column.cast(&DataType::String)?;
    let labels: Vec<String> = cast
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect();

    let levels: BTreeSet<&str> = labels.iter().map(String::as_str).collect();
    Ok(levels
        .into_iter()
        .skip(1)
        .map(|level| {
            let dummy = labels
                .iter()
                .map(|l| if l == level { 1.0 } else { 0.0 })
                .collect();
            (format!("{}_{}", name, level), dummy)
        })
        .collect())
}
