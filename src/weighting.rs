//! Inverse instrument-propensity weighting: the six weighted sums and the
//! IPSW ratio built from them.
use crate::data::IvData;
use crate::propensity::FittedPropensity;
use crate::IpswError;
use serde::Serialize;

/// Weighted sums over all rows, with `W1 = Z/Q` and `W0 = (1-Z)/(1-Q)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WeightedSums {
    pub w0: f64,
    pub w1: f64,
    pub num0: f64,
    pub num1: f64,
    pub den0: f64,
    pub den1: f64,
}

impl WeightedSums {
    /// Accumulates the sums row by row in input order.
    pub fn accumulate(y: &[f64], d: &[f64], z: &[f64], q: &[f64]) -> Self {
        let mut sums = WeightedSums::default();
        for i in 0..y.len() {
            let w1 = z[i] / q[i];
            let w0 = (1.0 - z[i]) / (1.0 - q[i]);
            sums.w1 += w1;
            sums.w0 += w0;
            sums.num1 += y[i] * w1;
            sums.num0 += y[i] * w0;
            sums.den1 += d[i] * w1;
            sums.den0 += d[i] * w0;
        }
        sums
    }

    /// Normalized reduced form and first stage.
    fn normalized_contrasts(&self) -> Result<(f64, f64), IpswError> {
        if self.w1 == 0.0 {
            return Err(IpswError::Estimation(
                "No weight on instrument = 1 rows (sum of Z/Q is zero)".to_string(),
            ));
        }
        if self.w0 == 0.0 {
            return Err(IpswError::Estimation(
                "No weight on instrument = 0 rows (sum of (1-Z)/(1-Q) is zero)".to_string(),
            ));
        }
        Ok((
            self.num1 / self.w1 - self.num0 / self.w0,
            self.den1 / self.w1 - self.den0 / self.w0,
        ))
    }
}

/// The IPSW estimate together with its reduced form and first stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IpswComponents {
    /// Weighted effect of the instrument on the outcome.
    pub reduced_form: f64,
    /// Weighted effect of the instrument on the treatment.
    pub first_stage: f64,
    /// `reduced_form / first_stage`.
    pub estimate: f64,
}

/// Divides a reduced form by a first stage, rejecting an undefined ratio.
pub(crate) fn ratio(reduced_form: f64, first_stage: f64) -> Result<IpswComponents, IpswError> {
    if first_stage == 0.0 {
        return Err(IpswError::Estimation(
            "First stage is zero: the instrument does not shift the treatment".to_string(),
        ));
    }
    let estimate = reduced_form / first_stage;
    if !estimate.is_finite() {
        return Err(IpswError::Estimation(format!(
            "Estimate is not finite (reduced form {}, first stage {})",
            reduced_form, first_stage
        )));
    }
    Ok(IpswComponents {
        reduced_form,
        first_stage,
        estimate,
    })
}

/// Computes the IPSW reduced form, first stage and their ratio.
pub fn ipsw_components(
    data: &IvData,
    propensity: &FittedPropensity,
) -> Result<IpswComponents, IpswError> {
    let sums = weighted_sums(data, propensity)?;
    let (reduced_form, first_stage) = sums.normalized_contrasts()?;
    ratio(reduced_form, first_stage)
}

/// The IPSW estimate of the unconditional LATE (binary treatment) or ACR
/// (ordered treatment).
pub fn ipsw_estimate(data: &IvData, propensity: &FittedPropensity) -> Result<f64, IpswError> {
    ipsw_components(data, propensity).map(|c| c.estimate)
}

/// Weighted sums for a dataset and its row-aligned propensity scores.
pub fn weighted_sums(
    data: &IvData,
    propensity: &FittedPropensity,
) -> Result<WeightedSums, IpswError> {
    if propensity.len() != data.nrows() {
        return Err(IpswError::Data(format!(
            "{} propensity scores for {} rows",
            propensity.len(),
            data.nrows()
        )));
    }
    Ok(WeightedSums::accumulate(
        data.y().as_slice(),
        data.d().as_slice(),
        data.z().as_slice(),
        propensity.scores().as_slice(),
    ))
}
