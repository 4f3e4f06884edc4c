//! The family of weighting estimators sharing the instrument propensity score:
//! normalized IPSW, its unnormalized counterpart, and Abadie's kappa ratio.
use crate::data::IvData;
use crate::propensity::FittedPropensity;
use crate::weighting::{ipsw_components, ratio, weighted_sums, IpswComponents};
use crate::IpswError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Which propensity-weighting estimator to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KappaEstimator {
    /// Weights normalized to sum to one within each instrument arm (IPSW).
    #[default]
    Normalized,
    /// Weights divided by the sample size instead of their own sum.
    Unnormalized,
    /// `E[κ1 Y]/E[κ1] − E[κ0 Y]/E[κ0]`; requires a binary treatment.
    Kappa10,
}

impl fmt::Display for KappaEstimator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            KappaEstimator::Normalized => "normalized",
            KappaEstimator::Unnormalized => "unnormalized",
            KappaEstimator::Kappa10 => "kappa10",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for KappaEstimator {
    type Err = IpswError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normalized" | "ipsw" => Ok(KappaEstimator::Normalized),
            "unnormalized" => Ok(KappaEstimator::Unnormalized),
            "kappa10" => Ok(KappaEstimator::Kappa10),
            other => Err(IpswError::Data(format!("Unknown estimator '{}'", other))),
        }
    }
}

/// Computes the chosen estimator from one fitted propensity.
///
/// For `Kappa10` the reported first stage is the sample mean of `κ1`, which
/// estimates the complier share, and the reduced form is the estimate scaled
/// by it.
pub fn kappa_estimate(
    data: &IvData,
    propensity: &FittedPropensity,
    estimator: KappaEstimator,
) -> Result<IpswComponents, IpswError> {
    match estimator {
        KappaEstimator::Normalized => ipsw_components(data, propensity),
        KappaEstimator::Unnormalized => {
            let sums = weighted_sums(data, propensity)?;
            if sums.w1 == 0.0 || sums.w0 == 0.0 {
                return Err(IpswError::Estimation(
                    "One instrument arm carries no weight".to_string(),
                ));
            }
            let n = data.nrows() as f64;
            ratio((sums.num1 - sums.num0) / n, (sums.den1 - sums.den0) / n)
        }
        KappaEstimator::Kappa10 => kappa10(data, propensity),
    }
}

fn kappa10(data: &IvData, propensity: &FittedPropensity) -> Result<IpswComponents, IpswError> {
    if !data.treatment_is_binary() {
        return Err(IpswError::Data(
            "The kappa10 estimator requires a treatment coded 0/1".to_string(),
        ));
    }
    if propensity.len() != data.nrows() {
        return Err(IpswError::Data(format!(
            "{} propensity scores for {} rows",
            propensity.len(),
            data.nrows()
        )));
    }

    let (mut k1, mut k1_y, mut k0, mut k0_y) = (0.0, 0.0, 0.0, 0.0);
    for i in 0..data.nrows() {
        let (y, d, z, q) = (
            data.y()[i],
            data.d()[i],
            data.z()[i],
            propensity.scores()[i],
        );
        let scale = q * (1.0 - q);
        let kappa1 = d * (z - q) / scale;
        let kappa0 = (1.0 - d) * (q - z) / scale;
        k1 += kappa1;
        k1_y += kappa1 * y;
        k0 += kappa0;
        k0_y += kappa0 * y;
    }

    if k1 == 0.0 || k0 == 0.0 {
        return Err(IpswError::Estimation(
            "Kappa weights sum to zero: no compliers identified".to_string(),
        ));
    }

    let estimate = k1_y / k1 - k0_y / k0;
    let first_stage = k1 / data.nrows() as f64;
    ratio(estimate * first_stage, first_stage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{DMatrix, DVector};

    fn sample() -> (IvData, FittedPropensity) {
        let data = IvData::new(
            DVector::from_vec(vec![3.0, 5.0, 4.5, 1.0, 2.0, 1.5, 2.5, 6.0]),
            DVector::from_vec(vec![1.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0]),
            DVector::from_vec(vec![1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0]),
            DMatrix::from_element(8, 1, 1.0),
            vec!["intercept".to_string()],
        )
        .unwrap();
        let q = FittedPropensity::from_scores(DVector::from_vec(vec![
            0.6, 0.55, 0.4, 0.35, 0.5, 0.45, 0.3, 0.65,
        ]))
        .unwrap();
        (data, q)
    }

    #[test]
    fn test_normalized_equals_ipsw() {
        let (data, q) = sample();
        let ipsw = crate::weighting::ipsw_estimate(&data, &q).unwrap();
        let kappa = kappa_estimate(&data, &q, KappaEstimator::Normalized).unwrap();
        assert_eq!(ipsw.to_bits(), kappa.estimate.to_bits());
    }

    #[test]
    fn test_estimators_agree_under_constant_propensity() {
        // With Q equal to the sample share of Z = 1, every weight sum equals n,
        // so normalized and unnormalized estimates coincide.
        let (data, _) = sample();
        let q = FittedPropensity::from_scores(DVector::from_element(8, 0.5)).unwrap();
        let a = kappa_estimate(&data, &q, KappaEstimator::Normalized).unwrap();
        let b = kappa_estimate(&data, &q, KappaEstimator::Unnormalized).unwrap();
        assert!((a.estimate - b.estimate).abs() < 1e-12);
    }

    #[test]
    fn test_kappa10_requires_binary_treatment() {
        let data = IvData::new(
            DVector::from_vec(vec![1.0, 2.0]),
            DVector::from_vec(vec![0.0, 2.0]),
            DVector::from_vec(vec![0.0, 1.0]),
            DMatrix::from_element(2, 1, 1.0),
            vec!["intercept".to_string()],
        )
        .unwrap();
        let q = FittedPropensity::from_scores(DVector::from_element(2, 0.5)).unwrap();
        assert!(matches!(
            kappa_estimate(&data, &q, KappaEstimator::Kappa10),
            Err(IpswError::Data(_))
        ));
    }

    #[test]
    fn test_kappa10_is_finite_on_sample() {
        let (data, q) = sample();
        let c = kappa_estimate(&data, &q, KappaEstimator::Kappa10).unwrap();
        assert!(c.estimate.is_finite());
        assert!((c.reduced_form / c.first_stage - c.estimate).abs() < 1e-9);
    }

    #[test]
    fn test_parse_estimator_names() {
        assert_eq!("IPSW".parse::<KappaEstimator>().unwrap(), KappaEstimator::Normalized);
        assert_eq!(
            "kappa10".parse::<KappaEstimator>().unwrap(),
            KappaEstimator::Kappa10
        );
        assert!("tsls".parse::<KappaEstimator>().is_err());
        assert_eq!(KappaEstimator::Unnormalized.to_string(), "unnormalized");
    }
}
