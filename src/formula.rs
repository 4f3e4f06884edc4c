use crate::IpswError;

/// An instrument propensity formula: the binary instrument on the left,
/// covariates on the right.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    pub instrument: String,
    pub covariates: Vec<String>,
    pub categorical_covariates: Vec<String>,
}

impl Formula {
    /// Parses an R-style formula string (e.g., "nearc4 ~ black + south + C(region)").
    ///
    /// A lone `1` on the right-hand side requests an intercept-only propensity
    /// model. The intercept is always included, so `1` may also appear next to
    /// other terms and is then ignored.
    pub fn parse(formula_str: &str) -> Result<Formula, IpswError> {
        let parts: Vec<&str> = formula_str.split('~').collect();
        if parts.len() != 2 {
            return Err(IpswError::Formula(format!(
                "Invalid formula format. Expected 'instrument ~ covariates', got '{}'",
                formula_str
            )));
        }

        let instrument = parts[0].trim().to_string();
        if instrument.is_empty() {
            return Err(IpswError::Formula(
                "Instrument variable is missing".to_string(),
            ));
        }

        let mut covariates = Vec::new();
        let mut categorical_covariates = Vec::new();
        let mut saw_intercept = false;

        for term in parts[1].split('+') {
            let term = term.trim();
            if term.is_empty() {
                continue;
            }

            if term == "1" {
                saw_intercept = true;
            } else if term.starts_with("C(") && term.ends_with(')') {
                categorical_covariates.push(term[2..term.len() - 1].trim().to_string());
            } else if term.starts_with("factor(") && term.ends_with(')') {
                categorical_covariates.push(term[7..term.len() - 1].trim().to_string());
            } else {
                covariates.push(term.to_string());
            }
        }

        if !saw_intercept && covariates.is_empty() && categorical_covariates.is_empty() {
            return Err(IpswError::Formula(
                "No covariates specified (use '~ 1' for an intercept-only model)".to_string(),
            ));
        }

        if covariates.iter().any(|c| *c == instrument)
            || categorical_covariates.iter().any(|c| *c == instrument)
        {
            return Err(IpswError::Formula(format!(
                "Instrument '{}' cannot also be a covariate",
                instrument
            )));
        }

        Ok(Formula {
            instrument,
            covariates,
            categorical_covariates,
        })
    }

    /// All columns the formula reads, instrument first.
    pub fn columns(&self) -> Vec<String> {
        let mut cols = vec![self.instrument.clone()];
        cols.extend(self.covariates.iter().cloned());
        cols.extend(self.categorical_covariates.iter().cloned());
        cols
    }
}
