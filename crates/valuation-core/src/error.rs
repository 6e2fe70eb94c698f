use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValuationError {
    /// Base FCF, price or share count absent or non-positive.
    #[error("Missing fundamental data: {0}")]
    MissingFundamentalData(String),

    /// Discount rate does not exceed the terminal or stage-2 growth rate.
    #[error("Degenerate model parameters: {0}")]
    DegenerateModelParameters(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl ValuationError {
    /// True when the data source is to blame.
    pub fn is_data_problem(&self) -> bool {
        matches!(self, ValuationError::MissingFundamentalData(_))
    }

    /// True when the user should adjust the model configuration.
    pub fn is_config_problem(&self) -> bool {
        matches!(
            self,
            ValuationError::DegenerateModelParameters(_) | ValuationError::InvalidParameter(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_problem_categories_are_disjoint() {
        let missing = ValuationError::MissingFundamentalData("base_fcf".to_string());
        let degenerate = ValuationError::DegenerateModelParameters("r <= g".to_string());
        let invalid = ValuationError::InvalidParameter("iterations".to_string());

        assert!(missing.is_data_problem());
        assert!(!missing.is_config_problem());
        assert!(degenerate.is_config_problem());
        assert!(!degenerate.is_data_problem());
        assert!(invalid.is_config_problem());
    }

    #[test]
    fn test_error_messages() {
        let err = ValuationError::DegenerateModelParameters("discount rate 2.00% <= terminal growth 2.50%".to_string());
        assert_eq!(
            err.to_string(),
            "Degenerate model parameters: discount rate 2.00% <= terminal growth 2.50%"
        );
    }
}
