use std::collections::HashMap;

use crate::types::Fundamentals;

/// Anything that can hand the engine per-ticker fundamentals.
///
/// Data retrieval happens behind this trait, before the engine runs. A ticker
/// the source does not know is reported as `None`, not as an error.
pub trait FundamentalsSource {
    fn fundamentals(&self, ticker: &str) -> Option<Fundamentals>;
}

impl FundamentalsSource for HashMap<String, Fundamentals> {
    fn fundamentals(&self, ticker: &str) -> Option<Fundamentals> {
        self.get(ticker).cloned()
    }
}

impl<S: FundamentalsSource + ?Sized> FundamentalsSource for &S {
    fn fundamentals(&self, ticker: &str) -> Option<Fundamentals> {
        (**self).fundamentals(ticker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashmap_source() {
        let mut source = HashMap::new();
        source.insert(
            "ACME".to_string(),
            Fundamentals {
                ticker: "ACME".to_string(),
                base_fcf: Some(10.0),
                ..Default::default()
            },
        );

        assert_eq!(source.fundamentals("ACME").unwrap().base_fcf, Some(10.0));
        assert!(source.fundamentals("NOPE").is_none());
        assert!((&source).fundamentals("ACME").is_some());
    }
}
