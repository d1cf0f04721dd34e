//! Per-ticker scoring audits.
//!
//! Every scored ticker carries a record of how its composite was built:
//! the raw sub-metrics as computed, which of them were imputed from the
//! universe median, the winsorized value entering standardization, the
//! universe percentile, the clipped z-score, and the contribution of each
//! factor to the composite.

use crate::raw::RawFactors;
use cadiz_traits::Ticker;
use serde::{Deserialize, Serialize};

/// Audit trail of one composite factor for one ticker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorColumnAudit {
    /// Winsorized raw factor value entering standardization; `None` when
    /// the factor could not be computed or imputed.
    pub raw: Option<f64>,
    /// Percentile rank of the raw value within the universe, in `[0, 1]`.
    pub percentile: Option<f64>,
    /// Clipped z-score (post-tilt).
    pub z: f64,
    /// Contribution to the composite: configured weight times z.
    pub contribution: f64,
}

impl FactorColumnAudit {
    pub(crate) const fn neutral() -> Self {
        Self {
            raw: None,
            percentile: None,
            z: 0.0,
            contribution: 0.0,
        }
    }
}

/// Full scoring audit for one ticker at one rebalance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorAudit {
    /// Ticker the audit belongs to.
    pub ticker: Ticker,
    /// Whether the ticker lacked fundamentals or price history and was
    /// scored neutral across the board.
    pub insufficient_data: bool,
    /// Names of sub-metrics imputed from the universe median.
    pub imputed: Vec<String>,
    /// Raw sub-metrics as computed, before imputation.
    pub raw: RawFactors,
    /// Value factor audit.
    pub value: FactorColumnAudit,
    /// Quality factor audit.
    pub quality: FactorColumnAudit,
    /// Momentum factor audit.
    pub momentum: FactorColumnAudit,
    /// Composite score: sum of the three contributions.
    pub total: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_column_audit() {
        let audit = FactorColumnAudit::neutral();
        assert!(audit.raw.is_none());
        assert_eq!(audit.z, 0.0);
        assert_eq!(audit.contribution, 0.0);
    }

    #[test]
    fn test_audit_serialization_round_trip() {
        let audit = FactorAudit {
            ticker: "AAPL".to_string(),
            insufficient_data: false,
            imputed: vec!["gross_margin".to_string()],
            raw: RawFactors {
                fcf_yield: Some(0.04),
                ..Default::default()
            },
            value: FactorColumnAudit {
                raw: Some(0.05),
                percentile: Some(0.8),
                z: 1.2,
                contribution: 0.48,
            },
            quality: FactorColumnAudit::neutral(),
            momentum: FactorColumnAudit::neutral(),
            total: 0.48,
        };
        let json = serde_json::to_string(&audit).unwrap();
        let back: FactorAudit = serde_json::from_str(&json).unwrap();
        assert_eq!(back, audit);
    }
}
