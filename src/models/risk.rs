//! Risk records and scoring
//!
//! Inherent score is likelihood times impact on 1-5 scales. Residual score
//! discounts the inherent score by control effectiveness.

use serde::{Deserialize, Serialize};

use crate::models::RecordId;

/// Lowest and highest value of the likelihood and impact scales
pub const SCALE_MIN: u8 = 1;
pub const SCALE_MAX: u8 = 5;

/// Risk register entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Risk {
    pub id: RecordId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub likelihood: Option<u8>,
    #[serde(default)]
    pub impact: Option<u8>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub deleted_at: Option<String>,
}

impl Risk {
    /// Inherent score, when both inputs are present and in range
    pub fn score(&self) -> Option<u8> {
        risk_score(self.likelihood?, self.impact?)
    }

    pub fn level(&self) -> Option<RiskLevel> {
        self.score().map(RiskLevel::from_score)
    }
}

/// Likelihood times impact, `None` when either input is outside 1..=5.
pub fn risk_score(likelihood: u8, impact: u8) -> Option<u8> {
    let scale = SCALE_MIN..=SCALE_MAX;
    if scale.contains(&likelihood) && scale.contains(&impact) {
        Some(likelihood * impact)
    } else {
        None
    }
}

/// Score after controls. Never drops below 1.
pub fn residual_score(inherent: u8, effectiveness_percent: u8) -> u8 {
    let effectiveness = f64::from(effectiveness_percent.min(100)) / 100.0;
    let residual = (f64::from(inherent) * (1.0 - effectiveness)).round() as u8;
    residual.max(1)
}

/// Severity band of a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=4 => RiskLevel::Low,
            5..=9 => RiskLevel::Medium,
            10..=15 => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
            RiskLevel::Critical => "Critical",
        };
        write!(f, "{}", label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_score_bounds() {
        assert_eq!(risk_score(1, 1), Some(1));
        assert_eq!(risk_score(5, 5), Some(25));
        assert_eq!(risk_score(3, 4), Some(12));
        assert_eq!(risk_score(0, 3), None);
        assert_eq!(risk_score(3, 6), None);
    }

    #[test]
    fn test_level_bands() {
        assert_eq!(RiskLevel::from_score(4), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(5), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(9), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(10), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(15), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(16), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(25), RiskLevel::Critical);
    }

    #[test]
    fn test_residual_score() {
        assert_eq!(residual_score(20, 50), 10);
        assert_eq!(residual_score(12, 75), 3);
        assert_eq!(residual_score(10, 0), 10);
        assert_eq!(residual_score(25, 100), 1);
        assert_eq!(residual_score(5, 95), 1);
    }

    #[test]
    fn test_risk_deserializes_partial_record() {
        let risk: Risk = serde_json::from_str(
            r#"{"id": 4, "title": "Vendor breach", "likelihood": 4, "impact": 5, "ownerId": 2}"#,
        )
        .unwrap();
        assert_eq!(risk.score(), Some(20));
        assert_eq!(risk.level(), Some(RiskLevel::Critical));
        assert!(!risk.is_deleted);
    }
}
