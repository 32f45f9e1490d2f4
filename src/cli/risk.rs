//! Risk scoring command

use colored::Colorize;
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::cli::args::GlobalOptions;
use crate::error::{Error, Result};
use crate::models::{RiskLevel, residual_score, risk_score};
use crate::output::json::format_json;

#[derive(Debug, Serialize)]
struct ScoreReport {
    likelihood: u8,
    impact: u8,
    inherent_score: u8,
    inherent_level: RiskLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    effectiveness: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    residual_score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    residual_level: Option<RiskLevel>,
}

fn build_report(likelihood: u8, impact: u8, effectiveness: Option<u8>) -> Result<ScoreReport> {
    let inherent = risk_score(likelihood, impact).ok_or_else(|| {
        Error::Other("likelihood and impact must be between 1 and 5".to_string())
    })?;
    let residual = effectiveness.map(|e| residual_score(inherent, e));

    Ok(ScoreReport {
        likelihood,
        impact,
        inherent_score: inherent,
        inherent_level: RiskLevel::from_score(inherent),
        effectiveness,
        residual_score: residual,
        residual_level: residual.map(RiskLevel::from_score),
    })
}

fn colored_level(level: RiskLevel) -> String {
    let label = level.to_string();
    match level {
        RiskLevel::Low => label.green().to_string(),
        RiskLevel::Medium => label.yellow().to_string(),
        RiskLevel::High => label.red().to_string(),
        RiskLevel::Critical => label.red().bold().to_string(),
    }
}

/// Print inherent and residual scores
pub fn score(
    opts: &GlobalOptions,
    likelihood: u8,
    impact: u8,
    effectiveness: Option<u8>,
) -> Result<()> {
    let report = build_report(likelihood, impact, effectiveness)?;

    match opts.format {
        OutputFormat::Json => println!("{}", format_json(&report)?),
        OutputFormat::Table => {
            println!(
                "Inherent risk:  {} ({}) = likelihood {} x impact {}",
                report.inherent_score.to_string().bold(),
                colored_level(report.inherent_level),
                likelihood,
                impact
            );
            if let (Some(residual), Some(level), Some(e)) =
                (report.residual_score, report.residual_level, effectiveness)
            {
                println!(
                    "Residual risk:  {} ({}) after {}% control effectiveness",
                    residual.to_string().bold(),
                    colored_level(level),
                    e
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_without_effectiveness() {
        let report = build_report(4, 4, None).unwrap();
        assert_eq!(report.inherent_score, 16);
        assert_eq!(report.inherent_level, RiskLevel::Critical);
        assert!(report.residual_score.is_none());
    }

    #[test]
    fn test_report_with_effectiveness() {
        let report = build_report(3, 5, Some(60)).unwrap();
        assert_eq!(report.inherent_score, 15);
        assert_eq!(report.residual_score, Some(6));
        assert_eq!(report.residual_level, Some(RiskLevel::Medium));
    }

    #[test]
    fn test_report_rejects_out_of_range() {
        assert!(build_report(0, 3, None).is_err());
    }
}
