//! Display models for table and JSON output
//!
//! Display models flatten records into string columns.

use serde::Serialize;
use tabled::Tabled;

use crate::models::{ActionPlan, Audit, Control, Regulation, Risk};

fn or_dash(value: Option<&str>) -> String {
    value.unwrap_or("-").to_string()
}

fn date_only(value: Option<&str>) -> String {
    // Timestamps come back as RFC 3339; the date is enough in a table
    value
        .map(|v| v.split('T').next().unwrap_or(v).to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn deleted_mark(deleted: bool) -> String {
    if deleted { "\u{2717}".to_string() } else { String::new() }
}

/// Risk display model for table/JSON output.
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct RiskDisplay {
    #[tabled(rename = "ID")]
    pub id: String,

    #[tabled(rename = "TITLE")]
    pub title: String,

    #[tabled(rename = "STATUS")]
    pub status: String,

    #[tabled(rename = "L")]
    pub likelihood: String,

    #[tabled(rename = "I")]
    pub impact: String,

    #[tabled(rename = "SCORE")]
    pub score: String,

    #[tabled(rename = "LEVEL")]
    pub level: String,

    #[tabled(rename = "OWNER")]
    pub owner: String,

    #[tabled(rename = "DELETED")]
    pub deleted: String,
}

impl From<&Risk> for RiskDisplay {
    fn from(risk: &Risk) -> Self {
        Self {
            id: risk.id.to_string(),
            title: risk.title.clone(),
            status: or_dash(risk.status.as_deref()),
            likelihood: risk.likelihood.map(|l| l.to_string()).unwrap_or_else(|| "-".into()),
            impact: risk.impact.map(|i| i.to_string()).unwrap_or_else(|| "-".into()),
            score: risk.score().map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
            level: risk.level().map(|l| l.to_string()).unwrap_or_else(|| "-".into()),
            owner: or_dash(risk.owner.as_deref()),
            deleted: deleted_mark(risk.is_deleted),
        }
    }
}

#[derive(Debug, Clone, Tabled, Serialize)]
pub struct ControlDisplay {
    #[tabled(rename = "ID")]
    pub id: String,

    #[tabled(rename = "TITLE")]
    pub title: String,

    #[tabled(rename = "TYPE")]
    pub control_type: String,

    #[tabled(rename = "STATUS")]
    pub status: String,

    #[tabled(rename = "EFFECTIVENESS")]
    pub effectiveness: String,

    #[tabled(rename = "DELETED")]
    pub deleted: String,
}

impl From<&Control> for ControlDisplay {
    fn from(control: &Control) -> Self {
        Self {
            id: control.id.to_string(),
            title: control.title.clone(),
            control_type: or_dash(control.control_type.as_deref()),
            status: or_dash(control.status.as_deref()),
            effectiveness: control
                .effectiveness
                .map(|e| format!("{}%", e))
                .unwrap_or_else(|| "-".into()),
            deleted: deleted_mark(control.is_deleted),
        }
    }
}

#[derive(Debug, Clone, Tabled, Serialize)]
pub struct AuditDisplay {
    #[tabled(rename = "ID")]
    pub id: String,

    #[tabled(rename = "TITLE")]
    pub title: String,

    #[tabled(rename = "TYPE")]
    pub audit_type: String,

    #[tabled(rename = "STATUS")]
    pub status: String,

    #[tabled(rename = "START")]
    pub start: String,

    #[tabled(rename = "END")]
    pub end: String,
}

impl From<&Audit> for AuditDisplay {
    fn from(audit: &Audit) -> Self {
        Self {
            id: audit.id.to_string(),
            title: audit.title.clone(),
            audit_type: or_dash(audit.audit_type.as_deref()),
            status: or_dash(audit.status.as_deref()),
            start: date_only(audit.start_date.as_deref()),
            end: date_only(audit.end_date.as_deref()),
        }
    }
}

#[derive(Debug, Clone, Tabled, Serialize)]
pub struct RegulationDisplay {
    #[tabled(rename = "ID")]
    pub id: String,

    #[tabled(rename = "NAME")]
    pub name: String,

    #[tabled(rename = "JURISDICTION")]
    pub jurisdiction: String,

    #[tabled(rename = "STATUS")]
    pub status: String,

    #[tabled(rename = "EFFECTIVE")]
    pub effective: String,
}

impl From<&Regulation> for RegulationDisplay {
    fn from(regulation: &Regulation) -> Self {
        Self {
            id: regulation.id.to_string(),
            name: regulation.name.clone(),
            jurisdiction: or_dash(regulation.jurisdiction.as_deref()),
            status: or_dash(regulation.status.as_deref()),
            effective: date_only(regulation.effective_date.as_deref()),
        }
    }
}

#[derive(Debug, Clone, Tabled, Serialize)]
pub struct ActionPlanDisplay {
    #[tabled(rename = "ID")]
    pub id: String,

    #[tabled(rename = "TITLE")]
    pub title: String,

    #[tabled(rename = "STATUS")]
    pub status: String,

    #[tabled(rename = "PRIORITY")]
    pub priority: String,

    #[tabled(rename = "DUE")]
    pub due: String,

    #[tabled(rename = "RISK")]
    pub risk: String,
}

impl From<&ActionPlan> for ActionPlanDisplay {
    fn from(plan: &ActionPlan) -> Self {
        Self {
            id: plan.id.to_string(),
            title: plan.title.clone(),
            status: or_dash(plan.status.as_deref()),
            priority: or_dash(plan.priority.as_deref()),
            due: date_only(plan.due_date.as_deref()),
            risk: plan
                .risk_id
                .as_ref()
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".into()),
        }
    }
}
