//! Resource collections exposed by the backend

use std::fmt;

use crate::models::RecordId;

/// A record collection under `/api`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Resource {
    Risks,
    Controls,
    Audits,
    Regulations,
    #[value(name = "action-plans")]
    ActionPlans,
}

impl Resource {
    /// Path segment used in URLs
    pub fn segment(&self) -> &'static str {
        match self {
            Resource::Risks => "risks",
            Resource::Controls => "controls",
            Resource::Audits => "audits",
            Resource::Regulations => "regulations",
            Resource::ActionPlans => "action-plans",
        }
    }

    /// Collection path, also the query key of the cached list
    pub fn collection_path(&self) -> String {
        format!("/api/{}", self.segment())
    }

    pub fn record_path(&self, id: &RecordId) -> String {
        format!("/api/{}/{}", self.segment(), id)
    }

    /// Page the user is on while working with a record
    pub fn page_path(&self, id: Option<&RecordId>) -> String {
        match id {
            Some(id) => format!("/{}/{}", self.segment(), id),
            None => format!("/{}", self.segment()),
        }
    }

    pub fn singular(&self) -> &'static str {
        match self {
            Resource::Risks => "risk",
            Resource::Controls => "control",
            Resource::Audits => "audit",
            Resource::Regulations => "regulation",
            Resource::ActionPlans => "action plan",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segment())
    }
}
