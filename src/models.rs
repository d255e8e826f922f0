use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type LeadId = u64;
pub type OpportunityId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 3] = [Self::New, Self::Contacted, Self::Qualified];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Contacted => "Contacted",
            Self::Qualified => "Qualified",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == raw)
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: LeadId,
    pub name: String,
    pub company: String,
    pub email: String,
    pub status: LeadStatus,
    pub source: String,
    pub score: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OpportunityStage {
    #[default]
    Prospecting,
    Qualification,
    Proposal,
    Negotiation,
    #[serde(rename = "Closed Won")]
    ClosedWon,
    #[serde(rename = "Closed Lost")]
    ClosedLost,
}

impl OpportunityStage {
    pub const ALL: [OpportunityStage; 6] = [
        Self::Prospecting,
        Self::Qualification,
        Self::Proposal,
        Self::Negotiation,
        Self::ClosedWon,
        Self::ClosedLost,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prospecting => "Prospecting",
            Self::Qualification => "Qualification",
            Self::Proposal => "Proposal",
            Self::Negotiation => "Negotiation",
            Self::ClosedWon => "Closed Won",
            Self::ClosedLost => "Closed Lost",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        Self::ALL.into_iter().find(|stage| stage.as_str() == trimmed)
    }
}

impl fmt::Display for OpportunityStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    pub id: OpportunityId,
    pub name: String,
    pub stage: OpportunityStage,
    pub amount: Option<f64>,
    pub account_name: String,
    pub lead_id: LeadId,
    pub created_at: DateTime<Utc>,
}

impl Opportunity {
    pub fn origin_label(&self) -> String {
        format!("from Lead #{}", self.lead_id)
    }
}

/// Status half of the filter configuration. Stored as `"all"` or the status name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StatusFilter {
    #[default]
    All,
    Only(LeadStatus),
}

impl StatusFilter {
    pub fn matches(self, status: LeadStatus) -> bool {
        match self {
            Self::All => true,
            Self::Only(expected) => expected == status,
        }
    }
}

impl TryFrom<String> for StatusFilter {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == "all" {
            return Ok(Self::All);
        }
        LeadStatus::parse(&value)
            .map(Self::Only)
            .ok_or_else(|| format!("unknown status filter: {}", value))
    }
}

impl From<StatusFilter> for String {
    fn from(value: StatusFilter) -> Self {
        match value {
            StatusFilter::All => "all".to_string(),
            StatusFilter::Only(status) => status.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadFilters {
    pub search: String,
    pub status: StatusFilter,
}

/// Partial filter change; absent fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterUpdate {
    pub search: Option<String>,
    pub status: Option<StatusFilter>,
}

impl LeadFilters {
    pub fn merged(&self, update: FilterUpdate) -> Self {
        Self {
            search: update.search.unwrap_or_else(|| self.search.clone()),
            status: update.status.unwrap_or(self.status),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    Id,
    Name,
    Company,
    Email,
    Status,
    Source,
    Score,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadSort {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Default for LeadSort {
    fn default() -> Self {
        Self {
            field: SortField::Score,
            direction: SortDirection::Desc,
        }
    }
}

impl LeadSort {
    pub fn with_direction_toggled(self) -> Self {
        Self {
            field: self.field,
            direction: self.direction.toggled(),
        }
    }
}

/// Fields a lead edit may touch. Anything left `None` is kept as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<LeadStatus>,
}

impl LeadUpdate {
    pub fn apply_to(&self, lead: &mut Lead) {
        if let Some(name) = &self.name {
            lead.name = name.clone();
        }
        if let Some(email) = &self.email {
            lead.email = email.clone();
        }
        if let Some(company) = &self.company {
            lead.company = company.clone();
        }
        if let Some(status) = self.status {
            lead.status = status;
        }
    }
}

/// The detail panel's edit form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadEdit {
    pub name: String,
    pub email: String,
    pub company: String,
    pub status: LeadStatus,
}

impl From<&Lead> for LeadEdit {
    fn from(lead: &Lead) -> Self {
        Self {
            name: lead.name.clone(),
            email: lead.email.clone(),
            company: lead.company.clone(),
            status: lead.status,
        }
    }
}

impl From<LeadEdit> for LeadUpdate {
    fn from(edit: LeadEdit) -> Self {
        Self {
            name: Some(edit.name),
            email: Some(edit.email),
            company: Some(edit.company),
            status: Some(edit.status),
        }
    }
}

/// Overrides applied when converting a lead. Missing values fall back to the lead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityDraft {
    pub name: Option<String>,
    pub stage: Option<String>,
    pub amount: Option<f64>,
    pub account_name: Option<String>,
}

/// Raw text of the conversion form as the user typed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityForm {
    pub name: String,
    pub stage: String,
    pub amount: String,
    pub account_name: String,
}

impl OpportunityForm {
    pub fn for_lead(lead: &Lead) -> Self {
        Self {
            name: lead.name.clone(),
            stage: OpportunityStage::Prospecting.as_str().to_string(),
            amount: String::new(),
            account_name: lead.company.clone(),
        }
    }

    /// Empty amount text means no amount; text that is not a number becomes NaN so
    /// validation rejects it.
    pub fn to_draft(&self) -> OpportunityDraft {
        let amount_text = self.amount.trim();
        let amount = if amount_text.is_empty() {
            None
        } else {
            Some(amount_text.parse::<f64>().unwrap_or(f64::NAN))
        };

        OpportunityDraft {
            name: Some(self.name.clone()),
            stage: Some(self.stage.clone()),
            amount,
            account_name: Some(self.account_name.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T, E: fmt::Display> From<Result<T, E>> for ResponseEnvelope<T> {
    fn from(value: Result<T, E>) -> Self {
        match value {
            Ok(data) => Self {
                success: true,
                data: Some(data),
                error: None,
            },
            Err(error) => Self {
                success: false,
                data: None,
                error: Some(error.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeCounts {
    pub leads: usize,
    pub opportunities: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsoleSettings {
    pub load_delay_ms: u64,
    pub update_delay_ms: u64,
    pub convert_delay_ms: u64,
    pub update_failure_rate: f64,
    pub convert_failure_rate: f64,
    pub seed_path: Option<String>,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            load_delay_ms: 800,
            update_delay_ms: 500,
            convert_delay_ms: 600,
            update_failure_rate: 0.10,
            convert_failure_rate: 0.05,
            seed_path: None,
        }
    }
}
