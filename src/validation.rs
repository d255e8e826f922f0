use crate::models::{LeadEdit, OpportunityDraft, OpportunityStage};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: BTreeMap<String, String>,
}

impl ValidationResult {
    fn from_errors(errors: BTreeMap<String, String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    pub fn error(&self, field: &str) -> Option<&str> {
        self.errors.get(field).map(String::as_str)
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

pub fn validate_lead(lead: &LeadEdit) -> ValidationResult {
    let mut errors = BTreeMap::new();

    if is_blank(&lead.name) {
        errors.insert("name".to_string(), "Name is required".to_string());
    }

    if is_blank(&lead.email) {
        errors.insert("email".to_string(), "Email is required".to_string());
    } else if !is_valid_email(&lead.email) {
        errors.insert("email".to_string(), "Invalid email format".to_string());
    }

    if is_blank(&lead.company) {
        errors.insert("company".to_string(), "Company is required".to_string());
    }

    ValidationResult::from_errors(errors)
}

pub fn validate_opportunity(draft: &OpportunityDraft) -> ValidationResult {
    let mut errors = BTreeMap::new();

    if draft.name.as_deref().map_or(true, is_blank) {
        errors.insert("name".to_string(), "Name is required".to_string());
    }

    match draft.stage.as_deref() {
        stage if stage.map_or(true, is_blank) => {
            errors.insert("stage".to_string(), "Stage is required".to_string());
        }
        Some(stage) if OpportunityStage::parse(stage).is_none() => {
            errors.insert("stage".to_string(), "Invalid stage".to_string());
        }
        _ => {}
    }

    // Zero is allowed; only NaN, infinities and negatives are rejected.
    if let Some(amount) = draft.amount {
        if !amount.is_finite() || amount < 0.0 {
            errors.insert("amount".to_string(), "Amount must be a positive number".to_string());
        }
    }

    ValidationResult::from_errors(errors)
}
