use crate::errors::{AppError, AppResult};
use crate::leads::{LeadsController, LoadPhase};
use crate::models::{
    BadgeCounts, ConsoleSettings, Lead, LeadEdit, LeadFilters, LeadId, LeadSort, LeadUpdate, Opportunity,
    OpportunityForm,
};
use crate::opportunities::OpportunitiesController;
use crate::service::{MockLeadsService, ServiceConfig};
use crate::storage::{Persistence, SqliteStore};
use crate::validation::{validate_lead, validate_opportunity};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Result of a form submission from the detail panel or the conversion form.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum Submission<T> {
    Accepted { record: T },
    /// Rejected before anything was sent.
    Invalid { errors: BTreeMap<String, String> },
    Failed { error: String },
}

impl<T> Submission<T> {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Everything the two views render, read in one pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleSnapshot {
    pub phase: LoadPhase,
    pub filters: LeadFilters,
    pub sort: LeadSort,
    pub leads: Vec<Lead>,
    pub opportunities: Vec<Opportunity>,
    pub counts: BadgeCounts,
    pub selected_lead: Option<Lead>,
    pub conversion_error: Option<String>,
}

pub struct ConsoleCore {
    leads: LeadsController,
    opportunities: OpportunitiesController,
    persistence: Persistence,
    selected_lead: RwLock<Option<LeadId>>,
    data_dir: Option<PathBuf>,
}

impl ConsoleCore {
    pub fn new(data_dir: PathBuf) -> AppResult<Arc<Self>> {
        let store = SqliteStore::open(&data_dir.join("console.sqlite"))?;
        let persistence = Persistence::new(Arc::new(store));
        let settings = persistence.load_settings();
        let service = Arc::new(MockLeadsService::new(ServiceConfig::from_settings(&settings)));

        let mut core = Self::with_parts(service, persistence);
        core.data_dir = Some(data_dir);
        Ok(Arc::new(core))
    }

    pub fn with_parts(service: Arc<MockLeadsService>, persistence: Persistence) -> Self {
        Self {
            leads: LeadsController::new(service.clone(), persistence.clone()),
            opportunities: OpportunitiesController::new(service, persistence.clone()),
            persistence,
            selected_lead: RwLock::new(None),
            data_dir: None,
        }
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    pub fn leads(&self) -> &LeadsController {
        &self.leads
    }

    pub fn opportunities(&self) -> &OpportunitiesController {
        &self.opportunities
    }

    pub async fn start(&self) -> LoadPhase {
        self.leads.initialize().await
    }

    pub async fn retry_load(&self) -> LoadPhase {
        *self.selected_lead.write().await = None;
        self.leads.reload().await
    }

    pub async fn badge_counts(&self) -> BadgeCounts {
        BadgeCounts {
            leads: self.leads.visible_count().await,
            opportunities: self.opportunities.count().await,
        }
    }

    pub async fn snapshot(&self) -> ConsoleSnapshot {
        ConsoleSnapshot {
            phase: self.leads.phase().await,
            filters: self.leads.filters().await,
            sort: self.leads.sort().await,
            leads: self.leads.visible_leads().await,
            opportunities: self.opportunities.opportunities().await,
            counts: self.badge_counts().await,
            selected_lead: self.selected_lead().await,
            conversion_error: self.opportunities.error().await,
        }
    }

    pub async fn select_lead(&self, lead_id: LeadId) -> AppResult<Lead> {
        let lead = self
            .leads
            .lead(lead_id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", lead_id)))?;
        *self.selected_lead.write().await = Some(lead_id);
        Ok(lead)
    }

    /// The selected lead as it currently stands in the canonical list.
    pub async fn selected_lead(&self) -> Option<Lead> {
        let selected = *self.selected_lead.read().await;
        match selected {
            Some(lead_id) => self.leads.lead(lead_id).await,
            None => None,
        }
    }

    pub async fn close_detail(&self) {
        *self.selected_lead.write().await = None;
    }

    pub async fn save_lead(&self, lead_id: LeadId, edit: LeadEdit) -> Submission<Lead> {
        let validation = validate_lead(&edit);
        if !validation.is_valid {
            return Submission::Invalid {
                errors: validation.errors,
            };
        }

        match self.leads.update_lead_data(lead_id, LeadUpdate::from(edit)).await {
            Ok(record) => Submission::Accepted { record },
            Err(error) => Submission::Failed {
                error: client_message(error),
            },
        }
    }

    pub async fn conversion_form(&self, lead_id: LeadId) -> AppResult<OpportunityForm> {
        let lead = self
            .leads
            .lead(lead_id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", lead_id)))?;
        Ok(OpportunityForm::for_lead(&lead))
    }

    pub async fn convert_lead(&self, lead_id: LeadId, form: OpportunityForm) -> Submission<Opportunity> {
        let draft = form.to_draft();
        let validation = validate_opportunity(&draft);
        if !validation.is_valid {
            return Submission::Invalid {
                errors: validation.errors,
            };
        }

        let Some(lead) = self.leads.lead(lead_id).await else {
            return Submission::Failed {
                error: format!("Lead {} not found", lead_id),
            };
        };

        match self.opportunities.convert_lead(&lead, &draft).await {
            Ok(record) => {
                self.close_detail().await;
                Submission::Accepted { record }
            }
            Err(error) => Submission::Failed {
                error: client_message(error),
            },
        }
    }

    pub fn settings(&self) -> ConsoleSettings {
        self.persistence.load_settings()
    }

    /// Stored settings apply the next time a console is built.
    pub fn update_settings(&self, update: serde_json::Value) -> AppResult<ConsoleSettings> {
        self.persistence.update_settings(update)
    }
}

/// Service failures carry their message verbatim; everything else keeps its error code.
fn client_message(error: AppError) -> String {
    match error {
        AppError::Service(message) => message,
        other => other.to_string(),
    }
}
