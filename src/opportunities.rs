use crate::errors::AppResult;
use crate::models::{Lead, LeadId, Opportunity, OpportunityDraft};
use crate::service::MockLeadsService;
use crate::storage::Persistence;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct OpportunitiesState {
    opportunities: Vec<Opportunity>,
    loading: bool,
    error: Option<String>,
}

pub struct OpportunitiesController {
    state: RwLock<OpportunitiesState>,
    service: Arc<MockLeadsService>,
    persistence: Persistence,
}

impl OpportunitiesController {
    /// Hydrates from storage; a missing or unreadable entry starts an empty list.
    pub fn new(service: Arc<MockLeadsService>, persistence: Persistence) -> Self {
        let opportunities = persistence.load_opportunities();
        tracing::info!(count = opportunities.len(), "hydrated opportunities");

        Self {
            state: RwLock::new(OpportunitiesState {
                opportunities,
                ..OpportunitiesState::default()
            }),
            service,
            persistence,
        }
    }

    pub async fn opportunities(&self) -> Vec<Opportunity> {
        self.state.read().await.opportunities.clone()
    }

    pub async fn count(&self) -> usize {
        self.state.read().await.opportunities.len()
    }

    pub async fn opportunities_for_lead(&self, lead_id: LeadId) -> Vec<Opportunity> {
        let state = self.state.read().await;
        state
            .opportunities
            .iter()
            .filter(|opportunity| opportunity.lead_id == lead_id)
            .cloned()
            .collect()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.loading
    }

    pub async fn error(&self) -> Option<String> {
        self.state.read().await.error.clone()
    }

    pub async fn clear_error(&self) {
        self.state.write().await.error = None;
    }

    pub async fn convert_lead(&self, lead: &Lead, draft: &OpportunityDraft) -> AppResult<Opportunity> {
        {
            let mut state = self.state.write().await;
            state.loading = true;
            state.error = None;
        }

        let result = self.service.convert_to_opportunity(lead, draft).await;

        let mut state = self.state.write().await;
        state.loading = false;
        match result {
            Ok(opportunity) => {
                state.opportunities.push(opportunity.clone());
                self.persistence.save_opportunities(&state.opportunities);
                tracing::info!(
                    lead_id = lead.id,
                    opportunity_id = opportunity.id,
                    "lead converted to opportunity"
                );
                Ok(opportunity)
            }
            Err(error) => {
                state.error = Some(error.message.clone());
                Err(error.into())
            }
        }
    }
}
