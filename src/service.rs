use crate::models::{ConsoleSettings, Lead, LeadId, LeadUpdate, Opportunity, OpportunityDraft, OpportunityStage};
use crate::seed::{parse_seed, SeedSource};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tokio::time::Duration;

pub const SIMULATED_UPDATE_ERROR: &str = "Simulated network error";
pub const SIMULATED_CONVERSION_ERROR: &str = "Simulated conversion error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceErrorKind {
    Load,
    Update,
    Convert,
}

/// Failure reported by the data-access layer. Displays as the bare user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub message: String,
}

impl ServiceError {
    pub fn new(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Echo of an accepted lead update: the id plus the fields that were sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedLead {
    pub id: LeadId,
    #[serde(flatten)]
    pub updates: LeadUpdate,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub load_delay: Duration,
    pub update_delay: Duration,
    pub convert_delay: Duration,
    pub update_failure_rate: f64,
    pub convert_failure_rate: f64,
    pub seed: SeedSource,
}

impl ServiceConfig {
    pub fn from_settings(settings: &ConsoleSettings) -> Self {
        Self {
            load_delay: Duration::from_millis(settings.load_delay_ms),
            update_delay: Duration::from_millis(settings.update_delay_ms),
            convert_delay: Duration::from_millis(settings.convert_delay_ms),
            update_failure_rate: settings.update_failure_rate.clamp(0.0, 1.0),
            convert_failure_rate: settings.convert_failure_rate.clamp(0.0, 1.0),
            seed: SeedSource::from_setting(settings.seed_path.as_deref()),
        }
    }

    /// No latency and no injected failures.
    pub fn instant(seed: SeedSource) -> Self {
        Self {
            load_delay: Duration::ZERO,
            update_delay: Duration::ZERO,
            convert_delay: Duration::ZERO,
            update_failure_rate: 0.0,
            convert_failure_rate: 0.0,
            seed,
        }
    }

    pub fn with_failure_rates(mut self, update: f64, convert: f64) -> Self {
        self.update_failure_rate = update.clamp(0.0, 1.0);
        self.convert_failure_rate = convert.clamp(0.0, 1.0);
        self
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_settings(&ConsoleSettings::default())
    }
}

/// Stand-in for a remote leads API: fixed latency, random failures, no backing store.
/// Nothing here retries; every failure goes back to the caller.
#[derive(Debug)]
pub struct MockLeadsService {
    config: ServiceConfig,
    rng: Mutex<StdRng>,
    last_opportunity_id: AtomicU64,
}

impl MockLeadsService {
    pub fn new(config: ServiceConfig) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    pub fn seeded(config: ServiceConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: ServiceConfig, rng: StdRng) -> Self {
        Self {
            config,
            rng: Mutex::new(rng),
            last_opportunity_id: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub async fn load_leads(&self) -> ServiceResult<Vec<Lead>> {
        simulate_latency(self.config.load_delay).await;

        let raw = self.config.seed.read().await.map_err(|error| {
            tracing::error!(error = %error, "error loading leads");
            ServiceError::new(ServiceErrorKind::Load, "Failed to load leads")
        })?;

        let leads = parse_seed(&raw).map_err(|message| {
            tracing::error!(error = %message, "error loading leads");
            ServiceError::new(ServiceErrorKind::Load, message)
        })?;

        tracing::debug!(count = leads.len(), "loaded seed leads");
        Ok(leads)
    }

    pub async fn update_lead(&self, lead_id: LeadId, updates: LeadUpdate) -> ServiceResult<UpdatedLead> {
        simulate_latency(self.config.update_delay).await;

        if self.should_fail(self.config.update_failure_rate) {
            tracing::warn!(lead_id, "error updating lead: {}", SIMULATED_UPDATE_ERROR);
            return Err(ServiceError::new(ServiceErrorKind::Update, SIMULATED_UPDATE_ERROR));
        }

        Ok(UpdatedLead { id: lead_id, updates })
    }

    pub async fn convert_to_opportunity(&self, lead: &Lead, draft: &OpportunityDraft) -> ServiceResult<Opportunity> {
        simulate_latency(self.config.convert_delay).await;

        if self.should_fail(self.config.convert_failure_rate) {
            tracing::warn!(lead_id = lead.id, "error converting lead: {}", SIMULATED_CONVERSION_ERROR);
            return Err(ServiceError::new(ServiceErrorKind::Convert, SIMULATED_CONVERSION_ERROR));
        }

        let stage = match non_blank(draft.stage.as_deref()) {
            None => OpportunityStage::default(),
            Some(raw) => OpportunityStage::parse(raw)
                .ok_or_else(|| ServiceError::new(ServiceErrorKind::Convert, format!("Unknown stage: {}", raw)))?,
        };

        let now = Utc::now();
        Ok(Opportunity {
            id: self.next_opportunity_id(now.timestamp_millis()),
            name: non_blank(draft.name.as_deref()).unwrap_or(lead.name.as_str()).to_string(),
            stage,
            amount: draft.amount.filter(|amount| amount.is_finite() && *amount >= 0.0),
            account_name: non_blank(draft.account_name.as_deref())
                .unwrap_or(lead.company.as_str())
                .to_string(),
            lead_id: lead.id,
            created_at: now,
        })
    }

    fn should_fail(&self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.random::<f64>() < rate
    }

    /// Ids come from the clock in milliseconds but never repeat within one service.
    fn next_opportunity_id(&self, now_millis: i64) -> u64 {
        let candidate = u64::try_from(now_millis).unwrap_or(0);
        let mut current = self.last_opportunity_id.load(Ordering::SeqCst);
        loop {
            let next = candidate.max(current + 1);
            match self
                .last_opportunity_id
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(observed) => current = observed,
            }
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

async fn simulate_latency(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
