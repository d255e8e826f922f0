pub mod console;
pub mod errors;
pub mod leads;
pub mod models;
pub mod opportunities;
pub mod seed;
pub mod service;
pub mod storage;
pub mod validation;

use crate::console::{ConsoleCore, ConsoleSnapshot, Submission};
use crate::leads::LoadPhase;
use crate::models::{
    BadgeCounts, ConsoleSettings, FilterUpdate, Lead, LeadEdit, LeadFilters, LeadId, LeadSort, Opportunity,
    OpportunityForm, ResponseEnvelope,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

#[derive(Clone)]
pub struct AppState {
    pub console: Arc<ConsoleCore>,
}

impl AppState {
    pub fn open(data_dir: PathBuf) -> Result<Self, String> {
        let console = ConsoleCore::new(data_dir).map_err(to_client_error)?;
        Ok(Self { console })
    }
}

pub async fn start_console(state: &AppState) -> Result<LoadPhase, String> {
    Ok(state.console.start().await)
}

/// Starts the console and reports the first view, or the load error in its place.
pub async fn startup_view(state: &AppState) -> ResponseEnvelope<ConsoleSnapshot> {
    let result: Result<ConsoleSnapshot, String> = match state.console.start().await {
        LoadPhase::LoadFailed(message) => Err(message),
        _ => Ok(state.console.snapshot().await),
    };
    result.into()
}

pub async fn retry_load(state: &AppState) -> Result<LoadPhase, String> {
    Ok(state.console.retry_load().await)
}

pub async fn console_snapshot(state: &AppState) -> Result<ConsoleSnapshot, String> {
    Ok(state.console.snapshot().await)
}

pub async fn list_leads(state: &AppState) -> Result<Vec<Lead>, String> {
    Ok(state.console.leads().visible_leads().await)
}

pub async fn update_filters(state: &AppState, update: FilterUpdate) -> Result<LeadFilters, String> {
    Ok(state.console.leads().update_filters(update).await)
}

pub async fn update_sort(state: &AppState, sort: LeadSort) -> Result<LeadSort, String> {
    Ok(state.console.leads().update_sort(sort).await)
}

pub async fn toggle_sort_direction(state: &AppState) -> Result<LeadSort, String> {
    Ok(state.console.leads().toggle_sort_direction().await)
}

pub async fn select_lead(state: &AppState, lead_id: LeadId) -> Result<Lead, String> {
    state.console.select_lead(lead_id).await.map_err(to_client_error)
}

pub async fn close_detail(state: &AppState) -> Result<(), String> {
    state.console.close_detail().await;
    Ok(())
}

pub async fn save_lead(state: &AppState, lead_id: LeadId, edit: LeadEdit) -> Result<Submission<Lead>, String> {
    Ok(state.console.save_lead(lead_id, edit).await)
}

pub async fn conversion_form(state: &AppState, lead_id: LeadId) -> Result<OpportunityForm, String> {
    state.console.conversion_form(lead_id).await.map_err(to_client_error)
}

pub async fn convert_lead(
    state: &AppState,
    lead_id: LeadId,
    form: OpportunityForm,
) -> Result<Submission<Opportunity>, String> {
    Ok(state.console.convert_lead(lead_id, form).await)
}

pub async fn list_opportunities(state: &AppState) -> Result<Vec<Opportunity>, String> {
    Ok(state.console.opportunities().opportunities().await)
}

pub async fn clear_conversion_error(state: &AppState) -> Result<(), String> {
    state.console.opportunities().clear_error().await;
    Ok(())
}

pub async fn badge_counts(state: &AppState) -> Result<BadgeCounts, String> {
    Ok(state.console.badge_counts().await)
}

pub fn get_settings(state: &AppState) -> Result<ConsoleSettings, String> {
    Ok(state.console.settings())
}

pub fn update_settings(state: &AppState, update: serde_json::Value) -> Result<ConsoleSettings, String> {
    state.console.update_settings(update).map_err(to_client_error)
}

/// Opens the console in `data_dir`, loads leads and prints the startup view as JSON.
pub async fn run(data_dir: PathBuf) -> Result<(), String> {
    std::fs::create_dir_all(&data_dir).map_err(|error| error.to_string())?;
    init_tracing(&data_dir)?;

    let state = AppState::open(data_dir)?;
    let view = startup_view(&state).await;
    match &view.error {
        Some(message) => tracing::warn!(error = %message, "console started without leads"),
        None => tracing::info!("console started"),
    }

    let rendered = serde_json::to_string_pretty(&view).map_err(to_client_error)?;
    println!("{}", rendered);
    Ok(())
}

fn init_tracing(data_dir: &Path) -> Result<(), String> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "console.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}

fn to_client_error(error: impl std::fmt::Display) -> String {
    error.to_string()
}
