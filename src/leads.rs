use crate::errors::{AppError, AppResult};
use crate::models::{FilterUpdate, Lead, LeadFilters, LeadId, LeadSort, LeadUpdate, SortDirection, SortField};
use crate::service::MockLeadsService;
use crate::storage::Persistence;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "error", rename_all = "kebab-case")]
pub enum LoadPhase {
    Uninitialized,
    Loading,
    Loaded,
    LoadFailed(String),
}

#[derive(Debug)]
struct LeadsState {
    phase: LoadPhase,
    leads: Vec<Lead>,
    filters: LeadFilters,
    sort: LeadSort,
}

/// Owns the canonical lead list plus the filter and sort configuration. The visible list is
/// never stored; it is derived from those three on every read.
pub struct LeadsController {
    state: RwLock<LeadsState>,
    service: Arc<MockLeadsService>,
    persistence: Persistence,
}

impl LeadsController {
    pub fn new(service: Arc<MockLeadsService>, persistence: Persistence) -> Self {
        let state = LeadsState {
            phase: LoadPhase::Uninitialized,
            leads: Vec::new(),
            filters: persistence.load_filters(),
            sort: persistence.load_sort(),
        };

        Self {
            state: RwLock::new(state),
            service,
            persistence,
        }
    }

    /// First load. Does nothing once a load has been started.
    pub async fn initialize(&self) -> LoadPhase {
        {
            let state = self.state.read().await;
            if state.phase != LoadPhase::Uninitialized {
                return state.phase.clone();
            }
        }
        self.load().await
    }

    /// User-initiated retry: drops the current list and runs the whole load again.
    pub async fn reload(&self) -> LoadPhase {
        self.load().await
    }

    async fn load(&self) -> LoadPhase {
        {
            let mut state = self.state.write().await;
            state.phase = LoadPhase::Loading;
            state.leads.clear();
        }
        tracing::info!("loading leads");

        let result = self.service.load_leads().await;

        let mut state = self.state.write().await;
        let phase = match result {
            Ok(leads) => {
                tracing::info!(count = leads.len(), "leads loaded");
                state.leads = leads;
                LoadPhase::Loaded
            }
            Err(error) => {
                tracing::warn!(error = %error, "leads failed to load");
                LoadPhase::LoadFailed(error.message)
            }
        };
        state.phase = phase.clone();
        phase
    }

    pub async fn phase(&self) -> LoadPhase {
        self.state.read().await.phase.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.phase == LoadPhase::Loading
    }

    pub async fn error(&self) -> Option<String> {
        match &self.state.read().await.phase {
            LoadPhase::LoadFailed(message) => Some(message.clone()),
            _ => None,
        }
    }

    pub async fn all_leads(&self) -> Vec<Lead> {
        self.state.read().await.leads.clone()
    }

    pub async fn lead(&self, lead_id: LeadId) -> Option<Lead> {
        let state = self.state.read().await;
        state.leads.iter().find(|lead| lead.id == lead_id).cloned()
    }

    pub async fn visible_leads(&self) -> Vec<Lead> {
        let state = self.state.read().await;
        derive_visible(&state.leads, &state.filters, &state.sort)
    }

    pub async fn visible_count(&self) -> usize {
        let state = self.state.read().await;
        state
            .leads
            .iter()
            .filter(|lead| matches_filters(lead, &state.filters))
            .count()
    }

    pub async fn filters(&self) -> LeadFilters {
        self.state.read().await.filters.clone()
    }

    pub async fn sort(&self) -> LeadSort {
        self.state.read().await.sort
    }

    pub async fn update_filters(&self, update: FilterUpdate) -> LeadFilters {
        let mut state = self.state.write().await;
        state.filters = state.filters.merged(update);
        self.persistence.save_filters(&state.filters);
        state.filters.clone()
    }

    pub async fn update_sort(&self, sort: LeadSort) -> LeadSort {
        let mut state = self.state.write().await;
        state.sort = sort;
        self.persistence.save_sort(&sort);
        sort
    }

    pub async fn toggle_sort_direction(&self) -> LeadSort {
        let mut state = self.state.write().await;
        state.sort = state.sort.with_direction_toggled();
        self.persistence.save_sort(&state.sort);
        state.sort
    }

    /// Sends the update and merges it locally once the service accepts it. Overlapping
    /// updates to one lead are not serialized; whichever response arrives last wins.
    pub async fn update_lead_data(&self, lead_id: LeadId, updates: LeadUpdate) -> AppResult<Lead> {
        if self.lead(lead_id).await.is_none() {
            return Err(AppError::NotFound(format!("Lead {} not found", lead_id)));
        }

        let accepted = self.service.update_lead(lead_id, updates).await?;

        let mut state = self.state.write().await;
        let Some(lead) = state.leads.iter_mut().find(|lead| lead.id == accepted.id) else {
            return Err(AppError::NotFound(format!("Lead {} not found", lead_id)));
        };
        accepted.updates.apply_to(lead);
        tracing::info!(lead_id, "lead updated");
        Ok(lead.clone())
    }
}

fn matches_filters(lead: &Lead, filters: &LeadFilters) -> bool {
    let matches_search = if filters.search.is_empty() {
        true
    } else {
        let term = filters.search.to_lowercase();
        lead.name.to_lowercase().contains(&term) || lead.company.to_lowercase().contains(&term)
    };
    matches_search && filters.status.matches(lead.status)
}

fn compare_field(a: &Lead, b: &Lead, field: SortField) -> Ordering {
    match field {
        SortField::Id => a.id.cmp(&b.id),
        SortField::Name => a.name.cmp(&b.name),
        SortField::Company => a.company.cmp(&b.company),
        SortField::Email => a.email.cmp(&b.email),
        SortField::Status => a.status.as_str().cmp(b.status.as_str()),
        SortField::Source => a.source.cmp(&b.source),
        SortField::Score => a.score.cmp(&b.score),
    }
}

/// Filter then sort. Equal keys fall back to the lead id in the same direction, so the
/// order is total and independent of the canonical list's order.
pub fn derive_visible(leads: &[Lead], filters: &LeadFilters, sort: &LeadSort) -> Vec<Lead> {
    let mut visible: Vec<Lead> = leads
        .iter()
        .filter(|lead| matches_filters(lead, filters))
        .cloned()
        .collect();

    visible.sort_by(|a, b| {
        let ordering = compare_field(a, b, sort.field).then_with(|| a.id.cmp(&b.id));
        match sort.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });

    tracing::debug!(total = leads.len(), visible = visible.len(), "derived visible leads");
    visible
}

#[cfg(test)]
mod tests {
    use super::{derive_visible, LeadsController, LoadPhase};
    use crate::errors::AppError;
    use crate::models::{
        FilterUpdate, Lead, LeadFilters, LeadSort, LeadStatus, LeadUpdate, SortDirection, SortField, StatusFilter,
    };
    use crate::seed::SeedSource;
    use crate::service::{MockLeadsService, ServiceConfig, SIMULATED_UPDATE_ERROR};
    use crate::storage::Persistence;
    use std::sync::Arc;
    use std::time::Duration;

    fn lead(id: u64, name: &str, company: &str, status: LeadStatus, score: u8) -> Lead {
        Lead {
            id,
            name: name.to_string(),
            company: company.to_string(),
            email: format!("lead{}@example.com", id),
            status,
            source: "Website".to_string(),
            score,
        }
    }

    fn sample() -> Vec<Lead> {
        vec![
            lead(1, "Ana Souza", "Nimbus", LeadStatus::New, 50),
            lead(2, "Bruno Lima", "Orbital", LeadStatus::Contacted, 90),
            lead(3, "Carla Mendes", "nimbus labs", LeadStatus::Qualified, 70),
        ]
    }

    fn seed_json() -> String {
        serde_json::to_string(&sample()).expect("json")
    }

    fn controller_with(config: ServiceConfig, persistence: Persistence) -> LeadsController {
        LeadsController::new(Arc::new(MockLeadsService::seeded(config, 3)), persistence)
    }

    fn sort(field: SortField, direction: SortDirection) -> LeadSort {
        LeadSort { field, direction }
    }

    fn scores(leads: &[Lead]) -> Vec<u8> {
        leads.iter().map(|lead| lead.score).collect()
    }

    #[test]
    fn sorts_scores_in_both_directions() {
        let filters = LeadFilters::default();
        let asc = derive_visible(&sample(), &filters, &sort(SortField::Score, SortDirection::Asc));
        assert_eq!(scores(&asc), vec![50, 70, 90]);
        let desc = derive_visible(&sample(), &filters, &sort(SortField::Score, SortDirection::Desc));
        assert_eq!(scores(&desc), vec![90, 70, 50]);
    }

    #[test]
    fn search_is_case_insensitive_over_name_or_company() {
        let filters = LeadFilters {
            search: "NIMBUS".to_string(),
            status: StatusFilter::All,
        };
        let visible = derive_visible(&sample(), &filters, &LeadSort::default());
        let ids: Vec<u64> = visible.iter().map(|lead| lead.id).collect();
        assert_eq!(ids, vec![3, 1]);

        let by_name = LeadFilters {
            search: "bruno".to_string(),
            status: StatusFilter::All,
        };
        assert_eq!(derive_visible(&sample(), &by_name, &LeadSort::default()).len(), 1);
    }

    #[test]
    fn empty_search_and_all_status_keep_everything() {
        let visible = derive_visible(&sample(), &LeadFilters::default(), &LeadSort::default());
        assert_eq!(visible.len(), 3);
    }

    #[test]
    fn status_filter_keeps_exact_matches() {
        let filters = LeadFilters {
            search: String::new(),
            status: StatusFilter::Only(LeadStatus::Contacted),
        };
        let visible = derive_visible(&sample(), &filters, &LeadSort::default());
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].status, LeadStatus::Contacted);
    }

    #[test]
    fn ties_break_on_id_and_ignore_input_order() {
        let mut leads = vec![
            lead(9, "Zed", "Same", LeadStatus::New, 80),
            lead(4, "Amy", "Same", LeadStatus::New, 80),
            lead(6, "Bob", "Same", LeadStatus::New, 80),
        ];
        let by_company = sort(SortField::Company, SortDirection::Asc);
        let first = derive_visible(&leads, &LeadFilters::default(), &by_company);
        leads.reverse();
        let second = derive_visible(&leads, &LeadFilters::default(), &by_company);

        let ids: Vec<u64> = first.iter().map(|lead| lead.id).collect();
        assert_eq!(ids, vec![4, 6, 9]);
        assert_eq!(first, second);
    }

    #[test]
    fn status_sorts_by_name() {
        let visible = derive_visible(
            &sample(),
            &LeadFilters::default(),
            &sort(SortField::Status, SortDirection::Asc),
        );
        let statuses: Vec<LeadStatus> = visible.iter().map(|lead| lead.status).collect();
        assert_eq!(
            statuses,
            vec![LeadStatus::Contacted, LeadStatus::New, LeadStatus::Qualified]
        );
    }

    #[tokio::test]
    async fn initialize_loads_and_derives() {
        let controller = controller_with(
            ServiceConfig::instant(SeedSource::Inline(seed_json())),
            Persistence::in_memory(),
        );
        assert_eq!(controller.phase().await, LoadPhase::Uninitialized);
        assert_eq!(controller.initialize().await, LoadPhase::Loaded);
        assert_eq!(controller.all_leads().await.len(), 3);
        assert_eq!(scores(&controller.visible_leads().await), vec![90, 70, 50]);
        assert_eq!(controller.visible_count().await, 3);
        assert_eq!(controller.error().await, None);
    }

    #[tokio::test]
    async fn load_failure_is_captured_and_reload_retries() {
        let controller = controller_with(
            ServiceConfig::instant(SeedSource::Inline("oops".to_string())),
            Persistence::in_memory(),
        );
        let phase = controller.initialize().await;
        assert!(matches!(phase, LoadPhase::LoadFailed(_)));
        assert!(controller.error().await.is_some());
        assert!(controller.all_leads().await.is_empty());

        // initialize is a one-shot; reload always runs again
        assert_eq!(controller.initialize().await, phase);
        assert!(matches!(controller.reload().await, LoadPhase::LoadFailed(_)));
    }

    #[tokio::test]
    async fn filters_and_sort_are_persisted() {
        let persistence = Persistence::in_memory();
        let controller = controller_with(
            ServiceConfig::instant(SeedSource::Inline(seed_json())),
            persistence.clone(),
        );
        controller.initialize().await;

        controller
            .update_filters(FilterUpdate {
                search: Some("nimbus".to_string()),
                status: None,
            })
            .await;
        let filters = controller
            .update_filters(FilterUpdate {
                search: None,
                status: Some(StatusFilter::Only(LeadStatus::New)),
            })
            .await;
        assert_eq!(filters.search, "nimbus");
        assert_eq!(persistence.load_filters(), filters);

        let sorted = controller.update_sort(sort(SortField::Name, SortDirection::Asc)).await;
        assert_eq!(persistence.load_sort(), sorted);
        assert_eq!(controller.toggle_sort_direction().await.direction, SortDirection::Desc);

        let visible = controller.visible_leads().await;
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, 1);

        let restored = controller_with(ServiceConfig::instant(SeedSource::Bundled), persistence);
        assert_eq!(restored.filters().await, filters);
        assert_eq!(restored.sort().await.field, SortField::Name);
    }

    #[tokio::test]
    async fn successful_update_merges_only_given_fields() {
        let controller = controller_with(
            ServiceConfig::instant(SeedSource::Inline(seed_json())),
            Persistence::in_memory(),
        );
        controller.initialize().await;

        let updated = controller
            .update_lead_data(
                2,
                LeadUpdate {
                    status: Some(LeadStatus::Qualified),
                    email: Some("bruno@orbital.io".to_string()),
                    ..LeadUpdate::default()
                },
            )
            .await
            .expect("update");
        assert_eq!(updated.status, LeadStatus::Qualified);
        assert_eq!(updated.email, "bruno@orbital.io");
        assert_eq!(updated.name, "Bruno Lima");
        assert_eq!(updated.score, 90);
        assert_eq!(controller.lead(2).await, Some(updated));
    }

    #[tokio::test]
    async fn failed_update_leaves_leads_untouched() {
        let controller = controller_with(
            ServiceConfig::instant(SeedSource::Inline(seed_json())).with_failure_rates(1.0, 0.0),
            Persistence::in_memory(),
        );
        controller.initialize().await;
        let before = serde_json::to_vec(&controller.all_leads().await).expect("json");

        let err = controller
            .update_lead_data(
                1,
                LeadUpdate {
                    name: Some("Changed".to_string()),
                    ..LeadUpdate::default()
                },
            )
            .await
            .expect_err("update fails");
        assert!(matches!(err, AppError::Service(ref message) if message == SIMULATED_UPDATE_ERROR));

        let after = serde_json::to_vec(&controller.all_leads().await).expect("json");
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn unknown_lead_is_not_dispatched() {
        let controller = controller_with(
            ServiceConfig::instant(SeedSource::Inline(seed_json())),
            Persistence::in_memory(),
        );
        controller.initialize().await;
        let err = controller
            .update_lead_data(404, LeadUpdate::default())
            .await
            .expect_err("missing lead");
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn failed_reload_drops_previous_leads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let seed_path = dir.path().join("leads.json");
        std::fs::write(&seed_path, seed_json()).expect("write seed");

        let controller = controller_with(
            ServiceConfig::instant(SeedSource::File(seed_path.clone())),
            Persistence::in_memory(),
        );
        assert_eq!(controller.initialize().await, LoadPhase::Loaded);
        assert_eq!(controller.visible_count().await, 3);

        std::fs::remove_file(&seed_path).expect("remove seed");
        assert_eq!(
            controller.reload().await,
            LoadPhase::LoadFailed("Failed to load leads".to_string())
        );
        assert!(controller.all_leads().await.is_empty());
        assert!(controller.visible_leads().await.is_empty());
        assert_eq!(controller.visible_count().await, 0);
        assert_eq!(controller.lead(1).await, None);
    }

    #[tokio::test]
    async fn overlapping_updates_keep_the_last_response() {
        let mut config = ServiceConfig::instant(SeedSource::Inline(seed_json()));
        config.update_delay = Duration::from_millis(40);
        let controller = controller_with(config, Persistence::in_memory());
        controller.initialize().await;

        let rename = |name: &str| LeadUpdate {
            name: Some(name.to_string()),
            ..LeadUpdate::default()
        };
        let (first, second) = tokio::join!(controller.update_lead_data(1, rename("First")), async {
            tokio::time::sleep(Duration::from_millis(15)).await;
            controller.update_lead_data(1, rename("Second")).await
        });

        assert_eq!(first.expect("first update").name, "First");
        assert_eq!(second.expect("second update").name, "Second");
        let stored = controller.lead(1).await.expect("lead");
        assert_eq!(stored.name, "Second");
        assert_eq!(stored.company, "Nimbus");
    }

    #[tokio::test]
    async fn concurrent_toggles_both_apply() {
        let persistence = Persistence::in_memory();
        let controller = controller_with(ServiceConfig::instant(SeedSource::Inline(seed_json())), persistence.clone());
        assert_eq!(controller.sort().await.direction, SortDirection::Desc);

        let (a, b) = tokio::join!(controller.toggle_sort_direction(), controller.toggle_sort_direction());
        assert_ne!(a.direction, b.direction);
        assert_eq!(controller.sort().await.direction, SortDirection::Desc);
        assert_eq!(persistence.load_sort().direction, SortDirection::Desc);
    }
}
