use crate::db::Database;
use crate::error::DispatchError;
use std::collections::{BTreeSet, HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;

/// Secondary ranking/membership index over volunteers and their active
/// report assignments. It is an eventually-consistent projection of the
/// store: writes land here after the primary transaction commits, and
/// [`reconcile`] can re-derive the whole state at any time.
#[allow(async_fn_in_trait)]
pub trait AssignmentIndex {
    async fn register_volunteer(&self, volunteer_id: i64);
    async fn select_least_loaded(&self, k: usize) -> Vec<i64>;
    async fn assign(&self, report_id: i64, volunteer_ids: &[i64]);
    async fn is_assigned(&self, report_id: i64, volunteer_id: i64) -> bool;
    async fn complete_assignment(&self, report_id: i64, volunteer_id: i64);
    async fn expire_report(&self, report_id: i64) -> Vec<i64>;
    async fn rebuild(&self, volunteers: &[i64], active_pairs: &[(i64, i64)]) -> IndexSummary;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSummary {
    pub volunteers: usize,
    pub active_assignments: usize,
}

#[derive(Default)]
struct IndexState {
    // (score, volunteer_id) gives the deterministic selection order:
    // lowest score first, then lowest id.
    ranking: BTreeSet<(i64, i64)>,
    scores: HashMap<i64, i64>,
    report_members: HashMap<i64, HashSet<i64>>,
    volunteer_reports: HashMap<i64, HashSet<i64>>,
}

impl IndexState {
    fn bump_score(&mut self, volunteer_id: i64, delta: i64) {
        let score = self.scores.entry(volunteer_id).or_insert(0);
        self.ranking.remove(&(*score, volunteer_id));
        *score = (*score + delta).max(0);
        self.ranking.insert((*score, volunteer_id));
    }

    fn resolve(&mut self, report_id: i64, volunteer_id: i64) -> bool {
        let removed = self
            .report_members
            .get_mut(&report_id)
            .is_some_and(|members| members.remove(&volunteer_id));
        if removed {
            if let Some(reports) = self.volunteer_reports.get_mut(&volunteer_id) {
                reports.remove(&report_id);
            }
            self.bump_score(volunteer_id, -1);
        }
        removed
    }
}

/// In-memory implementation backed by an ordered set, the shape any
/// key-value ranking store would take.
#[derive(Default)]
pub struct MemoryIndex {
    state: RwLock<IndexState>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AssignmentIndex for MemoryIndex {
    async fn register_volunteer(&self, volunteer_id: i64) {
        let mut state = self.state.write().await;
        if !state.scores.contains_key(&volunteer_id) {
            state.scores.insert(volunteer_id, 0);
            state.ranking.insert((0, volunteer_id));
        }
    }

    async fn select_least_loaded(&self, k: usize) -> Vec<i64> {
        let state = self.state.read().await;
        state.ranking.iter().take(k).map(|&(_, id)| id).collect()
    }

    async fn assign(&self, report_id: i64, volunteer_ids: &[i64]) {
        let mut state = self.state.write().await;
        for &volunteer_id in volunteer_ids {
            let newly_added = state
                .report_members
                .entry(report_id)
                .or_default()
                .insert(volunteer_id);
            if newly_added {
                state
                    .volunteer_reports
                    .entry(volunteer_id)
                    .or_default()
                    .insert(report_id);
                state.bump_score(volunteer_id, 1);
            }
        }
    }

    async fn is_assigned(&self, report_id: i64, volunteer_id: i64) -> bool {
        let state = self.state.read().await;
        state
            .report_members
            .get(&report_id)
            .is_some_and(|members| members.contains(&volunteer_id))
    }

    async fn complete_assignment(&self, report_id: i64, volunteer_id: i64) {
        let mut state = self.state.write().await;
        state.resolve(report_id, volunteer_id);
    }

    async fn expire_report(&self, report_id: i64) -> Vec<i64> {
        let mut state = self.state.write().await;
        let members: Vec<i64> = state
            .report_members
            .get(&report_id)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default();
        let mut expired: Vec<i64> = members
            .into_iter()
            .filter(|&volunteer_id| state.resolve(report_id, volunteer_id))
            .collect();
        expired.sort_unstable();
        state.report_members.remove(&report_id);
        expired
    }

    async fn rebuild(&self, volunteers: &[i64], active_pairs: &[(i64, i64)]) -> IndexSummary {
        let mut fresh = IndexState::default();
        for &volunteer_id in volunteers {
            fresh.scores.insert(volunteer_id, 0);
            fresh.ranking.insert((0, volunteer_id));
        }
        for &(report_id, volunteer_id) in active_pairs {
            let newly_added = fresh
                .report_members
                .entry(report_id)
                .or_default()
                .insert(volunteer_id);
            if newly_added {
                fresh
                    .volunteer_reports
                    .entry(volunteer_id)
                    .or_default()
                    .insert(report_id);
                fresh.bump_score(volunteer_id, 1);
            }
        }
        let summary = IndexSummary {
            volunteers: fresh.scores.len(),
            active_assignments: active_pairs.len(),
        };
        *self.state.write().await = fresh;
        summary
    }
}

/// Re-derive the entire index from the store. Idempotent, safe at any
/// time, a no-op when the index already agrees with the store.
pub async fn reconcile(
    db: &Database,
    index: &impl AssignmentIndex,
) -> Result<IndexSummary, DispatchError> {
    let volunteers = db.volunteer_ids().await?;
    let active_pairs = db.active_assignment_pairs().await?;
    let summary = index.rebuild(&volunteers, &active_pairs).await;
    debug!(
        "index reconciled: {} volunteers, {} active assignments",
        summary.volunteers, summary.active_assignments
    );
    Ok(summary)
}
