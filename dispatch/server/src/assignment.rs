use crate::db::schema::ReportStatus;
use crate::db::Database;
use crate::error::DispatchError;
use crate::index::{AssignmentIndex, MemoryIndex};
use crate::notify::{DispatchEvent, Notifier};
use std::collections::HashSet;
use tracing::info;

/// Registers a volunteer in the store and seeds the ranking index.
pub async fn register_volunteer(
    db: &Database,
    index: &MemoryIndex,
    name: &str,
) -> Result<i64, DispatchError> {
    if name.trim().is_empty() {
        return Err(DispatchError::Validation(
            "volunteer name must not be empty".to_string(),
        ));
    }
    let volunteer_id = db.create_volunteer(name).await?;
    index.register_volunteer(volunteer_id).await;
    info!("registered volunteer {} ({})", volunteer_id, name);
    Ok(volunteer_id)
}

/// Distributes a pending report to the `count` least-loaded volunteers.
/// The reporter and volunteers with any prior assignment row on the
/// report are excluded; selection approximates round-robin fairness via
/// the live ranking, not a fixed rotation.
pub async fn assign_report(
    db: &Database,
    index: &MemoryIndex,
    notifier: &Notifier,
    report_id: i64,
    count: usize,
) -> Result<Vec<i64>, DispatchError> {
    let report = db
        .get_report(report_id)
        .await?
        .ok_or(DispatchError::NotFound("report", report_id))?;
    if report.status != ReportStatus::Pending {
        return Err(DispatchError::AlreadyFinalized(report_id));
    }

    let mut excluded: HashSet<i64> = db.assigned_volunteers(report_id).await?.into_iter().collect();
    excluded.insert(report.reported_by);

    // over-fetch so exclusions cannot starve the selection
    let candidates = index.select_least_loaded(count + excluded.len()).await;
    let selected: Vec<i64> = candidates
        .into_iter()
        .filter(|id| !excluded.contains(id))
        .take(count)
        .collect();
    if selected.is_empty() {
        return Err(DispatchError::Validation(
            "no volunteers available for assignment".to_string(),
        ));
    }

    // primary write first; the index update is the best-effort projection
    db.create_assignments(report_id, &selected).await?;
    index.assign(report_id, &selected).await;
    notifier.publish(DispatchEvent::AssignmentsCreated {
        report_id,
        volunteer_ids: selected.clone(),
    });
    info!(
        "assigned report {} to {} volunteers",
        report_id,
        selected.len()
    );
    Ok(selected)
}
