use crate::db::schema::{AuthorityLoad, Report, Task, TaskPriority, TaskStatus};
use crate::db::{Database, TASK_COLUMNS};
use crate::error::DispatchError;
use crate::notify::{DispatchEvent, Notifier};
use chrono::{Duration, Utc};
use routing::geo::Point;
use routing::route::{classify_priority, Priority};
use routing::score::{best_candidate, Candidate, ReportSite};
use std::collections::HashMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct RouterConfig {
    /// Daily task capacity assumed for authorities without a declared one.
    pub default_daily_capacity: i64,
}

/// Scores candidate authorities for a verified report and creates the
/// downstream collection task.
#[derive(Clone)]
pub struct AuthorityRouter {
    db: Database,
    notifier: Notifier,
    config: RouterConfig,
}

impl AuthorityRouter {
    pub fn new(db: Database, notifier: Notifier, config: RouterConfig) -> Self {
        Self {
            db,
            notifier,
            config,
        }
    }

    /// Creates exactly one task for the report, assigned to the best
    /// authority when one qualifies, otherwise left unassigned.
    pub async fn route_report(&self, report: &Report) -> Result<Task, DispatchError> {
        let site = ReportSite {
            location: Point {
                lat: report.lat,
                lng: report.lng,
            },
            city: report.city.clone(),
            state: report.state.clone(),
            locality: report.locality.clone(),
        };
        let assigned_to = match self.find_best_authority(&site).await {
            Ok(authority) => authority,
            Err(e) => {
                // scoring failures degrade to an unassigned task
                warn!("authority scoring failed for report {}: {}", report.id, e);
                None
            }
        };

        let priority = task_priority(classify_priority(&report.category));
        let status = if assigned_to.is_some() {
            TaskStatus::Assigned
        } else {
            TaskStatus::Pending
        };
        let scheduled_for = Utc::now() + Duration::hours(24);

        let task: Task = sqlx::query_as(&format!(
            r#"
            INSERT INTO tasks (
                report_id, assigned_to, status, priority,
                lat, lng, address, city, state, locality, category, scheduled_for
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12
            )
            RETURNING {}
        "#,
            TASK_COLUMNS
        ))
        .bind(report.id)
        .bind(assigned_to)
        .bind(status)
        .bind(priority)
        .bind(report.lat)
        .bind(report.lng)
        .bind(&report.address)
        .bind(&report.city)
        .bind(&report.state)
        .bind(&report.locality)
        .bind(&report.category)
        .bind(scheduled_for)
        .fetch_one(&self.db.pool())
        .await?;

        info!(
            "created task {} for report {} (authority: {:?})",
            task.id, report.id, assigned_to
        );
        self.notifier.publish(DispatchEvent::TaskAssigned {
            task_id: task.id,
            authority_id: assigned_to,
        });
        Ok(task)
    }

    /// The winning authority id, or None when no authority exists at all.
    /// Falls back to the least-burdened complete profile when every
    /// candidate scores 0, so verified reports are never stuck.
    pub async fn find_best_authority(
        &self,
        site: &ReportSite,
    ) -> Result<Option<i64>, DispatchError> {
        let authorities = self.db.authorities_with_load().await?;
        let mut areas: HashMap<i64, Vec<String>> = HashMap::new();
        for area in self.db.service_areas().await? {
            let names = areas.entry(area.authority_id).or_default();
            names.push(area.city);
            names.push(area.state);
            names.push(area.locality);
        }

        let complete: Vec<&AuthorityLoad> =
            authorities.iter().filter(|a| a.is_complete()).collect();
        let candidates: Vec<Candidate> = complete
            .iter()
            .map(|a| Candidate {
                id: a.id,
                base: Point {
                    lat: a.base_lat.unwrap_or_default(),
                    lng: a.base_lng.unwrap_or_default(),
                },
                service_radius_km: a.service_radius_km,
                max_tasks_per_day: a
                    .max_tasks_per_day
                    .map(i64::from)
                    .unwrap_or(self.config.default_daily_capacity),
                active_tasks: a.active_tasks,
                completion_rate: a.completion_rate,
                service_areas: areas.remove(&a.id).unwrap_or_default(),
            })
            .collect();

        if let Some((winner, score)) = best_candidate(&candidates, site) {
            debug!("authority {} wins with score {}", winner.id, score);
            return Ok(Some(winner.id));
        }

        let fallback = complete
            .iter()
            .min_by_key(|a| (a.completed_tasks, a.id))
            .map(|a| a.id);
        if let Some(id) = fallback {
            debug!("no authority scored above 0, falling back to {}", id);
        }
        Ok(fallback)
    }
}

pub(crate) fn task_priority(priority: Priority) -> TaskPriority {
    match priority {
        Priority::Urgent => TaskPriority::Urgent,
        Priority::High => TaskPriority::High,
        Priority::Medium => TaskPriority::Medium,
        Priority::Low => TaskPriority::Low,
    }
}
