use crate::db::schema::{Assignment, AssignmentStatus, Decision, Report, ReportStatus};
use crate::db::Database;
use crate::error::DispatchError;
use crate::index::{AssignmentIndex, MemoryIndex};
use crate::notify::{DispatchEvent, Notifier};
use crate::router::AuthorityRouter;
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy)]
pub struct ConsensusConfig {
    /// Same-decision votes required to finalize a report.
    pub vote_threshold: i64,
    /// Points granted to the reporter on a VERIFIED finalization.
    pub points_per_verification: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteOutcome {
    pub finalized: bool,
    pub vote_count: i64,
    pub authority_task_created: bool,
    pub status: ReportStatus,
}

/// Orchestrates vote submission: one atomic store transaction for the
/// vote and the (at most one) finalization, then best-effort index sync,
/// routing and notification fan-out.
pub struct ConsensusEngine {
    db: Database,
    index: Arc<MemoryIndex>,
    router: AuthorityRouter,
    notifier: Notifier,
    config: ConsensusConfig,
}

impl ConsensusEngine {
    pub fn new(
        db: Database,
        index: Arc<MemoryIndex>,
        router: AuthorityRouter,
        notifier: Notifier,
        config: ConsensusConfig,
    ) -> Self {
        Self {
            db,
            index,
            router,
            notifier,
            config,
        }
    }

    pub async fn submit_verification(
        &self,
        report_id: i64,
        volunteer_id: i64,
        decision: Decision,
        note: Option<String>,
    ) -> Result<VoteOutcome, DispatchError> {
        // Fast authorization pre-check against the index before opening a
        // transaction. The assignment row is re-verified inside it.
        if !self.index.is_assigned(report_id, volunteer_id).await {
            return Err(DispatchError::NotAssigned {
                report_id,
                volunteer_id,
            });
        }

        let mut tx = self.db.pool().begin().await?;

        let report: Report = sqlx::query_as(
            r#"
            SELECT
                id, status, category, lat, lng, address, city, state, locality,
                reported_by, assigned_count, verified_by, verified_at, remarks,
                rejection_reason, created_at, updated_at
            FROM reports
            WHERE id = $1
        "#,
        )
        .bind(report_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DispatchError::NotFound("report", report_id))?;
        if report.status != ReportStatus::Pending {
            return Err(DispatchError::AlreadyFinalized(report_id));
        }

        let assignment: Assignment = sqlx::query_as(
            r#"
            SELECT id, report_id, volunteer_id, status, completed_at, created_at
            FROM assignments
            WHERE report_id = $1 AND volunteer_id = $2
        "#,
        )
        .bind(report_id)
        .bind(volunteer_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DispatchError::NotAssigned {
            report_id,
            volunteer_id,
        })?;
        match assignment.status {
            AssignmentStatus::Pending | AssignmentStatus::Viewed => {}
            // a completed assignment means this volunteer's vote is already in
            AssignmentStatus::Completed => {
                return Err(DispatchError::DuplicateVote {
                    report_id,
                    volunteer_id,
                })
            }
            AssignmentStatus::Expired => {
                return Err(DispatchError::NotAssigned {
                    report_id,
                    volunteer_id,
                })
            }
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO verifications (report_id, volunteer_id, decision, note)
            VALUES ($1, $2, $3, $4)
        "#,
        )
        .bind(report_id)
        .bind(volunteer_id)
        .bind(decision)
        .bind(&note)
        .execute(&mut *tx)
        .await;
        if let Err(e) = inserted {
            if e.as_database_error()
                .is_some_and(|db_err| db_err.is_unique_violation())
            {
                return Err(DispatchError::DuplicateVote {
                    report_id,
                    volunteer_id,
                });
            }
            return Err(e.into());
        }

        sqlx::query(
            r#"
            UPDATE assignments SET status = 'completed', completed_at = NOW()
            WHERE report_id = $1 AND volunteer_id = $2
        "#,
        )
        .bind(report_id)
        .bind(volunteer_id)
        .execute(&mut *tx)
        .await?;

        let vote_count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM verifications WHERE report_id = $1 AND decision = $2
        "#,
        )
        .bind(report_id)
        .bind(decision)
        .fetch_one(&mut *tx)
        .await?;

        let mut expired_volunteers: Vec<i64> = Vec::new();
        let finalized = if vote_count >= self.config.vote_threshold {
            // Compare-and-swap on the report status: of two racing
            // threshold-crossing votes, exactly one lands this update.
            let result = sqlx::query(
                r#"
                UPDATE reports SET
                    status = $2,
                    verified_by = $3,
                    verified_at = NOW(),
                    remarks = CASE WHEN $2 = 'verified'::report_status THEN $4 ELSE remarks END,
                    rejection_reason = CASE WHEN $2 = 'rejected'::report_status THEN $4 ELSE rejection_reason END,
                    updated_at = NOW()
                WHERE id = $1 AND status = 'pending'
            "#,
            )
            .bind(report_id)
            .bind(decision.report_status())
            .bind(volunteer_id)
            .bind(&note)
            .execute(&mut *tx)
            .await?;
            result.rows_affected() == 1
        } else {
            false
        };

        if finalized {
            expired_volunteers = sqlx::query_scalar(
                r#"
                UPDATE assignments SET status = 'expired'
                WHERE report_id = $1 AND status IN ('pending', 'viewed')
                RETURNING volunteer_id
            "#,
            )
            .bind(report_id)
            .fetch_all(&mut *tx)
            .await?;
            sqlx::query(
                r#"
                UPDATE reports SET assigned_count = (
                    SELECT COUNT(*) FROM assignments
                    WHERE report_id = $1 AND status <> 'expired'
                )
                WHERE id = $1
            "#,
            )
            .bind(report_id)
            .execute(&mut *tx)
            .await?;

            if decision == Decision::Verified {
                sqlx::query(
                    r#"
                    INSERT INTO leaderboard (reporter_id, points, reports_verified, updated_at)
                    VALUES ($1, $2, 1, NOW())
                    ON CONFLICT (reporter_id) DO UPDATE SET
                        points = leaderboard.points + EXCLUDED.points,
                        reports_verified = leaderboard.reports_verified + 1,
                        updated_at = NOW()
                "#,
                )
                .bind(report.reported_by)
                .bind(self.config.points_per_verification)
                .execute(&mut *tx)
                .await?;
            }
        }

        let status = if finalized {
            decision.report_status()
        } else if vote_count >= self.config.vote_threshold {
            // the CAS lost to a concurrent finalizer; report the state it
            // committed rather than a stale PENDING
            sqlx::query_scalar(r#"SELECT status FROM reports WHERE id = $1"#)
                .bind(report_id)
                .fetch_one(&mut *tx)
                .await?
        } else {
            ReportStatus::Pending
        };

        tx.commit().await?;
        debug!(
            "vote recorded for report {} by volunteer {} ({} votes, finalized: {})",
            report_id, volunteer_id, vote_count, finalized
        );

        // Everything past the commit is best-effort: the vote stands even
        // when routing, index sync or notifications fail.
        let mut authority_task_created = false;
        if finalized && decision == Decision::Verified {
            match self.router.route_report(&report).await {
                Ok(_) => authority_task_created = true,
                Err(e) => error!("routing failed for verified report {}: {}", report_id, e),
            }
        }

        self.index.complete_assignment(report_id, volunteer_id).await;
        if finalized {
            self.index.expire_report(report_id).await;
            info!("report {} finalized as {:?}", report_id, status);
            if !expired_volunteers.is_empty() {
                self.notifier.publish(DispatchEvent::AssignmentsExpired {
                    report_id,
                    volunteer_ids: expired_volunteers,
                });
            }
            self.notifier.publish(DispatchEvent::ReportFinalized {
                report_id,
                status,
                reporter_id: report.reported_by,
            });
        }

        Ok(VoteOutcome {
            finalized,
            vote_count,
            authority_task_created,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config;
    use crate::db::schema::NewReport;
    use crate::db::DB;
    use crate::index::reconcile;
    use crate::notify::Notifier;
    use crate::router::RouterConfig;

    fn sample_report(reporter_id: i64) -> NewReport {
        NewReport {
            category: "plastic".to_string(),
            lat: 12.97,
            lng: 77.59,
            address: "12 Lake Rd".to_string(),
            city: "Springfield".to_string(),
            state: "Oregon".to_string(),
            locality: "Riverside".to_string(),
            reported_by: reporter_id,
        }
    }

    async fn engine(db: &DB) -> (ConsensusEngine, Arc<MemoryIndex>, Database) {
        let database = Database::new(db.pool.clone());
        let index = Arc::new(MemoryIndex::new());
        let notifier = Notifier::new(db.pool.clone());
        let router = AuthorityRouter::new(
            database.clone(),
            notifier.clone(),
            RouterConfig {
                default_daily_capacity: 10,
            },
        );
        let engine = ConsensusEngine::new(
            database.clone(),
            index.clone(),
            router,
            notifier,
            ConsensusConfig {
                vote_threshold: 1,
                points_per_verification: 5,
            },
        );
        (engine, index, database)
    }

    #[tokio::test]
    #[ignore = "requires postgres instance"]
    async fn single_vote_finalizes_at_threshold_one() -> anyhow::Result<()> {
        app_config::init_console_subscriber();
        let db = DB::new_from_environment().await?;
        let (engine, index, database) = engine(&db).await;

        let v1 = database.create_volunteer("ada").await?;
        let v2 = database.create_volunteer("grace").await?;
        let report = database.create_report(&sample_report(900)).await?;
        database.create_assignments(report.id, &[v1, v2]).await?;
        reconcile(&database, index.as_ref()).await?;

        let outcome = engine
            .submit_verification(report.id, v1, Decision::Verified, Some("confirmed".into()))
            .await?;
        assert!(outcome.finalized);
        assert_eq!(outcome.vote_count, 1);
        assert_eq!(outcome.status, ReportStatus::Verified);

        let stored = database.get_report(report.id).await?.unwrap();
        assert_eq!(stored.status, ReportStatus::Verified);
        assert_eq!(stored.verified_by, Some(v1));

        // the other open assignment expired
        let other = database.get_assignment(report.id, v2).await?.unwrap();
        assert_eq!(other.status, AssignmentStatus::Expired);

        // the reporter earned the configured reward
        let entry = database.leaderboard_entry(900).await?.unwrap();
        assert_eq!(entry.points, 5);
        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires postgres instance"]
    async fn second_vote_by_the_same_volunteer_is_rejected() -> anyhow::Result<()> {
        let db = DB::new_from_environment().await?;
        let (engine, index, database) = engine(&db).await;

        let v1 = database.create_volunteer("ada").await?;
        let v2 = database.create_volunteer("grace").await?;
        let report = database.create_report(&sample_report(901)).await?;
        database.create_assignments(report.id, &[v1, v2]).await?;
        reconcile(&database, index.as_ref()).await?;

        // threshold 1 finalizes immediately; use a fresh engine with a
        // higher threshold so the report stays pending after vote one
        let engine = ConsensusEngine::new(
            database.clone(),
            index.clone(),
            engine.router.clone(),
            engine.notifier.clone(),
            ConsensusConfig {
                vote_threshold: 2,
                points_per_verification: 5,
            },
        );
        engine
            .submit_verification(report.id, v1, Decision::Verified, None)
            .await?;

        let err = engine
            .submit_verification(report.id, v1, Decision::Verified, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::DuplicateVote { .. }));
        assert_eq!(database.vote_count(report.id, Decision::Verified).await?, 1);

        // exactly one immutable row for the pair
        let rows = database.verifications_for_report(report.id).await?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].volunteer_id, v1);
        assert_eq!(rows[0].decision, Decision::Verified);
        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires postgres instance"]
    async fn racing_threshold_votes_finalize_exactly_once() -> anyhow::Result<()> {
        let db = DB::new_from_environment().await?;
        let (engine, index, database) = engine(&db).await;

        let v1 = database.create_volunteer("ada").await?;
        let v2 = database.create_volunteer("grace").await?;
        let report = database.create_report(&sample_report(903)).await?;
        database.create_assignments(report.id, &[v1, v2]).await?;
        reconcile(&database, index.as_ref()).await?;

        // Both votes cross the threshold; depending on interleaving the
        // loser sees AlreadyFinalized or an aborted transaction. Either
        // way the finalization side effects must land exactly once.
        let (a, b) = tokio::join!(
            engine.submit_verification(report.id, v1, Decision::Verified, None),
            engine.submit_verification(report.id, v2, Decision::Verified, None),
        );
        assert!(a.is_ok() || b.is_ok());
        let finalizations = [&a, &b]
            .iter()
            .filter(|r| r.as_ref().is_ok_and(|o| o.finalized))
            .count();
        assert_eq!(finalizations, 1);

        let stored = database.get_report(report.id).await?.unwrap();
        assert_eq!(stored.status, ReportStatus::Verified);
        let entry = database.leaderboard_entry(903).await?.unwrap();
        assert_eq!(entry.points, 5);
        assert_eq!(database.tasks_for_report(report.id).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires postgres instance"]
    async fn votes_without_an_assignment_are_rejected() -> anyhow::Result<()> {
        let db = DB::new_from_environment().await?;
        let (engine, index, database) = engine(&db).await;

        let v1 = database.create_volunteer("ada").await?;
        let report = database.create_report(&sample_report(902)).await?;
        database.create_assignments(report.id, &[v1]).await?;
        reconcile(&database, index.as_ref()).await?;

        let err = engine
            .submit_verification(report.id, 999_999, Decision::Verified, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotAssigned { .. }));
        Ok(())
    }
}
