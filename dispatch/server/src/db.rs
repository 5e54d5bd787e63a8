use crate::db::schema::{
    Assignment, AuthorityLoad, Decision, LeaderboardEntry, NewReport, Report, ServiceArea, Task,
    TaskPriority, TaskStatus, Verification,
};
use anyhow::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};

pub mod schema;

#[derive(Clone)]
pub struct DBConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
}

impl DBConfig {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.dbname
        )
    }
}

#[derive(Clone)]
pub struct DB {
    pub pool: PgPool,
}

impl DB {
    pub async fn new(config: DBConfig) -> Result<Self> {
        let connection_string = config.connection_string();
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&connection_string)
            .await?;
        Ok(Self { pool })
    }

    pub async fn new_from_environment() -> Result<Self> {
        let db_config = {
            let host = std::env::var("DB_HOST")?;
            let port = std::env::var("DB_PORT")?.parse()?;
            let user = std::env::var("DB_USER")?;
            let password = std::env::var("DB_PASSWORD")?;
            let dbname = std::env::var("DB_NAME")?;
            Ok::<_, anyhow::Error>(DBConfig {
                host,
                port,
                user,
                password,
                dbname,
            })
        }?;
        Self::new(db_config).await
    }
}

// Database management struct
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }

    // Volunteer methods
    pub async fn create_volunteer(&self, name: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            INSERT INTO volunteers (name) VALUES ($1) RETURNING id
        "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn volunteer_ids(&self) -> Result<Vec<i64>, sqlx::Error> {
        sqlx::query_scalar(r#"SELECT id FROM volunteers ORDER BY id"#)
            .fetch_all(&self.pool)
            .await
    }

    // Report methods
    pub async fn create_report(&self, report: &NewReport) -> Result<Report, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO reports (
                category, lat, lng, address, city, state, locality, reported_by
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8
            )
            RETURNING
                id, status, category, lat, lng, address, city, state, locality,
                reported_by, assigned_count, verified_by, verified_at, remarks,
                rejection_reason, created_at, updated_at
        "#,
        )
        .bind(&report.category)
        .bind(report.lat)
        .bind(report.lng)
        .bind(&report.address)
        .bind(&report.city)
        .bind(&report.state)
        .bind(&report.locality)
        .bind(report.reported_by)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn get_report(&self, report_id: i64) -> Result<Option<Report>, sqlx::Error> {
        sqlx::query_as(
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
        .fetch_optional(&self.pool)
        .await
    }

    // Assignment methods
    pub async fn get_assignment(
        &self,
        report_id: i64,
        volunteer_id: i64,
    ) -> Result<Option<Assignment>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT id, report_id, volunteer_id, status, completed_at, created_at
            FROM assignments
            WHERE report_id = $1 AND volunteer_id = $2
        "#,
        )
        .bind(report_id)
        .bind(volunteer_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Volunteers with any assignment row on the report, whatever its
    /// status. The (report, volunteer) pair is unique, so these can never
    /// be selected again.
    pub async fn assigned_volunteers(&self, report_id: i64) -> Result<Vec<i64>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT volunteer_id FROM assignments
            WHERE report_id = $1
            ORDER BY volunteer_id
        "#,
        )
        .bind(report_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Inserts assignment rows for the selected volunteers and refreshes the
    /// report's assigned count, in one transaction.
    pub async fn create_assignments(
        &self,
        report_id: i64,
        volunteer_ids: &[i64],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO assignments (report_id, volunteer_id, status)
            SELECT $1, v, 'pending'::assignment_status FROM UNNEST($2::bigint[]) AS v
        "#,
        )
        .bind(report_id)
        .bind(volunteer_ids)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            r#"
            UPDATE reports SET
                assigned_count = (
                    SELECT COUNT(*) FROM assignments
                    WHERE report_id = $1 AND status <> 'expired'
                ),
                updated_at = NOW()
            WHERE id = $1
        "#,
        )
        .bind(report_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await
    }

    /// Every active (report, volunteer) pair, for index reconciliation.
    pub async fn active_assignment_pairs(&self) -> Result<Vec<(i64, i64)>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT report_id, volunteer_id FROM assignments
            WHERE status IN ('pending', 'viewed')
            ORDER BY report_id, volunteer_id
        "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    // Verification methods
    pub async fn verifications_for_report(
        &self,
        report_id: i64,
    ) -> Result<Vec<Verification>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT id, report_id, volunteer_id, decision, note, created_at
            FROM verifications
            WHERE report_id = $1
            ORDER BY created_at
        "#,
        )
        .bind(report_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn vote_count(
        &self,
        report_id: i64,
        decision: Decision,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM verifications WHERE report_id = $1 AND decision = $2
        "#,
        )
        .bind(report_id)
        .bind(decision)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn leaderboard_entry(
        &self,
        reporter_id: i64,
    ) -> Result<Option<LeaderboardEntry>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT reporter_id, points, reports_verified, updated_at
            FROM leaderboard
            WHERE reporter_id = $1
        "#,
        )
        .bind(reporter_id)
        .fetch_optional(&self.pool)
        .await
    }

    // Task methods
    pub async fn get_task(&self, task_id: i64) -> Result<Option<Task>, sqlx::Error> {
        sqlx::query_as(&format!(
            r#"SELECT {} FROM tasks WHERE id = $1"#,
            TASK_COLUMNS
        ))
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn tasks_for_report(&self, report_id: i64) -> Result<Vec<Task>, sqlx::Error> {
        sqlx::query_as(&format!(
            r#"SELECT {} FROM tasks WHERE report_id = $1 ORDER BY id"#,
            TASK_COLUMNS
        ))
        .bind(report_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn tasks_by_ids(&self, task_ids: &[i64]) -> Result<Vec<Task>, sqlx::Error> {
        sqlx::query_as(&format!(
            r#"SELECT {} FROM tasks WHERE id = ANY($1::bigint[]) ORDER BY id"#,
            TASK_COLUMNS
        ))
        .bind(task_ids)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn list_tasks(
        &self,
        status: Option<TaskStatus>,
        priority: Option<TaskPriority>,
        city: Option<&str>,
    ) -> Result<Vec<Task>, sqlx::Error> {
        sqlx::query_as(&format!(
            r#"
            SELECT {} FROM tasks
            WHERE ($1::task_status IS NULL OR status = $1)
              AND ($2::task_priority IS NULL OR priority = $2)
              AND ($3::text IS NULL OR city ILIKE $3)
            ORDER BY created_at DESC
        "#,
            TASK_COLUMNS
        ))
        .bind(status)
        .bind(priority)
        .bind(city)
        .fetch_all(&self.pool)
        .await
    }

    // Authority methods
    pub async fn authorities_with_load(&self) -> Result<Vec<AuthorityLoad>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT
                a.id, a.name, a.base_lat, a.base_lng, a.service_radius_km,
                a.max_tasks_per_day, a.completion_rate, a.avg_completion_minutes,
                (SELECT COUNT(*) FROM tasks t
                  WHERE t.assigned_to = a.id
                    AND t.status IN ('assigned', 'scheduled', 'in_progress')) AS active_tasks,
                (SELECT COUNT(*) FROM tasks t
                  WHERE t.assigned_to = a.id AND t.status = 'completed') AS completed_tasks
            FROM authorities a
            ORDER BY a.id
        "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    pub async fn service_areas(&self) -> Result<Vec<ServiceArea>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT authority_id, city, state, locality, priority
            FROM authority_service_areas
            ORDER BY authority_id, priority
        "#,
        )
        .fetch_all(&self.pool)
        .await
    }
}

pub(crate) const TASK_COLUMNS: &str = "id, report_id, assigned_to, status, priority, lat, lng, \
     address, city, state, locality, category, scheduled_for, started_at, completed_at, \
     collection_proof, notes, cancel_reason, created_at, updated_at";
