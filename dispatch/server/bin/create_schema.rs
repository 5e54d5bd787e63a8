use anyhow::Result;
use sqlx::{Executor, PgPool};
use tracing::info;

async fn create_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create ENUM types
    pool.execute(sqlx::query(
        r#"
        DO $$ BEGIN
            IF NOT EXISTS (SELECT 1 FROM pg_type WHERE typname = 'report_status') THEN
                CREATE TYPE report_status AS ENUM ('pending', 'verified', 'rejected');
            END IF;
            IF NOT EXISTS (SELECT 1 FROM pg_type WHERE typname = 'assignment_status') THEN
                CREATE TYPE assignment_status AS ENUM ('pending', 'viewed', 'completed', 'expired');
            END IF;
            IF NOT EXISTS (SELECT 1 FROM pg_type WHERE typname = 'verification_decision') THEN
                CREATE TYPE verification_decision AS ENUM ('verified', 'rejected');
            END IF;
            IF NOT EXISTS (SELECT 1 FROM pg_type WHERE typname = 'task_status') THEN
                CREATE TYPE task_status AS ENUM (
                    'pending',
                    'assigned',
                    'scheduled',
                    'in_progress',
                    'completed',
                    'cancelled'
                );
            END IF;
            IF NOT EXISTS (SELECT 1 FROM pg_type WHERE typname = 'task_priority') THEN
                CREATE TYPE task_priority AS ENUM ('urgent', 'high', 'medium', 'low');
            END IF;
        END $$;
    "#,
    ))
    .await?;

    pool.execute(sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS volunteers (
            id BIGSERIAL PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
    "#,
    ))
    .await?;

    pool.execute(sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reports (
            id BIGSERIAL PRIMARY KEY,
            status report_status NOT NULL DEFAULT 'pending',
            category TEXT NOT NULL,
            lat DOUBLE PRECISION NOT NULL,
            lng DOUBLE PRECISION NOT NULL,
            address TEXT NOT NULL,
            city TEXT NOT NULL,
            state TEXT NOT NULL,
            locality TEXT NOT NULL,
            reported_by BIGINT NOT NULL,
            assigned_count INT NOT NULL DEFAULT 0,
            verified_by BIGINT,
            verified_at TIMESTAMPTZ,
            remarks TEXT,
            rejection_reason TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
    "#,
    ))
    .await?;

    pool.execute(sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assignments (
            id BIGSERIAL PRIMARY KEY,
            report_id BIGINT NOT NULL REFERENCES reports (id),
            volunteer_id BIGINT NOT NULL REFERENCES volunteers (id),
            status assignment_status NOT NULL DEFAULT 'pending',
            completed_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (report_id, volunteer_id)
        )
    "#,
    ))
    .await?;

    pool.execute(sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS verifications (
            id BIGSERIAL PRIMARY KEY,
            report_id BIGINT NOT NULL REFERENCES reports (id),
            volunteer_id BIGINT NOT NULL REFERENCES volunteers (id),
            decision verification_decision NOT NULL,
            note TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (report_id, volunteer_id)
        )
    "#,
    ))
    .await?;

    pool.execute(sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS authorities (
            id BIGSERIAL PRIMARY KEY,
            name TEXT NOT NULL,
            base_lat DOUBLE PRECISION,
            base_lng DOUBLE PRECISION,
            service_radius_km DOUBLE PRECISION NOT NULL DEFAULT 10,
            max_tasks_per_day INT,
            completion_rate DOUBLE PRECISION NOT NULL DEFAULT 0,
            avg_completion_minutes DOUBLE PRECISION,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
    "#,
    ))
    .await?;

    pool.execute(sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS authority_service_areas (
            id BIGSERIAL PRIMARY KEY,
            authority_id BIGINT NOT NULL REFERENCES authorities (id),
            city TEXT NOT NULL DEFAULT '',
            state TEXT NOT NULL DEFAULT '',
            locality TEXT NOT NULL DEFAULT '',
            priority INT NOT NULL DEFAULT 0
        )
    "#,
    ))
    .await?;

    pool.execute(sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id BIGSERIAL PRIMARY KEY,
            report_id BIGINT NOT NULL REFERENCES reports (id),
            assigned_to BIGINT REFERENCES authorities (id),
            status task_status NOT NULL DEFAULT 'pending',
            priority task_priority NOT NULL DEFAULT 'low',
            lat DOUBLE PRECISION NOT NULL,
            lng DOUBLE PRECISION NOT NULL,
            address TEXT NOT NULL,
            city TEXT NOT NULL,
            state TEXT NOT NULL,
            locality TEXT NOT NULL,
            category TEXT NOT NULL,
            scheduled_for TIMESTAMPTZ,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            collection_proof TEXT,
            notes TEXT,
            cancel_reason TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
    "#,
    ))
    .await?;

    pool.execute(sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS leaderboard (
            reporter_id BIGINT PRIMARY KEY,
            points BIGINT NOT NULL DEFAULT 0,
            reports_verified BIGINT NOT NULL DEFAULT 0,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
    "#,
    ))
    .await?;

    // Create indexes
    pool.execute(sqlx::query(
        r#"
        DO $$ BEGIN
            CREATE INDEX IF NOT EXISTS idx_reports_status ON reports (status);
            CREATE INDEX IF NOT EXISTS idx_assignments_report ON assignments (report_id, status);
            CREATE INDEX IF NOT EXISTS idx_assignments_volunteer ON assignments (volunteer_id, status);
            CREATE INDEX IF NOT EXISTS idx_verifications_report ON verifications (report_id, decision);
            CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks (status);
            CREATE INDEX IF NOT EXISTS idx_tasks_assigned_to ON tasks (assigned_to, status);
            CREATE INDEX IF NOT EXISTS idx_tasks_city ON tasks (city);
        END $$;
    "#,
    ))
    .await?;

    info!("Schema created successfully for database");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dispatch_server::app_config::init_console_subscriber();
    let db = dispatch_server::db::DB::new_from_environment().await?;
    match create_schema(&db.pool).await {
        Ok(_) => {
            info!("Database schema setup completed successfully.");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Error setting up database schema: {}", e);
            Err(e.into())
        }
    }
}
