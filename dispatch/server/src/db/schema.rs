use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "report_status", rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Verified,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "assignment_status", rename_all = "snake_case")]
pub enum AssignmentStatus {
    Pending,
    Viewed,
    Completed,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "verification_decision", rename_all = "snake_case")]
pub enum Decision {
    Verified,
    Rejected,
}

impl Decision {
    /// The report status a finalized report takes under this decision.
    pub fn report_status(self) -> ReportStatus {
        match self {
            Decision::Verified => ReportStatus::Verified,
            Decision::Rejected => ReportStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "task_priority", rename_all = "snake_case")]
pub enum TaskPriority {
    Urgent,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub status: ReportStatus,
    pub category: String,
    pub lat: f64,
    pub lng: f64,
    pub address: String,
    pub city: String,
    pub state: String,
    pub locality: String,
    pub reported_by: i64,
    pub assigned_count: i32,
    pub verified_by: Option<i64>,
    pub verified_at: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a report; the store fills the id, status and
/// timestamps.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub category: String,
    pub lat: f64,
    pub lng: f64,
    pub address: String,
    pub city: String,
    pub state: String,
    pub locality: String,
    pub reported_by: i64,
}

#[derive(Debug, FromRow, Serialize, Deserialize)]
pub struct Assignment {
    pub id: i64,
    pub report_id: i64,
    pub volunteer_id: i64,
    pub status: AssignmentStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow, Serialize, Deserialize)]
pub struct Verification {
    pub id: i64,
    pub report_id: i64,
    pub volunteer_id: i64,
    pub decision: Decision,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub report_id: i64,
    pub assigned_to: Option<i64>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub lat: f64,
    pub lng: f64,
    pub address: String,
    pub city: String,
    pub state: String,
    pub locality: String,
    pub category: String,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub collection_proof: Option<String>,
    pub notes: Option<String>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An authority row joined with its live task counters.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AuthorityLoad {
    pub id: i64,
    pub name: String,
    pub base_lat: Option<f64>,
    pub base_lng: Option<f64>,
    pub service_radius_km: f64,
    pub max_tasks_per_day: Option<i32>,
    pub completion_rate: f64,
    pub avg_completion_minutes: Option<f64>,
    pub active_tasks: i64,
    pub completed_tasks: i64,
}

impl AuthorityLoad {
    /// A profile is complete when the base coordinates are known.
    pub fn is_complete(&self) -> bool {
        self.base_lat.is_some() && self.base_lng.is_some()
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ServiceArea {
    pub authority_id: i64,
    pub city: String,
    pub state: String,
    pub locality: String,
    pub priority: i32,
}

#[derive(Debug, FromRow, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub reporter_id: i64,
    pub points: i64,
    pub reports_verified: i64,
    pub updated_at: DateTime<Utc>,
}
