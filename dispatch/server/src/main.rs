use clap::Parser;
use dispatch_api::{
    rpc::DispatchApiServer,
    types::{
        AssignReportRequest, AssignReportResponse, Decision, LatLng, OptimizeRouteRequest,
        OptimizeRouteResponse, ReconcileSummary, ReportStatus, RouteObjective, RouteStatsView,
        RouteStopView, SubmitVoteRequest, SubmitVoteResponse, TaskActionKind, TaskActionRequest,
        TaskFilter, TaskPriority, TaskStatus, TaskView,
    },
};
use dispatch_server::{
    app_config::{init_console_subscriber, AppConfig},
    app_env::AppEnv,
    assignment,
    db::schema,
    error::DispatchError,
    index,
    notify::{dispatch_channel, PgSubscriber},
    signer::UrlSigner,
    tasks::{self, TaskAction},
};
use futures::StreamExt;
use jsonrpsee::{core::async_trait, server::Server, types::ErrorObjectOwned};
use routing::{
    geo::Point,
    route::{self, Objective, Priority, Stop},
};
use std::{net::SocketAddr, sync::Arc};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

async fn listen_for_dispatch_events(env: Arc<AppEnv>) -> anyhow::Result<()> {
    let subscriber = PgSubscriber::new(&env.db.pool(), dispatch_channel()).await?;
    let events = UnboundedReceiverStream::new(subscriber.subscribe());

    tokio::spawn(events.for_each(|event| async move {
        // delivery past the channel boundary is a collaborator's concern
        info!("delivering notification: {:?}", event);
    }));

    Ok(())
}

struct DispatchApiImpl {
    app_env: Arc<AppEnv>,
}

impl DispatchApiImpl {
    async fn task_view(&self, task: schema::Task) -> TaskView {
        let collection_proof_url = match (&self.app_env.signer, &task.collection_proof) {
            (Some(signer), Some(key)) => match signer.sign_url(key).await {
                Ok(url) => Some(url.to_string()),
                Err(e) => {
                    warn!("failed to sign proof url for task {}: {:#}", task.id, e);
                    None
                }
            },
            _ => None,
        };
        TaskView {
            id: task.id,
            report_id: task.report_id,
            assigned_to: task.assigned_to,
            status: task_status_view(task.status),
            priority: priority_view(task.priority),
            lat: task.lat,
            lng: task.lng,
            address: task.address,
            city: task.city,
            state: task.state,
            locality: task.locality,
            category: task.category,
            scheduled_for: task.scheduled_for,
            started_at: task.started_at,
            completed_at: task.completed_at,
            collection_proof: task.collection_proof,
            collection_proof_url,
            notes: task.notes,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

#[async_trait]
impl DispatchApiServer for DispatchApiImpl {
    async fn register_volunteer(&self, name: String) -> Result<i64, ErrorObjectOwned> {
        let env = &self.app_env;
        let volunteer_id = assignment::register_volunteer(&env.db, &env.index, &name).await?;
        Ok(volunteer_id)
    }

    async fn assign_report(
        &self,
        req: AssignReportRequest,
    ) -> Result<AssignReportResponse, ErrorObjectOwned> {
        let env = &self.app_env;
        let count = req.count.unwrap_or(env.volunteers_per_report);
        let volunteer_ids =
            assignment::assign_report(&env.db, &env.index, &env.notifier, req.report_id, count)
                .await?;
        Ok(AssignReportResponse {
            report_id: req.report_id,
            volunteer_ids,
        })
    }

    async fn submit_verification(
        &self,
        req: SubmitVoteRequest,
    ) -> Result<SubmitVoteResponse, ErrorObjectOwned> {
        let outcome = self
            .app_env
            .consensus
            .submit_verification(
                req.report_id,
                req.volunteer_id,
                decision(req.status),
                req.verification_note,
            )
            .await?;
        Ok(SubmitVoteResponse {
            verified: outcome.status == schema::ReportStatus::Verified,
            count: outcome.vote_count,
            threshold_reached: outcome.finalized,
            authority_task_created: outcome.authority_task_created,
            status: report_status_view(outcome.status),
        })
    }

    async fn optimize_route(
        &self,
        req: OptimizeRouteRequest,
    ) -> Result<OptimizeRouteResponse, ErrorObjectOwned> {
        let env = &self.app_env;
        let db_tasks = env
            .db
            .tasks_by_ids(&req.task_ids)
            .await
            .map_err(DispatchError::from)?;

        let start = match req.start_location {
            Some(LatLng { lat, lng }) => Point::checked(lat, lng).map_err(DispatchError::from)?,
            // absent a depot, start from the first requested stop
            None => db_tasks
                .first()
                .map(|t| Point { lat: t.lat, lng: t.lng })
                .unwrap_or(Point { lat: 0.0, lng: 0.0 }),
        };

        let stops: Vec<Stop> = db_tasks
            .iter()
            .map(|t| Stop {
                id: t.id,
                location: Point { lat: t.lat, lng: t.lng },
                address: t.address.clone(),
                category: t.category.clone(),
                priority: routing_priority(t.priority),
            })
            .collect();
        let total_tasks = stops.len();

        let routed = route::optimize(stops, start, objective(req.optimize_for));
        let stats = route::route_stats(&routed, env.avg_speed_kmh);

        let optimized_route = routed
            .into_iter()
            .map(|r| RouteStopView {
                task_id: r.stop.id,
                lat: r.stop.location.lat,
                lng: r.stop.location.lng,
                address: r.stop.address,
                category: r.stop.category,
                priority: priority_view_from_routing(r.stop.priority),
                distance_from_previous: round2(r.distance_from_previous_km),
                estimated_collection_time: r.estimated_minutes,
            })
            .collect();

        Ok(OptimizeRouteResponse {
            optimized_route,
            route_stats: RouteStatsView {
                total_distance: stats.total_distance_km,
                travel_time: stats.travel_minutes,
                collection_time: stats.collection_minutes,
                total_time: stats.total_minutes,
                total_stops: stats.total_stops,
            },
            total_tasks,
        })
    }

    async fn list_tasks(&self, filter: TaskFilter) -> Result<Vec<TaskView>, ErrorObjectOwned> {
        let db_tasks = self
            .app_env
            .db
            .list_tasks(
                filter.status.map(task_status),
                filter.priority.map(priority),
                filter.city.as_deref(),
            )
            .await
            .map_err(DispatchError::from)?;
        let mut views = Vec::with_capacity(db_tasks.len());
        for task in db_tasks {
            views.push(self.task_view(task).await);
        }
        Ok(views)
    }

    async fn task_action(&self, req: TaskActionRequest) -> Result<TaskView, ErrorObjectOwned> {
        let action = match req.action {
            TaskActionKind::Assign => TaskAction::Assign {
                authority_id: req.authority_id.ok_or_else(|| {
                    DispatchError::Validation("authorityId is required for assign".to_string())
                })?,
            },
            TaskActionKind::Unassign => TaskAction::Unassign,
            TaskActionKind::Schedule => TaskAction::Schedule {
                scheduled_for: req.scheduled_for.ok_or_else(|| {
                    DispatchError::Validation("scheduledFor is required for schedule".to_string())
                })?,
            },
            TaskActionKind::Start => TaskAction::Start,
            TaskActionKind::Complete => TaskAction::Complete {
                collection_proof: req.collection_proof,
                notes: req.notes,
            },
            TaskActionKind::Cancel => TaskAction::Cancel { reason: req.reason },
        };
        let task = tasks::apply_action(&self.app_env.db, req.task_id, action).await?;
        Ok(self.task_view(task).await)
    }

    async fn reconcile_index(&self) -> Result<ReconcileSummary, ErrorObjectOwned> {
        let env = &self.app_env;
        let summary = index::reconcile(&env.db, env.index.as_ref()).await?;
        Ok(ReconcileSummary {
            volunteers: summary.volunteers,
            active_assignments: summary.active_assignments,
        })
    }

    async fn sign_proof_url(&self, task_id: i64) -> Result<String, ErrorObjectOwned> {
        let env = &self.app_env;
        let task = env
            .db
            .get_task(task_id)
            .await
            .map_err(DispatchError::from)?
            .ok_or(DispatchError::NotFound("task", task_id))?;
        let key = task.collection_proof.ok_or_else(|| {
            DispatchError::Validation(format!("task {} has no collection proof", task_id))
        })?;
        let signer = env
            .signer
            .as_ref()
            .ok_or_else(|| DispatchError::ExternalService("no URL signer configured".to_string()))?;
        let url = signer
            .sign_url(&key)
            .await
            .map_err(|e| DispatchError::ExternalService(format!("{:#}", e)))?;
        Ok(url.to_string())
    }

    async fn health_check(&self) -> Result<(), ErrorObjectOwned> {
        Ok(())
    }
}

fn decision(status: Decision) -> schema::Decision {
    match status {
        Decision::Verified => schema::Decision::Verified,
        Decision::Rejected => schema::Decision::Rejected,
    }
}

fn report_status_view(status: schema::ReportStatus) -> ReportStatus {
    match status {
        schema::ReportStatus::Pending => ReportStatus::Pending,
        schema::ReportStatus::Verified => ReportStatus::Verified,
        schema::ReportStatus::Rejected => ReportStatus::Rejected,
    }
}

fn task_status(status: TaskStatus) -> schema::TaskStatus {
    match status {
        TaskStatus::Pending => schema::TaskStatus::Pending,
        TaskStatus::Assigned => schema::TaskStatus::Assigned,
        TaskStatus::Scheduled => schema::TaskStatus::Scheduled,
        TaskStatus::InProgress => schema::TaskStatus::InProgress,
        TaskStatus::Completed => schema::TaskStatus::Completed,
        TaskStatus::Cancelled => schema::TaskStatus::Cancelled,
    }
}

fn task_status_view(status: schema::TaskStatus) -> TaskStatus {
    match status {
        schema::TaskStatus::Pending => TaskStatus::Pending,
        schema::TaskStatus::Assigned => TaskStatus::Assigned,
        schema::TaskStatus::Scheduled => TaskStatus::Scheduled,
        schema::TaskStatus::InProgress => TaskStatus::InProgress,
        schema::TaskStatus::Completed => TaskStatus::Completed,
        schema::TaskStatus::Cancelled => TaskStatus::Cancelled,
    }
}

fn priority(priority: TaskPriority) -> schema::TaskPriority {
    match priority {
        TaskPriority::Urgent => schema::TaskPriority::Urgent,
        TaskPriority::High => schema::TaskPriority::High,
        TaskPriority::Medium => schema::TaskPriority::Medium,
        TaskPriority::Low => schema::TaskPriority::Low,
    }
}

fn priority_view(priority: schema::TaskPriority) -> TaskPriority {
    match priority {
        schema::TaskPriority::Urgent => TaskPriority::Urgent,
        schema::TaskPriority::High => TaskPriority::High,
        schema::TaskPriority::Medium => TaskPriority::Medium,
        schema::TaskPriority::Low => TaskPriority::Low,
    }
}

fn routing_priority(priority: schema::TaskPriority) -> Priority {
    match priority {
        schema::TaskPriority::Urgent => Priority::Urgent,
        schema::TaskPriority::High => Priority::High,
        schema::TaskPriority::Medium => Priority::Medium,
        schema::TaskPriority::Low => Priority::Low,
    }
}

fn priority_view_from_routing(priority: Priority) -> TaskPriority {
    match priority {
        Priority::Urgent => TaskPriority::Urgent,
        Priority::High => TaskPriority::High,
        Priority::Medium => TaskPriority::Medium,
        Priority::Low => TaskPriority::Low,
    }
}

fn objective(objective: RouteObjective) -> Objective {
    match objective {
        RouteObjective::Distance => Objective::Distance,
        RouteObjective::Time => Objective::Time,
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_console_subscriber();
    let cli = AppConfig::parse();
    debug!("{}", serde_json::to_string_pretty(&cli).unwrap());

    let addr = {
        let host = "0.0.0.0";
        let addr = format!("{}:{}", host, cli.json_rpc_port);
        addr.parse::<SocketAddr>()
    }?;

    let app_env = {
        let e = AppEnv::new(cli).await?;
        Arc::new(e)
    };
    listen_for_dispatch_events(app_env.clone()).await?;

    let server = Server::builder().build(addr).await?;
    let server_addr: SocketAddr = server.local_addr()?;
    info!("JSON-RPC server started at {}", server_addr);

    let api = DispatchApiImpl { app_env };
    let handle = server.start(api.into_rpc());

    // Keep the server running until Ctrl+C is pressed
    tokio::signal::ctrl_c().await?;

    handle.stop()?;
    info!("JSON-RPC server stopped");

    Ok(())
}
