use super::types::{
    AssignReportRequest, AssignReportResponse, OptimizeRouteRequest, OptimizeRouteResponse,
    ReconcileSummary, SubmitVoteRequest, SubmitVoteResponse, TaskActionRequest, TaskFilter,
    TaskView,
};
use jsonrpsee::{proc_macros::rpc, types::ErrorObjectOwned};

#[rpc(server, client)]
pub trait DispatchApi {
    #[method(name = "registerVolunteer")]
    async fn register_volunteer(&self, name: String) -> Result<i64, ErrorObjectOwned>;

    #[method(name = "assignReport")]
    async fn assign_report(
        &self,
        req: AssignReportRequest,
    ) -> Result<AssignReportResponse, ErrorObjectOwned>;

    #[method(name = "submitVerification")]
    async fn submit_verification(
        &self,
        req: SubmitVoteRequest,
    ) -> Result<SubmitVoteResponse, ErrorObjectOwned>;

    #[method(name = "optimizeRoute")]
    async fn optimize_route(
        &self,
        req: OptimizeRouteRequest,
    ) -> Result<OptimizeRouteResponse, ErrorObjectOwned>;

    #[method(name = "listTasks")]
    async fn list_tasks(&self, filter: TaskFilter) -> Result<Vec<TaskView>, ErrorObjectOwned>;

    #[method(name = "taskAction")]
    async fn task_action(&self, req: TaskActionRequest) -> Result<TaskView, ErrorObjectOwned>;

    #[method(name = "reconcileIndex")]
    async fn reconcile_index(&self) -> Result<ReconcileSummary, ErrorObjectOwned>;

    #[method(name = "signProofUrl")]
    async fn sign_proof_url(&self, task_id: i64) -> Result<String, ErrorObjectOwned>;

    #[method(name = "healthCheck")]
    async fn health_check(&self) -> Result<(), ErrorObjectOwned>;
}
