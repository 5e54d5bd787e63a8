use crate::app_config::AppConfig;
use crate::consensus::{ConsensusConfig, ConsensusEngine};
use crate::db::{Database, DB};
use crate::index::{self, MemoryIndex};
use crate::notify::Notifier;
use crate::router::{AuthorityRouter, RouterConfig};
use crate::signer::RemoteSigner;
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

pub struct AppEnv {
    pub db: Database,
    pub index: Arc<MemoryIndex>,
    pub notifier: Notifier,
    pub consensus: ConsensusEngine,
    pub signer: Option<RemoteSigner>,
    pub volunteers_per_report: usize,
    pub avg_speed_kmh: f64,
}

impl AppEnv {
    pub async fn new(app_config: AppConfig) -> Result<Self> {
        let db = {
            let db = DB::new(app_config.db_config()).await?;
            Database::new(db.pool)
        };
        let index = Arc::new(MemoryIndex::new());
        // seed the projection from the store before serving requests
        let summary = index::reconcile(&db, index.as_ref()).await?;
        info!(
            "assignment index loaded: {} volunteers, {} active assignments",
            summary.volunteers, summary.active_assignments
        );

        let notifier = Notifier::new(db.pool());
        let router = AuthorityRouter::new(
            db.clone(),
            notifier.clone(),
            RouterConfig {
                default_daily_capacity: app_config.default_daily_capacity,
            },
        );
        let consensus = ConsensusEngine::new(
            db.clone(),
            index.clone(),
            router,
            notifier.clone(),
            ConsensusConfig {
                vote_threshold: app_config.vote_threshold,
                points_per_verification: app_config.points_per_verification,
            },
        );
        let signer = match app_config.signer_url()? {
            Some(url) => Some(RemoteSigner::new(
                url,
                app_config.signer_timeout_secs,
                app_config.proof_url_expiry_secs,
            )?),
            None => None,
        };
        Ok(Self {
            db,
            index,
            notifier,
            consensus,
            signer,
            volunteers_per_report: app_config.volunteers_per_report,
            avg_speed_kmh: app_config.avg_speed_kmh,
        })
    }
}
