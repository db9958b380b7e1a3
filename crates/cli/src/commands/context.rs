use std::fs;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use caseflow_core::assignment::{AssignmentDeps, AssignmentEngine};
use caseflow_core::audit::TracingAuditSink;
use caseflow_core::config::{AppConfig, LoadOptions};
use caseflow_core::domain::request::{RequestId, ServiceRequest};
use caseflow_core::errors::ApplicationError;
use caseflow_core::intake::RequestIntake;
use caseflow_core::lifecycle::LifecycleService;
use caseflow_core::notify::TracingNotificationSink;
use caseflow_core::ports::RequestRepository;
use caseflow_core::routing::RoutingRuleCatalog;
use caseflow_core::sla::SlaReconciler;
use caseflow_db::{
    connect_with_config, migrations, DbPool, SqlAssignmentLog, SqlProviderDirectory,
    SqlRequestRepository, SqlRoutingRuleStore,
};
use serde::de::DeserializeOwned;

use crate::commands::CommandResult;

/// `(error_class, message, exit_code)` as reported in the command payload.
pub type Failure = (&'static str, String, u8);

/// Loads config, builds a current-thread runtime and drives `work` on it.
/// Config and runtime problems come back as finished failure payloads.
pub fn execute<T, F, Fut>(command: &str, work: F) -> Result<T, CommandResult>
where
    F: FnOnce(AppConfig) -> Fut,
    Fut: Future<Output = Result<T, Failure>>,
{
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return Err(CommandResult::failure(
                command,
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            ));
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return Err(CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            ));
        }
    };

    runtime
        .block_on(work(config))
        .map_err(|(error_class, message, exit_code)| {
            CommandResult::failure(command, error_class, message, exit_code)
        })
}

pub async fn open_pool(config: &AppConfig) -> Result<DbPool, Failure> {
    let pool = connect_with_config(&config.database)
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
    migrations::run_pending(&pool).await.map_err(|error| ("migration", error.to_string(), 5u8))?;
    Ok(pool)
}

/// The routing services wired over the SQL adapters.
pub struct Services {
    pub pool: DbPool,
    pub requests: Arc<SqlRequestRepository>,
    pub catalog: Arc<RoutingRuleCatalog>,
    pub engine: Arc<AssignmentEngine>,
    pub intake: RequestIntake,
    pub lifecycle: LifecycleService,
    pub reconciler: SlaReconciler,
}

impl Services {
    pub async fn open(config: &AppConfig) -> Result<Self, Failure> {
        let clock = config
            .sla_clock()
            .map_err(|error| ("config_validation", format!("configuration issue: {error}"), 2u8))?;
        let pool = open_pool(config).await?;

        let requests = Arc::new(SqlRequestRepository::new(pool.clone()));
        let directory = Arc::new(SqlProviderDirectory::new(pool.clone()));
        let notifications = Arc::new(TracingNotificationSink);
        let audit = Arc::new(TracingAuditSink);

        let catalog = Arc::new(RoutingRuleCatalog::new(
            Arc::new(SqlRoutingRuleStore::new(pool.clone())),
            audit.clone(),
        ));
        let engine = Arc::new(
            AssignmentEngine::new(AssignmentDeps {
                requests: requests.clone(),
                catalog: catalog.clone(),
                providers: directory.clone(),
                validator: directory,
                notifications: notifications.clone(),
                log: Arc::new(SqlAssignmentLog::new(pool.clone())),
                audit: audit.clone(),
                clock: clock.clone(),
            })
            .with_timeout(config.assignment_timeout()),
        );

        Ok(Self {
            intake: RequestIntake::new(requests.clone(), engine.clone(), clock.clone()),
            lifecycle: LifecycleService::new(requests.clone(), audit),
            reconciler: SlaReconciler::new(requests.clone(), notifications, clock),
            pool,
            requests,
            catalog,
            engine,
        })
    }

    pub async fn load_request(&self, id: &RequestId) -> Result<ServiceRequest, ApplicationError> {
        self.requests
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("request", id.0.clone()))
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

pub fn application_failure(error: ApplicationError) -> Failure {
    (error.error_class(), error.to_string(), 5)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid JSON in {}", path.display()))
}

pub fn input_failure(error: anyhow::Error) -> Failure {
    ("invalid_input", format!("{error:#}"), 2)
}
