//! Stage orchestration shared by the CLI and the trigger service.
//!
//! Each stage loads its configuration from the environment, moves one
//! artifact through the blob store, and reports what it did. Stages are
//! strictly sequential; callers must not run two at once against the
//! same working area.

use serde::Serialize;
use tracing::info;

use campsync_blob::BlobStore;
use campsync_core::{DesiredUser, SourceFile, StorageConfig, SyncError, TimeCampConfig, UserStatus};
use campsync_sync::{SyncEngine, SyncOptions, SyncReport};
use campsync_timecamp::TimeCampApi;

pub const DEFAULT_USERS_KEY: &str = "var/users.json";
pub const DEFAULT_PREPARED_KEY: &str = "var/timecamp_users.json";

/// Arguments for the prepare stage.
#[derive(Debug, Clone)]
pub struct PrepareArgs {
    pub dry_run: bool,
    pub input: String,
    pub output: String,
}

impl Default for PrepareArgs {
    fn default() -> Self {
        Self {
            dry_run: false,
            input: DEFAULT_USERS_KEY.to_string(),
            output: DEFAULT_PREPARED_KEY.to_string(),
        }
    }
}

/// Arguments for the sync stage.
#[derive(Debug, Clone)]
pub struct SyncArgs {
    pub dry_run: bool,
    pub input: String,
}

impl Default for SyncArgs {
    fn default() -> Self {
        Self {
            dry_run: false,
            input: DEFAULT_PREPARED_KEY.to_string(),
        }
    }
}

/// What the prepare stage produced.
#[derive(Debug, Clone, Serialize)]
pub struct PrepareOutcome {
    pub prepared: usize,
    pub active: usize,
    pub inactive: usize,
    pub unique_groups: usize,
    /// False under dry-run.
    pub written: bool,
}

/// Run the prepare stage: users.json in, timecamp_users.json out.
pub fn run_prepare(args: &PrepareArgs) -> Result<PrepareOutcome, SyncError> {
    let config = TimeCampConfig::from_env()?;
    let storage = StorageConfig::from_env()?;
    let store = campsync_blob::open_store(&storage)?;

    let raw = store.get_json(&args.input)?;
    let source: SourceFile = serde_json::from_slice(&raw)
        .map_err(|e| SyncError::Validation(format!("parsing {}: {}", args.input, e)))?;
    info!(input = %args.input, users = source.users.len(), "loaded source people");

    let desired = campsync_prepare::prepare(&source, &config);

    let active = desired
        .iter()
        .filter(|u| u.timecamp_status == UserStatus::Active)
        .count();
    let unique_groups = desired
        .iter()
        .map(|u| u.timecamp_groups_breadcrumb.as_str())
        .filter(|b| !b.is_empty())
        .collect::<std::collections::HashSet<_>>()
        .len();
    let outcome = PrepareOutcome {
        prepared: desired.len(),
        active,
        inactive: desired.len() - active,
        unique_groups,
        written: !args.dry_run,
    };
    info!(
        prepared = outcome.prepared,
        active = outcome.active,
        inactive = outcome.inactive,
        unique_groups = outcome.unique_groups,
        "prepared desired users"
    );

    if args.dry_run {
        info!(output = %args.output, "[dry-run] skipping artifact write");
        return Ok(outcome);
    }

    let body = serde_json::to_vec_pretty(&desired)
        .map_err(|e| SyncError::Internal(format!("serialising desired users: {}", e)))?;
    store.put_json(&args.output, &body)?;
    info!(output = %args.output, "wrote prepared users");
    Ok(outcome)
}

/// Run the sync stage: timecamp_users.json in, TimeCamp API out.
pub fn run_sync(args: &SyncArgs) -> Result<SyncReport, SyncError> {
    let config = TimeCampConfig::from_env()?;
    let storage = StorageConfig::from_env()?;
    let store = campsync_blob::open_store(&storage)?;

    if !store.exists(&args.input)? {
        return Err(SyncError::NotFound(format!(
            "input {} not found; run the prepare stage first",
            args.input
        )));
    }
    let raw = store.get_json(&args.input)?;
    let desired: Vec<DesiredUser> = serde_json::from_slice(&raw)
        .map_err(|e| SyncError::Validation(format!("parsing {}: {}", args.input, e)))?;
    info!(input = %args.input, users = desired.len(), "loaded prepared users");

    let api = TimeCampApi::new(&config)?;
    let engine = SyncEngine::new(&api, &config);
    let report = engine.run(&desired, &SyncOptions { dry_run: args.dry_run })?;

    info!("{}", report.summary());
    Ok(report)
}
