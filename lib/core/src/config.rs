//! Environment-backed configuration.
//!
//! Resolved once at process start into immutable values; the engines never
//! consult the environment after initialisation.

use std::collections::HashSet;

use crate::error::SyncError;
use crate::utils::parse_bool;

/// Renamed flags from the pending upstream rename. The canonical names are
/// the `TIMECAMP_DISABLE_*` set; setting any of these aliases is refused
/// with an error pointing at the canonical variable, so a half-migrated
/// deployment fails loudly instead of silently ignoring a flag.
const REFUSED_ALIASES: &[(&str, &str)] = &[
    ("TIMECAMP_SKIP_NEW_USERS_CREATION", "TIMECAMP_DISABLE_NEW_USERS"),
    ("TIMECAMP_SKIP_USER_DEACTIVATION", "TIMECAMP_DISABLE_USER_DEACTIVATION"),
    ("TIMECAMP_SKIP_EXTERNAL_ID_SYNC", "TIMECAMP_DISABLE_EXTERNAL_ID_SYNC"),
    ("TIMECAMP_SKIP_ADDITIONAL_EMAIL_SYNC", "TIMECAMP_DISABLE_ADDITIONAL_EMAIL_SYNC"),
    ("TIMECAMP_SKIP_MANUAL_USER_UPDATES", "TIMECAMP_DISABLE_MANUAL_USER_UPDATES"),
    ("TIMECAMP_SKIP_GROUP_UPDATES", "TIMECAMP_DISABLE_GROUP_UPDATES"),
    ("TIMECAMP_SKIP_ROLE_UPDATES", "TIMECAMP_DISABLE_ROLE_UPDATES"),
    ("TIMECAMP_SKIP_GROUPS_CREATION", "TIMECAMP_DISABLE_GROUPS_CREATION"),
];

/// Configuration for both pipeline stages, from `TIMECAMP_*` variables.
#[derive(Debug, Clone)]
pub struct TimeCampConfig {
    /// Bearer token for the TimeCamp API.
    pub api_key: String,
    /// API host (default `app.timecamp.com`).
    pub domain: String,
    /// Root group under which the managed hierarchy lives.
    pub root_group_id: u64,
    /// Live user ids that are never mutated.
    pub ignored_user_ids: HashSet<u64>,

    pub show_external_id: bool,
    pub use_supervisor_groups: bool,
    pub use_department_groups: bool,
    pub use_job_title_name_users: bool,
    pub use_job_title_name_groups: bool,
    pub use_is_supervisor_role: bool,
    /// Comma-separated department prefix alternatives to strip.
    pub skip_departments: String,
    /// Force-rewrite the email domain (leading `@` optional, empty = off).
    pub replace_email_domain: String,

    pub disable_new_users: bool,
    pub disable_user_deactivation: bool,
    pub disable_external_id_sync: bool,
    pub disable_additional_email_sync: bool,
    pub disable_manual_user_updates: bool,
    pub disable_group_updates: bool,
    pub disable_role_updates: bool,
    pub disable_groups_creation: bool,

    /// Where to move deactivated users; 0 means no move.
    pub disabled_users_group_id: u64,
}

impl TimeCampConfig {
    /// Resolve the configuration from the process environment.
    pub fn from_env() -> Result<Self, SyncError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve the configuration from an arbitrary key lookup. Used by
    /// `from_env` and by tests.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        for (alias, canonical) in REFUSED_ALIASES {
            if lookup(alias).is_some() {
                return Err(SyncError::Config(format!(
                    "{} is not recognised; set {} instead",
                    alias, canonical
                )));
            }
        }

        let api_key = lookup("TIMECAMP_API_KEY")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| SyncError::Config("missing TIMECAMP_API_KEY".into()))?;

        let root_group_id = lookup("TIMECAMP_ROOT_GROUP_ID")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| SyncError::Config("missing TIMECAMP_ROOT_GROUP_ID".into()))?;
        let root_group_id = root_group_id.trim().parse::<u64>().map_err(|_| {
            SyncError::Config(format!(
                "TIMECAMP_ROOT_GROUP_ID is not a number: {:?}",
                root_group_id
            ))
        })?;

        let mut ignored_user_ids = HashSet::new();
        if let Some(raw) = lookup("TIMECAMP_IGNORED_USER_IDS") {
            for part in raw.split(',') {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                let id = part.parse::<u64>().map_err(|_| {
                    SyncError::Config(format!(
                        "TIMECAMP_IGNORED_USER_IDS contains a non-numeric id: {:?}",
                        part
                    ))
                })?;
                ignored_user_ids.insert(id);
            }
        }

        let flag = |key: &str, default: bool| -> Result<bool, SyncError> {
            match lookup(key) {
                None => Ok(default),
                Some(raw) if raw.trim().is_empty() => Ok(default),
                Some(raw) => parse_bool(&raw).ok_or_else(|| {
                    SyncError::Config(format!(
                        "{} must be true|false|1|0, got {:?}",
                        key, raw
                    ))
                }),
            }
        };

        let disabled_users_group_id = match lookup("TIMECAMP_DISABLED_USERS_GROUP_ID") {
            None => 0,
            Some(raw) if raw.trim().is_empty() => 0,
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                SyncError::Config(format!(
                    "TIMECAMP_DISABLED_USERS_GROUP_ID is not a number: {:?}",
                    raw
                ))
            })?,
        };

        Ok(Self {
            api_key,
            domain: lookup("TIMECAMP_DOMAIN")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "app.timecamp.com".to_string()),
            root_group_id,
            ignored_user_ids,
            show_external_id: flag("TIMECAMP_SHOW_EXTERNAL_ID", true)?,
            use_supervisor_groups: flag("TIMECAMP_USE_SUPERVISOR_GROUPS", false)?,
            use_department_groups: flag("TIMECAMP_USE_DEPARTMENT_GROUPS", true)?,
            use_job_title_name_users: flag("TIMECAMP_USE_JOB_TITLE_NAME_USERS", false)?,
            use_job_title_name_groups: flag("TIMECAMP_USE_JOB_TITLE_NAME_GROUPS", false)?,
            use_is_supervisor_role: flag("TIMECAMP_USE_IS_SUPERVISOR_ROLE", false)?,
            skip_departments: lookup("TIMECAMP_SKIP_DEPARTMENTS")
                .map(|v| v.trim().to_string())
                .unwrap_or_default(),
            replace_email_domain: lookup("TIMECAMP_REPLACE_EMAIL_DOMAIN")
                .map(|v| v.trim().to_string())
                .unwrap_or_default(),
            disable_new_users: flag("TIMECAMP_DISABLE_NEW_USERS", false)?,
            disable_user_deactivation: flag("TIMECAMP_DISABLE_USER_DEACTIVATION", false)?,
            disable_external_id_sync: flag("TIMECAMP_DISABLE_EXTERNAL_ID_SYNC", false)?,
            disable_additional_email_sync: flag("TIMECAMP_DISABLE_ADDITIONAL_EMAIL_SYNC", false)?,
            disable_manual_user_updates: flag("TIMECAMP_DISABLE_MANUAL_USER_UPDATES", false)?,
            disable_group_updates: flag("TIMECAMP_DISABLE_GROUP_UPDATES", false)?,
            disable_role_updates: flag("TIMECAMP_DISABLE_ROLE_UPDATES", false)?,
            disable_groups_creation: flag("TIMECAMP_DISABLE_GROUPS_CREATION", false)?,
            disabled_users_group_id,
        })
    }
}

/// Blob-store selection, from `USE_S3_STORAGE` and the `S3_*` family.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub use_s3: bool,
    pub endpoint_url: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    pub region: String,
    pub path_prefix: String,
    /// Path-style addressing, needed by MinIO.
    pub force_path_style: bool,
    /// Base directory for the local backend.
    pub local_dir: String,
}

impl StorageConfig {
    pub fn from_env() -> Result<Self, SyncError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, SyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let use_s3 = match lookup("USE_S3_STORAGE") {
            None => false,
            Some(raw) if raw.trim().is_empty() => false,
            Some(raw) => parse_bool(&raw).ok_or_else(|| {
                SyncError::Config(format!("USE_S3_STORAGE must be true|false|1|0, got {:?}", raw))
            })?,
        };

        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).unwrap_or_default();

        let config = Self {
            use_s3,
            endpoint_url: lookup("S3_ENDPOINT_URL")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            access_key_id: get("S3_ACCESS_KEY_ID"),
            secret_access_key: get("S3_SECRET_ACCESS_KEY"),
            bucket_name: get("S3_BUCKET_NAME"),
            region: lookup("S3_REGION")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "us-east-1".to_string()),
            path_prefix: get("S3_PATH_PREFIX"),
            force_path_style: match lookup("S3_FORCE_PATH_STYLE") {
                None => false,
                Some(raw) if raw.trim().is_empty() => false,
                Some(raw) => parse_bool(&raw).ok_or_else(|| {
                    SyncError::Config(format!(
                        "S3_FORCE_PATH_STYLE must be true|false|1|0, got {:?}",
                        raw
                    ))
                })?,
            },
            local_dir: lookup("CAMPSYNC_DATA_DIR")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| ".".to_string()),
        };

        if config.use_s3
            && (config.access_key_id.is_empty()
                || config.secret_access_key.is_empty()
                || config.bucket_name.is_empty())
        {
            return Err(SyncError::Config(
                "S3 storage is enabled but S3_ACCESS_KEY_ID, S3_SECRET_ACCESS_KEY, \
                 and S3_BUCKET_NAME are not all set"
                    .into(),
            ));
        }

        Ok(config)
    }
}
