//! Stage 2: transform fetched people into the desired TimeCamp user set.
//!
//! Pure and deterministic, with no I/O beyond what the caller does with
//! the blob artifacts. Output is sorted ascending by email.

pub mod format;
pub mod hierarchy;
pub mod roles;

use std::collections::BTreeMap;

use tracing::{debug, warn};

use campsync_core::{DesiredUser, SourceFile, TimeCampConfig, UserStatus};

use crate::format::{display_name, primary_email, real_email};
use crate::hierarchy::People;
use crate::roles::resolve_role;

pub use crate::hierarchy::GroupPolicy;

/// Compute the desired TimeCamp users from the fetched person set.
///
/// People with an unrecognised status, an empty external id, or no usable
/// email are skipped with a warning. When two people resolve to the same
/// email the later one wins, mirroring how duplicates collapse in the
/// source systems.
pub fn prepare(source: &SourceFile, config: &TimeCampConfig) -> Vec<DesiredUser> {
    let policy = GroupPolicy::from_config(config);
    let people = People::index(&source.users);
    debug!(?policy, users = source.users.len(), "preparing desired state");

    let mut by_email: BTreeMap<String, DesiredUser> = BTreeMap::new();

    for person in &source.users {
        if person.external_id.is_empty() {
            warn!(name = %person.name, "person without external_id skipped");
            continue;
        }

        let status = match person.status.to_lowercase().as_str() {
            "active" => UserStatus::Active,
            "inactive" => UserStatus::Inactive,
            other => {
                warn!(
                    person = %person.external_id,
                    status = other,
                    "unknown status, person skipped"
                );
                continue;
            }
        };

        let email = primary_email(person, config);
        if email.is_empty() {
            warn!(person = %person.external_id, "person without email skipped");
            continue;
        }

        // Global admins live in the root group no matter the policy.
        let breadcrumb = if person.force_global_admin_role {
            String::new()
        } else {
            people.group_path(person, policy, config)
        };

        let desired = DesiredUser {
            timecamp_external_id: person.external_id.clone(),
            timecamp_user_name: display_name(person, config),
            timecamp_real_email: real_email(person, config, &email),
            timecamp_email: email.clone(),
            timecamp_groups_breadcrumb: breadcrumb,
            timecamp_status: status,
            timecamp_role: resolve_role(person, config),
        };

        by_email.insert(email, desired);
    }

    by_email.into_values().collect()
}
