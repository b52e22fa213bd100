//! Typed operations over the TimeCamp REST API.
//!
//! All endpoints speak the `third_party/api` JSON shape. Ids arrive as
//! strings or numbers depending on the endpoint, so parsing is lenient.

use std::collections::{HashMap, HashSet};
use std::thread;

use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};

use campsync_core::{Role, SyncError, TimeCampConfig};

use crate::http::{HttpClient, RetryPolicy};
use crate::model::{LiveGroup, LiveUser, RoleAssignment, UserPatch};

/// Settings are fetched for many users at once; the API accepts a
/// comma-separated id list of this size.
const SETTINGS_BATCH: usize = 50;

/// The typed TimeCamp surface the sync engine runs against. Implemented
/// by [`TimeCampApi`] for the real service and by in-memory fakes in
/// tests.
pub trait TimeCamp {
    /// All live users with enabled/added-manually/external-id/additional
    /// email merged in from the settings endpoints.
    fn get_users(&self) -> Result<Vec<LiveUser>, SyncError>;

    /// All live groups with breadcrumbs computed under the root group.
    fn get_groups(&self) -> Result<Vec<LiveGroup>, SyncError>;

    /// Per-user role assignments, keyed by user id.
    fn get_user_roles(&self) -> Result<HashMap<u64, Vec<RoleAssignment>>, SyncError>;

    /// Create a user in a group. The SaaS welcome email is suppressed.
    fn add_user(&self, email: &str, name: &str, group_id: u64) -> Result<u64, SyncError>;

    /// Write the present fields of `patch`. Attribute writes happen
    /// before the group move; the role is applied in the target group.
    fn update_user(
        &self,
        user_id: u64,
        current_group_id: u64,
        patch: &UserPatch,
    ) -> Result<(), SyncError>;

    /// Create a group under a parent, returning the new id.
    fn add_group(&self, name: &str, parent_id: u64) -> Result<u64, SyncError>;

    /// Toggle the group-manager flag for a user in a group. Idempotent.
    fn set_group_manager(&self, group_id: u64, user_id: u64, on: bool) -> Result<(), SyncError>;

    /// Write a single per-user setting (`added_manually`, `external_id`,
    /// `additional_email`, `disabled_user`).
    fn set_user_setting(&self, user_id: u64, name: &str, value: &str) -> Result<(), SyncError>;
}

/// Production implementation over [`HttpClient`].
pub struct TimeCampApi {
    http: HttpClient,
    root_group_id: u64,
}

impl TimeCampApi {
    pub fn new(config: &TimeCampConfig) -> Result<Self, SyncError> {
        let base_url = format!("https://{}/third_party/api", config.domain);
        Ok(Self {
            http: HttpClient::new(&base_url, &config.api_key)?,
            root_group_id: config.root_group_id,
        })
    }

    /// For tests against a local mock server.
    pub fn with_http(http: HttpClient, root_group_id: u64) -> Self {
        Self {
            http,
            root_group_id,
        }
    }

    /// Fetch one named setting for many users, batched.
    fn get_user_settings(
        &self,
        user_ids: &[u64],
        name: &str,
    ) -> Result<HashMap<u64, Option<String>>, SyncError> {
        let mut result = HashMap::new();
        for batch in user_ids.chunks(SETTINGS_BATCH) {
            let ids = batch
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",");
            let value = self.http.request(
                Method::GET,
                &format!("user/{}/setting", ids),
                &[("name[]", name.to_string())],
                None,
            )?;
            merge_settings_response(&value, batch, name, &mut result);
        }
        Ok(result)
    }
}

impl TimeCamp for TimeCampApi {
    fn get_users(&self) -> Result<Vec<LiveUser>, SyncError> {
        let listing = self.http.request(Method::GET, "users", &[], None)?;
        let raw_users: Vec<(u64, String, String, u64)> = listing
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|u| {
                        Some((
                            lenient_u64(&u["user_id"])?,
                            u["email"].as_str()?.to_string(),
                            u["display_name"].as_str().unwrap_or_default().to_string(),
                            lenient_u64(&u["group_id"]).unwrap_or_default(),
                        ))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let ids: Vec<u64> = raw_users.iter().map(|(id, ..)| *id).collect();
        let disabled = self.get_user_settings(&ids, "disabled_user")?;
        let manual = self.get_user_settings(&ids, "added_manually")?;
        let external = self.get_user_settings(&ids, "external_id")?;
        let additional = self.get_user_settings(&ids, "additional_email")?;

        let setting_is_one = |map: &HashMap<u64, Option<String>>, id: u64| {
            map.get(&id)
                .and_then(|v| v.as_deref())
                .is_some_and(|v| v == "1")
        };

        Ok(raw_users
            .into_iter()
            .map(|(user_id, email, display_name, group_id)| LiveUser {
                user_id,
                email,
                display_name,
                group_id,
                enabled: !setting_is_one(&disabled, user_id),
                added_manually: setting_is_one(&manual, user_id),
                external_id: external
                    .get(&user_id)
                    .and_then(|v| v.clone())
                    .filter(|v| !v.is_empty()),
                additional_email: additional
                    .get(&user_id)
                    .and_then(|v| v.clone())
                    .filter(|v| !v.is_empty()),
            })
            .collect())
    }

    fn get_groups(&self) -> Result<Vec<LiveGroup>, SyncError> {
        let listing = self.http.request(Method::GET, "group", &[], None)?;
        let mut groups = Vec::new();
        if let Some(items) = listing.as_array() {
            for g in items {
                let Some(group_id) = lenient_u64(&g["group_id"]) else {
                    continue;
                };
                groups.push(LiveGroup {
                    group_id,
                    parent_id: lenient_u64(&g["parent_id"]).filter(|&p| p != 0),
                    name: g["name"].as_str().unwrap_or_default().trim().to_string(),
                    path: None,
                });
            }
        }
        compute_paths(&mut groups, self.root_group_id);
        Ok(groups)
    }

    fn get_user_roles(&self) -> Result<HashMap<u64, Vec<RoleAssignment>>, SyncError> {
        let value = self.http.request(Method::GET, "people_picker", &[], None)?;
        let mut roles: HashMap<u64, Vec<RoleAssignment>> = HashMap::new();

        if let Some(groups) = value["groups"].as_object() {
            for group in groups.values() {
                let Some(group_id) = lenient_u64(&group["group_id"]) else {
                    continue;
                };
                // `users` is a map on populated groups, a bare list when
                // empty.
                if let Some(users) = group["users"].as_object() {
                    for (user_id, user) in users {
                        let Ok(user_id) = user_id.parse::<u64>() else {
                            continue;
                        };
                        let Some(role_id) = user["role_id"].as_str() else {
                            continue;
                        };
                        roles.entry(user_id).or_default().push(RoleAssignment {
                            group_id,
                            role_id: role_id.to_string(),
                        });
                    }
                }
            }
        }
        Ok(roles)
    }

    fn add_user(&self, email: &str, name: &str, group_id: u64) -> Result<u64, SyncError> {
        let body = json!({
            "email": [email],
            "tt_global_admin": "0",
            "tt_can_create_level_1_tasks": "0",
            "can_view_rates": "0",
            "add_to_all_projects": "0",
            "send_email": "0",
        });
        let response = self.http.request(
            Method::POST,
            &format!("group/{}/user", group_id),
            &[],
            Some(&body),
        )?;

        let user_id = match extract_user_id(&response) {
            Some(id) => id,
            // Some account tiers answer with an opaque body; fall back to
            // looking the address up in the listing.
            None => self
                .get_users()?
                .into_iter()
                .find(|u| u.email.eq_ignore_ascii_case(email))
                .map(|u| u.user_id)
                .ok_or_else(|| {
                    SyncError::Internal(format!(
                        "created user {} but could not resolve their id",
                        email
                    ))
                })?,
        };

        if !name.is_empty() {
            self.http.request(
                Method::POST,
                "user",
                &[],
                Some(&json!({"user_id": user_id.to_string(), "display_name": name})),
            )?;
        }
        Ok(user_id)
    }

    fn update_user(
        &self,
        user_id: u64,
        current_group_id: u64,
        patch: &UserPatch,
    ) -> Result<(), SyncError> {
        let uid = user_id.to_string();

        // Attributes first: a rename or email change must land before any
        // group move references the user.
        if patch.name.is_some() || patch.email.is_some() {
            let mut body = json!({"user_id": uid});
            if let Some(ref name) = patch.name {
                body["display_name"] = json!(name);
            }
            if let Some(ref email) = patch.email {
                body["email"] = json!(email);
            }
            self.http.request(Method::POST, "user", &[], Some(&body))?;
        }

        if let Some(ref additional) = patch.additional_email {
            self.set_user_setting(user_id, "additional_email", additional)?;
        }
        if let Some(ref external) = patch.external_id {
            self.set_user_setting(user_id, "external_id", external)?;
        }
        if let Some(active) = patch.active {
            self.set_user_setting(user_id, "disabled_user", if active { "0" } else { "1" })?;
        }

        if let Some(target_group) = patch.group_id {
            self.http.request(
                Method::PUT,
                &format!("group/{}/user", current_group_id),
                &[],
                Some(&json!({"group_id": target_group.to_string(), "user_id": uid})),
            )?;
        }

        if let Some(role) = patch.role_id {
            let role_group = patch.group_id.unwrap_or(current_group_id);
            self.http.request(
                Method::PUT,
                &format!("group/{}/user", role_group),
                &[],
                Some(&json!({"role_id": role.wire_id(), "user_id": uid})),
            )?;
        }

        Ok(())
    }

    fn add_group(&self, name: &str, parent_id: u64) -> Result<u64, SyncError> {
        let body = json!({"name": name, "parent_id": parent_id.to_string()});
        let policy = RetryPolicy::default();

        for attempt in 1..=policy.max_attempts {
            match self.http.request(Method::PUT, "group", &[], Some(&body)) {
                Ok(response) => {
                    return lenient_u64(&response["group_id"]).ok_or_else(|| {
                        SyncError::Internal(format!(
                            "group creation for {:?} returned no group_id",
                            name
                        ))
                    });
                }
                // The API answers 403 both for permission problems and
                // when group creation is throttled; only the throttle
                // wording is worth retrying.
                Err(SyncError::PermissionDenied(msg)) if looks_rate_limited(&msg) => {
                    if attempt == policy.max_attempts {
                        return Err(SyncError::RateLimited(msg));
                    }
                    let delay = policy.delay_for(attempt);
                    warn!(group = name, attempt, ?delay, "403 on group creation, retrying");
                    thread::sleep(delay);
                }
                Err(other) => return Err(other),
            }
        }
        Err(SyncError::RateLimited(format!(
            "group creation for {:?} kept returning 403",
            name
        )))
    }

    fn set_group_manager(&self, group_id: u64, user_id: u64, on: bool) -> Result<(), SyncError> {
        let role = if on { Role::Supervisor } else { Role::User };
        self.http.request(
            Method::PUT,
            &format!("group/{}/user", group_id),
            &[],
            Some(&json!({"role_id": role.wire_id(), "user_id": user_id.to_string()})),
        )?;
        Ok(())
    }

    fn set_user_setting(&self, user_id: u64, name: &str, value: &str) -> Result<(), SyncError> {
        debug!(user_id, setting = name, value, "writing user setting");
        self.http.request(
            Method::PUT,
            &format!("user/{}/setting", user_id),
            &[],
            Some(&json!({"name": name, "value": value})),
        )?;
        Ok(())
    }
}

/// Accept ids that arrive as JSON numbers or as numeric strings.
fn lenient_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn extract_user_id(response: &Value) -> Option<u64> {
    lenient_u64(&response["user_id"])
        .or_else(|| lenient_u64(&response["users"][0]["user_id"]))
        .or_else(|| lenient_u64(&response[0]["user_id"]))
}

fn looks_rate_limited(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("rate limit") || lower.contains("too many") || lower.contains("throttl")
}

/// Fill in breadcrumbs relative to `root_group_id` by walking parent
/// links. Groups outside the root's subtree keep `path: None`.
fn compute_paths(groups: &mut [LiveGroup], root_group_id: u64) {
    let parents: HashMap<u64, (Option<u64>, String)> = groups
        .iter()
        .map(|g| (g.group_id, (g.parent_id, g.name.clone())))
        .collect();

    for group in groups.iter_mut() {
        if group.group_id == root_group_id {
            group.path = Some(String::new());
            continue;
        }

        let mut segments = vec![group.name.clone()];
        let mut current = group.parent_id;
        let mut visited = HashSet::from([group.group_id]);

        group.path = loop {
            match current {
                Some(id) if id == root_group_id => {
                    segments.reverse();
                    break Some(segments.join("/"));
                }
                Some(id) => {
                    if !visited.insert(id) {
                        warn!(group_id = group.group_id, "parent cycle in group listing");
                        break None;
                    }
                    match parents.get(&id) {
                        Some((parent, name)) => {
                            segments.push(name.clone());
                            current = *parent;
                        }
                        None => break None,
                    }
                }
                None => break None,
            }
        };
    }
}

/// Fold one settings response into `result`. The API answers either with
/// a map keyed by user id or (older deployments) a flat list.
fn merge_settings_response(
    value: &Value,
    batch: &[u64],
    name: &str,
    result: &mut HashMap<u64, Option<String>>,
) {
    match value {
        Value::Object(map) => {
            for &user_id in batch {
                let entry = map
                    .get(&user_id.to_string())
                    .and_then(|settings| settings.as_array())
                    .and_then(|settings| {
                        settings
                            .iter()
                            .find(|s| s["name"].as_str() == Some(name))
                            .and_then(|s| s["value"].as_str())
                            .map(|v| v.to_string())
                    });
                result.insert(user_id, entry);
            }
        }
        Value::Array(settings) => {
            for &user_id in batch {
                let entry = settings
                    .iter()
                    .find(|s| {
                        lenient_u64(&s["userId"]) == Some(user_id)
                            && s["name"].as_str() == Some(name)
                    })
                    .and_then(|s| s["value"].as_str())
                    .map(|v| v.to_string());
                result.insert(user_id, entry);
            }
        }
        _ => {
            for &user_id in batch {
                result.insert(user_id, None);
            }
        }
    }
}
