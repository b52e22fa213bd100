//! Stage 3: converge live TimeCamp state onto the desired user set.
//!
//! The engine reads a full live snapshot, computes a minimal plan, and
//! executes it strictly serially in a fixed phase order: groups, creates,
//! updates, activations, deactivations, manager fixups. One record's
//! failure never aborts the run; auth and config failures do.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use campsync_core::{DesiredUser, Role, SyncError, TimeCampConfig};
use campsync_timecamp::model::{LiveUser, RoleAssignment, UserPatch};
use campsync_timecamp::{GroupTree, TimeCamp};

use crate::report::{SyncOptions, SyncReport};

/// How a desired user relates to the live snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Match {
    /// No live counterpart; a create candidate.
    New,
    /// Matched the live user at this index.
    Existing(usize),
    /// Matched a live user that an earlier desired record already
    /// claimed; skipped to avoid double-processing.
    Duplicate,
}

/// Where a desired user's group breadcrumb resolved to.
#[derive(Debug, Clone, Copy)]
enum Target {
    Group(u64),
    /// The path's creation failed earlier in this run; every user routed
    /// through it is skipped.
    Failed,
}

pub struct SyncEngine<'a> {
    api: &'a dyn TimeCamp,
    config: &'a TimeCampConfig,
}

impl<'a> SyncEngine<'a> {
    pub fn new(api: &'a dyn TimeCamp, config: &'a TimeCampConfig) -> Self {
        Self { api, config }
    }

    /// Run one full reconciliation pass.
    pub fn run(
        &self,
        desired: &[DesiredUser],
        options: &SyncOptions,
    ) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();
        let dry_run = options.dry_run;

        let live_users = self.api.get_users()?;
        let live_groups = self.api.get_groups()?;
        let roles = self.api.get_user_roles()?;
        let mut tree = GroupTree::from_groups(self.config.root_group_id, &live_groups);

        info!(
            desired = desired.len(),
            live = live_users.len(),
            groups = live_groups.len(),
            dry_run,
            "starting sync"
        );

        let matches = self.match_users(desired, &live_users);

        // ── Phase 1: groups, parents before children ──
        let failed_paths =
            self.ensure_groups(desired, &matches, &mut tree, dry_run, &mut report);

        let resolve = |breadcrumb: &str| -> Target {
            if breadcrumb.is_empty() {
                return Target::Group(self.config.root_group_id);
            }
            if failed_paths.contains(breadcrumb) {
                return Target::Failed;
            }
            match tree.lookup_by_path(breadcrumb) {
                Some(id) => Target::Group(id),
                // Path absent and not creatable (creation disabled):
                // fall back to the root group.
                None => Target::Group(self.config.root_group_id),
            }
        };

        // ── Phase 2: create new users ──
        for (di, d) in desired.iter().enumerate() {
            if !d.is_active() || matches[di] != Match::New {
                continue;
            }
            if self.config.disable_new_users {
                debug!(email = %d.timecamp_email, "new user creation disabled, skipping");
                report.users_skipped += 1;
                continue;
            }
            let group_id = match resolve(&d.timecamp_groups_breadcrumb) {
                Target::Group(id) => id,
                Target::Failed => {
                    warn!(email = %d.timecamp_email, "target group missing, user skipped");
                    report.users_skipped += 1;
                    continue;
                }
            };
            match self.create_user(d, group_id, dry_run) {
                Ok(()) => report.users_created += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(email = %d.timecamp_email, error = %e, "user creation failed");
                    report.errors.push(format!("create {}: {}", d.timecamp_email, e));
                }
            }
        }

        // ── Phase 3: update existing users (attributes, then moves) ──
        let mut activations: Vec<(usize, usize)> = Vec::new();
        for (di, d) in desired.iter().enumerate() {
            let Match::Existing(li) = matches[di] else {
                if matches[di] == Match::Duplicate {
                    report.users_skipped += 1;
                }
                continue;
            };
            if !d.is_active() {
                continue; // handled by deactivation
            }
            let live = &live_users[li];

            if self.config.ignored_user_ids.contains(&live.user_id) {
                debug!(email = %live.email, user_id = live.user_id, "ignored user, skipping");
                report.users_skipped += 1;
                continue;
            }
            if live.added_manually && self.config.disable_manual_user_updates {
                info!(email = %live.email, "manually added user, updates disabled, skipping");
                report.users_skipped += 1;
                continue;
            }

            let target = resolve(&d.timecamp_groups_breadcrumb);
            let Target::Group(target_group) = target else {
                warn!(email = %d.timecamp_email, "target group missing, user skipped");
                report.users_skipped += 1;
                continue;
            };

            let patch = self.diff_user(d, live, target_group, &roles);

            if d.is_active() && !live.enabled {
                activations.push((di, li));
            }

            if patch.is_empty() {
                continue;
            }
            if dry_run {
                info!(
                    email = %live.email,
                    changes = %patch.describe(),
                    "[dry-run] would update user"
                );
                report.users_updated += 1;
                continue;
            }
            match self.api.update_user(live.user_id, live.group_id, &patch) {
                Ok(()) => {
                    info!(email = %live.email, changes = %patch.describe(), "updated user");
                    report.users_updated += 1;
                    self.clear_added_manually(live, &mut report);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(email = %live.email, error = %e, "user update failed");
                    report.errors.push(format!("update {}: {}", live.email, e));
                }
            }
        }

        // ── Phase 4: re-activate returning users ──
        for (di, li) in activations {
            let d = &desired[di];
            let live = &live_users[li];
            let patch = UserPatch {
                active: Some(true),
                ..Default::default()
            };
            if dry_run {
                info!(email = %live.email, "[dry-run] would re-activate user");
                report.users_activated += 1;
                continue;
            }
            match self.api.update_user(live.user_id, live.group_id, &patch) {
                Ok(()) => {
                    info!(email = %live.email, "re-activated user");
                    report.users_activated += 1;
                    self.clear_added_manually(live, &mut report);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(email = %live.email, error = %e, "re-activation failed");
                    report
                        .errors
                        .push(format!("activate {}: {}", d.timecamp_email, e));
                }
            }
        }

        // ── Phase 5: deactivate users missing from the source ──
        if !self.config.disable_user_deactivation {
            let keep: HashSet<u64> = desired
                .iter()
                .enumerate()
                .filter(|(_, d)| d.is_active())
                .filter_map(|(di, _)| match matches[di] {
                    Match::Existing(li) => Some(live_users[li].user_id),
                    _ => None,
                })
                .collect();

            for live in &live_users {
                if keep.contains(&live.user_id) || !live.enabled {
                    continue;
                }
                if self.config.ignored_user_ids.contains(&live.user_id) {
                    continue;
                }
                if live.added_manually && self.config.disable_manual_user_updates {
                    info!(email = %live.email, "manually added user, deactivation skipped");
                    continue;
                }

                let mut patch = UserPatch {
                    active: Some(false),
                    ..Default::default()
                };
                if self.config.disabled_users_group_id != 0 {
                    patch.group_id = Some(self.config.disabled_users_group_id);
                }

                if dry_run {
                    info!(
                        email = %live.email,
                        changes = %patch.describe(),
                        "[dry-run] would deactivate user"
                    );
                    report.users_deactivated += 1;
                    continue;
                }
                match self.api.update_user(live.user_id, live.group_id, &patch) {
                    Ok(()) => {
                        info!(email = %live.email, "deactivated user");
                        report.users_deactivated += 1;
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!(email = %live.email, error = %e, "deactivation failed");
                        report.errors.push(format!("deactivate {}: {}", live.email, e));
                    }
                }
            }
        }

        // ── Phase 6: group-manager fixups ──
        if self.config.use_supervisor_groups {
            self.fix_group_managers(desired, &matches, &live_users, &roles, &resolve, dry_run, &mut report)?;
        }

        info!("sync finished: {}", report.summary());
        Ok(report)
    }

    /// Match every desired user to at most one live user: primary email,
    /// then additional email, then external id; first hit wins, and a
    /// live user can only be claimed once.
    fn match_users(&self, desired: &[DesiredUser], live: &[LiveUser]) -> Vec<Match> {
        let mut by_email: HashMap<String, usize> = HashMap::new();
        let mut by_additional: HashMap<String, usize> = HashMap::new();
        let mut by_external: HashMap<&str, usize> = HashMap::new();

        for (i, user) in live.iter().enumerate() {
            by_email.entry(user.email.to_lowercase()).or_insert(i);
            if let Some(ref additional) = user.additional_email {
                by_additional.entry(additional.to_lowercase()).or_insert(i);
            }
            if let Some(ref external) = user.external_id {
                by_external.entry(external.as_str()).or_insert(i);
            }
        }

        let mut claimed: HashSet<usize> = HashSet::new();
        desired
            .iter()
            .map(|d| {
                let email = d.timecamp_email.to_lowercase();
                let hit = by_email
                    .get(&email)
                    .or_else(|| by_additional.get(&email))
                    .or_else(|| {
                        if d.timecamp_external_id.is_empty() {
                            None
                        } else {
                            by_external.get(d.timecamp_external_id.as_str())
                        }
                    })
                    .copied();
                match hit {
                    None => Match::New,
                    Some(li) => {
                        if claimed.insert(li) {
                            Match::Existing(li)
                        } else {
                            Match::Duplicate
                        }
                    }
                }
            })
            .collect()
    }

    /// Ensure every group path referenced by the plan exists, shallowest
    /// first so parents always precede children. Returns the paths whose
    /// creation failed.
    fn ensure_groups(
        &self,
        desired: &[DesiredUser],
        matches: &[Match],
        tree: &mut GroupTree,
        dry_run: bool,
        report: &mut SyncReport,
    ) -> HashSet<String> {
        let mut required: Vec<&str> = desired
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_active() && !d.timecamp_groups_breadcrumb.is_empty())
            // Under disable_new_users only matched users get groups, so
            // nothing is created for users that will never exist.
            .filter(|(di, _)| {
                !self.config.disable_new_users || matches!(matches[*di], Match::Existing(_))
            })
            .map(|(_, d)| d.timecamp_groups_breadcrumb.as_str())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        required.sort_by_key(|p| (p.split('/').count(), p.to_string()));

        let mut failed = HashSet::new();
        if self.config.disable_groups_creation {
            debug!("group creation disabled, using existing groups only");
            return failed;
        }

        let mut next_planned_id = u64::MAX;
        for path in required {
            let result = tree.ensure_path(path, &mut |name, parent| {
                if dry_run {
                    info!(group = name, parent, "[dry-run] would create group");
                    next_planned_id -= 1;
                    report.groups_created += 1;
                    return Ok(next_planned_id);
                }
                let id = self.api.add_group(name, parent)?;
                info!(group = name, parent, id, "created group");
                report.groups_created += 1;
                Ok(id)
            });
            if let Err(e) = result {
                warn!(path, error = %e, "group path creation failed");
                report.errors.push(format!("group {}: {}", path, e));
                failed.insert(path.to_string());
            }
        }
        failed
    }

    /// Compute the minimal patch that brings `live` in line with `d`.
    fn diff_user(
        &self,
        d: &DesiredUser,
        live: &LiveUser,
        target_group: u64,
        roles: &HashMap<u64, Vec<RoleAssignment>>,
    ) -> UserPatch {
        let mut patch = UserPatch::default();

        if live.display_name != d.timecamp_user_name {
            patch.name = Some(d.timecamp_user_name.clone());
        }

        if !live.email.eq_ignore_ascii_case(&d.timecamp_email) {
            patch.email = Some(d.timecamp_email.clone());
            // Keep the old address reachable for the next match.
            if live.additional_email.is_none() {
                patch.additional_email = Some(live.email.clone());
            }
        }

        if !self.config.disable_additional_email_sync {
            if let Some(ref real) = d.timecamp_real_email {
                if live.additional_email.as_deref() != Some(real.as_str()) {
                    patch.additional_email = Some(real.clone());
                }
            }
        }

        if !self.config.disable_external_id_sync
            && !d.timecamp_external_id.is_empty()
            && live.external_id.as_deref() != Some(d.timecamp_external_id.as_str())
        {
            patch.external_id = Some(d.timecamp_external_id.clone());
        }

        if !self.config.disable_group_updates && live.group_id != target_group {
            patch.group_id = Some(target_group);
        }

        if !self.config.disable_role_updates {
            let current = roles
                .get(&live.user_id)
                .and_then(|list| list.iter().find(|a| a.group_id == live.group_id))
                .map(|a| a.role_id.as_str());
            if current != Some(d.timecamp_role.wire_id()) {
                patch.role_id = Some(d.timecamp_role);
            }
        }

        patch
    }

    /// Create a user, then immediately write the attributes the create
    /// endpoint does not accept (role, additional email, external id),
    /// and mark them system-managed.
    fn create_user(&self, d: &DesiredUser, group_id: u64, dry_run: bool) -> Result<(), SyncError> {
        if dry_run {
            info!(
                email = %d.timecamp_email,
                name = %d.timecamp_user_name,
                group_id,
                "[dry-run] would create user"
            );
            return Ok(());
        }

        let user_id = self
            .api
            .add_user(&d.timecamp_email, &d.timecamp_user_name, group_id)?;
        info!(email = %d.timecamp_email, user_id, group_id, "created user");

        let mut follow_up = UserPatch::default();
        if d.timecamp_role != Role::User {
            follow_up.role_id = Some(d.timecamp_role);
        }
        if let Some(ref real) = d.timecamp_real_email {
            follow_up.additional_email = Some(real.clone());
        }
        if !self.config.disable_external_id_sync && !d.timecamp_external_id.is_empty() {
            follow_up.external_id = Some(d.timecamp_external_id.clone());
        }
        if !follow_up.is_empty() {
            self.api.update_user(user_id, group_id, &follow_up)?;
        }
        self.api.set_user_setting(user_id, "added_manually", "0")?;
        Ok(())
    }

    /// After any sync-driven update, a user is system-managed.
    fn clear_added_manually(&self, live: &LiveUser, report: &mut SyncReport) {
        if !live.added_manually {
            return;
        }
        if let Err(e) = self
            .api
            .set_user_setting(live.user_id, "added_manually", "0")
        {
            warn!(email = %live.email, error = %e, "failed to clear added_manually");
            report
                .errors
                .push(format!("added_manually {}: {}", live.email, e));
        }
    }

    /// Supervisors manage their own group; users who lost the role stop
    /// managing it. Administrators are never promoted to group managers.
    #[allow(clippy::too_many_arguments)]
    fn fix_group_managers(
        &self,
        desired: &[DesiredUser],
        matches: &[Match],
        live_users: &[LiveUser],
        roles: &HashMap<u64, Vec<RoleAssignment>>,
        resolve: &dyn Fn(&str) -> Target,
        dry_run: bool,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        for (di, d) in desired.iter().enumerate() {
            let Match::Existing(li) = matches[di] else {
                continue;
            };
            if !d.is_active() || d.timecamp_groups_breadcrumb.is_empty() {
                continue;
            }
            let live = &live_users[li];
            if self.config.ignored_user_ids.contains(&live.user_id) {
                continue;
            }
            if live.added_manually && self.config.disable_manual_user_updates {
                continue;
            }
            let Target::Group(group_id) = resolve(&d.timecamp_groups_breadcrumb) else {
                continue;
            };

            let currently_manager = roles
                .get(&live.user_id)
                .and_then(|list| list.iter().find(|a| a.group_id == group_id))
                .is_some_and(|a| a.role_id == "2");

            let want_manager = d.timecamp_role == Role::Supervisor;
            if want_manager == currently_manager {
                continue;
            }

            if dry_run {
                info!(
                    email = %live.email,
                    group_id,
                    manager = want_manager,
                    "[dry-run] would toggle group manager"
                );
                continue;
            }
            match self
                .api
                .set_group_manager(group_id, live.user_id, want_manager)
            {
                Ok(()) => {
                    info!(email = %live.email, group_id, manager = want_manager, "group manager toggled")
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(email = %live.email, error = %e, "group manager toggle failed");
                    report
                        .errors
                        .push(format!("manager {}: {}", live.email, e));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::HashSet;

    use campsync_core::UserStatus;
    use campsync_timecamp::model::LiveGroup;

    /// In-memory TimeCamp double. Writes mutate the stored state the way
    /// the real service would, so a second engine run sees a converged
    /// snapshot; every write is also appended to an ordered log.
    struct FakeApi {
        users: RefCell<Vec<LiveUser>>,
        groups: RefCell<Vec<LiveGroup>>,
        roles: RefCell<HashMap<u64, Vec<RoleAssignment>>>,
        writes: RefCell<Vec<String>>,
        next_id: Cell<u64>,
        fail_group: Option<String>,
    }

    impl FakeApi {
        fn new() -> Self {
            Self {
                users: RefCell::new(Vec::new()),
                groups: RefCell::new(Vec::new()),
                roles: RefCell::new(HashMap::new()),
                writes: RefCell::new(Vec::new()),
                next_id: Cell::new(500),
                fail_group: None,
            }
        }

        fn with_user(self, user: LiveUser) -> Self {
            let role = RoleAssignment {
                group_id: user.group_id,
                role_id: "3".to_string(),
            };
            self.roles.borrow_mut().entry(user.user_id).or_default().push(role);
            self.users.borrow_mut().push(user);
            self
        }

        fn with_group(self, group_id: u64, parent_id: u64, name: &str) -> Self {
            self.groups.borrow_mut().push(LiveGroup {
                group_id,
                parent_id: Some(parent_id),
                name: name.to_string(),
                path: None,
            });
            self
        }

        fn with_role(self, user_id: u64, group_id: u64, role_id: &str) -> Self {
            {
                let mut list = self.roles.borrow_mut();
                let entry = list.entry(user_id).or_default();
                entry.retain(|a| a.group_id != group_id);
                entry.push(RoleAssignment {
                    group_id,
                    role_id: role_id.to_string(),
                });
            }
            self
        }

        fn writes(&self) -> Vec<String> {
            self.writes.borrow().clone()
        }

        fn clear_writes(&self) {
            self.writes.borrow_mut().clear();
        }

        fn user(&self, user_id: u64) -> LiveUser {
            self.users
                .borrow()
                .iter()
                .find(|u| u.user_id == user_id)
                .cloned()
                .unwrap()
        }

        fn take_id(&self) -> u64 {
            let id = self.next_id.get();
            self.next_id.set(id + 1);
            id
        }
    }

    impl TimeCamp for FakeApi {
        fn get_users(&self) -> Result<Vec<LiveUser>, SyncError> {
            Ok(self.users.borrow().clone())
        }

        fn get_groups(&self) -> Result<Vec<LiveGroup>, SyncError> {
            Ok(self.groups.borrow().clone())
        }

        fn get_user_roles(&self) -> Result<HashMap<u64, Vec<RoleAssignment>>, SyncError> {
            Ok(self.roles.borrow().clone())
        }

        fn add_user(&self, email: &str, name: &str, group_id: u64) -> Result<u64, SyncError> {
            let user_id = self.take_id();
            self.writes
                .borrow_mut()
                .push(format!("add_user:{}:{}", email, group_id));
            self.users.borrow_mut().push(LiveUser {
                user_id,
                email: email.to_string(),
                display_name: name.to_string(),
                group_id,
                enabled: true,
                added_manually: false,
                additional_email: None,
                external_id: None,
            });
            // A fresh account starts as a regular user in its group.
            self.roles.borrow_mut().entry(user_id).or_default().push(RoleAssignment {
                group_id,
                role_id: "3".to_string(),
            });
            Ok(user_id)
        }

        fn update_user(
            &self,
            user_id: u64,
            current_group_id: u64,
            patch: &UserPatch,
        ) -> Result<(), SyncError> {
            self.writes
                .borrow_mut()
                .push(format!("update_user:{}:{}", user_id, patch.describe()));

            let mut users = self.users.borrow_mut();
            let user = users
                .iter_mut()
                .find(|u| u.user_id == user_id)
                .ok_or_else(|| SyncError::NotFound(format!("user {}", user_id)))?;

            if let Some(ref name) = patch.name {
                user.display_name = name.clone();
            }
            if let Some(ref email) = patch.email {
                user.email = email.clone();
            }
            if let Some(ref additional) = patch.additional_email {
                user.additional_email = Some(additional.clone());
            }
            if let Some(ref external) = patch.external_id {
                user.external_id = Some(external.clone());
            }
            if let Some(group) = patch.group_id {
                user.group_id = group;
            }
            if let Some(active) = patch.active {
                user.enabled = active;
            }
            if let Some(role) = patch.role_id {
                let group = patch.group_id.unwrap_or(current_group_id);
                let mut roles = self.roles.borrow_mut();
                let entry = roles.entry(user_id).or_default();
                entry.retain(|a| a.group_id != group);
                entry.push(RoleAssignment {
                    group_id: group,
                    role_id: role.wire_id().to_string(),
                });
            }
            Ok(())
        }

        fn add_group(&self, name: &str, parent_id: u64) -> Result<u64, SyncError> {
            if self.fail_group.as_deref() == Some(name) {
                return Err(SyncError::PermissionDenied(format!(
                    "cannot create {}",
                    name
                )));
            }
            let group_id = self.take_id();
            self.writes
                .borrow_mut()
                .push(format!("add_group:{}:{}", name, parent_id));
            self.groups.borrow_mut().push(LiveGroup {
                group_id,
                parent_id: Some(parent_id),
                name: name.to_string(),
                path: None,
            });
            Ok(group_id)
        }

        fn set_group_manager(
            &self,
            group_id: u64,
            user_id: u64,
            on: bool,
        ) -> Result<(), SyncError> {
            self.writes
                .borrow_mut()
                .push(format!("set_manager:{}:{}:{}", group_id, user_id, on));
            let mut roles = self.roles.borrow_mut();
            let entry = roles.entry(user_id).or_default();
            entry.retain(|a| a.group_id != group_id);
            entry.push(RoleAssignment {
                group_id,
                role_id: if on { "2" } else { "3" }.to_string(),
            });
            Ok(())
        }

        fn set_user_setting(&self, user_id: u64, name: &str, value: &str) -> Result<(), SyncError> {
            self.writes
                .borrow_mut()
                .push(format!("set_setting:{}:{}:{}", user_id, name, value));
            let mut users = self.users.borrow_mut();
            if let Some(user) = users.iter_mut().find(|u| u.user_id == user_id) {
                match name {
                    "disabled_user" => user.enabled = value != "1",
                    "added_manually" => user.added_manually = value == "1",
                    "external_id" => user.external_id = Some(value.to_string()),
                    "additional_email" => user.additional_email = Some(value.to_string()),
                    _ => {}
                }
            }
            Ok(())
        }
    }

    const ROOT: u64 = 100;

    fn config() -> TimeCampConfig {
        TimeCampConfig {
            api_key: "test".to_string(),
            domain: "app.timecamp.com".to_string(),
            root_group_id: ROOT,
            ignored_user_ids: HashSet::new(),
            show_external_id: false,
            use_supervisor_groups: false,
            use_department_groups: true,
            use_job_title_name_users: false,
            use_job_title_name_groups: false,
            use_is_supervisor_role: false,
            skip_departments: String::new(),
            replace_email_domain: String::new(),
            disable_new_users: false,
            disable_user_deactivation: false,
            disable_external_id_sync: false,
            disable_additional_email_sync: false,
            disable_manual_user_updates: false,
            disable_group_updates: false,
            disable_role_updates: false,
            disable_groups_creation: false,
            disabled_users_group_id: 0,
        }
    }

    fn desired(email: &str, external_id: &str, name: &str, breadcrumb: &str) -> DesiredUser {
        DesiredUser {
            timecamp_external_id: external_id.to_string(),
            timecamp_user_name: name.to_string(),
            timecamp_email: email.to_string(),
            timecamp_real_email: None,
            timecamp_groups_breadcrumb: breadcrumb.to_string(),
            timecamp_status: UserStatus::Active,
            timecamp_role: Role::User,
        }
    }

    fn live(user_id: u64, email: &str, name: &str, group_id: u64) -> LiveUser {
        LiveUser {
            user_id,
            email: email.to_string(),
            display_name: name.to_string(),
            group_id,
            enabled: true,
            added_manually: false,
            additional_email: None,
            external_id: None,
        }
    }

    fn run(api: &FakeApi, config: &TimeCampConfig, desired: &[DesiredUser]) -> SyncReport {
        SyncEngine::new(api, config)
            .run(desired, &SyncOptions::default())
            .unwrap()
    }

    #[test]
    fn creates_groups_before_users_and_converges() {
        let api = FakeApi::new();
        let config = config();
        let plan = vec![
            desired("a@x.com", "e1", "A", "Eng"),
            desired("b@x.com", "e2", "B", "Eng/Platform"),
        ];

        let report = run(&api, &config, &plan);
        assert_eq!(report.groups_created, 2);
        assert_eq!(report.users_created, 2);
        assert!(!report.has_errors());

        // Every group creation precedes every user referencing one.
        let writes = api.writes();
        let last_group = writes.iter().rposition(|w| w.starts_with("add_group")).unwrap();
        let first_user = writes.iter().position(|w| w.starts_with("add_user")).unwrap();
        assert!(last_group < first_user, "writes: {:?}", writes);

        // The second run against the converged state plans nothing.
        api.clear_writes();
        let second = run(&api, &config, &plan);
        assert_eq!(second.total_writes(), 0, "writes: {:?}", api.writes());
    }

    #[test]
    fn parent_groups_are_created_before_children() {
        let api = FakeApi::new();
        let plan = vec![desired("a@x.com", "e1", "A", "Eng/Platform/Tools")];

        run(&api, &config(), &plan);
        let writes = api.writes();
        let groups: Vec<&String> = writes
            .iter()
            .filter(|w| w.starts_with("add_group"))
            .collect();
        assert_eq!(groups.len(), 3);
        assert!(groups[0].starts_with("add_group:Eng:"));
        assert!(groups[1].starts_with("add_group:Platform:"));
        assert!(groups[2].starts_with("add_group:Tools:"));
    }

    #[test]
    fn rename_is_matched_by_external_id() {
        let mut old = live(50, "old@x.com", "Fifty", ROOT);
        old.external_id = Some("u50".to_string());
        let api = FakeApi::new().with_user(old);

        let plan = vec![desired("new@x.com", "u50", "Fifty", "")];
        let report = run(&api, &config(), &plan);

        assert_eq!(report.users_updated, 1);
        assert_eq!(report.users_created, 0);
        assert_eq!(report.users_deactivated, 0);

        let user = api.user(50);
        assert_eq!(user.email, "new@x.com");
        // The old primary was preserved in the empty additional slot.
        assert_eq!(user.additional_email.as_deref(), Some("old@x.com"));
        // No group move happened.
        assert_eq!(user.group_id, ROOT);
        assert_eq!(
            api.writes()
                .iter()
                .filter(|w| w.starts_with("update_user"))
                .count(),
            1
        );
    }

    #[test]
    fn missing_user_is_deactivated_into_disabled_group() {
        let mut config = config();
        config.disabled_users_group_id = 999;
        let api = FakeApi::new().with_user(live(60, "gone@x.com", "Gone", ROOT));

        let report = run(&api, &config, &[]);
        assert_eq!(report.users_deactivated, 1);

        let user = api.user(60);
        assert!(!user.enabled);
        assert_eq!(user.group_id, 999);
        // One patch covered both the deactivation and the move.
        assert_eq!(
            api.writes()
                .iter()
                .filter(|w| w.starts_with("update_user"))
                .count(),
            1
        );
    }

    #[test]
    fn matched_inactive_desired_user_is_deactivated() {
        let api = FakeApi::new().with_user(live(61, "leaver@x.com", "Leaver", ROOT));
        let mut leaver = desired("leaver@x.com", "e61", "Leaver", "");
        leaver.timecamp_status = UserStatus::Inactive;

        let report = run(&api, &config(), &[leaver]);
        assert_eq!(report.users_deactivated, 1);
        assert!(!api.user(61).enabled);
    }

    #[test]
    fn deactivation_can_be_disabled() {
        let mut config = config();
        config.disable_user_deactivation = true;
        let api = FakeApi::new().with_user(live(60, "gone@x.com", "Gone", ROOT));

        let report = run(&api, &config, &[]);
        assert_eq!(report.users_deactivated, 0);
        assert!(api.user(60).enabled);
    }

    #[test]
    fn returning_user_is_reactivated() {
        let mut returning = live(70, "back@x.com", "Back", ROOT);
        returning.enabled = false;
        let api = FakeApi::new().with_user(returning);

        let plan = vec![desired("back@x.com", "e70", "Back", "")];
        let report = run(&api, &config(), &plan);
        assert_eq!(report.users_activated, 1);
        assert!(api.user(70).enabled);

        api.clear_writes();
        let second = run(&api, &config(), &plan);
        assert_eq!(second.total_writes(), 0);
    }

    #[test]
    fn no_create_mode_only_ensures_groups_for_matched_users() {
        let mut config = config();
        config.disable_new_users = true;
        let api = FakeApi::new().with_user(live(80, "a@x.com", "A", ROOT));

        let plan = vec![
            desired("a@x.com", "e1", "A", "Eng"),
            desired("newcomer@x.com", "e2", "N", "Sales"),
        ];
        let report = run(&api, &config, &plan);

        assert_eq!(report.users_created, 0);
        assert_eq!(report.groups_created, 1);
        let writes = api.writes();
        assert!(writes.iter().any(|w| w.starts_with("add_group:Eng")));
        assert!(!writes.iter().any(|w| w.starts_with("add_group:Sales")));
        assert!(!writes.iter().any(|w| w.starts_with("add_user")));
    }

    #[test]
    fn ignored_users_are_never_mutated() {
        let mut config = config();
        config.ignored_user_ids.insert(90);
        let api = FakeApi::new().with_user(live(90, "vip@x.com", "Old Name", ROOT));

        let plan = vec![desired("vip@x.com", "e90", "New Name", "")];
        let report = run(&api, &config, &plan);

        assert_eq!(report.users_updated, 0);
        assert_eq!(report.users_skipped, 1);
        assert_eq!(api.user(90).display_name, "Old Name");
    }

    #[test]
    fn manual_users_are_skipped_when_configured() {
        let mut config = config();
        config.disable_manual_user_updates = true;
        let mut manual = live(91, "manual@x.com", "Old", ROOT);
        manual.added_manually = true;
        let api = FakeApi::new().with_user(manual);

        // Neither the update (name differs) nor the deactivation path
        // touches the manually added user.
        let plan = vec![desired("manual@x.com", "e91", "New", "")];
        let report = run(&api, &config, &plan);
        assert_eq!(report.users_updated, 0);
        assert_eq!(report.users_skipped, 1);

        let second = run(&api, &config, &[]);
        assert_eq!(second.users_deactivated, 0);
        assert!(api.user(91).enabled);
    }

    #[test]
    fn added_manually_is_cleared_after_an_update() {
        let mut manual = live(92, "claimed@x.com", "Old", ROOT);
        manual.added_manually = true;
        let api = FakeApi::new().with_user(manual);

        let plan = vec![desired("claimed@x.com", "e92", "New", "")];
        run(&api, &config(), &plan);

        assert!(!api.user(92).added_manually);
        assert!(api
            .writes()
            .iter()
            .any(|w| w == "set_setting:92:added_manually:0"));
    }

    #[test]
    fn dry_run_counts_intended_writes_without_performing_any() {
        let api = FakeApi::new().with_user(live(60, "gone@x.com", "Gone", ROOT));
        let plan = vec![desired("new@x.com", "e1", "N", "Eng")];

        let report = SyncEngine::new(&api, &config())
            .run(&plan, &SyncOptions { dry_run: true })
            .unwrap();

        assert_eq!(report.groups_created, 1);
        assert_eq!(report.users_created, 1);
        assert_eq!(report.users_deactivated, 1);
        assert!(api.writes().is_empty());
        assert!(api.user(60).enabled);
    }

    #[test]
    fn new_user_gets_follow_up_attributes() {
        let api = FakeApi::new();
        let mut newcomer = desired("s@x.com", "ext-s", "Super", "Eng");
        newcomer.timecamp_role = Role::Supervisor;
        newcomer.timecamp_real_email = Some("real@x.com".to_string());

        let report = run(&api, &config(), &[newcomer]);
        assert_eq!(report.users_created, 1);

        // Id 500 went to the Eng group, 501 to the user.
        let user = api.user(501);
        assert_eq!(user.external_id.as_deref(), Some("ext-s"));
        assert_eq!(user.additional_email.as_deref(), Some("real@x.com"));
        assert!(!user.added_manually);
    }

    #[test]
    fn group_creation_failure_skips_users_behind_it() {
        let mut api = FakeApi::new();
        api.fail_group = Some("Broken".to_string());
        let plan = vec![
            desired("ok@x.com", "e1", "Ok", "Fine"),
            desired("stuck@x.com", "e2", "Stuck", "Broken/Team"),
        ];

        let report = run(&api, &config(), &plan);
        assert_eq!(report.users_created, 1);
        assert_eq!(report.users_skipped, 1);
        assert!(report.has_errors());
        assert!(!api.writes().iter().any(|w| w.contains("stuck@x.com")));
    }

    #[test]
    fn supervisor_becomes_manager_of_own_group() {
        let mut config = config();
        config.use_department_groups = false;
        config.use_supervisor_groups = true;

        let api = FakeApi::new()
            .with_group(200, ROOT, "Alice")
            .with_user(live(10, "alice@x.com", "Alice", 200));

        let mut alice = desired("alice@x.com", "e10", "Alice", "Alice");
        alice.timecamp_role = Role::Supervisor;

        run(&api, &config, &[alice]);
        assert!(api
            .writes()
            .iter()
            .any(|w| w == "set_manager:200:10:true"));
    }

    #[test]
    fn losing_supervisor_role_clears_manager_flag() {
        let mut config = config();
        config.use_department_groups = false;
        config.use_supervisor_groups = true;

        let api = FakeApi::new()
            .with_group(200, ROOT, "Alice")
            .with_user(live(11, "bob@x.com", "Bob", 200))
            .with_role(11, 200, "2");

        let bob = desired("bob@x.com", "e11", "Bob", "Alice");
        run(&api, &config, &[bob]);
        assert!(api
            .writes()
            .iter()
            .any(|w| w == "set_manager:200:11:false"));
    }

    #[test]
    fn administrators_are_not_made_group_managers() {
        let mut config = config();
        config.use_department_groups = false;
        config.use_supervisor_groups = true;

        let api = FakeApi::new()
            .with_group(200, ROOT, "Alice")
            .with_user(live(12, "root@x.com", "Root", 200));

        let mut admin = desired("root@x.com", "e12", "Root", "Alice");
        admin.timecamp_role = Role::Administrator;

        run(&api, &config, &[admin]);
        assert!(!api
            .writes()
            .iter()
            .any(|w| w.starts_with("set_manager:200:12:true")));
    }

    #[test]
    fn duplicate_desired_match_is_skipped_not_created() {
        let mut shared = live(95, "shared@x.com", "Shared", ROOT);
        shared.additional_email = Some("alias@x.com".to_string());
        let api = FakeApi::new().with_user(shared);

        let plan = vec![
            desired("shared@x.com", "e95", "Shared", ""),
            desired("alias@x.com", "e96", "Alias", ""),
        ];
        let report = run(&api, &config(), &plan);
        assert_eq!(report.users_created, 0);
        assert_eq!(report.users_skipped, 1);
    }

    #[test]
    fn prepared_users_resolve_one_to_one_after_sync() {
        use campsync_core::{Person, SourceFile};

        let person = |id: &str, name: &str, email: &str, sup: &str, is_sup: bool| Person {
            external_id: id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            real_email: String::new(),
            status: "active".to_string(),
            department: String::new(),
            supervisor_id: sup.to_string(),
            is_supervisor: is_sup,
            job_title: String::new(),
            force_global_admin_role: false,
            force_supervisor_role: false,
            role_id: None,
        };
        let source = SourceFile {
            users: vec![
                person("1", "Alice", "alice@x.com", "", true),
                person("2", "Bob", "bob@x.com", "1", true),
                person("3", "Carol", "carol@x.com", "2", false),
                person("4", "Dan", "dan@x.com", "1", false),
                person("5", "Eve", "eve@x.com", "", false),
            ],
        };

        let mut config = config();
        config.use_department_groups = false;
        config.use_supervisor_groups = true;

        let plan = campsync_prepare::prepare(&source, &config);
        let api = FakeApi::new();
        run(&api, &config, &plan);

        // Every desired user now resolves to exactly one live user.
        assert_eq!(api.users.borrow().len(), plan.len());
        api.clear_writes();
        let second = run(&api, &config, &plan);
        assert_eq!(second.users_created, 0);
        assert_eq!(second.users_deactivated, 0);
        assert_eq!(second.users_skipped, 0);
    }

    #[test]
    fn group_updates_can_be_disabled() {
        let mut config = config();
        config.disable_group_updates = true;
        let api = FakeApi::new()
            .with_group(201, ROOT, "Eng")
            .with_user(live(20, "a@x.com", "A", ROOT));

        let plan = vec![desired("a@x.com", "e20", "A", "Eng")];
        run(&api, &config, &plan);
        assert_eq!(api.user(20).group_id, ROOT);
    }
}
