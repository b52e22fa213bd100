//! Supervisor-chain resolution and group-path derivation.
//!
//! The people set is a directed graph via `supervisor_id`. Every chain
//! walk carries a visited set, so cycles and dangling pointers terminate
//! cleanly with a warning instead of failing the run.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use campsync_core::utils::{clean_department_path, strip_skip_prefix};
use campsync_core::{Person, TimeCampConfig};

use crate::format::supervisor_segment;

/// Group-structure policy, selected by
/// `(use_department_groups, use_supervisor_groups)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupPolicy {
    /// Department strings become the group paths.
    DepartmentOnly,
    /// Paths follow the supervisor hierarchy.
    SupervisorOnly,
    /// Departments form the outer structure with one supervisor segment
    /// nested beneath.
    Hybrid,
    /// Everyone lands in the root group.
    Flat,
}

impl GroupPolicy {
    pub fn from_config(config: &TimeCampConfig) -> Self {
        match (config.use_department_groups, config.use_supervisor_groups) {
            (true, false) => GroupPolicy::DepartmentOnly,
            (false, true) => GroupPolicy::SupervisorOnly,
            (true, true) => GroupPolicy::Hybrid,
            (false, false) => GroupPolicy::Flat,
        }
    }

}

/// Index over the person set: lookups by external id plus the supervisor
/// predicate.
pub struct People<'a> {
    by_id: HashMap<&'a str, &'a Person>,
    /// Ids that count as supervisors: flagged in the source, or with at
    /// least one person reporting to them.
    supervisors: HashSet<&'a str>,
}

impl<'a> People<'a> {
    pub fn index(persons: &'a [Person]) -> Self {
        let mut by_id = HashMap::new();
        let mut supervisors = HashSet::new();

        for person in persons {
            if person.external_id.is_empty() {
                continue;
            }
            by_id.insert(person.external_id.as_str(), person);
            if person.is_supervisor {
                supervisors.insert(person.external_id.as_str());
            }
        }
        for person in persons {
            if let Some(sup_id) = person.supervisor_ref() {
                if let Some(sup) = by_id.get(sup_id) {
                    supervisors.insert(sup.external_id.as_str());
                }
            }
        }

        Self { by_id, supervisors }
    }

    pub fn get(&self, id: &str) -> Option<&'a Person> {
        self.by_id.get(id).copied()
    }

    pub fn is_supervisor(&self, id: &str) -> bool {
        self.supervisors.contains(id)
    }

    /// Walk the supervisor chain upward from `person` and return the
    /// slash-joined path of supervisor segments, root-most first, with
    /// `person` as the last segment. Only meaningful for supervisors.
    fn own_supervisor_path(&self, person: &Person, config: &TimeCampConfig) -> String {
        let mut chain = vec![person];
        let mut visited: HashSet<&str> = HashSet::from([person.external_id.as_str()]);
        let mut current = person;

        while let Some(sup_id) = current.supervisor_ref() {
            let Some(sup) = self.get(sup_id) else {
                warn!(
                    person = %current.external_id,
                    supervisor = sup_id,
                    "dangling supervisor pointer, treating as top of chain"
                );
                break;
            };
            if !visited.insert(sup.external_id.as_str()) {
                warn!(
                    person = %current.external_id,
                    supervisor = sup_id,
                    "supervisor cycle detected, treating as top of chain"
                );
                break;
            }
            chain.push(sup);
            current = sup;
        }

        chain
            .iter()
            .rev()
            .map(|p| supervisor_segment(p, config))
            .filter(|seg| !seg.is_empty())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// The supervisor-hierarchy group path for a person: supervisors sit
    /// in their own group, everyone else in their supervisor's, and
    /// people with neither land at the root.
    fn supervisor_group_path(&self, person: &Person, config: &TimeCampConfig) -> String {
        if self.is_supervisor(&person.external_id) {
            return self.own_supervisor_path(person, config);
        }
        match person.supervisor_ref().and_then(|id| self.get(id)) {
            Some(supervisor) => self.own_supervisor_path(supervisor, config),
            None => String::new(),
        }
    }

    /// Department path after normalisation and prefix stripping.
    fn department_path(&self, person: &Person, config: &TimeCampConfig) -> String {
        let normalised = clean_department_path(&person.department);
        strip_skip_prefix(&normalised, &config.skip_departments)
    }

    /// Compute the group breadcrumb for a person under the given policy.
    pub fn group_path(
        &self,
        person: &Person,
        policy: GroupPolicy,
        config: &TimeCampConfig,
    ) -> String {
        match policy {
            GroupPolicy::Flat => String::new(),
            GroupPolicy::DepartmentOnly => self.department_path(person, config),
            GroupPolicy::SupervisorOnly => self.supervisor_group_path(person, config),
            GroupPolicy::Hybrid => {
                let department = self.department_path(person, config);
                if department.is_empty() {
                    return self.supervisor_group_path(person, config);
                }

                // One supervisor segment nests beneath the department:
                // a supervisor's own, or the direct supervisor's.
                let segment = if self.is_supervisor(&person.external_id) {
                    supervisor_segment(person, config)
                } else {
                    person
                        .supervisor_ref()
                        .and_then(|id| self.get(id))
                        .map(|sup| supervisor_segment(sup, config))
                        .unwrap_or_default()
                };

                if segment.is_empty() {
                    department
                } else {
                    format!("{}/{}", department, segment)
                }
            }
        }
    }
}
