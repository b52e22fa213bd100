//! Role resolution.

use tracing::warn;

use campsync_core::{Person, Role, TimeCampConfig};

/// Resolve a person's TimeCamp role. Precedence, highest first:
/// forced admin, forced supervisor, the `is_supervisor` flag (when
/// enabled), the numeric `role_id` hint, then plain user.
pub fn resolve_role(person: &Person, config: &TimeCampConfig) -> Role {
    if person.force_global_admin_role {
        return Role::Administrator;
    }
    if person.force_supervisor_role {
        return Role::Supervisor;
    }
    if config.use_is_supervisor_role && person.is_supervisor {
        return Role::Supervisor;
    }
    if let Some(role_id) = person.role_id.as_deref() {
        return match role_id.trim() {
            "1" => Role::Administrator,
            "2" => Role::Supervisor,
            "3" => Role::User,
            other => {
                warn!(
                    person = %person.external_id,
                    role_id = other,
                    "unknown role id, defaulting to user"
                );
                Role::User
            }
        };
    }
    Role::User
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{person, test_config};

    #[test]
    fn forced_admin_beats_everything() {
        let config = test_config();
        let mut p = person("1", "A", "a@x.com", "", true);
        p.force_global_admin_role = true;
        p.force_supervisor_role = true;
        assert_eq!(resolve_role(&p, &config), Role::Administrator);
    }

    #[test]
    fn forced_supervisor_beats_role_id() {
        let config = test_config();
        let mut p = person("1", "A", "a@x.com", "", false);
        p.force_supervisor_role = true;
        p.role_id = Some("1".to_string());
        assert_eq!(resolve_role(&p, &config), Role::Supervisor);
    }

    #[test]
    fn is_supervisor_flag_needs_opt_in() {
        let mut config = test_config();
        let p = person("1", "A", "a@x.com", "", true);
        assert_eq!(resolve_role(&p, &config), Role::User);

        config.use_is_supervisor_role = true;
        assert_eq!(resolve_role(&p, &config), Role::Supervisor);
    }

    #[test]
    fn role_id_mapping() {
        let config = test_config();
        let mut p = person("1", "A", "a@x.com", "", false);
        for (id, expected) in [
            ("1", Role::Administrator),
            ("2", Role::Supervisor),
            ("3", Role::User),
            ("5", Role::User),
            ("weird", Role::User),
        ] {
            p.role_id = Some(id.to_string());
            assert_eq!(resolve_role(&p, &config), expected, "role_id {}", id);
        }
    }

    #[test]
    fn default_is_user() {
        let config = test_config();
        let p = person("1", "A", "a@x.com", "", false);
        assert_eq!(resolve_role(&p, &config), Role::User);
    }
}
