use serde::{Deserialize, Serialize};

/// A person as emitted by a source-system fetcher (BambooHR, Entra ID,
/// LDAP, FactorialHR). Keyed by `external_id`, which stays stable across
/// renames and is the cross-system identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    /// Stable unique identifier from the source system.
    pub external_id: String,

    /// Display name. May need whitespace normalisation.
    pub name: String,

    /// Primary email. Compared case-insensitively, lowercased on write.
    /// Some sources emit several comma-separated addresses here.
    pub email: String,

    /// Secondary/real email, used when the primary is a federated id.
    #[serde(default)]
    pub real_email: String,

    /// "active" or "inactive". Anything else is skipped with a warning.
    pub status: String,

    /// Slash-separated department path, e.g. "R&D/Information Security".
    #[serde(default)]
    pub department: String,

    /// `external_id` of this person's supervisor, if any.
    #[serde(default)]
    pub supervisor_id: String,

    /// Source-system hint that this person manages others.
    #[serde(default)]
    pub is_supervisor: bool,

    #[serde(default)]
    pub job_title: String,

    /// Overrides role resolution to `administrator`.
    #[serde(default)]
    pub force_global_admin_role: bool,

    /// Overrides role resolution to `supervisor`.
    #[serde(default)]
    pub force_supervisor_role: bool,

    /// Numeric role hint used by some sources ("1", "2", "3", ...).
    #[serde(default)]
    pub role_id: Option<String>,
}

impl Person {
    /// Supervisor pointer, with empty strings treated as "none".
    pub fn supervisor_ref(&self) -> Option<&str> {
        let id = self.supervisor_id.trim();
        if id.is_empty() { None } else { Some(id) }
    }
}

/// The stage-1 artifact: `{"users": [Person, ...]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    pub users: Vec<Person>,
}

/// User lifecycle status as stored in the artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
}

/// TimeCamp role, in decreasing order of privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Administrator,
    Supervisor,
    User,
}

impl Role {
    /// Wire value used by the TimeCamp role endpoints.
    pub fn wire_id(self) -> &'static str {
        match self {
            Role::Administrator => "1",
            Role::Supervisor => "2",
            Role::User => "3",
        }
    }
}

/// The normalised, policy-applied projection of a [`Person`] onto
/// TimeCamp's schema. The stage-2 artifact is a JSON array of these,
/// sorted ascending by `timecamp_email`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesiredUser {
    pub timecamp_external_id: String,

    pub timecamp_user_name: String,

    pub timecamp_email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timecamp_real_email: Option<String>,

    /// Canonical slash-separated group path under the configured root.
    /// Empty means "root group".
    pub timecamp_groups_breadcrumb: String,

    pub timecamp_status: UserStatus,

    pub timecamp_role: Role,
}

impl DesiredUser {
    pub fn is_active(&self) -> bool {
        self.timecamp_status == UserStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn person_supervisor_ref_empty_is_none() {
        let mut p: Person = serde_json::from_value(serde_json::json!({
            "external_id": "1",
            "name": "Alice",
            "email": "alice@example.com",
            "status": "active",
        }))
        .unwrap();
        assert_eq!(p.supervisor_ref(), None);

        p.supervisor_id = "  ".to_string();
        assert_eq!(p.supervisor_ref(), None);

        p.supervisor_id = "42".to_string();
        assert_eq!(p.supervisor_ref(), Some("42"));
    }

    #[test]
    fn desired_user_real_email_omitted_when_absent() {
        let user = DesiredUser {
            timecamp_external_id: "1".into(),
            timecamp_user_name: "Alice".into(),
            timecamp_email: "alice@example.com".into(),
            timecamp_real_email: None,
            timecamp_groups_breadcrumb: String::new(),
            timecamp_status: UserStatus::Active,
            timecamp_role: Role::User,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("timecamp_real_email"));
    }

    #[test]
    fn role_serde_is_lowercase() {
        assert_eq!(
            serde_json::to_string(&Role::Administrator).unwrap(),
            "\"administrator\""
        );
        let role: Role = serde_json::from_str("\"supervisor\"").unwrap();
        assert_eq!(role, Role::Supervisor);
    }

    #[test]
    fn role_wire_ids() {
        assert_eq!(Role::Administrator.wire_id(), "1");
        assert_eq!(Role::Supervisor.wire_id(), "2");
        assert_eq!(Role::User.wire_id(), "3");
    }

    #[test]
    fn source_file_round_trip() {
        let json = r#"{"users": [{"external_id": "e1", "name": "A",
            "email": "a@x.com", "status": "active", "department": "Eng",
            "supervisor_id": "", "is_supervisor": false}]}"#;
        let parsed: SourceFile = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.users.len(), 1);
        assert_eq!(parsed.users[0].department, "Eng");
        assert_eq!(parsed.users[0].role_id, None);
    }
}
