use campsync_core::Role;

/// A group as it exists in TimeCamp right now.
///
/// `path` is the slash-separated breadcrumb relative to the configured
/// root group; `None` for groups outside the root's subtree (the root
/// itself has the empty path).
#[derive(Debug, Clone)]
pub struct LiveGroup {
    pub group_id: u64,
    pub parent_id: Option<u64>,
    pub name: String,
    pub path: Option<String>,
}

/// A user as it exists in TimeCamp right now, merged from the user
/// listing and the per-user settings (`disabled_user`, `added_manually`,
/// `external_id`, `additional_email`).
#[derive(Debug, Clone)]
pub struct LiveUser {
    pub user_id: u64,
    pub email: String,
    pub display_name: String,
    pub group_id: u64,
    pub enabled: bool,
    pub added_manually: bool,
    pub additional_email: Option<String>,
    pub external_id: Option<String>,
}

/// One group/role pair from the role listing.
#[derive(Debug, Clone)]
pub struct RoleAssignment {
    pub group_id: u64,
    pub role_id: String,
}

/// Partial update for a live user. Only present fields are written; the
/// adapter translates each field onto the right endpoint.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub additional_email: Option<String>,
    pub external_id: Option<String>,
    pub group_id: Option<u64>,
    pub role_id: Option<Role>,
    pub active: Option<bool>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.additional_email.is_none()
            && self.external_id.is_none()
            && self.group_id.is_none()
            && self.role_id.is_none()
            && self.active.is_none()
    }

    /// Short human-readable list of the fields this patch touches.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.name.is_some() {
            parts.push("name");
        }
        if self.email.is_some() {
            parts.push("email");
        }
        if self.additional_email.is_some() {
            parts.push("additional_email");
        }
        if self.external_id.is_some() {
            parts.push("external_id");
        }
        if self.group_id.is_some() {
            parts.push("group");
        }
        if self.role_id.is_some() {
            parts.push("role");
        }
        match self.active {
            Some(true) => parts.push("activate"),
            Some(false) => parts.push("deactivate"),
            None => {}
        }
        parts.join(", ")
    }
}
