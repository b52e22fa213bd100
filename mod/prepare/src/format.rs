//! Display-name, group-segment, and email formatting.

use campsync_core::utils::{clean_name, pick_primary_email, replace_email_domain};
use campsync_core::{Person, TimeCampConfig};

/// Format a person's display name for TimeCamp.
///
/// The base name never carries decorations; the job title wraps it as
/// `"<title> [<name>]"` and the external id is appended last as
/// `" (<id>)"`.
pub fn display_name(person: &Person, config: &TimeCampConfig) -> String {
    let base = clean_name(&person.name);
    let title = clean_name(&person.job_title);

    let mut name = if config.use_job_title_name_users && !title.is_empty() {
        format!("{} [{}]", title, base)
    } else {
        base
    };

    if config.show_external_id && !person.external_id.is_empty() {
        name.push_str(&format!(" ({})", person.external_id));
    }
    name
}

/// Format a supervisor's name for use as a group path segment.
/// Group segments carry the job title when configured, never the
/// external id.
pub fn supervisor_segment(person: &Person, config: &TimeCampConfig) -> String {
    let base = clean_name(&person.name);
    let title = clean_name(&person.job_title);

    if config.use_job_title_name_groups && !title.is_empty() {
        format!("{} [{}]", title, base)
    } else {
        base
    }
}

/// Resolve the primary TimeCamp email: pick one address out of a possibly
/// comma-separated field, apply the domain replacement, lowercase.
pub fn primary_email(person: &Person, config: &TimeCampConfig) -> String {
    let picked = pick_primary_email(&person.email, &config.replace_email_domain);
    replace_email_domain(&picked, &config.replace_email_domain).to_lowercase()
}

/// Resolve the secondary email, if any. Dropped when it matches the
/// primary case-insensitively; domain replacement applies but the
/// original case is kept.
pub fn real_email(person: &Person, config: &TimeCampConfig, primary: &str) -> Option<String> {
    let raw = person.real_email.trim();
    if raw.is_empty() {
        return None;
    }
    let replaced = replace_email_domain(raw, &config.replace_email_domain);
    if replaced.eq_ignore_ascii_case(primary) {
        None
    } else {
        Some(replaced)
    }
}
