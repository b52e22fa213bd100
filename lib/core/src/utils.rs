//! Name, path, and email normalisation shared by the pipeline stages.

/// Normalise a display name or path segment: trim, collapse internal
/// whitespace runs to a single space, strip control characters.
pub fn clean_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_space = false;
    for ch in name.trim().chars() {
        if ch.is_control() {
            continue;
        }
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(ch);
    }
    out
}

/// Normalise a slash-separated department path: each segment is cleaned,
/// empty segments are dropped, the rest rejoined with `/`.
///
/// `"A / B"` and `"A/  /B"` both normalise to `"A/B"`; the result never
/// has leading or trailing slashes.
pub fn clean_department_path(path: &str) -> String {
    path.split('/')
        .map(clean_name)
        .filter(|seg| !seg.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Strip the first matching skip prefix from a normalised department path.
///
/// `skip_departments` is a comma-separated list of alternative prefixes,
/// tried in order. Matches are segment-aligned: prefix `"Company"` matches
/// `"Company/Eng"` but never `"CompanyWide/Eng"`. A prefix equal to the
/// whole path empties it. No match leaves the path unchanged.
pub fn strip_skip_prefix(path: &str, skip_departments: &str) -> String {
    if path.is_empty() || skip_departments.trim().is_empty() {
        return path.to_string();
    }

    let segments: Vec<&str> = path.split('/').collect();

    for prefix in skip_departments.split(',') {
        let prefix = clean_department_path(prefix);
        if prefix.is_empty() {
            continue;
        }
        let prefix_segments: Vec<&str> = prefix.split('/').collect();
        if segments.len() < prefix_segments.len() {
            continue;
        }
        if segments[..prefix_segments.len()] == prefix_segments[..] {
            return segments[prefix_segments.len()..].join("/");
        }
    }

    path.to_string()
}

/// Replace the domain part of an email address. A leading `@` on
/// `new_domain` is optional. Addresses without exactly one `@` pass
/// through untouched.
pub fn replace_email_domain(email: &str, new_domain: &str) -> String {
    if new_domain.is_empty() || email.is_empty() {
        return email.to_string();
    }
    let domain = new_domain.trim_start_matches('@');
    match email.split_once('@') {
        Some((local, _)) if !local.is_empty() => format!("{}@{}", local, domain),
        _ => email.to_string(),
    }
}

/// Pick the primary address out of a possibly comma-separated email field.
///
/// When `replace_domain` is configured, the address already on that domain
/// wins; otherwise the first one does.
pub fn pick_primary_email(raw: &str, replace_domain: &str) -> String {
    let candidates: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .collect();

    if candidates.is_empty() {
        return String::new();
    }

    if !replace_domain.is_empty() {
        let wanted = replace_domain.trim_start_matches('@').to_lowercase();
        if let Some(found) = candidates.iter().find(|e| {
            e.rsplit_once('@')
                .is_some_and(|(_, d)| d.to_lowercase() == wanted)
        }) {
            return (*found).to_string();
        }
    }

    candidates[0].to_string()
}

/// Parse a boolean environment value. Accepts `true|false|1|0`,
/// case-insensitive.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}
