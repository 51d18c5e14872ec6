//! GitHub-generated "noreply" commit addresses.
//!
//! GitHub hides a user's email behind `<id>+<login>@users.noreply.github.com`
//! (or the older `<login>@users.noreply.github.com`), so the login can be read
//! straight from the address.

/// Noreply domain used by github.com.
pub const GITHUB_NOREPLY_DOMAIN: &str = "users.noreply.github.com";

/// Extract the login from a noreply address on `domain`.
pub fn extract_login<'a>(email: &'a str, domain: &str) -> Option<&'a str> {
    let (local, host) = email.trim().rsplit_once('@')?;
    if !host.eq_ignore_ascii_case(domain) {
        return None;
    }

    let login = match local.split_once('+') {
        Some((id, login)) if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) => login,
        Some(_) => return None,
        None => local,
    };

    let valid = !login.is_empty()
        && login
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '[' | ']'));
    valid.then_some(login)
}
