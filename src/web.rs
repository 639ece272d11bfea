//! Authentication route names and redirect hygiene for login/logout handlers.

// self
use crate::_prelude::*;

/// Base path segment under which the authentication routes are mounted.
pub const MODULE_PATH: &str = "oidc";
/// Login route, relative to the application root.
pub const LOGIN_PATH: &str = "/oidc/login";
/// Logout route, relative to the application root.
pub const LOGOUT_PATH: &str = "/oidc/logout";

/// Reduces a caller-supplied return URL to a safe, application-local path.
///
/// Absolute and protocol-relative URLs are stripped to their path and query so
/// the host can never be attacker-chosen. Empty input falls back to the
/// application base path; relative input is rooted under it.
pub fn sanitize_return_url(base_path: &str, return_url: Option<&str>) -> String {
	let raw = return_url.unwrap_or_default().trim();

	if raw.is_empty() {
		return base_path.to_owned();
	}
	if let Ok(url) = Url::parse(raw)
		&& url.has_host()
	{
		return local_part(&url);
	}
	// Protocol-relative input inherits the current scheme and an
	// attacker-chosen host; reduce it the same way as an absolute URL.
	if let Some(stripped) = raw.strip_prefix("//")
		&& let Ok(url) = Url::parse(&format!("https://{stripped}"))
	{
		return local_part(&url);
	}
	if raw.starts_with('/') {
		return raw.to_owned();
	}

	format!("{}/{raw}", base_path.trim_end_matches('/'))
}

fn local_part(url: &Url) -> String {
	match url.query() {
		Some(query) => format!("{}?{query}", url.path()),
		None => url.path().to_owned(),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn routes_are_rooted_under_the_module_path() {
		assert_eq!(LOGIN_PATH, format!("/{MODULE_PATH}/login"));
		assert_eq!(LOGOUT_PATH, format!("/{MODULE_PATH}/logout"));
	}

	#[test]
	fn empty_input_falls_back_to_base() {
		assert_eq!(sanitize_return_url("/", None), "/");
		assert_eq!(sanitize_return_url("/", Some("")), "/");
		assert_eq!(sanitize_return_url("/app", Some("  ")), "/app");
	}

	#[test]
	fn absolute_urls_are_reduced_to_local_paths() {
		assert_eq!(sanitize_return_url("/", Some("https://evil.example/x")), "/x");
		assert_eq!(
			sanitize_return_url("/", Some("https://evil.example/x?next=1")),
			"/x?next=1",
		);
	}

	#[test]
	fn protocol_relative_urls_lose_their_host() {
		assert_eq!(sanitize_return_url("/", Some("//evil.example/x")), "/x");
	}

	#[test]
	fn rooted_paths_pass_through() {
		assert_eq!(sanitize_return_url("/", Some("/already/rooted")), "/already/rooted");
		assert_eq!(sanitize_return_url("/", Some("/search?q=a%20b")), "/search?q=a%20b");
	}

	#[test]
	fn relative_paths_are_rooted_under_the_base() {
		assert_eq!(sanitize_return_url("/", Some("dashboard")), "/dashboard");
		assert_eq!(sanitize_return_url("/app/", Some("dashboard")), "/app/dashboard");
	}

	#[test]
	fn opaque_schemes_are_rooted_not_executed() {
		// `javascript:` URLs have no host, so they fall through to the
		// relative branch and end up as a harmless local path.
		assert_eq!(sanitize_return_url("/", Some("javascript:alert(1)")), "/javascript:alert(1)");
	}
}
