//! ID-token claim views and the claims principal attached to a session.
//!
//! Inbound claims are not remapped to legacy claim URIs: the display name is
//! the plain `name` claim and roles come from `role`, matching what most OIDC
//! providers emit.

// crates.io
use serde_json::Value;
// self
use crate::_prelude::*;

/// Serde view of a validated ID-token payload.
///
/// `aud` and `role` keep their raw JSON shape because providers emit both the
/// single-string and array forms; the accessors below normalize them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IdTokenClaims {
	/// Issuer the token was minted by.
	pub iss: String,
	/// Subject identifier of the authenticated user.
	pub sub: String,
	/// Audience(s) the token is intended for; string or array of strings.
	pub aud: Value,
	/// Expiry as a Unix timestamp; enforced during signature validation.
	pub exp: i64,
	/// Issued-at Unix timestamp.
	pub iat: i64,
	/// Display name claim.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	/// Preferred username, used as a display-name fallback.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub preferred_username: Option<String>,
	/// Nonce from the original authorization request; refresh responses carry
	/// none, so its absence is never an error here.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub nonce: Option<String>,
	/// Access-token hash binding the ID token to the exchanged access token.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub at_hash: Option<String>,
	/// Role claim; string or array of strings.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub role: Option<Value>,
	/// Remaining provider-specific claims, preserved verbatim.
	#[serde(flatten)]
	pub extra: BTreeMap<String, Value>,
}
impl IdTokenClaims {
	/// Normalizes the `role` claim into a list of role names.
	pub fn roles(&self) -> Vec<String> {
		match &self.role {
			Some(Value::String(role)) => vec![role.clone()],
			Some(Value::Array(roles)) =>
				roles.iter().filter_map(Value::as_str).map(str::to_owned).collect(),
			_ => Vec::new(),
		}
	}

	/// Checks whether the audience claim names the given client id.
	pub fn audience_contains(&self, client_id: &str) -> bool {
		match &self.aud {
			Value::String(aud) => aud == client_id,
			Value::Array(auds) => auds.iter().any(|aud| aud.as_str() == Some(client_id)),
			_ => false,
		}
	}
}

/// The set of identity assertions attached to an authenticated session.
#[derive(Clone, Debug, PartialEq)]
pub struct ClaimsPrincipal {
	/// Stable subject identifier.
	pub subject: String,
	/// Display name, from the `name` claim with `preferred_username` fallback.
	pub name: Option<String>,
	/// Role names granted to the principal.
	pub roles: Vec<String>,
	/// The full validated claim set the principal was derived from.
	pub claims: BTreeMap<String, Value>,
}
impl ClaimsPrincipal {
	/// Derives a principal from a validated ID token's claims.
	pub fn from_id_token(claims: &IdTokenClaims) -> Self {
		let name = claims.name.clone().or_else(|| claims.preferred_username.clone());
		let roles = claims.roles();
		let claim_map = match serde_json::to_value(claims) {
			Ok(Value::Object(map)) => map.into_iter().collect(),
			_ => BTreeMap::new(),
		};

		Self { subject: claims.sub.clone(), name, roles, claims: claim_map }
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	fn claims(role: Value) -> IdTokenClaims {
		serde_json::from_value(json!({
			"iss": "https://id.example.com",
			"sub": "subject-1",
			"aud": "client-1",
			"exp": 1_750_000_000_i64,
			"iat": 1_749_996_400_i64,
			"name": "Ada Lovelace",
			"role": role,
			"tid": "tenant-9",
		}))
		.expect("Claim fixture should deserialize.")
	}

	#[test]
	fn roles_normalize_string_and_array_forms() {
		assert_eq!(claims(json!("admin")).roles(), vec!["admin".to_owned()]);
		assert_eq!(
			claims(json!(["reader", "writer"])).roles(),
			vec!["reader".to_owned(), "writer".to_owned()],
		);
	}

	#[test]
	fn audience_matches_both_forms() {
		let single = claims(json!("admin"));

		assert!(single.audience_contains("client-1"));
		assert!(!single.audience_contains("client-2"));

		let multi = IdTokenClaims { aud: json!(["client-1", "client-2"]), ..single };

		assert!(multi.audience_contains("client-2"));
	}

	#[test]
	fn principal_carries_subject_name_roles_and_extras() {
		let principal = ClaimsPrincipal::from_id_token(&claims(json!(["admin"])));

		assert_eq!(principal.subject, "subject-1");
		assert_eq!(principal.name.as_deref(), Some("Ada Lovelace"));
		assert_eq!(principal.roles, vec!["admin".to_owned()]);
		assert_eq!(principal.claims.get("tid"), Some(&json!("tenant-9")));
	}
}
