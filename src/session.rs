//! Cookie-session token record and the key/value bag it is persisted in.
//!
//! The session middleware owns the credential; this module only defines the
//! shape of the data stored inside it. [`SessionTokens`] is the five-field
//! record mutated exclusively by the refresher, and [`SessionProperties`] is
//! the persisted key/value view the hosting middleware hands over per request.
//! `expires_at` always reflects the expiry of the currently stored access
//! token; [`SessionTokens::write_to`] replaces all five keys in one call so no
//! reader ever observes a half-updated record.

// crates.io
use time::{
	UtcOffset,
	format_description::{BorrowedFormatItem, well_known::Rfc3339},
	macros::format_description,
};
// self
use crate::_prelude::*;

/// Round-trip timestamp layout used for the persisted `expires_at` value,
/// e.g. `2024-01-01T00:00:00.0000000+00:00`. Seven subsecond digits and an
/// explicit offset keep the serialized instant lossless.
const EXPIRES_AT_FORMAT: &[BorrowedFormatItem<'static>] = format_description!(
	"[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:7][offset_hour \
	 sign:mandatory]:[offset_minute]"
);

/// Renders an instant in the fixed round-trip layout, normalized to UTC.
pub fn format_expires_at(instant: OffsetDateTime) -> String {
	// Infallible for this fixed description; an empty value would simply fail
	// open on the next read.
	instant.to_offset(UtcOffset::UTC).format(EXPIRES_AT_FORMAT).unwrap_or_default()
}

/// Parses a persisted `expires_at` value, returning `None` on malformed input.
pub fn parse_expires_at(raw: &str) -> Option<OffsetDateTime> {
	OffsetDateTime::parse(raw, &Rfc3339).ok()
}

/// Redacted token wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// The per-session token record stored inside the session credential.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionTokens {
	/// Access token presented to protected resources.
	pub access_token: TokenSecret,
	/// Validated ID token the current claims principal was derived from.
	pub id_token: TokenSecret,
	/// Refresh token exchanged at the provider's token endpoint.
	pub refresh_token: TokenSecret,
	/// Token type reported by the provider (usually `Bearer`).
	pub token_type: String,
	/// Expiry of the currently stored access token.
	pub expires_at: OffsetDateTime,
}
impl SessionTokens {
	/// Reads a complete record out of the persisted properties.
	///
	/// Returns `None` when any of the five fields is absent or the stored
	/// expiry does not parse; partial records are never surfaced.
	pub fn read_from(properties: &SessionProperties) -> Option<Self> {
		Some(Self {
			access_token: TokenSecret::new(properties.token_value(SessionProperties::ACCESS_TOKEN)?),
			id_token: TokenSecret::new(properties.token_value(SessionProperties::ID_TOKEN)?),
			refresh_token: TokenSecret::new(
				properties.token_value(SessionProperties::REFRESH_TOKEN)?,
			),
			token_type: properties.token_value(SessionProperties::TOKEN_TYPE)?.to_owned(),
			expires_at: properties.expires_at()?,
		})
	}

	/// Replaces all five persisted fields in a single call.
	pub fn write_to(&self, properties: &mut SessionProperties) {
		properties.set_token_value(SessionProperties::ACCESS_TOKEN, self.access_token.expose());
		properties.set_token_value(SessionProperties::ID_TOKEN, self.id_token.expose());
		properties.set_token_value(SessionProperties::REFRESH_TOKEN, self.refresh_token.expose());
		properties.set_token_value(SessionProperties::TOKEN_TYPE, &self.token_type);
		properties
			.set_token_value(SessionProperties::EXPIRES_AT, &format_expires_at(self.expires_at));
	}
}

/// Key/value pairs persisted inside the session credential.
///
/// The refresher receives a read-only view scoped to the current request; the
/// session hook applies the produced record back through
/// [`SessionTokens::write_to`] when the refresher decides to rotate.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProperties(BTreeMap<String, String>);
impl SessionProperties {
	/// Property key holding the access token.
	pub const ACCESS_TOKEN: &'static str = "access_token";
	/// Property key holding the serialized expiry instant.
	pub const EXPIRES_AT: &'static str = "expires_at";
	/// Property key holding the ID token.
	pub const ID_TOKEN: &'static str = "id_token";
	/// Property key holding the refresh token.
	pub const REFRESH_TOKEN: &'static str = "refresh_token";
	/// Property key holding the token type.
	pub const TOKEN_TYPE: &'static str = "token_type";

	/// Creates an empty property bag.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the stored value for a token name, if present.
	pub fn token_value(&self, name: &str) -> Option<&str> {
		self.0.get(name).map(String::as_str)
	}

	/// Stores or replaces a single token value.
	pub fn set_token_value(&mut self, name: impl Into<String>, value: impl Into<String>) {
		self.0.insert(name.into(), value.into());
	}

	/// Parses the stored access-token expiry.
	///
	/// Absent or unparsable values yield `None`; the refresher fails open on
	/// such records because no refresh obligation can be determined safely.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		self.token_value(Self::EXPIRES_AT).and_then(parse_expires_at)
	}
}
impl Debug for SessionProperties {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let mut map = f.debug_map();

		for (key, value) in &self.0 {
			// Only the non-secret bookkeeping fields are printable.
			if key == Self::EXPIRES_AT || key == Self::TOKEN_TYPE {
				map.entry(key, value);
			} else {
				map.entry(key, &"<redacted>");
			}
		}

		map.finish()
	}
}
