//! The refresh decision and the token-endpoint exchange.
//!
//! [`SessionRefresher::refresh`] is the whole pipeline: read the stored record,
//! decide whether the expiry window requires action, exchange the refresh
//! token, validate the returned ID token, and produce the replacement record.
//! It never touches the caller's session directly; the session hook applies
//! the returned [`RefreshOutcome`].

// self
use crate::{
	_prelude::*,
	claims::ClaimsPrincipal,
	error::ConfigError,
	metadata::MetadataResolver,
	session::{SessionProperties, SessionTokens, TokenSecret},
	settings::OidcSettings,
	validate::{
		IdTokenValidationError, TokenResponseBindingError, validate_id_token,
		validate_token_response,
	},
};

/// Serde view of a successful token-endpoint response.
///
/// `expires_in` tolerates both the numeric form and the base-10 string some
/// providers emit.
#[derive(Clone, Debug, Deserialize)]
pub struct TokenEndpointResponse {
	/// Freshly issued access token.
	pub access_token: String,
	/// Freshly issued ID token; refresh responses without one are rejected.
	#[serde(default)]
	pub id_token: Option<String>,
	/// Rotated refresh token; absent when the provider reuses the old one.
	#[serde(default)]
	pub refresh_token: Option<String>,
	/// Token type, usually `Bearer`.
	pub token_type: String,
	/// Access-token lifetime in seconds from the moment of issuance.
	#[serde(deserialize_with = "deserialize_expires_in")]
	pub expires_in: i64,
}

fn deserialize_expires_in<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
	D: serde::Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Raw {
		Number(i64),
		Text(String),
	}

	match Raw::deserialize(deserializer)? {
		Raw::Number(secs) => Ok(secs),
		Raw::Text(raw) => raw.parse().map_err(serde::de::Error::custom),
	}
}

/// Why a refresh attempt rejected the session.
///
/// Rejections are ordinary outcomes, not [`Error`]s; the session hook reacts
/// by clearing the principal so the user re-authenticates.
#[derive(Debug, ThisError)]
pub enum RejectReason {
	/// The token endpoint refused the exchange.
	#[error("Token endpoint refused the refresh exchange with HTTP status {status}.")]
	ExchangeFailed {
		/// HTTP status code returned by the token endpoint.
		status: u16,
	},
	/// The returned ID token is absent or failed validation.
	#[error("The refreshed ID token failed validation.")]
	InvalidIdToken {
		/// Validation failure detail.
		#[source]
		reason: IdTokenValidationError,
	},
	/// The validated ID token does not bind to the rest of the response.
	#[error("The refreshed token response failed binding checks.")]
	ResponseBinding {
		/// Binding failure detail.
		#[source]
		reason: TokenResponseBindingError,
	},
}

/// Result of a refresh decision.
#[derive(Debug)]
pub enum RefreshOutcome {
	/// The stored record needs no refresh yet, or its expiry is unknowable;
	/// the session continues untouched.
	NoActionNeeded,
	/// The exchange succeeded; the session must adopt the new record and
	/// principal atomically.
	Refreshed {
		/// Replacement five-field token record.
		tokens: SessionTokens,
		/// Principal derived from the validated ID token.
		principal: ClaimsPrincipal,
	},
	/// The exchange or validation failed; the session must be terminated.
	Rejected(RejectReason),
}

/// Client credentials and scopes used for the refresh exchange.
#[derive(Clone, Debug)]
pub struct RefresherOptions {
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret.
	pub client_secret: TokenSecret,
	/// Scopes re-requested on every refresh.
	pub scopes: Vec<String>,
}
impl RefresherOptions {
	/// Creates options from raw credentials and scopes.
	pub fn new(
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
		scopes: Vec<String>,
	) -> Self {
		Self {
			client_id: client_id.into(),
			client_secret: TokenSecret::new(client_secret),
			scopes,
		}
	}

	/// Derives options from validated settings.
	pub fn from_settings(settings: &OidcSettings) -> Result<Self> {
		settings.validate()?;

		Ok(Self::new(
			settings.client_id.clone(),
			settings.client_secret.clone(),
			settings.scopes.clone(),
		))
	}

	fn scope(&self) -> String {
		self.scopes.join(" ")
	}
}

/// Refreshes cookie-session token records against a single provider.
pub struct SessionRefresher {
	options: RefresherOptions,
	resolver: Arc<dyn MetadataResolver>,
	http: ReqwestClient,
}
impl SessionRefresher {
	/// How far before the stored expiry a refresh is attempted.
	pub const REFRESH_WINDOW: Duration = Duration::minutes(5);

	/// Creates a refresher with its own HTTP client.
	pub fn new(options: RefresherOptions, resolver: Arc<dyn MetadataResolver>) -> Self {
		Self { options, resolver, http: ReqwestClient::default() }
	}

	/// Replaces the HTTP client used for token-endpoint calls.
	pub fn with_http_client(mut self, http: ReqwestClient) -> Self {
		self.http = http;

		self
	}

	/// Runs the refresh decision for one session at the given instant.
	///
	/// Concurrent calls for the same session are tolerated; each produces an
	/// internally consistent record and the last write wins at the caller.
	pub async fn refresh(
		&self,
		properties: &SessionProperties,
		now: OffsetDateTime,
	) -> Result<RefreshOutcome> {
		let Some(expires_at) = properties.expires_at() else {
			// Fail open. Without a readable expiry no refresh obligation can
			// be determined, and signing the user out here would punish a
			// merely odd cookie.
			tracing::debug!("Session carries no readable expiry. Skipping refresh.");

			return Ok(RefreshOutcome::NoActionNeeded);
		};

		if now + Self::REFRESH_WINDOW < expires_at {
			return Ok(RefreshOutcome::NoActionNeeded);
		}

		// A due session is always exchanged. An absent refresh token goes out
		// as an empty value; the provider's rejection then terminates the
		// session instead of keeping a dead record alive.
		let stored_refresh_token = properties
			.token_value(SessionProperties::REFRESH_TOKEN)
			.unwrap_or_default()
			.to_owned();
		let metadata = self.resolver.resolve().await?;
		let token_endpoint =
			metadata.token_endpoint.clone().ok_or(ConfigError::MissingTokenEndpoint)?;
		let response = self
			.http
			.post(token_endpoint)
			.form(&[
				("grant_type", "refresh_token"),
				("client_id", &self.options.client_id),
				("client_secret", self.options.client_secret.expose()),
				("scope", &self.options.scope()),
				("refresh_token", stored_refresh_token.as_str()),
			])
			.send()
			.await
			.map_err(crate::error::TransportError::from)?;
		let status = response.status();

		if !status.is_success() {
			tracing::warn!(status = status.as_u16(), "Token endpoint refused the refresh exchange.");

			return Ok(RefreshOutcome::Rejected(RejectReason::ExchangeFailed {
				status: status.as_u16(),
			}));
		}

		let body =
			response.bytes().await.map_err(crate::error::TransportError::from)?;
		let mut deserializer = serde_json::Deserializer::from_slice(&body);
		let message: TokenEndpointResponse = serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| Error::TokenResponseParse { source, status: status.as_u16() })?;
		let Some(id_token) = message.id_token.as_deref().filter(|t| !t.is_empty()) else {
			tracing::warn!("Token endpoint returned no ID token. Rejecting the session.");

			return Ok(RefreshOutcome::Rejected(RejectReason::InvalidIdToken {
				reason: IdTokenValidationError::MissingToken,
			}));
		};
		let validated = match validate_id_token(id_token, &metadata, &self.options.client_id) {
			Ok(validated) => validated,
			Err(reason) => {
				tracing::warn!(%reason, "Refreshed ID token failed validation. Rejecting the session.");

				return Ok(RefreshOutcome::Rejected(RejectReason::InvalidIdToken { reason }));
			},
		};

		if let Err(reason) = validate_token_response(
			&validated,
			&message.access_token,
			&message.token_type,
			&self.options.client_id,
		) {
			tracing::warn!(%reason, "Refreshed token response failed binding checks. Rejecting the session.");

			return Ok(RefreshOutcome::Rejected(RejectReason::ResponseBinding { reason }));
		}

		// The provider may reuse the stored refresh token instead of rotating.
		let refresh_token = message
			.refresh_token
			.filter(|t| !t.is_empty())
			.map(TokenSecret::new)
			.unwrap_or_else(|| TokenSecret::new(stored_refresh_token));
		let tokens = SessionTokens {
			access_token: TokenSecret::new(message.access_token),
			id_token: TokenSecret::new(id_token),
			refresh_token,
			token_type: message.token_type,
			expires_at: now + Duration::seconds(message.expires_in),
		};
		let principal = ClaimsPrincipal::from_id_token(&validated.claims);

		tracing::debug!(
			subject = %principal.subject,
			expires_at = %tokens.expires_at,
			"Session tokens refreshed.",
		);

		Ok(RefreshOutcome::Refreshed { tokens, principal })
	}
}
impl Debug for SessionRefresher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionRefresher").field("options", &self.options).finish_non_exhaustive()
	}
}
