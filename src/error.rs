//! Error types shared across the refresher, resolver, and session hook.
//!
//! Session rejections are data, not errors: a failed exchange or an invalid ID
//! token surfaces as [`RefreshOutcome::Rejected`](crate::refresh::RefreshOutcome)
//! so the session layer can terminate the principal. Everything in this module
//! is either a deployment misconfiguration or an infrastructure failure that
//! should abort the current request instead of silently signing the user out.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Deployment misconfiguration; aborts the request pipeline.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Settings validation failure raised while building options.
	#[error(transparent)]
	Settings(#[from] crate::settings::SettingsError),
	/// Provider metadata could not be resolved.
	#[error(transparent)]
	Metadata(#[from] crate::metadata::MetadataError),
	/// Transport failure (DNS, TCP, TLS) before any HTTP status was received.
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code of the offending response.
		status: u16,
	},
}

/// Configuration failures that cannot be a per-request transient condition.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Provider metadata carries no token endpoint; refreshing is impossible.
	#[error("Cannot refresh the session. The provider metadata is missing a token endpoint.")]
	MissingTokenEndpoint,
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: ReqwestError,
	},
}
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::Network { source: e }
	}
}
