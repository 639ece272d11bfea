//! OIDC relying-party settings and authority derivation.
//!
//! Deployments configure a single provider. When `oidc_type` selects the
//! Microsoft Entra ID preset the authority is derived from the tenant; for a
//! generic provider the authority must be supplied explicitly. Disabled
//! settings register no authentication services at all, so validation only
//! applies once `enabled` is set.

// self
use crate::_prelude::*;

/// Scopes requested by default: the OIDC handler needs `openid`/`profile` and
/// `offline_access` is what makes the provider return a refresh token.
pub const DEFAULT_SCOPES: [&str; 3] = ["openid", "profile", "offline_access"];

/// Supported provider presets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OidcType {
	/// Microsoft Entra ID; the authority is derived from the tenant.
	MicrosoftEntraId,
	/// Generic OIDC provider; the authority must be configured explicitly.
	#[default]
	Oidc,
}

/// Settings validation failures; all of them fail fast at startup.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum SettingsError {
	/// Generic providers require an explicit authority.
	#[error("Authority is required when the OIDC type is not a provider preset.")]
	MissingAuthority,
	/// Client identifier is required whenever authentication is enabled.
	#[error("Client id must not be empty.")]
	MissingClientId,
	/// Client secret is required for the confidential refresh exchange.
	#[error("Client secret must not be empty.")]
	MissingClientSecret,

	/// The configured or derived authority is not a valid URL.
	#[error("Authority is not a valid URL.")]
	InvalidAuthority {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
}

/// The relying party's OIDC settings, bound from configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OidcSettings {
	/// Whether authentication services are registered at all.
	pub enabled: bool,
	/// Provider preset selection.
	pub oidc_type: OidcType,
	/// Entra ID tenant; blank selects the multi-tenant `common` endpoint.
	pub tenant: String,
	/// Explicit authority URL for generic providers.
	pub authority: String,
	/// OAuth client identifier registered with the provider.
	pub client_id: String,
	/// OAuth client secret for the confidential token exchange.
	pub client_secret: String,
	/// Scopes requested during sign-in and refresh.
	pub scopes: Vec<String>,
}
impl OidcSettings {
	/// Returns the effective authority URL.
	///
	/// For [`OidcType::MicrosoftEntraId`] the authority is
	/// `https://login.microsoftonline.com/{tenant}/v2.0/`, substituting
	/// `common` when no tenant is configured. Generic providers must supply
	/// the authority themselves.
	pub fn authority(&self) -> Result<Url, SettingsError> {
		match self.oidc_type {
			OidcType::MicrosoftEntraId => {
				let tenant =
					if self.tenant.trim().is_empty() { "common" } else { self.tenant.trim() };

				Url::parse(&format!("https://login.microsoftonline.com/{tenant}/v2.0/"))
					.map_err(|source| SettingsError::InvalidAuthority { source })
			},
			OidcType::Oidc =>
				if self.authority.trim().is_empty() {
					Err(SettingsError::MissingAuthority)
				} else {
					Url::parse(&self.authority)
						.map_err(|source| SettingsError::InvalidAuthority { source })
				},
		}
	}

	/// Validates the settings, failing fast on misconfiguration.
	///
	/// Disabled settings always validate; nothing is registered for them.
	pub fn validate(&self) -> Result<(), SettingsError> {
		if !self.enabled {
			return Ok(());
		}
		if self.client_id.trim().is_empty() {
			return Err(SettingsError::MissingClientId);
		}
		if self.client_secret.trim().is_empty() {
			return Err(SettingsError::MissingClientSecret);
		}

		self.authority().map(|_| ())
	}
}
impl Default for OidcSettings {
	fn default() -> Self {
		Self {
			enabled: false,
			oidc_type: OidcType::default(),
			tenant: String::new(),
			authority: String::new(),
			client_id: String::new(),
			client_secret: String::new(),
			scopes: DEFAULT_SCOPES.map(str::to_owned).to_vec(),
		}
	}
}
