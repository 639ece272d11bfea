//! Provider metadata resolution: discovery document plus signing keys.
//!
//! The refresher treats metadata as a read-only dependency fetched fresh per
//! refresh attempt. [`DiscoveryResolver`] backs that contract with a TTL cache
//! so repeated calls stay cheap, while signing-key rotation still propagates
//! on the cache's schedule; the refresher itself never skips the call.

// crates.io
use jsonwebtoken::jwk::JwkSet;
// self
use crate::_prelude::*;

/// Boxed future returned by [`MetadataResolver`] implementations.
pub type MetadataFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ProviderMetadata, MetadataError>> + 'a + Send>>;

/// Well-known discovery document path appended to the authority.
const DISCOVERY_PATH: &str = ".well-known/openid-configuration";

/// Read-mostly provider configuration consumed by the refresher.
#[derive(Clone, Debug)]
pub struct ProviderMetadata {
	/// Issuer expected in validated ID tokens.
	pub issuer: String,
	/// Token endpoint used for refresh exchanges; its absence is a fatal
	/// deployment misconfiguration, surfaced by the refresher.
	pub token_endpoint: Option<Url>,
	/// Provider signing keys for ID-token validation.
	pub jwks: JwkSet,
}

/// Errors raised while resolving provider metadata.
#[derive(Debug, ThisError)]
pub enum MetadataError {
	/// The authority URL cannot host a discovery document.
	#[error("Authority URL cannot be combined with the discovery path.")]
	Authority {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Transport failure while fetching a metadata document.
	#[error("Network error occurred while fetching {endpoint}.")]
	Fetch {
		/// Which document failed (`discovery` or `jwks`).
		endpoint: &'static str,
		/// Transport-specific network error.
		#[source]
		source: ReqwestError,
	},
	/// A metadata endpoint answered with a non-success status.
	#[error("Fetching {endpoint} returned HTTP status {status}.")]
	EndpointStatus {
		/// Which document failed (`discovery` or `jwks`).
		endpoint: &'static str,
		/// HTTP status code returned by the endpoint.
		status: u16,
	},
	/// A metadata document could not be parsed.
	#[error("The {endpoint} document is malformed.")]
	MalformedDocument {
		/// Which document failed (`discovery` or `jwks`).
		endpoint: &'static str,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
	},
	/// The advertised token endpoint is not a valid URL.
	#[error("The advertised token endpoint is not a valid URL.")]
	InvalidTokenEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
}

/// Source of provider metadata.
///
/// Implementations must be safe to call repeatedly and cheap when cached; the
/// future is dropped when the owning request is aborted, which cancels any
/// in-flight fetch.
pub trait MetadataResolver
where
	Self: Send + Sync,
{
	/// Resolves the current provider metadata.
	fn resolve(&self) -> MetadataFuture<'_>;
}

/// Serde view of the `.well-known/openid-configuration` document; only the
/// fields the refresher consumes are bound.
#[derive(Clone, Debug, Deserialize)]
struct DiscoveryDocument {
	issuer: String,
	#[serde(default)]
	token_endpoint: Option<String>,
	jwks_uri: String,
}

#[derive(Clone, Debug)]
struct CachedMetadata {
	fetched_at: OffsetDateTime,
	metadata: ProviderMetadata,
}
impl CachedMetadata {
	fn is_fresh(&self, now: OffsetDateTime, ttl: Duration) -> bool {
		now - self.fetched_at < ttl
	}
}

/// [`MetadataResolver`] backed by OIDC discovery with a TTL cache.
pub struct DiscoveryResolver {
	http: ReqwestClient,
	discovery_url: Url,
	cache_ttl: Duration,
	cache: RwLock<Option<CachedMetadata>>,
}
impl DiscoveryResolver {
	/// Default lifetime of a cached metadata document.
	pub const DEFAULT_CACHE_TTL: Duration = Duration::hours(1);

	/// Creates a resolver for the given authority with its own HTTP client.
	pub fn new(authority: &Url) -> Result<Self, MetadataError> {
		Self::with_http_client(authority, ReqwestClient::default())
	}

	/// Creates a resolver reusing a caller-provided HTTP client.
	pub fn with_http_client(authority: &Url, http: ReqwestClient) -> Result<Self, MetadataError> {
		Ok(Self {
			http,
			discovery_url: join_discovery_url(authority)?,
			cache_ttl: Self::DEFAULT_CACHE_TTL,
			cache: RwLock::new(None),
		})
	}

	/// Overrides the cache TTL; a non-positive TTL disables caching.
	pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
		self.cache_ttl = ttl;

		self
	}

	async fn fetch(&self) -> Result<ProviderMetadata, MetadataError> {
		let document: DiscoveryDocument =
			fetch_json(&self.http, self.discovery_url.clone(), "discovery").await?;
		let token_endpoint = document
			.token_endpoint
			.map(|raw| Url::parse(&raw))
			.transpose()
			.map_err(|source| MetadataError::InvalidTokenEndpoint { source })?;
		let jwks_url = Url::parse(&document.jwks_uri)
			.map_err(|source| MetadataError::InvalidTokenEndpoint { source })?;
		let jwks: JwkSet = fetch_json(&self.http, jwks_url, "jwks").await?;

		tracing::debug!(issuer = %document.issuer, keys = jwks.keys.len(), "Resolved provider metadata.");

		Ok(ProviderMetadata { issuer: document.issuer, token_endpoint, jwks })
	}
}
impl MetadataResolver for DiscoveryResolver {
	fn resolve(&self) -> MetadataFuture<'_> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();

			if let Some(cached) = self.cache.read().as_ref()
				&& cached.is_fresh(now, self.cache_ttl)
			{
				return Ok(cached.metadata.clone());
			}

			let metadata = self.fetch().await?;

			*self.cache.write() = Some(CachedMetadata { fetched_at: now, metadata: metadata.clone() });

			Ok(metadata)
		})
	}
}
impl Debug for DiscoveryResolver {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DiscoveryResolver")
			.field("discovery_url", &self.discovery_url.as_str())
			.field("cache_ttl", &self.cache_ttl)
			.finish()
	}
}

/// Fixed metadata for tests and pre-provisioned deployments.
#[derive(Clone, Debug)]
pub struct StaticMetadataResolver(pub ProviderMetadata);
impl MetadataResolver for StaticMetadataResolver {
	fn resolve(&self) -> MetadataFuture<'_> {
		let metadata = self.0.clone();

		Box::pin(async move { Ok(metadata) })
	}
}

fn join_discovery_url(authority: &Url) -> Result<Url, MetadataError> {
	let mut base = authority.clone();

	// `Url::join` would otherwise drop the last path segment.
	if !base.path().ends_with('/') {
		base.set_path(&format!("{}/", base.path()));
	}

	base.join(DISCOVERY_PATH).map_err(|source| MetadataError::Authority { source })
}

async fn fetch_json<T>(
	http: &ReqwestClient,
	url: Url,
	endpoint: &'static str,
) -> Result<T, MetadataError>
where
	T: serde::de::DeserializeOwned,
{
	let response = http
		.get(url)
		.send()
		.await
		.map_err(|source| MetadataError::Fetch { endpoint, source })?;
	let status = response.status();

	if !status.is_success() {
		return Err(MetadataError::EndpointStatus { endpoint, status: status.as_u16() });
	}

	let body = response.bytes().await.map_err(|source| MetadataError::Fetch { endpoint, source })?;
	let mut deserializer = serde_json::Deserializer::from_slice(&body);

	serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| MetadataError::MalformedDocument { endpoint, source })
}
