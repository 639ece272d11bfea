//! ID-token signature validation and token-response binding checks.
//!
//! The refresher validates every ID token returned by a refresh exchange
//! against the provider's advertised signing keys and issuer before any claim
//! reaches the session. Nonce validation is deliberately disabled: refresh
//! responses carry no nonce because the nonce binds only the initial
//! authorization request, so requiring one here would reject every legitimate
//! rotation.

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{
	Algorithm, DecodingKey, Validation, decode, decode_header,
	jwk::{AlgorithmParameters, JwkSet},
};
use sha2::{Digest, Sha256, Sha384, Sha512};
// self
use crate::{_prelude::*, claims::IdTokenClaims, metadata::ProviderMetadata};

/// Clock-skew tolerance applied to `exp`/`nbf` during validation.
const VALIDATION_LEEWAY_SECS: u64 = 60;

/// An ID token that passed signature and claim validation.
#[derive(Clone, Debug)]
pub struct ValidatedIdToken {
	/// Validated claim set.
	pub claims: IdTokenClaims,
	/// Signature algorithm the token was verified with; also selects the
	/// digest used for `at_hash` binding.
	pub algorithm: Algorithm,
}

/// Reasons an ID token fails validation. All of them reject the session.
#[derive(Debug, ThisError)]
pub enum IdTokenValidationError {
	/// The token response carried no ID token.
	#[error("the token response carries no ID token")]
	MissingToken,
	/// The token header names no signing key.
	#[error("the ID token names no signing key id")]
	MissingKeyId,
	/// No advertised signing key matches the token's `kid`.
	#[error("no provider signing key matches kid `{kid}`")]
	UnknownKeyId {
		/// Key id named by the token header.
		kid: String,
	},
	/// The matching key is not an RSA signing key.
	#[error("the signing key for kid `{kid}` is not an RSA key")]
	UnsupportedKeyType {
		/// Key id named by the token header.
		kid: String,
	},
	/// The token is signed with an algorithm this relying party rejects.
	#[error("the ID token uses unsupported algorithm {algorithm:?}")]
	UnsupportedAlgorithm {
		/// Algorithm named by the token header.
		algorithm: Algorithm,
	},

	/// The token header could not be decoded.
	#[error("the ID token header is malformed: {0}")]
	Header(#[source] jsonwebtoken::errors::Error),
	/// The advertised key material could not be turned into a decoding key.
	#[error("the provider signing key is invalid: {0}")]
	InvalidKey(#[source] jsonwebtoken::errors::Error),
	/// Signature, issuer, audience, or lifetime validation failed.
	#[error("signature or claim validation failed: {0}")]
	Signature(#[source] jsonwebtoken::errors::Error),
}

/// Reasons the token-response binding pass fails. All of them reject the
/// session; this is the defense against token substitution.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum TokenResponseBindingError {
	/// The response carried no access token.
	#[error("the token response carries no access token")]
	MissingAccessToken,
	/// The response carried no token type.
	#[error("the token response carries no token type")]
	MissingTokenType,
	/// The validated ID token is not addressed to this client.
	#[error("the ID token audience does not name this client")]
	AudienceMismatch,
	/// The `at_hash` claim does not match the exchanged access token.
	#[error("the at_hash claim does not match the exchanged access token")]
	AccessTokenHashMismatch,
}

/// Validates an ID token against the resolved provider metadata.
///
/// Verifies the RSA signature with the JWKS key named by the token's `kid`,
/// and enforces issuer, audience (the client id), and expiry with a small
/// leeway. Nonce validation is disabled for refresh responses.
pub fn validate_id_token(
	id_token: &str,
	metadata: &ProviderMetadata,
	client_id: &str,
) -> Result<ValidatedIdToken, IdTokenValidationError> {
	if id_token.is_empty() {
		return Err(IdTokenValidationError::MissingToken);
	}

	let header = decode_header(id_token).map_err(IdTokenValidationError::Header)?;
	let algorithm = match header.alg {
		alg @ (Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512) => alg,
		other => return Err(IdTokenValidationError::UnsupportedAlgorithm { algorithm: other }),
	};
	let kid = header.kid.ok_or(IdTokenValidationError::MissingKeyId)?;
	let key = decoding_key(&metadata.jwks, &kid)?;
	let mut validation = Validation::new(algorithm);

	validation.set_issuer(&[&metadata.issuer]);
	validation.set_audience(&[client_id]);
	validation.leeway = VALIDATION_LEEWAY_SECS;

	let token = decode::<IdTokenClaims>(id_token, &key, &validation)
		.map_err(IdTokenValidationError::Signature)?;

	Ok(ValidatedIdToken { claims: token.claims, algorithm })
}

/// Binds a validated ID token to the client id and the exchanged message.
pub fn validate_token_response(
	validated: &ValidatedIdToken,
	access_token: &str,
	token_type: &str,
	client_id: &str,
) -> Result<(), TokenResponseBindingError> {
	if access_token.is_empty() {
		return Err(TokenResponseBindingError::MissingAccessToken);
	}
	if token_type.is_empty() {
		return Err(TokenResponseBindingError::MissingTokenType);
	}
	if !validated.claims.audience_contains(client_id) {
		return Err(TokenResponseBindingError::AudienceMismatch);
	}
	if let Some(at_hash) = &validated.claims.at_hash
		&& *at_hash != access_token_hash(validated.algorithm, access_token)
	{
		return Err(TokenResponseBindingError::AccessTokenHashMismatch);
	}

	Ok(())
}

/// Computes the `at_hash` value for an access token: the base64url-encoded
/// left half of the digest matching the ID token's signature algorithm.
pub fn access_token_hash(algorithm: Algorithm, access_token: &str) -> String {
	let digest = match algorithm {
		Algorithm::RS384 => Sha384::digest(access_token.as_bytes()).to_vec(),
		Algorithm::RS512 => Sha512::digest(access_token.as_bytes()).to_vec(),
		_ => Sha256::digest(access_token.as_bytes()).to_vec(),
	};

	URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2])
}

fn decoding_key(jwks: &JwkSet, kid: &str) -> Result<DecodingKey, IdTokenValidationError> {
	let jwk = jwks
		.keys
		.iter()
		.find(|jwk| jwk.common.key_id.as_deref() == Some(kid))
		.ok_or_else(|| IdTokenValidationError::UnknownKeyId { kid: kid.to_owned() })?;

	match &jwk.algorithm {
		AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
			.map_err(IdTokenValidationError::InvalidKey),
		_ => Err(IdTokenValidationError::UnsupportedKeyType { kid: kid.to_owned() }),
	}
}
