//! Per-request session hook that applies refresh outcomes to the session.
//!
//! The hosting session middleware calls [`SessionValidator::validate`] once
//! per request after deserializing the cookie. The hook is the only writer of
//! the session's token record; the refresher itself only produces outcomes.

// self
use crate::{
	_prelude::*,
	claims::ClaimsPrincipal,
	refresh::{RefreshOutcome, SessionRefresher},
	session::SessionProperties,
};

/// Boxed future returned by [`SessionValidator`] implementations.
pub type ValidationFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + 'a + Send>>;

/// Per-request validation hook invoked by the hosting session middleware.
pub trait SessionValidator
where
	Self: Send + Sync,
{
	/// Validates one deserialized session, mutating it in place.
	fn validate<'a>(&'a self, context: &'a mut SessionContext) -> ValidationFuture<'a>;
}

/// The mutable per-request view of a deserialized cookie session.
#[derive(Debug)]
pub struct SessionContext {
	/// Principal currently attached to the session; `None` once rejected.
	pub principal: Option<ClaimsPrincipal>,
	/// Persisted key/value bag holding the token record.
	pub properties: SessionProperties,
	/// Set when the cookie must be re-issued with the updated record.
	pub should_renew: bool,
}
impl SessionContext {
	/// Creates a context from the deserialized principal and properties.
	pub fn new(principal: Option<ClaimsPrincipal>, properties: SessionProperties) -> Self {
		Self { principal, properties, should_renew: false }
	}

	/// Whether the session still carries an authenticated principal.
	pub fn is_authenticated(&self) -> bool {
		self.principal.is_some()
	}

	/// Detaches the principal, terminating the authenticated session.
	pub fn reject_principal(&mut self) {
		self.principal = None;
	}
}

/// [`SessionValidator`] that keeps cookie-session tokens fresh.
///
/// Outcome contract per request:
/// - no action: the session is left byte-for-byte untouched,
/// - refreshed: the record and principal are replaced and the cookie is
///   flagged for re-issue,
/// - rejected: the principal is detached so the middleware signs the user out.
#[derive(Debug)]
pub struct CookieSessionValidator {
	refresher: SessionRefresher,
}
impl CookieSessionValidator {
	/// Wraps a configured refresher.
	pub fn new(refresher: SessionRefresher) -> Self {
		Self { refresher }
	}

	/// Runs the validation pass at an explicit instant.
	pub async fn validate_at(
		&self,
		context: &mut SessionContext,
		now: OffsetDateTime,
	) -> Result<()> {
		match self.refresher.refresh(&context.properties, now).await? {
			RefreshOutcome::NoActionNeeded => {},
			RefreshOutcome::Refreshed { tokens, principal } => {
				tokens.write_to(&mut context.properties);

				context.principal = Some(principal);
				context.should_renew = true;
			},
			RefreshOutcome::Rejected(reason) => {
				tracing::warn!(%reason, "Session rejected. Detaching the principal.");

				context.reject_principal();
			},
		}

		Ok(())
	}
}
impl SessionValidator for CookieSessionValidator {
	fn validate<'a>(&'a self, context: &'a mut SessionContext) -> ValidationFuture<'a> {
		Box::pin(self.validate_at(context, OffsetDateTime::now_utc()))
	}
}
