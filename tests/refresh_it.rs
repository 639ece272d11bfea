// crates.io
use httpmock::prelude::*;
use jsonwebtoken::Algorithm;
use serde_json::json;
// self
use oidc_session_refresher::{
	_preludet::*,
	refresh::{RefreshOutcome, RejectReason, SessionRefresher},
	session::{SessionProperties, SessionTokens, format_expires_at},
	validate::access_token_hash,
};

fn token_url(server: &MockServer) -> Url {
	Url::parse(&server.url("/token")).expect("Mock token endpoint should parse successfully.")
}

#[tokio::test]
async fn refresh_rotates_the_whole_record() {
	let server = MockServer::start_async().await;
	let refresher = test_refresher(test_metadata(Some(token_url(&server))));
	let id_token = sign_id_token(&test_id_token_claims());
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.body_includes("grant_type=refresh_token")
				.body_includes("client_id=client-under-test")
				.body_includes("refresh_token=refresh-old")
				.body_includes("scope=openid+profile+offline_access");
			then.status(200).header("content-type", "application/json").body(
				json!({
					"access_token": "access-new",
					"id_token": id_token,
					"refresh_token": "refresh-new",
					"token_type": "Bearer",
					"expires_in": 1800,
				})
				.to_string(),
			);
		})
		.await;
	let now = test_now();
	let properties = seeded_properties(now + Duration::minutes(2));
	let outcome = refresher.refresh(&properties, now).await.expect("Refresh should succeed.");

	mock.assert_async().await;

	let RefreshOutcome::Refreshed { tokens, principal } = outcome else {
		panic!("An expiring session should be refreshed.");
	};

	assert_eq!(tokens.access_token.expose(), "access-new");
	assert_eq!(tokens.id_token.expose(), id_token);
	assert_eq!(tokens.refresh_token.expose(), "refresh-new");
	assert_eq!(tokens.token_type, "Bearer");
	assert_eq!(tokens.expires_at, now + Duration::seconds(1800));
	assert_eq!(principal.subject, "subject-under-test");
	assert_eq!(principal.name.as_deref(), Some("Session Tester"));

	// Applying the record replaces all five persisted fields in one step.
	let mut properties = properties;

	tokens.write_to(&mut properties);

	assert_eq!(SessionTokens::read_from(&properties), Some(tokens));
}

#[tokio::test]
async fn refresh_reuses_the_stored_refresh_token_when_not_rotated() {
	let server = MockServer::start_async().await;
	let refresher = test_refresher(test_metadata(Some(token_url(&server))));
	let id_token = sign_id_token(&test_id_token_claims());
	let _mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(
				json!({
					"access_token": "access-new",
					"id_token": id_token,
					"token_type": "Bearer",
					"expires_in": "3600",
				})
				.to_string(),
			);
		})
		.await;
	let now = test_now();
	let properties = seeded_properties(now + Duration::minutes(2));
	let outcome = refresher.refresh(&properties, now).await.expect("Refresh should succeed.");
	let RefreshOutcome::Refreshed { tokens, .. } = outcome else {
		panic!("An expiring session should be refreshed.");
	};

	assert_eq!(tokens.refresh_token.expose(), "refresh-old");
	assert_eq!(tokens.expires_at, now + Duration::seconds(3600));
}

#[tokio::test]
async fn failed_exchange_rejects_the_session() {
	let server = MockServer::start_async().await;
	let refresher = test_refresher(test_metadata(Some(token_url(&server))));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\"}");
		})
		.await;
	let now = test_now();
	let properties = seeded_properties(now + Duration::minutes(2));
	let outcome = refresher.refresh(&properties, now).await.expect("Refresh should succeed.");

	mock.assert_async().await;

	assert!(matches!(
		outcome,
		RefreshOutcome::Rejected(RejectReason::ExchangeFailed { status: 400 }),
	));
}

#[tokio::test]
async fn wrongly_signed_id_token_rejects_the_session() {
	let server = MockServer::start_async().await;
	let refresher = test_refresher(test_metadata(Some(token_url(&server))));
	let forged = sign_id_token_with(UNRELATED_RSA_PRIVATE_KEY_PEM, &test_id_token_claims());
	let _mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(
				json!({
					"access_token": "access-new",
					"id_token": forged,
					"refresh_token": "refresh-new",
					"token_type": "Bearer",
					"expires_in": 1800,
				})
				.to_string(),
			);
		})
		.await;
	let now = test_now();
	let properties = seeded_properties(now + Duration::minutes(2));
	let outcome = refresher.refresh(&properties, now).await.expect("Refresh should succeed.");

	assert!(matches!(outcome, RefreshOutcome::Rejected(RejectReason::InvalidIdToken { .. })));
}

#[tokio::test]
async fn missing_id_token_rejects_the_session() {
	let server = MockServer::start_async().await;
	let refresher = test_refresher(test_metadata(Some(token_url(&server))));
	let _mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(
				json!({
					"access_token": "access-new",
					"refresh_token": "refresh-new",
					"token_type": "Bearer",
					"expires_in": 1800,
				})
				.to_string(),
			);
		})
		.await;
	let now = test_now();
	let properties = seeded_properties(now + Duration::minutes(2));
	let outcome = refresher.refresh(&properties, now).await.expect("Refresh should succeed.");

	assert!(matches!(outcome, RefreshOutcome::Rejected(RejectReason::InvalidIdToken { .. })));
}

#[tokio::test]
async fn mismatched_at_hash_rejects_the_session() {
	let server = MockServer::start_async().await;
	let refresher = test_refresher(test_metadata(Some(token_url(&server))));
	let mut claims = test_id_token_claims();

	// The ID token binds to a different access token than the one returned.
	claims["at_hash"] = json!(access_token_hash(Algorithm::RS256, "access-substituted"));

	let id_token = sign_id_token(&claims);
	let _mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(
				json!({
					"access_token": "access-new",
					"id_token": id_token,
					"refresh_token": "refresh-new",
					"token_type": "Bearer",
					"expires_in": 1800,
				})
				.to_string(),
			);
		})
		.await;
	let now = test_now();
	let properties = seeded_properties(now + Duration::minutes(2));
	let outcome = refresher.refresh(&properties, now).await.expect("Refresh should succeed.");

	assert!(matches!(outcome, RefreshOutcome::Rejected(RejectReason::ResponseBinding { .. })));
}

#[tokio::test]
async fn partial_record_with_a_refresh_token_still_exchanges() {
	let server = MockServer::start_async().await;
	let refresher = test_refresher(test_metadata(Some(token_url(&server))));
	let id_token = sign_id_token(&test_id_token_claims());
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token").body_includes("refresh_token=refresh-old");
			then.status(200).header("content-type", "application/json").body(
				json!({
					"access_token": "access-new",
					"id_token": id_token,
					"refresh_token": "refresh-new",
					"token_type": "Bearer",
					"expires_in": 1800,
				})
				.to_string(),
			);
		})
		.await;
	let now = test_now();
	// Only the expiry and the refresh token survived; the other fields are
	// gone, but a due session must still be exchanged.
	let mut properties = SessionProperties::new();

	properties
		.set_token_value(SessionProperties::EXPIRES_AT, format_expires_at(now + Duration::minutes(2)));
	properties.set_token_value(SessionProperties::REFRESH_TOKEN, "refresh-old");

	let outcome = refresher.refresh(&properties, now).await.expect("Refresh should succeed.");

	mock.assert_async().await;

	let RefreshOutcome::Refreshed { tokens, .. } = outcome else {
		panic!("A due partial record with a refresh token should be refreshed.");
	};

	assert_eq!(tokens.access_token.expose(), "access-new");
	assert_eq!(tokens.refresh_token.expose(), "refresh-new");
}

#[tokio::test]
async fn missing_refresh_token_lets_the_provider_reject_the_session() {
	let server = MockServer::start_async().await;
	let refresher = test_refresher(test_metadata(Some(token_url(&server))));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\"}");
		})
		.await;
	let now = test_now();
	// A due record with no refresh token at all must not linger forever; the
	// exchange runs with an empty value and the provider signs it out.
	let mut properties = SessionProperties::new();

	properties
		.set_token_value(SessionProperties::EXPIRES_AT, format_expires_at(now + Duration::minutes(2)));

	let outcome = refresher.refresh(&properties, now).await.expect("Refresh should succeed.");

	mock.assert_async().await;

	assert!(matches!(
		outcome,
		RefreshOutcome::Rejected(RejectReason::ExchangeFailed { status: 400 }),
	));
}

#[tokio::test]
async fn fresh_session_never_calls_the_token_endpoint() {
	let server = MockServer::start_async().await;
	let refresher = test_refresher(test_metadata(Some(token_url(&server))));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(500);
		})
		.await;
	let now = test_now();
	// Comfortably outside the lookahead window.
	let properties = seeded_properties(now + SessionRefresher::REFRESH_WINDOW + Duration::minutes(1));
	let outcome = refresher.refresh(&properties, now).await.expect("Refresh should succeed.");

	assert!(matches!(outcome, RefreshOutcome::NoActionNeeded));

	mock.assert_calls_async(0).await;
}
