mod support;

use std::time::Duration;

use oidc_auth::{
    ApiAuthorization, AuthorizationFailure, AuthorizationSettings, HealthCheckResult,
    OidcApiAuthorizer,
};
use support::{bearer, IssuerKey, MockIssuer, AUDIENCE};

fn authorizer_for(issuer: &MockIssuer, min_refresh: Duration) -> OidcApiAuthorizer {
    let settings = AuthorizationSettings::new(AUDIENCE, issuer.issuer_url())
        .with_min_refresh_interval(min_refresh)
        .with_http_timeout(Duration::from_secs(5));
    OidcApiAuthorizer::from_settings(settings).expect("authorizer")
}

#[tokio::test]
async fn rotated_key_triggers_single_refresh_and_succeeds() {
    let issuer = MockIssuer::start();
    let old_key = IssuerKey::generate("2026-09");
    let new_key = IssuerKey::generate("2026-10");
    let authorizer = authorizer_for(&issuer, Duration::ZERO);

    let mut published = issuer.publish(&[&old_key]);
    let result = authorizer
        .authorize(&bearer(&old_key.token(&issuer.issuer_claim(), AUDIENCE)))
        .await;
    assert!(result.is_success(), "{:?}", result.failure_reason());
    assert_eq!(published.hits(), 1);

    // Cached keys serve further requests.
    let result = authorizer
        .authorize(&bearer(&old_key.token(&issuer.issuer_claim(), AUDIENCE)))
        .await;
    assert!(result.is_success());
    assert_eq!(published.hits(), 1);

    published.delete();
    let rotated = issuer.publish(&[&new_key]);

    let result = authorizer
        .authorize(&bearer(&new_key.token(&issuer.issuer_claim(), AUDIENCE)))
        .await;
    assert!(result.is_success(), "{:?}", result.failure_reason());
    assert_eq!(rotated.hits(), 1);

    let claims = result.claims().expect("claims");
    assert_eq!(claims.subject.as_deref(), Some("user-123"));
    assert!(claims.has_scope("hello.write"));
}

#[tokio::test]
async fn unknown_key_fails_after_one_refresh() {
    let issuer = MockIssuer::start();
    let published_key = IssuerKey::generate("published");
    let rogue_key = IssuerKey::generate("rogue");
    let authorizer = authorizer_for(&issuer, Duration::ZERO);
    let published = issuer.publish(&[&published_key]);

    let result = authorizer
        .authorize(&bearer(&rogue_key.token(&issuer.issuer_claim(), AUDIENCE)))
        .await;

    assert!(matches!(
        result.failure_reason(),
        Some(AuthorizationFailure::KeyNotFoundAfterRefresh(_))
    ));
    assert_eq!(published.hits(), 2);
}

#[tokio::test]
async fn refresh_is_deferred_within_minimum_interval() {
    let issuer = MockIssuer::start();
    let key = IssuerKey::generate("current");
    let rogue_key = IssuerKey::generate("rogue");
    let authorizer = authorizer_for(&issuer, Duration::from_secs(300));
    let published = issuer.publish(&[&key]);

    for _ in 0..3 {
        let result = authorizer
            .authorize(&bearer(&rogue_key.token(&issuer.issuer_claim(), AUDIENCE)))
            .await;
        assert!(result.failed());
    }

    assert_eq!(published.hits(), 1);
}

#[tokio::test]
async fn token_for_other_audience_is_rejected_without_refresh() {
    let issuer = MockIssuer::start();
    let key = IssuerKey::generate("current");
    let authorizer = authorizer_for(&issuer, Duration::ZERO);
    let published = issuer.publish(&[&key]);

    let result = authorizer
        .authorize(&bearer(&key.token(&issuer.issuer_claim(), "api://other")))
        .await;

    assert!(matches!(
        result.failure_reason(),
        Some(AuthorizationFailure::Validation(_))
    ));
    assert_eq!(published.hits(), 1);
}

#[tokio::test]
async fn health_check_reflects_issuer_availability() {
    let issuer = MockIssuer::start();
    let key = IssuerKey::generate("current");
    let authorizer = authorizer_for(&issuer, Duration::ZERO);

    let result = authorizer.health_check().await;
    assert!(!result.is_healthy());
    assert!(result
        .bad_health_message()
        .unwrap()
        .contains("cannot obtain signing keys"));

    issuer.publish(&[&key]);
    assert_eq!(authorizer.health_check().await, HealthCheckResult::Healthy);
}

#[tokio::test]
async fn issuer_outage_keeps_serving_cached_keys() {
    let issuer = MockIssuer::start();
    let key = IssuerKey::generate("current");
    let rogue_key = IssuerKey::generate("rogue");
    let authorizer = authorizer_for(&issuer, Duration::ZERO);

    let mut published = issuer.publish(&[&key]);
    let result = authorizer
        .authorize(&bearer(&key.token(&issuer.issuer_claim(), AUDIENCE)))
        .await;
    assert!(result.is_success(), "{:?}", result.failure_reason());

    published.delete();

    // The refresh fails, so the cached set is searched again.
    let result = authorizer
        .authorize(&bearer(&rogue_key.token(&issuer.issuer_claim(), AUDIENCE)))
        .await;
    assert!(matches!(
        result.failure_reason(),
        Some(AuthorizationFailure::KeyNotFoundAfterRefresh(_))
    ));

    let result = authorizer
        .authorize(&bearer(&key.token(&issuer.issuer_claim(), AUDIENCE)))
        .await;
    assert!(result.is_success(), "{:?}", result.failure_reason());
}
