//! Login flow: state verification, code exchange and long-lived upgrade.

mod common;

use adforge_core::{
    AdforgeError, AuthError, ErrorCategory, QueryKey, RawProviderError, TokenGrant, TokenLifetime,
};
use chrono::{Duration, Utc};
use common::{FakeApi, LONG_LIVED_SECS, long_lived, session, state_param};

#[tokio::test]
async fn test_login_url_carries_app_parameters() {
    let api = FakeApi::new();
    let (session, _) = session(api.clone());

    let login_url = session.get_login_url().await.unwrap();
    let url = url::Url::parse(&login_url).unwrap();
    let param = |name: &str| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    };

    assert_eq!(url.path(), "/v18.0/dialog/oauth");
    assert_eq!(param("client_id").as_deref(), Some("app-123"));
    assert_eq!(param("redirect_uri").as_deref(), Some("http://localhost:8765/callback"));
    assert_eq!(param("response_type").as_deref(), Some("code"));
    assert_eq!(
        param("scope").as_deref(),
        Some("ads_management,ads_read,business_management")
    );

    let state = param("state").unwrap();
    assert_eq!(state.len(), 32);
    assert!(state.chars().all(|c| c.is_ascii_alphanumeric()));
}

#[tokio::test]
async fn test_successful_login_stores_long_lived_credential_and_arms_refresh() {
    let api = FakeApi::new();
    let (session, _) = session(api.clone());

    let state = state_param(&session.get_login_url().await.unwrap());
    let before = Utc::now();
    let credential = session.exchange_code("abc", &state).await.unwrap();

    assert_eq!(credential.lifetime, TokenLifetime::LongLived);
    assert_eq!(credential.token.expose(), "long-1");

    let expires_at = credential.expires_at.unwrap();
    assert!(expires_at >= before + Duration::seconds(LONG_LIVED_SECS));
    assert!(expires_at <= Utc::now() + Duration::seconds(LONG_LIVED_SECS));

    // The upgrade was called with the short-lived token from the exchange.
    assert_eq!(api.seen_tokens.lock().first().map(String::as_str), Some("short-abc"));
    assert!(session.is_authenticated().await.unwrap());
    assert!(session.is_token_valid().await.unwrap());
    assert_eq!(
        session.scheduler().pending_fire_at(),
        Some(expires_at - Duration::minutes(5))
    );
}

#[tokio::test]
async fn test_mismatched_state_is_rejected_without_exchange() {
    let api = FakeApi::new();
    let (session, _) = session(api.clone());

    session.get_login_url().await.unwrap();
    let result = session.exchange_code("abc", "forged-state").await;

    assert!(matches!(result, Err(AdforgeError::Auth(AuthError::InvalidState))));
    assert_eq!(FakeApi::count(&api.exchange_calls), 0);
    assert!(session.credential().await.unwrap().is_none());
    assert!(!session.scheduler().is_scheduled());
}

#[tokio::test]
async fn test_forged_callback_leaves_existing_session_intact() {
    let api = FakeApi::new();
    let (session, _) = session(api.clone());
    session
        .tokens()
        .set_token(&long_lived("existing", Some(3600)))
        .await
        .unwrap();

    session.get_login_url().await.unwrap();
    let result = session.exchange_code("abc", "forged-state").await;

    assert!(matches!(result, Err(AdforgeError::Auth(AuthError::InvalidState))));
    let stored = session.credential().await.unwrap().unwrap();
    assert_eq!(stored.token.expose(), "existing");
}

#[tokio::test]
async fn test_rejected_callback_burns_the_attempt() {
    let api = FakeApi::new();
    let (session, _) = session(api.clone());

    let state = state_param(&session.get_login_url().await.unwrap());
    assert!(session.exchange_code("abc", "wrong").await.is_err());

    let retry = session.exchange_code("abc", &state).await;
    assert!(matches!(retry, Err(AdforgeError::Auth(AuthError::InvalidState))));
    assert_eq!(FakeApi::count(&api.exchange_calls), 0);
}

#[tokio::test]
async fn test_state_is_single_use() {
    let api = FakeApi::new();
    let (session, _) = session(api.clone());

    let state = state_param(&session.get_login_url().await.unwrap());
    session.exchange_code("abc", &state).await.unwrap();

    let replay = session.exchange_code("abc", &state).await;
    assert!(matches!(replay, Err(AdforgeError::Auth(AuthError::InvalidState))));
    assert_eq!(FakeApi::count(&api.exchange_calls), 1);
}

#[tokio::test]
async fn test_callback_without_pending_login() {
    let api = FakeApi::new();
    let (session, _) = session(api.clone());

    let result = session.exchange_code("abc", "anything").await;
    assert!(matches!(result, Err(AdforgeError::Auth(AuthError::InvalidState))));
    assert_eq!(FakeApi::count(&api.exchange_calls), 0);
}

#[tokio::test]
async fn test_new_login_replaces_previous_attempt() {
    let api = FakeApi::new();
    let (session, _) = session(api.clone());

    let first = state_param(&session.get_login_url().await.unwrap());
    let second = state_param(&session.get_login_url().await.unwrap());
    assert_ne!(first, second);

    assert!(session.exchange_code("abc", &first).await.is_err());
    // The failed attempt consumed the pending state, so the second one is gone too.
    assert!(session.exchange_code("abc", &second).await.is_err());
}

#[tokio::test]
async fn test_exchange_failure_stores_nothing() {
    let api = FakeApi::new();
    api.fail_exchange(RawProviderError::api(100, "Invalid verification code format."));
    let (session, _) = session(api.clone());

    let state = state_param(&session.get_login_url().await.unwrap());
    let result = session.exchange_code("bad", &state).await;

    assert!(matches!(
        result,
        Err(AdforgeError::Auth(AuthError::Exchange(RawProviderError::Api { code: 100, .. })))
    ));
    assert!(session.credential().await.unwrap().is_none());
    assert_eq!(FakeApi::count(&api.upgrade_calls), 0);
}

#[tokio::test]
async fn test_upgrade_failure_keeps_short_lived_credential_for_retry() {
    let api = FakeApi::new();
    api.push_upgrade(Err(RawProviderError::Network {
        message: "connection reset".to_string(),
    }));
    let (session, _) = session(api.clone());

    let state = state_param(&session.get_login_url().await.unwrap());
    let result = session.exchange_code("abc", &state).await;
    assert!(matches!(result, Err(AdforgeError::Auth(AuthError::Upgrade(_)))));

    let stored = session.credential().await.unwrap().unwrap();
    assert_eq!(stored.lifetime, TokenLifetime::ShortLived);
    assert_eq!(stored.token.expose(), "short-abc");

    // A short-lived credential does not count as a session.
    assert!(!session.is_authenticated().await.unwrap());
    assert!(!session.is_token_valid().await.unwrap());
    assert!(session.queries().query(QueryKey::CurrentUser).await.is_disabled());
    let err = session.current_user().await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::ExpiredAuth);
    assert_eq!(FakeApi::count(&api.read_calls), 0);
    assert!(!session.scheduler().is_scheduled());

    let upgraded = session.retry_upgrade().await.unwrap();
    assert_eq!(upgraded.lifetime, TokenLifetime::LongLived);
    assert!(session.is_authenticated().await.unwrap());
    assert!(session.scheduler().is_scheduled());
}

#[tokio::test]
async fn test_retry_upgrade_without_pending_credential() {
    let api = FakeApi::new();
    let (session, _) = session(api.clone());

    assert!(matches!(
        session.retry_upgrade().await,
        Err(AdforgeError::Auth(AuthError::NoPendingUpgrade))
    ));

    session
        .tokens()
        .set_token(&long_lived("t", Some(3600)))
        .await
        .unwrap();
    assert!(matches!(
        session.retry_upgrade().await,
        Err(AdforgeError::Auth(AuthError::NoPendingUpgrade))
    ));
    assert_eq!(FakeApi::count(&api.upgrade_calls), 0);
}

#[tokio::test]
async fn test_upgrade_without_expiry_is_not_scheduled() {
    let api = FakeApi::new();
    api.push_upgrade(Ok(TokenGrant::new("forever", None)));
    let (session, _) = session(api.clone());

    let state = state_param(&session.get_login_url().await.unwrap());
    let credential = session.exchange_code("abc", &state).await.unwrap();

    assert!(credential.expires_at.is_none());
    assert!(session.is_token_valid().await.unwrap());
    assert!(!session.scheduler().is_scheduled());
}

#[tokio::test]
async fn test_denied_login_consumes_state() {
    let api = FakeApi::new();
    let (session, _) = session(api.clone());

    let state = state_param(&session.get_login_url().await.unwrap());
    let result = session
        .reject_login("access_denied", Some("Permissions error"))
        .await;
    match result {
        Err(AdforgeError::Auth(AuthError::Denied { error, description })) => {
            assert_eq!(error, "access_denied");
            assert_eq!(description.as_deref(), Some("Permissions error"));
        }
        other => panic!("unexpected result: {:?}", other),
    }

    assert!(session.exchange_code("abc", &state).await.is_err());
}

#[tokio::test]
async fn test_final_credential_is_the_upgraded_token() {
    let api = FakeApi::new();
    api.push_upgrade(Ok(TokenGrant::new("t2", Some(5_184_000))));
    let (session, _) = session(api.clone());

    let state = state_param(&session.get_login_url().await.unwrap());
    session.exchange_code("t1", &state).await.unwrap();

    let stored = session.credential().await.unwrap().unwrap();
    assert_eq!(stored.token.expose(), "t2");
    assert_eq!(api.seen_tokens.lock().as_slice(), ["short-t1"]);
}
