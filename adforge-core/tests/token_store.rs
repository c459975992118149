//! Credential persistence across sessions and process restarts.

mod common;

use std::sync::Arc;

use adforge_core::{
    FileStore, ScheduleOutcome, Session, StorageBackend, TokenStore, create_store,
};
use chrono::{Duration, Utc};
use common::{FakeApi, config, long_lived};
use tempfile::TempDir;

#[tokio::test]
async fn test_validity_follows_stored_expiry() {
    let dir = TempDir::new().unwrap();
    let tokens = TokenStore::new(create_store(StorageBackend::File, dir.path()).unwrap());

    let credential = long_lived("t1", Some(5_184_000));
    tokens.set_token(&credential).await.unwrap();
    assert!(tokens.is_token_valid().await.unwrap());

    let expired = credential.with_expiry(Utc::now() - Duration::seconds(1));
    tokens.set_token(&expired).await.unwrap();
    assert!(!tokens.is_token_valid().await.unwrap());
    assert!(tokens.get_token().await.unwrap().is_some());
}

#[tokio::test]
async fn test_credential_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(FileStore::DEFAULT_FILE_NAME);
    let credential = long_lived("persisted", Some(3600));

    {
        let tokens = TokenStore::new(Arc::new(FileStore::open(&path).unwrap()));
        tokens.set_token(&credential).await.unwrap();
    }

    let tokens = TokenStore::new(Arc::new(FileStore::open(&path).unwrap()));
    let restored = tokens.get_token().await.unwrap().unwrap();
    assert_eq!(restored.token.expose(), "persisted");
    assert_eq!(restored.expires_at, credential.expires_at);
    assert_eq!(restored.issued_at, credential.issued_at);
}

#[tokio::test]
async fn test_session_resumes_from_durable_storage() {
    let dir = TempDir::new().unwrap();
    let api = FakeApi::new();

    {
        let store = create_store(StorageBackend::File, dir.path()).unwrap();
        TokenStore::new(store)
            .set_token(&long_lived("persisted", Some(3600)))
            .await
            .unwrap();
    }

    let store = create_store(StorageBackend::File, dir.path()).unwrap();
    let session = Session::new(&config(), api.clone(), store).unwrap();

    assert!(session.is_authenticated().await.unwrap());
    assert!(matches!(
        session.resume().await.unwrap(),
        ScheduleOutcome::Scheduled { .. }
    ));

    session.current_user().await.unwrap();
    assert_eq!(api.seen_tokens.lock().as_slice(), ["persisted"]);
}

#[tokio::test]
async fn test_logout_removes_credential_from_disk() {
    let dir = TempDir::new().unwrap();
    let api = FakeApi::new();
    let store = create_store(StorageBackend::File, dir.path()).unwrap();
    let session = Session::new(&config(), api, store).unwrap();
    session
        .tokens()
        .set_token(&long_lived("t1", Some(3600)))
        .await
        .unwrap();

    session.logout().await.unwrap();

    let reopened = TokenStore::new(create_store(StorageBackend::File, dir.path()).unwrap());
    assert!(reopened.get_token().await.unwrap().is_none());
}
