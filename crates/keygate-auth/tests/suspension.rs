//! Application suspension and destruction cascades.

mod common;

use common::{harness, registered};
use keygate_auth::{AuthError, SecretHolder};
use keygate_cache::{IndexEntry, KeyValueStore};
use keygate_storage::EntityStore;

#[tokio::test]
async fn test_suspension_destroys_tokens_and_their_cache_entries() {
    let h = harness();
    let app = registered(&h, &["read"]).await;
    let t1 = h.credentials.issue_token(&app, &["read"], 0).await.unwrap();
    let t2 = h.credentials.issue_token(&app, &[], 0).await.unwrap();

    // Warm both caches.
    for token in [&t1, &t2] {
        h.credentials
            .authenticate_bearer(&token.encode_secret())
            .await
            .unwrap();
        assert!(
            h.kv.get(&format!("tokens:{}", token.id))
                .await
                .unwrap()
                .is_some()
        );
    }

    let suspended = h.credentials.suspend_application(&app.id).await.unwrap();
    assert!(suspended.suspended);

    for token in [&t1, &t2] {
        let id = token.id.to_string();
        assert!(
            h.credentials
                .tokens()
                .inner()
                .find_by_id(&id, &[])
                .await
                .unwrap()
                .is_none()
        );
        assert!(h.kv.get(&format!("tokens:{id}")).await.unwrap().is_none());
        assert_eq!(
            h.credentials.token_secrets().entry(token.secret.as_hex()),
            None
        );

        let err = h
            .credentials
            .authenticate_bearer(&token.encode_secret())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken { .. }));
    }
}

#[tokio::test]
async fn test_suspension_leaves_other_applications_alone() {
    let h = harness();
    let doomed = registered(&h, &[]).await;
    let other = registered(&h, &[]).await;
    h.credentials.issue_token(&doomed, &[], 0).await.unwrap();
    let kept = h.credentials.issue_token(&other, &[], 0).await.unwrap();

    h.credentials.suspend_application(&doomed.id).await.unwrap();

    let found = h.credentials.find_token(&kept.id).await.unwrap();
    assert_eq!(found.map(|t| t.id), Some(kept.id));
}

#[tokio::test]
async fn test_suspended_application_cannot_issue_or_authenticate() {
    let h = harness();
    let app = registered(&h, &[]).await;
    let suspended = h.credentials.suspend_application(&app.id).await.unwrap();

    let err = h
        .credentials
        .issue_token(&suspended, &[], 0)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidClient { .. }));

    let err = h
        .credentials
        .authenticate_basic(&app.encode_basic_auth())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidClient { .. }));
}

#[tokio::test]
async fn test_destroying_application_evicts_cached_tokens() {
    let h = harness();
    let app = registered(&h, &[]).await;
    let token = h.credentials.issue_token(&app, &[], 0).await.unwrap();
    let key = format!("tokens:{}", token.id);
    assert!(h.kv.get(&key).await.unwrap().is_some());

    h.credentials.destroy_application(&app.id).await.unwrap();

    assert!(h.kv.get(&key).await.unwrap().is_none());
    assert!(h.kv.get(&format!("applications:{}", app.id)).await.unwrap().is_none());
    // Eviction only; the token row itself remains.
    assert!(h.credentials.find_token(&token.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_unknown_secret_is_negatively_cached() {
    let h = harness();
    let app = registered(&h, &[]).await;
    let token = h.credentials.issue_token(&app, &[], 0).await.unwrap();

    assert!(h.credentials.authenticate_bearer("AAAA").await.is_err());
    assert_eq!(
        h.credentials.token_secrets().entry("000000"),
        Some(IndexEntry::Absent)
    );
    assert_eq!(
        h.credentials.token_secrets().entry(token.secret.as_hex()),
        Some(IndexEntry::Id(token.id.to_string()))
    );
}
