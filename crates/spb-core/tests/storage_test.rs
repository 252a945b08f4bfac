//! Integration tests for the storage repositories.
//!
//! Every test runs against its own freshly migrated database, so the
//! assertions here cover real SQL behavior: constraint handling,
//! transaction rollback, and the locking rate-window counter.

use chrono::{Duration, TimeZone, Utc};
use spb_core::{
    storage::{
        audit_log::NewAuditEntry, credentials::NewCredential, pages::NewPage,
        webhook_deliveries::NewWebhookDelivery, Storage,
    },
    CoreError, CreatedPage, Credential, CredentialId, CredentialStatus, DeliveryStatus, PageId,
    RequestId, RequestResult,
};
use spb_testing::TestDatabase;

async fn fresh() -> (TestDatabase, Storage) {
    let db = TestDatabase::new().await.expect("test database should provision");
    let storage = Storage::new(db.pool());
    (db, storage)
}

/// Storage-layer tests never authenticate, so hashes and fingerprints are
/// arbitrary strings.
fn credential_fields(name: &str) -> NewCredential {
    NewCredential {
        name: name.to_string(),
        key_hash: format!("$argon2id$placeholder-key-{name}"),
        secret_hash: format!("$argon2id$placeholder-secret-{name}"),
        key_fingerprint: format!("fp-{name}"),
        secret_fingerprint: format!("sfp-{name}"),
        key_hint: "spb_...abcd".to_string(),
        expires_at: None,
    }
}

async fn insert_credential(storage: &Storage, name: &str) -> Credential {
    storage
        .credentials
        .create(&credential_fields(name))
        .await
        .expect("credential insert should succeed")
}

async fn insert_page(storage: &Storage, title: &str, slug: &str) -> PageId {
    let page = storage
        .pages
        .create(&NewPage { title: title.into(), content: String::new(), slug: slug.into() })
        .await
        .expect("page insert should succeed");
    page.id
}

fn audit_fields(request_id: RequestId, result: RequestResult, status_code: i32) -> NewAuditEntry {
    NewAuditEntry {
        request_id,
        credential_id: None,
        endpoint: "/v1/create-pages".to_string(),
        method: "POST".to_string(),
        status_code,
        result,
        client_ip: None,
        user_agent: None,
        message: String::new(),
        pages_created: 0,
    }
}

#[tokio::test]
async fn credential_create_returns_the_stored_row() {
    let (_db, storage) = fresh().await;

    let credential = insert_credential(&storage, "robot").await;

    assert!(credential.id > 0);
    assert_eq!(credential.name, "robot");
    assert_eq!(credential.status, CredentialStatus::Active);
    assert_eq!(credential.request_count, 0);
    assert!(credential.last_used_at.is_none());
    assert!(credential.last_ip.is_none());
}

#[tokio::test]
async fn fingerprint_lookup_finds_the_row() {
    let (_db, storage) = fresh().await;
    let created = insert_credential(&storage, "robot").await;

    let found = storage
        .credentials
        .find_by_fingerprint("fp-robot")
        .await
        .expect("lookup should succeed")
        .expect("fingerprint should resolve");
    assert_eq!(found.id, created.id);

    let missing = storage
        .credentials
        .find_by_fingerprint("fp-nobody")
        .await
        .expect("lookup should succeed");
    assert!(missing.is_none());
}

#[tokio::test]
async fn duplicate_fingerprint_is_a_constraint_violation() {
    let (_db, storage) = fresh().await;
    insert_credential(&storage, "robot").await;

    let err = storage
        .credentials
        .create(&credential_fields("robot"))
        .await
        .expect_err("second insert with the same fingerprint should fail");

    assert!(matches!(err, CoreError::ConstraintViolation(_)), "got {err:?}");
}

#[tokio::test]
async fn revocation_flips_status_without_deleting() {
    let (_db, storage) = fresh().await;
    let credential = insert_credential(&storage, "robot").await;

    storage
        .credentials
        .set_status(credential.id, CredentialStatus::Revoked)
        .await
        .expect("status update should succeed");

    let reloaded = storage
        .credentials
        .find_by_id(credential.id)
        .await
        .expect("lookup should succeed")
        .expect("revoked row should still exist");
    assert_eq!(reloaded.status, CredentialStatus::Revoked);

    let err = storage
        .credentials
        .set_status(CredentialId(credential.id.0 + 1000), CredentialStatus::Revoked)
        .await
        .expect_err("updating a missing row should fail");
    assert!(matches!(err, CoreError::NotFound));
}

#[tokio::test]
async fn touch_updates_usage_bookkeeping() {
    let (_db, storage) = fresh().await;
    let credential = insert_credential(&storage, "robot").await;
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).single().unwrap();

    storage
        .credentials
        .touch(credential.id, now, Some("203.0.113.7"))
        .await
        .expect("touch should succeed");
    storage
        .credentials
        .touch(credential.id, now + Duration::minutes(5), None)
        .await
        .expect("touch should succeed");

    let reloaded = storage
        .credentials
        .find_by_id(credential.id)
        .await
        .expect("lookup should succeed")
        .expect("row should exist");
    assert_eq!(reloaded.request_count, 2);
    assert_eq!(reloaded.last_used_at, Some(now + Duration::minutes(5)));
    // The last touch carried no IP, so the column reflects that.
    assert!(reloaded.last_ip.is_none());

    let err = storage
        .credentials
        .touch(CredentialId(credential.id.0 + 1000), now, None)
        .await
        .expect_err("touching a missing row should fail");
    assert!(matches!(err, CoreError::NotFound));
}

#[tokio::test]
async fn listing_hides_revoked_credentials_by_default() {
    let (_db, storage) = fresh().await;
    insert_credential(&storage, "active-bot").await;
    let revoked = insert_credential(&storage, "retired-bot").await;
    storage
        .credentials
        .set_status(revoked.id, CredentialStatus::Revoked)
        .await
        .expect("status update should succeed");

    let visible = storage.credentials.list(false).await.expect("list should succeed");
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].name, "active-bot");

    let all = storage.credentials.list(true).await.expect("list should succeed");
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn pages_round_trip() {
    let (_db, storage) = fresh().await;

    let id = insert_page(&storage, "Hello World", "hello-world").await;

    let page = storage
        .pages
        .find(id)
        .await
        .expect("lookup should succeed")
        .expect("page should exist");
    assert_eq!(page.title, "Hello World");
    assert_eq!(page.slug, "hello-world");
    assert_eq!(page.status, "draft");

    assert_eq!(storage.pages.count().await.expect("count should succeed"), 1);
}

#[tokio::test]
async fn creation_records_link_pages_to_their_request() {
    let (_db, storage) = fresh().await;
    let credential = insert_credential(&storage, "robot").await;
    let first = insert_page(&storage, "First", "first").await;
    let second = insert_page(&storage, "Second", "second").await;
    let request_id = RequestId::generate();

    let created = vec![
        CreatedPage { id: first, title: "First".into(), url: "https://x/pages/first".into() },
        CreatedPage { id: second, title: "Second".into(), url: "https://x/pages/second".into() },
    ];
    storage
        .created_pages
        .record_batch(&request_id, credential.id, &created)
        .await
        .expect("bookkeeping insert should succeed");

    let records = storage
        .created_pages
        .find_by_request(&request_id)
        .await
        .expect("lookup should succeed");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].page_id, first);
    assert_eq!(records[1].page_id, second);
    assert!(records.iter().all(|r| r.credential_id == credential.id));

    let lifetime = storage
        .created_pages
        .count_for_credential(credential.id)
        .await
        .expect("count should succeed");
    assert_eq!(lifetime, 2);
}

#[tokio::test]
async fn empty_batch_writes_no_creation_records() {
    let (_db, storage) = fresh().await;
    let credential = insert_credential(&storage, "robot").await;
    let request_id = RequestId::generate();

    storage
        .created_pages
        .record_batch(&request_id, credential.id, &[])
        .await
        .expect("empty batch should be a no-op");

    let records = storage
        .created_pages
        .find_by_request(&request_id)
        .await
        .expect("lookup should succeed");
    assert!(records.is_empty());
}

#[tokio::test]
async fn bad_page_reference_rolls_back_the_whole_batch() {
    let (_db, storage) = fresh().await;
    let credential = insert_credential(&storage, "robot").await;
    let real = insert_page(&storage, "Real", "real").await;
    let request_id = RequestId::generate();

    let created = vec![
        CreatedPage { id: real, title: "Real".into(), url: "https://x/pages/real".into() },
        CreatedPage { id: PageId(999_999), title: "Ghost".into(), url: "https://x/pages/ghost".into() },
    ];
    let err = storage
        .created_pages
        .record_batch(&request_id, credential.id, &created)
        .await
        .expect_err("foreign key violation should fail the batch");
    assert!(matches!(err, CoreError::ConstraintViolation(_)), "got {err:?}");

    // The valid row must not survive the rollback.
    let records = storage
        .created_pages
        .find_by_request(&request_id)
        .await
        .expect("lookup should succeed");
    assert!(records.is_empty());
}

#[tokio::test]
async fn audit_rows_round_trip() {
    let (_db, storage) = fresh().await;
    let credential = insert_credential(&storage, "robot").await;
    let request_id = RequestId::generate();

    let entry = NewAuditEntry {
        credential_id: Some(credential.id),
        client_ip: Some("198.51.100.4".to_string()),
        user_agent: Some("spb-client/1.0".to_string()),
        message: "[]".to_string(),
        pages_created: 3,
        ..audit_fields(request_id.clone(), RequestResult::Success, 201)
    };
    let row_id = storage.audit_log.append(&entry).await.expect("append should succeed");
    assert!(row_id > 0);

    let stored = storage
        .audit_log
        .find_by_request(&request_id)
        .await
        .expect("lookup should succeed")
        .expect("row should exist");
    assert_eq!(stored.credential_id, Some(credential.id));
    assert_eq!(stored.endpoint, "/v1/create-pages");
    assert_eq!(stored.status_code, 201);
    assert_eq!(stored.result, RequestResult::Success);
    assert_eq!(stored.client_ip.as_deref(), Some("198.51.100.4"));
    assert_eq!(stored.user_agent.as_deref(), Some("spb-client/1.0"));
    assert_eq!(stored.pages_created, 3);
}

#[tokio::test]
async fn recent_audit_rows_come_newest_first() {
    let (_db, storage) = fresh().await;

    let mut ids = Vec::new();
    for status in [401, 429, 201] {
        let request_id = RequestId::generate();
        ids.push(request_id.clone());
        storage
            .audit_log
            .append(&audit_fields(request_id, RequestResult::Failed, status))
            .await
            .expect("append should succeed");
    }

    let recent = storage.audit_log.recent(2).await.expect("query should succeed");
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].request_id, ids[2]);
    assert_eq!(recent[1].request_id, ids[1]);
}

#[tokio::test]
async fn audit_counts_group_by_result() {
    let (_db, storage) = fresh().await;

    for (result, status) in [
        (RequestResult::Success, 201),
        (RequestResult::Failed, 400),
        (RequestResult::Failed, 400),
        (RequestResult::AuthFailed, 401),
    ] {
        storage
            .audit_log
            .append(&audit_fields(RequestId::generate(), result, status))
            .await
            .expect("append should succeed");
    }

    let count = |result| storage.audit_log.count_by_result(result);
    assert_eq!(count(RequestResult::Failed).await.expect("count should succeed"), 2);
    assert_eq!(count(RequestResult::Success).await.expect("count should succeed"), 1);
    assert_eq!(count(RequestResult::RateLimited).await.expect("count should succeed"), 0);
}

#[tokio::test]
async fn delivery_records_round_trip() {
    let (_db, storage) = fresh().await;
    let request_id = RequestId::generate();

    storage
        .webhook_deliveries
        .record(&NewWebhookDelivery {
            request_id: request_id.clone(),
            url: "https://hooks.example.test/pages".to_string(),
            status: DeliveryStatus::Failed,
            http_code: 503,
            attempts: 3,
            response_body: "upstream unavailable".to_string(),
        })
        .await
        .expect("record should succeed");

    let deliveries = storage
        .webhook_deliveries
        .find_by_request(&request_id)
        .await
        .expect("lookup should succeed");
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].status, DeliveryStatus::Failed);
    assert_eq!(deliveries[0].http_code, 503);
    assert_eq!(deliveries[0].attempts, 3);
    assert_eq!(deliveries[0].response_body, "upstream unavailable");

    let recent = storage.webhook_deliveries.recent(5).await.expect("query should succeed");
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].request_id, request_id);
}

#[tokio::test]
async fn rate_window_consumes_until_the_limit() {
    let (_db, storage) = fresh().await;
    let credential = insert_credential(&storage, "robot").await;
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().unwrap();
    let window = Duration::hours(1);

    let mut decisions = Vec::new();
    for _ in 0..3 {
        decisions.push(
            storage
                .rate_windows
                .check_and_consume(credential.id, 3, window, now)
                .await
                .expect("check should succeed"),
        );
    }

    assert!(decisions.iter().all(|d| d.allowed));
    assert_eq!(
        decisions.iter().map(|d| d.remaining).collect::<Vec<_>>(),
        vec![2, 1, 0]
    );
    assert!(decisions.iter().all(|d| d.reset_at == now + window));

    let denied = storage
        .rate_windows
        .check_and_consume(credential.id, 3, window, now)
        .await
        .expect("check should succeed");
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, 0);
    assert_eq!(denied.reset_at, now + window);

    // The denied request must not advance the counter past the limit.
    let stored = storage
        .rate_windows
        .find(credential.id)
        .await
        .expect("lookup should succeed")
        .expect("window should exist");
    assert_eq!(stored.count, 3);
}

#[tokio::test]
async fn expired_window_restarts_in_place() {
    let (_db, storage) = fresh().await;
    let credential = insert_credential(&storage, "robot").await;
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().unwrap();
    let window = Duration::hours(1);

    for _ in 0..2 {
        storage
            .rate_windows
            .check_and_consume(credential.id, 2, window, now)
            .await
            .expect("check should succeed");
    }

    let later = now + window + Duration::seconds(1);
    let decision = storage
        .rate_windows
        .check_and_consume(credential.id, 2, window, later)
        .await
        .expect("check should succeed");

    assert!(decision.allowed);
    assert_eq!(decision.remaining, 1);
    assert_eq!(decision.reset_at, later + window);
}

#[tokio::test]
async fn reset_clears_the_window() {
    let (_db, storage) = fresh().await;
    let credential = insert_credential(&storage, "robot").await;
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().unwrap();

    storage
        .rate_windows
        .check_and_consume(credential.id, 1, Duration::hours(1), now)
        .await
        .expect("check should succeed");
    storage.rate_windows.reset(credential.id).await.expect("reset should succeed");

    let stored = storage.rate_windows.find(credential.id).await.expect("lookup should succeed");
    assert!(stored.is_none());

    let fresh_decision = storage
        .rate_windows
        .check_and_consume(credential.id, 1, Duration::hours(1), now)
        .await
        .expect("check should succeed");
    assert!(fresh_decision.allowed);
}

#[tokio::test]
async fn purge_removes_only_expired_windows() {
    let (_db, storage) = fresh().await;
    let short_lived = insert_credential(&storage, "short").await;
    let long_lived = insert_credential(&storage, "long").await;
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().unwrap();

    storage
        .rate_windows
        .check_and_consume(short_lived.id, 5, Duration::hours(1), now)
        .await
        .expect("check should succeed");
    storage
        .rate_windows
        .check_and_consume(long_lived.id, 5, Duration::hours(3), now)
        .await
        .expect("check should succeed");

    let purged = storage
        .rate_windows
        .purge_expired(now + Duration::hours(2))
        .await
        .expect("purge should succeed");
    assert_eq!(purged, 1);

    assert!(storage
        .rate_windows
        .find(short_lived.id)
        .await
        .expect("lookup should succeed")
        .is_none());
    assert!(storage
        .rate_windows
        .find(long_lived.id)
        .await
        .expect("lookup should succeed")
        .is_some());
}
