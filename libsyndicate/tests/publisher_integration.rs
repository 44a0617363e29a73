//! Integration tests for fan-out publishing
//!
//! Mock platforms stand in for the real APIs; everything else (store, claim,
//! refresh, evergreen) is the production path.

mod common;

use std::time::Duration;

use common::{Harness, OrphanResultStore, USER};
use libsyndicate::error::PlatformError;
use libsyndicate::platforms::http::map_status;
use libsyndicate::platforms::mock::MockPlatform;
use libsyndicate::types::{MediaItem, PostAnalytics};
use libsyndicate::{Platform, PostStatus, SocialPost, SocialStore, SyndicateError};

#[tokio::test]
async fn test_publish_to_every_account() {
    let twitter = MockPlatform::success(Platform::Twitter);
    let linkedin = MockPlatform::success(Platform::LinkedIn);
    let h = Harness::new(vec![twitter.clone(), linkedin.clone()]).await;

    h.account(Platform::Twitter, "alice").await;
    h.account(Platform::Twitter, "alice_alt").await;
    h.account(Platform::LinkedIn, "alice").await;
    let post = h
        .draft("Launch day", &[Platform::Twitter, Platform::LinkedIn])
        .await;

    let report = h.publisher.publish_post(&post.id).await.unwrap();

    assert_eq!(report.status, PostStatus::Published);
    assert_eq!(report.results.len(), 3);
    assert_eq!(report.successful(), 3);
    assert_eq!(twitter.publish_count(), 2);
    assert_eq!(linkedin.publish_count(), 1);

    let stored = h.db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Published);
    assert!(stored.posted_at.is_some());
    assert_eq!(h.db.results_for_post(&post.id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_partial_failure_still_publishes() {
    let twitter = MockPlatform::failing_for(Platform::Twitter, &["bob"]);
    let h = Harness::new(vec![twitter.clone()]).await;

    h.account(Platform::Twitter, "alice").await;
    let bob = h.account(Platform::Twitter, "bob").await;
    let post = h.draft("Half of this works", &[Platform::Twitter]).await;

    let report = h.publisher.publish_post(&post.id).await.unwrap();

    assert_eq!(report.status, PostStatus::Published);
    assert_eq!(report.successful(), 1);
    assert_eq!(report.failed(), 1);

    let failed = report.results.iter().find(|r| !r.is_posted()).unwrap();
    assert_eq!(failed.account_id, bob.id);
    assert!(failed.remote_post_id.is_none());
    assert!(failed.error_message.as_deref().unwrap().contains("500"));
}

#[tokio::test]
async fn test_all_accounts_failing_marks_post_failed() {
    let twitter = MockPlatform::publish_failure(
        Platform::Twitter,
        PlatformError::Network("connection reset".to_string()),
    );
    let h = Harness::new(vec![twitter]).await;

    h.account(Platform::Twitter, "alice").await;
    let post = h.draft("Nobody will see this", &[Platform::Twitter]).await;

    let report = h.publisher.publish_post(&post.id).await.unwrap();

    assert_eq!(report.status, PostStatus::Failed);
    assert_eq!(report.successful(), 0);
    assert_eq!(h.status(&post.id).await, PostStatus::Failed);

    let stored = h.db.get_post(&post.id).await.unwrap().unwrap();
    assert!(stored.posted_at.is_none());
}

#[tokio::test]
async fn test_results_and_status_are_stored_together() {
    let twitter = MockPlatform::success(Platform::Twitter);
    let h = Harness::with_store(vec![twitter.clone()], OrphanResultStore::wrap).await;

    h.account(Platform::Twitter, "alice").await;
    h.account(Platform::Twitter, "bob").await;
    h.account(Platform::Twitter, "carol").await;
    let post = h.draft("Three copies", &[Platform::Twitter]).await;

    let result = h.publisher.publish_post(&post.id).await;

    assert!(matches!(result, Err(SyndicateError::Database(_))));
    assert_eq!(twitter.publish_count(), 3);
    // Nothing from the aborted write survives
    assert!(h.db.results_for_post(&post.id).await.unwrap().is_empty());
    let stored = h.db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Failed);
    assert!(stored.posted_at.is_none());
}

#[tokio::test]
async fn test_no_accounts_is_validation_error() {
    let h = Harness::new(vec![MockPlatform::success(Platform::Twitter)]).await;
    let post = h.draft("Into the void", &[Platform::Twitter]).await;

    let result = h.publisher.publish_post(&post.id).await;

    assert!(matches!(result, Err(SyndicateError::Validation(_))));
    assert_eq!(h.status(&post.id).await, PostStatus::Failed);
    assert!(h.db.results_for_post(&post.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_accounts_on_other_platforms_are_ignored() {
    let linkedin = MockPlatform::success(Platform::LinkedIn);
    let h = Harness::new(vec![MockPlatform::success(Platform::Twitter), linkedin.clone()]).await;

    h.account(Platform::LinkedIn, "alice").await;
    let post = h.draft("Twitter only", &[Platform::Twitter]).await;

    let result = h.publisher.publish_post(&post.id).await;

    assert!(matches!(result, Err(SyndicateError::Validation(_))));
    assert_eq!(linkedin.publish_count(), 0);
}

#[tokio::test]
async fn test_empty_content_is_validation_error() {
    let twitter = MockPlatform::success(Platform::Twitter);
    let h = Harness::new(vec![twitter.clone()]).await;

    h.account(Platform::Twitter, "alice").await;
    let post = h.draft("   ", &[Platform::Twitter]).await;

    let result = h.publisher.publish_post(&post.id).await;

    assert!(matches!(result, Err(SyndicateError::Validation(_))));
    assert_eq!(h.status(&post.id).await, PostStatus::Failed);
    assert_eq!(twitter.publish_count(), 0);
}

#[tokio::test]
async fn test_missing_post() {
    let h = Harness::new(vec![]).await;
    let result = h.publisher.publish_post("does-not-exist").await;
    assert!(matches!(result, Err(SyndicateError::NotFound(_))));
}

#[tokio::test]
async fn test_published_post_cannot_be_published_again() {
    let twitter = MockPlatform::success(Platform::Twitter);
    let h = Harness::new(vec![twitter.clone()]).await;

    h.account(Platform::Twitter, "alice").await;
    let post = h.draft("Once only", &[Platform::Twitter]).await;

    h.publisher.publish_post(&post.id).await.unwrap();
    let second = h.publisher.publish_post(&post.id).await;

    assert!(matches!(second, Err(SyndicateError::Validation(_))));
    assert_eq!(twitter.publish_count(), 1);
    assert_eq!(h.status(&post.id).await, PostStatus::Published);
}

#[tokio::test]
async fn test_concurrent_attempts_publish_once() {
    let twitter = MockPlatform::with_delay(Platform::Twitter, Duration::from_millis(50));
    let h = Harness::new(vec![twitter.clone()]).await;

    h.account(Platform::Twitter, "alice").await;
    let post = h.draft("Race me", &[Platform::Twitter]).await;

    let (first, second) = tokio::join!(
        h.publisher.publish_post(&post.id),
        h.publisher.publish_post(&post.id)
    );

    assert_eq!([first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(), 1);
    assert_eq!(twitter.publish_count(), 1);
    assert_eq!(h.db.results_for_post(&post.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unsupported_platform_fails_only_that_account() {
    let twitter = MockPlatform::success(Platform::Twitter);
    let h = Harness::new(vec![twitter.clone()]).await;

    h.account(Platform::Twitter, "alice").await;
    let facebook = h.account(Platform::Facebook, "alice").await;
    let post = h
        .draft("Everywhere", &[Platform::Twitter, Platform::Facebook])
        .await;

    let report = h.publisher.publish_post(&post.id).await.unwrap();

    assert_eq!(report.status, PostStatus::Published);
    let failed = report
        .results
        .iter()
        .find(|r| r.account_id == facebook.id)
        .unwrap();
    assert!(!failed.is_posted());
    assert!(failed
        .error_message
        .as_deref()
        .unwrap()
        .contains("Facebook is not yet supported"));
}

#[tokio::test]
async fn test_slow_platform_times_out() {
    let slow = MockPlatform::with_delay(Platform::LinkedIn, Duration::from_secs(5));
    let twitter = MockPlatform::success(Platform::Twitter);
    let h = Harness::with_timeout(vec![twitter, slow], Duration::from_millis(200)).await;

    h.account(Platform::Twitter, "alice").await;
    let linkedin = h.account(Platform::LinkedIn, "alice").await;
    let post = h
        .draft("Fast and slow", &[Platform::Twitter, Platform::LinkedIn])
        .await;

    let report = h.publisher.publish_post(&post.id).await.unwrap();

    assert_eq!(report.status, PostStatus::Published);
    let timed_out = report
        .results
        .iter()
        .find(|r| r.account_id == linkedin.id)
        .unwrap();
    assert!(!timed_out.is_posted());
    assert!(timed_out
        .error_message
        .as_deref()
        .unwrap()
        .contains("timed out"));
}

#[tokio::test]
async fn test_multi_step_publish_gets_its_own_budget() {
    let slow = MockPlatform::with_delay(Platform::Twitter, Duration::from_millis(300));
    let h = Harness::with_timeouts(
        vec![slow.clone()],
        Duration::from_millis(100),
        Duration::from_secs(5),
    )
    .await;

    h.account(Platform::Twitter, "alice").await;
    let post = h.draft("Uploads take a while", &[Platform::Twitter]).await;

    let report = h.publisher.publish_post(&post.id).await.unwrap();

    assert_eq!(report.status, PostStatus::Published);
    assert_eq!(report.successful(), 1);
    assert_eq!(slow.publish_count(), 1);
}

#[tokio::test]
async fn test_variant_only_post_skips_platforms_without_content() {
    let twitter = MockPlatform::success(Platform::Twitter);
    let linkedin = MockPlatform::success(Platform::LinkedIn);
    let h = Harness::new(vec![twitter.clone(), linkedin.clone()]).await;

    let tw_account = h.account(Platform::Twitter, "alice").await;
    h.account(Platform::LinkedIn, "alice").await;
    let mut post = SocialPost::new(
        USER.to_string(),
        String::new(),
        vec![Platform::Twitter, Platform::LinkedIn],
    );
    post.content_variants
        .insert(Platform::LinkedIn, "Long-form for LinkedIn".to_string());
    h.db.insert_post(&post).await.unwrap();

    let report = h.publisher.publish_post(&post.id).await.unwrap();

    assert_eq!(report.status, PostStatus::Published);
    assert_eq!(report.successful(), 1);
    assert_eq!(twitter.publish_count(), 0);
    assert_eq!(linkedin.publish_count(), 1);
    assert_eq!(linkedin.published()[0].text, "Long-form for LinkedIn");

    let skipped = report
        .results
        .iter()
        .find(|r| r.account_id == tw_account.id)
        .unwrap();
    assert!(!skipped.is_posted());
    assert!(skipped
        .error_message
        .as_deref()
        .unwrap()
        .contains("no content for Twitter"));
}

#[tokio::test]
async fn test_content_variant_and_link_reach_platform() {
    let twitter = MockPlatform::success(Platform::Twitter);
    let linkedin = MockPlatform::success(Platform::LinkedIn);
    let h = Harness::new(vec![twitter.clone(), linkedin.clone()]).await;

    h.account(Platform::Twitter, "alice").await;
    h.account(Platform::LinkedIn, "alice").await;

    let mut post = libsyndicate::SocialPost::new(
        USER.to_string(),
        "Short".to_string(),
        vec![Platform::Twitter, Platform::LinkedIn],
    );
    post.content_variants
        .insert(Platform::LinkedIn, "A longer note for LinkedIn".to_string());
    post.link_url = Some("https://example.com/launch".to_string());
    h.db.insert_post(&post).await.unwrap();

    h.publisher.publish_post(&post.id).await.unwrap();

    let tweet = &twitter.published()[0];
    assert_eq!(tweet.text, "Short");
    assert_eq!(tweet.link_url.as_deref(), Some("https://example.com/launch"));
    assert_eq!(linkedin.published()[0].text, "A longer note for LinkedIn");
}

#[tokio::test]
async fn test_media_is_passed_in_order() {
    let twitter = MockPlatform::success(Platform::Twitter);
    let h = Harness::new(vec![twitter.clone()]).await;
    h.account(Platform::Twitter, "alice").await;

    let first = MediaItem::new("https://cdn.example.com/a.png".into(), "image/png".into());
    let second = MediaItem::new("https://cdn.example.com/b.mp4".into(), "video/mp4".into());
    h.db.insert_media(&first).await.unwrap();
    h.db.insert_media(&second).await.unwrap();

    let mut post = libsyndicate::SocialPost::new(
        USER.to_string(),
        "With pictures".to_string(),
        vec![Platform::Twitter],
    );
    post.media_ids = vec![second.id.clone(), first.id.clone(), "missing".to_string()];
    h.db.insert_post(&post).await.unwrap();

    let report = h.publisher.publish_post(&post.id).await.unwrap();

    assert_eq!(report.status, PostStatus::Published);
    assert_eq!(
        twitter.published()[0].media_ids,
        vec![second.id.clone(), first.id.clone()]
    );
}

#[tokio::test]
async fn test_expired_token_is_refreshed_before_publish() {
    let twitter = MockPlatform::success(Platform::Twitter);
    let h = Harness::new(vec![twitter.clone()]).await;

    let now = chrono::Utc::now().timestamp();
    let account = h
        .account_expiring(Platform::Twitter, "alice", Some(now - 10))
        .await;
    let post = h.draft("Fresh token please", &[Platform::Twitter]).await;

    let report = h.publisher.publish_post(&post.id).await.unwrap();

    assert_eq!(report.status, PostStatus::Published);
    assert_eq!(twitter.refresh_count(), 1);

    let stored = h.db.get_account(&account.id).await.unwrap().unwrap();
    assert_eq!(
        stored.encrypted_access_token,
        format!("mock-refreshed-{}-1", account.id)
    );
    assert!(!stored.token_expired(now));
    // The refresh grant returned no refresh token, so the old one is kept
    assert_eq!(stored.encrypted_refresh_token.as_deref(), Some("refresh-alice"));
}

#[tokio::test]
async fn test_failed_refresh_fails_that_account() {
    let twitter = MockPlatform::success(Platform::Twitter).with_refresh_error(
        PlatformError::Authentication("refresh token revoked".to_string()),
    );
    let h = Harness::new(vec![twitter.clone()]).await;

    let now = chrono::Utc::now().timestamp();
    let account = h
        .account_expiring(Platform::Twitter, "alice", Some(now - 10))
        .await;
    let post = h.draft("Stale", &[Platform::Twitter]).await;

    let report = h.publisher.publish_post(&post.id).await.unwrap();

    assert_eq!(report.status, PostStatus::Failed);
    assert_eq!(twitter.publish_count(), 0);
    assert!(report.results[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("token refresh failed"));

    let stored = h.db.get_account(&account.id).await.unwrap().unwrap();
    assert_eq!(stored.encrypted_access_token, "access-alice");
}

#[tokio::test]
async fn test_expired_token_without_refresh_support_still_attempts() {
    let linkedin = MockPlatform::success(Platform::LinkedIn).without_refresh();
    let h = Harness::new(vec![linkedin.clone()]).await;

    let now = chrono::Utc::now().timestamp();
    h.account_expiring(Platform::LinkedIn, "alice", Some(now - 10))
        .await;
    let post = h.draft("No refresh grant", &[Platform::LinkedIn]).await;

    let report = h.publisher.publish_post(&post.id).await.unwrap();

    assert_eq!(report.status, PostStatus::Published);
    assert_eq!(linkedin.refresh_count(), 0);
}

#[tokio::test]
async fn test_auth_failure_refreshes_for_next_attempt() {
    let twitter = MockPlatform::auth_failure(Platform::Twitter);
    let h = Harness::new(vec![twitter.clone()]).await;

    let account = h.account(Platform::Twitter, "alice").await;
    let post = h.draft("Rejected", &[Platform::Twitter]).await;

    let report = h.publisher.publish_post(&post.id).await.unwrap();

    assert_eq!(report.status, PostStatus::Failed);
    assert_eq!(twitter.publish_count(), 1, "no retry within the attempt");
    assert_eq!(twitter.refresh_count(), 1);

    let stored = h.db.get_account(&account.id).await.unwrap().unwrap();
    assert!(stored.encrypted_access_token.starts_with("mock-refreshed-"));
}

#[tokio::test]
async fn test_forbidden_does_not_refresh_token() {
    let twitter = MockPlatform::publish_failure(
        Platform::Twitter,
        map_status(
            Platform::Twitter,
            reqwest::StatusCode::FORBIDDEN,
            "duplicate content".to_string(),
        ),
    );
    let h = Harness::new(vec![twitter.clone()]).await;

    let account = h.account(Platform::Twitter, "alice").await;
    let post = h.draft("Said this before", &[Platform::Twitter]).await;

    let report = h.publisher.publish_post(&post.id).await.unwrap();

    assert_eq!(report.status, PostStatus::Failed);
    assert_eq!(twitter.refresh_count(), 0);
    let stored = h.db.get_account(&account.id).await.unwrap().unwrap();
    assert_eq!(stored.encrypted_access_token, account.encrypted_access_token);
}

#[tokio::test]
async fn test_evergreen_post_is_recycled() {
    let twitter = MockPlatform::success(Platform::Twitter);
    let h = Harness::new(vec![twitter]).await;
    h.account(Platform::Twitter, "alice").await;

    let mut post = libsyndicate::SocialPost::new(
        USER.to_string(),
        "Evergreen tip".to_string(),
        vec![Platform::Twitter],
    );
    post.is_evergreen = true;
    post.evergreen_interval_days = Some(7);
    h.db.insert_post(&post).await.unwrap();

    let before = chrono::Utc::now().timestamp();
    let report = h.publisher.publish_post(&post.id).await.unwrap();
    let after = chrono::Utc::now().timestamp();

    let next_id = report.recycled_post_id.expect("next occurrence scheduled");
    assert!(report.recycle_error.is_none());

    let next = h.db.get_post(&next_id).await.unwrap().unwrap();
    let week = 7 * 24 * 60 * 60;
    assert_eq!(next.status, PostStatus::Scheduled);
    assert_eq!(next.content, "Evergreen tip");
    assert_eq!(next.recycle_count, 1);
    assert!(next.is_evergreen);
    let scheduled_at = next.scheduled_at.unwrap();
    assert!(scheduled_at >= before + week && scheduled_at <= after + week);

    let original = h.db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(original.status, PostStatus::Published);
    assert_eq!(original.recycle_count, 0);
    assert!(original.last_recycled_at.is_some());
}

#[tokio::test]
async fn test_failed_evergreen_post_is_not_recycled() {
    let twitter = MockPlatform::auth_failure(Platform::Twitter).without_refresh();
    let h = Harness::new(vec![twitter]).await;
    h.account(Platform::Twitter, "alice").await;

    let mut post = libsyndicate::SocialPost::new(
        USER.to_string(),
        "Evergreen tip".to_string(),
        vec![Platform::Twitter],
    );
    post.is_evergreen = true;
    h.db.insert_post(&post).await.unwrap();

    let report = h.publisher.publish_post(&post.id).await.unwrap();

    assert_eq!(report.status, PostStatus::Failed);
    assert!(report.recycled_post_id.is_none());
    assert!(h.dispatcher.due_posts_at(i64::MAX).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unpublish_deletes_remote_copies() {
    let twitter = MockPlatform::failing_for(Platform::Twitter, &["bob"]);
    let h = Harness::new(vec![twitter.clone()]).await;

    h.account(Platform::Twitter, "alice").await;
    h.account(Platform::Twitter, "bob").await;
    let post = h.draft("Regrettable", &[Platform::Twitter]).await;
    let report = h.publisher.publish_post(&post.id).await.unwrap();

    let outcomes = h.publisher.unpublish(&post.id).await.unwrap();

    // Only the posted copy exists remotely
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].error.is_none());
    let posted = report.results.iter().find(|r| r.is_posted()).unwrap();
    assert_eq!(
        twitter.deleted(),
        vec![posted.remote_post_id.clone().unwrap()]
    );
}

#[tokio::test]
async fn test_collect_analytics() {
    let metrics = PostAnalytics {
        impressions: 1200,
        likes: 40,
        shares: 3,
        ..Default::default()
    };
    let twitter = MockPlatform::success(Platform::Twitter).with_analytics(metrics);
    let h = Harness::new(vec![twitter]).await;

    h.account(Platform::Twitter, "alice").await;
    let post = h.draft("Measure me", &[Platform::Twitter]).await;
    h.publisher.publish_post(&post.id).await.unwrap();

    let collected = h.publisher.collect_analytics(&post.id).await.unwrap();

    assert_eq!(collected.len(), 1);
    assert_eq!(collected[0].analytics, Some(metrics));
    assert!(collected[0].error.is_none());

    assert!(matches!(
        h.publisher.collect_analytics("missing").await,
        Err(SyndicateError::NotFound(_))
    ));
}
