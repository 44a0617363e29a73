//! Evergreen content recycling

use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::store::SocialStore;
use crate::types::{PostStatus, SocialPost};

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

pub struct EvergreenScheduler {
    store: Arc<dyn SocialStore>,
    default_interval_days: u32,
}

impl EvergreenScheduler {
    pub fn new(store: Arc<dyn SocialStore>, default_interval_days: u32) -> Self {
        Self {
            store,
            default_interval_days,
        }
    }

    /// Interval used for `post`, falling back to the configured default
    pub fn interval_days(&self, post: &SocialPost) -> u32 {
        post.evergreen_interval_days
            .filter(|days| *days > 0)
            .unwrap_or(self.default_interval_days)
    }

    /// Schedule the next occurrence of an evergreen post
    ///
    /// The copy keeps the content, variants, media, link, platforms and
    /// evergreen settings of `post`, is scheduled `interval` days after
    /// `now`, and carries `recycle_count + 1`. The original is only stamped
    /// with `last_recycled_at`.
    pub async fn recycle(&self, post: &SocialPost, now: i64) -> Result<SocialPost> {
        let interval = self.interval_days(post);
        let next = now + i64::from(interval) * SECONDS_PER_DAY;

        let copy = SocialPost {
            id: Uuid::new_v4().to_string(),
            user_id: post.user_id.clone(),
            content: post.content.clone(),
            content_variants: post.content_variants.clone(),
            media_ids: post.media_ids.clone(),
            link_url: post.link_url.clone(),
            platforms: post.platforms.clone(),
            status: PostStatus::Scheduled,
            scheduled_at: Some(next),
            posted_at: None,
            is_evergreen: true,
            evergreen_interval_days: post.evergreen_interval_days,
            recycle_count: post.recycle_count.saturating_add(1),
            last_recycled_at: None,
            created_at: now,
        };

        self.store.record_recycle(&copy, &post.id, now).await?;

        tracing::info!(
            post = %post.id,
            next_post = %copy.id,
            interval_days = interval,
            "Scheduled evergreen repost"
        );
        Ok(copy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::types::Platform;

    fn evergreen_post(interval: Option<u32>) -> SocialPost {
        let mut post = SocialPost::new(
            "user-1".to_string(),
            "Timeless advice".to_string(),
            vec![Platform::Twitter, Platform::LinkedIn],
        );
        post.status = PostStatus::Published;
        post.is_evergreen = true;
        post.evergreen_interval_days = interval;
        post.recycle_count = 2;
        post.link_url = Some("https://example.com".to_string());
        post.media_ids = vec!["m1".to_string()];
        post.content_variants
            .insert(Platform::LinkedIn, "Longer advice".to_string());
        post
    }

    #[tokio::test]
    async fn test_recycle_schedules_copy() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let post = evergreen_post(Some(7));
        db.insert_post(&post).await.unwrap();

        let scheduler = EvergreenScheduler::new(db.clone(), 30);
        let now = 1_700_000_000;
        let copy = scheduler.recycle(&post, now).await.unwrap();

        assert_ne!(copy.id, post.id);
        assert_eq!(copy.status, PostStatus::Scheduled);
        assert_eq!(copy.scheduled_at, Some(now + 7 * 86_400));
        assert_eq!(copy.recycle_count, 3);
        assert_eq!(copy.content, post.content);
        assert_eq!(copy.content_variants, post.content_variants);
        assert_eq!(copy.media_ids, post.media_ids);
        assert_eq!(copy.platforms, post.platforms);
        assert_eq!(copy.link_url, post.link_url);
        assert!(copy.is_evergreen);
        assert_eq!(copy.evergreen_interval_days, Some(7));

        let stored_copy = db.get_post(&copy.id).await.unwrap().unwrap();
        assert_eq!(stored_copy, copy);

        let original = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(original.last_recycled_at, Some(now));
        assert_eq!(original.content, post.content);
        assert_eq!(original.status, PostStatus::Published);
    }

    #[tokio::test]
    async fn test_default_interval() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let scheduler = EvergreenScheduler::new(db, 30);

        assert_eq!(scheduler.interval_days(&evergreen_post(None)), 30);
        assert_eq!(scheduler.interval_days(&evergreen_post(Some(0))), 30);
        assert_eq!(scheduler.interval_days(&evergreen_post(Some(14))), 14);
    }
}
