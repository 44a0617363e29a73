//! Due-post scan and batch publishing
//!
//! Intended to be driven by an external timer (cron, systemd timer, or the
//! `syndicate-send watch` loop). Each invocation publishes every scheduled
//! post whose time has come, a bounded number at a time.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::Result;
use crate::publisher::{PublishReport, Publisher};
use crate::store::SocialStore;
use crate::types::{PostStatus, SocialPost};

/// A post whose publish attempt errored at the batch level
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DispatchFailure {
    pub post_id: String,
    pub error: String,
}

/// Outcome of one due-post scan
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct DispatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub errors: Vec<DispatchFailure>,
}

pub struct Dispatcher {
    store: Arc<dyn SocialStore>,
    publisher: Arc<Publisher>,
    max_concurrency: usize,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn SocialStore>,
        publisher: Arc<Publisher>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            store,
            publisher,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Scheduled posts due now, oldest first
    pub async fn due_posts(&self) -> Result<Vec<SocialPost>> {
        self.due_posts_at(chrono::Utc::now().timestamp()).await
    }

    pub async fn due_posts_at(&self, now: i64) -> Result<Vec<SocialPost>> {
        self.store.due_posts(now).await
    }

    /// Publish every post that is due now
    pub async fn publish_due_posts(&self) -> Result<DispatchSummary> {
        self.publish_due_posts_at(chrono::Utc::now().timestamp())
            .await
    }

    /// Publish every post due at `now`
    ///
    /// A post counts as successful when it ends `Published`. Posts that end
    /// `Failed` or whose attempt errored count as failed; errored attempts are
    /// also listed in `errors`. One post never aborts the batch.
    pub async fn publish_due_posts_at(&self, now: i64) -> Result<DispatchSummary> {
        let due = self.due_posts_at(now).await?;
        let mut summary = DispatchSummary {
            total: due.len(),
            ..Default::default()
        };

        if due.is_empty() {
            tracing::debug!("No posts due");
            return Ok(summary);
        }
        info!(count = due.len(), "Publishing due posts");

        let outcomes: Vec<(String, Result<PublishReport>)> = stream::iter(due)
            .map(|post| async move {
                let outcome = self.publisher.publish_post(&post.id).await;
                (post.id, outcome)
            })
            .buffered(self.max_concurrency)
            .collect()
            .await;

        for (post_id, outcome) in outcomes {
            match outcome {
                Ok(report) if report.status == PostStatus::Published => summary.successful += 1,
                Ok(_) => summary.failed += 1,
                Err(e) => {
                    warn!(post = %post_id, "Due post failed: {}", e);
                    summary.failed += 1;
                    summary.errors.push(DispatchFailure {
                        post_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            total = summary.total,
            successful = summary.successful,
            failed = summary.failed,
            "Due-post scan finished"
        );
        Ok(summary)
    }
}
