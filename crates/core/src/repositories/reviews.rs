//! Pathologist review repository.
//!
//! Reviews live next to the sample they belong to, in `REVIEW.yaml`. They are created only by
//! [`SampleService::finalize`](crate::SampleService::finalize); this service lists them and
//! closes them.

use crate::config::CoreConfig;
use crate::constants::REVIEW_FILENAME;
use crate::events::{OrderEvent, OrderEventType};
use crate::repositories::samples::{load_sample, save_sample};
use crate::repositories::shared::{read_yaml, record_dirs, write_yaml};
use crate::review::{PathReview, ReviewStatus};
use crate::{LabError, LabResult};
use chrono::Utc;
use lab_uuid::LabUuid;
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug)]
pub struct ReviewService {
    cfg: Arc<CoreConfig>,
    lock: Arc<Mutex<()>>,
}

impl ReviewService {
    pub(crate) fn with_lock(cfg: Arc<CoreConfig>, lock: Arc<Mutex<()>>) -> Self {
        Self { cfg, lock }
    }

    /// Loads the review for a sample.
    pub fn get(&self, sample_id: &str) -> LabResult<PathReview> {
        let id = LabUuid::parse(sample_id)?;
        self.load(&id)
    }

    /// Lists reviews, oldest request first. `None` lists every review.
    pub fn list(&self, status: Option<ReviewStatus>) -> Vec<PathReview> {
        let mut reviews: Vec<PathReview> = record_dirs(&self.cfg.samples_dir())
            .into_iter()
            .filter_map(|(_, dir)| {
                let path = dir.join(REVIEW_FILENAME);
                if !path.is_file() {
                    return None;
                }
                match read_yaml::<PathReview>(&path) {
                    Ok(review) => Some(review),
                    Err(e) => {
                        tracing::warn!("failed to read {}: {}", path.display(), e);
                        None
                    }
                }
            })
            .filter(|review| match status {
                Some(wanted) => review.status == wanted,
                None => true,
            })
            .collect();
        reviews.sort_by_key(|review| review.requested_at);
        reviews
    }

    pub fn pending_count(&self) -> usize {
        self.list(Some(ReviewStatus::Pending)).len()
    }

    /// Closes a pending review with the pathologist's comment.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the sample has no review,
    /// - `AlreadyCompleted` if it was closed before,
    /// - `InvalidInput` if the comment is blank,
    /// - storage errors.
    pub fn complete(&self, sample_id: &str, comment: &str, user: &str) -> LabResult<PathReview> {
        let id = LabUuid::parse(sample_id)?;

        let _guard = self.lock.lock().map_err(|_| LabError::LockPoisoned)?;
        let mut review = self.load(&id)?;
        let now = Utc::now();
        review.complete(comment, user, now)?;
        write_yaml(&self.review_path(&id), &review)?;

        let mut sample = load_sample(&self.cfg, &id)?;
        sample
            .events
            .push(OrderEvent::new(OrderEventType::PathReviewCompleted, user, now));
        save_sample(&self.cfg, &sample)?;

        tracing::info!(sample_id = %id, "pathologist review completed");
        Ok(review)
    }

    fn review_path(&self, id: &LabUuid) -> std::path::PathBuf {
        id.sharded_dir(&self.cfg.samples_dir()).join(REVIEW_FILENAME)
    }

    fn load(&self, id: &LabUuid) -> LabResult<PathReview> {
        let path = self.review_path(id);
        if !path.is_file() {
            return Err(LabError::NotFound {
                kind: "review",
                id: id.to_string(),
            });
        }
        read_yaml(&path)
    }
}
