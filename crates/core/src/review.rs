//! Pathologist review trigger and review records.
//!
//! The trigger is evaluated exactly once, at finalization, from the frozen set of findings.
//! A positive decision creates one pending [`PathReview`] holding the technologist's
//! rationale; completing it records the pathologist's comment and is one-way.

use crate::constants::MAX_NOTE_LEN;
use crate::{LabError, LabResult};
use chrono::{DateTime, Utc};
use lab_types::NonEmptyText;
use lab_uuid::LabUuid;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Finding name that sends a smear to the pathologist.
pub const PATHOLOGIST_REVIEW_FINDING: &str = "Smear to be reviewed by Pathologist";

/// Returns true iff the review-trigger finding is among `findings`.
///
/// Matching is exact. An empty set never requires review.
pub fn requires_review<I, S>(findings: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    findings
        .into_iter()
        .any(|finding| finding.as_ref() == PATHOLOGIST_REVIEW_FINDING)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    #[default]
    Pending,
    Completed,
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Completed => "completed",
        })
    }
}

impl FromStr for ReviewStatus {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(ReviewStatus::Pending),
            "completed" => Ok(ReviewStatus::Completed),
            other => Err(LabError::InvalidInput(format!(
                "unknown review status '{other}'"
            ))),
        }
    }
}

/// A pathologist review request for one finalized sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathReview {
    pub sample_id: LabUuid,
    pub status: ReviewStatus,
    /// Technologist rationale captured at finalization.
    pub review_for: Option<String>,
    /// Pathologist's final comment.
    pub review: Option<String>,
    pub requested_by: String,
    pub requested_at: DateTime<Utc>,
    pub completed_by: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PathReview {
    /// New pending review. A blank rationale is stored as `None`.
    pub fn pending(
        sample_id: LabUuid,
        review_for: Option<&str>,
        requested_by: &str,
        requested_at: DateTime<Utc>,
    ) -> Self {
        Self {
            sample_id,
            status: ReviewStatus::Pending,
            review_for: review_for
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string),
            review: None,
            requested_by: requested_by.to_string(),
            requested_at,
            completed_by: None,
            completed_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ReviewStatus::Pending
    }

    /// Records the pathologist's comment and closes the review.
    ///
    /// # Errors
    ///
    /// - `AlreadyCompleted` if the review was already closed,
    /// - `InvalidInput` if `comment` is blank or longer than [`MAX_NOTE_LEN`].
    pub fn complete(
        &mut self,
        comment: &str,
        completed_by: &str,
        completed_at: DateTime<Utc>,
    ) -> LabResult<()> {
        if !self.is_pending() {
            return Err(LabError::AlreadyCompleted(self.sample_id.to_string()));
        }
        let comment = NonEmptyText::bounded(comment, MAX_NOTE_LEN)?;

        self.status = ReviewStatus::Completed;
        self.review = Some(comment.into_inner());
        self.completed_by = Some(completed_by.to_string());
        self.completed_at = Some(completed_at);
        Ok(())
    }
}
