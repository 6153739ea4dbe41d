use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// How far ahead of `created_at` the advisory completion estimate is set.
/// Display-only; the processor never schedules against it.
pub const ESTIMATED_COMPLETION_SECS: i64 = 60;

/// Status of a styling job in the queue.
///
/// Transitions are monotonic: `Pending -> Processing -> {Completed | Failed}`.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// A styling job as persisted in the `jobs` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StyleJob {
    pub id: Uuid,
    pub user_id: String,
    pub style_id: String,
    pub style_name: String,
    pub input_image_url: String,
    pub input_image2_url: Option<String>,
    pub prompt: String,
    pub status: JobStatus,
    pub result_image_url: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_completion: DateTime<Utc>,
}

impl StyleJob {
    /// Input image URLs in the order they are handed to the model.
    pub fn input_urls(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.input_image_url.as_str()).chain(self.input_image2_url.as_deref())
    }
}

/// Fields supplied by the caller when a job is enqueued.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub user_id: String,
    pub style_id: String,
    pub style_name: String,
    pub prompt: String,
    pub input_image_url: String,
    pub input_image2_url: Option<String>,
}

impl NewJob {
    /// Build the pending row for this request, stamped at `now`.
    pub fn into_pending(self, id: Uuid, now: DateTime<Utc>) -> StyleJob {
        StyleJob {
            id,
            user_id: self.user_id,
            style_id: self.style_id,
            style_name: self.style_name,
            input_image_url: self.input_image_url,
            input_image2_url: self.input_image2_url,
            prompt: self.prompt,
            status: JobStatus::Pending,
            result_image_url: None,
            error_message: None,
            created_at: now,
            completed_at: None,
            estimated_completion: now + Duration::seconds(ESTIMATED_COMPLETION_SECS),
        }
    }
}
