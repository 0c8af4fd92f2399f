//! `QueuedStory` and its status lifecycle (§3, §4.D).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoryStatus {
    Pending,
    InProgress,
    WaitingReview,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedStory {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub estimated_points: u32,
    pub status: StoryStatus,
    #[serde(default)]
    pub assigned_agent: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub body: String,
}

impl QueuedStory {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        depends_on: Vec<String>,
        estimated_points: u32,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            depends_on,
            estimated_points,
            status: StoryStatus::Pending,
            assigned_agent: None,
            started_at: None,
            completed_at: None,
            last_updated: Utc::now(),
            body: body.into(),
        }
    }
}
