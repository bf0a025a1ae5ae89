//! Raw planner items from the course system and their sanitization.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use utoipa::ToSchema;

use super::{Assignment, AssignmentId, UNKNOWN_COURSE, UNTITLED_ASSIGNMENT};
use crate::error::CoreError;
use crate::util::parse_timestamp;

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct Plannable {
    #[serde(default)]
    pub title: Option<String>,
}

/// A planner item as returned by the course API. Only the fields needed to
/// build an [`Assignment`] are read; grades, descriptions and submission data
/// never make it past deserialization.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct PlannerItem {
    #[serde(default)]
    pub plannable_type: Option<String>,
    #[serde(default)]
    pub plannable_date: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub plannable_id: Option<AssignmentId>,
    #[serde(default)]
    pub plannable: Option<Plannable>,
    #[serde(default)]
    pub context_name: Option<String>,
}

impl PlannerItem {
    fn is_assignment(&self) -> bool {
        self.plannable_type.as_deref() == Some("assignment")
    }

    pub fn sanitize(self) -> Option<Assignment> {
        if !self.is_assignment() {
            return None;
        }

        let due_date = self.plannable_date.filter(|it| !it.is_empty())?;
        let id = match self.plannable_id {
            Some(id) => id,
            None => {
                tracing::debug!("dropping planner item without id due {}", due_date);
                return None;
            }
        };

        let title = self
            .plannable
            .and_then(|p| p.title)
            .filter(|it| !it.is_empty())
            .unwrap_or_else(|| UNTITLED_ASSIGNMENT.to_string());
        let course_name = self
            .context_name
            .filter(|it| !it.is_empty())
            .unwrap_or_else(|| UNKNOWN_COURSE.to_string());

        Some(Assignment {
            title,
            due_date,
            course_name,
            id,
        })
    }
}

/// Keeps dated assignments and strips them down to the stored shape.
pub fn sanitize(items: impl IntoIterator<Item = PlannerItem>) -> Vec<Assignment> {
    items.into_iter().filter_map(PlannerItem::sanitize).collect()
}

/// Date range planner items are requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PlannerWindow {
    pub fn starting_now(days: i64) -> PlannerWindow {
        let start = Utc::now();
        PlannerWindow {
            start,
            end: start + Duration::days(days),
        }
    }

    /// Whether the item is dated inside the window. Items whose date is
    /// missing or unreadable are left for sanitization to judge.
    pub fn contains(&self, item: &PlannerItem) -> bool {
        match item.plannable_date.as_deref().and_then(parse_timestamp) {
            Some(date) => self.start <= date && date <= self.end,
            None => true,
        }
    }
}

/// Course API client. Implemented outside this crate; tests use canned items.
#[rocket::async_trait]
pub trait PlannerSource: Send + Sync {
    async fn planner_items(&self, window: PlannerWindow) -> Result<Vec<PlannerItem>, CoreError>;
}
