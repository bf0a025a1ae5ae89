use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Number;
use utoipa::ToSchema;

use crate::util::parse_timestamp;

pub mod aggregate;
pub mod planner;

pub const UNTITLED_ASSIGNMENT: &str = "Untitled Assignment";
pub const UNKNOWN_COURSE: &str = "Unknown Course";

fn default_title() -> String {
    UNTITLED_ASSIGNMENT.to_string()
}

fn default_course_name() -> String {
    UNKNOWN_COURSE.to_string()
}

/// Identifier of an assignment in the course system; either a number or a
/// string depending on where it came from. Numbers are kept as sent, integer
/// or not.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AssignmentId {
    Number(Number),
    Text(String),
}

impl Display for AssignmentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AssignmentId::Number(n) => write!(f, "{}", n),
            AssignmentId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for AssignmentId {
    fn from(value: i64) -> Self {
        AssignmentId::Number(value.into())
    }
}

impl From<&str> for AssignmentId {
    fn from(value: &str) -> Self {
        AssignmentId::Text(value.to_string())
    }
}

/// Sanitized deadline record. These four fields are everything that's ever
/// stored about an assignment; anything else a client sends is dropped while
/// deserializing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    #[serde(default = "default_title")]
    pub title: String,
    pub due_date: String,
    #[serde(default = "default_course_name")]
    pub course_name: String,
    #[schema(value_type = String)]
    pub id: AssignmentId,
}

impl Assignment {
    pub fn new(
        title: impl ToString,
        due_date: impl ToString,
        course_name: impl ToString,
        id: impl Into<AssignmentId>,
    ) -> Assignment {
        Assignment {
            title: title.to_string(),
            due_date: due_date.to_string(),
            course_name: course_name.to_string(),
            id: id.into(),
        }
    }

    pub fn due(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.due_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_optional_fields_get_defaults() {
        let a: Assignment =
            serde_json::from_str(r#"{"dueDate": "2024-12-20T23:59:00Z", "id": 12345}"#)
                .expect("valid assignment");

        assert_eq!(a.title, UNTITLED_ASSIGNMENT);
        assert_eq!(a.course_name, UNKNOWN_COURSE);
        assert_eq!(a.id, AssignmentId::from(12345));
    }

    #[test]
    fn extra_fields_are_not_kept() {
        let a: Assignment = serde_json::from_str(
            r#"{
                "title": "Essay",
                "dueDate": "2024-12-22T17:00:00Z",
                "courseName": "English Literature",
                "id": "12346",
                "grade": "A",
                "description": "secret"
            }"#,
        )
        .expect("valid assignment");

        let stored = serde_json::to_value(&a).unwrap();
        let keys: Vec<&String> = stored.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 4);
        assert_eq!(a.id, AssignmentId::Text("12346".to_string()));
    }

    #[test]
    fn due_date_or_id_is_required() {
        assert!(serde_json::from_str::<Assignment>(r#"{"id": 1}"#).is_err());
        assert!(serde_json::from_str::<Assignment>(r#"{"dueDate": "2024-12-20"}"#).is_err());
    }

    #[test]
    fn any_json_number_is_an_id() {
        for raw in ["12.5", "18446744073709551615", "-3"] {
            let a: Assignment =
                serde_json::from_str(&format!(r#"{{"dueDate": "2024-12-20", "id": {}}}"#, raw))
                    .expect("numeric id");
            assert_eq!(a.id.to_string(), raw);
            assert!(matches!(a.id, AssignmentId::Number(_)));
        }
    }
}
