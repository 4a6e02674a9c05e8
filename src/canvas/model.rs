//! Raw Canvas REST shapes, decoded leniently. Validation happens during
//! normalization into queue items.
use serde::Deserialize;

use crate::model::CourseRef;

#[derive(Deserialize, Debug, Clone, Default)]
pub struct RawCourse {
    pub id: u64,
    pub name: Option<String>,
    pub course_code: Option<String>,
    pub workflow_state: Option<String>,
}

impl RawCourse {
    pub fn into_course_ref(self) -> CourseRef {
        let name = self.name.unwrap_or_else(|| format!("Course {}", self.id));
        CourseRef {
            id: self.id,
            code: self.course_code.unwrap_or_else(|| name.clone()),
            name,
            workflow_state: self.workflow_state.unwrap_or_else(|| "available".to_string()),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct RawAssignment {
    pub id: u64,
    pub name: Option<String>,
    pub due_at: Option<String>,
    pub points_possible: Option<f64>,
    pub needs_grading_count: Option<i64>,
    pub html_url: Option<String>,
    #[serde(default)]
    pub submission_types: Vec<String>,
}

impl RawAssignment {
    /// Grading happens on the backing discussion topic.
    pub fn is_discussion_backed(&self) -> bool {
        self.submission_types.iter().any(|t| t == "discussion_topic")
    }

    /// Grading happens on the backing quiz.
    pub fn is_quiz_backed(&self) -> bool {
        self.submission_types.iter().any(|t| t == "online_quiz")
    }
}

/// Assignment settings embedded in a graded discussion topic.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct RawTopicAssignment {
    pub due_at: Option<String>,
    pub points_possible: Option<f64>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct RawDiscussionTopic {
    pub id: u64,
    pub title: Option<String>,
    pub assignment_id: Option<u64>,
    pub assignment: Option<RawTopicAssignment>,
    pub html_url: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct RawSubmission {
    pub id: u64,
    pub user_id: Option<u64>,
    pub workflow_state: Option<String>,
}

impl RawSubmission {
    pub fn awaits_grading(&self) -> bool {
        matches!(
            self.workflow_state.as_deref(),
            Some("submitted") | Some("pending_review")
        )
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct RawQuiz {
    pub id: u64,
    pub title: Option<String>,
    pub due_at: Option<String>,
    pub points_possible: Option<f64>,
    pub html_url: Option<String>,
    pub assignment_id: Option<u64>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct RawQuizQuestion {
    pub id: u64,
    pub question_type: Option<String>,
}

/// Question types Canvas cannot score on its own.
pub const MANUAL_QUESTION_TYPES: &[&str] = &["essay_question", "file_upload_question"];

impl RawQuizQuestion {
    pub fn requires_manual_grading(&self) -> bool {
        self.question_type
            .as_deref()
            .map(|t| MANUAL_QUESTION_TYPES.contains(&t))
            .unwrap_or(false)
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct RawQuizSubmission {
    pub id: u64,
    pub workflow_state: Option<String>,
}

impl RawQuizSubmission {
    pub fn awaits_review(&self) -> bool {
        matches!(
            self.workflow_state.as_deref(),
            Some("complete") | Some("pending_review")
        )
    }
}
