//! Collapse the three Canvas shapes of gradable work into `QueueItem`s.
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::canvas::model::{RawAssignment, RawDiscussionTopic, RawQuiz};
use crate::model::{CourseRef, ErrorKind, QueueItem, SourceKind};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{kind} {id}: missing title")]
    MissingTitle { kind: &'static str, id: u64 },
    #[error("{kind} {id}: unparsable due date '{value}'")]
    BadDueDate { kind: &'static str, id: u64, value: String },
    #[error("{kind} {id}: negative needs-grading count {count}")]
    NegativeCount { kind: &'static str, id: u64, count: i64 },
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

/// A graded discussion topic with its ungraded entry count.
#[derive(Debug, Clone)]
pub struct DiscussionWork {
    pub topic: RawDiscussionTopic,
    pub ungraded_entries: u32,
}

/// A quiz that needs manual grading, with its pending submission count.
#[derive(Debug, Clone)]
pub struct QuizWork {
    pub quiz: RawQuiz,
    pub pending_submissions: u32,
}

/// Gradable work of any kind, as fetched for one course.
#[derive(Debug, Clone)]
pub enum GradableSource {
    Assignment(RawAssignment),
    Discussion(DiscussionWork),
    Quiz(QuizWork),
}

pub trait ToQueueItem {
    fn to_queue_item(&self, course: &CourseRef) -> Result<QueueItem, ValidationError>;
}

impl ToQueueItem for GradableSource {
    fn to_queue_item(&self, course: &CourseRef) -> Result<QueueItem, ValidationError> {
        match self {
            GradableSource::Assignment(a) => a.to_queue_item(course),
            GradableSource::Discussion(d) => d.to_queue_item(course),
            GradableSource::Quiz(q) => q.to_queue_item(course),
        }
    }
}

impl ToQueueItem for RawAssignment {
    fn to_queue_item(&self, course: &CourseRef) -> Result<QueueItem, ValidationError> {
        let kind = SourceKind::Assignment;
        let count = self.needs_grading_count.unwrap_or(0);
        if count < 0 {
            return Err(ValidationError::NegativeCount {
                kind: kind.as_str(),
                id: self.id,
                count,
            });
        }
        Ok(QueueItem {
            source_kind: kind,
            source_id: self.id,
            course_id: course.id,
            course_name: course.name.clone(),
            course_code: course.code.clone(),
            title: require_title(kind, self.id, self.name.as_deref())?,
            due_at: parse_due(kind, self.id, self.due_at.as_deref())?,
            points_possible: self.points_possible,
            needs_grading_count: u32::try_from(count).unwrap_or(u32::MAX),
            external_url: self
                .html_url
                .clone()
                .unwrap_or_else(|| format!("/courses/{}/assignments/{}", course.id, self.id)),
        })
    }
}

impl ToQueueItem for DiscussionWork {
    fn to_queue_item(&self, course: &CourseRef) -> Result<QueueItem, ValidationError> {
        let kind = SourceKind::Discussion;
        let topic = &self.topic;
        let settings = topic.assignment.as_ref();
        Ok(QueueItem {
            source_kind: kind,
            source_id: topic.id,
            course_id: course.id,
            course_name: course.name.clone(),
            course_code: course.code.clone(),
            title: require_title(kind, topic.id, topic.title.as_deref())?,
            due_at: parse_due(kind, topic.id, settings.and_then(|s| s.due_at.as_deref()))?,
            points_possible: settings.and_then(|s| s.points_possible),
            needs_grading_count: self.ungraded_entries,
            external_url: topic
                .html_url
                .clone()
                .unwrap_or_else(|| format!("/courses/{}/discussion_topics/{}", course.id, topic.id)),
        })
    }
}

impl ToQueueItem for QuizWork {
    fn to_queue_item(&self, course: &CourseRef) -> Result<QueueItem, ValidationError> {
        let kind = SourceKind::Quiz;
        let quiz = &self.quiz;
        Ok(QueueItem {
            source_kind: kind,
            source_id: quiz.id,
            course_id: course.id,
            course_name: course.name.clone(),
            course_code: course.code.clone(),
            title: require_title(kind, quiz.id, quiz.title.as_deref())?,
            due_at: parse_due(kind, quiz.id, quiz.due_at.as_deref())?,
            points_possible: quiz.points_possible,
            needs_grading_count: self.pending_submissions,
            external_url: quiz
                .html_url
                .clone()
                .unwrap_or_else(|| format!("/courses/{}/quizzes/{}", course.id, quiz.id)),
        })
    }
}

fn require_title(kind: SourceKind, id: u64, title: Option<&str>) -> Result<String, ValidationError> {
    title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or(ValidationError::MissingTitle {
            kind: kind.as_str(),
            id,
        })
}

fn parse_due(kind: SourceKind, id: u64, raw: Option<&str>) -> Result<Option<DateTime<Utc>>, ValidationError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(value) => DateTime::parse_from_rfc3339(value)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|_| ValidationError::BadDueDate {
                kind: kind.as_str(),
                id,
                value: value.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::model::RawTopicAssignment;
    use chrono::TimeZone;

    fn course() -> CourseRef {
        CourseRef {
            id: 10,
            name: "Chemistry".into(),
            code: "CHEM-201".into(),
            workflow_state: "available".into(),
        }
    }

    #[test]
    fn assignment_normalizes() {
        let raw = RawAssignment {
            id: 5,
            name: Some("Titration lab".into()),
            due_at: Some("2025-03-01T23:59:00Z".into()),
            points_possible: Some(20.0),
            needs_grading_count: Some(4),
            html_url: None,
            submission_types: vec!["online_upload".into()],
        };
        let item = GradableSource::Assignment(raw).to_queue_item(&course()).unwrap();
        assert_eq!(item.key(), (SourceKind::Assignment, 5));
        assert_eq!(item.course_code, "CHEM-201");
        assert_eq!(item.needs_grading_count, 4);
        assert_eq!(item.due_at, Some(Utc.with_ymd_and_hms(2025, 3, 1, 23, 59, 0).unwrap()));
        assert_eq!(item.external_url, "/courses/10/assignments/5");
    }

    #[test]
    fn discussion_uses_embedded_assignment_settings() {
        let work = DiscussionWork {
            topic: RawDiscussionTopic {
                id: 8,
                title: Some("Week 3 reflection".into()),
                assignment_id: Some(80),
                assignment: Some(RawTopicAssignment {
                    due_at: Some("2025-01-15T12:00:00-05:00".into()),
                    points_possible: Some(5.0),
                }),
                html_url: Some("https://canvas.example.edu/courses/10/discussion_topics/8".into()),
            },
            ungraded_entries: 2,
        };
        let item = GradableSource::Discussion(work).to_queue_item(&course()).unwrap();
        assert_eq!(item.source_kind, SourceKind::Discussion);
        assert_eq!(item.due_at, Some(Utc.with_ymd_and_hms(2025, 1, 15, 17, 0, 0).unwrap()));
        assert_eq!(item.points_possible, Some(5.0));
        assert_eq!(item.needs_grading_count, 2);
    }

    #[test]
    fn quiz_without_due_date() {
        let work = QuizWork {
            quiz: RawQuiz {
                id: 3,
                title: Some("Essay quiz".into()),
                ..Default::default()
            },
            pending_submissions: 6,
        };
        let item = GradableSource::Quiz(work).to_queue_item(&course()).unwrap();
        assert!(item.due_at.is_none());
        assert_eq!(item.external_url, "/courses/10/quizzes/3");
    }

    #[test]
    fn malformed_inputs_are_rejected() {
        let untitled = RawAssignment {
            id: 1,
            name: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(
            untitled.to_queue_item(&course()).unwrap_err(),
            ValidationError::MissingTitle { kind: "assignment", id: 1 }
        );

        let bad_date = RawAssignment {
            id: 2,
            name: Some("x".into()),
            due_at: Some("next tuesday".into()),
            ..Default::default()
        };
        assert!(matches!(
            bad_date.to_queue_item(&course()),
            Err(ValidationError::BadDueDate { id: 2, .. })
        ));

        let negative = RawAssignment {
            id: 3,
            name: Some("x".into()),
            needs_grading_count: Some(-1),
            ..Default::default()
        };
        let err = negative.to_queue_item(&course()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
