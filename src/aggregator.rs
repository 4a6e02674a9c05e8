//! Fan out over a teacher's courses and merge everything awaiting grading
//! into one queue.
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::canvas::model::RawQuizQuestion;
use crate::canvas::retry::Pacer;
use crate::canvas::{CanvasApi, FetchError};
use crate::credentials::{CredentialResolver, ResolveError};
use crate::model::{AggregationReport, CourseRef, Credential, ErrorKind, FetchOutcome, QueueItem};
use crate::normalize::{DiscussionWork, GradableSource, QuizWork, ToQueueItem};

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error(transparent)]
    Credential(#[from] ResolveError),
}

impl AggregateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AggregateError::Credential(err) => err.kind(),
        }
    }
}

pub struct GradingQueueAggregator {
    api: Arc<dyn CanvasApi>,
    resolver: Arc<CredentialResolver>,
    pacing: Duration,
}

impl GradingQueueAggregator {
    pub fn new(api: Arc<dyn CanvasApi>, resolver: Arc<CredentialResolver>, pacing: Duration) -> Self {
        Self { api, resolver, pacing }
    }

    /// Build the needs-grading queue for `courses`. Only a credential
    /// failure aborts; per-course failures are reported in the outcomes.
    #[instrument(skip_all, fields(user_id = %user_id, courses = courses.len()))]
    pub async fn aggregate(&self, user_id: &str, courses: &[CourseRef]) -> Result<AggregationReport, AggregateError> {
        let credential = self.resolver.resolve(user_id).await?;

        let outcomes = join_all(courses.iter().map(|course| self.fetch_course(&credential, course))).await;

        if outcomes.iter().any(|o| o.error_kind == Some(ErrorKind::Auth)) {
            self.resolver.invalidate(user_id).await;
        }

        let mut seen = HashSet::new();
        let mut items = Vec::new();
        for outcome in &outcomes {
            for item in &outcome.items {
                if item.needs_grading_count == 0 {
                    continue;
                }
                if seen.insert(item.key()) {
                    items.push(item.clone());
                } else {
                    debug!(kind = item.source_kind.as_str(), id = item.source_id, "duplicate queue item dropped");
                }
            }
        }

        let failed = outcomes.iter().filter(|o| !o.succeeded).count();
        info!(items = items.len(), failed_courses = failed, "aggregation finished");
        Ok(AggregationReport { items, outcomes })
    }

    async fn fetch_course(&self, credential: &Credential, course: &CourseRef) -> FetchOutcome {
        match self.collect_course(credential, course).await {
            Ok(items) => FetchOutcome::success(course.id, items),
            Err(err) => {
                warn!(course_id = course.id, kind = err.kind().as_str(), error = %err, "course refresh failed");
                FetchOutcome::failure(course.id, err.kind())
            }
        }
    }

    async fn collect_course(&self, credential: &Credential, course: &CourseRef) -> Result<Vec<QueueItem>, FetchError> {
        let (assignments, discussions, quizzes) = futures::try_join!(
            self.api.list_assignments(credential, course.id),
            self.discussion_sources(credential, course.id),
            self.quiz_sources(credential, course.id),
        )?;

        // A backing assignment stays in the assignment category unless its own
        // category was fetched, so nothing drops out when that endpoint is missing.
        let (has_discussions, has_quizzes) = (discussions.is_some(), quizzes.is_some());
        let assignments = assignments
            .into_iter()
            .filter(|a| !(has_discussions && a.is_discussion_backed()))
            .filter(|a| !(has_quizzes && a.is_quiz_backed()))
            .map(GradableSource::Assignment);

        let mut items = Vec::new();
        let sources = assignments.chain(discussions.into_iter().flatten()).chain(quizzes.into_iter().flatten());
        for source in sources {
            match source.to_queue_item(course) {
                Ok(item) if item.needs_grading_count > 0 => items.push(item),
                Ok(_) => {}
                Err(err) => warn!(course_id = course.id, error = %err, "skipping malformed canvas item"),
            }
        }
        Ok(items)
    }

    /// `None` when the course does not expose this category.
    async fn discussion_sources(&self, credential: &Credential, course_id: u64) -> Result<Option<Vec<GradableSource>>, FetchError> {
        let topics = match self.api.list_discussion_topics(credential, course_id).await {
            Ok(topics) => topics,
            Err(FetchError::NotFound { .. }) => {
                debug!(course_id, "discussions unavailable for course");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let mut pacer = Pacer::new(self.pacing);
        let mut out = Vec::new();
        for topic in topics {
            let Some(assignment_id) = topic.assignment_id else {
                continue;
            };
            pacer.wait().await;
            let submissions = match self
                .api
                .list_assignment_submissions(credential, course_id, assignment_id)
                .await
            {
                Ok(subs) => subs,
                Err(err @ FetchError::Auth { .. }) => return Err(err),
                Err(err) => {
                    warn!(course_id, topic_id = topic.id, error = %err, "skipping discussion");
                    continue;
                }
            };
            let ungraded_entries = submissions.iter().filter(|s| s.awaits_grading()).count() as u32;
            if ungraded_entries > 0 {
                out.push(GradableSource::Discussion(DiscussionWork {
                    topic,
                    ungraded_entries,
                }));
            }
        }
        Ok(Some(out))
    }

    /// `None` when the course does not expose this category.
    async fn quiz_sources(&self, credential: &Credential, course_id: u64) -> Result<Option<Vec<GradableSource>>, FetchError> {
        let quizzes = match self.api.list_quizzes(credential, course_id).await {
            Ok(quizzes) => quizzes,
            Err(FetchError::NotFound { .. }) => {
                debug!(course_id, "quizzes unavailable for course");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let mut pacer = Pacer::new(self.pacing);
        let mut out = Vec::new();
        for quiz in quizzes {
            pacer.wait().await;
            let questions = match self.api.list_quiz_questions(credential, course_id, quiz.id).await {
                Ok(questions) => questions,
                Err(err @ FetchError::Auth { .. }) => return Err(err),
                Err(err) => {
                    warn!(course_id, quiz_id = quiz.id, error = %err, "skipping quiz");
                    continue;
                }
            };
            if !questions.iter().any(RawQuizQuestion::requires_manual_grading) {
                debug!(course_id, quiz_id = quiz.id, "quiz is fully auto-graded");
                continue;
            }

            pacer.wait().await;
            let submissions = match self.api.list_quiz_submissions(credential, course_id, quiz.id).await {
                Ok(subs) => subs,
                Err(err @ FetchError::Auth { .. }) => return Err(err),
                Err(err) => {
                    warn!(course_id, quiz_id = quiz.id, error = %err, "skipping quiz");
                    continue;
                }
            };
            let pending_submissions = submissions.iter().filter(|s| s.awaits_review()).count() as u32;
            if pending_submissions > 0 {
                out.push(GradableSource::Quiz(QuizWork {
                    quiz,
                    pending_submissions,
                }));
            }
        }
        Ok(Some(out))
    }
}
