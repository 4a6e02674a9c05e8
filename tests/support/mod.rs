#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use canvas_grading_queue::canvas::model::{
    RawAssignment, RawCourse, RawDiscussionTopic, RawQuiz, RawQuizQuestion, RawQuizSubmission,
    RawSubmission,
};
use canvas_grading_queue::canvas::{CanvasApi, FetchError};
use canvas_grading_queue::credentials::{CredentialResolver, CredentialStore, SessionCache, StoredProfile};
use canvas_grading_queue::model::{CourseRef, Credential};
use canvas_grading_queue::GradingQueueAggregator;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Transient,
    Auth,
    NotFound,
}

impl Failure {
    fn error(self, path: &str) -> FetchError {
        match self {
            Failure::Transient => FetchError::Network("connection reset by peer".into()),
            Failure::Auth => FetchError::Auth { status: 401 },
            Failure::NotFound => FetchError::NotFound { path: path.to_string() },
        }
    }
}

/// In-memory Canvas double that records every call.
#[derive(Default)]
pub struct FakeCanvas {
    pub courses: Vec<RawCourse>,
    pub assignments: HashMap<u64, Vec<RawAssignment>>,
    pub topics: HashMap<u64, Vec<RawDiscussionTopic>>,
    pub submissions: HashMap<u64, Vec<RawSubmission>>,
    pub quizzes: HashMap<u64, Vec<RawQuiz>>,
    pub questions: HashMap<u64, Vec<RawQuizQuestion>>,
    pub quiz_submissions: HashMap<u64, Vec<RawQuizSubmission>>,
    pub broken_courses: HashMap<u64, Failure>,
    pub broken_quizzes: HashMap<u64, Failure>,
    /// `(course_id, "discussion_topics" | "quizzes")` lists answering 404.
    pub missing_lists: HashSet<(u64, &'static str)>,
    /// Delay applied to `list_assignments`, keyed by course.
    pub slow_courses: HashMap<u64, Duration>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl FakeCanvas {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push((call, Instant::now()));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn call_times(&self, prefix: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c.starts_with(prefix))
            .map(|(_, t)| *t)
            .collect()
    }

    fn check_list(&self, course_id: u64, list: &'static str, path: &str) -> Result<(), FetchError> {
        if self.missing_lists.contains(&(course_id, list)) {
            return Err(Failure::NotFound.error(path));
        }
        self.check_course(course_id, path)
    }

    fn check_course(&self, course_id: u64, path: &str) -> Result<(), FetchError> {
        match self.broken_courses.get(&course_id) {
            Some(f) => Err(f.error(path)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CanvasApi for FakeCanvas {
    async fn list_courses(&self, _credential: &Credential) -> Result<Vec<RawCourse>, FetchError> {
        self.record("courses".into());
        Ok(self.courses.clone())
    }

    async fn list_assignments(&self, _credential: &Credential, course_id: u64) -> Result<Vec<RawAssignment>, FetchError> {
        let path = format!("courses/{}/assignments", course_id);
        self.record(path.clone());
        if let Some(delay) = self.slow_courses.get(&course_id) {
            tokio::time::sleep(*delay).await;
        }
        self.check_course(course_id, &path)?;
        Ok(self.assignments.get(&course_id).cloned().unwrap_or_default())
    }

    async fn list_discussion_topics(
        &self,
        _credential: &Credential,
        course_id: u64,
    ) -> Result<Vec<RawDiscussionTopic>, FetchError> {
        let path = format!("courses/{}/discussion_topics", course_id);
        self.record(path.clone());
        self.check_list(course_id, "discussion_topics", &path)?;
        Ok(self.topics.get(&course_id).cloned().unwrap_or_default())
    }

    async fn list_assignment_submissions(
        &self,
        _credential: &Credential,
        course_id: u64,
        assignment_id: u64,
    ) -> Result<Vec<RawSubmission>, FetchError> {
        let path = format!("courses/{}/assignments/{}/submissions", course_id, assignment_id);
        self.record(path.clone());
        self.check_course(course_id, &path)?;
        Ok(self.submissions.get(&assignment_id).cloned().unwrap_or_default())
    }

    async fn list_quizzes(&self, _credential: &Credential, course_id: u64) -> Result<Vec<RawQuiz>, FetchError> {
        let path = format!("courses/{}/quizzes", course_id);
        self.record(path.clone());
        self.check_list(course_id, "quizzes", &path)?;
        Ok(self.quizzes.get(&course_id).cloned().unwrap_or_default())
    }

    async fn list_quiz_questions(
        &self,
        _credential: &Credential,
        course_id: u64,
        quiz_id: u64,
    ) -> Result<Vec<RawQuizQuestion>, FetchError> {
        let path = format!("quiz_questions/{}", quiz_id);
        self.record(path.clone());
        self.check_course(course_id, &path)?;
        if let Some(f) = self.broken_quizzes.get(&quiz_id) {
            return Err(f.error(&path));
        }
        Ok(self.questions.get(&quiz_id).cloned().unwrap_or_default())
    }

    async fn list_quiz_submissions(
        &self,
        _credential: &Credential,
        course_id: u64,
        quiz_id: u64,
    ) -> Result<Vec<RawQuizSubmission>, FetchError> {
        let path = format!("quiz_submissions/{}", quiz_id);
        self.record(path.clone());
        self.check_course(course_id, &path)?;
        Ok(self.quiz_submissions.get(&quiz_id).cloned().unwrap_or_default())
    }
}

/// Profile store holding at most one profile for every user.
#[derive(Default)]
pub struct StaticStore {
    pub profile: Option<StoredProfile>,
    loads: AtomicUsize,
}

impl StaticStore {
    pub fn with_profile(profile: StoredProfile) -> Self {
        Self {
            profile: Some(profile),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn connected() -> Self {
        Self::with_profile(StoredProfile {
            canvas_base_url: Some("https://canvas.example.edu".into()),
            canvas_access_token: Some("token".into()),
        })
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialStore for StaticStore {
    async fn load_profile(&self, _user_id: &str) -> Result<Option<StoredProfile>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.profile.clone())
    }
}

pub fn aggregator(canvas: Arc<FakeCanvas>, store: Arc<StaticStore>) -> GradingQueueAggregator {
    let cache = Arc::new(SessionCache::new(Duration::from_secs(300)));
    let resolver = Arc::new(CredentialResolver::new(store, cache));
    GradingQueueAggregator::new(canvas, resolver, Duration::from_millis(100))
}

pub fn course(id: u64) -> CourseRef {
    CourseRef {
        id,
        name: format!("Course {}", id),
        code: format!("C-{}", id),
        workflow_state: "available".into(),
    }
}

pub fn assignment(id: u64, due: Option<&str>, needs_grading: i64) -> RawAssignment {
    RawAssignment {
        id,
        name: Some(format!("Assignment {}", id)),
        due_at: due.map(str::to_string),
        points_possible: Some(10.0),
        needs_grading_count: Some(needs_grading),
        submission_types: vec!["online_upload".into()],
        ..Default::default()
    }
}

pub fn quiz(id: u64) -> RawQuiz {
    RawQuiz {
        id,
        title: Some(format!("Quiz {}", id)),
        ..Default::default()
    }
}

pub fn question(id: u64, kind: &str) -> RawQuizQuestion {
    RawQuizQuestion {
        id,
        question_type: Some(kind.to_string()),
    }
}

pub fn quiz_submission(id: u64, state: &str) -> RawQuizSubmission {
    RawQuizSubmission {
        id,
        workflow_state: Some(state.to_string()),
    }
}

pub fn submission(id: u64, state: &str) -> RawSubmission {
    RawSubmission {
        id,
        user_id: Some(id),
        workflow_state: Some(state.to_string()),
    }
}
