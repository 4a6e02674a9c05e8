use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, LINK, RETRY_AFTER};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::model::Credential;

pub mod error;
pub mod model;
pub mod retry;

pub use error::FetchError;
use model::{
    RawAssignment, RawCourse, RawDiscussionTopic, RawQuiz, RawQuizQuestion, RawQuizSubmission,
    RawSubmission,
};
use retry::{with_retry, RetryPolicy};

const DEFAULT_API_PREFIX: &str = "api/v1";

static LINK_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*<([^>]+)>\s*;(.*)$"#).expect("valid link regex"));
static REL_NEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"rel\s*=\s*"?next"?(\s|;|$)"#).expect("valid rel regex"));

/// Query parameter for a Canvas request. `Many` is sent as repeated
/// `key[]=value` pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    One(&'static str, String),
    Many(&'static str, Vec<String>),
}

impl Param {
    pub fn one(key: &'static str, value: impl ToString) -> Self {
        Param::One(key, value.to_string())
    }

    pub fn many<I, S>(key: &'static str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        Param::Many(key, values.into_iter().map(|v| v.to_string()).collect())
    }
}

#[derive(Clone)]
pub struct CanvasClient {
    http: Client,
    api_prefix: String,
    retry: RetryPolicy,
    max_pages: u32,
    per_page: u32,
}

impl fmt::Debug for CanvasClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanvasClient")
            .field("api_prefix", &self.api_prefix)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

struct Page {
    body: Value,
    next: Option<Url>,
}

impl CanvasClient {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("canvas-grading-queue/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .no_proxy()
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            http,
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            retry,
            max_pages: 20,
            per_page: 100,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let mut client = Self::new(cfg.request_timeout(), cfg.retry_policy())?;
        client.api_prefix = cfg.canvas.api_prefix.trim_matches('/').to_string();
        client.max_pages = cfg.canvas.max_pages;
        client.per_page = cfg.canvas.per_page;
        Ok(client)
    }

    /// Join `base_url`, the versioned API prefix and `path`, then append params.
    pub fn build_url(&self, credential: &Credential, path: &str, params: &[Param]) -> Result<Url, FetchError> {
        let base = format!("{}/", credential.base_url.trim_end_matches('/'));
        let base = Url::parse(&base)
            .map_err(|e| FetchError::InvalidRequest(format!("bad base url {}: {}", base, e)))?;
        let mut url = base
            .join(&format!("{}/{}", self.api_prefix, path.trim_start_matches('/')))
            .map_err(|e| FetchError::InvalidRequest(format!("bad path {}: {}", path, e)))?;

        if !params.is_empty() {
            let mut query = url.query_pairs_mut();
            for param in params {
                match param {
                    Param::One(key, value) => {
                        query.append_pair(key, value);
                    }
                    Param::Many(key, values) => {
                        let key = format!("{}[]", key);
                        for value in values {
                            query.append_pair(&key, value);
                        }
                    }
                }
            }
        }
        Ok(url)
    }

    pub fn build_request(&self, credential: &Credential, url: Url) -> Result<reqwest::Request, FetchError> {
        self.http
            .get(url)
            .header("Authorization", format!("Bearer {}", credential.access_token))
            .header("Accept", "application/json")
            .build()
            .map_err(FetchError::from_reqwest)
    }

    /// Single GET returning the decoded JSON body, with retry on transient errors.
    #[instrument(skip_all, fields(path = %path))]
    pub async fn request(&self, credential: &Credential, path: &str, params: &[Param]) -> Result<Value, FetchError> {
        let url = self.build_url(credential, path, params)?;
        let page = self.get_with_retry(credential, url).await?;
        Ok(page.body)
    }

    /// GET following `rel="next"` links, concatenating array bodies. When
    /// `envelope` is set the array is read from that field of each page.
    #[instrument(skip_all, fields(path = %path))]
    pub async fn request_paginated(
        &self,
        credential: &Credential,
        path: &str,
        params: &[Param],
        envelope: Option<&str>,
    ) -> Result<Vec<Value>, FetchError> {
        let mut params = params.to_vec();
        params.push(Param::one("per_page", self.per_page));
        let mut url = self.build_url(credential, path, &params)?;
        let mut out = Vec::new();

        for page_no in 1..=self.max_pages {
            let page = self.get_with_retry(credential, url.clone()).await?;
            let body = match envelope {
                Some(field) => match page.body {
                    Value::Object(mut map) => map.remove(field).unwrap_or(Value::Null),
                    _ => Value::Null,
                },
                None => page.body,
            };
            match body {
                Value::Array(items) => out.extend(items),
                other => {
                    return Err(FetchError::Decode(format!(
                        "expected a JSON array from {}, got {}",
                        path,
                        json_type(&other)
                    )))
                }
            }

            match page.next {
                Some(next) if next.origin() == url.origin() => url = next,
                Some(next) => {
                    warn!(next=%next, "ignoring pagination link to a different origin");
                    return Ok(out);
                }
                None => return Ok(out),
            }
            debug!(page_no, "following canvas pagination link");
        }

        warn!(max_pages = self.max_pages, "pagination truncated");
        Ok(out)
    }

    async fn get_with_retry(&self, credential: &Credential, url: Url) -> Result<Page, FetchError> {
        let what = url.path().to_string();
        with_retry(&self.retry, &what, |attempt| {
            let url = url.clone();
            async move { self.get_once(credential, url, attempt).await }
        })
        .await
    }

    async fn get_once(&self, credential: &Credential, url: Url, attempt: u32) -> Result<Page, FetchError> {
        let path = url.path().to_string();
        let request = self.build_request(credential, url)?;
        debug!(url=%request.url(), attempt, "sending canvas request");

        let res = self
            .http
            .execute(request)
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = res.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(res.headers());
            let body = res.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), body=%body, "canvas returned an error status");
            return Err(FetchError::from_status(status.as_u16(), &path, body, retry_after));
        }

        let next = next_link(res.headers());
        let bytes = res.bytes().await.map_err(FetchError::from_reqwest)?;
        let body = serde_json::from_slice(&bytes)
            .map_err(|e| FetchError::Decode(format!("{}: {}", path, e)))?;
        Ok(Page { body, next })
    }

    async fn list<T: DeserializeOwned>(
        &self,
        credential: &Credential,
        path: &str,
        params: &[Param],
        envelope: Option<&str>,
    ) -> Result<Vec<T>, FetchError> {
        let values = self.request_paginated(credential, path, params, envelope).await?;
        Ok(decode_each(values, path))
    }
}

/// Decode each element on its own; malformed elements are logged and dropped.
pub fn decode_each<T: DeserializeOwned>(values: Vec<Value>, what: &str) -> Vec<T> {
    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<T>(value) {
            Ok(item) => Some(item),
            Err(err) => {
                warn!(what, error=%err, "skipping malformed canvas record");
                None
            }
        })
        .collect()
}

/// Extract the `rel="next"` target from a `Link` header.
pub fn next_link(headers: &HeaderMap) -> Option<Url> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|entry| LINK_ENTRY.captures(entry))
        .find(|caps| REL_NEXT.is_match(&caps[2]))
        .and_then(|caps| Url::parse(&caps[1]).ok())
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Typed read surface of the Canvas API used by the aggregator.
#[async_trait]
pub trait CanvasApi: Send + Sync {
    async fn list_courses(&self, credential: &Credential) -> Result<Vec<RawCourse>, FetchError>;

    async fn list_assignments(&self, credential: &Credential, course_id: u64) -> Result<Vec<RawAssignment>, FetchError>;

    async fn list_discussion_topics(
        &self,
        credential: &Credential,
        course_id: u64,
    ) -> Result<Vec<RawDiscussionTopic>, FetchError>;

    async fn list_assignment_submissions(
        &self,
        credential: &Credential,
        course_id: u64,
        assignment_id: u64,
    ) -> Result<Vec<RawSubmission>, FetchError>;

    async fn list_quizzes(&self, credential: &Credential, course_id: u64) -> Result<Vec<RawQuiz>, FetchError>;

    async fn list_quiz_questions(
        &self,
        credential: &Credential,
        course_id: u64,
        quiz_id: u64,
    ) -> Result<Vec<RawQuizQuestion>, FetchError>;

    async fn list_quiz_submissions(
        &self,
        credential: &Credential,
        course_id: u64,
        quiz_id: u64,
    ) -> Result<Vec<RawQuizSubmission>, FetchError>;
}

#[async_trait]
impl CanvasApi for CanvasClient {
    async fn list_courses(&self, credential: &Credential) -> Result<Vec<RawCourse>, FetchError> {
        let params = [
            Param::one("enrollment_type", "teacher"),
            Param::many("state", ["available", "unpublished"]),
        ];
        self.list(credential, "courses", &params, None).await
    }

    async fn list_assignments(&self, credential: &Credential, course_id: u64) -> Result<Vec<RawAssignment>, FetchError> {
        let params = [Param::one("order_by", "due_at")];
        self.list(credential, &format!("courses/{}/assignments", course_id), &params, None)
            .await
    }

    async fn list_discussion_topics(
        &self,
        credential: &Credential,
        course_id: u64,
    ) -> Result<Vec<RawDiscussionTopic>, FetchError> {
        self.list(credential, &format!("courses/{}/discussion_topics", course_id), &[], None)
            .await
    }

    async fn list_assignment_submissions(
        &self,
        credential: &Credential,
        course_id: u64,
        assignment_id: u64,
    ) -> Result<Vec<RawSubmission>, FetchError> {
        let path = format!("courses/{}/assignments/{}/submissions", course_id, assignment_id);
        self.list(credential, &path, &[], None).await
    }

    async fn list_quizzes(&self, credential: &Credential, course_id: u64) -> Result<Vec<RawQuiz>, FetchError> {
        self.list(credential, &format!("courses/{}/quizzes", course_id), &[], None)
            .await
    }

    async fn list_quiz_questions(
        &self,
        credential: &Credential,
        course_id: u64,
        quiz_id: u64,
    ) -> Result<Vec<RawQuizQuestion>, FetchError> {
        let path = format!("courses/{}/quizzes/{}/questions", course_id, quiz_id);
        self.list(credential, &path, &[], None).await
    }

    async fn list_quiz_submissions(
        &self,
        credential: &Credential,
        course_id: u64,
        quiz_id: u64,
    ) -> Result<Vec<RawQuizSubmission>, FetchError> {
        let path = format!("courses/{}/quizzes/{}/submissions", course_id, quiz_id);
        self.list(credential, &path, &[], Some("quiz_submissions")).await
    }
}
