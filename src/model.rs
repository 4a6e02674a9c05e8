use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Canvas instance location and token for one teacher.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub base_url: String,
    pub access_token: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Assignment,
    Discussion,
    Quiz,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Assignment => "assignment",
            SourceKind::Discussion => "discussion",
            SourceKind::Quiz => "quiz",
        }
    }
}

/// One entry of the needs-grading queue. Rebuilt on every refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueItem {
    pub source_kind: SourceKind,
    pub source_id: u64,
    pub course_id: u64,
    pub course_name: String,
    pub course_code: String,
    pub title: String,
    pub due_at: Option<DateTime<Utc>>,
    pub points_possible: Option<f64>,
    pub needs_grading_count: u32,
    pub external_url: String,
}

impl QueueItem {
    pub fn key(&self) -> (SourceKind, u64) {
        (self.source_kind, self.source_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CourseRef {
    pub id: u64,
    pub name: String,
    pub code: String,
    pub workflow_state: String,
}

/// Failure classes surfaced to callers alongside partial results.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingCredential,
    Auth,
    NotFound,
    Transient,
    Validation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MissingCredential => "missing_credential",
            ErrorKind::Auth => "auth",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Transient => "transient",
            ErrorKind::Validation => "validation",
        }
    }
}

/// Result of fetching one course during an aggregation pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FetchOutcome {
    pub course_id: u64,
    pub succeeded: bool,
    pub items: Vec<QueueItem>,
    pub error_kind: Option<ErrorKind>,
}

impl FetchOutcome {
    pub fn success(course_id: u64, items: Vec<QueueItem>) -> Self {
        Self {
            course_id,
            succeeded: true,
            items,
            error_kind: None,
        }
    }

    pub fn failure(course_id: u64, kind: ErrorKind) -> Self {
        Self {
            course_id,
            succeeded: false,
            items: Vec::new(),
            error_kind: Some(kind),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    OldestFirst,
    NewestFirst,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "oldest" | "oldest_first" | "oldest-first" => Ok(SortOrder::OldestFirst),
            "newest" | "newest_first" | "newest-first" => Ok(SortOrder::NewestFirst),
            other => Err(format!("unknown sort order '{}'", other)),
        }
    }
}

/// What the presentation layer should show for a finished pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshStatus {
    Complete,
    Partial { failed: usize },
    AllFailed,
    ReconnectRequired,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSummary {
    pub total_items: usize,
    pub total_needs_grading: u64,
    pub by_kind: BTreeMap<SourceKind, u64>,
}

/// Merged queue plus the per-course outcomes it was built from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationReport {
    pub items: Vec<QueueItem>,
    pub outcomes: Vec<FetchOutcome>,
}

impl AggregationReport {
    pub fn failed_courses(&self) -> Vec<(u64, ErrorKind)> {
        self.outcomes
            .iter()
            .filter(|o| !o.succeeded)
            .map(|o| (o.course_id, o.error_kind.unwrap_or(ErrorKind::Transient)))
            .collect()
    }

    pub fn status(&self) -> RefreshStatus {
        let failed = self.failed_courses();
        if failed.is_empty() {
            return RefreshStatus::Complete;
        }
        if failed.iter().any(|(_, kind)| *kind == ErrorKind::Auth) {
            return RefreshStatus::ReconnectRequired;
        }
        if failed.len() == self.outcomes.len() {
            RefreshStatus::AllFailed
        } else {
            RefreshStatus::Partial {
                failed: failed.len(),
            }
        }
    }

    pub fn summary(&self) -> QueueSummary {
        let mut summary = QueueSummary {
            total_items: self.items.len(),
            ..Default::default()
        };
        for item in &self.items {
            let count = item.needs_grading_count as u64;
            summary.total_needs_grading += count;
            *summary.by_kind.entry(item.source_kind).or_default() += count;
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(kind: SourceKind, id: u64, count: u32) -> QueueItem {
        QueueItem {
            source_kind: kind,
            source_id: id,
            course_id: 1,
            course_name: "Biology".into(),
            course_code: "BIO-101".into(),
            title: format!("item {}", id),
            due_at: None,
            points_possible: None,
            needs_grading_count: count,
            external_url: String::new(),
        }
    }

    #[test]
    fn sort_order_parses_aliases() {
        assert_eq!("oldest".parse::<SortOrder>(), Ok(SortOrder::OldestFirst));
        assert_eq!("Newest-First".parse::<SortOrder>(), Ok(SortOrder::NewestFirst));
        assert!("sideways".parse::<SortOrder>().is_err());
    }

    #[test]
    fn credential_debug_hides_token() {
        let cred = Credential {
            base_url: "https://canvas.example.edu".into(),
            access_token: "secret-token".into(),
        };
        let printed = format!("{:?}", cred);
        assert!(printed.contains("canvas.example.edu"));
        assert!(!printed.contains("secret-token"));
    }

    #[test]
    fn status_reflects_failures() {
        let mut report = AggregationReport {
            items: vec![],
            outcomes: vec![FetchOutcome::success(1, vec![])],
        };
        assert_eq!(report.status(), RefreshStatus::Complete);

        report.outcomes.push(FetchOutcome::failure(2, ErrorKind::Transient));
        assert_eq!(report.status(), RefreshStatus::Partial { failed: 1 });

        report.outcomes[0] = FetchOutcome::failure(1, ErrorKind::NotFound);
        assert_eq!(report.status(), RefreshStatus::AllFailed);

        report.outcomes[0] = FetchOutcome::failure(1, ErrorKind::Auth);
        assert_eq!(report.status(), RefreshStatus::ReconnectRequired);
    }

    #[test]
    fn summary_counts_by_kind() {
        let report = AggregationReport {
            items: vec![
                item(SourceKind::Assignment, 1, 3),
                item(SourceKind::Quiz, 2, 2),
                item(SourceKind::Assignment, 3, 1),
            ],
            outcomes: vec![],
        };
        let summary = report.summary();
        assert_eq!(summary.total_items, 3);
        assert_eq!(summary.total_needs_grading, 6);
        assert_eq!(summary.by_kind[&SourceKind::Assignment], 4);
        assert_eq!(summary.by_kind[&SourceKind::Quiz], 2);
        assert!(!summary.by_kind.contains_key(&SourceKind::Discussion));
    }
}
