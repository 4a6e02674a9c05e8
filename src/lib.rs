//! Needs-grading queue for Canvas LMS teachers: resolves a teacher's Canvas
//! credential, fetches ungraded assignments, discussions and quizzes across
//! their courses, and orders the merged queue by due date.

pub mod aggregator;
pub mod app;
pub mod canvas;
pub mod config;
pub mod credentials;
pub mod db;
pub mod model;
pub mod normalize;
pub mod refresh;
pub mod sorter;

pub use aggregator::{AggregateError, GradingQueueAggregator};
pub use canvas::{CanvasApi, CanvasClient, FetchError};
pub use credentials::{CredentialResolver, CredentialStore, ResolveError, SessionCache};
pub use model::{AggregationReport, CourseRef, Credential, QueueItem, SortOrder, SourceKind};
pub use refresh::{QueueRefresher, QueueSnapshot, RefreshResult};
pub use sorter::sort_queue;
