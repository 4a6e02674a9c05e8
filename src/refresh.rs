//! Last-refresh-wins coordination around the aggregator.
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::aggregator::{AggregateError, GradingQueueAggregator};
use crate::model::{AggregationReport, CourseRef, QueueItem, SortOrder};
use crate::sorter::sort_queue;

/// A published aggregation result.
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub run_id: Uuid,
    pub generation: u64,
    pub refreshed_at: DateTime<Utc>,
    pub report: AggregationReport,
}

impl QueueSnapshot {
    pub fn sorted(&self, order: SortOrder) -> Vec<QueueItem> {
        sort_queue(self.report.items.clone(), order)
    }
}

#[derive(Debug, Clone)]
pub enum RefreshResult {
    Published(QueueSnapshot),
    /// A newer refresh started before this one finished; its result was dropped.
    Superseded,
}

#[derive(Default)]
struct RefreshState {
    generation: u64,
    in_flight: Option<AbortHandle>,
    latest: Option<QueueSnapshot>,
}

pub struct QueueRefresher {
    aggregator: Arc<GradingQueueAggregator>,
    state: Mutex<RefreshState>,
}

impl QueueRefresher {
    pub fn new(aggregator: Arc<GradingQueueAggregator>) -> Self {
        Self {
            aggregator,
            state: Mutex::new(RefreshState::default()),
        }
    }

    /// Start a new aggregation, cancelling any in-flight one. Only the most
    /// recently started refresh may publish.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn refresh(&self, user_id: &str, courses: Vec<CourseRef>) -> Result<RefreshResult, AggregateError> {
        let (generation, handle) = {
            let mut state = self.state.lock().await;
            state.generation += 1;
            if let Some(previous) = state.in_flight.take() {
                previous.abort();
                debug!(generation = state.generation, "cancelled in-flight refresh");
            }
            let aggregator = self.aggregator.clone();
            let user_id = user_id.to_string();
            let handle = tokio::spawn(async move { aggregator.aggregate(&user_id, &courses).await });
            state.in_flight = Some(handle.abort_handle());
            (state.generation, handle)
        };

        let result = match handle.await {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => return Ok(RefreshResult::Superseded),
            Err(err) => std::panic::resume_unwind(err.into_panic()),
        };

        let mut state = self.state.lock().await;
        if state.generation != generation {
            debug!(generation, current = state.generation, "discarding stale refresh result");
            return Ok(RefreshResult::Superseded);
        }
        state.in_flight = None;

        let report = result?;
        let snapshot = QueueSnapshot {
            run_id: Uuid::new_v4(),
            generation,
            refreshed_at: Utc::now(),
            report,
        };
        info!(
            run_id = %snapshot.run_id,
            generation,
            items = snapshot.report.items.len(),
            "queue refreshed"
        );
        state.latest = Some(snapshot.clone());
        Ok(RefreshResult::Published(snapshot))
    }

    pub async fn snapshot(&self) -> Option<QueueSnapshot> {
        self.state.lock().await.latest.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::retry::RetryPolicy;
    use crate::canvas::CanvasClient;
    use crate::credentials::{CredentialResolver, CredentialStore, SessionCache, StoredProfile};
    use async_trait::async_trait;
    use std::time::Duration;

    struct SlowStore;

    #[async_trait]
    impl CredentialStore for SlowStore {
        async fn load_profile(&self, _user_id: &str) -> anyhow::Result<Option<StoredProfile>> {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(Some(StoredProfile {
                canvas_base_url: Some("https://canvas.example.edu".into()),
                canvas_access_token: Some("tok".into()),
            }))
        }
    }

    fn refresher() -> Arc<QueueRefresher> {
        let canvas = Arc::new(CanvasClient::new(Duration::from_secs(5), RetryPolicy::default()).unwrap());
        let cache = Arc::new(SessionCache::new(Duration::from_secs(300)));
        let resolver = Arc::new(CredentialResolver::new(Arc::new(SlowStore), cache));
        let aggregator = GradingQueueAggregator::new(canvas, resolver, Duration::ZERO);
        Arc::new(QueueRefresher::new(Arc::new(aggregator)))
    }

    #[tokio::test(start_paused = true)]
    async fn completed_run_is_dropped_after_generation_moves_on() {
        let refresher = refresher();
        let first = {
            let refresher = refresher.clone();
            tokio::spawn(async move { refresher.refresh("u1", Vec::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        // A newer refresh took over, but its abort came too late to stop the
        // older task, which runs to completion.
        {
            let mut state = refresher.state.lock().await;
            state.generation += 1;
            state.in_flight = None;
        }

        let result = first.await.unwrap().unwrap();
        assert!(matches!(result, RefreshResult::Superseded));
        assert!(refresher.snapshot().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn published_snapshot_is_kept() {
        let refresher = refresher();
        let RefreshResult::Published(snapshot) = refresher.refresh("u1", Vec::new()).await.unwrap() else {
            panic!("an uncontested refresh must publish");
        };
        assert_eq!(snapshot.generation, 1);
        assert_eq!(refresher.snapshot().await.unwrap().run_id, snapshot.run_id);
    }
}
