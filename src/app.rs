//! Wiring shared by the binaries: profile database, Canvas client and the
//! aggregation stack built from one `Config`.
use anyhow::{Context, Result};
use std::sync::Arc;

use crate::aggregator::GradingQueueAggregator;
use crate::canvas::{CanvasApi, CanvasClient};
use crate::config::Config;
use crate::credentials::{CredentialResolver, SessionCache};
use crate::db;
use crate::model::CourseRef;
use crate::refresh::QueueRefresher;

pub struct App {
    pub pool: db::Pool,
    pub canvas: Arc<CanvasClient>,
    pub resolver: Arc<CredentialResolver>,
    pub refresher: QueueRefresher,
}

impl App {
    pub async fn from_config(cfg: &Config) -> Result<Self> {
        cfg.ensure_dirs()?;
        let pool = db::init_pool(&cfg.database_url()).await?;
        db::run_migrations(&pool).await?;

        let canvas = Arc::new(CanvasClient::from_config(cfg)?);
        let cache = Arc::new(SessionCache::new(cfg.session_ttl()));
        let store = Arc::new(db::SqliteProfileStore::new(pool.clone()));
        let resolver = Arc::new(CredentialResolver::new(store, cache));
        let aggregator = Arc::new(GradingQueueAggregator::new(
            canvas.clone(),
            resolver.clone(),
            cfg.request_pacing(),
        ));

        Ok(Self {
            pool,
            canvas,
            resolver,
            refresher: QueueRefresher::new(aggregator),
        })
    }

    /// Courses the user teaches, as seen through their stored credential.
    pub async fn teacher_courses(&self, user_id: &str) -> Result<Vec<CourseRef>> {
        let credential = self.resolver.resolve(user_id).await?;
        let courses = self
            .canvas
            .list_courses(&credential)
            .await
            .context("failed to list canvas courses")?;
        Ok(courses.into_iter().map(|c| c.into_course_ref()).collect())
    }
}
