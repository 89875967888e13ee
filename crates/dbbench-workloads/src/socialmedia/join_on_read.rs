use async_trait::async_trait;
use chrono::Utc;
use dbbench_core::{BackendKind, CoreResult, Driver};
use dbbench_engine::{WorkerContext, Workload};
use tracing::debug;
use uuid::Uuid;

use super::queries::{self, SocialQueries};
use super::{seed_graph, user_id, DEFAULT_FOLLOWS, DEFAULT_USERS};
use crate::support::{exec_in_tx, pick};

pub const DEFAULT_POSTS: usize = 10_000;

/// Read-side fan-in: each attempt assembles a random user's feed from the
/// posts of everyone they follow. Declares no invariant.
pub struct JoinOnRead {
    queries: Box<dyn SocialQueries>,
    users: usize,
    follows: usize,
    posts: usize,
}

impl JoinOnRead {
    #[must_use]
    pub fn new(backend: BackendKind) -> Self {
        Self {
            queries: queries::for_backend(backend),
            users: DEFAULT_USERS,
            follows: DEFAULT_FOLLOWS,
            posts: DEFAULT_POSTS,
        }
    }

    #[must_use]
    pub fn with_posts(mut self, posts: usize) -> Self {
        self.posts = posts;
        self
    }

    #[must_use]
    pub fn with_users(mut self, users: usize) -> Self {
        self.users = users.max(1);
        self
    }
}

#[async_trait]
impl Workload for JoinOnRead {
    fn name(&self) -> &str {
        "join_on_read"
    }

    async fn setup(&self, driver: &dyn Driver) -> CoreResult<()> {
        let mut statements = seed_graph(self.queries.as_ref(), self.users, self.follows, false);
        let now = Utc::now();
        for i in 0..self.posts {
            statements.push(self.queries.insert_post(
                &Uuid::new_v4().to_string(),
                &user_id(i % self.users),
                "post content",
                now,
            ));
        }
        debug!(users = self.users, posts = self.posts, "Seeding social graph");
        exec_in_tx(driver, statements).await
    }

    async fn attempt(&self, driver: &dyn Driver, _ctx: &WorkerContext) -> CoreResult<()> {
        let reader = user_id(pick(self.users));
        if let Some(joined) = self.queries.followee_posts(&reader) {
            driver.query(&joined).await?;
            return Ok(());
        }

        let followees = driver
            .query(&self.queries.followees_of(&reader))
            .await?
            .iter()
            .map(|row| row.scan_named::<String>("followee_id"))
            .collect::<CoreResult<Vec<_>>>()?;
        driver.query(&self.queries.posts_by(&followees)).await?;
        Ok(())
    }

    async fn teardown(&self, driver: &dyn Driver) -> CoreResult<()> {
        exec_in_tx(driver, self.queries.drop_schema()).await
    }
}
