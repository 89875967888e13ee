use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dbbench_core::{tx_fn, BackendKind, CoreResult, Driver};
use dbbench_engine::{WorkerContext, Workload};
use tracing::warn;
use uuid::Uuid;

use super::queries::{self, SocialQueries};
use super::{seed_graph, user_id, DEFAULT_FOLLOWS, DEFAULT_USERS};
use crate::support::{exec_in_tx, pick};

/// Write amplification: each attempt publishes a post by a random author
/// and, in the same transaction, pushes its id onto every follower's
/// timeline.
///
/// Afterwards every follower's timeline must hold every post of every
/// author they follow.
pub struct FanOutOnWrite {
    queries: Arc<dyn SocialQueries>,
    users: usize,
    follows: usize,
}

impl FanOutOnWrite {
    #[must_use]
    pub fn new(backend: BackendKind) -> Self {
        Self {
            queries: Arc::from(queries::for_backend(backend)),
            users: DEFAULT_USERS,
            follows: DEFAULT_FOLLOWS,
        }
    }

    #[must_use]
    pub fn with_users(mut self, users: usize) -> Self {
        self.users = users.max(1);
        self
    }
}

#[async_trait]
impl Workload for FanOutOnWrite {
    fn name(&self) -> &str {
        "fan_out_on_write"
    }

    async fn setup(&self, driver: &dyn Driver) -> CoreResult<()> {
        let statements = seed_graph(self.queries.as_ref(), self.users, self.follows, true);
        exec_in_tx(driver, statements).await
    }

    async fn attempt(&self, driver: &dyn Driver, _ctx: &WorkerContext) -> CoreResult<()> {
        let author = user_id(pick(self.users));
        let post_id = Uuid::new_v4().to_string();
        let insert = self
            .queries
            .insert_post(&post_id, &author, "post content", Utc::now());
        let followers = self.queries.followers_of(&author);
        let queries = Arc::clone(&self.queries);

        driver
            .execute_tx(tx_fn(move |tx| {
                Box::pin(async move {
                    tx.exec(&insert).await?;
                    for row in tx.query(&followers).await? {
                        let follower: String = row.scan_named("follower_id")?;
                        tx.exec(&queries.append_to_timeline(&follower, &post_id))
                            .await?;
                    }
                    Ok(())
                })
            }))
            .await
    }

    async fn verify(&self, driver: &dyn Driver) -> CoreResult<Option<bool>> {
        let mut posts_by_author: HashMap<String, Vec<String>> = HashMap::new();
        for row in driver.query(&self.queries.list_posts()).await? {
            let post = self.queries.post_ref(&row)?;
            posts_by_author.entry(post.author).or_default().push(post.id);
        }

        let mut timelines: HashMap<String, HashSet<String>> = HashMap::new();
        for row in driver.query(&self.queries.list_timelines()).await? {
            let owner: String = row.scan_named("user_id")?;
            let post_ids: Vec<String> = row.scan_named("post_ids")?;
            timelines.insert(owner, post_ids.into_iter().collect());
        }

        let mut missing = 0_usize;
        for row in driver.query(&self.queries.list_follows()).await? {
            let follower: String = row.scan_named("follower_id")?;
            let followee: String = row.scan_named("followee_id")?;
            let Some(posts) = posts_by_author.get(&followee) else {
                continue;
            };
            let timeline = timelines.get(&follower);
            missing += posts
                .iter()
                .filter(|id| !timeline.is_some_and(|t| t.contains(*id)))
                .count();
        }
        if missing > 0 {
            warn!(missing, "Timelines are missing fanned-out posts");
        }
        Ok(Some(missing == 0))
    }

    async fn teardown(&self, driver: &dyn Driver) -> CoreResult<()> {
        exec_in_tx(driver, self.queries.drop_schema()).await
    }
}
