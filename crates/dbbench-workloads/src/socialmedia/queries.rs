//! Statements behind the social-media workloads.

use chrono::{DateTime, Utc};
use dbbench_core::{
    BackendKind, CoreResult, DocumentCommand, Filter, Row, SqlStatement, Statement, Update,
};
use serde_json::{json, Value as JsonValue};

use crate::dialect::Dialect;
use crate::support::document_timestamp;

pub const USERS: &str = "users";
pub const POSTS: &str = "posts";
pub const FOLLOWS: &str = "follows";
pub const TIMELINES: &str = "timelines";

/// A post as read back for verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRef {
    pub id: String,
    pub author: String,
}

/// Backend-specific statements for users, posts, follows and timelines.
pub trait SocialQueries: Send + Sync {
    /// `with_timelines` adds the fan-out timeline table.
    fn create_schema(&self, with_timelines: bool) -> Vec<Statement>;

    fn drop_schema(&self) -> Vec<Statement>;

    fn insert_user(&self, id: &str, name: &str) -> Statement;

    /// Seeds an empty timeline for `user_id`.
    fn insert_timeline(&self, user_id: &str) -> Statement;

    fn insert_follow(&self, follower_id: &str, followee_id: &str) -> Statement;

    fn insert_post(
        &self,
        id: &str,
        author: &str,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Statement;

    /// Rows carrying `follower_id` for everyone following `author`.
    fn followers_of(&self, author: &str) -> Statement;

    /// Rows carrying `followee_id` for everyone `user_id` follows.
    fn followees_of(&self, user_id: &str) -> Statement;

    /// Posts written by anyone `user_id` follows, in one round trip.
    /// `None` when the backend cannot join; callers then go through
    /// [`followees_of`](Self::followees_of) and [`posts_by`](Self::posts_by).
    fn followee_posts(&self, user_id: &str) -> Option<Statement>;

    /// Posts by any of `authors`.
    fn posts_by(&self, authors: &[String]) -> Statement;

    /// Appends `post_id` to `user_id`'s timeline.
    fn append_to_timeline(&self, user_id: &str, post_id: &str) -> Statement;

    fn list_posts(&self) -> Statement;

    fn post_ref(&self, row: &Row) -> CoreResult<PostRef>;

    /// Every follow edge; rows carry `follower_id` and `followee_id`.
    fn list_follows(&self) -> Statement;

    /// Every timeline; rows carry `user_id` and `post_ids`.
    fn list_timelines(&self) -> Statement;
}

#[must_use]
pub fn for_backend(backend: BackendKind) -> Box<dyn SocialQueries> {
    match Dialect::for_backend(backend) {
        Some(dialect) => Box::new(SqlSocial::new(dialect)),
        None => Box::new(DocumentSocial),
    }
}

#[derive(Debug, Clone)]
pub struct SqlSocial {
    dialect: Dialect,
    insert_user: String,
    insert_timeline: String,
    insert_follow: String,
    insert_post: String,
    followers: String,
    followees: String,
    followee_posts: String,
    append: String,
}

impl SqlSocial {
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        let r = |template: &str| dialect.render(template);
        Self {
            dialect,
            insert_user: r("INSERT INTO users (id, name) VALUES ($1, $2)"),
            insert_timeline: r("INSERT INTO timelines (user_id, post_ids) VALUES ($1, $2)"),
            insert_follow: r("INSERT INTO follows (follower_id, followee_id) VALUES ($1, $2) \
                 ON CONFLICT DO NOTHING"),
            insert_post: r(
                "INSERT INTO posts (id, user_id, content, created_at) VALUES ($1, $2, $3, $4)",
            ),
            followers: r("SELECT follower_id FROM follows WHERE followee_id = $1"),
            followees: r("SELECT followee_id FROM follows WHERE follower_id = $1"),
            followee_posts: r("SELECT p.id, p.user_id, p.content, p.created_at FROM posts p \
                 JOIN follows f ON p.user_id = f.followee_id WHERE f.follower_id = $1"),
            append: r(&format!(
                "UPDATE timelines SET post_ids = {} WHERE user_id = $2",
                dialect.array_append("post_ids", "$1")
            )),
        }
    }
}

impl SocialQueries for SqlSocial {
    fn create_schema(&self, with_timelines: bool) -> Vec<Statement> {
        let ts = self.dialect.timestamp_type();
        let mut statements = vec![
            Statement::sql(
                "CREATE TABLE IF NOT EXISTS users (
                    id VARCHAR(255) PRIMARY KEY,
                    name VARCHAR(255) NOT NULL
                )",
            ),
            Statement::sql(format!(
                "CREATE TABLE IF NOT EXISTS posts (
                    id VARCHAR(255) PRIMARY KEY,
                    user_id VARCHAR(255) NOT NULL,
                    content TEXT NOT NULL,
                    created_at {ts} NOT NULL
                )"
            )),
            Statement::sql("CREATE INDEX IF NOT EXISTS idx_posts_user_id ON posts (user_id)"),
            Statement::sql(
                "CREATE TABLE IF NOT EXISTS follows (
                    follower_id VARCHAR(255) NOT NULL,
                    followee_id VARCHAR(255) NOT NULL,
                    PRIMARY KEY (follower_id, followee_id)
                )",
            ),
        ];
        if with_timelines {
            statements.push(Statement::sql(format!(
                "CREATE TABLE IF NOT EXISTS timelines (
                    user_id VARCHAR(255) PRIMARY KEY,
                    post_ids {} NOT NULL
                )",
                self.dialect.text_array_type()
            )));
        }
        statements
    }

    fn drop_schema(&self) -> Vec<Statement> {
        let cascade = self.dialect.drop_suffix();
        [TIMELINES, FOLLOWS, POSTS, USERS]
            .iter()
            .map(|table| Statement::sql(format!("DROP TABLE IF EXISTS {table}{cascade}")))
            .collect()
    }

    fn insert_user(&self, id: &str, name: &str) -> Statement {
        SqlStatement::new(self.insert_user.clone())
            .bind(id)
            .bind(name)
            .into()
    }

    fn insert_timeline(&self, user_id: &str) -> Statement {
        SqlStatement::new(self.insert_timeline.clone())
            .bind(user_id)
            .bind(Vec::<String>::new())
            .into()
    }

    fn insert_follow(&self, follower_id: &str, followee_id: &str) -> Statement {
        SqlStatement::new(self.insert_follow.clone())
            .bind(follower_id)
            .bind(followee_id)
            .into()
    }

    fn insert_post(
        &self,
        id: &str,
        author: &str,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Statement {
        SqlStatement::new(self.insert_post.clone())
            .bind(id)
            .bind(author)
            .bind(content)
            .bind(created_at)
            .into()
    }

    fn followers_of(&self, author: &str) -> Statement {
        SqlStatement::new(self.followers.clone()).bind(author).into()
    }

    fn followees_of(&self, user_id: &str) -> Statement {
        SqlStatement::new(self.followees.clone()).bind(user_id).into()
    }

    fn followee_posts(&self, user_id: &str) -> Option<Statement> {
        Some(
            SqlStatement::new(self.followee_posts.clone())
                .bind(user_id)
                .into(),
        )
    }

    fn posts_by(&self, authors: &[String]) -> Statement {
        let placeholders: Vec<String> = (1..=authors.len()).map(|i| format!("${i}")).collect();
        let text = self.dialect.render(&format!(
            "SELECT id, user_id, content, created_at FROM posts WHERE user_id IN ({})",
            if placeholders.is_empty() {
                "NULL".to_string()
            } else {
                placeholders.join(", ")
            }
        ));
        authors
            .iter()
            .fold(SqlStatement::new(text), |stmt, author| stmt.bind(author.as_str()))
            .into()
    }

    fn append_to_timeline(&self, user_id: &str, post_id: &str) -> Statement {
        SqlStatement::new(self.append.clone())
            .bind(post_id)
            .bind(user_id)
            .into()
    }

    fn list_posts(&self) -> Statement {
        Statement::sql("SELECT id, user_id FROM posts")
    }

    fn post_ref(&self, row: &Row) -> CoreResult<PostRef> {
        Ok(PostRef {
            id: row.scan_named("id")?,
            author: row.scan_named("user_id")?,
        })
    }

    fn list_follows(&self) -> Statement {
        Statement::sql("SELECT follower_id, followee_id FROM follows")
    }

    fn list_timelines(&self) -> Statement {
        Statement::sql("SELECT user_id, post_ids FROM timelines")
    }
}

/// Commands for the document store. Follows are keyed by the edge, so
/// seeding the same edge twice is rejected rather than duplicated.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentSocial;

fn drop_collection(collection: &str) -> Statement {
    DocumentCommand::DropCollection {
        collection: collection.to_string(),
    }
    .into()
}

fn find(collection: &str, filter: Filter) -> Statement {
    DocumentCommand::Find {
        collection: collection.to_string(),
        filter,
    }
    .into()
}

impl SocialQueries for DocumentSocial {
    fn create_schema(&self, _with_timelines: bool) -> Vec<Statement> {
        Vec::new()
    }

    fn drop_schema(&self) -> Vec<Statement> {
        [TIMELINES, FOLLOWS, POSTS, USERS]
            .iter()
            .map(|collection| drop_collection(collection))
            .collect()
    }

    fn insert_user(&self, id: &str, name: &str) -> Statement {
        DocumentCommand::InsertOne {
            collection: USERS.into(),
            document: json!({"_id": id, "name": name}),
        }
        .into()
    }

    fn insert_timeline(&self, user_id: &str) -> Statement {
        DocumentCommand::InsertOne {
            collection: TIMELINES.into(),
            document: json!({"_id": user_id, "user_id": user_id, "post_ids": []}),
        }
        .into()
    }

    fn insert_follow(&self, follower_id: &str, followee_id: &str) -> Statement {
        DocumentCommand::InsertOne {
            collection: FOLLOWS.into(),
            document: json!({
                "_id": format!("{follower_id}->{followee_id}"),
                "follower_id": follower_id,
                "followee_id": followee_id,
            }),
        }
        .into()
    }

    fn insert_post(
        &self,
        id: &str,
        author: &str,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Statement {
        DocumentCommand::InsertOne {
            collection: POSTS.into(),
            document: json!({
                "_id": id,
                "user_id": author,
                "content": content,
                "created_at": document_timestamp(created_at),
            }),
        }
        .into()
    }

    fn followers_of(&self, author: &str) -> Statement {
        find(FOLLOWS, Filter::all().eq("followee_id", author))
    }

    fn followees_of(&self, user_id: &str) -> Statement {
        find(FOLLOWS, Filter::all().eq("follower_id", user_id))
    }

    fn followee_posts(&self, _user_id: &str) -> Option<Statement> {
        None
    }

    fn posts_by(&self, authors: &[String]) -> Statement {
        let authors: Vec<JsonValue> = authors.iter().map(|a| JsonValue::from(a.as_str())).collect();
        find(POSTS, Filter::all().is_in("user_id", authors))
    }

    fn append_to_timeline(&self, user_id: &str, post_id: &str) -> Statement {
        DocumentCommand::UpdateOne {
            collection: TIMELINES.into(),
            filter: Filter::all().eq("user_id", user_id),
            update: Update::new().push("post_ids", post_id),
        }
        .into()
    }

    fn list_posts(&self) -> Statement {
        find(POSTS, Filter::all())
    }

    fn post_ref(&self, row: &Row) -> CoreResult<PostRef> {
        Ok(PostRef {
            id: row.scan_named("_id")?,
            author: row.scan_named("user_id")?,
        })
    }

    fn list_follows(&self) -> Statement {
        find(FOLLOWS, Filter::all())
    }

    fn list_timelines(&self) -> Statement {
        find(TIMELINES, Filter::all())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeline_append_per_dialect() {
        let sqlite = SqlSocial::new(Dialect::Sqlite);
        let Statement::Sql(stmt) = sqlite.append_to_timeline("user1", "p1") else {
            panic!("expected SQL");
        };
        assert_eq!(
            stmt.text,
            "UPDATE timelines SET post_ids = json_insert(post_ids, '$[#]', ?1) WHERE user_id = ?2"
        );

        let pg = SqlSocial::new(Dialect::Postgres);
        let Statement::Sql(stmt) = pg.append_to_timeline("user1", "p1") else {
            panic!("expected SQL");
        };
        assert!(stmt.text.contains("array_append(post_ids, $1)"));
    }

    #[test]
    fn test_posts_by_binds_each_author() {
        let queries = SqlSocial::new(Dialect::Postgres);
        let Statement::Sql(stmt) = queries.posts_by(&["a".into(), "b".into()]) else {
            panic!("expected SQL");
        };
        assert!(stmt.text.ends_with("IN ($1, $2)"));
        assert_eq!(stmt.params.len(), 2);
    }
}
