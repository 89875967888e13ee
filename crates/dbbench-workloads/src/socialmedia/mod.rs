//! Social-network scenarios over users, posts, follows and timelines.

pub mod fan_out_on_write;
pub mod join_on_read;
pub mod queries;

use std::collections::BTreeSet;

use dbbench_core::Statement;

pub use fan_out_on_write::FanOutOnWrite;
pub use join_on_read::JoinOnRead;
pub use queries::{DocumentSocial, PostRef, SocialQueries, SqlSocial};

pub const DEFAULT_USERS: usize = 100;
/// Follow edges attempted during seeding; the ring pattern repeats, so only
/// `users` of them are distinct.
pub const DEFAULT_FOLLOWS: usize = 1000;

#[must_use]
pub fn user_id(index: usize) -> String {
    format!("user{index}")
}

/// Ring of follow edges: `user(i % users)` follows `user((i + 1) % users)`,
/// deduplicated.
#[must_use]
pub fn follow_edges(users: usize, follows: usize) -> BTreeSet<(String, String)> {
    if users == 0 {
        return BTreeSet::new();
    }
    (0..follows)
        .map(|i| (user_id(i % users), user_id((i + 1) % users)))
        .collect()
}

/// Users plus follow edges, with a timeline per user when requested.
pub(crate) fn seed_graph(
    queries: &dyn SocialQueries,
    users: usize,
    follows: usize,
    with_timelines: bool,
) -> Vec<Statement> {
    let mut statements = queries.create_schema(with_timelines);
    for i in 0..users {
        let id = user_id(i);
        statements.push(queries.insert_user(&id, &format!("user-{i}")));
        if with_timelines {
            statements.push(queries.insert_timeline(&id));
        }
    }
    for (follower, followee) in follow_edges(users, follows) {
        statements.push(queries.insert_follow(&follower, &followee));
    }
    statements
}
