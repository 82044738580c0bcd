// Copyright 2023 Remi Bernotavicius

use crate::database;
use crate::database::models::{User, UserId};
use crate::query::{QueryError, QueryResult};
use crate::recipes::{self, RecipeSummary};
use crate::users::{self, UserView};
use diesel::ExpressionMethods as _;
use diesel::JoinOnDsl as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use serde::Serialize;

/// An author as seen by one of their subscribers.
#[derive(Serialize, Debug, Clone)]
pub struct SubscriptionView {
    #[serde(flatten)]
    pub author: UserView,
    pub recipes: Vec<RecipeSummary>,
    pub recipes_count: i64,
}

fn subscription_view(
    conn: &mut database::Connection,
    user: UserId,
    author: User,
    recipes_limit: Option<i64>,
) -> QueryResult<SubscriptionView> {
    let recipes = recipes::author_recipes(conn, author.id, recipes_limit)?;
    let recipes_count = recipes::count_author_recipes(conn, author.id)?;
    let author = users::user_view(conn, Some(user), author)?;
    Ok(SubscriptionView {
        author,
        recipes,
        recipes_count,
    })
}

pub fn subscribe(
    conn: &mut database::Connection,
    user: UserId,
    author: UserId,
    recipes_limit: Option<i64>,
) -> QueryResult<SubscriptionView> {
    use database::schema::subscriptions::dsl::*;
    use diesel::insert_into;

    if user == author {
        return Err(QueryError::validation("users cannot subscribe to themselves"));
    }
    users::find_user(conn, user)?;
    let found = users::find_user(conn, author)?;
    if users::is_subscribed(conn, Some(user), author)? {
        return Err(QueryError::already_exists(format!(
            "subscription of user {user} to {author}"
        )));
    }

    insert_into(subscriptions)
        .values((user_id.eq(user), author_id.eq(author)))
        .execute(conn)?;
    log::info!("user {user} subscribed to {author}");
    subscription_view(conn, user, found, recipes_limit)
}

pub fn unsubscribe(
    conn: &mut database::Connection,
    user: UserId,
    author: UserId,
) -> QueryResult<()> {
    use database::schema::subscriptions::dsl::*;
    use diesel::delete;

    let deleted = delete(
        subscriptions
            .filter(user_id.eq(user))
            .filter(author_id.eq(author)),
    )
    .execute(conn)?;
    if deleted == 0 {
        return Err(QueryError::not_found(format!(
            "subscription of user {user} to {author}"
        )));
    }
    log::info!("user {user} unsubscribed from {author}");
    Ok(())
}

/// Every author `user` subscribes to, most recent subscription first.
pub fn subscriptions(
    conn: &mut database::Connection,
    user: UserId,
    recipes_limit: Option<i64>,
) -> QueryResult<Vec<SubscriptionView>> {
    use database::schema::{subscriptions, users};

    let authors: Vec<User> = subscriptions::table
        .inner_join(users::table.on(users::id.eq(subscriptions::author_id)))
        .filter(subscriptions::user_id.eq(user))
        .order(subscriptions::id.desc())
        .select(User::as_select())
        .load(conn)?;
    authors
        .into_iter()
        .map(|author| subscription_view(conn, user, author, recipes_limit))
        .collect()
}

#[test]
fn subscribe_and_list() {
    let mut f = recipes::Fixture::new();
    f.recipe("a", vec![(f.flour, 1)]);
    let b = f.recipe("b", vec![(f.flour, 1)]);
    let c = f.recipe("c", vec![(f.flour, 1)]);
    let reader = users::test_user(&mut f.conn, "reader");
    let quiet = users::test_user(&mut f.conn, "quiet");

    let view = subscribe(&mut f.conn, reader, f.author, Some(2)).unwrap();
    assert_eq!(view.author.id, f.author);
    assert!(view.author.is_subscribed);
    assert_eq!(view.recipes.iter().map(|r| r.id).collect::<Vec<_>>(), vec![c, b]);
    assert_eq!(view.recipes_count, 3);

    subscribe(&mut f.conn, reader, quiet, None).unwrap();
    let listed = subscriptions(&mut f.conn, reader, None).unwrap();
    assert_eq!(
        listed.iter().map(|s| s.author.id).collect::<Vec<_>>(),
        vec![quiet, f.author]
    );
    assert_eq!(listed[0].recipes_count, 0);
    assert_eq!(listed[1].recipes.len(), 3);

    let viewed = users::get_user(&mut f.conn, Some(reader), f.author).unwrap();
    assert!(viewed.is_subscribed);
    let viewed = users::get_user(&mut f.conn, Some(f.author), reader).unwrap();
    assert!(!viewed.is_subscribed);
}

#[test]
fn subscription_rules() {
    let mut f = recipes::Fixture::new();
    let reader = users::test_user(&mut f.conn, "reader");

    let e = subscribe(&mut f.conn, reader, reader, None).unwrap_err();
    assert!(matches!(e, QueryError::Validation(_)), "{e}");

    subscribe(&mut f.conn, reader, f.author, None).unwrap();
    let e = subscribe(&mut f.conn, reader, f.author, None).unwrap_err();
    assert!(matches!(e, QueryError::AlreadyExists(_)), "{e}");

    let e = subscribe(&mut f.conn, reader, UserId::from(99), None).unwrap_err();
    assert!(matches!(e, QueryError::NotFound(_)), "{e}");

    unsubscribe(&mut f.conn, reader, f.author).unwrap();
    assert!(subscriptions(&mut f.conn, reader, None).unwrap().is_empty());
    let e = unsubscribe(&mut f.conn, reader, f.author).unwrap_err();
    assert!(matches!(e, QueryError::NotFound(_)), "{e}");
}
