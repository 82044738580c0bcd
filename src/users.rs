// Copyright 2023 Remi Bernotavicius

use crate::database;
use crate::database::models::{NewUser, User, UserId};
use crate::query::{require_non_empty, QueryError, QueryResult};
use diesel::prelude::OptionalExtension as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use serde::Serialize;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct UserView {
    pub email: String,
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
}

fn validate_email(email: &str) -> QueryResult<()> {
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid || email.chars().any(char::is_whitespace) {
        return Err(QueryError::validation(format!(
            "{email:?} is not a valid email address"
        )));
    }
    Ok(())
}

pub fn create_user(
    conn: &mut database::Connection,
    new_email: &str,
    new_username: &str,
    new_first_name: &str,
    new_last_name: &str,
) -> QueryResult<User> {
    use database::schema::users::dsl::*;
    use diesel::insert_into;

    validate_email(new_email)?;
    require_non_empty("username", new_username)?;
    require_non_empty("first name", new_first_name)?;
    require_non_empty("last name", new_last_name)?;

    let taken: i64 = users.filter(email.eq(new_email)).count().get_result(conn)?;
    if taken > 0 {
        return Err(QueryError::already_exists(format!(
            "user with email {new_email}"
        )));
    }

    let user = insert_into(users)
        .values(NewUser {
            email: new_email,
            username: new_username,
            first_name: new_first_name,
            last_name: new_last_name,
        })
        .returning(User::as_returning())
        .get_result(conn)?;
    log::info!("created user {} ({})", user.id, user.username);
    Ok(user)
}

pub fn find_user(conn: &mut database::Connection, user_id: UserId) -> QueryResult<User> {
    use database::schema::users::dsl::*;

    users
        .find(user_id)
        .select(User::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| QueryError::not_found(format!("user {user_id}")))
}

pub fn is_subscribed(
    conn: &mut database::Connection,
    viewer: Option<UserId>,
    author: UserId,
) -> QueryResult<bool> {
    use database::schema::subscriptions::dsl::*;

    let Some(viewer) = viewer else {
        return Ok(false);
    };
    Ok(diesel::select(diesel::dsl::exists(
        subscriptions
            .filter(user_id.eq(viewer))
            .filter(author_id.eq(author)),
    ))
    .get_result(conn)?)
}

pub fn user_view(
    conn: &mut database::Connection,
    viewer: Option<UserId>,
    user: User,
) -> QueryResult<UserView> {
    let is_subscribed = is_subscribed(conn, viewer, user.id)?;
    Ok(UserView {
        email: user.email,
        id: user.id,
        username: user.username,
        first_name: user.first_name,
        last_name: user.last_name,
        is_subscribed,
    })
}

pub fn get_user(
    conn: &mut database::Connection,
    viewer: Option<UserId>,
    user_id: UserId,
) -> QueryResult<UserView> {
    let user = find_user(conn, user_id)?;
    user_view(conn, viewer, user)
}

pub fn list_users(
    conn: &mut database::Connection,
    viewer: Option<UserId>,
) -> QueryResult<Vec<UserView>> {
    use database::schema::users::dsl::*;

    let all: Vec<User> = users.select(User::as_select()).order(id.asc()).load(conn)?;
    log::debug!("loaded {} users", all.len());
    all.into_iter().map(|u| user_view(conn, viewer, u)).collect()
}

#[cfg(test)]
pub fn test_user(conn: &mut database::Connection, name: &str) -> UserId {
    create_user(conn, &format!("{name}@example.com"), name, "Test", "User")
        .unwrap()
        .id
}

#[test]
fn create_and_get_user() {
    let mut conn = database::test_connection();
    let user = create_user(&mut conn, "anna@example.com", "anna", "Anna", "Ivanova").unwrap();

    let view = get_user(&mut conn, None, user.id).unwrap();
    assert_eq!(view.email, "anna@example.com");
    assert_eq!(view.username, "anna");
    assert!(!view.is_subscribed);
}

#[test]
fn duplicate_email_is_rejected() {
    let mut conn = database::test_connection();
    create_user(&mut conn, "anna@example.com", "anna", "Anna", "Ivanova").unwrap();

    let e = create_user(&mut conn, "anna@example.com", "other", "Other", "Person").unwrap_err();
    assert!(matches!(e, QueryError::AlreadyExists(_)), "{e}");
}

#[test]
fn invalid_user_fields_are_rejected() {
    let mut conn = database::test_connection();
    for (email, username) in [("not-an-email", "anna"), ("anna@example.com", "")] {
        let e = create_user(&mut conn, email, username, "Anna", "Ivanova").unwrap_err();
        assert!(matches!(e, QueryError::Validation(_)), "{e}");
    }
}

#[test]
fn missing_user() {
    let mut conn = database::test_connection();
    let e = get_user(&mut conn, None, UserId::from(42)).unwrap_err();
    assert_eq!(e.to_string(), "not found: user 42");
}

#[test]
fn list_users_in_creation_order() {
    let mut conn = database::test_connection();
    let a = test_user(&mut conn, "a");
    let b = test_user(&mut conn, "b");

    let ids: Vec<_> = list_users(&mut conn, None)
        .unwrap()
        .into_iter()
        .map(|u| u.id)
        .collect();
    assert_eq!(ids, vec![a, b]);
}
