// Copyright 2023 Remi Bernotavicius

use crate::database;
use crate::database::models::{RecipeId, UserId};
use crate::query::{QueryError, QueryResult};
use crate::recipes::{self, RecipeSummary};
use crate::users;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;

pub fn is_favorite(
    conn: &mut database::Connection,
    user: UserId,
    recipe: RecipeId,
) -> QueryResult<bool> {
    use database::schema::favorites::dsl::*;

    Ok(diesel::select(diesel::dsl::exists(
        favorites.filter(user_id.eq(user)).filter(recipe_id.eq(recipe)),
    ))
    .get_result(conn)?)
}

pub fn add_favorite(
    conn: &mut database::Connection,
    user: UserId,
    recipe: RecipeId,
) -> QueryResult<RecipeSummary> {
    use database::schema::favorites::dsl::*;
    use diesel::insert_into;

    users::find_user(conn, user)?;
    let found = recipes::find_recipe(conn, recipe)?;
    if is_favorite(conn, user, recipe)? {
        return Err(QueryError::already_exists(format!(
            "recipe {recipe} in favorites of user {user}"
        )));
    }

    insert_into(favorites)
        .values((user_id.eq(user), recipe_id.eq(recipe)))
        .execute(conn)?;
    log::info!("user {user} favorited recipe {recipe}");
    Ok(RecipeSummary::from(found))
}

pub fn remove_favorite(
    conn: &mut database::Connection,
    user: UserId,
    recipe: RecipeId,
) -> QueryResult<()> {
    use database::schema::favorites::dsl::*;
    use diesel::delete;

    let deleted = delete(favorites.filter(user_id.eq(user)).filter(recipe_id.eq(recipe)))
        .execute(conn)?;
    if deleted == 0 {
        return Err(QueryError::not_found(format!(
            "recipe {recipe} in favorites of user {user}"
        )));
    }
    log::info!("user {user} unfavorited recipe {recipe}");
    Ok(())
}

#[test]
fn favorite_and_unfavorite() {
    let mut f = recipes::Fixture::new();
    let pancakes = f.recipe("pancakes", vec![(f.flour, 200)]);
    let reader = users::test_user(&mut f.conn, "reader");

    let summary = add_favorite(&mut f.conn, reader, pancakes).unwrap();
    assert_eq!(summary.id, pancakes);
    assert_eq!(summary.name, "pancakes");
    assert!(is_favorite(&mut f.conn, reader, pancakes).unwrap());
    assert!(!is_favorite(&mut f.conn, f.author, pancakes).unwrap());

    let e = add_favorite(&mut f.conn, reader, pancakes).unwrap_err();
    assert!(matches!(e, QueryError::AlreadyExists(_)), "{e}");

    remove_favorite(&mut f.conn, reader, pancakes).unwrap();
    assert!(!is_favorite(&mut f.conn, reader, pancakes).unwrap());
    let e = remove_favorite(&mut f.conn, reader, pancakes).unwrap_err();
    assert!(matches!(e, QueryError::NotFound(_)), "{e}");
}

#[test]
fn favorite_missing_recipe() {
    let mut f = recipes::Fixture::new();
    let e = add_favorite(&mut f.conn, f.author, RecipeId::from(5)).unwrap_err();
    assert_eq!(e.to_string(), "not found: recipe 5");
}
