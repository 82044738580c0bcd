// Copyright 2023 Remi Bernotavicius

use crate::database;
use crate::database::models::{RecipeId, UserId};
use crate::query::{QueryError, QueryResult};
use crate::recipes::{self, RecipeSummary};
use crate::users;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;

pub fn is_in_cart(
    conn: &mut database::Connection,
    user: UserId,
    recipe: RecipeId,
) -> QueryResult<bool> {
    use database::schema::shopping_cart::dsl::*;

    Ok(diesel::select(diesel::dsl::exists(
        shopping_cart
            .filter(user_id.eq(user))
            .filter(recipe_id.eq(recipe)),
    ))
    .get_result(conn)?)
}

pub fn add_to_cart(
    conn: &mut database::Connection,
    user: UserId,
    recipe: RecipeId,
) -> QueryResult<RecipeSummary> {
    use database::schema::shopping_cart::dsl::*;
    use diesel::insert_into;

    users::find_user(conn, user)?;
    let found = recipes::find_recipe(conn, recipe)?;
    if is_in_cart(conn, user, recipe)? {
        return Err(QueryError::already_exists(format!(
            "recipe {recipe} in the cart of user {user}"
        )));
    }

    insert_into(shopping_cart)
        .values((user_id.eq(user), recipe_id.eq(recipe)))
        .execute(conn)?;
    log::info!("user {user} added recipe {recipe} to their cart");
    Ok(RecipeSummary::from(found))
}

pub fn remove_from_cart(
    conn: &mut database::Connection,
    user: UserId,
    recipe: RecipeId,
) -> QueryResult<()> {
    use database::schema::shopping_cart::dsl::*;
    use diesel::delete;

    let deleted = delete(
        shopping_cart
            .filter(user_id.eq(user))
            .filter(recipe_id.eq(recipe)),
    )
    .execute(conn)?;
    if deleted == 0 {
        return Err(QueryError::not_found(format!(
            "recipe {recipe} in the cart of user {user}"
        )));
    }
    log::info!("user {user} removed recipe {recipe} from their cart");
    Ok(())
}

#[test]
fn add_and_remove_from_cart() {
    let mut f = recipes::Fixture::new();
    let pancakes = f.recipe("pancakes", vec![(f.flour, 200)]);

    let summary = add_to_cart(&mut f.conn, f.author, pancakes).unwrap();
    assert_eq!(summary.id, pancakes);
    assert!(is_in_cart(&mut f.conn, f.author, pancakes).unwrap());

    let e = add_to_cart(&mut f.conn, f.author, pancakes).unwrap_err();
    assert!(matches!(e, QueryError::AlreadyExists(_)), "{e}");

    remove_from_cart(&mut f.conn, f.author, pancakes).unwrap();
    assert!(!is_in_cart(&mut f.conn, f.author, pancakes).unwrap());
    let e = remove_from_cart(&mut f.conn, f.author, pancakes).unwrap_err();
    assert!(matches!(e, QueryError::NotFound(_)), "{e}");
}

#[test]
fn cart_is_per_user() {
    let mut f = recipes::Fixture::new();
    let pancakes = f.recipe("pancakes", vec![(f.flour, 200)]);
    let other = users::test_user(&mut f.conn, "other");

    add_to_cart(&mut f.conn, f.author, pancakes).unwrap();
    add_to_cart(&mut f.conn, other, pancakes).unwrap();
    remove_from_cart(&mut f.conn, f.author, pancakes).unwrap();
    assert!(is_in_cart(&mut f.conn, other, pancakes).unwrap());
}

#[test]
fn deleting_a_recipe_empties_it_from_carts() {
    let mut f = recipes::Fixture::new();
    let pancakes = f.recipe("pancakes", vec![(f.flour, 200)]);
    add_to_cart(&mut f.conn, f.author, pancakes).unwrap();

    recipes::delete_recipe(&mut f.conn, pancakes).unwrap();
    assert!(!is_in_cart(&mut f.conn, f.author, pancakes).unwrap());
}
