// Copyright 2023 Remi Bernotavicius

use crate::database;
use crate::database::models::{Ingredient, IngredientId, NewIngredient};
use crate::query::{escape_like, require_non_empty, QueryError, QueryResult};
use diesel::prelude::OptionalExtension as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use std::collections::BTreeSet;

pub fn add_ingredient(
    conn: &mut database::Connection,
    new_name: &str,
    new_measurement_unit: &str,
) -> QueryResult<Ingredient> {
    use database::schema::ingredients::dsl::*;
    use diesel::insert_into;

    require_non_empty("ingredient name", new_name)?;
    require_non_empty("measurement unit", new_measurement_unit)?;

    let ingredient = insert_into(ingredients)
        .values(NewIngredient {
            name: new_name,
            measurement_unit: new_measurement_unit,
        })
        .returning(Ingredient::as_returning())
        .get_result(conn)?;
    log::info!(
        "added ingredient {} ({}, {})",
        ingredient.id,
        ingredient.name,
        ingredient.measurement_unit
    );
    Ok(ingredient)
}

pub fn find_ingredient(
    conn: &mut database::Connection,
    find_name: &str,
    find_measurement_unit: &str,
) -> QueryResult<Option<Ingredient>> {
    use database::schema::ingredients::dsl::*;

    Ok(ingredients
        .select(Ingredient::as_select())
        .filter(name.eq(find_name))
        .filter(measurement_unit.eq(find_measurement_unit))
        .first(conn)
        .optional()?)
}

/// Ingredients ordered by name, optionally only those whose name starts with
/// `prefix` (ignoring case).
pub fn list_ingredients(
    conn: &mut database::Connection,
    prefix: Option<&str>,
) -> QueryResult<Vec<Ingredient>> {
    use database::schema::ingredients::dsl::*;
    use database::unicode_lower;
    use diesel::expression_methods::EscapeExpressionMethods as _;
    use diesel::expression_methods::TextExpressionMethods as _;

    let mut query = ingredients
        .select(Ingredient::as_select())
        .order((name.asc(), id.asc()))
        .into_boxed();
    if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
        let pattern = format!("{}%", escape_like(&prefix.to_lowercase()));
        query = query.filter(unicode_lower(name).like(pattern).escape('\\'));
    }
    let result = query.load(conn)?;
    log::debug!("ingredient search {prefix:?} found {}", result.len());
    Ok(result)
}

/// Checks that every ingredient exists.
pub fn require_ingredients(
    conn: &mut database::Connection,
    wanted: &BTreeSet<IngredientId>,
) -> QueryResult<()> {
    use database::schema::ingredients::dsl::*;

    let existing: BTreeSet<IngredientId> = ingredients
        .select(id)
        .filter(id.eq_any(wanted.iter().copied()))
        .load::<IngredientId>(conn)?
        .into_iter()
        .collect();
    if let Some(missing) = wanted.difference(&existing).next() {
        return Err(QueryError::validation(format!(
            "ingredient {missing} does not exist"
        )));
    }
    Ok(())
}

#[test]
fn list_ingredients_by_prefix() {
    let mut conn = database::test_connection();
    add_ingredient(&mut conn, "sugar", "g").unwrap();
    add_ingredient(&mut conn, "Salt", "g").unwrap();
    add_ingredient(&mut conn, "flour", "g").unwrap();
    add_ingredient(&mut conn, "sea salt", "pinch").unwrap();

    let names = |v: Vec<Ingredient>| v.into_iter().map(|i| i.name).collect::<Vec<_>>();

    assert_eq!(
        names(list_ingredients(&mut conn, None).unwrap()),
        vec!["Salt", "flour", "sea salt", "sugar"]
    );
    assert_eq!(
        names(list_ingredients(&mut conn, Some("s")).unwrap()),
        vec!["Salt", "sea salt", "sugar"]
    );
    assert_eq!(
        names(list_ingredients(&mut conn, Some("SA")).unwrap()),
        vec!["Salt"]
    );
    assert!(list_ingredients(&mut conn, Some("%")).unwrap().is_empty());
}

#[test]
fn prefix_search_ignores_case_beyond_ascii() {
    let mut conn = database::test_connection();
    add_ingredient(&mut conn, "абрикосовое варенье", "г").unwrap();
    add_ingredient(&mut conn, "Абрикос", "г").unwrap();
    add_ingredient(&mut conn, "Éclair", "pcs").unwrap();
    add_ingredient(&mut conn, "банан", "шт").unwrap();

    let names = |v: Vec<Ingredient>| v.into_iter().map(|i| i.name).collect::<Vec<_>>();

    assert_eq!(
        names(list_ingredients(&mut conn, Some("аб")).unwrap()),
        vec!["Абрикос", "абрикосовое варенье"]
    );
    assert_eq!(
        names(list_ingredients(&mut conn, Some("АБРИКОСО")).unwrap()),
        vec!["абрикосовое варенье"]
    );
    assert_eq!(
        names(list_ingredients(&mut conn, Some("éc")).unwrap()),
        vec!["Éclair"]
    );
}

#[test]
fn same_name_different_units() {
    let mut conn = database::test_connection();
    let grams = add_ingredient(&mut conn, "milk", "g").unwrap();
    let millis = add_ingredient(&mut conn, "milk", "ml").unwrap();
    assert_ne!(grams.id, millis.id);

    let found = find_ingredient(&mut conn, "milk", "ml").unwrap().unwrap();
    assert_eq!(found, millis);
    assert!(find_ingredient(&mut conn, "Milk", "ml").unwrap().is_none());
}

#[test]
fn missing_ingredients_are_reported() {
    let mut conn = database::test_connection();
    let flour = add_ingredient(&mut conn, "flour", "g").unwrap();

    let wanted = BTreeSet::from([flour.id]);
    require_ingredients(&mut conn, &wanted).unwrap();

    let wanted = BTreeSet::from([flour.id, IngredientId::from(7)]);
    let e = require_ingredients(&mut conn, &wanted).unwrap_err();
    assert_eq!(e.to_string(), "invalid input: ingredient 7 does not exist");
}
