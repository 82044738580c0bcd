// Copyright 2023 Remi Bernotavicius

use crate::database;
use crate::database::models::{
    IngredientId, NewRecipe, NewRecipeIngredient, Recipe, RecipeId, RecipeIngredient, RecipeTag,
    Tag, TagId, UserId,
};
use crate::images;
use crate::ingredients;
use crate::query::{require_non_empty, QueryError, QueryResult};
use crate::tags;
use crate::users::{self, UserView};
use diesel::prelude::OptionalExtension as _;
use diesel::BelongingToDsl as _;
use diesel::Connection as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use serde::Serialize;
use std::collections::BTreeSet;

/// Everything needed to create a recipe or replace an existing one.
#[derive(Debug, Clone)]
pub struct RecipeInput {
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
    /// Base64 or a base64 data URL. `None` on update keeps the stored image.
    pub image: Option<String>,
    pub tags: Vec<TagId>,
    pub ingredients: Vec<(IngredientId, i32)>,
}

struct ValidatedRecipe {
    image: Option<Vec<u8>>,
    tags: BTreeSet<TagId>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RecipeIngredientView {
    pub id: IngredientId,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[derive(Serialize, Debug, Clone)]
pub struct RecipeView {
    pub id: RecipeId,
    pub tags: Vec<Tag>,
    pub author: UserView,
    pub ingredients: Vec<RecipeIngredientView>,
    pub image: Option<String>,
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RecipeSummary {
    pub id: RecipeId,
    pub name: String,
    pub image: Option<String>,
    pub cooking_time: i32,
}

impl From<Recipe> for RecipeSummary {
    fn from(recipe: Recipe) -> Self {
        Self {
            id: recipe.id,
            name: recipe.name,
            image: recipe.image.as_deref().map(images::encode_image),
            cooking_time: recipe.cooking_time,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct RecipeFilter {
    /// Tag slugs; a recipe matches if it carries any of them.
    pub tags: Vec<String>,
    pub author: Option<UserId>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

fn validate(conn: &mut database::Connection, input: &RecipeInput) -> QueryResult<ValidatedRecipe> {
    require_non_empty("recipe name", &input.name)?;
    require_non_empty("recipe text", &input.text)?;
    if input.cooking_time < 1 {
        return Err(QueryError::validation(
            "cooking time must be at least 1 minute",
        ));
    }

    if input.tags.is_empty() {
        return Err(QueryError::validation("recipe must have at least one tag"));
    }
    let tags = tags::resolve_tags(conn, &input.tags)?;

    if input.ingredients.is_empty() {
        return Err(QueryError::validation(
            "recipe must have at least one ingredient",
        ));
    }
    let mut seen = BTreeSet::new();
    for &(ingredient_id, amount) in &input.ingredients {
        if !seen.insert(ingredient_id) {
            return Err(QueryError::validation(format!(
                "ingredient {ingredient_id} is listed more than once"
            )));
        }
        if amount < 1 {
            return Err(QueryError::validation(format!(
                "amount of ingredient {ingredient_id} must be at least 1"
            )));
        }
    }
    ingredients::require_ingredients(conn, &seen)?;

    let image = input
        .image
        .as_deref()
        .map(images::decode_image)
        .transpose()?;

    Ok(ValidatedRecipe { image, tags })
}

fn set_tags(
    conn: &mut database::Connection,
    recipe: RecipeId,
    new_tags: &BTreeSet<TagId>,
) -> QueryResult<()> {
    use database::schema::recipe_tags::dsl::*;
    use diesel::{delete, insert_into};

    delete(recipe_tags.filter(recipe_id.eq(recipe))).execute(conn)?;
    let rows: Vec<_> = new_tags
        .iter()
        .map(|&tag| RecipeTag {
            recipe_id: recipe,
            tag_id: tag,
        })
        .collect();
    insert_into(recipe_tags).values(&rows).execute(conn)?;
    Ok(())
}

fn set_ingredients(
    conn: &mut database::Connection,
    recipe: RecipeId,
    new_ingredients: &[(IngredientId, i32)],
) -> QueryResult<()> {
    use database::schema::recipe_ingredients::dsl::*;
    use diesel::{delete, insert_into};

    delete(recipe_ingredients.filter(recipe_id.eq(recipe))).execute(conn)?;
    let rows: Vec<_> = new_ingredients
        .iter()
        .map(|&(ingredient, new_amount)| NewRecipeIngredient {
            recipe_id: recipe,
            ingredient_id: ingredient,
            amount: new_amount,
        })
        .collect();
    insert_into(recipe_ingredients).values(&rows).execute(conn)?;
    Ok(())
}

pub fn create_recipe(
    conn: &mut database::Connection,
    author: UserId,
    input: &RecipeInput,
) -> QueryResult<RecipeId> {
    use database::schema::recipes::dsl::*;
    use diesel::insert_into;

    conn.transaction(|conn| {
        users::find_user(conn, author)?;
        let validated = validate(conn, input)?;

        let new_id: RecipeId = insert_into(recipes)
            .values(NewRecipe {
                author_id: author,
                name: &input.name,
                image: validated.image.as_deref(),
                text: &input.text,
                cooking_time: input.cooking_time,
                pub_date: chrono::Utc::now().naive_utc(),
            })
            .returning(id)
            .get_result(conn)?;
        set_tags(conn, new_id, &validated.tags)?;
        set_ingredients(conn, new_id, &input.ingredients)?;

        log::info!("user {author} created recipe {new_id} ({})", input.name);
        Ok(new_id)
    })
}

pub fn update_recipe(
    conn: &mut database::Connection,
    recipe_id: RecipeId,
    input: &RecipeInput,
) -> QueryResult<()> {
    use database::schema::recipes::dsl::*;
    use diesel::update;

    conn.transaction(|conn| {
        find_recipe(conn, recipe_id)?;
        let validated = validate(conn, input)?;

        update(recipes.find(recipe_id))
            .set((
                name.eq(&input.name),
                text.eq(&input.text),
                cooking_time.eq(input.cooking_time),
            ))
            .execute(conn)?;
        if let Some(new_image) = &validated.image {
            update(recipes.find(recipe_id))
                .set(image.eq(Some(new_image.as_slice())))
                .execute(conn)?;
        }
        set_tags(conn, recipe_id, &validated.tags)?;
        set_ingredients(conn, recipe_id, &input.ingredients)?;

        log::info!("updated recipe {recipe_id}");
        Ok(())
    })
}

pub fn delete_recipe(conn: &mut database::Connection, delete_id: RecipeId) -> QueryResult<()> {
    use database::schema::recipes::dsl::*;
    use diesel::delete;

    let deleted = delete(recipes.filter(id.eq(delete_id))).execute(conn)?;
    if deleted == 0 {
        return Err(QueryError::not_found(format!("recipe {delete_id}")));
    }
    log::info!("deleted recipe {delete_id}");
    Ok(())
}

pub fn find_recipe(conn: &mut database::Connection, recipe_id: RecipeId) -> QueryResult<Recipe> {
    use database::schema::recipes::dsl::*;

    recipes
        .find(recipe_id)
        .select(Recipe::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| QueryError::not_found(format!("recipe {recipe_id}")))
}

fn recipe_view(
    conn: &mut database::Connection,
    viewer: Option<UserId>,
    recipe: Recipe,
) -> QueryResult<RecipeView> {
    use database::schema::{ingredients, recipe_ingredients, tags};

    let author = users::find_user(conn, recipe.author_id)?;
    let author = users::user_view(conn, viewer, author)?;

    let tag_list: Vec<Tag> = RecipeTag::belonging_to(&recipe)
        .inner_join(tags::table)
        .select(Tag::as_select())
        .order(tags::id.asc())
        .load(conn)?;

    let ingredient_list: Vec<RecipeIngredientView> = RecipeIngredient::belonging_to(&recipe)
        .inner_join(ingredients::table)
        .select((
            ingredients::id,
            ingredients::name,
            ingredients::measurement_unit,
            recipe_ingredients::amount,
        ))
        .order(recipe_ingredients::id.asc())
        .load::<(IngredientId, String, String, i32)>(conn)?
        .into_iter()
        .map(|(id, name, measurement_unit, amount)| RecipeIngredientView {
            id,
            name,
            measurement_unit,
            amount,
        })
        .collect();

    let (is_favorited, is_in_shopping_cart) = match viewer {
        Some(viewer) => (
            crate::favorites::is_favorite(conn, viewer, recipe.id)?,
            crate::cart::is_in_cart(conn, viewer, recipe.id)?,
        ),
        None => (false, false),
    };

    Ok(RecipeView {
        id: recipe.id,
        tags: tag_list,
        author,
        ingredients: ingredient_list,
        image: recipe.image.as_deref().map(images::encode_image),
        name: recipe.name,
        text: recipe.text,
        cooking_time: recipe.cooking_time,
        is_favorited,
        is_in_shopping_cart,
    })
}

pub fn get_recipe(
    conn: &mut database::Connection,
    viewer: Option<UserId>,
    recipe_id: RecipeId,
) -> QueryResult<RecipeView> {
    let recipe = find_recipe(conn, recipe_id)?;
    recipe_view(conn, viewer, recipe)
}

/// Recipes matching `filter`, newest first. The favorite and cart filters
/// only apply when there is a viewer.
pub fn list_recipes(
    conn: &mut database::Connection,
    viewer: Option<UserId>,
    filter: &RecipeFilter,
) -> QueryResult<Vec<RecipeView>> {
    use database::schema::{favorites, recipe_tags, recipes, shopping_cart, tags};

    let mut query = recipes::table
        .select(Recipe::as_select())
        .order((recipes::pub_date.desc(), recipes::id.desc()))
        .into_boxed();

    if let Some(author) = filter.author {
        query = query.filter(recipes::author_id.eq(author));
    }
    if !filter.tags.is_empty() {
        let tag_ids = tags::table
            .filter(tags::slug.eq_any(filter.tags.clone()))
            .select(tags::id);
        let tagged = recipe_tags::table
            .filter(recipe_tags::tag_id.eq_any(tag_ids))
            .select(recipe_tags::recipe_id);
        query = query.filter(recipes::id.eq_any(tagged));
    }
    if let Some(viewer) = viewer {
        if filter.is_favorited {
            let favorite = favorites::table
                .filter(favorites::user_id.eq(viewer))
                .select(favorites::recipe_id);
            query = query.filter(recipes::id.eq_any(favorite));
        }
        if filter.is_in_shopping_cart {
            let in_cart = shopping_cart::table
                .filter(shopping_cart::user_id.eq(viewer))
                .select(shopping_cart::recipe_id);
            query = query.filter(recipes::id.eq_any(in_cart));
        }
    }

    let found: Vec<Recipe> = query.load(conn)?;
    log::debug!("recipe listing {filter:?} found {}", found.len());
    found
        .into_iter()
        .map(|recipe| recipe_view(conn, viewer, recipe))
        .collect()
}

/// The author's recipes in short form, newest first.
pub fn author_recipes(
    conn: &mut database::Connection,
    author: UserId,
    limit: Option<i64>,
) -> QueryResult<Vec<RecipeSummary>> {
    use database::schema::recipes::dsl::*;

    let mut query = recipes
        .select(Recipe::as_select())
        .filter(author_id.eq(author))
        .order((pub_date.desc(), id.desc()))
        .into_boxed();
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    Ok(query
        .load::<Recipe>(conn)?
        .into_iter()
        .map(RecipeSummary::from)
        .collect())
}

pub fn count_author_recipes(conn: &mut database::Connection, author: UserId) -> QueryResult<i64> {
    use database::schema::recipes::dsl::*;

    Ok(recipes.filter(author_id.eq(author)).count().get_result(conn)?)
}

#[cfg(test)]
pub struct Fixture {
    pub conn: database::Connection,
    pub author: UserId,
    pub breakfast: TagId,
    pub dinner: TagId,
    pub flour: IngredientId,
    pub egg: IngredientId,
    pub sugar: IngredientId,
}

#[cfg(test)]
impl Fixture {
    pub fn new() -> Self {
        let mut conn = database::test_connection();
        let author = users::test_user(&mut conn, "author");
        let breakfast = tags::test_tag(&mut conn, "breakfast");
        let dinner = tags::test_tag(&mut conn, "dinner");
        let flour = ingredients::add_ingredient(&mut conn, "flour", "g").unwrap().id;
        let egg = ingredients::add_ingredient(&mut conn, "egg", "pcs").unwrap().id;
        let sugar = ingredients::add_ingredient(&mut conn, "sugar", "g").unwrap().id;
        Self {
            conn,
            author,
            breakfast,
            dinner,
            flour,
            egg,
            sugar,
        }
    }

    pub fn input(&self, name: &str, ingredients: Vec<(IngredientId, i32)>) -> RecipeInput {
        RecipeInput {
            name: name.into(),
            text: format!("how to make {name}"),
            cooking_time: 10,
            image: None,
            tags: vec![self.breakfast],
            ingredients,
        }
    }

    pub fn recipe(&mut self, name: &str, ingredients: Vec<(IngredientId, i32)>) -> RecipeId {
        let input = self.input(name, ingredients);
        create_recipe(&mut self.conn, self.author, &input).unwrap()
    }
}

#[test]
fn create_and_get_recipe() {
    let mut f = Fixture::new();
    let mut input = f.input("pancakes", vec![(f.flour, 200), (f.egg, 2)]);
    input.tags = vec![f.dinner, f.breakfast, f.dinner];
    input.image = Some(images::encode_image(images::TINY_PNG));
    let id = create_recipe(&mut f.conn, f.author, &input).unwrap();

    let view = get_recipe(&mut f.conn, None, id).unwrap();
    assert_eq!(view.name, "pancakes");
    assert_eq!(view.author.id, f.author);
    assert_eq!(
        view.tags.iter().map(|t| t.id).collect::<Vec<_>>(),
        vec![f.breakfast, f.dinner]
    );
    assert_eq!(
        view.ingredients,
        vec![
            RecipeIngredientView {
                id: f.flour,
                name: "flour".into(),
                measurement_unit: "g".into(),
                amount: 200,
            },
            RecipeIngredientView {
                id: f.egg,
                name: "egg".into(),
                measurement_unit: "pcs".into(),
                amount: 2,
            },
        ]
    );
    assert_eq!(view.image, input.image);
    assert!(!view.is_favorited);
    assert!(!view.is_in_shopping_cart);
}

#[test]
fn invalid_recipes_are_rejected() {
    let mut f = Fixture::new();
    let good = f.input("pancakes", vec![(f.flour, 200)]);

    let mut no_tags = good.clone();
    no_tags.tags.clear();
    let mut unknown_tag = good.clone();
    unknown_tag.tags.push(TagId::from(99));
    let mut duplicate = good.clone();
    duplicate.ingredients.push((f.flour, 5));
    let mut zero_amount = good.clone();
    zero_amount.ingredients = vec![(f.egg, 0)];
    let mut unknown_ingredient = good.clone();
    unknown_ingredient.ingredients.push((IngredientId::from(99), 1));
    let mut too_quick = good.clone();
    too_quick.cooking_time = 0;
    let mut bad_image = good.clone();
    bad_image.image = Some("not an image".into());

    for input in [
        no_tags,
        unknown_tag,
        duplicate,
        zero_amount,
        unknown_ingredient,
        too_quick,
        bad_image,
    ] {
        let e = create_recipe(&mut f.conn, f.author, &input).unwrap_err();
        assert!(matches!(e, QueryError::Validation(_)), "{e}");
    }
    assert!(list_recipes(&mut f.conn, None, &RecipeFilter::default())
        .unwrap()
        .is_empty());
}

#[test]
fn unknown_author() {
    let mut f = Fixture::new();
    let input = f.input("pancakes", vec![(f.flour, 200)]);
    let e = create_recipe(&mut f.conn, UserId::from(99), &input).unwrap_err();
    assert!(matches!(e, QueryError::NotFound(_)), "{e}");
}

#[test]
fn update_replaces_tags_and_ingredients() {
    let mut f = Fixture::new();
    let mut input = f.input("pancakes", vec![(f.flour, 200), (f.egg, 2)]);
    input.image = Some(images::encode_image(images::TINY_PNG));
    let id = create_recipe(&mut f.conn, f.author, &input).unwrap();

    let mut update = f.input("sweet pancakes", vec![(f.sugar, 30)]);
    update.tags = vec![f.dinner];
    update_recipe(&mut f.conn, id, &update).unwrap();

    let view = get_recipe(&mut f.conn, None, id).unwrap();
    assert_eq!(view.name, "sweet pancakes");
    assert_eq!(view.tags.iter().map(|t| t.id).collect::<Vec<_>>(), vec![f.dinner]);
    assert_eq!(
        view.ingredients.iter().map(|i| (i.id, i.amount)).collect::<Vec<_>>(),
        vec![(f.sugar, 30)]
    );
    // no new image given, so the old one stays
    assert_eq!(view.image, input.image);
}

#[test]
fn failed_update_changes_nothing() {
    let mut f = Fixture::new();
    let id = f.recipe("pancakes", vec![(f.flour, 200)]);

    let mut update = f.input("renamed", vec![(f.egg, 1)]);
    update.tags = vec![TagId::from(99)];
    update_recipe(&mut f.conn, id, &update).unwrap_err();

    let view = get_recipe(&mut f.conn, None, id).unwrap();
    assert_eq!(view.name, "pancakes");
    assert_eq!(view.ingredients.len(), 1);
}

#[test]
fn delete_recipe_cascades() {
    use database::schema::recipe_ingredients;

    let mut f = Fixture::new();
    let id = f.recipe("pancakes", vec![(f.flour, 200)]);
    delete_recipe(&mut f.conn, id).unwrap();

    let rows: i64 = recipe_ingredients::table
        .count()
        .get_result(&mut f.conn)
        .unwrap();
    assert_eq!(rows, 0);
    let e = get_recipe(&mut f.conn, None, id).unwrap_err();
    assert!(matches!(e, QueryError::NotFound(_)));
    let e = delete_recipe(&mut f.conn, id).unwrap_err();
    assert!(matches!(e, QueryError::NotFound(_)));
}

#[test]
fn list_recipes_newest_first_with_filters() {
    let mut f = Fixture::new();
    let pancakes = f.recipe("pancakes", vec![(f.flour, 200)]);
    let omelette = f.recipe("omelette", vec![(f.egg, 3)]);
    let mut input = f.input("pie", vec![(f.sugar, 100)]);
    input.tags = vec![f.dinner];
    let pie = create_recipe(&mut f.conn, f.author, &input).unwrap();

    let other = users::test_user(&mut f.conn, "other");
    let mut input = f.input("cookies", vec![(f.sugar, 50)]);
    input.tags = vec![f.dinner];
    let cookies = create_recipe(&mut f.conn, other, &input).unwrap();

    let ids = |conn: &mut database::Connection, viewer, filter: RecipeFilter| {
        list_recipes(conn, viewer, &filter)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect::<Vec<_>>()
    };

    assert_eq!(
        ids(&mut f.conn, None, RecipeFilter::default()),
        vec![cookies, pie, omelette, pancakes]
    );
    let by_tag = RecipeFilter {
        tags: vec!["dinner".into()],
        ..Default::default()
    };
    assert_eq!(ids(&mut f.conn, None, by_tag), vec![cookies, pie]);
    let by_any_tag = RecipeFilter {
        tags: vec!["dinner".into(), "breakfast".into()],
        ..Default::default()
    };
    assert_eq!(ids(&mut f.conn, None, by_any_tag).len(), 4);
    let by_author = RecipeFilter {
        author: Some(other),
        ..Default::default()
    };
    assert_eq!(ids(&mut f.conn, None, by_author), vec![cookies]);

    crate::favorites::add_favorite(&mut f.conn, other, omelette).unwrap();
    crate::cart::add_to_cart(&mut f.conn, other, pie).unwrap();
    let favorited = RecipeFilter {
        is_favorited: true,
        ..Default::default()
    };
    assert_eq!(ids(&mut f.conn, Some(other), favorited.clone()), vec![omelette]);
    // without a viewer the flag is ignored
    assert_eq!(ids(&mut f.conn, None, favorited).len(), 4);
    let in_cart = RecipeFilter {
        is_in_shopping_cart: true,
        ..Default::default()
    };
    assert_eq!(ids(&mut f.conn, Some(other), in_cart), vec![pie]);

    let view = get_recipe(&mut f.conn, Some(other), omelette).unwrap();
    assert!(view.is_favorited);
    assert!(!view.is_in_shopping_cart);
}

#[test]
fn author_recipes_with_limit() {
    let mut f = Fixture::new();
    f.recipe("a", vec![(f.flour, 1)]);
    let b = f.recipe("b", vec![(f.flour, 1)]);
    let c = f.recipe("c", vec![(f.flour, 1)]);

    let summaries = author_recipes(&mut f.conn, f.author, Some(2)).unwrap();
    assert_eq!(summaries.iter().map(|s| s.id).collect::<Vec<_>>(), vec![c, b]);
    assert_eq!(count_author_recipes(&mut f.conn, f.author).unwrap(), 3);
}
