// Copyright 2023 Remi Bernotavicius

use diesel::associations::{Associations, Identifiable};
use diesel::deserialize::Queryable;
use diesel::expression::Selectable;
use diesel::prelude::Insertable;
use diesel_derive_newtype::DieselNewType;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(
            DieselNewType, Serialize, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Copy, Clone,
        )]
        #[serde(transparent)]
        pub struct $name(i32);

        impl From<i32> for $name {
            fn from(id: i32) -> Self {
                Self(id)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(UserId);
id_type!(TagId);
id_type!(IngredientId);
id_type!(RecipeId);
id_type!(RecipeIngredientId);

#[derive(Queryable, Selectable, Identifiable, Clone, Debug, PartialEq, Eq)]
#[diesel(table_name = crate::database::schema::users)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::users)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub username: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Clone, Debug, PartialEq, Eq)]
#[diesel(table_name = crate::database::schema::tags)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub color: String,
    pub slug: String,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::tags)]
pub struct NewTag<'a> {
    pub name: &'a str,
    pub color: &'a str,
    pub slug: &'a str,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Clone, Debug, PartialEq, Eq)]
#[diesel(table_name = crate::database::schema::ingredients)]
pub struct Ingredient {
    pub id: IngredientId,
    pub name: String,
    pub measurement_unit: String,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::ingredients)]
pub struct NewIngredient<'a> {
    pub name: &'a str,
    pub measurement_unit: &'a str,
}

#[derive(Associations, Queryable, Selectable, Identifiable, Clone, Debug)]
#[diesel(belongs_to(User, foreign_key = author_id))]
#[diesel(table_name = crate::database::schema::recipes)]
pub struct Recipe {
    pub id: RecipeId,
    pub author_id: UserId,
    pub name: String,
    pub image: Option<Vec<u8>>,
    pub text: String,
    pub cooking_time: i32,
    pub pub_date: chrono::NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::recipes)]
pub struct NewRecipe<'a> {
    pub author_id: UserId,
    pub name: &'a str,
    pub image: Option<&'a [u8]>,
    pub text: &'a str,
    pub cooking_time: i32,
    pub pub_date: chrono::NaiveDateTime,
}

#[derive(Associations, Queryable, Selectable, Identifiable, Clone, Debug)]
#[diesel(belongs_to(Recipe))]
#[diesel(belongs_to(Ingredient))]
#[diesel(table_name = crate::database::schema::recipe_ingredients)]
pub struct RecipeIngredient {
    pub id: RecipeIngredientId,
    pub recipe_id: RecipeId,
    pub ingredient_id: IngredientId,
    pub amount: i32,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::recipe_ingredients)]
pub struct NewRecipeIngredient {
    pub recipe_id: RecipeId,
    pub ingredient_id: IngredientId,
    pub amount: i32,
}

#[derive(Associations, Queryable, Selectable, Identifiable, Insertable, Clone, Debug)]
#[diesel(belongs_to(Recipe))]
#[diesel(belongs_to(Tag))]
#[diesel(primary_key(recipe_id, tag_id))]
#[diesel(table_name = crate::database::schema::recipe_tags)]
pub struct RecipeTag {
    pub recipe_id: RecipeId,
    pub tag_id: TagId,
}
