// Copyright 2023 Remi Bernotavicius

use serde::Deserialize;
use std::fmt;
use std::path::Path;

#[derive(Debug)]
pub enum DecodeError {
    Io(std::io::Error),
    Json(serde_json::Error),
    EmptyField { index: usize, field: &'static str },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "decode error: {e}"),
            Self::Json(e) => write!(f, "decode error: {e}"),
            Self::EmptyField { index, field } => {
                write!(f, "decode error: entry {index} has an empty {field:?}")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<std::io::Error> for DecodeError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

type Result<T> = std::result::Result<T, DecodeError>;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Ingredient {
    pub name: String,
    pub measurement_unit: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub color: String,
    pub slug: String,
}

fn check_fields<'a>(
    index: usize,
    fields: impl IntoIterator<Item = (&'static str, &'a str)>,
) -> Result<()> {
    for (field, value) in fields {
        if value.trim().is_empty() {
            return Err(DecodeError::EmptyField { index, field });
        }
    }
    Ok(())
}

fn decode_ingredients(contents: &str) -> Result<Vec<Ingredient>> {
    let ingredients: Vec<Ingredient> = serde_json::from_str(contents)?;
    for (index, i) in ingredients.iter().enumerate() {
        check_fields(
            index,
            [("name", &i.name[..]), ("measurement_unit", &i.measurement_unit[..])],
        )?;
    }
    Ok(ingredients)
}

fn decode_tags(contents: &str) -> Result<Vec<Tag>> {
    let tags: Vec<Tag> = serde_json::from_str(contents)?;
    for (index, t) in tags.iter().enumerate() {
        check_fields(
            index,
            [("name", &t.name[..]), ("color", &t.color[..]), ("slug", &t.slug[..])],
        )?;
    }
    Ok(tags)
}

pub fn decode_ingredients_from_path(path: impl AsRef<Path>) -> Result<Vec<Ingredient>> {
    decode_ingredients(&std::fs::read_to_string(path)?)
}

pub fn decode_tags_from_path(path: impl AsRef<Path>) -> Result<Vec<Tag>> {
    decode_tags(&std::fs::read_to_string(path)?)
}

#[test]
fn ingredients() {
    let decoded = decode_ingredients(
        r#"[
            {"name": "абрикосовое варенье", "measurement_unit": "г"},
            {"name": "flour", "measurement_unit": "g"}
        ]"#,
    )
    .unwrap();
    assert_eq!(
        decoded,
        vec![
            Ingredient {
                name: "абрикосовое варенье".into(),
                measurement_unit: "г".into(),
            },
            Ingredient {
                name: "flour".into(),
                measurement_unit: "g".into(),
            },
        ]
    );
}

#[test]
fn ingredients_with_missing_fields() {
    let e = decode_ingredients(r#"[{"name": "flour"}]"#).unwrap_err();
    assert!(matches!(e, DecodeError::Json(_)), "{e}");

    let e = decode_ingredients(r#"[{"name": "flour", "measurement_unit": " "}]"#).unwrap_err();
    assert_eq!(
        e.to_string(),
        "decode error: entry 0 has an empty \"measurement_unit\""
    );
}

#[test]
fn tags() {
    let decoded =
        decode_tags(r##"[{"name": "Breakfast", "color": "#E26C2D", "slug": "breakfast"}]"##)
            .unwrap();
    assert_eq!(decoded.len(), 1);
    assert_eq!(decoded[0].slug, "breakfast");
}
