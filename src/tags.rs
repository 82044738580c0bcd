// Copyright 2023 Remi Bernotavicius

use crate::database;
use crate::database::models::{NewTag, Tag, TagId};
use crate::query::{require_non_empty, QueryError, QueryResult};
use diesel::BoolExpressionMethods as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use std::collections::BTreeSet;

fn validate_color(color: &str) -> QueryResult<()> {
    let valid = color
        .strip_prefix('#')
        .is_some_and(|hex| hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()));
    if !valid {
        return Err(QueryError::validation(format!(
            "color {color:?} must look like #RRGGBB"
        )));
    }
    Ok(())
}

fn validate_slug(slug: &str) -> QueryResult<()> {
    let valid = !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(QueryError::validation(format!(
            "slug {slug:?} may only contain letters, digits, '-' and '_'"
        )));
    }
    Ok(())
}

pub fn create_tag(
    conn: &mut database::Connection,
    new_name: &str,
    new_color: &str,
    new_slug: &str,
) -> QueryResult<Tag> {
    use database::schema::tags::dsl::*;
    use diesel::insert_into;

    require_non_empty("tag name", new_name)?;
    validate_color(new_color)?;
    validate_slug(new_slug)?;

    let clashes: i64 = tags
        .filter(
            name.eq(new_name)
                .or(color.eq(new_color))
                .or(slug.eq(new_slug)),
        )
        .count()
        .get_result(conn)?;
    if clashes > 0 {
        return Err(QueryError::already_exists(format!(
            "tag with name {new_name:?}, color {new_color:?} or slug {new_slug:?}"
        )));
    }

    let tag = insert_into(tags)
        .values(NewTag {
            name: new_name,
            color: new_color,
            slug: new_slug,
        })
        .returning(Tag::as_returning())
        .get_result(conn)?;
    log::info!("created tag {} ({})", tag.id, tag.slug);
    Ok(tag)
}

pub fn list_tags(conn: &mut database::Connection) -> QueryResult<Vec<Tag>> {
    use database::schema::tags::dsl::*;

    Ok(tags.select(Tag::as_select()).order(id.desc()).load(conn)?)
}

/// Deduplicates `wanted` and checks that every tag exists.
pub fn resolve_tags(
    conn: &mut database::Connection,
    wanted: &[TagId],
) -> QueryResult<BTreeSet<TagId>> {
    use database::schema::tags::dsl::*;

    let wanted: BTreeSet<TagId> = wanted.iter().copied().collect();
    let existing: BTreeSet<TagId> = tags
        .select(id)
        .filter(id.eq_any(wanted.iter().copied()))
        .load::<TagId>(conn)?
        .into_iter()
        .collect();
    if let Some(missing) = wanted.difference(&existing).next() {
        return Err(QueryError::validation(format!("tag {missing} does not exist")));
    }
    Ok(wanted)
}

#[cfg(test)]
pub fn test_tag(conn: &mut database::Connection, slug: &str) -> TagId {
    let n: i64 = {
        use database::schema::tags::dsl::*;
        tags.count().get_result(conn).unwrap()
    };
    create_tag(conn, slug, &format!("#{:06x}", n + 1), slug)
        .unwrap()
        .id
}

#[test]
fn create_and_list_tags() {
    let mut conn = database::test_connection();
    let breakfast = create_tag(&mut conn, "Breakfast", "#E26C2D", "breakfast").unwrap();
    let dinner = create_tag(&mut conn, "Dinner", "#49B64E", "dinner").unwrap();

    let listed = list_tags(&mut conn).unwrap();
    assert_eq!(listed, vec![dinner, breakfast]);
}

#[test]
fn tag_fields_must_be_unique() {
    let mut conn = database::test_connection();
    create_tag(&mut conn, "Breakfast", "#E26C2D", "breakfast").unwrap();

    for (n, c, s) in [
        ("Breakfast", "#000000", "other"),
        ("Other", "#E26C2D", "other"),
        ("Other", "#000000", "breakfast"),
    ] {
        let e = create_tag(&mut conn, n, c, s).unwrap_err();
        assert!(matches!(e, QueryError::AlreadyExists(_)), "{e}");
    }
}

#[test]
fn tag_color_and_slug_are_validated() {
    let mut conn = database::test_connection();
    for (c, s) in [
        ("E26C2D", "ok"),
        ("#E26C2", "ok"),
        ("#GGGGGG", "ok"),
        ("#E26C2D", "no spaces"),
    ] {
        let e = create_tag(&mut conn, "Tag", c, s).unwrap_err();
        assert!(matches!(e, QueryError::Validation(_)), "{e}");
    }
}

#[test]
fn resolve_tags_dedups_and_checks_existence() {
    let mut conn = database::test_connection();
    let a = test_tag(&mut conn, "a");
    let b = test_tag(&mut conn, "b");

    let resolved = resolve_tags(&mut conn, &[b, a, b]).unwrap();
    assert_eq!(resolved.into_iter().collect::<Vec<_>>(), vec![a, b]);

    let e = resolve_tags(&mut conn, &[a, TagId::from(99)]).unwrap_err();
    assert_eq!(e.to_string(), "invalid input: tag 99 does not exist");
}
