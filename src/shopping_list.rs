// Copyright 2023 Remi Bernotavicius

use crate::database;
use crate::database::models::UserId;
use crate::query::QueryResult;
use derive_more::Display;
use diesel::deserialize::Queryable;
use diesel::ExpressionMethods as _;
use diesel::JoinOnDsl as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One ingredient row of a recipe sitting in somebody's cart.
#[derive(Queryable, Debug, Clone, PartialEq, Eq)]
pub struct CartItem {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[cfg(test)]
impl CartItem {
    pub fn new(name: impl Into<String>, measurement_unit: impl Into<String>, amount: i32) -> Self {
        Self {
            name: name.into(),
            measurement_unit: measurement_unit.into(),
            amount,
        }
    }
}

#[derive(Display, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display("- {name}: {amount} {measurement_unit}")]
pub struct ShoppingListLine {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i64,
}

/// Sums amounts per (name, measurement unit). Both parts of the key compare
/// byte for byte. Lines come out sorted by that key.
pub fn aggregate(items: impl IntoIterator<Item = CartItem>) -> Vec<ShoppingListLine> {
    let mut totals: BTreeMap<(String, String), i64> = BTreeMap::new();
    for item in items {
        *totals
            .entry((item.name, item.measurement_unit))
            .or_default() += i64::from(item.amount);
    }
    totals
        .into_iter()
        .map(|((name, measurement_unit), amount)| ShoppingListLine {
            name,
            measurement_unit,
            amount,
        })
        .collect()
}

/// Every ingredient row of every recipe in `user`'s cart.
pub fn cart_ingredients(
    conn: &mut database::Connection,
    user: UserId,
) -> QueryResult<Vec<CartItem>> {
    use database::schema::{ingredients, recipe_ingredients, shopping_cart};

    Ok(recipe_ingredients::table
        .inner_join(ingredients::table)
        .inner_join(
            shopping_cart::table.on(shopping_cart::recipe_id.eq(recipe_ingredients::recipe_id)),
        )
        .filter(shopping_cart::user_id.eq(user))
        .select((
            ingredients::name,
            ingredients::measurement_unit,
            recipe_ingredients::amount,
        ))
        .load::<CartItem>(conn)?)
}

pub fn shopping_list(
    conn: &mut database::Connection,
    user: UserId,
) -> QueryResult<Vec<ShoppingListLine>> {
    let items = cart_ingredients(conn, user)?;
    log::debug!("user {user} has {} ingredient rows in their cart", items.len());
    Ok(aggregate(items))
}

/// The shopping list as a downloadable plain-text attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShoppingListDocument {
    pub file_name: &'static str,
    pub content_type: &'static str,
    pub body: String,
}

impl ShoppingListDocument {
    pub const FILE_NAME: &'static str = "shopping_list.txt";
    pub const CONTENT_TYPE: &'static str = "text/plain";

    pub fn new(lines: &[ShoppingListLine]) -> Self {
        Self {
            file_name: Self::FILE_NAME,
            content_type: Self::CONTENT_TYPE,
            body: lines.iter().map(|line| format!("{line}\n")).collect(),
        }
    }

    pub fn content_disposition(&self) -> String {
        format!("attachment; filename={}", self.file_name)
    }

    pub fn save(&self, dir: &Path) -> crate::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name);
        std::fs::write(&path, &self.body)?;
        Ok(path)
    }
}

pub fn download_shopping_list(
    conn: &mut database::Connection,
    user: UserId,
) -> QueryResult<ShoppingListDocument> {
    let lines = shopping_list(conn, user)?;
    log::info!("compiled shopping list of {} lines for user {user}", lines.len());
    Ok(ShoppingListDocument::new(&lines))
}

/// Writes the user's shopping list into `dir` and optionally hands it to the
/// desktop's default viewer.
pub fn generate_and_open_shopping_list(
    conn: &mut database::Connection,
    user: UserId,
    dir: &Path,
    open_after: bool,
) -> crate::Result<PathBuf> {
    let document = download_shopping_list(conn, user)?;
    let path = document.save(dir)?;
    log::info!(
        "wrote {} ({}, {})",
        path.display(),
        document.content_type,
        document.content_disposition()
    );
    if open_after {
        open::that(&path)?;
    }
    Ok(path)
}

#[cfg(test)]
fn line(name: &str, measurement_unit: &str, amount: i64) -> ShoppingListLine {
    ShoppingListLine {
        name: name.into(),
        measurement_unit: measurement_unit.into(),
        amount,
    }
}

#[test]
fn empty_cart_gives_empty_list() {
    assert!(aggregate(Vec::<CartItem>::new()).is_empty());
    assert_eq!(ShoppingListDocument::new(&[]).body, "");
}

#[test]
fn amounts_are_summed_per_ingredient() {
    let items = vec![
        CartItem::new("flour", "g", 200),
        CartItem::new("egg", "pcs", 2),
        CartItem::new("flour", "g", 150),
        CartItem::new("sugar", "g", 50),
    ];
    assert_eq!(
        aggregate(items),
        vec![
            line("egg", "pcs", 2),
            line("flour", "g", 350),
            line("sugar", "g", 50),
        ]
    );
}

#[test]
fn same_name_different_unit_stays_separate() {
    let items = vec![
        CartItem::new("milk", "ml", 200),
        CartItem::new("milk", "g", 30),
        CartItem::new("Milk", "ml", 1),
        CartItem::new("milk", "ml", 100),
    ];
    assert_eq!(
        aggregate(items),
        vec![
            line("Milk", "ml", 1),
            line("milk", "g", 30),
            line("milk", "ml", 300),
        ]
    );
}

#[test]
fn duplicate_rows_are_still_summed() {
    let items = vec![CartItem::new("salt", "pinch", 1), CartItem::new("salt", "pinch", 1)];
    assert_eq!(aggregate(items), vec![line("salt", "pinch", 2)]);
}

#[test]
fn large_amounts_do_not_overflow() {
    let items = vec![
        CartItem::new("water", "ml", i32::MAX),
        CartItem::new("water", "ml", i32::MAX),
    ];
    assert_eq!(
        aggregate(items),
        vec![line("water", "ml", 2 * i64::from(i32::MAX))]
    );
}

#[test]
fn aggregation_is_order_independent() {
    let items = vec![
        CartItem::new("flour", "g", 200),
        CartItem::new("egg", "pcs", 2),
        CartItem::new("flour", "g", 150),
        CartItem::new("sugar", "g", 50),
        CartItem::new("egg", "pcs", 3),
    ];
    let expected = aggregate(items.clone());
    for rotation in 0..items.len() {
        let mut permuted = items.clone();
        permuted.rotate_left(rotation);
        assert_eq!(aggregate(permuted.clone()), expected);
        permuted.reverse();
        assert_eq!(aggregate(permuted), expected);
    }
}

#[test]
fn totals_match_hand_counted_sums() {
    use maplit::btreemap;

    let items = vec![
        CartItem::new("rice", "g", 300),
        CartItem::new("onion", "pcs", 1),
        CartItem::new("rice", "g", 200),
        CartItem::new("onion", "pcs", 2),
        CartItem::new("stock", "ml", 750),
        CartItem::new("onion", "g", 40),
    ];
    let totals: BTreeMap<(String, String), i64> = aggregate(items)
        .into_iter()
        .map(|l| ((l.name, l.measurement_unit), l.amount))
        .collect();
    assert_eq!(
        totals,
        btreemap! {
            ("onion".into(), "g".into()) => 40,
            ("onion".into(), "pcs".into()) => 3,
            ("rice".into(), "g".into()) => 500,
            ("stock".into(), "ml".into()) => 750,
        }
    );
}

#[test]
fn lines_render_as_text() {
    assert_eq!(line("flour", "g", 350).to_string(), "- flour: 350 g");

    let document = ShoppingListDocument::new(&[line("egg", "pcs", 2), line("flour", "g", 350)]);
    assert_eq!(document.body, "- egg: 2 pcs\n- flour: 350 g\n");
    assert_eq!(document.file_name, "shopping_list.txt");
    assert_eq!(document.content_type, "text/plain");
    assert_eq!(
        document.content_disposition(),
        "attachment; filename=shopping_list.txt"
    );
}

#[test]
fn shopping_list_from_cart() {
    use crate::{cart, ingredients, recipes, users};

    let mut f = recipes::Fixture::new();
    let a = f.recipe("a", vec![(f.flour, 200), (f.egg, 2)]);
    let b = f.recipe("b", vec![(f.flour, 150), (f.sugar, 50)]);
    let flour_kg = ingredients::add_ingredient(&mut f.conn, "flour", "kg").unwrap().id;
    let c = f.recipe("c", vec![(flour_kg, 1)]);
    let not_in_cart = f.recipe("d", vec![(f.egg, 12)]);
    let shopper = users::test_user(&mut f.conn, "shopper");

    assert!(shopping_list(&mut f.conn, shopper).unwrap().is_empty());

    for recipe in [a, b, c] {
        cart::add_to_cart(&mut f.conn, shopper, recipe).unwrap();
    }
    cart::add_to_cart(&mut f.conn, f.author, not_in_cart).unwrap();

    assert_eq!(
        shopping_list(&mut f.conn, shopper).unwrap(),
        vec![
            line("egg", "pcs", 2),
            line("flour", "g", 350),
            line("flour", "kg", 1),
            line("sugar", "g", 50),
        ]
    );

    cart::remove_from_cart(&mut f.conn, shopper, b).unwrap();
    let document = download_shopping_list(&mut f.conn, shopper).unwrap();
    assert_eq!(document.body, "- egg: 2 pcs\n- flour: 200 g\n- flour: 1 kg\n");
}

#[test]
fn distinct_ingredient_rows_with_same_name_and_unit_merge() {
    use crate::{cart, ingredients};

    let mut f = crate::recipes::Fixture::new();
    let other_flour = ingredients::add_ingredient(&mut f.conn, "flour", "g")
        .unwrap()
        .id;
    assert_ne!(other_flour, f.flour);

    let a = f.recipe("a", vec![(f.flour, 100), (other_flour, 200)]);
    cart::add_to_cart(&mut f.conn, f.author, a).unwrap();

    assert_eq!(cart_ingredients(&mut f.conn, f.author).unwrap().len(), 2);
    assert_eq!(
        shopping_list(&mut f.conn, f.author).unwrap(),
        vec![line("flour", "g", 300)]
    );
    let document = download_shopping_list(&mut f.conn, f.author).unwrap();
    assert_eq!(document.body, "- flour: 300 g\n");
}

#[test]
fn saved_document_lands_in_dir() {
    let mut f = crate::recipes::Fixture::new();
    let a = f.recipe("a", vec![(f.sugar, 5)]);
    crate::cart::add_to_cart(&mut f.conn, f.author, a).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path =
        generate_and_open_shopping_list(&mut f.conn, f.author, &dir.path().join("lists"), false)
            .unwrap();
    assert_eq!(path.file_name().unwrap(), "shopping_list.txt");
    assert_eq!(std::fs::read_to_string(path).unwrap(), "- sugar: 5 g\n");
}
