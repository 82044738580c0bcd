// Copyright 2023 Remi Bernotavicius

use crate::database;
use crate::ingredients;
use crate::tags;
use crate::Result;
use diesel::Connection as _;
use std::path::Path;

mod json;

const BATCH_SIZE: usize = 100;

pub struct IngredientImporter {
    pending: Vec<json::Ingredient>,

    num_imported: usize,
    num_skipped: usize,
    total_num_ingredients: usize,
}

impl IngredientImporter {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let mut pending = json::decode_ingredients_from_path(path)?;
        // import_one pops batches off the end
        pending.reverse();
        let total_num_ingredients = pending.len();

        Ok(Self {
            pending,
            num_imported: 0,
            num_skipped: 0,
            total_num_ingredients,
        })
    }

    pub fn done(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn num_imported(&self) -> usize {
        self.num_imported
    }

    pub fn num_skipped(&self) -> usize {
        self.num_skipped
    }

    pub fn percent_done(&self) -> f32 {
        if self.total_num_ingredients == 0 {
            return 1.0;
        }
        (self.num_imported + self.num_skipped) as f32 / self.total_num_ingredients as f32
    }

    pub fn import_one(&mut self, conn: &mut database::Connection) -> Result<()> {
        let split_point = self.pending.len().saturating_sub(BATCH_SIZE);
        let batch = self.pending.split_off(split_point);

        let (imported, skipped) = conn.transaction(|conn| {
            let mut imported = 0;
            let mut skipped = 0;
            for i in batch.iter().rev() {
                if ingredients::find_ingredient(conn, &i.name, &i.measurement_unit)?.is_some() {
                    skipped += 1;
                    continue;
                }
                ingredients::add_ingredient(conn, &i.name, &i.measurement_unit)?;
                imported += 1;
            }
            Ok::<_, crate::query::QueryError>((imported, skipped))
        })?;
        self.num_imported += imported;
        self.num_skipped += skipped;
        Ok(())
    }
}

pub fn import_ingredients(conn: &mut database::Connection, path: impl AsRef<Path>) -> Result<()> {
    let mut importer = IngredientImporter::new(path)?;

    while !importer.done() {
        importer.import_one(conn)?;
        log::info!("imported {:.0}%", importer.percent_done() * 100.0);
    }
    log::info!(
        "imported {} ingredients, skipped {} already present",
        importer.num_imported(),
        importer.num_skipped()
    );

    Ok(())
}

pub fn import_tags(conn: &mut database::Connection, path: impl AsRef<Path>) -> Result<()> {
    let decoded = json::decode_tags_from_path(path)?;

    conn.transaction(|conn| {
        for t in &decoded {
            tags::create_tag(conn, &t.name, &t.color, &t.slug)?;
        }
        Ok::<_, crate::query::QueryError>(())
    })?;
    log::info!("imported {} tags", decoded.len());

    Ok(())
}

#[cfg(test)]
fn write_file(contents: &str) -> tempfile::NamedTempFile {
    use std::io::Write as _;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn import_ingredients_skips_existing() {
    let mut conn = database::test_connection();
    ingredients::add_ingredient(&mut conn, "flour", "g").unwrap();

    let file = write_file(
        r#"[
            {"name": "flour", "measurement_unit": "g"},
            {"name": "flour", "measurement_unit": "kg"},
            {"name": "egg", "measurement_unit": "pcs"},
            {"name": "egg", "measurement_unit": "pcs"}
        ]"#,
    );
    let mut importer = IngredientImporter::new(file.path()).unwrap();
    while !importer.done() {
        importer.import_one(&mut conn).unwrap();
    }
    assert_eq!(importer.num_imported(), 2);
    assert_eq!(importer.num_skipped(), 2);
    assert_eq!(importer.percent_done(), 1.0);

    let all: Vec<_> = ingredients::list_ingredients(&mut conn, None)
        .unwrap()
        .into_iter()
        .map(|i| (i.name, i.measurement_unit))
        .collect();
    assert_eq!(
        all,
        vec![
            ("egg".into(), "pcs".into()),
            ("flour".into(), "g".into()),
            ("flour".into(), "kg".into()),
        ]
    );
}

#[test]
fn import_many_ingredients_in_batches() {
    let mut conn = database::test_connection();
    let entries: Vec<String> = (0..250)
        .map(|n| format!(r#"{{"name": "ingredient {n:03}", "measurement_unit": "g"}}"#))
        .collect();
    let file = write_file(&format!("[{}]", entries.join(",")));

    let mut importer = IngredientImporter::new(file.path()).unwrap();
    importer.import_one(&mut conn).unwrap();
    assert_eq!(importer.num_imported(), BATCH_SIZE);
    assert!(!importer.done());

    import_ingredients(&mut conn, file.path()).unwrap();
    let all = ingredients::list_ingredients(&mut conn, None).unwrap();
    assert_eq!(all.len(), 250);
    assert_eq!(all[0].name, "ingredient 000");
}

#[test]
fn import_tags_is_all_or_nothing() {
    let mut conn = database::test_connection();
    let file = write_file(
        r##"[
            {"name": "Breakfast", "color": "#E26C2D", "slug": "breakfast"},
            {"name": "Lunch", "color": "#49B64E", "slug": "lunch"}
        ]"##,
    );
    import_tags(&mut conn, file.path()).unwrap();
    assert_eq!(tags::list_tags(&mut conn).unwrap().len(), 2);

    let file = write_file(
        r##"[
            {"name": "Dinner", "color": "#8775D2", "slug": "dinner"},
            {"name": "Lunch", "color": "#000000", "slug": "lunch-2"}
        ]"##,
    );
    import_tags(&mut conn, file.path()).unwrap_err();
    assert_eq!(tags::list_tags(&mut conn).unwrap().len(), 2);
}
