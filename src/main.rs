// Copyright 2023 Remi Bernotavicius

use base64::Engine as _;
use clap::Parser;
use clap::Subcommand;
use database::models::{IngredientId, RecipeId, TagId, UserId};
use serde::Serialize;
use std::path::PathBuf;

mod cart;
mod database;
mod favorites;
mod images;
mod import;
mod ingredients;
mod query;
mod recipes;
mod shopping_list;
mod subscriptions;
mod tags;
mod users;

type Error = Box<dyn std::error::Error + Send + Sync + 'static>;
type Result<T> = std::result::Result<T, Error>;

#[derive(Parser, Debug)]
#[command(version, about = "Share recipes and compile shopping lists")]
struct Args {
    /// Use this database instead of the one in the user data directory.
    #[arg(long, global = true, env = "RECIPE_SHARE_DATABASE")]
    database: Option<PathBuf>,

    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(clap::Args, Debug)]
struct RecipeArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    text: String,
    /// Minutes.
    #[arg(long)]
    cooking_time: i32,
    /// Image file to attach to the recipe.
    #[arg(long)]
    image: Option<PathBuf>,
    #[arg(long = "tag", required = true)]
    tags: Vec<TagId>,
    /// `INGREDIENT_ID:AMOUNT`, repeatable.
    #[arg(long = "ingredient", required = true, value_parser = parse_ingredient_amount)]
    ingredients: Vec<(IngredientId, i32)>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    CreateUser {
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
    },
    ListUsers {
        #[arg(long)]
        user: Option<UserId>,
    },
    ShowUser {
        id: UserId,
        #[arg(long)]
        user: Option<UserId>,
    },
    CreateTag {
        name: String,
        color: String,
        slug: String,
    },
    ListTags,
    AddIngredient {
        name: String,
        measurement_unit: String,
    },
    ListIngredients {
        /// Only ingredients whose name starts with this.
        #[arg(long)]
        name: Option<String>,
    },
    ImportIngredients {
        path: PathBuf,
    },
    ImportTags {
        path: PathBuf,
    },
    CreateRecipe {
        #[arg(long)]
        user: UserId,
        #[command(flatten)]
        recipe: RecipeArgs,
    },
    UpdateRecipe {
        id: RecipeId,
        #[command(flatten)]
        recipe: RecipeArgs,
    },
    DeleteRecipe {
        id: RecipeId,
    },
    ShowRecipe {
        id: RecipeId,
        #[arg(long)]
        user: Option<UserId>,
    },
    ListRecipes {
        #[arg(long)]
        user: Option<UserId>,
        /// Tag slug, repeatable; recipes with any of them match.
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        author: Option<UserId>,
        #[arg(long)]
        is_favorited: bool,
        #[arg(long)]
        is_in_shopping_cart: bool,
    },
    Favorite {
        #[arg(long)]
        user: UserId,
        recipe: RecipeId,
    },
    Unfavorite {
        #[arg(long)]
        user: UserId,
        recipe: RecipeId,
    },
    AddToCart {
        #[arg(long)]
        user: UserId,
        recipe: RecipeId,
    },
    RemoveFromCart {
        #[arg(long)]
        user: UserId,
        recipe: RecipeId,
    },
    Subscribe {
        #[arg(long)]
        user: UserId,
        author: UserId,
        #[arg(long, value_parser = clap::value_parser!(i64).range(0..))]
        recipes_limit: Option<i64>,
    },
    Unsubscribe {
        #[arg(long)]
        user: UserId,
        author: UserId,
    },
    Subscriptions {
        #[arg(long)]
        user: UserId,
        #[arg(long, value_parser = clap::value_parser!(i64).range(0..))]
        recipes_limit: Option<i64>,
    },
    DownloadShoppingList {
        #[arg(long)]
        user: UserId,
        /// Directory to write `shopping_list.txt` into.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Open the list once written.
        #[arg(long)]
        open: bool,
    },
}

fn parse_ingredient_amount(s: &str) -> std::result::Result<(IngredientId, i32), String> {
    let (id, amount) = s
        .split_once(':')
        .ok_or_else(|| format!("expected INGREDIENT_ID:AMOUNT, got {s:?}"))?;
    let id = id
        .parse::<IngredientId>()
        .map_err(|e| format!("bad ingredient id {id:?}: {e}"))?;
    let amount = amount
        .parse::<i32>()
        .map_err(|e| format!("bad amount {amount:?}: {e}"))?;
    Ok((id, amount))
}

impl RecipeArgs {
    fn into_input(self) -> Result<recipes::RecipeInput> {
        let image = self
            .image
            .map(std::fs::read)
            .transpose()?
            .map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes));
        Ok(recipes::RecipeInput {
            name: self.name,
            text: self.text,
            cooking_time: self.cooking_time,
            image,
            tags: self.tags,
            ingredients: self.ingredients,
        })
    }
}

/// This is where the database and other user-data lives on-disk. On Linux it should be like:
/// `~/.local/share/recipe_share/`
fn data_path() -> Result<PathBuf> {
    let dirs = directories::BaseDirs::new().ok_or("failed to get user home directory")?;
    let path = dirs.data_dir().join("recipe_share");
    std::fs::create_dir_all(&path)?;
    Ok(path)
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(conn: &mut database::Connection, commands: Commands) -> Result<()> {
    use Commands::*;

    match commands {
        CreateUser {
            email,
            username,
            first_name,
            last_name,
        } => {
            let user = users::create_user(conn, &email, &username, &first_name, &last_name)?;
            print_json(&users::get_user(conn, None, user.id)?)?;
        }
        ListUsers { user } => print_json(&users::list_users(conn, user)?)?,
        ShowUser { id, user } => print_json(&users::get_user(conn, user, id)?)?,
        CreateTag { name, color, slug } => {
            print_json(&tags::create_tag(conn, &name, &color, &slug)?)?
        }
        ListTags => print_json(&tags::list_tags(conn)?)?,
        AddIngredient {
            name,
            measurement_unit,
        } => print_json(&ingredients::add_ingredient(conn, &name, &measurement_unit)?)?,
        ListIngredients { name } => {
            print_json(&ingredients::list_ingredients(conn, name.as_deref())?)?
        }
        ImportIngredients { path } => import::import_ingredients(conn, path)?,
        ImportTags { path } => import::import_tags(conn, path)?,
        CreateRecipe { user, recipe } => {
            let id = recipes::create_recipe(conn, user, &recipe.into_input()?)?;
            print_json(&recipes::get_recipe(conn, Some(user), id)?)?;
        }
        UpdateRecipe { id, recipe } => {
            recipes::update_recipe(conn, id, &recipe.into_input()?)?;
            print_json(&recipes::get_recipe(conn, None, id)?)?;
        }
        DeleteRecipe { id } => recipes::delete_recipe(conn, id)?,
        ShowRecipe { id, user } => print_json(&recipes::get_recipe(conn, user, id)?)?,
        ListRecipes {
            user,
            tags,
            author,
            is_favorited,
            is_in_shopping_cart,
        } => {
            let filter = recipes::RecipeFilter {
                tags,
                author,
                is_favorited,
                is_in_shopping_cart,
            };
            print_json(&recipes::list_recipes(conn, user, &filter)?)?;
        }
        Favorite { user, recipe } => print_json(&favorites::add_favorite(conn, user, recipe)?)?,
        Unfavorite { user, recipe } => favorites::remove_favorite(conn, user, recipe)?,
        AddToCart { user, recipe } => print_json(&cart::add_to_cart(conn, user, recipe)?)?,
        RemoveFromCart { user, recipe } => cart::remove_from_cart(conn, user, recipe)?,
        Subscribe {
            user,
            author,
            recipes_limit,
        } => print_json(&subscriptions::subscribe(conn, user, author, recipes_limit)?)?,
        Unsubscribe { user, author } => subscriptions::unsubscribe(conn, user, author)?,
        Subscriptions {
            user,
            recipes_limit,
        } => print_json(&subscriptions::subscriptions(conn, user, recipes_limit)?)?,
        DownloadShoppingList { user, output, open } => {
            let dir = match output {
                Some(dir) => dir,
                None => data_path()?.join("shopping-lists"),
            };
            let path = shopping_list::generate_and_open_shopping_list(conn, user, &dir, open)?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    simple_logger::SimpleLogger::new()
        .with_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .env()
        .init()?;

    let database_path = match args.database {
        Some(path) => path,
        None => data_path()?.join("data.sqlite"),
    };
    log::debug!("using database {}", database_path.display());
    let mut conn = database::establish_connection(database_path)?;
    run(&mut conn, args.commands)
}

#[test]
fn parse_ingredient_amounts() {
    assert_eq!(
        parse_ingredient_amount("3:200").unwrap(),
        (IngredientId::from(3), 200)
    );
    assert!(parse_ingredient_amount("3").is_err());
    assert!(parse_ingredient_amount("x:1").is_err());
    assert!(parse_ingredient_amount("3:lots").is_err());
}

#[test]
fn cli_arguments() {
    use clap::CommandFactory as _;

    Args::command().debug_assert();

    let args = Args::try_parse_from([
        "recipe-share",
        "create-recipe",
        "--user",
        "1",
        "--name",
        "pancakes",
        "--text",
        "mix and fry",
        "--cooking-time",
        "15",
        "--tag",
        "2",
        "--ingredient",
        "3:200",
        "--ingredient",
        "4:2",
    ])
    .unwrap();
    let Commands::CreateRecipe { user, recipe } = args.commands else {
        panic!("expected create-recipe");
    };
    assert_eq!(user, UserId::from(1));
    assert_eq!(recipe.tags, vec![TagId::from(2)]);
    assert_eq!(
        recipe.ingredients,
        vec![(IngredientId::from(3), 200), (IngredientId::from(4), 2)]
    );
}

#[test]
fn negative_recipes_limit_is_rejected() {
    for command in ["subscriptions", "subscribe"] {
        let mut argv = vec!["recipe-share", command, "--user", "1"];
        if command == "subscribe" {
            argv.push("2");
        }

        let mut limited = argv.clone();
        limited.extend(["--recipes-limit", "0"]);
        Args::try_parse_from(limited).unwrap();

        argv.extend(["--recipes-limit=-1"]);
        Args::try_parse_from(argv).unwrap_err();
    }
}

#[test]
fn run_commands_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let mut conn = database::test_connection();

    let commands = [
        vec![
            "create-user",
            "--email",
            "a@example.com",
            "--username",
            "a",
            "--first-name",
            "A",
            "--last-name",
            "B",
        ],
        vec!["create-tag", "Dinner", "#49B64E", "dinner"],
        vec!["add-ingredient", "flour", "g"],
        vec![
            "create-recipe",
            "--user",
            "1",
            "--name",
            "bread",
            "--text",
            "bake",
            "--cooking-time",
            "60",
            "--tag",
            "1",
            "--ingredient",
            "1:500",
        ],
        vec!["add-to-cart", "--user", "1", "1"],
    ];
    for command in commands {
        let args = Args::try_parse_from(std::iter::once("recipe-share").chain(command)).unwrap();
        run(&mut conn, args.commands).unwrap();
    }

    let output = dir.path().to_str().unwrap();
    let args = Args::try_parse_from([
        "recipe-share",
        "download-shopping-list",
        "--user",
        "1",
        "--output",
        output,
    ])
    .unwrap();
    run(&mut conn, args.commands).unwrap();
    assert_eq!(
        std::fs::read_to_string(dir.path().join("shopping_list.txt")).unwrap(),
        "- flour: 500 g\n"
    );
}
