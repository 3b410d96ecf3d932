//! CLI entry and dispatch.

use anyhow::{Context, Result};
use clap::Parser;
use loboshop_core::config::{self, paths};
use loboshop_core::logging;
use loboshop_types::{ProductCondition, ProductFilters};

mod commands;

#[derive(Parser)]
#[command(name = "loboshop")]
#[command(version)]
#[command(about = "LoboShop storefront client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Print raw JSON instead of tables
    #[arg(long, global = true)]
    json: bool,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    #[command(flatten)]
    Session(SessionCommands),
}

/// Commands that run against the API with the saved session.
#[derive(clap::Subcommand)]
enum SessionCommands {
    /// Log in and save the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "LOBOSHOP_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and log in with it
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "LOBOSHOP_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        phone: Option<String>,
    },
    /// Clear the saved session
    Logout,
    /// Show the logged-in user
    Whoami {
        /// Fetch the profile from the server first
        #[arg(long)]
        refresh: bool,
    },
    /// Browse categories
    Categories {
        #[command(subcommand)]
        command: CategoryCommands,
    },
    /// Browse and manage products
    Products {
        #[command(subcommand)]
        command: ProductCommands,
    },
}

#[derive(clap::Subcommand)]
enum CategoryCommands {
    /// Lists all categories
    List,
    /// Shows one category
    Show {
        #[arg(value_name = "CATEGORY_ID")]
        id: String,
    },
}

#[derive(clap::Subcommand)]
enum ProductCommands {
    /// Lists products, newest first
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        limit: u32,
        /// Category ID to filter by
        #[arg(long)]
        category: Option<String>,
        /// Free-text search
        #[arg(long)]
        search: Option<String>,
    },
    /// Shows one product
    Show {
        #[arg(value_name = "PRODUCT_ID")]
        id: String,
    },
    /// Lists your own listings
    Mine,
    /// Publishes a new listing
    Create {
        #[command(flatten)]
        fields: ProductFields,
    },
    /// Updates one of your listings
    Update {
        #[arg(value_name = "PRODUCT_ID")]
        id: String,
        #[command(flatten)]
        fields: ProductFields,
    },
    /// Deletes one of your listings
    Delete {
        #[arg(value_name = "PRODUCT_ID")]
        id: String,
    },
    /// Removes an image from one of your listings
    DeleteImage {
        #[arg(value_name = "PRODUCT_ID")]
        id: String,
        #[arg(value_name = "IMAGE_ID")]
        image_id: String,
    },
}

/// Listing fields shared by create and update.
#[derive(clap::Args, Debug, Clone, Default)]
struct ProductFields {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    price: Option<f64>,
    /// nuevo, como_nuevo or usado
    #[arg(long)]
    condition: Option<ProductCondition>,
    /// Category ID
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    stock: Option<u32>,
    /// Image file to upload (repeatable)
    #[arg(long = "image", value_name = "PATH")]
    images: Vec<String>,
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
    /// Print the effective configuration
    Show,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = config::Config::load().context("load config")?;

    let _log_guard = match logging::init(&paths::logs_dir()) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {e:#}");
            None
        }
    };

    let Cli { command, json } = cli;

    match command {
        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
            ConfigCommands::Show => commands::config::show(&config),
        },
        Commands::Session(command) => {
            let app = commands::App::connect(&config).await?;
            let result = dispatch_session(&app, command, json).await;
            app.session.settle().await;
            result
        }
    }
}

async fn dispatch_session(app: &commands::App, command: SessionCommands, json: bool) -> Result<()> {
    match command {
        SessionCommands::Login { email, password } => {
            commands::auth::login(app, &email, &password).await
        }
        SessionCommands::Register {
            name,
            email,
            password,
            phone,
        } => commands::auth::register(app, name, email, password, phone).await,
        SessionCommands::Logout => commands::auth::logout(app).await,
        SessionCommands::Whoami { refresh } => commands::auth::whoami(app, refresh, json).await,

        SessionCommands::Categories { command } => match command {
            CategoryCommands::List => commands::catalog::list_categories(app, json).await,
            CategoryCommands::Show { id } => commands::catalog::show_category(app, &id, json).await,
        },

        SessionCommands::Products { command } => match command {
            ProductCommands::List {
                page,
                limit,
                category,
                search,
            } => {
                let filters = ProductFilters {
                    page,
                    limit,
                    ..ProductFilters::default()
                }
                .with_category(category.as_deref())
                .with_search(search.as_deref());
                commands::products::list(app, &filters, json).await
            }
            ProductCommands::Show { id } => commands::products::show(app, &id, json).await,
            ProductCommands::Mine => commands::products::mine(app, json).await,
            ProductCommands::Create { fields } => commands::products::create(app, fields.into()).await,
            ProductCommands::Update { id, fields } => {
                commands::products::update(app, &id, fields.into()).await
            }
            ProductCommands::Delete { id } => commands::products::delete(app, &id).await,
            ProductCommands::DeleteImage { id, image_id } => {
                commands::products::delete_image(app, &id, &image_id).await
            }
        },
    }
}

impl From<ProductFields> for commands::products::ProductInput {
    fn from(fields: ProductFields) -> Self {
        Self {
            name: fields.name,
            description: fields.description,
            price: fields.price,
            condition: fields.condition,
            category: fields.category,
            stock: fields.stock,
            images: fields.images,
        }
    }
}
