//! lorelink CLI tool
//!
//! Command-line interface over a lorelink SQLite database.
//!
//! ## Commands
//!
//! - `init`: create the database and write a config file
//! - `put <body>`: create or update an entity from a text file
//! - `preview <id>` / `apply <id>`: suggest references for one entity
//! - `apply-world <world>`: apply suggestions across a whole world
//! - `resync <id>`: rebuild the edges of an entity from its stored body
//! - `backlinks <id>` / `links <id>`: inspect the link graph
//! - `tagged <id>`: list legacy `#tag` mentions of an entity
//! - `delete <id>`: remove an entity and the edges it sources
//! - `serve`: run the HTTP API
//!
//! Results are printed as JSON. Settings come from the `[service]` table of the config file;
//! `--database` and `--bind` override it.

use clap::{Parser, Subcommand};
use lorelink::{
    config::{ConfigProvider, ServiceConfig, TomlConfigProvider},
    db::{db_init, SqliteStore},
    graph::LinkGraphSynchronizer,
    properties::{Entity, EntityId, WorldId},
    store::LinkStore,
    suggest::{ReferenceSuggestionService, SuggestionMode, SuggestionVariant},
    LinkGraphError,
};
use serde::Serialize;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};

mod server;

#[derive(Parser)]
#[command(name = "lorelink")]
#[command(author, version, about = "Find entity mentions in campaign notes and keep the link graph in sync", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = "lorelink.toml")]
    config: PathBuf,

    /// Database file (overrides the config file)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and write the config file if it does not exist yet
    Init {
        /// Do not maintain legacy hash-tag edges
        #[arg(long)]
        no_tags: bool,
    },

    /// Create or update an entity, reading its body from a file
    Put {
        /// File holding the body text
        body: PathBuf,

        /// World the entity belongs to
        #[arg(long)]
        world: WorldId,

        /// Entity title
        #[arg(long)]
        title: String,

        /// Existing entity to update (a new id is generated if omitted)
        #[arg(long)]
        id: Option<EntityId>,

        /// Alternative name; may be repeated
        #[arg(long = "alias")]
        aliases: Vec<String>,

        /// Sync the edges of the entity after writing it
        #[arg(long)]
        sync: bool,
    },

    /// Show the references that would be inserted, without writing anything
    Preview {
        id: EntityId,

        #[arg(long, default_value_t = SuggestionVariant::Link)]
        variant: SuggestionVariant,
    },

    /// Insert suggested references and sync the link graph
    Apply {
        id: EntityId,

        #[arg(long, default_value_t = SuggestionVariant::Link)]
        variant: SuggestionVariant,
    },

    /// Suggest references for every entity of a world
    ApplyWorld {
        world: WorldId,

        #[arg(long, default_value_t = SuggestionVariant::Link)]
        variant: SuggestionVariant,

        /// Only report what would change
        #[arg(long)]
        dry_run: bool,
    },

    /// Rebuild an entity's edges from its stored body
    Resync { id: EntityId },

    /// List the entities that link to an entity
    Backlinks { id: EntityId },

    /// List an entity's outgoing links
    Links { id: EntityId },

    /// List the entities carrying the tag an entity's title slugs to
    Tagged { id: EntityId },

    /// Delete an entity together with its outgoing edges
    Delete { id: EntityId },

    /// Serve the HTTP API
    Serve {
        /// Address to bind (overrides the config file)
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<(), LinkGraphError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn open_service(
    config: &ServiceConfig,
) -> Result<ReferenceSuggestionService<SqliteStore>, LinkGraphError> {
    let store = db_init(&config.database).await?;
    let synchronizer = if config.sync_tags {
        LinkGraphSynchronizer::new(store)
    } else {
        LinkGraphSynchronizer::new(store).without_tags()
    };
    Ok(ReferenceSuggestionService::new(synchronizer))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let Cli {
        config: config_path,
        database,
        command,
    } = Cli::parse();

    let provider = TomlConfigProvider::new(config_path);
    let mut config = provider.get_service()?;
    if let Some(database) = database {
        config.database = database;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        match command {
            Commands::Init { no_tags } => {
                if no_tags {
                    config.sync_tags = false;
                }
                let store = db_init(&config.database).await?;
                let (entities, links, tags) = store.counts().await?;
                if !provider.path().exists() {
                    provider.set_service(config.clone())?;
                    println!("✓ Config written: {}", provider.path().display());
                }
                println!(
                    "✓ Database ready: {} ({} entities, {} links, {} tags)",
                    config.database.display(),
                    entities,
                    links,
                    tags
                );
            }

            Commands::Put {
                body,
                world,
                title,
                id,
                aliases,
                sync,
            } => {
                let text = tokio::fs::read_to_string(&body).await?;
                let service = open_service(&config).await?;
                let mut entity = Entity::new(world, &title).with_body(&text);
                entity.aliases = aliases;
                if let Some(id) = id {
                    entity.id = id;
                }
                service.store().put_entity(&entity).await?;
                println!("{}", entity.id);
                if sync {
                    print_json(&service.resync(entity.id).await?)?;
                }
            }

            Commands::Preview { id, variant } => {
                let service = open_service(&config).await?;
                print_json(&service.suggest(id, variant, SuggestionMode::Preview).await?)?;
            }

            Commands::Apply { id, variant } => {
                let service = open_service(&config).await?;
                print_json(&service.suggest(id, variant, SuggestionMode::Apply).await?)?;
            }

            Commands::ApplyWorld {
                world,
                variant,
                dry_run,
            } => {
                let service = open_service(&config).await?;
                let report = if dry_run {
                    service
                        .suggest_world(world, variant, SuggestionMode::Preview)
                        .await?
                } else {
                    service.apply_world(world, variant).await?
                };
                print_json(&report)?;
            }

            Commands::Resync { id } => {
                let service = open_service(&config).await?;
                print_json(&service.resync(id).await?)?;
            }

            Commands::Backlinks { id } => {
                let service = open_service(&config).await?;
                print_json(&service.store().backlinks(id).await?)?;
            }

            Commands::Links { id } => {
                let service = open_service(&config).await?;
                print_json(&service.store().outgoing(id).await?)?;
            }

            Commands::Tagged { id } => {
                let service = open_service(&config).await?;
                print_json(&service.store().tag_backlinks(id).await?)?;
            }

            Commands::Delete { id } => {
                let service = open_service(&config).await?;
                if !service.store().delete_entity(id).await? {
                    return Err(LinkGraphError::NotFound(format!("entity {id}")).into());
                }
                println!("✓ Deleted {id}");
            }

            Commands::Serve { bind } => {
                let addr = bind.unwrap_or(config.bind);
                let service = Arc::new(open_service(&config).await?);
                server::serve(service, addr, shutdown_signal()).await?;
            }
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    })?;

    Ok(())
}
