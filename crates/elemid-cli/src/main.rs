use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use elemid_core::{
    ElementDescriptor, FormatEncoder, Registry, RegistryConfig, TimeRange,
};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod render;

/// elemid CLI - stable identifiers for UI elements
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML or JSON)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Database path, overrides the config file and ELEMID_DB
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Output JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the descriptor(s) in a JSON file
    Register {
        /// File holding one descriptor or an array of them
        file: PathBuf,

        /// Attach every registered element under this parent
        #[arg(long)]
        parent: Option<String>,

        /// Also create an auto alias for each new element
        #[arg(long)]
        alias: bool,
    },

    /// Show one element by id or alias
    Get { key: String },

    /// Find elements by name, type or namespace
    Find {
        #[arg(long, conflicts_with_all = ["element_type", "namespace"])]
        name: Option<String>,

        #[arg(long = "type", conflicts_with = "namespace")]
        element_type: Option<String>,

        #[arg(long)]
        namespace: Option<String>,
    },

    /// Break an id into its grammar components
    Inspect { id: String },

    /// Manage aliases
    Alias {
        #[command(subcommand)]
        action: AliasCommand,
    },

    /// Print the subtree under an element
    Tree { key: String },

    /// Move an element under a new parent, or detach it
    Move {
        key: String,

        /// New parent; omit to make the element a root
        #[arg(long)]
        to: Option<String>,

        #[arg(long)]
        position: Option<i64>,
    },

    /// Delete an element and everything under it
    Delete { key: String },

    /// Validate hierarchy integrity
    Check,

    /// Run a collision scan
    Scan {
        /// Keep scanning on the configured interval until Ctrl+C
        #[arg(long)]
        watch: bool,
    },

    /// Usage report
    Report {
        /// Only the last N hours
        #[arg(long)]
        hours: Option<u64>,
    },

    /// Most or least used elements
    Top {
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,

        #[arg(long)]
        least: bool,
    },

    /// Remap ids between two app versions
    Remap {
        namespace: String,
        old_version: String,
        new_version: String,

        /// Descriptors of the old version
        old: PathBuf,

        /// Descriptors of the new version
        new: PathBuf,
    },

    /// Store row counts
    Stats,
}

#[derive(Subcommand)]
enum AliasCommand {
    /// Bind an alias to an element
    Set { id: String, alias: String },
    /// Resolve an alias to its id
    Resolve { alias: String },
    /// List the aliases of an element
    List { id: String },
    /// Remove an alias
    Remove { alias: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    tracing::debug!(db = %config.database_path.display(), "opening registry");
    let registry = Registry::open(config).context("opening registry")?;
    run(&cli, &registry).await
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .init();
}

/// Config file, then `ELEMID_DB`, then `--db`
fn load_config(cli: &Cli) -> anyhow::Result<RegistryConfig> {
    let mut config = match &cli.config {
        Some(path) => RegistryConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RegistryConfig::default().with_database("elemid.db"),
    };
    if let Ok(db) = std::env::var("ELEMID_DB") {
        config = config.with_database(db);
    }
    if let Some(db) = &cli.db {
        config = config.with_database(db.clone());
    }
    Ok(config)
}

fn read_descriptors(path: &Path) -> anyhow::Result<Vec<ElementDescriptor>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("parsing {}", path.display()))?;
    let descriptors = match value {
        serde_json::Value::Array(_) => serde_json::from_value(value)?,
        other => vec![serde_json::from_value(other)?],
    };
    Ok(descriptors)
}

/// Accept either an alias or an id
fn resolve_key(registry: &Registry, key: &str) -> anyhow::Result<String> {
    registry
        .lookup(key)?
        .map(|entity| entity.id)
        .with_context(|| format!("no element with id or alias '{}'", key))
}

async fn run(cli: &Cli, registry: &Registry) -> anyhow::Result<()> {
    let json = cli.json;

    match &cli.command {
        Commands::Register { file, parent, alias } => {
            let parent = parent.as_deref().map(|p| resolve_key(registry, p)).transpose()?;
            let descriptors = read_descriptors(file)?;
            tracing::info!(file = %file.display(), count = descriptors.len(), "registering descriptors");
            let mut registered = Vec::new();
            for descriptor in descriptors {
                let outcome = match &parent {
                    Some(parent) => registry.register_under(parent, &descriptor, None)?,
                    None => registry.register_detailed(&descriptor)?,
                };
                let alias = match (*alias, outcome.created) {
                    (true, true) => Some(registry.create_auto_alias(outcome.id())?.alias),
                    _ => registry.primary_alias(outcome.id())?.map(|a| a.alias),
                };
                if !json {
                    render::registered(&outcome, alias.as_deref());
                }
                registered.push(serde_json::json!({
                    "id": outcome.id(),
                    "created": outcome.created,
                    "alias": alias,
                }));
            }
            if json {
                render::json(&registered)?;
            }
        }

        Commands::Get { key } => match registry.lookup(key)? {
            Some(entity) if json => render::json(&entity)?,
            Some(entity) => {
                let aliases = registry.aliases_for(&entity.id)?;
                let analytics = registry.analytics().record(&entity.id)?;
                render::entity(&entity, &aliases, analytics.as_ref());
            }
            None => anyhow::bail!("no element with id or alias '{}'", key),
        },

        Commands::Find { name, element_type, namespace } => {
            let found = match (name, element_type, namespace) {
                (Some(name), _, _) => registry.find_by_name(name)?,
                (_, Some(ty), _) => registry.find_by_type(ty)?,
                (_, _, Some(ns)) => registry.find_by_namespace(ns)?,
                _ => anyhow::bail!("one of --name, --type or --namespace is required"),
            };
            if json {
                render::json(&found)?;
            } else {
                render::entity_list(&found);
            }
        }

        Commands::Inspect { id } => match FormatEncoder::parse(id) {
            Ok(parsed) if json => render::json(&parsed)?,
            Ok(parsed) => render::parsed(id, &parsed),
            Err(e) => anyhow::bail!("{}: {}", id, e),
        },

        Commands::Alias { action } => match action {
            AliasCommand::Set { id, alias } => {
                let id = resolve_key(registry, id)?;
                let alias = registry.set_alias(&id, alias)?;
                if json {
                    render::json(&alias)?;
                } else {
                    println!("{} {} → {}", "✓".green(), alias.alias.bold(), alias.target_id);
                }
            }
            AliasCommand::Resolve { alias } => match registry.resolve(alias)? {
                Some(id) if json => render::json(&serde_json::json!({ "alias": alias, "id": id }))?,
                Some(id) => println!("{}", id),
                None => anyhow::bail!("alias '{}' is not bound", alias),
            },
            AliasCommand::List { id } => {
                let id = resolve_key(registry, id)?;
                let aliases = registry.aliases_for(&id)?;
                if json {
                    render::json(&aliases)?;
                } else {
                    for alias in &aliases {
                        let marker = if alias.is_primary { "*" } else { " " };
                        println!("{} {}", marker.yellow(), alias.alias);
                    }
                }
            }
            AliasCommand::Remove { alias } => {
                if !registry.remove_alias(alias)? {
                    anyhow::bail!("alias '{}' is not bound", alias);
                }
                if !json {
                    println!("{} removed {}", "✓".green(), alias);
                }
            }
        },

        Commands::Tree { key } => {
            let root = resolve_key(registry, key)?;
            if json {
                render::json(&render::tree_json(registry, &root)?)?;
            } else {
                render::tree(registry, &root)?;
            }
        }

        Commands::Move { key, to, position } => {
            let id = resolve_key(registry, key)?;
            let to = to.as_deref().map(|p| resolve_key(registry, p)).transpose()?;
            let edge = registry.move_element(&id, to.as_deref(), *position)?;
            if json {
                render::json(&edge)?;
            } else {
                match edge {
                    Some(edge) => println!(
                        "{} {} now under {} at position {}",
                        "✓".green(),
                        edge.child_id,
                        edge.parent_id,
                        edge.position
                    ),
                    None => println!("{} {} is now a root", "✓".green(), id),
                }
            }
        }

        Commands::Delete { key } => {
            let id = resolve_key(registry, key)?;
            let outcome = registry.delete_detailed(&id)?;
            tracing::info!(%id, removed = outcome.removed.len(), "deleted subtree");
            if json {
                render::json(&outcome)?;
            } else {
                println!(
                    "{} deleted {} element(s), {} row(s)",
                    "✓".green(),
                    outcome.removed.len(),
                    outcome.rows
                );
            }
        }

        Commands::Check => {
            let report = registry.validate_integrity()?;
            if json {
                render::json(&report)?;
            } else {
                render::integrity(&report);
            }
            if !report.is_clean() {
                std::process::exit(1);
            }
        }

        Commands::Scan { watch: false } => {
            let events = registry.scan_now();
            if json {
                render::json(&events)?;
            } else {
                events.iter().for_each(render::monitor_event);
            }
        }

        Commands::Scan { watch: true } => {
            let handle = registry.start_monitor()?;
            tracing::debug!("watching collision monitor");
            let mut events = Box::pin(handle.events());
            eprintln!(
                "{} scanning every {}s, Ctrl+C to stop",
                "●".cyan(),
                registry.config().monitor.interval_secs
            );
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    event = events.next() => match event {
                        Some(event) if json => println!("{}", serde_json::to_string(&event)?),
                        Some(event) => render::monitor_event(&event),
                        None => break,
                    }
                }
            }
            handle.shutdown().await;
        }

        Commands::Report { hours } => {
            let range = hours.map(|h| TimeRange::last(Duration::from_secs(h * 3600)));
            let report = registry.usage_report(range)?;
            if json {
                render::json(&report)?;
            } else {
                render::usage(&report);
            }
        }

        Commands::Top { limit, least } => {
            let entries = if *least {
                registry.analytics().least_used(*limit)?
            } else {
                registry.analytics().most_used(*limit)?
            };
            if json {
                render::json(&entries)?;
            } else {
                for (rank, entry) in entries.iter().enumerate() {
                    println!("{:>3}. {:>8}  {}", rank + 1, entry.accesses, entry.id);
                }
            }
        }

        Commands::Remap { namespace, old_version, new_version, old, new } => {
            let old = read_descriptors(old)?;
            let new = read_descriptors(new)?;
            let report = registry.remap(namespace, old_version, new_version, &old, &new)?;
            tracing::info!(
                %namespace,
                matched = report.matched().count(),
                orphaned = report.orphaned().count(),
                "remap finished"
            );
            if json {
                render::json(&report)?;
            } else {
                render::remap(&report);
            }
        }

        Commands::Stats => {
            let stats = registry.stats()?;
            if json {
                render::json(&stats)?;
            } else if let Some(map) = stats.as_object() {
                for (key, value) in map {
                    println!("{:<22} {}", key, value);
                }
            }
        }
    }

    Ok(())
}
