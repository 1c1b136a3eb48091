use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use sqlweave_core::ParamMap;
use sqlweave_mapper::MapperRegistry;

/// SqlWeave - dynamic SQL mapper rendering
#[derive(Parser)]
#[command(name = "sqlweave")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the statements defined in a mapper file
    List {
        /// Path to the mapper XML file
        mapper: PathBuf,
    },

    /// Render a statement against a set of parameters
    Render {
        /// Path to the mapper XML file
        mapper: PathBuf,

        /// Namespaced statement id, e.g. user.findByIds
        id: String,

        /// Parameters as inline JSON, e.g. '{"ids": [1, 2, 3]}'
        #[arg(short, long)]
        params: Option<String>,

        /// Read parameters from a JSON file instead
        #[arg(short = 'f', long, conflicts_with = "params")]
        params_file: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List { mapper } => list_command(&mapper, cli.verbose),
        Commands::Render {
            mapper,
            id,
            params,
            params_file,
        } => render_command(&mapper, &id, params.as_deref(), params_file.as_deref(), cli.verbose),
    }
}

fn load_registry(mapper: &std::path::Path, verbose: bool) -> Result<MapperRegistry> {
    if verbose {
        eprintln!("{} {}", "Loading mapper:".cyan(), mapper.display());
    }

    let mut registry = MapperRegistry::new();
    registry
        .register_file(mapper)
        .with_context(|| format!("failed to load mapper {}", mapper.display()))?;

    if verbose {
        eprintln!("{} {} statements", "Registered".cyan(), registry.len());
    }

    Ok(registry)
}

/// List command - show every statement id with its command kind
fn list_command(mapper: &std::path::Path, verbose: bool) -> Result<()> {
    let registry = load_registry(mapper, verbose)?;

    for id in registry.ids() {
        let statement = registry.get(id)?;
        let kind = if statement.is_dynamic() { "dynamic" } else { "static" };
        println!(
            "{}  {}  {}",
            format!("{:6}", statement.command.as_str()).green(),
            format!("{kind:7}").yellow(),
            id
        );
    }

    Ok(())
}

/// Render command - build a statement's SQL and print it with the bound
/// parameter map
fn render_command(
    mapper: &std::path::Path,
    id: &str,
    params: Option<&str>,
    params_file: Option<&std::path::Path>,
    verbose: bool,
) -> Result<()> {
    let registry = load_registry(mapper, verbose)?;
    let statement = registry.get(id)?;

    let params: ParamMap = match (params, params_file) {
        (Some(json), _) => serde_json::from_str(json).context("invalid --params JSON")?,
        (None, Some(path)) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&json)
                .with_context(|| format!("invalid JSON in {}", path.display()))?
        }
        (None, None) => ParamMap::new(),
    };

    if verbose {
        eprintln!("{} {} with {} parameters", "Rendering".cyan(), id, params.len());
    }

    let bound = statement.build_sql(&params);

    println!("{}", bound.sql);

    if !bound.params.is_empty() {
        let mut names: Vec<&String> = bound.params.keys().collect();
        names.sort_unstable();

        eprintln!();
        eprintln!("{}", "Parameters:".bold());
        for name in names {
            eprintln!("  @{} = {}", name.green(), bound.params[name]);
        }
    }

    Ok(())
}
