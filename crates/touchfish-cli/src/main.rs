//! TouchFish command-line tools
//!
//! Runs recipes outside the daemon, which is handy while writing one:
//! - `recipes`: list what discovery finds, and what it skipped
//! - `run`: execute a recipe once and print its result
//! - `check`: validate a single bundle

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use touchfish_core::config::{Config, Directories};
use touchfish_core::dispatch::{ActionDispatcher, WindowController};
use touchfish_core::recipe::{self, RecipeManifest, RecipeRegistry};
use touchfish_core::{ExecutionEngine, NavigationStack};
use touchfish_daemon::Collaborators;
use touchfish_types::ExecuteResult;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// TouchFish recipe tools
#[derive(Parser)]
#[command(name = "touchfish")]
#[command(about = "TouchFish - run and inspect recipes")]
#[command(version)]
#[command(after_help = "\
Examples:
  touchfish recipes                     List installed recipes
  touchfish run weather berlin          Run the weather recipe for \"berlin\"
  touchfish run links --tap 0           Run, then perform the first item's actions
  touchfish check ./my-recipe           Validate a recipe bundle
")]
struct Cli {
    /// Use this directory for config and recipes instead of the XDG locations
    #[arg(long, global = true, value_name = "DIR")]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List discovered recipes and any bundles that failed to load
    Recipes,

    /// Execute a recipe once and print the result as JSON
    Run {
        /// Recipe ID to run
        recipe: String,

        /// Query text passed to the recipe
        #[arg(default_value = "")]
        query: String,

        /// Perform the actions of the item at this index after running
        #[arg(long, value_name = "N")]
        tap: Option<usize>,

        /// Override the configured execution timeout
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,
    },

    /// Validate a recipe bundle directory
    Check {
        /// Bundle directory containing recipe.json
        bundle: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("touchfish=warn")),
        )
        .init();

    let dirs = match cli.base_dir {
        Some(base) => Directories::with_base(base),
        None => Directories::new(),
    };

    match cli.command {
        Commands::Recipes => run_recipes(&dirs),
        Commands::Run {
            recipe,
            query,
            tap,
            timeout_ms,
        } => run_recipe(&dirs, &recipe, &query, tap, timeout_ms).await,
        Commands::Check { bundle } => run_check(&bundle),
    }
}

fn run_recipes(dirs: &Directories) -> Result<()> {
    let config = Config::load_or_default(&dirs.config_file);
    let report = recipe::discover(&config.recipe_search_path(dirs));

    if report.recipes.is_empty() {
        println!("No recipes found.");
    } else {
        println!("\nInstalled Recipes:\n");
        for summary in report.recipes.summaries() {
            println!("  {:<16} {} ({})", summary.id, summary.name, summary.bundle_id);
            if let Some(desc) = summary.description.as_deref().filter(|d| !d.is_empty()) {
                println!("                   {desc}");
            }
        }
    }

    if !report.errors.is_empty() {
        println!("\nSkipped:\n");
        for error in &report.errors {
            println!("  {error}");
        }
    }

    println!();
    Ok(())
}

async fn run_recipe(
    dirs: &Directories,
    recipe_id: &str,
    query: &str,
    tap: Option<usize>,
    timeout_ms: Option<u64>,
) -> Result<()> {
    let config = Config::load_or_default(&dirs.config_file);
    let mut execution = config.execution.clone();
    if let Some(ms) = timeout_ms {
        execution.timeout_ms = ms;
    }

    let search_path = config.recipe_search_path(dirs);
    let registry = Arc::new(RecipeRegistry::load(&search_path));
    debug!(
        "Loaded {} recipes from {:?}",
        registry.snapshot().len(),
        search_path
    );
    let navigation = Arc::new(NavigationStack::new(Arc::clone(&registry)));
    navigation
        .go_to_recipe(Some(recipe_id))
        .with_context(|| format!("Cannot run '{recipe_id}'. Try `touchfish recipes`"))?;

    let engine = ExecutionEngine::new(registry, execution);
    let output = engine
        .execute(recipe_id, query)
        .await
        .context("Execution was superseded")?;

    println!("{}", serde_json::to_string_pretty(&output.result)?);

    let Some(index) = tap else {
        return Ok(());
    };
    tap_item(&output.result, index, recipe_id, navigation, &config)
}

fn tap_item(
    result: &ExecuteResult,
    index: usize,
    recipe_id: &str,
    navigation: Arc<NavigationStack>,
    config: &Config,
) -> Result<()> {
    let Some(item) = result.visible_items().get(index) else {
        bail!(
            "No item at index {index} ({} visible)",
            result.visible_items().len()
        );
    };

    let collaborators = Collaborators::system();
    let dispatcher = ActionDispatcher::new(
        navigation,
        Arc::new(TerminalWindow),
        collaborators.clipboard,
        collaborators.opener,
    )
    .with_browser(config.actions.browser.clone());

    let report = dispatcher.dispatch(item, recipe_id);
    for (action, error) in &report.failures {
        warn!("[{}] Action #{} on '{}' failed: {}", recipe_id, action, item.title, error);
    }
    if !report.is_clean() {
        bail!(
            "{} of {} action(s) failed",
            report.failures.len(),
            item.actions.len()
        );
    }

    eprintln!("Performed {} action(s) on '{}'", report.performed.len(), item.title);
    Ok(())
}

fn run_check(bundle: &std::path::Path) -> Result<()> {
    let manifest = RecipeManifest::load(bundle)
        .with_context(|| format!("{} is not a valid recipe", bundle.display()))?;

    println!("✓ {} ({})", manifest.id, manifest.bundle_id);
    println!("  name:    {}", manifest.name);
    println!("  program: {}", manifest.invocation.program.display());
    if !manifest.invocation.program.exists() && !manifest.invocation.program.is_relative() {
        println!("  warning: program does not exist yet");
    }
    Ok(())
}

/// There is no launcher window here; report hide requests on stderr.
struct TerminalWindow;

impl WindowController for TerminalWindow {
    fn activate(&self) -> std::io::Result<()> {
        eprintln!("(window shown)");
        Ok(())
    }

    fn deactivate(&self) -> std::io::Result<()> {
        eprintln!("(window hidden)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_parses_query_and_tap() {
        let cli = Cli::try_parse_from(["touchfish", "run", "links", "rust", "--tap", "2"]).unwrap();
        let Commands::Run {
            recipe, query, tap, ..
        } = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(recipe, "links");
        assert_eq!(query, "rust");
        assert_eq!(tap, Some(2));
    }

    #[test]
    fn test_tap_out_of_range_fails_before_any_action() {
        let registry = Arc::new(RecipeRegistry::new(recipe::RecipeSet::default()));
        let navigation = Arc::new(NavigationStack::new(registry));
        let result = ExecuteResult::failure("timeout", std::time::Duration::ZERO);

        let err = tap_item(&result, 0, "links", navigation, &Config::default()).unwrap_err();
        assert!(err.to_string().contains("No item at index 0"));
    }

    #[test]
    fn test_run_query_defaults_to_empty() {
        let cli = Cli::try_parse_from(["touchfish", "run", "links"]).unwrap();
        let Commands::Run { query, tap, .. } = cli.command else {
            panic!("expected run");
        };
        assert!(query.is_empty());
        assert_eq!(tap, None);
    }
}
