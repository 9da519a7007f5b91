mod board_cmd;
mod goal_cmd;
mod topics_cmd;

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use habitgrid_core::oracle::{CommandOracle, RetryOracle};
use habitgrid_core::state::App;
use habitgrid_store::{config, DocumentStore, StoreConfig};

#[derive(Parser)]
#[command(name = "habitgrid", about = "Staged habit maps on a rotating micro-action board")]
struct Cli {
    /// Data directory (overrides HABITGRID_DATA_DIR and the config file)
    #[arg(long, global = true)]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a habitgrid config file
    Init {
        /// Oracle program to spawn for generation requests
        #[arg(long, default_value = "claude")]
        oracle_program: String,
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Goal management
    Goal {
        #[command(subcommand)]
        command: GoalCommands,
    },
    /// Habit map inspection and regeneration
    Map {
        #[command(subcommand)]
        command: MapCommands,
    },
    /// Board operations
    Board {
        #[command(subcommand)]
        command: BoardCommands,
    },
    /// Blocked-topic filters
    Topics {
        #[command(subcommand)]
        command: TopicsCommands,
    },
}

#[derive(Subcommand)]
pub enum GoalCommands {
    /// Register a goal and build its habit map
    Add {
        /// The goal, in your own words
        goal: String,
    },
    /// Remove a goal and its habit map
    Remove {
        goal: String,
    },
    /// List tracked goals with their current stage
    List,
}

#[derive(Subcommand)]
pub enum MapCommands {
    /// Show a goal's habit map
    Show {
        goal: String,
    },
    /// Force a full regeneration of a goal's map
    Rebuild {
        goal: String,
    },
}

#[derive(Subcommand)]
pub enum BoardCommands {
    /// Show the current board
    Show,
    /// Refill the board's open cells
    Refresh,
    /// Complete a cell (1-based index, row-major)
    Done {
        cell: usize,
    },
    /// Change the grid size and refill
    Size {
        /// New edge length (3-5)
        size: usize,
    },
}

#[derive(Subcommand)]
pub enum TopicsCommands {
    /// Block a topic from ever appearing on the board
    Block {
        topic: String,
    },
    /// Remove a topic from the blocklist
    Unblock {
        topic: String,
    },
    /// List blocked topics
    List,
}

/// Everything a command needs: the store for persistence and the state
/// handle wired to the configured oracle.
pub struct CliContext {
    pub store: DocumentStore,
    pub app: App,
}

impl CliContext {
    /// Load persisted documents and build the app handle.
    fn build(data_dir_flag: Option<&str>) -> anyhow::Result<Self> {
        let resolved = StoreConfig::resolve(data_dir_flag);
        let store = DocumentStore::open(&resolved)?;
        let state = store.load_state()?;

        let oracle = RetryOracle::with_timeout(
            Box::new(CommandOracle::with_args(
                resolved.oracle_program.clone(),
                resolved.oracle_args.clone(),
            )),
            Duration::from_secs(resolved.oracle_timeout_secs),
        );
        let app = App::new(Arc::new(oracle), state);
        Ok(Self { store, app })
    }

    /// Persist the current state back to disk.
    pub async fn save(&self) -> anyhow::Result<()> {
        let store = self.store.clone();
        self.app
            .with_state(move |state| store.save_state(state))
            .await?;
        Ok(())
    }
}

/// Execute the `habitgrid init` command: write the config file.
fn cmd_init(oracle_program: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        storage: config::StorageSection { data_dir: None },
        oracle: config::OracleSection {
            program: oracle_program.to_string(),
            ..Default::default()
        },
    };
    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  oracle.program = {oracle_program}");
    println!("  data directory defaults to {}", config::default_data_dir().display());
    println!();
    println!("Next: run `habitgrid goal add \"your goal\"`.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { oracle_program, force } => {
            cmd_init(&oracle_program, force)?;
        }
        Commands::Goal { command } => {
            let ctx = CliContext::build(cli.data_dir.as_deref())?;
            match command {
                GoalCommands::Add { goal } => goal_cmd::cmd_add(&ctx, &goal).await?,
                GoalCommands::Remove { goal } => goal_cmd::cmd_remove(&ctx, &goal).await?,
                GoalCommands::List => goal_cmd::cmd_list(&ctx).await?,
            }
        }
        Commands::Map { command } => {
            let ctx = CliContext::build(cli.data_dir.as_deref())?;
            match command {
                MapCommands::Show { goal } => goal_cmd::cmd_show_map(&ctx, &goal).await?,
                MapCommands::Rebuild { goal } => goal_cmd::cmd_add(&ctx, &goal).await?,
            }
        }
        Commands::Board { command } => {
            let ctx = CliContext::build(cli.data_dir.as_deref())?;
            match command {
                BoardCommands::Show => board_cmd::cmd_show(&ctx).await?,
                BoardCommands::Refresh => board_cmd::cmd_refresh(&ctx).await?,
                BoardCommands::Done { cell } => board_cmd::cmd_done(&ctx, cell).await?,
                BoardCommands::Size { size } => board_cmd::cmd_size(&ctx, size).await?,
            }
        }
        Commands::Topics { command } => {
            let ctx = CliContext::build(cli.data_dir.as_deref())?;
            match command {
                TopicsCommands::Block { topic } => topics_cmd::cmd_block(&ctx, &topic).await?,
                TopicsCommands::Unblock { topic } => topics_cmd::cmd_unblock(&ctx, &topic).await?,
                TopicsCommands::List => topics_cmd::cmd_list(&ctx).await?,
            }
        }
    }

    Ok(())
}
