//! kind-images CLI - inspect and manage the images loaded into a local kind cluster

use anyhow::{Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use kind_images::commands::images::OutputFormat;
use kind_images::config::Settings;
use kind_images::k8s::actions::Orchestrator;
use kind_images::k8s::kind::KindCluster;
use kind_images::utils::errors::display_error_and_exit;
use kind_images::utils::{CommonPrereqs, ContainerRuntime, Prerequisite, SystemRunner};
use kind_images::{log_error, log_info};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "kind-images")]
#[command(author, version, about = "Inspect and manage the images loaded into a local kind cluster", long_about = None)]
struct Cli {
    /// Verbose output (can be used multiple times: -v, -vv, -vvv)
    /// -v: INFO, -vv: DEBUG, -vvv: TRACE
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Dry-run mode: show what would be done without making changes
    #[arg(long, global = true)]
    dry_run: bool,

    /// Kind cluster name (overrides the config file)
    #[arg(short, long, global = true, env = "KIND_CLUSTER_NAME")]
    cluster: Option<String>,

    /// Container runtime: auto, docker or podman (overrides the config file)
    #[arg(long, global = true)]
    runtime: Option<String>,

    /// Path to a config file
    #[arg(long, global = true, env = "KIND_IMAGES_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show local docker images and the images loaded into kind
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },

    /// Load a local docker image into the kind node
    Load {
        /// Image reference in repository:tag form
        image: String,
    },

    /// Delete an image from the kind node
    Delete {
        /// Image ID as shown in the "Kind Images" table
        image_id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Dispatch a raw action request
    Action {
        /// Action name (kind-images/load-image or kind-images/delete-image)
        name: String,

        /// JSON object payload, e.g. '{"imageID": "nginx:latest"}'
        #[arg(short, long)]
        payload: Option<String>,
    },

    /// Check prerequisites and that the cluster exists
    Check,

    /// Interactive menu
    Interactive,

    /// Print an example config file
    Config {
        /// Write the example to this path instead of printing it
        #[arg(long)]
        write: Option<PathBuf>,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Show version information
    Version,
}

fn main() {
    let cli = Cli::parse();
    kind_images::utils::logger::init(cli.verbose);

    if let Err(e) = run(cli) {
        display_error_and_exit(&e);
    }
}

fn run(cli: Cli) -> Result<()> {
    // These need neither a config file nor a container runtime
    match &cli.command {
        Commands::Completion { shell } => return handle_completion_command(*shell),
        Commands::Version => return handle_version_command(),
        Commands::Config { write } => return handle_config_command(write.as_deref()),
        _ => {}
    }

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(cluster) = cli.cluster {
        settings.defaults.cluster_name = cluster;
    }
    if let Some(runtime) = cli.runtime {
        settings.defaults.runtime = runtime;
    }
    if !settings.colors.enabled {
        colored::control::set_override(false);
    }

    if cli.dry_run {
        log_info!("🔍 DRY RUN MODE: No changes will be made");
    }

    if let Commands::Check = cli.command {
        return handle_check_command(&settings);
    }

    let orchestrator = build_orchestrator(&settings, cli.dry_run)?;

    match cli.command {
        Commands::List { output } => kind_images::commands::images::list(&orchestrator, output),
        Commands::Load { image } => kind_images::commands::images::load(&orchestrator, &settings, &image),
        Commands::Delete { image_id, yes } => {
            kind_images::commands::images::delete(&orchestrator, &settings, &image_id, yes)
        }
        Commands::Action { name, payload } => {
            kind_images::commands::images::action(&orchestrator, &name, payload.as_deref())
        }
        Commands::Interactive => {
            kind_images::commands::interactive::show_menu(Arc::new(orchestrator), &settings)
        }
        Commands::Check
        | Commands::Config { .. }
        | Commands::Completion { .. }
        | Commands::Version => unreachable!("handled above"),
    }
}

fn build_orchestrator(settings: &Settings, dry_run: bool) -> Result<Orchestrator> {
    let runtime = ContainerRuntime::resolve(&settings.defaults.runtime)?;
    let runner = Arc::new(SystemRunner::new(settings.behavior.command_timeout()));
    let cluster = KindCluster::new(settings.defaults.cluster_name.clone(), runtime);

    Ok(Orchestrator::new(runner, cluster).with_dry_run(dry_run))
}

fn handle_check_command(settings: &Settings) -> Result<()> {
    log_info!("Checking prerequisites...");

    let runtime = ContainerRuntime::resolve(&settings.defaults.runtime)?;
    println!("Container runtime: {}", runtime);

    let kind = CommonPrereqs::kind();
    let runtime_prereq = CommonPrereqs::runtime(runtime);
    let prereqs: Vec<&dyn Prerequisite> = vec![&kind, &runtime_prereq];

    let (found, missing) = CommonPrereqs::check_all(&prereqs);
    for tool in &found {
        println!("  ✓ {}", tool);
    }
    for (tool, hint) in &missing {
        log_error!("Missing required tool: {}", tool);
        println!("  ✗ {} ({})", tool, hint);
    }
    if !missing.is_empty() {
        return Err(anyhow!("{} prerequisite(s) missing", missing.len()));
    }

    let runner = SystemRunner::new(settings.behavior.command_timeout());
    let cluster = KindCluster::new(settings.defaults.cluster_name.clone(), runtime);
    if !cluster.exists(&runner)? {
        return Err(anyhow!(
            "Kind cluster '{}' not found. Create it with: kind create cluster --name {}",
            cluster.name,
            cluster.name
        ));
    }

    println!("  ✓ kind cluster '{}' ({})", cluster.name, cluster.control_plane_node());
    println!("✓ All prerequisites satisfied!");
    Ok(())
}

fn handle_config_command(write: Option<&std::path::Path>) -> Result<()> {
    match write {
        Some(path) => {
            Settings::default().save(path)?;
            println!("Wrote example config to {}", path.display());
        }
        None => print!("{}", Settings::example_config()?),
    }
    Ok(())
}

fn handle_completion_command(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "kind-images", &mut io::stdout());
    Ok(())
}

fn handle_version_command() -> Result<()> {
    println!("kind-images {}", env!("CARGO_PKG_VERSION"));
    println!("Inspect and manage the images loaded into a local kind cluster");
    Ok(())
}
