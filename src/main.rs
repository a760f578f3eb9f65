use clap::{Parser, Subcommand, builder::styling};
use eyre::Result;
use kibana_fleet_manager::cli;
use owo_colors::OwoColorize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

// CLI Styling
const STYLES: styling::Styles = styling::Styles::styled()
    .header(styling::AnsiColor::BrightWhite.on_default())
    .usage(styling::AnsiColor::BrightWhite.on_default())
    .literal(styling::AnsiColor::Green.on_default())
    .placeholder(styling::AnsiColor::Cyan.on_default());

/// Kibana Fleet Manager: provision Fleet packages, agent policies and saved objects
#[derive(Parser)]
#[command(name = "kfleet", version, styles = STYLES)]
struct Cli {
    /// The dotenv file to source credentials from
    #[arg(short, long, global = true, default_value = ".env")]
    env: String,

    /// More verbose logging
    #[arg(long, global = true)]
    debug: bool,

    /// Command to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the Kibana version
    Status,

    /// Manage Fleet packages
    #[command(subcommand)]
    Packages(PackageCommands),

    /// Manage agent policies
    #[command(subcommand)]
    Policies(PolicyCommands),

    /// Manage enrolled agents
    #[command(subcommand)]
    Agents(AgentCommands),

    /// Print an enrollment token for a policy
    Token {
        /// Agent policy id
        policy_id: String,
    },

    /// List and export dashboards
    #[command(subcommand)]
    Dashboards(DashboardCommands),

    /// Edit saved objects
    #[command(subcommand)]
    SavedObjects(SavedObjectCommands),

    /// Reconcile Kibana with a desired state file
    Apply {
        /// YAML file describing packages and policies
        #[arg(default_value = "fleet.yml")]
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum PackageCommands {
    /// Install a package from the registry or a zip archive
    Install {
        name: String,
        version: String,
        /// Upload this zip archive instead of using the registry
        #[arg(short, long)]
        zip: Option<PathBuf>,
    },
    /// Uninstall a package
    Remove { name: String, version: String },
    /// List installed packages
    List,
    /// List the Kibana assets of a package
    Assets { name: String },
}

#[derive(Subcommand)]
enum PolicyCommands {
    /// List agent policies
    List,
    /// Create an agent policy
    Create {
        name: String,
        #[arg(short, long, default_value = "default")]
        namespace: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Delete an agent policy
    Delete { id: String },
}

#[derive(Subcommand)]
enum AgentCommands {
    /// List agents
    List {
        /// KQL filter
        #[arg(short, long)]
        kuery: Option<String>,
    },
    /// Assign a policy and wait until the agent runs it
    Assign { agent_id: String, policy_id: String },
    /// Unenroll an agent
    Unenroll { agent_id: String },
    /// Set the log level of an agent
    LogLevel { agent_id: String, level: String },
}

#[derive(Subcommand)]
enum DashboardCommands {
    /// List dashboards by title
    List,
    /// Export dashboards with their references to NDJSON
    Export {
        /// Dashboard ids
        #[arg(required = true)]
        ids: Vec<String>,
        #[arg(short, long, default_value = "export.ndjson")]
        output: PathBuf,
    },
}

#[derive(Subcommand)]
enum SavedObjectCommands {
    /// Set or clear the managed flag of a saved object
    SetManaged {
        #[arg(value_name = "TYPE")]
        object_type: String,
        id: String,
        /// Set "managed: false" to allow direct editing in Kibana
        #[arg(short, long, default_value_t = true, action = clap::ArgAction::Set)]
        managed: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // A missing dotenv file is fine, the environment may already be set.
    dotenvy::from_filename(&cli.env).ok();

    let log_level = match cli.debug {
        true => "debug",
        false => "info",
    };
    let env = env_logger::Env::default().filter_or("LOG_LEVEL", log_level);
    env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .init();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling");
            on_signal.cancel();
        }
    });

    let client = cli::load_kibana_client()?;
    log::debug!("Using Kibana at {}", client.url().as_str().bright_black());

    match cli.command {
        Commands::Status => cli::show_status(&client).await?,
        Commands::Packages(command) => match command {
            PackageCommands::Install { name, version, zip } => {
                cli::install_package(&client, &name, &version, zip.as_deref()).await?;
            }
            PackageCommands::Remove { name, version } => {
                cli::remove_package(&client, &name, &version).await?
            }
            PackageCommands::List => cli::list_packages(&client).await?,
            PackageCommands::Assets { name } => cli::package_assets(&client, &name).await?,
        },
        Commands::Policies(command) => match command {
            PolicyCommands::List => cli::list_policies(&client).await?,
            PolicyCommands::Create {
                name,
                namespace,
                description,
            } => {
                cli::create_policy(&client, &name, &namespace, description).await?;
            }
            PolicyCommands::Delete { id } => cli::delete_policy(&client, &id).await?,
        },
        Commands::Agents(command) => match command {
            AgentCommands::List { kuery } => cli::list_agents(&client, kuery.as_deref()).await?,
            AgentCommands::Assign {
                agent_id,
                policy_id,
            } => cli::assign_policy(&client, &agent_id, &policy_id, &cancel).await?,
            AgentCommands::Unenroll { agent_id } => cli::unenroll_agent(&client, &agent_id).await?,
            AgentCommands::LogLevel { agent_id, level } => {
                cli::set_log_level(&client, &agent_id, &level).await?
            }
        },
        Commands::Token { policy_id } => cli::enrollment_token(&client, &policy_id).await?,
        Commands::Dashboards(command) => match command {
            DashboardCommands::List => cli::list_dashboards(&client).await?,
            DashboardCommands::Export { ids, output } => {
                cli::export_dashboards(&client, ids, &output).await?;
            }
        },
        Commands::SavedObjects(SavedObjectCommands::SetManaged {
            object_type,
            id,
            managed,
        }) => {
            log::info!(
                "Setting {} {} to {}",
                object_type,
                id.cyan(),
                match managed {
                    true => "managed",
                    false => "unmanaged",
                }
            );
            cli::set_managed(&client, &object_type, &id, managed).await?
        }
        Commands::Apply { file } => cli::apply(client, &file, cancel).await?,
    }

    Ok(())
}
