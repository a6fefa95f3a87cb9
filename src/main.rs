use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

mod cli;
mod client;
mod error;
mod formats;
mod login;
mod services;
mod storage;

use formats::OutputFormat;
use login::LoginFlags;
use storage::CommonFlags;

#[derive(Parser)]
#[command(name = "ssokey", about = "Federated cloud login and short-lived credentials")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Cloud entry in the clouds file (also SSOKEY_CLOUD)
    #[arg(long, global = true)]
    cloud: Option<String>,

    /// Region override (also SSOKEY_REGION)
    #[arg(long, global = true)]
    region: Option<String>,

    /// Project override (also SSOKEY_PROJECT)
    #[arg(long, global = true)]
    project: Option<String>,
}

impl GlobalArgs {
    fn to_common_flags(&self) -> CommonFlags {
        CommonFlags {
            cloud: self.cloud.clone(),
            region: self.region.clone(),
            project: self.project.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate via the browser and store short-lived credentials
    Login {
        /// Federation entry URL
        #[arg(long)]
        base_url: Option<String>,
        /// Identity (IAM) endpoint recorded with the credentials
        #[arg(long)]
        auth_url: Option<String>,
        /// Domain id passed to the federation endpoint
        #[arg(long)]
        domain_id: Option<String>,
        /// Identity provider id
        #[arg(long)]
        idp: Option<String>,
        /// Federation protocol
        #[arg(long)]
        protocol: Option<String>,
        /// Requested credential lifetime in seconds
        #[arg(long)]
        expiration: Option<u64>,
    },

    /// Inspect the clouds file
    Clouds {
        #[command(subcommand)]
        action: CloudsAction,
    },

    /// Elastic Cloud Server management
    Ecs {
        #[command(subcommand)]
        action: EcsAction,
    },

    /// Cloud Container Engine management
    Cce {
        #[command(subcommand)]
        action: CceAction,
    },

    /// Relational Database Service management
    Rds {
        #[command(subcommand)]
        action: RdsAction,
    },
}

#[derive(Subcommand)]
enum CloudsAction {
    /// List configured clouds
    List {
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Show one cloud profile as stored
    Show {
        /// Cloud name (defaults to the selected cloud)
        name: Option<String>,
    },
}

#[derive(Subcommand)]
enum EcsAction {
    /// List ECS servers
    List {
        /// Filter servers by name
        #[arg(long)]
        filter: Option<String>,
        /// Limit the number of servers listed
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Start an ECS server
    Start { name: String },
    /// Stop an ECS server
    Stop { name: String },
}

#[derive(Subcommand)]
enum CceAction {
    /// List CCE clusters
    List {
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Print a kubeconfig for a CCE cluster
    Config {
        cluster: String,
        /// Write the kubeconfig to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum RdsAction {
    /// List RDS instances
    List {
        /// Filter instances by name
        #[arg(long)]
        filter: Option<String>,
        /// Limit the number of instances listed
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
}

fn main() {
    let cli = Cli::parse();
    let common = cli.global.to_common_flags();

    let result = match &cli.command {
        Commands::Login {
            base_url,
            auth_url,
            domain_id,
            idp,
            protocol,
            expiration,
        } => {
            let flags = LoginFlags {
                base_url: base_url.clone(),
                auth_url: auth_url.clone(),
                domain_id: domain_id.clone(),
                idp: idp.clone(),
                protocol: protocol.clone(),
                expiration: *expiration,
            };
            cli::commands::cmd_login(&common, &flags)
        }
        Commands::Clouds { action } => match action {
            CloudsAction::List { format } => cli::commands::cmd_clouds_list(*format),
            CloudsAction::Show { name } => {
                cli::commands::cmd_clouds_show(&common, name.as_deref())
            }
        },
        Commands::Ecs { action } => match action {
            EcsAction::List {
                filter,
                limit,
                format,
            } => cli::commands::cmd_ecs_list(&common, filter.clone(), *limit, *format),
            EcsAction::Start { name } => cli::commands::cmd_ecs_start(&common, name),
            EcsAction::Stop { name } => cli::commands::cmd_ecs_stop(&common, name),
        },
        Commands::Cce { action } => match action {
            CceAction::List { format } => cli::commands::cmd_cce_list(&common, *format),
            CceAction::Config { cluster, output } => {
                cli::commands::cmd_cce_config(&common, cluster, output.as_deref())
            }
        },
        Commands::Rds { action } => match action {
            RdsAction::List {
                filter,
                limit,
                format,
            } => cli::commands::cmd_rds_list(&common, filter.clone(), *limit, *format),
        },
    };

    if let Err(e) = result {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}
