mod cli;
mod daemon;

use clap::{Parser, Subcommand};
use clap_verbosity_flag::{LogLevel, Verbosity};
use macros_rs::{crashln, str};

use agentdir::{config, helpers};
use cli::Format;

#[derive(Copy, Clone, Debug, Default)]
struct NoneLevel;
impl LogLevel for NoneLevel {
    fn default() -> Option<log::Level> { None }
}

#[derive(Parser)]
#[command(version = str!(cli::get_version(false)))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[clap(flatten)]
    verbose: Verbosity<NoneLevel>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the directory daemon
    #[command(visible_alias = "daemon")]
    Serve,

    /// Register an agent card with the directory
    #[command(visible_alias = "add")]
    Register {
        /// Path of the agent card json
        card: String,
        /// Owner email, defaults to the token's email
        #[arg(long)]
        owner: Option<String>,
        /// Bearer token for the directory
        #[arg(long, env = "AGENTDIR_TOKEN")]
        token: String,
    },

    /// List registered agents
    #[command(visible_alias = "ls")]
    List {
        /// Format output
        #[arg(long, value_enum, default_value_t = Format::Default)]
        format: Format,
    },

    /// Show one agent by endpoint
    #[command(visible_alias = "info")]
    Get {
        endpoint: String,
        /// Format output
        #[arg(long, value_enum, default_value_t = Format::Default)]
        format: Format,
    },

    /// Rank agents against free text
    #[command(visible_alias = "find")]
    Search {
        query: String,
        /// Maximum number of agents
        #[arg(short)]
        k: Option<usize>,
        /// Format output
        #[arg(long, value_enum, default_value_t = Format::Default)]
        format: Format,
    },

    /// Ask an agent a question, then keep chatting
    Ask {
        question: String,
        /// Agent endpoint, skips directory search
        #[arg(long)]
        endpoint: Option<String>,
        /// Bearer token forwarded to the directory search
        #[arg(long, env = "AGENTDIR_TOKEN")]
        token: Option<String>,
    },

    /// Ask an agent to cancel a task
    Cancel { endpoint: String, task_id: String },

    /// Issue a development token signed with the configured secret
    Token {
        #[arg(long)]
        email: String,
        /// Lifetime in seconds
        #[arg(long, default_value_t = 3600)]
        ttl: i64,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut env = env_logger::Builder::new();
    let level = cli.verbose.log_level_filter();

    env.filter_level(level).init();

    let config = config::read();

    match cli.command {
        Commands::Serve => {
            if let Err(err) = daemon::serve(config).await {
                crashln!("{} {err:#}", *helpers::FAIL);
            }
        }
        Commands::Register { card, owner, token } => cli::register(&config, &card, owner, &token).await,
        Commands::List { format } => cli::list(&config, format).await,
        Commands::Get { endpoint, format } => cli::get(&config, &endpoint, format).await,
        Commands::Search { query, k, format } => cli::search(&config, &query, k, format).await,
        Commands::Ask { question, endpoint, token } => cli::ask(&config, &question, endpoint.into(), token).await,
        Commands::Cancel { endpoint, task_id } => cli::cancel(&config, &endpoint, &task_id).await,
        Commands::Token { email, ttl } => cli::token(&config, &email, ttl),
    }
}
