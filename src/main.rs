use anyhow::Result;
use chrono::NaiveDate;
use clap::Parser;
use wellness_client::commands::{self, GoalFilter, config::Config};

/// wellness - command-line client for the wellness tracking API
///
/// Requests are authenticated with WELLNESS_ID_TOKEN, or with
/// WELLNESS_REFRESH_TOKEN and WELLNESS_AUTH_API_KEY when a long-lived
/// session is available. Without credentials requests are sent anonymously.
///
/// Examples:
///   wellness get /api/goals
///   wellness get /api/moods -p days=7
///   wellness post /api/analyze_sentiment '{"text":"I slept well"}'
///   wellness goals add "Walk daily" --target-date 2025-01-31
///   wellness journal add "Monday" "Slept well" --share-with-ai
///   wellness chat "I feel anxious today"
#[derive(Parser, Debug)]
#[command(author, version = env!("WELLNESS_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API base URL (defaults to http://localhost:5000)
    #[arg(long = "base-url", value_name = "URL", env = "WELLNESS_API_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Per-request timeout in milliseconds
    #[arg(
        long = "timeout-ms",
        value_name = "MS",
        global = true,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout_ms: Option<u64>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Send a GET request and print the response
    Get(GetArgs),

    /// Send a POST request with a JSON body
    Post(BodyArgs),

    /// Send a PUT request with a JSON body
    Put(BodyArgs),

    /// Manage goals
    #[command(subcommand)]
    Goals(GoalsCommand),

    /// Read and write journal entries
    #[command(subcommand)]
    Journal(JournalCommand),

    /// Show or edit the user profile
    #[command(subcommand)]
    Profile(ProfileCommand),

    /// Send a message to the AI companion
    Chat {
        #[arg(value_name = "MESSAGE")]
        message: String,

        /// Continue an existing conversation
        #[arg(long, value_name = "ID")]
        conversation: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
pub struct GetArgs {
    /// Endpoint path, e.g. /api/goals
    #[arg(value_name = "ENDPOINT")]
    pub endpoint: String,

    /// Query parameter, repeatable
    #[arg(short = 'p', long = "param", value_name = "NAME=VALUE", value_parser = commands::parse_param)]
    pub params: Vec<(String, String)>,

    /// Bypass the response cache
    #[arg(long)]
    pub no_cache: bool,
}

#[derive(clap::Args, Debug)]
pub struct BodyArgs {
    #[arg(value_name = "ENDPOINT")]
    pub endpoint: String,

    /// JSON request body
    #[arg(value_name = "JSON", value_parser = commands::parse_body)]
    pub body: serde_json::Value,
}

#[derive(clap::Subcommand, Debug)]
enum GoalsCommand {
    /// List goals
    List {
        /// Only goals still in progress
        #[arg(long, conflicts_with = "completed")]
        active: bool,

        /// Only completed goals
        #[arg(long)]
        completed: bool,
    },

    /// Create a goal
    Add {
        title: String,

        #[arg(long)]
        description: Option<String>,

        /// Defaults to "Other"
        #[arg(long)]
        category: Option<String>,

        /// Target date as YYYY-MM-DD
        #[arg(long, value_name = "DATE")]
        target_date: Option<NaiveDate>,
    },

    /// Flip a goal between active and completed
    Toggle {
        #[arg(value_name = "ID")]
        id: String,
    },
}

#[derive(clap::Subcommand, Debug)]
enum JournalCommand {
    /// List journal entries
    List,

    /// Write a journal entry
    Add {
        title: String,

        content: String,

        /// Let the AI companion read this entry
        #[arg(long)]
        share_with_ai: bool,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ProfileCommand {
    /// Print the profile
    Show,

    /// Update profile fields from a JSON object
    Update {
        #[arg(value_name = "JSON", value_parser = commands::parse_body)]
        changes: serde_json::Value,
    },

    /// Print usage statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = wellness_client::runtime::RealRuntime;
    let config = Config::new(&runtime, cli.base_url.as_deref(), cli.timeout_ms)?;

    let value = match cli.command {
        Commands::Get(args) => {
            commands::get(&config, &args.endpoint, &args.params, args.no_cache).await?
        }
        Commands::Post(args) => commands::post(&config, &args.endpoint, &args.body).await?,
        Commands::Put(args) => commands::put(&config, &args.endpoint, &args.body).await?,
        Commands::Goals(GoalsCommand::List { active, completed }) => {
            let filter = if active {
                GoalFilter::Active
            } else if completed {
                GoalFilter::Completed
            } else {
                GoalFilter::All
            };
            commands::list_goals(&config, filter).await?
        }
        Commands::Goals(GoalsCommand::Add {
            title,
            description,
            category,
            target_date,
        }) => {
            commands::add_goal(
                &config,
                &title,
                description.as_deref(),
                category.as_deref(),
                target_date,
            )
            .await?
        }
        Commands::Goals(GoalsCommand::Toggle { id }) => {
            commands::toggle_goal(&config, &id).await?
        }
        Commands::Journal(JournalCommand::List) => commands::list_journal(&config).await?,
        Commands::Journal(JournalCommand::Add {
            title,
            content,
            share_with_ai,
        }) => commands::add_journal(&config, &title, &content, share_with_ai).await?,
        Commands::Profile(ProfileCommand::Show) => commands::show_profile(&config).await?,
        Commands::Profile(ProfileCommand::Update { changes }) => {
            commands::update_profile(&config, &changes).await?
        }
        Commands::Profile(ProfileCommand::Stats) => commands::profile_stats(&config).await?,
        Commands::Chat {
            message,
            conversation,
        } => commands::send_chat(&config, &message, conversation.as_deref()).await?,
    };

    commands::print_json(&value)
}
