use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod app;
mod commands;

#[derive(Parser)]
#[command(name = "lifequest", version, about = "LifeQuest CLI")]
struct Cli {
    /// User whose character the command acts on
    #[arg(long, global = true, env = "LIFEQUEST_USER", default_value = "local")]
    user: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Character sheet
    Character {
        #[command(subcommand)]
        action: commands::character::CharacterAction,
    },
    /// Habits (trigger and toggle models)
    Habit {
        #[command(subcommand)]
        action: commands::habit::HabitAction,
    },
    /// Daily quests
    Daily {
        #[command(subcommand)]
        action: commands::daily::DailyAction,
    },
    /// Deadline-bound todos and their gold loans
    Loan {
        #[command(subcommand)]
        action: commands::loan::LoanAction,
    },
    /// Run the daily reconciliation once for every user
    Sweep,
    /// Recent activity feed
    Activity {
        /// Number of entries
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Host the deadline callback endpoint and the periodic sweep
    Serve {
        /// Listen address, overrides `callback.listen_addr`
        #[arg(long)]
        listen: Option<String>,
    },
}

async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let user = cli.user;
    match cli.command {
        Commands::Config { action } => commands::config::run(action),
        Commands::Character { action } => commands::character::run(&app::open()?, &user, action).await,
        Commands::Habit { action } => commands::habit::run(&app::open()?, &user, action).await,
        Commands::Daily { action } => commands::daily::run(&app::open()?, &user, action).await,
        Commands::Loan { action } => commands::loan::run(&app::open()?, &user, action).await,
        Commands::Sweep => commands::sweep::run(&app::open()?).await,
        Commands::Activity { limit } => commands::activity::run(&app::open()?, &user, limit),
        Commands::Serve { listen } => commands::serve::run(app::open()?, listen).await,
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = dispatch(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
