use clap::Subcommand;
use lifequest_core::{Difficulty, TaskKind};

use crate::app::{print_json, App};

#[derive(Subcommand)]
pub enum DailyAction {
    /// Create a daily quest
    Create {
        /// Quest title
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// easy, medium or hard
        #[arg(long, default_value = "medium")]
        difficulty: Difficulty,
    },
    /// List daily quests
    List,
    /// Complete, or undo the completion
    Toggle {
        /// Quest ID
        id: String,
    },
    /// Delete a daily quest
    Delete {
        /// Quest ID
        id: String,
    },
}

pub async fn run(app: &App, user: &str, action: DailyAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = &app.engine;
    match action {
        DailyAction::Create {
            title,
            description,
            difficulty,
        } => {
            print_json(&engine.create_daily(user, &title, description, difficulty).await?)?;
        }
        DailyAction::List => {
            let dailies: Vec<_> = engine
                .recurring_tasks(user)?
                .into_iter()
                .filter(|t| t.kind == TaskKind::Daily)
                .collect();
            print_json(&dailies)?;
        }
        DailyAction::Toggle { id } => {
            print_json(&engine.toggle_daily(user, &id).await?)?;
        }
        DailyAction::Delete { id } => {
            engine.delete_recurring(user, &id).await?;
            println!("Daily deleted: {id}");
        }
    }
    Ok(())
}
