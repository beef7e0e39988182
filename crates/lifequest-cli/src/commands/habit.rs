//! Habit commands. `trigger` drives the success/failure model, `toggle` the
//! daily mark/undo model.

use clap::Subcommand;
use lifequest_core::{Difficulty, Polarity, TaskKind, TriggerOutcome};

use crate::app::{print_json, App};

#[derive(Subcommand)]
pub enum HabitAction {
    /// Create a habit
    Create {
        /// Habit title
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// easy, medium or hard
        #[arg(long, default_value = "medium")]
        difficulty: Difficulty,
        /// positive (build) or negative (break)
        #[arg(long, default_value = "positive")]
        polarity: Polarity,
    },
    /// List habits
    List,
    /// Report a success or failure
    Trigger {
        /// Habit ID
        id: String,
        /// success or failure
        outcome: TriggerOutcome,
    },
    /// Mark done for today, or undo today's mark
    Toggle {
        /// Habit ID
        id: String,
    },
    /// Delete a habit
    Delete {
        /// Habit ID
        id: String,
    },
}

pub async fn run(app: &App, user: &str, action: HabitAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = &app.engine;
    match action {
        HabitAction::Create {
            title,
            description,
            difficulty,
            polarity,
        } => {
            let habit = engine
                .create_habit(user, &title, description, difficulty, polarity)
                .await?;
            print_json(&habit)?;
        }
        HabitAction::List => {
            let habits: Vec<_> = engine
                .recurring_tasks(user)?
                .into_iter()
                .filter(|t| t.kind == TaskKind::Habit)
                .collect();
            print_json(&habits)?;
        }
        HabitAction::Trigger { id, outcome } => {
            print_json(&engine.trigger_habit(user, &id, outcome).await?)?;
        }
        HabitAction::Toggle { id } => {
            print_json(&engine.toggle_habit(user, &id).await?)?;
        }
        HabitAction::Delete { id } => {
            engine.delete_recurring(user, &id).await?;
            println!("Habit deleted: {id}");
        }
    }
    Ok(())
}
