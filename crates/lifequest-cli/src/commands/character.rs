use clap::Subcommand;

use crate::app::{print_json, App};

#[derive(Subcommand)]
pub enum CharacterAction {
    /// Create the character if it does not exist
    Init,
    /// Show level, experience, gold and health
    Show,
}

pub async fn run(
    app: &App,
    user: &str,
    action: CharacterAction,
) -> Result<(), Box<dyn std::error::Error>> {
    let character = match action {
        CharacterAction::Init => app.engine.register_character(user).await?,
        CharacterAction::Show => app.engine.character(user)?,
    };
    print_json(&character)
}
