use crate::app::{print_json, App};

pub fn run(app: &App, user: &str, limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    print_json(&app.engine.recent_activity(user, limit)?)
}
