use crate::app::{print_json, App};

pub async fn run(app: &App) -> Result<(), Box<dyn std::error::Error>> {
    let report = app.engine.run_sweep().await?;
    print_json(&report)
}
