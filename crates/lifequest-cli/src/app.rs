//! Wiring shared by every command: config, store, scheduler, engine.

use std::sync::Arc;
use tracing::debug;

use lifequest_core::{
    AppConfig, CallbackScheduler, Engine, HttpCallbackScheduler, NoopScheduler, SqliteStore,
    SystemClock,
};

pub struct App {
    pub engine: Arc<Engine>,
    pub config: AppConfig,
}

/// Load config (env secrets win), open the database and build the engine.
pub fn open() -> Result<App, Box<dyn std::error::Error>> {
    let mut config = AppConfig::load()?;
    config.apply_env_overrides();

    let store = SqliteStore::open(&config.database_path()?)?;
    let scheduler: Arc<dyn CallbackScheduler> =
        match HttpCallbackScheduler::from_settings(&config.scheduler, &config.callback) {
            Ok(http) => Arc::new(http),
            Err(e) => {
                debug!(reason = %e, "no callback relay; deadlines will not be scheduled");
                Arc::new(NoopScheduler)
            }
        };

    let engine = Engine::new(
        config.game.clone(),
        Arc::new(store),
        scheduler,
        Arc::new(SystemClock),
    )?;
    Ok(App {
        engine: Arc::new(engine),
        config,
    })
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
