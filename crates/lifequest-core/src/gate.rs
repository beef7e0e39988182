use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-user serialization point. Request handlers and the sweep take the
/// same lock, so their read-modify-write cycles on one user never interleave.
#[derive(Debug, Default)]
pub struct UserGate {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl UserGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `user_id`.
    pub async fn enter(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Guards and waiters hold a clone; a lone Arc is idle.
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
