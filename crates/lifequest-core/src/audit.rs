//! Audit log writer.
//!
//! Each operation collects its entries in an [`AuditBatch`] that is
//! committed together with the entity writes, so an entry exists exactly
//! when its economic effect does.

use chrono::{DateTime, Utc};

use crate::model::{AuditCategory, AuditEntry};

/// Entries for one operation on one user.
#[derive(Debug, Clone)]
pub struct AuditBatch {
    user_id: String,
    timestamp: DateTime<Utc>,
    entries: Vec<AuditEntry>,
}

impl AuditBatch {
    pub fn new(user_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            timestamp,
            entries: Vec::new(),
        }
    }

    pub fn record(
        &mut self,
        category: AuditCategory,
        message: impl Into<String>,
        experience_delta: i64,
        gold_delta: f64,
    ) {
        self.entries.push(AuditEntry {
            user_id: self.user_id.clone(),
            message: message.into(),
            experience_delta,
            gold_delta,
            category,
            timestamp: self.timestamp,
        });
    }

    /// Append a `level_up` entry when `after` is above `before`.
    pub fn record_level_change(&mut self, before: u32, after: u32) {
        if after > before {
            self.record(
                AuditCategory::LevelUp,
                format!("Reached level {after}"),
                0,
                0.0,
            );
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<AuditEntry> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_up_only_on_increase() {
        let mut batch = AuditBatch::new("u1", Utc::now());
        batch.record(AuditCategory::Daily, "Daily Done: Read", 20, 10.0);
        batch.record_level_change(2, 2);
        batch.record_level_change(3, 2);
        assert_eq!(batch.entries().len(), 1);

        batch.record_level_change(2, 4);
        let entries = batch.into_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].category, AuditCategory::LevelUp);
        assert_eq!(entries[1].message, "Reached level 4");
        assert!(entries.iter().all(|e| e.user_id == "u1"));
    }
}
