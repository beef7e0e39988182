use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{conflict, Store, Write};
use crate::error::StoreError;
use crate::model::{AuditEntry, Character, LoanTask, RecurringTask};

#[derive(Debug, Clone, Default)]
struct State {
    characters: BTreeMap<String, Character>,
    recurring: BTreeMap<String, RecurringTask>,
    loans: BTreeMap<String, LoanTask>,
    audit: Vec<AuditEntry>,
}

/// In-process store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&State) -> T) -> T {
        let guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }
}

fn check_version(
    entity: &'static str,
    id: &str,
    expected: u64,
    stored: Option<u64>,
) -> Result<(), StoreError> {
    let found = stored.unwrap_or(0);
    if found == expected {
        Ok(())
    } else {
        Err(conflict(entity, id, expected, found))
    }
}

fn apply(state: &mut State, write: Write) -> Result<(), StoreError> {
    match write {
        Write::PutCharacter(mut c) => {
            let stored = state.characters.get(&c.user_id).map(|s| s.version);
            check_version("character", &c.user_id, c.version, stored)?;
            c.version += 1;
            state.characters.insert(c.user_id.clone(), c);
        }
        Write::PutRecurring(mut t) => {
            let stored = state.recurring.get(&t.id).map(|s| s.version);
            check_version("recurring task", &t.id, t.version, stored)?;
            t.version += 1;
            state.recurring.insert(t.id.clone(), t);
        }
        Write::DeleteRecurring { id, version } => {
            let stored = state.recurring.get(&id).map(|s| s.version);
            check_version("recurring task", &id, version, stored)?;
            state.recurring.remove(&id);
        }
        Write::PutLoan(mut t) => {
            let stored = state.loans.get(&t.id).map(|s| s.version);
            check_version("loan task", &t.id, t.version, stored)?;
            t.version += 1;
            state.loans.insert(t.id.clone(), t);
        }
        Write::DeleteLoan { id, version } => {
            let stored = state.loans.get(&id).map(|s| s.version);
            check_version("loan task", &id, version, stored)?;
            state.loans.remove(&id);
        }
        Write::AppendAudit(entry) => state.audit.push(entry),
    }
    Ok(())
}

impl Store for MemoryStore {
    fn user_ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.with_state(|s| s.characters.keys().cloned().collect()))
    }

    fn character(&self, user_id: &str) -> Result<Option<Character>, StoreError> {
        Ok(self.with_state(|s| s.characters.get(user_id).cloned()))
    }

    fn recurring_task(&self, id: &str) -> Result<Option<RecurringTask>, StoreError> {
        Ok(self.with_state(|s| s.recurring.get(id).cloned()))
    }

    fn recurring_tasks(&self, user_id: &str) -> Result<Vec<RecurringTask>, StoreError> {
        let mut tasks: Vec<_> = self.with_state(|s| {
            s.recurring
                .values()
                .filter(|t| t.user_id == user_id)
                .cloned()
                .collect()
        });
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(tasks)
    }

    fn loan_task(&self, id: &str) -> Result<Option<LoanTask>, StoreError> {
        Ok(self.with_state(|s| s.loans.get(id).cloned()))
    }

    fn loan_tasks(&self, user_id: &str) -> Result<Vec<LoanTask>, StoreError> {
        let mut tasks: Vec<_> = self.with_state(|s| {
            s.loans
                .values()
                .filter(|t| t.user_id == user_id)
                .cloned()
                .collect()
        });
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(tasks)
    }

    fn recent_audit(&self, user_id: &str, limit: usize) -> Result<Vec<AuditEntry>, StoreError> {
        let mut entries: Vec<_> = self.with_state(|s| {
            s.audit
                .iter()
                .rev()
                .filter(|e| e.user_id == user_id)
                .cloned()
                .collect()
        });
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit);
        Ok(entries)
    }

    fn commit(&self, writes: Vec<Write>) -> Result<(), StoreError> {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = guard.clone();
        for write in writes {
            apply(&mut next, write)?;
        }
        *guard = next;
        Ok(())
    }
}
