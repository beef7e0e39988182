//! Todo commands. A todo with a future deadline pays its reward upfront as a
//! loan; missing the deadline costs twice that.

use chrono::{DateTime, Duration, Utc};
use clap::Subcommand;
use lifequest_core::{Difficulty, NewLoan};
use serde_json::json;

use crate::app::{print_json, App};

#[derive(Subcommand)]
pub enum LoanAction {
    /// Create a todo
    Create {
        /// Todo title
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// easy, medium or hard
        #[arg(long, default_value = "medium")]
        difficulty: Difficulty,
        /// RFC 3339 timestamp or offset from now (e.g. "90m", "6h", "3d")
        #[arg(long, value_parser = parse_deadline)]
        deadline: Option<DateTime<Utc>>,
    },
    /// List todos
    List,
    /// Complete an active todo
    Complete {
        /// Todo ID
        id: String,
    },
    /// Delete a todo, returning an outstanding loan
    Delete {
        /// Todo ID
        id: String,
    },
    /// Renew an overdue todo for a fee
    Renew {
        /// Todo ID
        id: String,
        /// New deadline
        #[arg(long, value_parser = parse_deadline)]
        deadline: DateTime<Utc>,
    },
    /// Add, move or remove the deadline of an active todo
    Deadline {
        /// Todo ID
        id: String,
        /// New deadline
        #[arg(long, value_parser = parse_deadline, conflicts_with = "clear")]
        deadline: Option<DateTime<Utc>>,
        /// Remove the deadline and return the loan
        #[arg(long)]
        clear: bool,
    },
    /// Deliver the deadline callback by hand
    Expire {
        /// Todo ID
        id: String,
    },
}

/// Parse an absolute RFC 3339 deadline or a relative offset like `45m`.
pub fn parse_deadline(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    let raw = raw.trim().trim_start_matches('+');
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("missing unit in '{raw}' (use m, h or d)"))?;
    let (amount, unit) = raw.split_at(split);
    let amount: i64 = amount
        .parse()
        .map_err(|_| format!("invalid deadline: '{raw}'"))?;
    let offset = match unit {
        "m" => Duration::minutes(amount),
        "h" => Duration::hours(amount),
        "d" => Duration::days(amount),
        other => return Err(format!("unknown unit '{other}' (use m, h or d)")),
    };
    Ok(Utc::now() + offset)
}

pub async fn run(app: &App, user: &str, action: LoanAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = &app.engine;
    match action {
        LoanAction::Create {
            title,
            description,
            difficulty,
            deadline,
        } => {
            let outcome = engine
                .create_loan(
                    user,
                    NewLoan {
                        title,
                        description,
                        difficulty,
                        deadline,
                    },
                )
                .await?;
            for warning in &outcome.warnings {
                eprintln!("warning: {warning}");
            }
            print_json(&outcome)?;
        }
        LoanAction::List => print_json(&engine.loan_tasks(user)?)?,
        LoanAction::Complete { id } => print_json(&engine.complete_loan(user, &id).await?)?,
        LoanAction::Delete { id } => print_json(&engine.delete_loan(user, &id).await?)?,
        LoanAction::Renew { id, deadline } => {
            print_json(&engine.renew_loan(user, &id, deadline).await?)?
        }
        LoanAction::Deadline { id, deadline, clear } => {
            if deadline.is_none() && !clear {
                return Err("pass --deadline <when> or --clear".into());
            }
            print_json(&engine.edit_loan_deadline(user, &id, deadline).await?)?;
        }
        LoanAction::Expire { id } => {
            if !engine.loan_tasks(user)?.iter().any(|t| t.id == id) {
                return Err(format!("loan task not found: {id}").into());
            }
            let verdict = engine.deadline_callback(&id).await?;
            print_json(&json!({ "message": verdict.message() }))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_and_offsets() {
        let at = parse_deadline("2026-12-01T09:00:00+05:30").unwrap();
        assert_eq!(at.to_rfc3339(), "2026-12-01T03:30:00+00:00");

        let before = Utc::now();
        let in_two_hours = parse_deadline("2h").unwrap();
        assert!(in_two_hours >= before + Duration::hours(2));
        assert!(in_two_hours <= Utc::now() + Duration::hours(2));
        assert!(parse_deadline("+3d").unwrap() > Utc::now() + Duration::days(2));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_deadline("soon").is_err());
        assert!(parse_deadline("12").is_err());
        assert!(parse_deadline("5y").is_err());
    }
}
