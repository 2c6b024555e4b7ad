//! # SQL Safety Gate
//!
//! A heuristic filter applied to every statement before it reaches a data source.
//! It matches keywords and substrings; it does not parse SQL. Treat it as one
//! layer of defense alongside a read-only database user, not as a guarantee.
//!
//! Rules:
//!
//! - A fixed deny-list of substrings (`;--`, ` DROP `, ` TRUNCATE `, ` SHUTDOWN `,
//!   `/*`) rejects the statement regardless of approval. A `;` followed by `--`
//!   counts as `;--` even with whitespace between them.
//! - Without write approval, the statement must start with `SELECT`, `WITH` or
//!   `EXPLAIN`.
//! - With write approval, the engine-wide write policy must also allow writes.

use crate::errors::SafetyError;
use tracing::warn;

/// Leading keywords accepted for read-only execution.
pub const READ_ONLY_PREFIXES: [&str; 3] = ["SELECT", "WITH", "EXPLAIN"];

/// Substrings rejected in any statement.
pub const BANNED_TOKENS: [&str; 5] = [";--", " DROP ", " TRUNCATE ", " SHUTDOWN ", "/*"];

/// Upper-cases, collapses whitespace runs to one space, and pads both ends so a
/// leading or trailing keyword still matches a space-delimited token.
fn normalized(sql: &str) -> String {
    let collapsed = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    format!(" {} ", collapsed.to_uppercase())
}

/// The normalized form with the space after each `;` removed, so a terminator
/// and a following comment marker meet as `;--`.
fn terminators_joined(normalized: &str) -> String {
    normalized.replace("; ", ";")
}

fn leading_keyword(sql: &str) -> String {
    sql.trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_uppercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlSafetyGate {
    allow_writes: bool,
}

impl SqlSafetyGate {
    /// `allow_writes` is the engine-wide write policy.
    pub fn new(allow_writes: bool) -> Self {
        Self { allow_writes }
    }

    pub fn allows_writes(&self) -> bool {
        self.allow_writes
    }

    /// Checks a statement. `allow_write` is the caller's approval for this one call.
    pub fn validate(&self, sql: &str, allow_write: bool) -> Result<(), SafetyError> {
        let result = self.check(sql, allow_write);
        if let Err(e) = &result {
            warn!(sql = %sql, rule = %e, "SQL rejected by safety gate");
        }
        result
    }

    fn check(&self, sql: &str, allow_write: bool) -> Result<(), SafetyError> {
        let upper = normalized(sql);
        let joined = terminators_joined(&upper);
        if let Some(token) = BANNED_TOKENS
            .iter()
            .find(|t| upper.contains(*t) || joined.contains(*t))
        {
            return Err(SafetyError::BannedToken(token.trim().to_string()));
        }

        if !allow_write && !READ_ONLY_PREFIXES.contains(&leading_keyword(sql).as_str()) {
            return Err(SafetyError::WriteNotApproved);
        }

        if allow_write && !self.allow_writes {
            return Err(SafetyError::WritesDisabled);
        }
        Ok(())
    }

    /// Appends `LIMIT {cap}` to a `SELECT` that has no limit of its own.
    pub fn apply_row_limit(sql: &str, cap: usize) -> String {
        if leading_keyword(sql) == "SELECT" && !normalized(sql).contains(" LIMIT ") {
            let body = sql.trim_end();
            let body = body.strip_suffix(';').unwrap_or(body).trim_end();
            format!("{body}\nLIMIT {cap}")
        } else {
            sql.to_string()
        }
    }
}
