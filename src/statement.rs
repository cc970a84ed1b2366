//! Statements and the per-connection statement cache.
//!
//! A statement is created on first execute and may be cached under its
//! normalized key. Evicted or invalidated statements tombstone their server
//! cursor ids; those are closed by piggyback on the next round trip.

use crate::error::{Error, Result};
use crate::protocol::types::{ColumnMetadata, FetchType};
use hashlink::LinkedHashMap;

/// Classified statement kind, derived from the first keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Query,
    Dml,
    Plsql,
    Ddl,
    Other,
}

/// A prepared statement binding.
#[derive(Debug, Clone)]
pub struct Statement {
    /// Original SQL text.
    pub sql: String,
    /// Server cursor id; 0 until the first successful execute, and again
    /// after the server signals the cursor must be repurged.
    pub cursor_id: u32,
    pub kind: StatementKind,
    /// Whether the DML carries a RETURNING ... INTO clause.
    pub is_returning: bool,
    /// Column metadata captured at describe time.
    pub columns: Vec<ColumnMetadata>,
    /// Per-column fetch overrides chosen at describe time.
    pub fetch_types: Vec<FetchType>,
    /// Rowid of the last single-row DML.
    pub last_rowid: Option<String>,
    /// Number of times this statement executed.
    pub executions: u64,
}

impl Statement {
    /// Prepare a statement: refuse trailing terminators and classify it.
    pub fn prepare(sql: &str) -> Result<Self> {
        let trimmed = sql.trim_end();
        if trimmed.ends_with('/') {
            return Err(Error::TrailingStatementTerminator { terminator: '/' });
        }

        let kind = classify(trimmed);
        if trimmed.ends_with(';') && kind != StatementKind::Plsql {
            return Err(Error::TrailingStatementTerminator { terminator: ';' });
        }

        Ok(Self {
            sql: sql.to_string(),
            cursor_id: 0,
            kind,
            is_returning: kind == StatementKind::Dml && has_returning_clause(trimmed),
            columns: Vec::new(),
            fetch_types: Vec::new(),
            last_rowid: None,
            executions: 0,
        })
    }

    pub fn is_query(&self) -> bool {
        self.kind == StatementKind::Query
    }

    pub fn is_plsql(&self) -> bool {
        self.kind == StatementKind::Plsql
    }

    pub fn is_ddl(&self) -> bool {
        self.kind == StatementKind::Ddl
    }

    /// Drop the parsed server cursor; the next execute re-parses.
    pub fn invalidate(&mut self) -> u32 {
        std::mem::take(&mut self.cursor_id)
    }
}

fn classify(sql: &str) -> StatementKind {
    let keyword = first_keyword(sql);
    match keyword.to_ascii_uppercase().as_str() {
        "SELECT" | "WITH" => StatementKind::Query,
        "INSERT" | "UPDATE" | "DELETE" | "MERGE" => StatementKind::Dml,
        "BEGIN" | "DECLARE" | "CALL" => StatementKind::Plsql,
        "CREATE" | "ALTER" | "DROP" | "TRUNCATE" | "GRANT" | "REVOKE" | "ANALYZE"
        | "AUDIT" | "COMMENT" => StatementKind::Ddl,
        _ => StatementKind::Other,
    }
}

/// First keyword of the statement, skipping comments and whitespace.
fn first_keyword(sql: &str) -> String {
    let mut rest = sql;
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map(|(_, r)| r).unwrap_or("");
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map(|(_, r)| r).unwrap_or("");
        } else {
            break;
        }
    }
    rest.chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect()
}

/// Scan for a RETURNING/RETURN ... INTO clause outside quotes.
fn has_returning_clause(sql: &str) -> bool {
    let upper = strip_quoted(sql);
    let mut search = upper.as_str();
    while let Some(pos) = search.find("RETURNING").or_else(|| search.find("RETURN")) {
        let keyword_len = if search[pos..].starts_with("RETURNING") {
            9
        } else {
            6
        };
        let before_ok = pos == 0
            || !search.as_bytes()[pos - 1].is_ascii_alphanumeric();
        let after = &search[pos + keyword_len..];
        let after_ok = after
            .chars()
            .next()
            .map(|c| !c.is_ascii_alphanumeric())
            .unwrap_or(true);
        if before_ok && after_ok && after.contains(" INTO ") {
            return true;
        }
        search = &search[pos + keyword_len..];
    }
    false
}

/// Uppercase the SQL with quoted literals and identifiers blanked out.
fn strip_quoted(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars();
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                out.push(' ');
                for q in chars.by_ref() {
                    if q == '\'' {
                        break;
                    }
                }
            }
            '"' => {
                out.push(' ');
                for q in chars.by_ref() {
                    if q == '"' {
                        break;
                    }
                }
            }
            _ => out.push(c.to_ascii_uppercase()),
        }
    }
    out
}

/// Cache key: SQL text plus the execution traits that change the parse or
/// the fetch shape. Identical SQL with different traits must not collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatementKey {
    pub sql: String,
    pub is_returning: bool,
    pub array_dml: bool,
    /// NUMBER columns fetched as decimal strings.
    pub fetch_decimals: bool,
}

/// LRU statement cache.
///
/// Size 0 disables caching entirely; statements then close on release.
pub struct StatementCache {
    entries: LinkedHashMap<StatementKey, Statement>,
    max_size: usize,
    /// Cursor ids awaiting a server-side close.
    tombstones: Vec<u32>,
}

impl StatementCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: LinkedHashMap::new(),
            max_size,
            tombstones: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_size > 0
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a statement, marking it most recently used.
    pub fn get(&mut self, key: &StatementKey) -> Option<Statement> {
        let statement = self.entries.remove(key)?;
        self.entries.insert(key.clone(), statement.clone());
        Some(statement)
    }

    /// Whether a key is cached, without touching LRU order.
    pub fn contains(&self, key: &StatementKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or refresh a statement after a successful execute, evicting
    /// the least recently used entry when the cache is full.
    pub fn put(&mut self, key: StatementKey, statement: Statement) {
        if self.max_size == 0 {
            if statement.cursor_id != 0 {
                self.tombstones.push(statement.cursor_id);
            }
            return;
        }
        if let Some(old) = self.entries.remove(&key) {
            if old.cursor_id != 0 && old.cursor_id != statement.cursor_id {
                self.tombstones.push(old.cursor_id);
            }
        } else if self.entries.len() >= self.max_size {
            if let Some((_, evicted)) = self.entries.pop_front() {
                if evicted.cursor_id != 0 {
                    self.tombstones.push(evicted.cursor_id);
                }
            }
        }
        self.entries.insert(key, statement);
    }

    /// Remove an entry, as `prepare(sql, cache_statement=false)` demands.
    pub fn remove(&mut self, key: &StatementKey) {
        if let Some(old) = self.entries.remove(key) {
            if old.cursor_id != 0 {
                self.tombstones.push(old.cursor_id);
            }
        }
    }

    /// Tombstone an entry whose parsed plan the server invalidated.
    pub fn invalidate(&mut self, key: &StatementKey) {
        if let Some(stmt) = self.entries.get_mut(key) {
            let cursor_id = stmt.invalidate();
            if cursor_id != 0 {
                self.tombstones.push(cursor_id);
            }
        }
    }

    /// Record a cursor id for deferred close without a cache entry.
    pub fn add_tombstone(&mut self, cursor_id: u32) {
        if cursor_id != 0 {
            self.tombstones.push(cursor_id);
        }
    }

    /// Take the cursor ids awaiting close; the caller piggybacks them.
    pub fn take_tombstones(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.tombstones)
    }

    /// Cached keys in LRU order, oldest first.
    #[cfg(test)]
    fn keys(&self) -> Vec<&StatementKey> {
        self.entries.keys().collect()
    }
}
