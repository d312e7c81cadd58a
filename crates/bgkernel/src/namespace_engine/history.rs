//
// history.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

use std::path::Path;
use std::thread::{self, ThreadId};

use rusqlite::{params, Connection};

use crate::error::BKError;

/// Which threads may use a history store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadAffinity {
    /// Only the thread that opened the store may use or close it
    Strict,

    /// Any thread may use the store, one at a time
    Shared,
}

/// One recorded input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub session: i64,
    pub line: i64,
    pub source: String,
}

/// Records executed inputs in SQLite.
pub struct HistoryStore {
    conn: Option<Connection>,
    owner: ThreadId,
    affinity: ThreadAffinity,
    session: i64,
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore")
            .field("owner", &self.owner)
            .field("affinity", &self.affinity)
            .field("session", &self.session)
            .finish()
    }
}

impl HistoryStore {
    /// Open (or create) the store and start a new history session in it.
    /// `None` keeps the history in memory.
    pub fn open(path: Option<&Path>, affinity: ThreadAffinity) -> Result<Self, BKError> {
        let conn = match path {
            Some(path) => {
                log::debug!("Opening history database {}", path.display());
                Connection::open(path)?
            }
            None => Connection::open_in_memory()?,
        };
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                 session INTEGER PRIMARY KEY AUTOINCREMENT,
                 start TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS history (
                 session INTEGER NOT NULL,
                 line INTEGER NOT NULL,
                 source TEXT NOT NULL,
                 PRIMARY KEY (session, line)
             );",
        )?;
        conn.execute(
            "INSERT INTO sessions (start) VALUES (?1)",
            params![chrono::Utc::now().to_rfc3339()],
        )?;
        let session = conn.last_insert_rowid();

        Ok(Self {
            conn: Some(conn),
            owner: thread::current().id(),
            affinity,
            session,
        })
    }

    /// The thread that opened the store.
    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    pub fn affinity(&self) -> ThreadAffinity {
        self.affinity
    }

    /// The history session this store records into.
    pub fn session(&self) -> i64 {
        self.session
    }

    fn check_thread(&self) -> Result<(), BKError> {
        let caller = thread::current().id();
        if self.affinity == ThreadAffinity::Strict && caller != self.owner {
            return Err(BKError::StoreAffinity {
                owner: self.owner,
                caller,
            });
        }
        Ok(())
    }

    fn conn(&self) -> Result<&Connection, BKError> {
        self.check_thread()?;
        match self.conn {
            Some(ref conn) => Ok(conn),
            None => Err(BKError::Store(rusqlite::Error::InvalidQuery)),
        }
    }

    /// Record the input executed as `line` of the current session.
    pub fn record(&self, line: i64, source: &str) -> Result<(), BKError> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO history (session, line, source) VALUES (?1, ?2, ?3)",
            params![self.session, line, source],
        )?;
        Ok(())
    }

    /// The last `n` inputs across all sessions, oldest first.
    pub fn tail(&self, n: usize) -> Result<Vec<HistoryEntry>, BKError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT session, line, source FROM history
             ORDER BY session DESC, line DESC LIMIT ?1",
        )?;
        let mut entries = Self::collect(stmt.query_map(params![n as i64], Self::entry)?)?;
        entries.reverse();
        Ok(entries)
    }

    /// Lines `start..stop` of a session; a session of 0 or less counts back
    /// from the current one.
    pub fn range(
        &self,
        session: i64,
        start: i64,
        stop: Option<i64>,
    ) -> Result<Vec<HistoryEntry>, BKError> {
        let session = if session <= 0 {
            self.session + session
        } else {
            session
        };
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT session, line, source FROM history
             WHERE session = ?1 AND line >= ?2 AND line < ?3
             ORDER BY line",
        )?;
        let stop = stop.unwrap_or(i64::MAX);
        let entries = Self::collect(stmt.query_map(params![session, start, stop], Self::entry)?)?;
        Ok(entries)
    }

    /// Inputs matching a glob pattern, oldest first.
    pub fn search(&self, pattern: &str) -> Result<Vec<HistoryEntry>, BKError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT session, line, source FROM history
             WHERE source GLOB ?1 ORDER BY session, line",
        )?;
        let entries = Self::collect(stmt.query_map(params![pattern], Self::entry)?)?;
        Ok(entries)
    }

    fn entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<HistoryEntry> {
        Ok(HistoryEntry {
            session: row.get(0)?,
            line: row.get(1)?,
            source: row.get(2)?,
        })
    }

    fn collect(
        rows: impl Iterator<Item = rusqlite::Result<HistoryEntry>>,
    ) -> Result<Vec<HistoryEntry>, BKError> {
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Close the store. Under `ThreadAffinity::Strict` this fails on any
    /// thread but the one that opened it, and the store stays open.
    pub fn close(mut self) -> Result<(), BKError> {
        self.check_thread()?;
        match self.conn.take() {
            Some(conn) => conn.close().map_err(|(_, err)| BKError::Store(err)),
            None => Ok(()),
        }
    }
}

impl Drop for HistoryStore {
    fn drop(&mut self) {
        if self.conn.is_none() {
            return;
        }
        if let Err(err) = self.check_thread() {
            // Strict stores are only closed by their owner; leave this one
            // to the process
            log::error!("Not closing history store: {}", err);
            if let Some(conn) = self.conn.take() {
                std::mem::forget(conn);
            }
        }
    }
}
