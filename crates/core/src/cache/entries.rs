//! Cache entries: stored response snapshots keyed by request.
//!
//! A [`Namespace`] is a cheap handle (connection clone + name). Writes are
//! single-row upserts inside a transaction, so a concurrent reader sees either
//! the old or the new entry, never a mix. Concurrent writes to one key are
//! last-write-wins.

use super::connection::CacheDb;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// Snapshot of a response as stored in a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl StoredResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self { status, headers, body }
    }

    /// First header value with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// An entry to be written by [`Namespace::put_all`].
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub key: String,
    pub url: String,
    pub response: StoredResponse,
}

/// Handle to one named namespace.
#[derive(Clone, Debug)]
pub struct Namespace {
    db: CacheDb,
    name: String,
}

impl Namespace {
    pub(crate) fn new(db: CacheDb, name: String) -> Self {
        Self { db, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up an entry by request key.
    ///
    /// Returns None when either the key or the whole namespace is absent.
    pub async fn match_key(&self, key: &str) -> Result<Option<StoredResponse>, Error> {
        let name = self.name.clone();
        let key = key.to_string();
        self.db
            .conn
            .call(move |conn| -> Result<Option<StoredResponse>, Error> {
                let result = conn.query_row(
                    "SELECT status, headers_json, body FROM entries WHERE namespace = ?1 AND key = ?2",
                    params![name, key],
                    |row| {
                        Ok((
                            row.get::<_, u16>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Vec<u8>>(2)?,
                        ))
                    },
                );

                match result {
                    Ok((status, headers_json, body)) => {
                        let headers = serde_json::from_str(&headers_json)
                            .map_err(|e| Error::Serialization(e.to_string()))?;
                        Ok(Some(StoredResponse { status, headers, body }))
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace a single entry, creating the namespace if needed.
    pub async fn put(&self, key: &str, url: &str, response: &StoredResponse) -> Result<(), Error> {
        self.put_all(vec![NewEntry { key: key.to_string(), url: url.to_string(), response: response.clone() }])
            .await
            .map(|_| ())
    }

    /// Write a batch of entries in one transaction.
    ///
    /// Either every entry is committed or none is. Returns the number written.
    pub async fn put_all(&self, entries: Vec<NewEntry>) -> Result<usize, Error> {
        let name = self.name.clone();
        // Fixed-width timestamps keep `ORDER BY stored_at` chronological.
        let stored_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true);
        let rows = entries
            .into_iter()
            .map(|entry| {
                let headers_json = serde_json::to_string(&entry.response.headers)
                    .map_err(|e| Error::Serialization(e.to_string()))?;
                Ok((entry, headers_json))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        self.db
            .conn
            .call(move |conn| -> Result<usize, Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO namespaces (name, created_at) VALUES (?1, ?2)",
                    params![name, stored_at],
                )?;
                for (entry, headers_json) in &rows {
                    tx.execute(
                        "INSERT INTO entries (namespace, key, url, status, headers_json, body, stored_at)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                        ON CONFLICT(namespace, key) DO UPDATE SET
                            url = excluded.url,
                            status = excluded.status,
                            headers_json = excluded.headers_json,
                            body = excluded.body,
                            stored_at = excluded.stored_at",
                        params![
                            name,
                            entry.key,
                            entry.url,
                            entry.response.status,
                            headers_json,
                            entry.response.body,
                            stored_at,
                        ],
                    )?;
                }
                tx.commit()?;
                Ok(rows.len())
            })
            .await
            .map_err(Error::from)
    }

    /// Remove one entry. Returns false if it was absent.
    pub async fn delete(&self, key: &str) -> Result<bool, Error> {
        let name = self.name.clone();
        let key = key.to_string();
        self.db
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted =
                    conn.execute("DELETE FROM entries WHERE namespace = ?1 AND key = ?2", params![name, key])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in the namespace.
    pub async fn len(&self) -> Result<u64, Error> {
        let name = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE namespace = ?1", params![name], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// URLs of all stored entries, oldest write first.
    pub async fn urls(&self) -> Result<Vec<String>, Error> {
        let name = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt =
                    conn.prepare("SELECT url FROM entries WHERE namespace = ?1 ORDER BY stored_at ASC, rowid ASC")?;
                let urls = stmt
                    .query_map(params![name], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(urls)
            })
            .await
            .map_err(Error::from)
    }

    /// Drop the oldest entries until at most `max_entries` remain.
    ///
    /// The entry stored under `pinned`, if any, is never dropped. Returns the
    /// number of deleted entries.
    pub async fn trim(&self, max_entries: usize, pinned: Option<&str>) -> Result<u64, Error> {
        let name = self.name.clone();
        let pinned = pinned.map(str::to_string);
        let max = i64::try_from(max_entries).unwrap_or(i64::MAX);
        self.db
            .conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE namespace = ?1", params![name], |row| {
                        row.get(0)
                    })?;
                if count <= max {
                    return Ok(0);
                }

                let to_delete = count - max;
                let deleted = conn.execute(
                    "DELETE FROM entries WHERE rowid IN (
                    SELECT rowid FROM entries WHERE namespace = ?1 AND key IS NOT ?3
                    ORDER BY stored_at ASC, rowid ASC LIMIT ?2
                )",
                    params![name, to_delete, pinned],
                )?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }
}
