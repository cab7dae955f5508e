//! Namespace registry operations.
//!
//! Namespaces are created lazily: `open_namespace` or the first write into a
//! [`Namespace`] handle registers the name. Deleting a namespace cascades to
//! all of its entries.

use super::connection::CacheDb;
use super::entries::Namespace;
use super::names::CacheName;
use crate::Error;
use tokio_rusqlite::params;

impl CacheDb {
    /// Get a handle to a namespace without creating it.
    pub fn namespace(&self, name: &str) -> Namespace {
        Namespace::new(self.clone(), name.to_string())
    }

    /// Open a namespace, creating it if it doesn't exist.
    pub async fn open_namespace(&self, name: &str) -> Result<Namespace, Error> {
        let owned = name.to_string();
        let created_at = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO namespaces (name, created_at) VALUES (?1, ?2)",
                    params![owned, created_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(self.namespace(name))
    }

    /// Check whether a namespace exists.
    pub async fn has_namespace(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM namespaces WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// List every namespace name, sorted.
    pub async fn namespace_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM namespaces ORDER BY name")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// List the namespaces owned by this cache layer (see [`CacheName::parse`]).
    pub async fn owned_namespaces(&self) -> Result<Vec<String>, Error> {
        let names = self.namespace_names().await?;
        Ok(names.into_iter().filter(|name| CacheName::parse(name).is_some()).collect())
    }

    /// Delete a namespace and all of its entries.
    ///
    /// Returns false if the namespace did not exist.
    pub async fn delete_namespace(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM namespaces WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every namespace whose name starts with `prefix`, in one transaction.
    ///
    /// Returns the deleted names, sorted.
    pub async fn delete_namespaces_with_prefix(&self, prefix: &str) -> Result<Vec<String>, Error> {
        let prefix = prefix.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let tx = conn.transaction()?;
                let names = {
                    let mut stmt = tx.prepare(
                        "SELECT name FROM namespaces WHERE substr(name, 1, length(?1)) = ?1 ORDER BY name",
                    )?;
                    stmt.query_map(params![prefix], |row| row.get(0))?
                        .collect::<Result<Vec<String>, _>>()?
                };
                for name in &names {
                    tx.execute("DELETE FROM namespaces WHERE name = ?1", params![name])?;
                }
                tx.commit()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }
}
