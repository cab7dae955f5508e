//! Storage fault injection for tests.
//!
//! Each fault is a SQLite trigger that aborts the statement touching one
//! namespace, so callers see a real `Error::Database` from the registry.

use super::connection::CacheDb;
use crate::Error;

const TRIGGER_PREFIX: &str = "stash_fault_";

fn quoted(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

impl CacheDb {
    /// Make every deletion of namespace `name` fail.
    pub async fn fail_deletes_of(&self, name: &str) -> Result<(), Error> {
        let sql = format!(
            "CREATE TRIGGER IF NOT EXISTS \"{TRIGGER_PREFIX}delete_{id}\" BEFORE DELETE ON namespaces
             WHEN OLD.name = {name}
             BEGIN SELECT RAISE(ABORT, 'injected delete failure'); END;",
            id = name.replace('"', ""),
            name = quoted(name),
        );
        self.install_fault(sql).await
    }

    /// Make every entry write into namespace `name` fail.
    pub async fn fail_writes_to(&self, name: &str) -> Result<(), Error> {
        let sql = format!(
            "CREATE TRIGGER IF NOT EXISTS \"{TRIGGER_PREFIX}write_{id}\" BEFORE INSERT ON entries
             WHEN NEW.namespace = {name}
             BEGIN SELECT RAISE(ABORT, 'injected write failure'); END;",
            id = name.replace('"', ""),
            name = quoted(name),
        );
        self.install_fault(sql).await
    }

    /// Remove every injected fault.
    pub async fn clear_faults(&self) -> Result<(), Error> {
        self.conn
            .call(|conn| -> Result<(), Error> {
                let triggers = {
                    let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type = 'trigger'")?;
                    stmt.query_map([], |row| row.get(0))?
                        .collect::<Result<Vec<String>, _>>()?
                };
                for trigger in triggers.iter().filter(|t| t.starts_with(TRIGGER_PREFIX)) {
                    conn.execute_batch(&format!("DROP TRIGGER IF EXISTS \"{trigger}\";"))?;
                }
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn install_fault(&self, sql: String) -> Result<(), Error> {
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute_batch(&sql)?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}
