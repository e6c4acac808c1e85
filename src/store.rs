use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OptionalExtension};

use crate::error::Error;
use crate::models::Session;

/// Durable key/value store for the four session fields.
///
/// The SQLite analog of the original client's local storage: a small table
/// keyed by field name that survives process restarts. `get` fails closed,
/// treating a partial or empty record as no session at all; `set` writes all
/// four fields in one transaction so no reader observes a partial update.
#[derive(Clone)]
pub struct SessionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SessionStore {
    pub fn open(path: &Path) -> Result<Self, Error> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, Error> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, Error> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS session (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Returns the stored session, or `None` unless all four fields are
    /// present and non-empty.
    pub fn get(&self) -> Result<Option<Session>, Error> {
        let conn = self.conn.lock().unwrap();

        let access_token = read_key(&conn, "access_token")?;
        let refresh_token = read_key(&conn, "refresh_token")?;
        let user_id = read_key(&conn, "user_id")?;
        let username = read_key(&conn, "username")?;

        match (access_token, refresh_token, user_id, username) {
            (Some(access_token), Some(refresh_token), Some(user_id), Some(username)) => {
                Ok(Some(Session {
                    access_token,
                    refresh_token,
                    user_id,
                    username,
                }))
            }
            _ => Ok(None),
        }
    }

    pub fn set(&self, session: &Session) -> Result<(), Error> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        for (key, value) in [
            ("access_token", &session.access_token),
            ("refresh_token", &session.refresh_token),
            ("user_id", &session.user_id),
            ("username", &session.username),
        ] {
            tx.execute(
                "INSERT INTO session (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                (key, value),
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM session", [])?;
        Ok(())
    }
}

fn read_key(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    let value: Option<String> = conn
        .query_row("SELECT value FROM session WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()?;

    // An empty value counts as absent.
    Ok(value.filter(|v| !v.is_empty()))
}
