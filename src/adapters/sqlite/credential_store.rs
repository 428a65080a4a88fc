use anyhow::Result;
use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};

use crate::application::ports::CredentialStorePort;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::user::User;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
  username TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  password TEXT NOT NULL
);
"#;

/// Tabla `users(username, name, password)` en SQLite.
///
/// La app web sólo la lee. Cada consulta abre su propia conexión de sólo lectura.
pub struct SqliteCredentialStore {
    path: PathBuf,
}

impl SqliteCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Crea la tabla si falta. La usa la herramienta de alta, no el servidor.
    pub fn ensure_schema(&self) -> Result<()> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Inserta o reemplaza un usuario. `password_digest` ya viene con hash.
    pub fn upsert_user(&self, user: &User) -> Result<()> {
        let conn = Connection::open(&self.path)?;
        conn.execute(
            "INSERT INTO users (username, name, password) VALUES (?1, ?2, ?3)
             ON CONFLICT(username) DO UPDATE SET name = excluded.name, password = excluded.password",
            params![user.username, user.display_name, user.password_digest],
        )?;
        Ok(())
    }

    fn lookup(path: &Path, username: &str) -> Result<Option<User>> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let user = conn
            .query_row(
                "SELECT name, password FROM users WHERE username = ?1",
                params![username],
                |row| {
                    Ok(User {
                        username: username.to_string(),
                        display_name: row.get(0)?,
                        password_digest: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }
}

#[async_trait]
impl CredentialStorePort for SqliteCredentialStore {
    async fn find_user(&self, username: &str) -> DomainResult<Option<User>> {
        let path = self.path.clone();
        let username = username.to_string();
        tokio::task::spawn_blocking(move || Self::lookup(&path, &username))
            .await
            .map_err(|e| DomainError::OperationFailed(e.to_string()))?
            .map_err(|e| DomainError::OperationFailed(format!("credential store: {e:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::hash_password;

    fn store_with_alice() -> (tempfile::TempDir, SqliteCredentialStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteCredentialStore::new(dir.path().join("users.db"));
        store.ensure_schema().unwrap();
        store
            .upsert_user(&User {
                username: "alice".into(),
                display_name: "Alice A.".into(),
                password_digest: hash_password("secret123"),
            })
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn finds_existing_user() {
        let (_dir, store) = store_with_alice();
        let user = store.find_user("alice").await.unwrap().unwrap();
        assert_eq!(user.display_name, "Alice A.");
        assert_eq!(user.password_digest, hash_password("secret123"));
    }

    #[tokio::test]
    async fn unknown_user_is_none() {
        let (_dir, store) = store_with_alice();
        assert!(store.find_user("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lookup_is_case_sensitive() {
        let (_dir, store) = store_with_alice();
        assert!(store.find_user("ALICE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_replaces_password() {
        let (_dir, store) = store_with_alice();
        store
            .upsert_user(&User {
                username: "alice".into(),
                display_name: "Alice B.".into(),
                password_digest: hash_password("other"),
            })
            .unwrap();
        let user = store.find_user("alice").await.unwrap().unwrap();
        assert_eq!(user.display_name, "Alice B.");
        assert_eq!(user.password_digest, hash_password("other"));
    }

    #[tokio::test]
    async fn missing_database_is_an_error_not_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteCredentialStore::new(dir.path().join("absent.db"));
        assert!(store.find_user("alice").await.is_err());
    }
}
