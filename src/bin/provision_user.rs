//! Alta de usuarios en la tabla de credenciales (la app web sólo la lee).
//!
//! Uso: provision_user <username> <name> <password>
//! La ruta de la base de datos sale de APP_USERS_DB (por defecto users.db).

use anyhow::{bail, Result};
use tracing_subscriber::EnvFilter;

use apple_detect::adapters::sqlite::credential_store::SqliteCredentialStore;
use apple_detect::application::services::hash_password;
use apple_detect::config::AppConfig;
use apple_detect::domain::user::User;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [username, name, password] = args.as_slice() else {
        bail!("usage: provision_user <username> <name> <password>");
    };
    if username.is_empty() || password.is_empty() {
        bail!("username and password must not be empty");
    }

    let cfg = AppConfig::from_env()?;
    let store = SqliteCredentialStore::new(&cfg.users_db);
    store.ensure_schema()?;
    store.upsert_user(&User {
        username: username.clone(),
        display_name: name.clone(),
        password_digest: hash_password(password),
    })?;

    tracing::info!(username = %username, db = %store.path().display(), "usuario guardado");
    Ok(())
}
