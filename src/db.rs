use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

use crate::config::DatabaseConfig;

pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    let mut options = PgConnectOptions::new().port(config.port);

    if let Some(host) = &config.host {
        options = options.host(host);
    }
    if let Some(name) = &config.name {
        options = options.database(name);
    }
    if let Some(user) = &config.user {
        options = options.username(user);
    }
    if let Some(password) = &config.password {
        options = options.password(password);
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await
        .with_context(|| {
            format!(
                "Failed to connect to PostgreSQL database '{}' at {}:{}",
                config.name.as_deref().unwrap_or_default(),
                config.host.as_deref().unwrap_or_default(),
                config.port
            )
        })?;

    Ok(pool)
}
