//! Startup: open the store, seed the first admin, wire the state and serve.

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::auth::{hash_password, TokenIssuer};
use crate::config::{Config, DEV_JWT_SECRET};
use crate::metrics::Sampler;
use crate::probe::{HostProbe, SysinfoProbe};
use crate::routes::router;
use crate::sampler::spawn_collector;
use crate::state::AppState;
use crate::store::users::Role;
use crate::store::Database;

/// Create the configured admin account if the users table is still empty.
/// Returns whether an account was created.
pub fn seed_admin(db: &Database, config: &Config) -> anyhow::Result<bool> {
    let Some((username, password)) = config.admin_seed.as_ref() else {
        return Ok(false);
    };
    if db.user_count()? > 0 {
        return Ok(false);
    }
    let hash = hash_password(password, config.bcrypt_cost)?;
    db.create_user(username, &hash, Role::Admin)
        .with_context(|| format!("seeding admin user {username:?}"))?;
    info!(user = %username, "created initial admin account");
    Ok(true)
}

pub fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let db = Database::open(&config.db_path)
        .with_context(|| format!("opening database {}", config.db_path.display()))?;
    seed_admin(&db, config)?;

    if config.jwt_secret == DEV_JWT_SECRET {
        warn!("PANEL_JWT_SECRET is not set; using the development secret");
    }
    let probe: Box<dyn HostProbe> = Box::new(SysinfoProbe::new());
    let sampler = Sampler::with_cpu_interval(probe, config.cpu_interval);
    Ok(
        AppState::new(sampler, db, TokenIssuer::new(&config.jwt_secret))
            .with_collect_token(config.collect_token.clone()),
    )
}

pub async fn serve(config: Config) -> anyhow::Result<()> {
    let state = build_state(&config)?;
    if let Some(period) = config.collect_interval {
        spawn_collector(state.clone(), period);
    }

    let addr = config.addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("panel agent listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_seed() -> Config {
        Config {
            admin_seed: Some(("admin".into(), "s3cret".into())),
            bcrypt_cost: 4,
            ..Config::default()
        }
    }

    #[test]
    fn seeds_admin_once() {
        let db = Database::open_in_memory().unwrap();
        let cfg = config_with_seed();
        assert!(seed_admin(&db, &cfg).unwrap());
        assert!(!seed_admin(&db, &cfg).unwrap());
        let admin = db.find_user_by_username("admin").unwrap().unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert!(crate::auth::verify_password("s3cret", &admin.password_hash));
    }

    #[test]
    fn no_seed_without_credentials() {
        let db = Database::open_in_memory().unwrap();
        assert!(!seed_admin(&db, &Config::default()).unwrap());
        assert_eq!(db.user_count().unwrap(), 0);
    }
}
