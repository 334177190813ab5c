use chrono::Duration;
use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::model::{
    db::user::ensure_admin_exists,
    mongodb::{ensure_indexes_exist, Coll},
};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    access_ttl: u32,
    refresh_ttl: u32,
    // secrets
    access_token_secret: String,
    refresh_token_secret: String,
}

impl Config {
    /// Valid lifetime of access tokens in seconds.
    pub fn access_ttl(&self) -> Duration {
        Duration::seconds(self.access_ttl.into())
    }

    /// Valid lifetime of refresh tokens in seconds.
    pub fn refresh_ttl(&self) -> Duration {
        Duration::seconds(self.refresh_ttl.into())
    }

    /// Secret key used to sign access tokens.
    pub fn access_secret(&self) -> &[u8] {
        self.access_token_secret.as_bytes()
    }

    /// Secret key used to sign refresh tokens. Independent of the access
    /// secret, so neither token class can impersonate the other.
    pub fn refresh_secret(&self) -> &[u8] {
        self.refresh_token_secret.as_bytes()
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Configuration for the database, plus the bootstrap admin credentials.
#[derive(Deserialize)]
struct DbConfig {
    // secrets
    db_uri: String,
    admin_email: Option<String>,
    admin_password: Option<String>,
}

/// A fairing that loads the MongoDB config, connects to the database,
/// performs any setup necessary, and places both a `Client` and a `Database`
/// into managed state.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");
        // Construct the connection.
        let client = match MongoClient::with_uri_str(config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(&get_database_name());

        // Ensure the unique indexes that back the integrity invariants exist.
        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to connect to database: {e}");
            return Err(rocket);
        }

        // Ensure there is at least one admin user.
        if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
            let users = Coll::from_db(&db);
            let new_users = Coll::from_db(&db);
            if let Err(e) = ensure_admin_exists(&users, &new_users, email, password).await {
                error!("Failed to bootstrap admin account: {e}");
                return Err(rocket);
            }
        } else {
            warn!("No bootstrap admin credentials configured");
        }
        info!("...database connection online!");

        // Manage the state.
        rocket = rocket.manage(client).manage(db);
        Ok(rocket)
    }
}

/// Get the name of the database to use (production version).
#[cfg(not(test))]
fn get_database_name() -> String {
    "securevote".to_string()
}

/// Get the name of the database to use (test version).
/// Use a random name to avoid collisions between tests.
#[cfg(test)]
fn get_database_name() -> String {
    let random: u32 = rand::random();
    let db = format!("test{random}");
    info!("Using database {db}");
    db
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Config {
        pub fn example() -> Self {
            Self {
                access_ttl: 900,
                refresh_ttl: 604800,
                access_token_secret: "test access secret".to_string(),
                refresh_token_secret: "test refresh secret".to_string(),
            }
        }
    }
}
