#[macro_use]
extern crate rocket;

#[macro_use]
extern crate log;

use rocket::{Build, Rocket};

pub mod api;
pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod model;

pub use config::Config;

/// Build the server: config, database, and ledger mirror are brought up by
/// their fairings at ignition, in that order.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .attach(logging::LoggerFairing)
        .attach(config::ConfigFairing)
        .attach(config::DatabaseFairing)
        .attach(ledger::MirrorFairing)
        .mount("/", api::routes())
        .register("/", api::catchers())
}
