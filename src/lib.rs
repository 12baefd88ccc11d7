use diesel_migrations::{EmbeddedMigrations, embed_migrations};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

pub mod api;
pub mod auth;
pub mod config;
pub mod questions;
pub mod reports;
pub mod schema;
pub mod staff;
pub mod state;
pub mod surveys;
pub mod template;
pub mod users;
pub mod util_resp;
pub mod validation;
pub mod widgets;

#[cfg(test)]
mod test;
