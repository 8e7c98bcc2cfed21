pub mod auth;
pub mod commands;
pub mod configuration;
pub mod logging;
pub mod openapi;
pub mod routes;
pub mod slack;
pub mod state;
#[cfg(test)]
mod test_support;

pub use state::{AppState, SlackState};
