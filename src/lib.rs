pub mod asset_source;
pub mod config;
pub mod error;
pub mod http_server;
pub mod hub_client;
pub mod model;
pub mod playlist;
pub mod presentation;
pub mod scheduler;
pub mod settings_watch;
pub mod shuffle;
pub mod slideshow_controller;
pub mod status_reporter;

#[cfg(test)]
mod test_support;
