pub mod app;
pub mod artwork;
pub mod color;
pub mod config;
pub mod logging;
pub mod poller;
pub mod state;
pub mod status;
pub mod view;
