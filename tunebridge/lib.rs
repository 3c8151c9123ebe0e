pub mod bus;
pub mod config;
pub mod control;
pub mod download;
pub mod error;
pub mod headless;
pub mod media;
pub mod plugin;
pub mod resolver;
pub mod store;
pub mod update;
pub mod window;
