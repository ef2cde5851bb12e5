#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod cache;
pub mod comments;
pub mod config;
pub mod data;
pub mod feed;
pub mod format;
pub mod model;
pub mod player;
pub mod richtext;
pub mod session;
pub mod ui;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
