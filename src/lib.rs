pub mod archive;
pub mod client;
pub mod config;
pub mod deploy;
pub mod errors;
pub mod progress;
pub mod revision;
pub mod ui;
pub mod util;
