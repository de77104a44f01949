pub mod clash;
pub mod cli;
pub mod descriptor;
pub mod filter;
pub mod helpers;
pub mod parser;
pub mod probe;
pub mod server;
pub mod service;
pub mod settings;
pub mod singbox;
pub mod store;

pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
