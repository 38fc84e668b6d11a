mod config;
mod data;
mod disruption;
mod error;
mod grid;
mod server;
mod session;
mod solver;

use config::{ServerConfig, SolverConfig};
use session::Session;
use std::sync::{Arc, Mutex};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::from_env();
    let session = Arc::new(Mutex::new(Session::new(SolverConfig::default())));

    if let Err(e) = server::run_server(config, session).await {
        log::error!("Server stopped: {e}");
        std::process::exit(1);
    }
}
