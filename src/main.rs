use std::path::PathBuf;
use std::sync::Arc;

use strategic_workspace::state::{load_config, load_config_from, AppState};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Optional explicit config path; defaults to ~/.strategic-workspace/config.json
    let config = match std::env::args().nth(1) {
        Some(path) => load_config_from(&PathBuf::from(path)),
        None => load_config(),
    };

    let state = match config.and_then(AppState::from_config) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            log::error!("Startup: {}", e);
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("Startup: failed to build async runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(strategic_workspace::run(state)) {
        log::error!("Fatal: {}", e);
        std::process::exit(1);
    }
}
