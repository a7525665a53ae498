//! Tracing initialization driven by `-v`/`-vv`/`-vvv`.

use crate::app::config::AppConfig;
use tracing::{debug, trace};

pub fn init_logging(config: &AppConfig) {
    let log_level = config.log_level();

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(config.verbose >= 2)
        .with_thread_ids(config.verbose >= 3)
        .with_line_number(config.verbose >= 3)
        .init();

    debug!("claude-workflow started with verbosity level: {}", config.verbose);
    trace!("full CLI args: {:?}", std::env::args().collect::<Vec<_>>());
}
