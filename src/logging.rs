//! Logger setup for programs embedding the engine

use log::LevelFilter;

/// Map a `-v` count to a level filter.
///
/// 0 = warn, 1 = info, 2 = debug, 3+ = trace; `quiet` wins and keeps errors only.
pub fn level_for(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Install an `env_logger` logger.
///
/// `RUST_LOG` still refines the filter per module. Calling this more than
/// once is harmless; only the first call installs a logger.
pub fn init(verbose: u8, quiet: bool) {
    let result = env_logger::Builder::new()
        .filter_level(level_for(verbose, quiet))
        .parse_default_env()
        .format_timestamp(None)
        .try_init();

    if result.is_err() {
        log::debug!("Logger already initialized");
    }
}
