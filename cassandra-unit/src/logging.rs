//! Logger setup for test binaries

use std::sync::Once;

/// Environment variable holding the `env_logger` filter
pub const LOG_ENV: &str = "CASSANDRA_UNIT_LOG";

const DEFAULT_FILTER: &str = "warn";

static INIT: Once = Once::new();

/// Install an `env_logger` once per process.
///
/// The filter comes from `CASSANDRA_UNIT_LOG` (default `warn`). Output goes
/// through the test harness capture. A logger installed by someone else is
/// left in place.
pub fn init() {
    INIT.call_once(|| {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().filter_or(LOG_ENV, DEFAULT_FILTER))
            .is_test(true)
            .try_init();
    });
}
