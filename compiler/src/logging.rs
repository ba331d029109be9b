//! Logging setup for the wavefront backend
//!
//! Passes log through the `log` facade; this module wires it to
//! `env_logger`. Levels are used as follows:
//!
//! - `info!` - one summary line per pass run
//! - `debug!` - classification results, loop headers being finished
//! - `trace!` - every value definition, synthesized phi and coercion
//!
//! `RUST_LOG` filters by module, e.g.
//!
//! ```bash
//! RUST_LOG=wavefront_compiler::ir::split_vectors=trace cargo test
//! ```

use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;
use std::sync::Once;

static INIT: Once = Once::new();

/// Module path of the vector splitting pass, for targeted filters.
pub const SPLIT_VECTORS_TARGET: &str = "wavefront_compiler::ir::split_vectors";

/// Initialize logging at Warn level.
///
/// This only initializes once; subsequent calls are no-ops.
pub fn init() {
    init_with_level(LevelFilter::Warn);
}

/// Initialize logging with a specific level.
///
/// This only initializes once; subsequent calls are no-ops.
pub fn init_with_level(level: LevelFilter) {
    INIT.call_once(|| {
        Builder::new()
            .filter_level(level)
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{:5}] {} - {}",
                    record.level(),
                    record.module_path().unwrap_or("unknown"),
                    record.args()
                )
            })
            .init();
    });
}

/// Warn everywhere, but trace the vector splitting pass.
pub fn init_split_vectors_trace() {
    INIT.call_once(|| {
        Builder::new()
            .filter_level(LevelFilter::Warn)
            .filter_module(SPLIT_VECTORS_TARGET, LevelFilter::Trace)
            .init();
    });
}

/// Initialize logging from `RUST_LOG`, defaulting to Warn.
pub fn init_from_env() {
    INIT.call_once(|| {
        Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    });
}

/// Initialize logging for tests. Output is captured by the test harness and
/// repeated calls are harmless.
pub fn init_test() {
    let _ = env_logger::builder()
        .filter_level(LevelFilter::Warn)
        .parse_default_env()
        .is_test(true)
        .try_init();
}

/// Whether one of the `init*` functions (other than `init_test`) ran.
pub fn is_initialized() -> bool {
    INIT.is_completed()
}
