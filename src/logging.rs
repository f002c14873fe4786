//! tracing subscriber setup.
//!
//! Library code only emits events. The binary installs a subscriber once at startup; tests install
//! one that writes through the test harness so output is captured per test.

use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Installs the global subscriber for the command line tool. `RUST_LOG` overrides `default`.
/// Later calls are ignored.
pub fn init(default: Level, verbose: bool) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(default.into())
        .from_env_lossy();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .with_file(verbose)
        .with_line_number(verbose)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Installs a subscriber that logs through the test harness, at `debug` unless `RUST_LOG` says
/// otherwise. Safe to call from every test.
pub fn init_for_tests() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::DEBUG.into())
        .from_env_lossy();
    let _ = FmtSubscriber::builder()
        .with_test_writer()
        .with_env_filter(env_filter)
        .with_file(true)
        .with_line_number(true)
        .try_init();
}
