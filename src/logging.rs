//! Structured logging setup.
//!
//! `RUST_LOG` controls the filter; the default level is `speechset=info`.
//! Output goes to stderr so progress bars own stdout.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber. Safe to call more than once;
/// later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("speechset=info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_does_not_panic_when_called_twice() {
        init();
        init();
    }
}
