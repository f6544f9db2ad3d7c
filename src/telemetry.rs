//! 日志模块：基于 tracing 的结构化日志初始化。
//!
//! Library code only emits `tracing` events; binaries and tests opt into output by
//! calling [`init_tracing`]. `RUST_LOG` takes precedence over the default directive.

use tracing_subscriber::EnvFilter;

/// Default directive used when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVE: &str = "model3d_forge=info";

/// Install a global fmt subscriber. Returns `false` if one was already installed.
pub fn init_tracing(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_noop() {
        init_tracing(DEFAULT_DIRECTIVE);
        assert!(!init_tracing("debug"));
    }
}
