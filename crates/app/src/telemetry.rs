use std::io;

use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_LOG_LEVEL: &str = "info";

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the default filter; `EXAM_LOG_JSON=1` switches to JSON
/// lines. Logs go to stderr so they never interleave with the exam screen.
pub(crate) fn init_tracing() -> io::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr);

    let installed = if json_enabled(std::env::var("EXAM_LOG_JSON").ok().as_deref()) {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|err| io::Error::other(err.to_string()))
}

fn json_enabled(raw: Option<&str>) -> bool {
    matches!(
        raw.map(str::trim),
        Some("1" | "true" | "TRUE" | "yes")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_values() {
        assert!(json_enabled(Some("1")));
        assert!(json_enabled(Some(" true ")));
        assert!(!json_enabled(Some("0")));
        assert!(!json_enabled(None));
    }
}
