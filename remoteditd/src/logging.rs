use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_FILTER: &str = "info";

/// Picks the filter directive: an explicit value wins, then `RUST_LOG`,
/// then `info`.
pub fn resolve_filter(explicit: Option<&str>) -> String {
    explicit
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| {
            std::env::var("RUST_LOG")
                .ok()
                .filter(|value| !value.trim().is_empty())
        })
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

/// Installs the stderr subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init(explicit: Option<&str>) {
    let filter = EnvFilter::try_new(resolve_filter(explicit))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_filter_wins() {
        assert_eq!(resolve_filter(Some(" remoteditd=debug ")), "remoteditd=debug");
    }

    #[test]
    fn blank_explicit_filter_falls_through() {
        let resolved = resolve_filter(Some("  "));
        assert!(!resolved.trim().is_empty());
    }

    #[test]
    fn init_twice_does_not_panic() {
        init(Some("warn"));
        init(Some("debug"));
    }
}
