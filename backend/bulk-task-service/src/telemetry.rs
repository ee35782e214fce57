/// Tracing setup shared by the service and worker binaries
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `default_directives`; `LOG_FORMAT=json` switches to
/// JSON lines.
pub fn init_tracing(default_directives: &[&str]) -> anyhow::Result<()> {
    let mut filter = EnvFilter::from_default_env();
    if std::env::var("RUST_LOG").is_err() {
        for directive in default_directives {
            filter = filter.add_directive(directive.parse()?);
        }
    }

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))
}
