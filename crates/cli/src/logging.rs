use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Default filter directives for a `-v` count. `RUST_LOG` overrides them.
pub fn default_filter(verbosity: u8) -> &'static str {
	// 0 = warnings only
	// 1 (-v) = info for vipnode, warn for dependencies
	// 2+ (-vv) = debug everywhere
	match verbosity {
		0 => "warn",
		1 => "warn,vipnode=info",
		_ => "debug",
	}
}

pub fn init_logging(verbosity: u8) {
	let env_filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_filter_parses() {
		for verbosity in 0..4 {
			let directives = default_filter(verbosity);
			assert!(EnvFilter::try_new(directives).is_ok(), "{directives}");
		}
	}

	#[test]
	fn test_verbosity_levels() {
		assert_eq!(default_filter(0), "warn");
		assert!(default_filter(1).contains("vipnode=info"));
		assert_eq!(default_filter(2), default_filter(7));
	}
}
