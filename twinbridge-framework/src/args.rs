//! CLI argument parsing for bridges.

use std::path::PathBuf;

use clap::Parser;

/// Common CLI arguments for all bridges.
///
/// Bridges embed this with `#[command(flatten)]` and add their own flags.
#[derive(Parser, Debug, Clone)]
#[command(about = "twinbridge telemetry bridge")]
pub struct BridgeArgs {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long, default_value = "twinbridge.json5")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_default_config() {
        let args = BridgeArgs::try_parse_from(["bridge"]).unwrap();
        assert_eq!(args.config, PathBuf::from("twinbridge.json5"));
        assert_eq!(args.log_level, None);
    }

    #[test]
    fn test_args_overrides() {
        let args =
            BridgeArgs::try_parse_from(["bridge", "-c", "site.json5", "--log-level", "debug"])
                .unwrap();
        assert_eq!(args.config, PathBuf::from("site.json5"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }
}
