use clap::{builder::ValueParser, Arg, ArgAction, Command};

pub const ARG_VERBOSITY: &str = "verbosity";

/// Level names in verbosity order; the index is the `-v` count.
const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Accept a level name or a verbosity count (`IDGATE_LOG_LEVEL=debug` or `=3`).
fn parse_log_level(level: &str) -> Result<u8, String> {
    let level = level.trim().to_lowercase();
    if let Ok(count) = level.parse::<u8>() {
        if usize::from(count) < LEVELS.len() {
            return Ok(count);
        }
        return Err(format!("log level must be 0-{}", LEVELS.len() - 1));
    }

    LEVELS
        .iter()
        .position(|name| *name == level)
        .and_then(|index| u8::try_from(index).ok())
        .ok_or_else(|| format!("invalid log level '{level}', expected one of: {}", LEVELS.join(", ")))
}

#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(parse_log_level)
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help(
                "Log level: -v warn, -vv info, -vvv debug, -vvvv trace (default: error). \
                 hyper, tokio and sqlx stay at error; RUST_LOG directives still apply",
            )
            .env("IDGATE_LOG_LEVEL")
            .global(true)
            .action(ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}
