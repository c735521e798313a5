use carhaul_migrate::MigrateError;
use colored::Colorize;
use std::fmt;
use std::process;

/// Exit codes for the CLI.
#[allow(dead_code)]
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_USAGE: i32 = 2;

/// Unified error type for CLI operations.
pub enum CliError {
    /// Worker-layer error surfaced before item processing began.
    Migrate(MigrateError),
    /// Bad stdin line, unreadable input, parse failure.
    Input(String),
    /// Argument / usage errors.
    Usage(String),
    /// I/O failure on stdin/stdout.
    Io(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Migrate(e) => write!(f, "{} {e}", "error:".red().bold()),
            CliError::Input(msg) => write!(f, "{} {msg}", "error:".red().bold()),
            CliError::Usage(msg) => write!(f, "{} {msg}", "error:".red().bold()),
            CliError::Io(msg) => write!(f, "{} {msg}", "error:".red().bold()),
        }
    }
}

impl fmt::Debug for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<MigrateError> for CliError {
    fn from(e: MigrateError) -> Self {
        CliError::Migrate(e)
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e.to_string())
    }
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Print the error and exit with its code.
pub fn exit_with_error(err: CliError) -> ! {
    eprintln!("{err}");
    let code = match err {
        CliError::Usage(_) => EXIT_USAGE,
        _ => EXIT_ERROR,
    };
    process::exit(code);
}
