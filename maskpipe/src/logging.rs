use std::path::Path;

use flexi_logger::{Cleanup, Criterion, Duplicate, FileSpec, FlexiLoggerError, Logger, LoggerHandle, Naming};

/// Starts the global logger.
///
/// `RUST_LOG` overrides `base_level`. Without `log_dir` everything goes to
/// stderr; with it, a rotating log file is written there and info and above
/// is duplicated to stderr. Keep the returned handle alive for the whole run.
pub fn setup_logging(base_level: &str, log_dir: Option<&Path>) -> Result<LoggerHandle, FlexiLoggerError> {
    let logger = Logger::try_with_env_or_str(base_level)?;

    match log_dir {
        Some(dir) => logger
            .log_to_file(
                FileSpec::default()
                    .directory(dir)
                    .basename("maskpipe"),
            )
            .duplicate_to_stderr(Duplicate::Info)
            .rotate(
                Criterion::Size(1024 * 1024), //1MB
                Naming::Timestamps,
                Cleanup::KeepLogFiles(5),
            )
            .start(),
        None => logger.log_to_stderr().start(),
    }
}
