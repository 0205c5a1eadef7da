// Exit codes and error reporting for the `mosaic` binary

use crate::config::ConfigError;

/// Exit code for configuration and usage problems the operator can fix
pub const EXIT_USER_ERROR: i32 = 1;
/// Exit code for everything else (I/O failures, logger setup, ...)
pub const EXIT_INTERNAL_ERROR: i32 = 2;

/// Map an error to the process exit code
pub fn exit_code(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<ConfigError>().is_some() {
        EXIT_USER_ERROR
    } else {
        EXIT_INTERNAL_ERROR
    }
}

/// Render the error and its causes the way the binary prints them
pub fn format_error(err: &anyhow::Error) -> String {
    let mut text = match exit_code(err) {
        EXIT_USER_ERROR => format!("Error: {}", err),
        _ => format!("Internal error: {}", err),
    };
    let mut causes = err.chain().skip(1).peekable();
    if causes.peek().is_some() {
        text.push_str("\n\nCaused by:");
        for (indent, cause) in causes.enumerate() {
            text.push_str(&format!("\n{:indent$}  {}", "", cause, indent = indent + 1));
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::PathBuf;

    #[test]
    fn test_config_errors_are_user_errors() {
        let err = anyhow::Error::new(ConfigError::EmptyWorkList);
        assert_eq!(exit_code(&err), EXIT_USER_ERROR);
        assert!(format_error(&err).starts_with("Error: The work list is empty"));
    }

    #[test]
    fn test_other_errors_are_internal() {
        let err = anyhow::Error::new(io::Error::new(io::ErrorKind::Other, "disk full"))
            .context("Failed to open log file /tmp/batch.log");
        assert_eq!(exit_code(&err), EXIT_INTERNAL_ERROR);
        let text = format_error(&err);
        assert!(text.starts_with("Internal error: Failed to open log file"));
        assert!(text.contains("Caused by:\n   disk full"));
    }

    #[test]
    fn test_read_error_keeps_cause() {
        let err = anyhow::Error::new(ConfigError::Read {
            path: PathBuf::from("/etc/pipeline.toml"),
            source: io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
        });
        assert_eq!(exit_code(&err), EXIT_USER_ERROR);
        assert!(format_error(&err).contains("No such file or directory"));
    }
}
