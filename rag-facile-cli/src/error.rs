use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by CLI commands
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Source directory {} does not exist", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("I/O error at {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk directory tree")]
    Walk(#[from] walkdir::Error),

    #[error("Invalid ignore pattern")]
    Pattern(#[from] globset::Error),

    #[error("Invalid substitution pattern")]
    Regex(#[from] regex::Error),

    #[error("Failed to render YAML")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Prompt failed")]
    Prompt(#[from] dialoguer::Error),

    #[error("Aborted")]
    Aborted,
}

impl CliError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CliError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Format an error with its full source chain, one cause per segment.
pub fn format_error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_chain() {
        let err = CliError::io(
            "apps/chainlit-chat/app.py",
            std::io::Error::other("permission denied"),
        );
        assert_eq!(
            format_error_chain(&err),
            "I/O error at apps/chainlit-chat/app.py: permission denied"
        );
    }
}
