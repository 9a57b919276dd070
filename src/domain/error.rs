use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("Invalid YouTube URL or video ID: {0}")]
    InvalidInput(String),

    #[error("Download failed: {0}")]
    FetchFailed(String),

    #[error("Download finished but the file could not be verified: {0}")]
    VerificationFailed(String),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Download cancelled")]
    Cancelled,

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    /// Short machine-friendly name of the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "invalid_input",
            AppError::FetchFailed(_) => "fetch_failed",
            AppError::VerificationFailed(_) => "verification_failed",
            AppError::FileSystem(_) => "file_system",
            AppError::Cancelled => "cancelled",
            AppError::Unexpected(_) => "unexpected",
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::FileSystem(e.to_string())
    }
}
