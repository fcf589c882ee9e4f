//! Error handling for notchladder
//!
//! Contract violations (bad parameter names, missing input) are fatal to the
//! call that triggered them. Numerical edge cases inside the window loop are
//! recoverable and handled by the pipeline.

use thiserror::Error;

/// Result type alias for notchladder operations
pub type Result<T> = std::result::Result<T, LadderError>;

/// Main error type for notchladder operations
#[derive(Error, Debug)]
pub enum LadderError {
    // Parameter Errors
    #[error("Unknown parameter: {name}")]
    UnknownParameter { name: String },

    #[error("Invalid value {value} for {name}: expected {expected}")]
    InvalidParameter {
        name: String,
        value: String,
        expected: String,
    },

    #[error("Unsupported language: {code}")]
    UnsupportedLanguage { code: String },

    // Pipeline Errors
    #[error("Pipeline input was never set")]
    PipelineNotConfigured,

    #[error("Processing cancelled after {windows_done} windows")]
    Cancelled { windows_done: usize },

    #[error("Unknown treatment '{name}' in segment '{segment}'")]
    UnknownTreatment { name: String, segment: String },

    #[error("Segment '{segment}' weights sum to {sum:.4}, expected 1.0")]
    UnnormalizedWeights { segment: String, sum: f64 },

    // Numerical Errors (recoverable)
    #[error("Degenerate filter window at {center_hz:.1} Hz: {reason}")]
    DegenerateFilterWindow { center_hz: f64, reason: String },

    #[error("Buffer is silent, nothing to normalize")]
    SilentBuffer,

    #[error("Buffer contains NaN or infinite samples")]
    NonFiniteSamples,

    // Audio Errors
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid audio: {reason}")]
    InvalidAudio {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LadderError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            LadderError::UnknownParameter { .. } => "UNKNOWN_PARAMETER",
            LadderError::InvalidParameter { .. } => "INVALID_PARAMETER",
            LadderError::UnsupportedLanguage { .. } => "UNSUPPORTED_LANGUAGE",
            LadderError::PipelineNotConfigured => "PIPELINE_NOT_CONFIGURED",
            LadderError::Cancelled { .. } => "CANCELLED",
            LadderError::UnknownTreatment { .. } => "UNKNOWN_TREATMENT",
            LadderError::UnnormalizedWeights { .. } => "UNNORMALIZED_WEIGHTS",
            LadderError::DegenerateFilterWindow { .. } => "DEGENERATE_FILTER_WINDOW",
            LadderError::SilentBuffer => "SILENT_BUFFER",
            LadderError::NonFiniteSamples => "NON_FINITE_SAMPLES",
            LadderError::FileNotFound { .. } => "FILE_NOT_FOUND",
            LadderError::InvalidAudio { .. } => "INVALID_AUDIO",
            LadderError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            LadderError::Io(_) => "IO_ERROR",
            LadderError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is recovered locally by the pipeline
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LadderError::DegenerateFilterWindow { .. }
                | LadderError::SilentBuffer
                | LadderError::NonFiniteSamples
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            LadderError::UnknownParameter { .. } => vec![
                "Run 'notchladder-cli params' to list the known parameter names",
                "Check the spelling in your overrides file",
            ],
            LadderError::UnsupportedLanguage { .. } => vec!["Supported languages: en, nl"],
            LadderError::PipelineNotConfigured => {
                vec!["Bind an input buffer with set_input() before execute()"]
            }
            LadderError::UnnormalizedWeights { .. } => vec![
                "Make the weights of every segment add up to 1.0",
                "Or switch the weight mode to \"literal\"",
            ],
            LadderError::DegenerateFilterWindow { .. } => vec![
                "Keep ladder frequencies below half the sample rate",
                "The affected window was passed through unfiltered",
            ],
            LadderError::UnsupportedFormat { .. } => vec![
                "Convert the file to a mono or stereo WAV first",
                "Supported bit depths: 8, 16, 24, 32 (int) and 32 (float)",
            ],
            _ => vec![],
        }
    }
}
