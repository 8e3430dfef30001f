use thiserror::Error;

/// Main error type for the Pulse-Compositor library
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Module error: {0}")]
    Module(#[from] ModuleError),

    #[error("Layer error: {0}")]
    Layer(#[from] LayerError),

    #[error("Palette error: {0}")]
    Palette(#[from] PaletteError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Module runtime errors
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("Module not registered: {name}")]
    NotRegistered { name: String },

    #[error("No active module named: {name}")]
    NotActive { name: String },

    #[error("Shader preparation failed for {name}: {reason}")]
    PreparationFailed { name: String, reason: String },

    #[error("Unknown group {group} on module {name}")]
    UnknownGroup { name: String, group: String },

    #[error("Invalid parameter {param} on module {name}: {details}")]
    InvalidParameter {
        name: String,
        param: String,
        details: String,
    },
}

/// Layer stack errors
#[derive(Error, Debug)]
pub enum LayerError {
    #[error("No layer at index {index}")]
    NotFound { index: usize },

    #[error("Layer {index} is locked")]
    Locked { index: usize },
}

/// Palette engine errors
#[derive(Error, Debug)]
pub enum PaletteError {
    #[error("Palette not found: {id}")]
    NotFound { id: String },

    #[error("Palette worker unavailable: {reason}")]
    WorkerUnavailable { reason: String },
}

/// Audio feed and beat detection errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Feature extraction failed: {reason}")]
    ExtractionFailed { reason: String },

    #[error("Invalid audio parameters: {details}")]
    InvalidParameters { details: String },
}

/// Render pass errors
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Module draw failed: {module} - {reason}")]
    DrawFailed { module: String, reason: String },

    #[error("Output surface unavailable: {reason}")]
    OutputUnavailable { reason: String },

    #[error("Frame mux failed: {reason}")]
    MuxFailed { reason: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Check if this error leaves the render loop able to continue
    ///
    /// A single module fault or a transient palette skew must not wedge the
    /// scheduler; configuration and IO failures are permanent.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Render(RenderError::DrawFailed { .. }) => true,
            Self::Palette(PaletteError::NotFound { .. }) => true,
            Self::Module(ModuleError::NotActive { .. }) => true,
            _ => false,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Render(RenderError::OutputUnavailable { reason }) => {
                format!(
                    "Could not open the output surface ({}). Please check your display configuration and restart.",
                    reason
                )
            }
            Self::Module(ModuleError::NotRegistered { name }) => {
                format!("Module '{}' is not registered. Check the module name and registration order.", name)
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}
