//! Error types for viewer construction and resource loading.

/// Errors that can occur when building or driving a viewer.
#[derive(Debug)]
pub enum Error {
    /// The source configuration was malformed or resolved no scene.
    Config(String),
    /// A resource load failed.
    Load(LoadError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "config error: {}", msg),
            Error::Load(e) => write!(f, "load error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Load(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LoadError> for Error {
    fn from(e: LoadError) -> Self {
        Error::Load(e)
    }
}

/// Errors produced by resource fetch and decode.
///
/// Load failures are recovered locally: the viewer logs them and keeps the
/// previously displayed scene stable.
#[derive(Debug)]
pub enum LoadError {
    /// The resource could not be read.
    Io(std::io::Error),
    /// The image data could not be decoded.
    Decode(String),
    /// The JSON payload could not be parsed.
    Json(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Io(e) => write!(f, "IO error: {}", e),
            LoadError::Decode(msg) => write!(f, "decode error: {}", msg),
            LoadError::Json(msg) => write!(f, "JSON error: {}", msg),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        LoadError::Io(e)
    }
}
