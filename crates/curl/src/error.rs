use thiserror::Error;

/// The failure value reported by the transfer engine.
///
/// This is the engine-native error carried, unmodified, inside
/// [`CurlError::Init`], [`CurlError::Transfer`] and [`CurlError::FormBuild`]
/// and inside [`EventKind::Error`](crate::multi::EventKind::Error).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (code {code})")]
pub struct EngineError {
    code: i32,
    message: String,
}

impl EngineError {
    pub fn new<S: ToString>(code: i32, message: S) -> Self {
        Self { code, message: message.to_string() }
    }

    #[inline]
    pub fn code(&self) -> i32 {
        self.code
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Error, Debug)]
pub enum CurlError {
    #[error("handle init error: {source}")]
    Init { source: EngineError },

    #[error("unsupported value '{value}' for option {option}")]
    UnsupportedValue { option: &'static str, value: String },

    #[error("no such method: {name}")]
    Attribute { name: String },

    #[error("transfer error: {source}")]
    Transfer {
        #[from]
        source: EngineError,
    },

    #[error("form build error: {source}")]
    FormBuild { source: EngineError },

    #[error("unsupported feature: {feature}")]
    UnsupportedFeature { feature: &'static str },
}

impl CurlError {
    pub fn init(source: EngineError) -> Self {
        Self::Init { source }
    }

    pub fn unsupported_value<S: ToString>(option: &'static str, value: S) -> Self {
        Self::UnsupportedValue { option, value: value.to_string() }
    }

    pub fn attribute<S: ToString>(name: S) -> Self {
        Self::Attribute { name: name.to_string() }
    }

    pub fn transfer(source: EngineError) -> Self {
        Self::Transfer { source }
    }

    pub fn form_build(source: EngineError) -> Self {
        Self::FormBuild { source }
    }

    pub fn unsupported_feature(feature: &'static str) -> Self {
        Self::UnsupportedFeature { feature }
    }

    /// Returns the engine-native failure, if this error wraps one
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            Self::Init { source } | Self::Transfer { source } | Self::FormBuild { source } => Some(source),
            Self::UnsupportedValue { .. } | Self::Attribute { .. } | Self::UnsupportedFeature { .. } => None,
        }
    }
}
