use thiserror::Error;

/// Result type alias for request parsing
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while parsing a whois request line
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The client asked for usage (`-h`, `-help`)
    #[error("help requested")]
    HelpRequested,

    /// A flag that the server does not know
    #[error("flag provided but not defined: -{0}")]
    UnknownFlag(String),

    /// A flag that requires a value was given none
    #[error("flag needs an argument: -{0}")]
    MissingValue(String),

    /// A flag with an empty or malformed name (e.g. `-=x`)
    #[error("bad flag syntax: {0}")]
    BadSyntax(String),
}

impl CoreError {
    /// Returns true if the client explicitly asked for usage text
    #[must_use]
    pub const fn is_help(&self) -> bool {
        matches!(self, Self::HelpRequested)
    }
}
