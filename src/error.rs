use miette::Diagnostic;
use thiserror::Error;

/// Result type for translator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Custom error types for the translator core
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum Error {
    #[error("I/O error: {0}")]
    #[diagnostic(code(ilxlate::io_error))]
    Io(String),

    #[error("JSON error: {0}")]
    #[diagnostic(code(ilxlate::json_error))]
    Json(String),

    #[error("Invalid tree mutation: {message}")]
    #[diagnostic(
        code(ilxlate::tree_error),
        help("replacements must be detached subtrees and must not contain the node's own ancestors")
    )]
    Tree { message: String },

    #[error("Invalid redirection policy for {member}: {message}")]
    #[diagnostic(code(ilxlate::policy_error))]
    Policy { member: String, message: String },

    #[error("No translation exists for external member {member} (called from {function}, node {node})")]
    #[diagnostic(
        code(ilxlate::missing_redirection),
        help("provide a replacement template for the member or stop calling it")
    )]
    MissingRedirection {
        member: String,
        function: String,
        node: usize,
    },

    #[error("Unknown function: {function}")]
    #[diagnostic(code(ilxlate::unknown_function))]
    UnknownFunction { function: String },

    #[error("Pass {pass} failed on {function}: {message}")]
    #[diagnostic(code(ilxlate::pass_error))]
    Pass {
        pass: &'static str,
        function: String,
        message: String,
    },

    #[error("Internal error: {message}")]
    #[diagnostic(code(ilxlate::internal_error))]
    Internal { message: String },
}

impl Error {
    /// Create an invalid tree mutation error
    pub fn tree(message: impl Into<String>) -> Self {
        Error::Tree {
            message: message.into(),
        }
    }

    /// Create a policy error for a member
    pub fn policy(member: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Policy {
            member: member.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err.to_string())
    }
}
