//! Error taxonomy for the simulation kernel.
//!
//! Four variants, one per failure class described for the session: bad API usage,
//! malformed temporal expressions, uncaught errors from user callbacks, and internal
//! invariant breaks that indicate a bug in the kernel itself.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum OroboroError {
    #[error("usage error: {0}")]
    Usage(String),

    #[error("expression error: {0}")]
    Expression(String),

    #[error("uncaught error from user callback: {0}")]
    UserCallback(String),

    #[error("invariant violation: {0}")]
    Invariant(String),
}

impl OroboroError {
    pub fn usage(msg: impl Into<String>) -> Self {
        OroboroError::Usage(msg.into())
    }

    pub fn expression(msg: impl Into<String>) -> Self {
        OroboroError::Expression(msg.into())
    }

    pub fn user_callback(msg: impl Into<String>) -> Self {
        OroboroError::UserCallback(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        OroboroError::Invariant(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, OroboroError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_through() {
        let e = OroboroError::usage("double remove");
        assert_eq!(e.to_string(), "usage error: double remove");
        let e = OroboroError::expression("hi > lo");
        assert_eq!(e.to_string(), "expression error: hi > lo");
    }
}
