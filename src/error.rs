//! Script-facing error taxonomy.

use mlua::prelude::*;
use thiserror::Error;

/// Errors raised synchronously at a script call site.
///
/// They surface in Lua as ordinary runtime errors, so scripts can catch
/// them with `pcall`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    #[error("type error: expected {expected}, got {found}")]
    TypeError { expected: &'static str, found: String },

    #[error("null reference: {ty} has already been destroyed")]
    NullReference { ty: &'static str },

    #[error("argument error: {0}")]
    Argument(String),
}

impl BridgeError {
    pub fn argument(msg: impl Into<String>) -> Self {
        BridgeError::Argument(msg.into())
    }
}

impl From<BridgeError> for LuaError {
    fn from(err: BridgeError) -> Self {
        LuaError::external(err)
    }
}

/// An uncaught error escaping a top-level entry point.
#[derive(Error, Debug)]
#[error("script runtime error in {entry}: {source}")]
pub struct ScriptRuntimeError {
    pub entry: &'static str,
    #[source]
    pub source: LuaError,
}

/// Finds a [`BridgeError`] anywhere in a Lua error chain.
pub fn bridge_error(err: &LuaError) -> Option<&BridgeError> {
    match err {
        LuaError::ExternalError(inner) => inner.downcast_ref::<BridgeError>(),
        LuaError::CallbackError { cause, .. } => bridge_error(cause),
        LuaError::WithContext { cause, .. } => bridge_error(cause),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_error_survives_lua_conversion() {
        let err: LuaError = BridgeError::NullReference { ty: "Body" }.into();
        assert_eq!(
            bridge_error(&err),
            Some(&BridgeError::NullReference { ty: "Body" })
        );
    }

    #[test]
    fn test_bridge_error_display() {
        let err = BridgeError::TypeError {
            expected: "Layer",
            found: "Rect".to_string(),
        };
        assert_eq!(err.to_string(), "type error: expected Layer, got Rect");
    }
}
