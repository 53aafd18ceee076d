use serde::Serialize;
use thiserror::Error;

/// The single, unified error type crossing the engine's service surface.
///
/// Module-specific errors are wrapped transparently so command handlers
/// return one consistent shape; the `#[serde(tag = "module", content =
/// "details")]` attribute keeps the serialized JSON predictable for the
/// frontend.
#[derive(Error, Debug, Serialize)]
#[serde(tag = "module", content = "details")]
pub enum EngineError {
    #[error(transparent)]
    Db(#[from] crate::db::DbError),

    #[error("{message}")]
    General { message: String },
}

// This allows RPC handlers to return EngineError directly as a string
// payload while keeping the structured form available.
impl From<EngineError> for String {
    fn from(error: EngineError) -> Self {
        let error_message = error.to_string();

        match serde_json::to_value(&error) {
            Ok(mut value) => {
                if let Some(obj) = value.as_object_mut() {
                    obj.insert(
                        "message".to_string(),
                        serde_json::Value::String(error_message),
                    );
                }
                serde_json::to_string(&value).unwrap_or_else(|e| {
                    serde_json::json!({
                        "module": "Internal",
                        "details": {
                            "kind": "SerializationFailed",
                            "message": format!("Failed to re-serialize error value: {}", e)
                        },
                        "message": "An unexpected error occurred during error handling."
                    })
                    .to_string()
                })
            }
            Err(e) => serde_json::json!({
                "module": "Internal",
                "details": {
                    "kind": "SerializationFailed",
                    "message": format!("Failed to serialize error: {}", e)
                },
                "message": error_message
            })
            .to_string(),
        }
    }
}

/// A universal Result type for command handlers and other fallible
/// functions.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbError;

    #[test]
    fn serialized_errors_carry_module_and_message() {
        let error = EngineError::Db(DbError::InvalidData("bad row".to_string()));
        let json: serde_json::Value =
            serde_json::from_str(&String::from(error)).unwrap();
        assert_eq!(json["module"], "Db");
        assert_eq!(json["message"], "bad row");
    }
}
