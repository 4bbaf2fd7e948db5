//! Encodage ligne à ligne des messages du pont

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::BridgeError;

/// Sérialise un message en JSON compact, sans saut de ligne
pub fn encode<T: Serialize>(message: &T) -> Result<String, BridgeError> {
    // serde_json échappe les sauts de ligne dans les chaînes
    serde_json::to_string(message).map_err(|e| BridgeError::Protocol(e.to_string()))
}

/// Lit un message depuis une ligne
pub fn decode<T: DeserializeOwned>(line: &str) -> Result<T, BridgeError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(BridgeError::Protocol("empty message".into()));
    }
    serde_json::from_str(line).map_err(|e| BridgeError::Protocol(e.to_string()))
}
