//! Registry error types

use super::client::ClientId;

/// Error type for registry operations
#[derive(Debug, Clone)]
pub enum RegistryError {
    /// An entry with this identifier is already registered
    ///
    /// The identifier mint is collision-free within the process; the accept
    /// path treats this as fatal for the attempt and retries with a fresh
    /// identifier.
    DuplicateIdentifier(ClientId),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::DuplicateIdentifier(id) => {
                write!(f, "Client already registered: {}", id)
            }
        }
    }
}

impl std::error::Error for RegistryError {}
