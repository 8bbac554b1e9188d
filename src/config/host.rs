use serde::{Deserialize, Serialize};

/// A native messaging host that receives outbound batches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Reverse-DNS host name, as registered in the host manifest
    pub name: String,

    /// Executable override; when unset the path is read from the host manifest
    pub command: Option<String>,
}

impl HostConfig {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            command: None,
        }
    }

    /// Create a host entry that launches a specific executable
    pub fn with_command(name: &str, command: &str) -> Self {
        Self {
            name: name.to_string(),
            command: Some(command.to_string()),
        }
    }
}
