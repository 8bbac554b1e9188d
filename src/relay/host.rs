use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::native_messaging::{self, extension_origin};
use crate::config::HostConfig;
use crate::error::{MediascopeError, Result};
use crate::protocol::{Batch, HostReply};

/// How long a launched host gets to answer a batch.
const HOST_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// One external consumer of outbound batches.
#[async_trait]
pub trait HostEndpoint: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver a batch. `Ok(None)` means the host accepted it without a reply.
    async fn deliver(&self, batch: &Batch) -> Result<Option<HostReply>>;
}

/// A native messaging host, launched once per batch like
/// `chrome.runtime.sendNativeMessage` does.
#[derive(Debug, Clone)]
pub struct NativeHost {
    name: String,
    command: PathBuf,
    origin: String,
}

impl NativeHost {
    pub fn new(name: &str, command: PathBuf, extension_id: &str) -> Self {
        Self {
            name: name.to_string(),
            command,
            origin: extension_origin(extension_id),
        }
    }

    /// Use the configured command, or the one the host's manifest points at.
    pub fn resolve(config: &HostConfig, extension_id: &str) -> Result<Self> {
        let command = match &config.command {
            Some(command) => PathBuf::from(command),
            None => native_messaging::manifest_command(&config.name)?,
        };
        Ok(Self::new(&config.name, command, extension_id))
    }

    pub fn command(&self) -> &std::path::Path {
        &self.command
    }
}

#[async_trait]
impl HostEndpoint for NativeHost {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, batch: &Batch) -> Result<Option<HostReply>> {
        let mut child = Command::new(&self.command)
            .arg(&self.origin)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                MediascopeError::HostError(format!(
                    "Failed to launch {} ({}): {}",
                    self.name,
                    self.command.display(),
                    e
                ))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediascopeError::HostError(format!("{}: no stdin", self.name)))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediascopeError::HostError(format!("{}: no stdout", self.name)))?;

        native_messaging::write_frame(&mut stdin, batch)
            .await
            .map_err(|e| MediascopeError::HostError(format!("{}: write failed: {}", self.name, e)))?;
        drop(stdin);

        let reply = match tokio::time::timeout(HOST_REPLY_TIMEOUT, native_messaging::read_frame(&mut stdout)).await {
            Ok(Ok(value)) => Some(serde_json::from_value::<HostReply>(value)?),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => None,
            Ok(Err(e)) => {
                return Err(MediascopeError::ProtocolError(format!(
                    "{}: bad reply: {}",
                    self.name, e
                )))
            }
            Err(_) => {
                return Err(MediascopeError::HostError(format!(
                    "{}: no reply within {}s",
                    self.name,
                    HOST_REPLY_TIMEOUT.as_secs()
                )))
            }
        };

        if let Err(e) = child.kill().await {
            tracing::trace!("{} already exited: {}", self.name, e);
        }
        Ok(reply)
    }
}

/// Prints each batch as one JSON line on stdout. Never replies.
#[derive(Debug, Default)]
pub struct StdoutHost;

#[async_trait]
impl HostEndpoint for StdoutHost {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn deliver(&self, batch: &Batch) -> Result<Option<HostReply>> {
        println!("{}", serde_json::to_string(batch)?);
        Ok(None)
    }
}
