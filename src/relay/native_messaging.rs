//! Chrome Native Messaging plumbing shared by both ends of the relay.
//!
//! The coordinator launches each configured host and writes one batch to its
//! stdin; `mediascope host serve` is the receiving side, reading the batch and
//! replying with its session id.
//!
//! Protocol: each message is prefixed with a 4-byte little-endian uint32 length,
//! followed by UTF-8 JSON of that length.

use std::io;
use std::path::PathBuf;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{MediascopeError, Result};
use crate::ids::EntityId;
use crate::protocol::{Batch, HostReply};

/// Chrome caps host → browser messages at 1 MiB.
const MAX_MESSAGE_SIZE: usize = 1_048_576;

/// Read one length-prefixed JSON message.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<serde_json::Value>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    if len > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "Message too large"));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;

    serde_json::from_slice(&buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Write one length-prefixed JSON message and flush.
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize + ?Sized,
{
    let payload = serde_json::to_vec(msg)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "Message too large"))?;

    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await
}

/// Run as a native messaging host: read one batch from stdin, reply with
/// `{hostId}` on stdout, then return.
pub async fn serve(session_id: &str) -> Result<()> {
    let mut stdin = tokio::io::stdin();
    let msg = read_frame(&mut stdin).await.map_err(|e| {
        MediascopeError::ProtocolError(format!("Failed to read native message: {}", e))
    })?;

    match serde_json::from_value::<Batch>(msg) {
        Ok(batch) => {
            tracing::info!(
                "Received {} change(s) from instance {}",
                batch.changes.len(),
                batch.instance_id
            );
            for change in &batch.changes {
                tracing::debug!("{}", change);
            }
        }
        Err(e) => tracing::warn!("Ignoring message that is not a batch: {}", e),
    }

    let reply = HostReply {
        host_id: Some(session_id.to_string()),
    };
    let mut stdout = tokio::io::stdout();
    write_frame(&mut stdout, &reply).await.map_err(|e| {
        MediascopeError::ProtocolError(format!("Failed to write native message: {}", e))
    })?;

    Ok(())
}

/// Path of the host session file: `~/.local/share/mediascope/host-session`
pub fn session_file_path() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir().ok_or_else(|| {
        MediascopeError::Other("Cannot determine local data directory".to_string())
    })?;
    Ok(data_dir.join("mediascope").join("host-session"))
}

/// Session id the host replies with. Stable across launches until `rotate`
/// is requested, since the browser starts a fresh host process per batch.
pub async fn load_or_create_session(rotate: bool) -> Result<String> {
    let path = session_file_path()?;
    if !rotate {
        if let Ok(existing) = tokio::fs::read_to_string(&path).await {
            let existing = existing.trim();
            if !existing.is_empty() {
                return Ok(existing.to_string());
            }
        }
    }

    let session = EntityId::generate().to_string();
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    // Write to a temp file, then rename.
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, &session).await?;
    tokio::fs::rename(&tmp_path, &path).await?;
    tracing::info!("New host session {}", session);
    Ok(session)
}

/// Platform-specific path for a native messaging host manifest.
pub fn native_host_manifest_path(name: &str) -> Result<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        let home = dirs::home_dir().ok_or_else(|| {
            MediascopeError::Other("Cannot determine home directory".to_string())
        })?;
        Ok(home
            .join("Library/Application Support/Google/Chrome/NativeMessagingHosts")
            .join(format!("{}.json", name)))
    }

    #[cfg(target_os = "linux")]
    {
        let home = dirs::home_dir().ok_or_else(|| {
            MediascopeError::Other("Cannot determine home directory".to_string())
        })?;
        Ok(home
            .join(".config/google-chrome/NativeMessagingHosts")
            .join(format!("{}.json", name)))
    }

    #[cfg(target_os = "windows")]
    {
        // Registered via the registry on Windows; the file itself can live anywhere.
        let app_data = dirs::data_local_dir().ok_or_else(|| {
            MediascopeError::Other("Cannot determine AppData directory".to_string())
        })?;
        Ok(app_data.join("Mediascope").join(format!("{}.json", name)))
    }
}

/// Generate the native messaging host manifest JSON content.
pub fn generate_manifest(name: &str, binary_path: &str, extension_id: &str) -> serde_json::Value {
    serde_json::json!({
        "name": name,
        "description": "Mediascope - media observation sink",
        "path": binary_path,
        "type": "stdio",
        "allowed_origins": [
            extension_origin(extension_id)
        ]
    })
}

pub fn extension_origin(extension_id: &str) -> String {
    format!("chrome-extension://{}/", extension_id)
}

/// Install a manifest that points `name` at this binary.
pub fn install_manifest(name: &str, extension_id: &str) -> Result<PathBuf> {
    let manifest_path = native_host_manifest_path(name)?;

    let binary_path = std::env::current_exe()
        .map_err(|e| MediascopeError::Other(format!("Cannot determine binary path: {}", e)))?
        .to_string_lossy()
        .to_string();

    // Prefer the PATH-resolved binary over a possibly temporary current_exe
    let resolved_path = which::which("mediascope")
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or(binary_path);

    let manifest = generate_manifest(name, &resolved_path, extension_id);

    if let Some(parent) = manifest_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            MediascopeError::Other(format!(
                "Failed to create directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    let content = serde_json::to_string_pretty(&manifest)?;
    std::fs::write(&manifest_path, content).map_err(|e| {
        MediascopeError::Other(format!(
            "Failed to write native messaging host manifest to {}: {}",
            manifest_path.display(),
            e
        ))
    })?;

    Ok(manifest_path)
}

/// Remove a native messaging host manifest.
pub fn uninstall_manifest(name: &str) -> Result<()> {
    let manifest_path = native_host_manifest_path(name)?;
    if manifest_path.exists() {
        std::fs::remove_file(&manifest_path).map_err(|e| {
            MediascopeError::Other(format!(
                "Failed to remove native messaging host manifest: {}",
                e
            ))
        })?;
    }
    Ok(())
}

/// Executable a host manifest points at.
pub fn manifest_command(name: &str) -> Result<PathBuf> {
    let manifest_path = native_host_manifest_path(name)?;
    let content = std::fs::read_to_string(&manifest_path).map_err(|e| {
        MediascopeError::HostError(format!(
            "No manifest for host {} at {}: {}",
            name,
            manifest_path.display(),
            e
        ))
    })?;
    let manifest: serde_json::Value = serde_json::from_str(&content)?;
    manifest
        .get("path")
        .and_then(|p| p.as_str())
        .map(PathBuf::from)
        .ok_or_else(|| MediascopeError::HostError(format!("Manifest for {} has no path", name)))
}
