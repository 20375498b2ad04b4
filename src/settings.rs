use std::path::Path;
use std::process::{Command, Stdio};

/// Open a settings location with the desktop's default handler.
/// Uses `open` on macOS and `xdg-open` elsewhere.
pub fn open_settings(location: &Path) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cmd = opener();

    let status = Command::new(cmd)
        .arg(location)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| format!("Failed to spawn {cmd}: {e}"))?;

    if !status.success() {
        return Err(format!("{cmd} exited with status {status}").into());
    }

    Ok(())
}

fn opener() -> &'static str {
    if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    }
}
