use std::path::PathBuf;

/// Environment variable that overrides the default endpoint
pub const ENDPOINT_ENV: &str = "CONDUIT_SOCKET";

/// Get the default socket path for a Conduit server
///
/// Priority:
/// 1. `CONDUIT_SOCKET` environment variable (if set and non-empty)
/// 2. `$XDG_RUNTIME_DIR/conduit.sock` (or the platform runtime dir)
/// 3. `/tmp/conduit.sock` (fallback)
pub fn default_endpoint() -> PathBuf {
    if let Ok(path) = std::env::var(ENDPOINT_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::runtime_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("conduit.sock")
}
