use std::path::PathBuf;

/// Where the channel directory is fetched from.
pub const DIRECTORY_URL: &str = "https://somafm.com/channels.xml";

/// Default control-socket path handed to (or expected from) mpv.
pub fn default_socket_path() -> PathBuf {
    #[cfg(unix)]
    {
        PathBuf::from("/tmp/mpvsocket.sock")
    }
    #[cfg(not(unix))]
    {
        std::env::temp_dir().join("mpvsocket.sock")
    }
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn data_dir() -> PathBuf {
    // On macOS and Linux, use ~/.local/share/soma/ (XDG standard)
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join("soma")
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("soma")
    }
}

#[cfg(unix)]
pub fn mpv_binary_name() -> &'static str {
    "mpv"
}

#[cfg(windows)]
pub fn mpv_binary_name() -> &'static str {
    "mpv.exe"
}

/// Find the mpv binary: beside the current executable first, then `PATH`.
/// Falls back to the bare name so the OS gets a final say.
pub fn find_mpv_binary() -> PathBuf {
    let exe_name = mpv_binary_name();

    if let Ok(current_exe) = std::env::current_exe() {
        if let Some(dir) = current_exe.parent() {
            let local_mpv = dir.join(exe_name);
            if local_mpv.exists() {
                return local_mpv;
            }
        }
    }

    if let Some(path) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&path) {
            let mpv_path = dir.join(exe_name);
            if mpv_path.exists() {
                return mpv_path;
            }
        }
    }

    PathBuf::from(exe_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths() {
        assert!(default_socket_path().ends_with("mpvsocket.sock"));
        assert!(data_dir().ends_with("soma"));
        assert!(find_mpv_binary().ends_with(mpv_binary_name()));
    }
}
