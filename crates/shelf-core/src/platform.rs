//! Host platform identification and per-platform executable layout.

use crate::error::{Result, ShelfError};
use std::path::PathBuf;

/// Location of a globally installed app bundle on macOS.
pub const APPLICATIONS_DIR: &str = "/Applications";

/// Platform identifier of the running host, in release-archive naming.
///
/// # Platform Behavior
/// - **macOS**: `darwin`
/// - **Windows**: `win32`
/// - everything else: the target OS name (`linux`, `freebsd`, `openbsd`, ...)
pub fn host_platform() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        "windows" => "win32",
        other => other,
    }
}

/// Relative path of the runtime executable inside an unpacked archive.
///
/// Fails with [`ShelfError::UnsupportedPlatform`] for identifiers without a
/// published build.
pub fn executable_relative_path(platform: &str) -> Result<&'static str> {
    match platform {
        "mas" | "darwin" => Ok("Electron.app/Contents/MacOS/Electron"),
        "freebsd" | "openbsd" | "linux" => Ok("electron"),
        "win32" => Ok("electron.exe"),
        other => Err(ShelfError::UnsupportedPlatform {
            platform: other.to_string(),
        }),
    }
}

/// Whether the identifier names the Apple desktop platform.
pub fn is_apple_desktop(platform: &str) -> bool {
    matches!(platform, "darwin" | "mas")
}

/// Executable of the app bundle under `/Applications`, if the platform has one.
pub fn application_bundle_executable(platform: &str) -> Option<PathBuf> {
    if !is_apple_desktop(platform) {
        return None;
    }
    executable_relative_path(platform)
        .ok()
        .map(|relative| PathBuf::from(APPLICATIONS_DIR).join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_known_platforms() {
        assert_eq!(
            executable_relative_path("darwin").unwrap(),
            "Electron.app/Contents/MacOS/Electron"
        );
        assert_eq!(
            executable_relative_path("mas").unwrap(),
            "Electron.app/Contents/MacOS/Electron"
        );
        assert_eq!(executable_relative_path("linux").unwrap(), "electron");
        assert_eq!(executable_relative_path("freebsd").unwrap(), "electron");
        assert_eq!(executable_relative_path("openbsd").unwrap(), "electron");
        assert_eq!(executable_relative_path("win32").unwrap(), "electron.exe");
    }

    #[test]
    fn test_unknown_platform_is_rejected() {
        let err = executable_relative_path("plan9").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedPlatform);
        assert!(err.to_string().contains("plan9"));
    }

    #[test]
    fn test_bundle_only_on_apple_desktop() {
        assert_eq!(
            application_bundle_executable("darwin"),
            Some(PathBuf::from(
                "/Applications/Electron.app/Contents/MacOS/Electron"
            ))
        );
        assert_eq!(application_bundle_executable("linux"), None);
    }

    #[test]
    fn test_host_platform_is_supported_on_ci_targets() {
        if cfg!(any(target_os = "linux", target_os = "macos", target_os = "windows")) {
            assert!(executable_relative_path(host_platform()).is_ok());
        }
    }
}
