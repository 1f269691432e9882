//! The fixed, ordered list of config locations scanned on each `scan()`.

use std::path::PathBuf;

use crate::domain::ServerSource;

pub struct ConfigLocation {
    pub source: ServerSource,
    pub path: PathBuf,
}

/// Every file discovery ever looks at, in no particular priority order
/// (precedence is resolved afterwards, by [`ServerSource::precedence`]).
pub fn known_locations(home: &std::path::Path, config_dir: &std::path::Path) -> Vec<ConfigLocation> {
    let mut locations = vec![
        ConfigLocation { source: ServerSource::Cursor, path: home.join(".cursor/mcp.json") },
        ConfigLocation { source: ServerSource::Vscode, path: home.join(".vscode/settings.json") },
        ConfigLocation {
            source: ServerSource::Windsurf,
            path: home.join(".windsurf/mcp_servers.json"),
        },
        ConfigLocation { source: ServerSource::Continue, path: home.join(".continue/config.json") },
        ConfigLocation { source: ServerSource::Manual, path: config_dir.join("manual.json") },
    ];

    locations.push(ConfigLocation { source: ServerSource::Vscode, path: vscode_user_settings(home) });
    locations.push(ConfigLocation { source: ServerSource::Claude, path: claude_desktop_config(home) });

    locations
}

#[cfg(target_os = "macos")]
fn vscode_user_settings(home: &std::path::Path) -> PathBuf {
    home.join("Library/Application Support/Code/User/settings.json")
}

#[cfg(target_os = "windows")]
fn vscode_user_settings(home: &std::path::Path) -> PathBuf {
    home.join("AppData/Roaming/Code/User/settings.json")
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn vscode_user_settings(home: &std::path::Path) -> PathBuf {
    home.join(".config/Code/User/settings.json")
}

#[cfg(target_os = "macos")]
fn claude_desktop_config(home: &std::path::Path) -> PathBuf {
    home.join("Library/Application Support/Claude/claude_desktop_config.json")
}

#[cfg(target_os = "windows")]
fn claude_desktop_config(home: &std::path::Path) -> PathBuf {
    home.join("AppData/Roaming/Claude/claude_desktop_config.json")
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn claude_desktop_config(home: &std::path::Path) -> PathBuf {
    home.join(".config/Claude/claude_desktop_config.json")
}
