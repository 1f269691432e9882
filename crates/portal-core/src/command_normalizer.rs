//! Translates a declared `{command, args, env}` triple into the
//! platform-native spawn tuple. No shell is ever invoked.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::domain::DeclaredTransport;
use crate::error::{GatewayError, GatewayResult};

/// The fully-resolved, ready-to-spawn command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

const RESOLVED_ON_PATH: &[&str] = &["node", "python", "python3"];

/// Normalizes a stdio transport declaration. `home` is the gateway's own
/// home directory, used for `~` expansion; it is a parameter (rather than
/// `dirs::home_dir()` called inline) so tests can supply a fixed value.
pub fn normalize(transport: &DeclaredTransport, home: &Path) -> GatewayResult<NormalizedCommand> {
    normalize_with(transport, home, |p| which::which(p).ok().map(|p| p.to_string_lossy().into_owned()))
}

/// Same as [`normalize`] but with the PATH-resolution step injected, so
/// tests can exercise the "interpreter not found" branch without depending
/// on what happens to be installed on the machine running them.
fn normalize_with(
    transport: &DeclaredTransport,
    home: &Path,
    resolve_on_path: impl Fn(&str) -> Option<String>,
) -> GatewayResult<NormalizedCommand> {
    let DeclaredTransport::Stdio { command, args, env } = transport else {
        return Err(GatewayError::config_invalid(
            "normalize() only applies to stdio transports",
        ));
    };

    let program = rewrite_command(command);
    let program = if RESOLVED_ON_PATH.contains(&command.as_str()) {
        resolve_on_path(&program).ok_or_else(|| {
            GatewayError::config_invalid(format!(
                "`{command}` was not found on PATH; install it or use an absolute path"
            ))
        })?
    } else {
        program
    };

    let args = args.iter().map(|a| expand_tilde(a, home)).collect();
    let mut merged_env: HashMap<String, String> = std::env::vars().collect();
    merged_env.extend(env.clone());

    Ok(NormalizedCommand { program, args, env: merged_env })
}

/// `npx` becomes `npx.cmd` on Windows; every other command is unchanged.
fn rewrite_command(command: &str) -> String {
    if cfg!(windows) && command == "npx" {
        "npx.cmd".to_string()
    } else {
        command.to_string()
    }
}

fn expand_tilde(value: &str, home: &Path) -> String {
    if let Some(rest) = value.strip_prefix("~/") {
        home.join(rest).to_string_lossy().into_owned()
    } else if value == "~" {
        home.to_string_lossy().into_owned()
    } else {
        value.to_string()
    }
}

pub fn gateway_home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}
