// ─── Launch Task ───
// Spawns the game process from a built argument vector.

use std::path::Path;
use std::process::Stdio;

#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;

use tracing::{debug, info};

use crate::core::error::{LauncherError, LauncherResult};

use super::classpath::safe_path_str;

/// Spawn the game as a child process. Returns right after spawning; output
/// goes to the launcher's own stdout/stderr.
pub fn spawn_game(
    java_bin: &Path,
    args: &[String],
    game_dir: &Path,
    natives_dir: &Path,
) -> LauncherResult<tokio::process::Child> {
    std::fs::create_dir_all(game_dir).map_err(|e| LauncherError::io(game_dir, e))?;

    let mut cmd = std::process::Command::new(java_bin);
    cmd.args(args);
    cmd.current_dir(game_dir);
    configure_native_library_env(&mut cmd, natives_dir);
    configure_platform_spawn(&mut cmd);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::inherit());
    cmd.stderr(Stdio::inherit());

    info!("Launching with Java: {:?}", java_bin);
    debug!("Command (copy/paste): {}", format_command_for_logs(&cmd));

    tokio::process::Command::from(cmd)
        .spawn()
        .map_err(|e| LauncherError::JavaExecution(e.to_string()))
}

fn configure_native_library_env(cmd: &mut std::process::Command, natives_dir: &Path) {
    let native_path = safe_path_str(natives_dir);

    if cfg!(target_os = "windows") {
        cmd.env("PATH", append_env_path("PATH", &native_path));
    } else if cfg!(target_os = "macos") {
        cmd.env(
            "DYLD_LIBRARY_PATH",
            append_env_path("DYLD_LIBRARY_PATH", &native_path),
        );
    } else {
        cmd.env(
            "LD_LIBRARY_PATH",
            append_env_path("LD_LIBRARY_PATH", &native_path),
        );
    }
}

fn configure_platform_spawn(cmd: &mut std::process::Command) {
    #[cfg(target_os = "windows")]
    {
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        cmd.creation_flags(CREATE_NO_WINDOW);
        cmd.env_remove("WT_SESSION");
        cmd.env_remove("TERM");
    }
    #[cfg(not(target_os = "windows"))]
    let _ = cmd;
}

fn append_env_path(var_name: &str, value: &str) -> String {
    let separator = if cfg!(target_os = "windows") {
        ";"
    } else {
        ":"
    };
    match std::env::var(var_name) {
        Ok(existing) if !existing.trim().is_empty() => {
            format!("{}{}{}", value, separator, existing)
        }
        _ => value.to_string(),
    }
}

pub fn format_command_for_logs(cmd: &std::process::Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|part| shell_escape(&part.to_string_lossy()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_escape(raw: &str) -> String {
    if raw.is_empty() {
        return "\"\"".to_string();
    }

    if raw.chars().all(|ch| {
        ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '\\' | '=')
    }) {
        return raw.to_string();
    }

    format!("\"{}\"", raw.replace('"', "\\\""))
}
