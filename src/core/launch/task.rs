// ─── Launch Task ───
// Runs the mod-loader installer when needed, then spawns the game process
// and forwards its output.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;

#[cfg(target_os = "windows")]
#[allow(unused_imports)]
use std::os::windows::process::CommandExt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::options::LaunchOptions;
use super::profile::{resolve_launch_profile, LaunchProfile};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::events::{EventSink, LogLevel, ProgressPhase};

const LAUNCHER_BRAND: &str = "Arcend";
const MOD_LOADER_MARKER: &str = "mod_loader.json";

/// A started game. `wait` resolves with the exit code once the process and
/// its output forwarding have finished.
pub struct GameProcess {
    pub pid: Option<u32>,
    exit: JoinHandle<std::io::Result<Option<i32>>>,
}

impl GameProcess {
    pub fn new(pid: Option<u32>, exit: JoinHandle<std::io::Result<Option<i32>>>) -> Self {
        Self { pid, exit }
    }

    pub async fn wait(self) -> LauncherResult<Option<i32>> {
        self.exit
            .await
            .map_err(|e| LauncherError::Other(format!("Task join error: {e}")))?
            .map_err(LauncherError::from)
    }
}

/// Starts the external game process from a set of launch options.
#[async_trait]
pub trait GameLauncher: Send + Sync {
    async fn launch(&self, options: &LaunchOptions, events: &EventSink) -> LauncherResult<GameProcess>;
}

#[derive(Debug, Serialize, Deserialize)]
struct ModLoaderMarker {
    installer: String,
    installed_at: DateTime<Utc>,
}

/// Launches the game with the bundled Java runtime.
#[derive(Debug, Default)]
pub struct JavaGameLauncher;

impl JavaGameLauncher {
    pub fn new() -> Self {
        Self
    }

    /// Run the mod-loader installer unless the marker says this installer
    /// already ran against the current content.
    async fn ensure_mod_loader(&self, options: &LaunchOptions, events: &EventSink) -> LauncherResult<()> {
        let Some(installer) = options.mod_loader_installer.as_deref() else {
            return Ok(());
        };
        if !installer.exists() {
            warn!("Mod-loader installer {:?} not found, skipping", installer);
            return Ok(());
        }

        let installer_name = installer
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let marker_path = options.install_dir.join(MOD_LOADER_MARKER);
        if let Some(marker) = read_marker(&marker_path).await {
            if marker.installer == installer_name {
                debug!("Mod loader already installed on {}", marker.installed_at);
                return Ok(());
            }
        }

        events.progress(ProgressPhase::Launching, None, "Installing mod loader");
        info!("Running mod-loader installer {:?}", installer);
        ensure_launcher_profiles(&options.install_dir).await?;

        let mut cmd = Command::new(&options.java_path);
        cmd.arg("-jar")
            .arg(installer)
            .arg("--installClient")
            .arg(&options.install_dir)
            .current_dir(&options.install_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            LauncherError::LaunchFailed(format!(
                "cannot start {:?}: {e}",
                options.java_path
            ))
        })?;
        let readers = forward_output(&mut child, events, "installer");
        let status = child
            .wait()
            .await
            .map_err(|e| LauncherError::LaunchFailed(format!("mod-loader installer: {e}")))?;
        for reader in readers {
            let _ = reader.await;
        }

        if !status.success() {
            return Err(LauncherError::LaunchFailed(format!(
                "mod-loader installer exited with {:?}",
                status.code()
            )));
        }

        let marker = ModLoaderMarker {
            installer: installer_name,
            installed_at: Utc::now(),
        };
        tokio::fs::write(&marker_path, serde_json::to_vec_pretty(&marker)?)
            .await
            .map_err(|source| LauncherError::Io {
                path: marker_path,
                source,
            })?;
        Ok(())
    }
}

#[async_trait]
impl GameLauncher for JavaGameLauncher {
    async fn launch(&self, options: &LaunchOptions, events: &EventSink) -> LauncherResult<GameProcess> {
        self.ensure_mod_loader(options, events).await?;
        let profile = resolve_launch_profile(&options.install_dir, &options.version.number).await?;

        events.progress(ProgressPhase::Launching, Some(100), "Starting the game");
        let args = launch_arguments(options, &profile);

        let mut cmd = Command::new(&options.java_path);
        cmd.args(&args)
            .current_dir(&options.install_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        configure_native_library_env(&mut cmd, &options.install_dir.join("natives"));
        configure_platform_spawn(&mut cmd);

        info!("Launching {} with Java: {:?}", profile.id, options.java_path);
        debug!(
            "Command (copy/paste): {}",
            format_command_for_logs(&options.java_path, &args, &options.auth.access_token)
        );

        let mut child = cmd
            .spawn()
            .map_err(|e| LauncherError::LaunchFailed(format!("cannot start {:?}: {e}", options.java_path)))?;
        let pid = child.id();
        let readers = forward_output(&mut child, events, "game");

        let exit = tokio::spawn(async move {
            let status = child.wait().await;
            for reader in readers {
                let _ = reader.await;
            }
            status.map(|status| status.code())
        });

        Ok(GameProcess::new(pid, exit))
    }
}

async fn read_marker(path: &Path) -> Option<ModLoaderMarker> {
    let raw = tokio::fs::read(path).await.ok()?;
    serde_json::from_slice(&raw).ok()
}

/// The Forge installer refuses to run without a launcher profile file.
async fn ensure_launcher_profiles(install_dir: &Path) -> LauncherResult<()> {
    let path = install_dir.join("launcher_profiles.json");
    if path.exists() {
        return Ok(());
    }
    tokio::fs::write(&path, br#"{ "profiles": {} }"#)
        .await
        .map_err(|source| LauncherError::Io { path, source })
}

/// Forward stdout as `info` and stderr as `warn` log events.
fn forward_output(
    child: &mut tokio::process::Child,
    events: &EventSink,
    tag: &'static str,
) -> Vec<JoinHandle<()>> {
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_line_forwarder(stdout, events.clone(), LogLevel::Info, tag));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_line_forwarder(stderr, events.clone(), LogLevel::Warn, tag));
    }
    readers
}

fn spawn_line_forwarder<R>(
    stream: R,
    events: EventSink,
    level: LogLevel,
    tag: &'static str,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match level {
                LogLevel::Info => debug!("[{}][stdout] {}", tag, line),
                _ => debug!("[{}][stderr] {}", tag, line),
            }
            events.log(level, line);
        }
    })
}

/// Full argument list passed to the Java runtime: heap bounds, the
/// profile's JVM arguments, `-cp`, the main class and the game arguments.
pub fn launch_arguments(options: &LaunchOptions, profile: &LaunchProfile) -> Vec<String> {
    let separator = classpath_separator();
    let game_dir = path_string(&options.install_dir);
    let natives_dir = path_string(&options.install_dir.join("natives"));
    let library_dir = path_string(&options.install_dir.join("libraries"));
    let assets_dir = path_string(&options.install_dir.join("assets"));
    let asset_index = profile.asset_index.as_deref().unwrap_or_default();

    let jvm_values: [(&str, &str); 7] = [
        ("${natives_directory}", &natives_dir),
        ("${library_directory}", &library_dir),
        ("${classpath_separator}", separator),
        ("${game_directory}", &game_dir),
        ("${version_name}", &profile.id),
        ("${launcher_name}", LAUNCHER_BRAND),
        ("${launcher_version}", env!("CARGO_PKG_VERSION")),
    ];
    let profile_jvm_args = resolve_args(&strip_classpath_switch(&profile.jvm_args), &jvm_values);

    // Jars the loader boots from the module path must not be loaded twice.
    let module_path = module_path_entries(&profile_jvm_args, separator);
    let classpath = profile
        .classpath
        .iter()
        .filter(|entry| !module_path.contains(entry.as_path()))
        .map(|entry| path_string(entry))
        .collect::<Vec<_>>()
        .join(separator);

    let mut args = vec![
        format!("-Xms{}G", options.memory.min_gb),
        format!("-Xmx{}G", options.memory.max_gb),
    ];
    args.extend(profile_jvm_args);
    push_property_if_missing(&mut args, "java.library.path", &natives_dir);
    push_property_if_missing(&mut args, "minecraft.launcher.brand", LAUNCHER_BRAND);
    push_property_if_missing(&mut args, "minecraft.launcher.version", env!("CARGO_PKG_VERSION"));
    args.push("-cp".to_string());
    args.push(classpath);
    args.push(profile.main_class.clone());

    let game_values: [(&str, &str); 11] = [
        ("${auth_player_name}", &options.auth.username),
        ("${version_name}", &profile.id),
        ("${game_directory}", &game_dir),
        ("${assets_root}", &assets_dir),
        ("${assets_index_name}", asset_index),
        ("${auth_uuid}", &options.auth.uuid),
        ("${auth_access_token}", &options.auth.access_token),
        ("${user_type}", &options.auth.user_type),
        ("${version_type}", &options.version.version_type),
        ("${user_properties}", "{}"),
        ("${launcher_name}", LAUNCHER_BRAND),
    ];
    args.extend(resolve_args(&profile.game_args, &game_values));
    args
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn classpath_separator() -> &'static str {
    if cfg!(target_os = "windows") {
        ";"
    } else {
        ":"
    }
}

/// The classpath is always injected here, so switches from the profile are
/// dropped together with their value.
fn strip_classpath_switch(args: &[String]) -> Vec<String> {
    let mut stripped = Vec::with_capacity(args.len());
    let mut i = 0;
    while i < args.len() {
        if matches!(args[i].as_str(), "-cp" | "-classpath" | "--class-path") {
            i += 2;
            continue;
        }
        stripped.push(args[i].clone());
        i += 1;
    }
    stripped
}

fn module_path_entries(jvm_args: &[String], separator: &str) -> HashSet<PathBuf> {
    let mut entries = HashSet::new();
    let mut i = 0;
    while i < jvm_args.len() {
        let value = match jvm_args[i].as_str() {
            "-p" | "--module-path" => jvm_args.get(i + 1).map(String::as_str),
            arg => arg.strip_prefix("--module-path="),
        };
        if let Some(value) = value {
            entries.extend(value.split(separator).filter(|s| !s.is_empty()).map(PathBuf::from));
        }
        i += 1;
    }
    entries
}

fn push_property_if_missing(args: &mut Vec<String>, property: &str, value: &str) {
    let prefix = format!("-D{property}=");
    if !args.iter().any(|arg| arg.starts_with(&prefix)) {
        args.push(format!("{prefix}{value}"));
    }
}

/// Substitute placeholders. Arguments that stay unresolved (unknown key or
/// empty value) are dropped together with the flag before them.
fn resolve_args<S: AsRef<str>>(template: &[S], values: &[(&str, &str)]) -> Vec<String> {
    let mut resolved_args = Vec::with_capacity(template.len());
    for arg in template {
        let mut resolved = arg.as_ref().to_string();
        for (placeholder, value) in values {
            if !value.trim().is_empty() {
                resolved = resolved.replace(placeholder, value);
            }
        }

        if resolved.contains("${") {
            drop_dangling_option(&mut resolved_args);
            continue;
        }
        resolved_args.push(resolved);
    }
    resolved_args
}

fn drop_dangling_option(args: &mut Vec<String>) {
    if args.last().is_some_and(|last| last.starts_with('-')) {
        let _ = args.pop();
    }
}

fn configure_native_library_env(cmd: &mut Command, natives_dir: &Path) {
    let native_path = natives_dir.to_string_lossy().to_string();

    if cfg!(target_os = "windows") {
        cmd.env("PATH", append_env_path("PATH", &native_path));
    } else if cfg!(target_os = "linux") {
        cmd.env("LD_LIBRARY_PATH", append_env_path("LD_LIBRARY_PATH", &native_path));
    } else if cfg!(target_os = "macos") {
        cmd.env(
            "DYLD_LIBRARY_PATH",
            append_env_path("DYLD_LIBRARY_PATH", &native_path),
        );
    }
}

fn configure_platform_spawn(cmd: &mut Command) {
    #[cfg(target_os = "windows")]
    {
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    // The game outlives the launcher session unless the host kills it.
    cmd.kill_on_drop(false);
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

fn format_command_for_logs(program: &Path, args: &[String], secret: &str) -> String {
    let program = shell_escape(&program.to_string_lossy());
    let args = args
        .iter()
        .map(|arg| {
            if !secret.is_empty() && arg == secret {
                "<redacted>".to_string()
            } else {
                shell_escape(arg)
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    if args.is_empty() {
        program
    } else {
        format!("{} {}", program, args)
    }
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
