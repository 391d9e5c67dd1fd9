// ─── Launch Command Builder ───
// Turns a merged descriptor's argument templates into the final argument
// vector: JVM arguments, main class, game arguments.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::debug;

use crate::core::auth::Session;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::platform::Platform;
use crate::core::version::{ArgumentToken, MergedDescriptor, Rule};

use super::classpath::safe_path_str;

pub const DEFAULT_SERVER_PORT: u16 = 25565;
const QUICK_PLAY_FEATURE: &str = "is_quick_play_multiplayer";
const QUICK_PLAY_PLACEHOLDER: &str = "quickPlayMultiplayer";

/// Server to join on start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTarget {
    pub host: String,
    pub port: Option<u16>,
}

impl ServerTarget {
    /// `host`, `host:port`, or `[v6]:port`.
    pub fn parse(address: &str) -> Self {
        let address = address.trim();
        if let Some(rest) = address.strip_prefix('[') {
            if let Some((host, tail)) = rest.split_once(']') {
                let port = tail.strip_prefix(':').and_then(|p| p.parse().ok());
                return Self {
                    host: host.to_string(),
                    port,
                };
            }
        }
        match address.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => match port.parse() {
                Ok(port) => Self {
                    host: host.to_string(),
                    port: Some(port),
                },
                Err(_) => Self {
                    host: address.to_string(),
                    port: None,
                },
            },
            _ => Self {
                host: address.to_string(),
                port: None,
            },
        }
    }

    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_SERVER_PORT)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port_or_default())
    }
}

/// Everything the templates can refer to.
#[derive(Debug, Clone)]
pub struct LaunchContext {
    pub platform: Platform,
    pub session: Session,
    pub classpath: String,
    pub module_path: String,
    pub natives_dir: PathBuf,
    pub game_dir: PathBuf,
    pub assets_root: PathBuf,
    pub libraries_dir: PathBuf,
    pub launcher_name: String,
    pub launcher_version: String,
    pub window: Option<(u32, u32)>,
    pub min_memory_mb: u32,
    pub max_memory_mb: u32,
    pub server: Option<ServerTarget>,
    pub auto_connect: bool,
}

impl LaunchContext {
    pub fn new(platform: Platform, session: Session) -> Self {
        Self {
            platform,
            session,
            classpath: String::new(),
            module_path: String::new(),
            natives_dir: PathBuf::new(),
            game_dir: PathBuf::new(),
            assets_root: PathBuf::new(),
            libraries_dir: PathBuf::new(),
            launcher_name: "ProfileLauncher".into(),
            launcher_version: env!("CARGO_PKG_VERSION").into(),
            window: None,
            min_memory_mb: 512,
            max_memory_mb: 2048,
            server: None,
            auto_connect: false,
        }
    }

    fn joins_server(&self) -> Option<&ServerTarget> {
        self.server.as_ref().filter(|_| self.auto_connect)
    }
}

pub struct LaunchCommandBuilder {
    context: LaunchContext,
}

impl LaunchCommandBuilder {
    pub fn new(context: LaunchContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &LaunchContext {
        &self.context
    }

    pub fn build(&self, merged: &MergedDescriptor) -> LauncherResult<Vec<String>> {
        if merged.main_class.trim().is_empty() {
            return Err(LauncherError::Other(format!(
                "{} has no main class",
                merged.id
            )));
        }

        let ctx = &self.context;
        let quick_play_template = merged
            .game_arguments
            .iter()
            .any(|t| t.mentions(QUICK_PLAY_PLACEHOLDER));
        let platform = ctx
            .platform
            .clone()
            .with_feature("has_custom_resolution", ctx.window.is_some())
            .with_feature(
                QUICK_PLAY_FEATURE,
                ctx.joins_server().is_some() && quick_play_template,
            );
        let vars = self.substitutions(merged);

        // ── JVM ──
        let mut jvm = vec![
            format!("-Xms{}M", ctx.min_memory_mb),
            format!("-Xmx{}M", ctx.max_memory_mb),
        ];
        let templates = if merged.jvm_arguments.is_empty() {
            default_jvm_template()
        } else {
            merged.jvm_arguments.clone()
        };
        expand_into(&mut jvm, &templates, &platform, &vars);

        if !ctx.module_path.is_empty() && !contains_any(&jvm, &["-p", "--module-path"]) {
            jvm.push("-p".into());
            jvm.push(ctx.module_path.clone());
            jvm.push("--add-modules".into());
            jvm.push("ALL-MODULE-PATH".into());
        }
        if !contains_any(&jvm, &["-cp", "-classpath", "--class-path"]) {
            if ctx.classpath.is_empty() {
                return Err(LauncherError::Other("empty classpath".into()));
            }
            jvm.push("-cp".into());
            jvm.push(ctx.classpath.clone());
        }

        // ── Game ──
        let mut game = Vec::new();
        expand_into(&mut game, &merged.game_arguments, &platform, &vars);
        if let Some(server) = ctx.joins_server() {
            if !quick_play_template {
                game.push("--server".into());
                game.push(server.host.clone());
                game.push("--port".into());
                game.push(server.port_or_default().to_string());
            }
        }
        let game = keep_first_quick_play(game);

        let mut args = jvm;
        args.push(merged.main_class.clone());
        args.extend(game);
        debug!("Built {} launch arguments for {}", args.len(), merged.id);
        Ok(args)
    }

    fn substitutions(&self, merged: &MergedDescriptor) -> HashMap<&'static str, String> {
        let ctx = &self.context;
        let session = &ctx.session;
        let assets_index = merged
            .asset_index
            .as_ref()
            .map(|a| a.id.clone())
            .unwrap_or_else(|| "legacy".into());
        let game_assets = if matches!(assets_index.as_str(), "legacy" | "pre-1.6") {
            ctx.assets_root.join("virtual").join(&assets_index)
        } else {
            ctx.assets_root.clone()
        };
        let (width, height) = ctx
            .window
            .map(|(w, h)| (w.to_string(), h.to_string()))
            .unwrap_or_default();

        let mut vars = HashMap::new();
        vars.insert("auth_player_name", session.player_name.clone());
        vars.insert("auth_uuid", session.player_uuid.replace('-', ""));
        vars.insert("auth_access_token", session.access_token.clone());
        vars.insert(
            "auth_session",
            format!("token:{}:{}", session.access_token, session.player_uuid),
        );
        vars.insert("auth_xuid", session.xuid.clone());
        vars.insert("clientid", session.client_id.clone());
        vars.insert("user_type", session.user_type.clone());
        vars.insert("user_properties", "{}".into());
        vars.insert("version_name", merged.id.clone());
        vars.insert("version_type", merged.version_type.clone());
        vars.insert("game_directory", safe_path_str(&ctx.game_dir));
        vars.insert("assets_root", safe_path_str(&ctx.assets_root));
        vars.insert("game_assets", safe_path_str(&game_assets));
        vars.insert("assets_index_name", assets_index);
        vars.insert("natives_directory", safe_path_str(&ctx.natives_dir));
        vars.insert("library_directory", safe_path_str(&ctx.libraries_dir));
        vars.insert("classpath", ctx.classpath.clone());
        vars.insert("module_path", ctx.module_path.clone());
        vars.insert(
            "classpath_separator",
            ctx.platform.classpath_separator().to_string(),
        );
        vars.insert("launcher_name", ctx.launcher_name.clone());
        vars.insert("launcher_version", ctx.launcher_version.clone());
        vars.insert("resolution_width", width);
        vars.insert("resolution_height", height);
        vars.insert(
            QUICK_PLAY_PLACEHOLDER,
            ctx.joins_server().map(ServerTarget::address).unwrap_or_default(),
        );
        vars
    }
}

/// Legacy descriptors carry no JVM template at all.
fn default_jvm_template() -> Vec<ArgumentToken> {
    let mut tokens = vec![
        ArgumentToken::Conditional {
            rules: vec![Rule::allow().on_os("osx")],
            value: crate::core::version::ArgumentValue::One("-XstartOnFirstThread".into()),
        },
        ArgumentToken::literal("-Djava.library.path=${natives_directory}"),
        ArgumentToken::literal("-Dminecraft.launcher.brand=${launcher_name}"),
        ArgumentToken::literal("-Dminecraft.launcher.version=${launcher_version}"),
    ];
    for flag in [
        "-XX:+UnlockExperimentalVMOptions",
        "-XX:+UseG1GC",
        "-XX:G1NewSizePercent=20",
        "-XX:G1ReservePercent=20",
        "-XX:MaxGCPauseMillis=50",
        "-XX:G1HeapRegionSize=32M",
    ] {
        tokens.push(ArgumentToken::literal(flag));
    }
    tokens.push(ArgumentToken::literal("-cp"));
    tokens.push(ArgumentToken::literal("${classpath}"));
    tokens
}

fn expand_into(
    out: &mut Vec<String>,
    templates: &[ArgumentToken],
    platform: &Platform,
    vars: &HashMap<&'static str, String>,
) {
    for token in templates.iter().flat_map(|t| t.expand(platform)) {
        match substitute(&token, vars) {
            Some(resolved) => out.push(resolved),
            None => {
                // The flag this value belonged to goes too.
                if !token.starts_with('-') {
                    drop_dangling_option(out);
                }
            }
        }
    }
}

/// `None` when a placeholder is unknown or resolves to nothing.
fn substitute(template: &str, vars: &HashMap<&'static str, String>) -> Option<String> {
    if !template.contains("${") {
        return Some(template.to_string());
    }

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut any_empty = false;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}')?;
        let value = vars.get(&after[..end])?;
        any_empty |= value.is_empty();
        out.push_str(value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);

    if any_empty || out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn drop_dangling_option(args: &mut Vec<String>) {
    if args.last().is_some_and(|last| last.starts_with('-')) {
        let _ = args.pop();
    }
}

fn contains_any(args: &[String], flags: &[&str]) -> bool {
    args.iter().any(|arg| flags.contains(&arg.as_str()))
}

/// The game rejects more than one quick-play mode.
fn keep_first_quick_play(args: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(args.len());
    let mut seen = false;
    let mut iter = args.into_iter().peekable();
    while let Some(arg) = iter.next() {
        if arg.starts_with("--quickPlay") {
            if seen {
                if iter.peek().is_some_and(|next| !next.starts_with('-')) {
                    iter.next();
                }
                continue;
            }
            seen = true;
        }
        out.push(arg);
    }
    out
}
