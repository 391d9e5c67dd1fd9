//! Command-line front end: list versions, launch a version, install or play
//! a remote profile.

use std::sync::Arc;

use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing_subscriber::EnvFilter;

use profile_launcher::core::auth::{Session, StaticSession};
use profile_launcher::core::launch::ServerTarget;
use profile_launcher::core::profile::{launch_profile, ProfileInstaller, ProfileRegistry};
use profile_launcher::core::progress::progress_channel;
use profile_launcher::core::version::ManifestResolver;
use profile_launcher::{AppState, LauncherPaths, LauncherResult};

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,profile_launcher=debug")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn cli() -> Command {
    let player = Arg::new("player")
        .long("player")
        .short('u')
        .default_value("Player")
        .help("Offline player name");

    Command::new("profile-launcher")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Install and launch game versions and remote profiles")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("versions")
                .about("List versions from the remote catalog")
                .arg(
                    Arg::new("all")
                        .long("all")
                        .action(ArgAction::SetTrue)
                        .help("Include snapshots and old betas"),
                ),
        )
        .subcommand(
            Command::new("launch")
                .about("Prepare and launch a version")
                .arg(Arg::new("version").required(true))
                .arg(
                    Arg::new("server")
                        .long("server")
                        .help("host[:port] to join on start-up"),
                )
                .arg(player.clone()),
        )
        .subcommand(
            Command::new("install")
                .about("Install a profile published by a server")
                .arg(Arg::new("host").required(true))
                .arg(
                    Arg::new("profile")
                        .long("profile")
                        .help("Profile id (default: the first one published)"),
                ),
        )
        .subcommand(
            Command::new("play")
                .about("Update-check and launch an installed profile")
                .arg(Arg::new("profile").required(true))
                .arg(player),
        )
        .subcommand(Command::new("profiles").about("List installed profiles"))
}

fn player_session(matches: &ArgMatches) -> Arc<StaticSession> {
    let name = matches
        .get_one::<String>("player")
        .map(String::as_str)
        .unwrap_or("Player");
    Arc::new(StaticSession(Session::offline(name)))
}

async fn wait_for_game(mut child: tokio::process::Child) -> LauncherResult<i32> {
    let status = child.wait().await?;
    Ok(status.code().unwrap_or(1))
}

async fn run(matches: ArgMatches) -> LauncherResult<i32> {
    let paths = LauncherPaths::from_env();
    paths.ensure().await?;

    let (progress, mut events) = progress_channel();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event.fraction {
                Some(f) => eprintln!("[{:>3.0}%] {}", f * 100.0, event.message),
                None => eprintln!("       {}", event.message),
            }
        }
    });
    let state = AppState::load(paths)?.with_progress(progress);

    match matches.subcommand() {
        Some(("versions", sub)) => {
            let resolver = ManifestResolver::new(state.http_client.clone(), state.paths.versions_dir());
            let catalog = resolver.catalog().await?;
            if let Some(latest) = &catalog.latest {
                println!("latest release: {}, snapshot: {}", latest.release, latest.snapshot);
            }
            let versions: Vec<_> = if sub.get_flag("all") {
                catalog.versions.iter().collect()
            } else {
                catalog.releases()
            };
            for version in versions {
                println!("{}\t{}", version.id, version.version_type);
            }
            Ok(0)
        }
        Some(("launch", sub)) => {
            let state = state.with_session(player_session(sub));
            let version = sub.get_one::<String>("version").map(String::as_str).unwrap_or_default();
            let server = sub
                .get_one::<String>("server")
                .map(|s| ServerTarget::parse(s));
            let child = state.launch_version(version, server).await?;
            wait_for_game(child).await
        }
        Some(("install", sub)) => {
            let host = sub.get_one::<String>("host").map(String::as_str).unwrap_or_default();
            let profile_id = sub.get_one::<String>("profile").map(String::as_str);
            let profile = ProfileInstaller::new(Arc::new(state))
                .install_profile(host, profile_id)
                .await?;
            println!(
                "Installed '{}' as {} (launches {})",
                profile.name, profile.id, profile.version_id
            );
            Ok(0)
        }
        Some(("play", sub)) => {
            let state = Arc::new(state.with_session(player_session(sub)));
            let profile = sub.get_one::<String>("profile").map(String::as_str).unwrap_or_default();
            let child = launch_profile(&state, profile).await?;
            wait_for_game(child).await
        }
        Some(("profiles", _)) => {
            let registry = ProfileRegistry::new(state.paths.registry_file());
            for profile in registry.list().await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    profile.id, profile.version_id, profile.host, profile.name
                );
            }
            Ok(0)
        }
        _ => Ok(2),
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let matches = cli().get_matches();
    let code = match run(matches).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            1
        }
    };
    std::process::exit(code);
}
