use std::sync::Arc;

use tracing::info;

use super::model::Profile;
use super::registry::ProfileRegistry;
use super::update::ProfileUpdateChecker;
use crate::core::error::LauncherResult;
use crate::core::launch::{LaunchContext, PreparedVersion, ServerTarget};
use crate::core::servers::upsert_server;
use crate::core::state::AppState;

/// Everything needed to start an installed profile.
pub struct ProfileLaunch {
    pub profile: Profile,
    pub prepared: PreparedVersion,
    pub context: LaunchContext,
}

/// Update-check, re-verify and assemble the launch of profile `profile_id`.
/// A failed update check is logged and the installed state is used.
pub async fn prepare_profile_launch(
    state: &Arc<AppState>,
    profile_id: &str,
) -> LauncherResult<ProfileLaunch> {
    let mut profile = ProfileRegistry::new(state.paths.registry_file())
        .get(profile_id)
        .await?;

    if let Some(applied) = ProfileUpdateChecker::new(state.clone())
        .check_before_launch(&mut profile)
        .await
    {
        if !applied.is_empty() {
            info!("Applied updates to {} before launch", profile.id);
        }
    }

    let prepared = state
        .preparer(Some(&profile.root))
        .prepare(&profile.version_id, &state.platform)
        .await?;

    let (server, auto_connect) = match &profile.server {
        Some(block) => {
            upsert_server(
                &profile.servers_file(),
                &block.host,
                block.display_name(&profile.name),
                block.auto_connect,
            )
            .await?;
            (Some(ServerTarget::parse(&block.host)), block.auto_connect)
        }
        None => (None, false),
    };

    let mut context = state
        .launch_context(&prepared, profile.game_dir(), server, auto_connect)
        .await?;
    // Installer-jar loaders write their libraries into the profile, and their
    // JVM templates point `${library_directory}` at them.
    context.libraries_dir = profile.libraries_dir();
    Ok(ProfileLaunch {
        profile,
        prepared,
        context,
    })
}

/// Prepare and start profile `profile_id`.
pub async fn launch_profile(
    state: &Arc<AppState>,
    profile_id: &str,
) -> LauncherResult<tokio::process::Child> {
    let launch = prepare_profile_launch(state, profile_id).await?;
    info!(
        "Launching profile {} ({})",
        launch.profile.id, launch.profile.version_id
    );
    state.spawn(&launch.prepared, launch.context).await
}
