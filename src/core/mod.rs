// ─── Profile Launcher Core ───
// Version resolution, install and launch engine.
//
// Architecture:
//   core/
//     version/    : catalog, descriptors, rules, inheritance merge
//     maven/      : coordinates and repository layout
//     libraries/  : classpath, module path and native partitioning
//     downloader/ : bounded, retrying, SHA-1 validating download pool
//     assets/     : asset index and content-addressed objects
//     natives/    : native bundle extraction
//     launch/     : argument builder, preparation pipeline, process spawn
//     loaders/    : Forge, NeoForge, Fabric, Quilt installers
//     profile/    : remote profiles, install, update check
//     servers/    : NBT codec and server list
//     auth/, java/: session and Java runtime collaborators
//     state/      : paths, settings, shared wiring

pub mod assets;
pub mod auth;
pub mod downloader;
pub mod error;
pub mod http;
pub mod java;
pub mod launch;
pub mod libraries;
pub mod loaders;
pub mod locks;
pub mod maven;
pub mod natives;
pub mod platform;
pub mod profile;
pub mod progress;
pub mod servers;
pub mod state;
pub mod storage;
pub mod version;

#[cfg(test)]
pub(crate) mod test_support;
