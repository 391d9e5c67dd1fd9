pub mod manifest;
pub mod resolver;
pub mod rules;
pub mod version_file;

pub use manifest::{LatestVersions, VersionEntry, VersionManifest};
pub use resolver::{ClientJar, ManifestResolver, MergedDescriptor};
pub use rules::{rules_allow, OsRule, Rule, RuleAction};
pub use version_file::{
    ArgumentToken, ArgumentValue, Arguments, AssetIndexRef, DownloadArtifact, LibraryArtifact,
    LibraryDownloads, LibraryEntry, VersionDescriptor,
};
