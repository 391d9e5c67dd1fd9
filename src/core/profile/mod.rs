pub mod installer;
pub mod launch;
pub mod model;
pub mod options;
pub mod registry;
pub mod update;

pub use installer::ProfileInstaller;
pub use launch::{launch_profile, prepare_profile_launch, ProfileLaunch};
pub use model::{FileCategory, LoaderSpec, Profile, ProfileDescriptor, ProfileFile, ServerBlock};
pub use registry::ProfileRegistry;
pub use update::{AppliedChanges, ProfileDiff, ProfileUpdateChecker};
