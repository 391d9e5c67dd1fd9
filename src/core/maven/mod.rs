mod artifact;

pub use artifact::MavenArtifact;

/// Repositories hosting loader installers.
pub const FORGE_MAVEN: &str = "https://maven.minecraftforge.net";
pub const NEOFORGE_MAVEN: &str = "https://maven.neoforged.net/releases";
