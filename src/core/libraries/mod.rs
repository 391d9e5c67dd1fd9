mod resolver;

pub use resolver::{LibraryResolver, NativeBundle, ResolvedArtifact, ResolvedLibraries};
