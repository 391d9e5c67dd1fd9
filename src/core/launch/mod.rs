pub mod arguments;
pub mod classpath;
pub mod prepare;
pub mod task;

pub use arguments::{LaunchCommandBuilder, LaunchContext, ServerTarget, DEFAULT_SERVER_PORT};
pub use classpath::{join_classpath, safe_path_str};
pub use prepare::{PreparedVersion, VersionPreparer};
pub use task::spawn_game;
