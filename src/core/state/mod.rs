pub mod app_state;
pub mod paths;
pub mod settings;

pub use app_state::AppState;
pub use paths::LauncherPaths;
pub use settings::LauncherSettings;
