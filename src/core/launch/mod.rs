pub mod options;
pub mod profile;
pub mod task;

pub use options::{build_launch_options, LaunchOptions, MemoryBounds, VersionSpec};
pub use profile::{resolve_launch_profile, LaunchProfile};
pub use task::{launch_arguments, GameLauncher, GameProcess, JavaGameLauncher};
