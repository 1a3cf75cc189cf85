pub mod cleanup;
pub mod protected;

pub use cleanup::{clean_install_dir, has_game_content, CleanupReport};
pub use protected::{is_protected, ProtectedPattern, PROTECTED_ENTRIES};
