pub mod orchestrator;

pub use orchestrator::{LaunchSession, SessionOutcome, SessionState};
