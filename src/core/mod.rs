// ─── Arcend Core ───
// Updater and launcher for a single game bundle.
//
// Architecture:
//   core/
//     config/   - Persisted settings (RAM, installed release)
//     install/  - Protected entries + top-level cleanup
//     manifest/ - Remote release descriptor
//     sync/     - Archive download, extraction, reconciliation
//     auth/     - Account profile + providers
//     launch/   - Launch options, version profiles + Java process spawner
//     session/  - One play request, start to exit
//     state/    - Shared application state

pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod install;
pub mod launch;
pub mod manifest;
pub mod paths;
pub mod session;
pub mod state;
pub mod sync;
