pub mod model;
pub mod store;

pub use model::{AppConfig, DEFAULT_RAM_GB, MAX_RAM_GB, MIN_RAM_GB};
pub use store::ConfigStore;
