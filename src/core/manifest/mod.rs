pub mod remote;

pub use remote::{HttpManifestFetcher, ManifestSource, RemoteManifest, DEFAULT_MANIFEST_URL};
