pub mod download;
pub mod extract;
pub mod synchronizer;

pub use download::{sweep_stale_archives, ArchiveDownloader, TempArchive};
pub use extract::extract_archive;
pub use synchronizer::{ContentSynchronizer, SyncResult};
