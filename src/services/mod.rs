pub mod archive_extractor;
pub mod download_manager;
pub mod install_resolver;
pub mod link_resolver;
pub mod process_monitor;
pub mod transfer_engine;

pub use archive_extractor::ArchiveExtractor;
pub use download_manager::{DownloadManager, DownloadOutcome, DownloadRequest};
pub use link_resolver::{LinkResolver, ResolvedLink};
pub use process_monitor::{LaunchOutcome, ProcessMonitor};
pub use transfer_engine::{
    TransferControl, TransferEngine, TransferProgress, TransferRequest, TransferResult,
};
