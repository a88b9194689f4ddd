// Downloader module - quality selection, stream fetch and merge

pub mod catalog;
pub mod errors;
pub mod extractors;
pub mod fetcher;
pub mod format_selector;
pub mod merge;
pub mod models;
pub mod orchestrator;
pub mod tools;
pub mod traits;
pub mod utils;

pub use catalog::{FormatCatalog, Session};
pub use errors::DownloadError;
pub use extractors::YtDlpInfoProvider;
pub use fetcher::{FetchRequest, StreamFetcher, YtDlpTransport};
pub use merge::{FfmpegCommand, FfmpegPipeline, MergeEngine};
pub use models::{
    Combination, DownloaderConfig, Format, MediaInfo, NetworkConfig, Stage, Status, TickerConfig,
    TransferPhase, TransferState, TransportEvent,
};
pub use orchestrator::Downloader;
pub use traits::{MediaInfoProvider, ProgressEmitter, RemuxBinding, Transport};
