pub mod downloader;

pub use downloader::{
    Combination, DownloadError, Downloader, DownloaderConfig, Format, MediaInfo, MediaInfoProvider,
    ProgressEmitter, Session, Stage, Status, TransferState, YtDlpInfoProvider,
};
