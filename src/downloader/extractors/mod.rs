// Media-info providers
//
// Currently backed by the native `yt-dlp` binary (`--dump-json`); the
// MediaInfoProvider trait is the seam for other extractors.

mod cli;

pub use cli::YtDlpInfoProvider;
