// External tool discovery (yt-dlp, ffmpeg)

use std::process::Command;

use super::errors::DownloadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolType {
    YtDlp,
    Ffmpeg,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::Ffmpeg => "ffmpeg",
        }
    }
}

#[derive(Debug, Default)]
pub struct ToolManager;

impl ToolManager {
    pub fn new() -> Self {
        Self
    }

    /// Absolute path of an installed tool
    pub fn resolve(&self, tool_type: ToolType) -> Result<String, DownloadError> {
        self.find_path(tool_type)
            .ok_or_else(|| DownloadError::ToolNotFound(tool_type.as_str().to_string()))
    }

    /// Installed path, or the bare name so PATH lookup happens at spawn time
    pub fn resolve_or_bare(&self, tool_type: ToolType) -> String {
        self.find_path(tool_type)
            .unwrap_or_else(|| tool_type.as_str().to_string())
    }

    fn find_path(&self, tool_type: ToolType) -> Option<String> {
        let binary_name = tool_type.as_str();

        // 1. Try common paths first
        let common_paths = [
            format!("/opt/homebrew/bin/{}", binary_name),
            format!("/usr/local/bin/{}", binary_name),
            format!("/usr/bin/{}", binary_name),
        ];

        for path in common_paths {
            if std::path::Path::new(&path).exists() {
                tracing::debug!(tool = binary_name, %path, "found tool in common path");
                return Some(path);
            }
        }

        // 2. Try PATH
        if let Ok(output) = Command::new("which").arg(binary_name).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    tracing::debug!(tool = binary_name, %path, "found tool on PATH");
                    return Some(path);
                }
            }
        }

        None
    }
}
