//! Asset classification by file extension.
//!
//! Used only by export tooling to group assets into per-category
//! directories; the codec itself never looks at names.

use std::fmt;

/// Export category for an asset, derived from its file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Text,
    Image,
    Sound,
    Swf,
    Font,
    Other,
}

impl AssetKind {
    /// Stable lowercase label, used as the export directory name.
    pub fn as_str(self) -> &'static str {
        match self {
            AssetKind::Text => "text",
            AssetKind::Image => "image",
            AssetKind::Sound => "sound",
            AssetKind::Swf => "swf",
            AssetKind::Font => "font",
            AssetKind::Other => "other",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a filename by the extension after its last dot,
/// case-insensitively. A name with no dot falls through to `Other`.
pub fn classify(filename: &str) -> AssetKind {
    let ext = filename.rsplit('.').next().unwrap_or("");
    match ext.to_ascii_lowercase().as_str() {
        "txt" | "dat" | "was" => AssetKind::Text,
        "jpg" | "jpeg" | "png" | "gif" | "flv" | "mp4" => AssetKind::Image,
        "mp3" => AssetKind::Sound,
        "swf" => AssetKind::Swf,
        "wff" => AssetKind::Font,
        _ => AssetKind::Other,
    }
}
