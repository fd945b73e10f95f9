use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::TIMESTAMP_FORMAT;

/// Rendering category of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Audio,
    Video,
    File,
}

/// Every extension accepted for upload, with the category it renders as.
const EXTENSION_TABLE: &[(&str, FileKind)] = &[
    // Documents
    ("txt", FileKind::File),
    ("pdf", FileKind::File),
    ("doc", FileKind::File),
    ("docx", FileKind::File),
    ("xls", FileKind::File),
    ("xlsx", FileKind::File),
    ("ppt", FileKind::File),
    ("pptx", FileKind::File),
    // Images
    ("png", FileKind::Image),
    ("jpg", FileKind::Image),
    ("jpeg", FileKind::Image),
    ("gif", FileKind::Image),
    ("bmp", FileKind::Image),
    ("webp", FileKind::Image),
    // Audio
    ("mp3", FileKind::Audio),
    ("wav", FileKind::Audio),
    ("ogg", FileKind::Audio),
    ("flac", FileKind::Audio),
    ("m4a", FileKind::Audio),
    // Video
    ("mp4", FileKind::Video),
    ("avi", FileKind::Video),
    ("mkv", FileKind::Video),
    ("mov", FileKind::Video),
    ("wmv", FileKind::Video),
    // Archives
    ("zip", FileKind::File),
    ("rar", FileKind::File),
    ("7z", FileKind::File),
    ("tar", FileKind::File),
    ("gz", FileKind::File),
];

impl FileKind {
    /// Classify an extension (without the dot, any case).
    ///
    /// Returns `None` for extensions outside the upload allow-list.
    pub fn from_extension(ext: &str) -> Option<Self> {
        EXTENSION_TABLE
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(ext))
            .map(|(_, kind)| *kind)
    }

    pub fn allowed_extensions() -> impl Iterator<Item = &'static str> {
        EXTENSION_TABLE.iter().map(|(ext, _)| *ext)
    }
}

/// A stored upload as referenced from the message log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttachment {
    pub filename: String,
    /// Location of the file on the server.
    pub path: String,
    /// Inline `data:` URL preview; only images carry one.
    #[serde(default)]
    pub image_data: Option<String>,
}

/// Variant-specific part of a record, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordBody {
    Text {
        message: String,
        #[serde(rename = "shouldAutoCopy", default)]
        should_auto_copy: bool,
    },
    File(FileAttachment),
    Image(FileAttachment),
    Audio(FileAttachment),
    Video(FileAttachment),
    AiResponse {
        message: String,
        #[serde(rename = "originalText")]
        original_text: String,
        #[serde(rename = "isAiResponse", default = "always_true")]
        is_ai_response: bool,
    },
}

fn always_true() -> bool {
    true
}

impl RecordBody {
    pub fn for_file(kind: FileKind, attachment: FileAttachment) -> Self {
        match kind {
            FileKind::Image => Self::Image(attachment),
            FileKind::Audio => Self::Audio(attachment),
            FileKind::Video => Self::Video(attachment),
            FileKind::File => Self::File(attachment),
        }
    }

    /// The `type` tag this body serializes with.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::File(_) => "file",
            Self::Image(_) => "image",
            Self::Audio(_) => "audio",
            Self::Video(_) => "video",
            Self::AiResponse { .. } => "ai_response",
        }
    }

    pub fn attachment(&self) -> Option<&FileAttachment> {
        match self {
            Self::File(a) | Self::Image(a) | Self::Audio(a) | Self::Video(a) => Some(a),
            Self::Text { .. } | Self::AiResponse { .. } => None,
        }
    }
}

/// One entry of the message log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub timestamp: String,
    #[serde(flatten)]
    pub body: RecordBody,
}

impl MessageRecord {
    /// Stamp a body with a fresh id and the current local time.
    pub fn new(body: RecordBody) -> Self {
        Self {
            id: next_record_id(),
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            body,
        }
    }

    pub fn text(message: impl Into<String>, should_auto_copy: bool) -> Self {
        Self::new(RecordBody::Text {
            message: message.into(),
            should_auto_copy,
        })
    }

    pub fn file(kind: FileKind, attachment: FileAttachment) -> Self {
        Self::new(RecordBody::for_file(kind, attachment))
    }

    pub fn ai_response(reply: impl Into<String>, original_text: impl Into<String>) -> Self {
        Self::new(RecordBody::AiResponse {
            message: reply.into(),
            original_text: original_text.into(),
            is_ai_response: true,
        })
    }
}

static LAST_ID_MICROS: AtomicU64 = AtomicU64::new(0);

/// Timestamp-derived id (`<secs>.<micros>`), strictly increasing per process.
pub fn next_record_id() -> String {
    let now = u64::try_from(Utc::now().timestamp_micros()).unwrap_or(0);
    let prev = LAST_ID_MICROS
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or_else(|last| last);
    let micros = now.max(prev + 1);
    format!("{}.{:06}", micros / 1_000_000, micros % 1_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_classification_table() {
        assert_eq!(FileKind::from_extension("png"), Some(FileKind::Image));
        assert_eq!(FileKind::from_extension("JPEG"), Some(FileKind::Image));
        assert_eq!(FileKind::from_extension("flac"), Some(FileKind::Audio));
        assert_eq!(FileKind::from_extension("mkv"), Some(FileKind::Video));
        assert_eq!(FileKind::from_extension("docx"), Some(FileKind::File));
        assert_eq!(FileKind::from_extension("7z"), Some(FileKind::File));
        assert_eq!(FileKind::from_extension("exe"), None);
        assert_eq!(FileKind::from_extension(""), None);
        assert_eq!(FileKind::allowed_extensions().count(), 29);
    }

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let ids: Vec<String> = (0..1000).map(|_| next_record_id()).collect();
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());

        let as_micros = |id: &String| -> u64 {
            let (secs, micros) = id.split_once('.').unwrap();
            secs.parse::<u64>().unwrap() * 1_000_000 + micros.parse::<u64>().unwrap()
        };
        assert!(ids.windows(2).all(|w| as_micros(&w[0]) < as_micros(&w[1])));
    }

    #[test]
    fn test_text_record_wire_shape() {
        let record = MessageRecord::text("hello", false);
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["type"], "text");
        assert_eq!(value["message"], "hello");
        assert_eq!(value["shouldAutoCopy"], false);
        assert_eq!(value["id"], record.id.as_str());
        assert_eq!(record.timestamp.len(), "2024-01-01 00:00:00".len());
    }

    #[test]
    fn test_file_record_wire_shape() {
        let record = MessageRecord::file(
            FileKind::Audio,
            FileAttachment {
                filename: "song.mp3".into(),
                path: "uploads/song.mp3".into(),
                image_data: None,
            },
        );
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["type"], "audio");
        assert_eq!(value["filename"], "song.mp3");
        assert_eq!(value["path"], "uploads/song.mp3");
        assert!(value["image_data"].is_null());
        assert_eq!(record.body.type_name(), "audio");
    }

    #[test]
    fn test_reads_legacy_log_entries() {
        let raw = r#"[
            {"id": "1712345678.123456", "type": "ai_response", "message": "hi there",
             "timestamp": "2024-04-05 12:00:00", "isAiResponse": true, "originalText": "hi"},
            {"id": "1712345679.000001", "type": "image", "filename": "cat.png",
             "path": "/srv/uploads/cat.png", "image_data": null, "timestamp": "2024-04-05 12:00:01"}
        ]"#;
        let records: Vec<MessageRecord> = serde_json::from_str(raw).unwrap();

        assert_eq!(
            records[0].body,
            RecordBody::AiResponse {
                message: "hi there".into(),
                original_text: "hi".into(),
                is_ai_response: true,
            }
        );
        assert_eq!(records[1].body.attachment().unwrap().filename, "cat.png");
    }
}
