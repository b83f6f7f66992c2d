//! Incremental parsing of a session's append-only conversation log.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use atoll_core::Message;

/// The result of one [`LogTailer::poll`].
#[derive(Debug, Clone, PartialEq)]
pub struct TailBatch {
    /// Whether a reset marker was observed. The caller must empty the
    /// session's conversation before appending `messages`, in the same
    /// delta batch.
    pub reset: bool,
    /// Newly decoded records, in file order. When `reset` is set, only the
    /// records after the last reset marker.
    pub messages: Vec<Message>,
}

impl TailBatch {
    fn empty() -> Self {
        Self {
            reset: false,
            messages: Vec::new(),
        }
    }

    /// Whether this batch carries nothing to apply.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.reset && self.messages.is_empty()
    }
}

/// Incremental reader of one append-only JSONL log.
///
/// The tailer owns its byte offset: each [`poll`](Self::poll) consumes the
/// complete lines appended since the previous one. A trailing partial line
/// is left unconsumed and re-read once its newline arrives. Malformed lines
/// are skipped with a warning. A reset marker (a user message beginning
/// with `/clear`) arms a rewind: the next poll re-reads the file from the
/// start, which converges back to the post-marker tail because the marker
/// is re-encountered. Truncation below the owned offset rewinds immediately.
#[derive(Debug)]
pub struct LogTailer {
    path: PathBuf,
    offset: u64,
    rewind_armed: bool,
}

impl LogTailer {
    /// Create a tailer for the given log file. The file need not exist yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            rewind_armed: false,
        }
    }

    /// The log file this tailer reads.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset of the first unconsumed byte.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read and decode the complete lines appended since the last poll.
    ///
    /// A missing file is not an error; the poll returns an empty batch. Any
    /// I/O failure is logged and yields an empty batch without advancing
    /// the offset; the tailer stays usable.
    pub fn poll(&mut self) -> TailBatch {
        // A rewound poll re-reads content whose markers were already
        // processed; re-arming on them would re-read forever.
        let rewound = self.rewind_armed;
        if rewound {
            self.rewind_armed = false;
            self.offset = 0;
        }

        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return TailBatch::empty(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to open conversation log");
                return TailBatch::empty();
            },
        };

        let len = match file.metadata() {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to stat conversation log");
                return TailBatch::empty();
            },
        };
        if len < self.offset {
            debug!(
                path = %self.path.display(),
                len,
                offset = self.offset,
                "conversation log truncated; re-reading from start"
            );
            self.offset = 0;
        }

        if let Err(e) = file.seek(SeekFrom::Start(self.offset)) {
            warn!(path = %self.path.display(), error = %e, "failed to seek conversation log");
            return TailBatch::empty();
        }
        let mut buf = Vec::new();
        if let Err(e) = file.read_to_end(&mut buf) {
            warn!(path = %self.path.display(), error = %e, "failed to read conversation log");
            return TailBatch::empty();
        }

        // Complete lines only: a trailing partial line stays unconsumed.
        let Some(consumed) = buf.iter().rposition(|&b| b == b'\n').map(|i| i.saturating_add(1))
        else {
            return TailBatch::empty();
        };
        self.offset = self.offset.saturating_add(consumed as u64);

        let mut messages = Vec::new();
        for line in buf[..consumed].split(|&b| b == b'\n') {
            let text = String::from_utf8_lossy(line);
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            match Message::parse_line(text) {
                Ok(message) => messages.push(message),
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "skipping malformed log line");
                },
            }
        }

        // A reset marker drops everything up to and including itself and
        // arms a rewind for the next poll.
        if let Some(last_marker) = messages.iter().rposition(Message::is_reset_marker) {
            if !rewound {
                self.rewind_armed = true;
            }
            let tail = messages.split_off(last_marker.saturating_add(1));
            return TailBatch {
                reset: true,
                messages: tail,
            };
        }

        TailBatch {
            reset: false,
            messages,
        }
    }
}
