//! File tailer for following a growing GC log.
//!
//! Reads the file in bounded chunks, reassembles newline-delimited lines
//! across chunk boundaries, and detects log rotation via file identity
//! (device + inode on Unix) and truncation.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{
    DEFAULT_CHUNK_SIZE, DEFAULT_MAX_MISSING_POLLS, DEFAULT_POLL_INTERVAL, GcStatsConfig,
};
use crate::error::TailError;

/// Maximum number of lines returned by a single `next_lines()` call.
/// A large backlog is handed out over several calls without sleeping.
const MAX_LINES_PER_READ: usize = 10_000;

/// Granularity of the end-of-file sleep, so a cleared run flag is noticed.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Shortest end-of-file sleep; the wait state never spins.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Stable identity of an open log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileId {
    dev: u64,
    ino: u64,
}

impl FileId {
    #[cfg(unix)]
    fn of(metadata: &fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }

    /// Non-Unix: constant identity, rotation is detected by truncation only.
    #[cfg(not(unix))]
    fn of(_metadata: &fs::Metadata) -> Self {
        Self { dev: 0, ino: 0 }
    }
}

/// Which file is being read and how far into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogPosition {
    pub id: FileId,
    pub offset: u64,
}

/// Undelivered bytes of an unterminated trailing line.
///
/// Every complete line is handed out as soon as its newline arrives;
/// only the incomplete remainder is kept.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    /// Drop everything up to the next newline (tail mode opened mid-line).
    skip_partial: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return the lines it completed, without delimiters.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            if self.skip_partial {
                self.skip_partial = false;
            } else {
                self.pending.extend_from_slice(&rest[..pos]);
                lines.push(String::from_utf8_lossy(&self.pending).into_owned());
            }
            self.pending.clear();
            rest = &rest[pos + 1..];
        }

        if !self.skip_partial {
            self.pending.extend_from_slice(rest);
        }
        lines
    }

    /// Bytes of the incomplete line held back so far.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn clear(&mut self) {
        self.pending.clear();
        self.skip_partial = false;
    }
}

/// Outcome of re-checking the log path during a wait cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationCheck {
    /// Same file, not truncated.
    Unchanged,
    /// Replaced or truncated; reopened from offset 0.
    Reopened,
    /// Path could not be stat'd or opened this cycle.
    Missing,
}

/// Reads new lines appended to a GC log file.
///
/// Owns the open handle, the read position and the partial-line buffer.
/// Lines are delivered in file order, at most once, without their newline.
pub struct FileTailer {
    path: PathBuf,
    file: File,
    position: LogPosition,
    buffer: LineBuffer,
    chunk: Vec<u8>,
    poll_interval: Duration,
    max_missing_polls: u32,
    missing_polls: u32,
}

impl FileTailer {
    /// Open `path`, either at its current end (`start_at_end`) or at offset 0.
    ///
    /// Returns `TailError::Open` if the file does not exist or cannot be read.
    pub fn open(path: impl Into<PathBuf>, start_at_end: bool) -> Result<Self, TailError> {
        let path = path.into();
        let opened = open_at(&path, start_at_end);
        let (file, position, skip_partial) = match opened {
            Ok(v) => v,
            Err(source) => return Err(TailError::Open { path, source }),
        };

        let mut buffer = LineBuffer::new();
        buffer.skip_partial = skip_partial;

        Ok(Self {
            path,
            file,
            position,
            buffer,
            chunk: vec![0; DEFAULT_CHUNK_SIZE],
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_missing_polls: DEFAULT_MAX_MISSING_POLLS,
            missing_polls: 0,
        })
    }

    /// Open the tailer described by `config`.
    pub fn from_config(config: &GcStatsConfig) -> Result<Self, TailError> {
        Ok(Self::open(&config.path, config.start_at_end)?
            .with_chunk_size(config.chunk_size)
            .with_poll_interval(config.poll_interval)
            .with_max_missing_polls(config.max_missing_polls))
    }

    /// Set the maximum bytes per read call. Zero is bumped to one.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk = vec![0; chunk_size.max(1)];
        self
    }

    /// Set the end-of-file sleep. Clamped to at least `MIN_POLL_INTERVAL`.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
        self
    }

    pub fn with_max_missing_polls(mut self, max_missing_polls: u32) -> Self {
        self.max_missing_polls = max_missing_polls;
        self
    }

    /// Returns the followed file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the identity and offset of the file currently open.
    pub fn position(&self) -> LogPosition {
        self.position
    }

    /// Read everything currently available and return the completed lines.
    ///
    /// Never blocks: stops at end of file, at `MAX_LINES_PER_READ` lines, or
    /// on a read error (logged and retried on the next call).
    pub fn read_available(&mut self) -> Vec<String> {
        let mut lines = Vec::new();

        while lines.len() < MAX_LINES_PER_READ {
            match self.file.read(&mut self.chunk) {
                Ok(0) => break,
                Ok(n) => {
                    self.position.offset += n as u64;
                    lines.extend(self.buffer.push(&self.chunk[..n]));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "read failed, retrying next cycle");
                    break;
                }
            }
        }

        lines
    }

    /// Re-stat the path and reopen it from the start if it was replaced or
    /// truncated.
    ///
    /// Unreadable paths are tolerated for `max_missing_polls` consecutive
    /// checks; after that `TailError::Unavailable` is returned.
    pub fn check_rotation(&mut self) -> Result<RotationCheck, TailError> {
        let metadata = match fs::metadata(&self.path) {
            Ok(m) => m,
            Err(e) => return self.record_missing(e),
        };

        let current_id = FileId::of(&metadata);
        if current_id == self.position.id && metadata.len() >= self.position.offset {
            self.missing_polls = 0;
            return Ok(RotationCheck::Unchanged);
        }

        let (file, position, _) = match open_at(&self.path, false) {
            Ok(v) => v,
            Err(e) => return self.record_missing(e),
        };

        info!(
            path = %self.path.display(),
            old_offset = self.position.offset,
            dropped_partial = self.buffer.pending_len(),
            "log file rotated, reopening from start"
        );

        self.file = file;
        self.position = position;
        self.buffer.clear();
        self.missing_polls = 0;
        Ok(RotationCheck::Reopened)
    }

    /// Block until at least one complete line is available.
    ///
    /// At end of file the path is re-checked for rotation, `on_idle` is
    /// called once, and the tailer sleeps for the poll interval. Returns an
    /// empty batch as soon as `running` is cleared.
    pub fn next_lines(
        &mut self,
        running: &AtomicBool,
        mut on_idle: impl FnMut(),
    ) -> Result<Vec<String>, TailError> {
        loop {
            let lines = self.read_available();
            if !lines.is_empty() || !running.load(Ordering::SeqCst) {
                return Ok(lines);
            }

            if self.check_rotation()? == RotationCheck::Reopened {
                continue;
            }

            on_idle();
            self.sleep(running);
        }
    }

    fn record_missing(&mut self, source: io::Error) -> Result<RotationCheck, TailError> {
        self.missing_polls += 1;
        if self.missing_polls > self.max_missing_polls {
            return Err(TailError::Unavailable {
                path: self.path.clone(),
                attempts: self.missing_polls,
                source,
            });
        }
        debug!(
            path = %self.path.display(),
            attempt = self.missing_polls,
            error = %source,
            "log path unavailable, will retry"
        );
        Ok(RotationCheck::Missing)
    }

    fn sleep(&self, running: &AtomicBool) {
        let mut remaining = self.poll_interval;
        while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
            let slice = remaining.min(SLEEP_SLICE);
            std::thread::sleep(slice);
            remaining = remaining.saturating_sub(slice);
        }
    }
}

/// Open `path` and position it. The flag reports whether the offset falls
/// in the middle of a line.
fn open_at(path: &Path, start_at_end: bool) -> io::Result<(File, LogPosition, bool)> {
    let mut file = File::open(path)?;
    let id = FileId::of(&file.metadata()?);

    if !start_at_end {
        return Ok((file, LogPosition { id, offset: 0 }, false));
    }

    let offset = file.seek(SeekFrom::End(0))?;
    let mid_line = if offset > 0 {
        let mut last = [0u8; 1];
        file.seek(SeekFrom::Start(offset - 1))?;
        file.read_exact(&mut last)?;
        last[0] != b'\n'
    } else {
        false
    };

    Ok((file, LogPosition { id, offset }, mid_line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn append(path: &Path, text: &str) {
        let mut f = std::fs::OpenOptions::new()
            .append(true)
            .open(path)
            .unwrap();
        f.write_all(text.as_bytes()).unwrap();
    }

    fn fast(tailer: FileTailer) -> FileTailer {
        tailer.with_poll_interval(Duration::from_millis(1))
    }

    /// Lines a one-shot split of the whole stream would produce.
    fn reference_split(stream: &[u8]) -> Vec<String> {
        let mut parts: Vec<String> = stream
            .split(|&b| b == b'\n')
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .collect();
        // The last segment is either empty or an unterminated line.
        parts.pop();
        parts
    }

    #[test]
    fn test_line_buffer_any_chunking_matches_full_split() {
        let streams: [&[u8]; 4] = [
            b"ParNew: 1K->2K\nsecond line\n\nthird",
            b"a\nbb\nccc\n",
            b"\n\n\n",
            b"no newline at all",
        ];

        for stream in streams {
            let expected = reference_split(stream);
            for chunk_size in 1..=stream.len() {
                let mut buffer = LineBuffer::new();
                let mut lines = Vec::new();
                for chunk in stream.chunks(chunk_size) {
                    lines.extend(buffer.push(chunk));
                }
                assert_eq!(lines, expected, "chunk size {}", chunk_size);
            }
            for split in 0..=stream.len() {
                let mut buffer = LineBuffer::new();
                let mut lines = buffer.push(&stream[..split]);
                lines.extend(buffer.push(&stream[split..]));
                assert_eq!(lines, expected, "split at {}", split);
            }
        }
    }

    #[test]
    fn test_line_buffer_holds_partial_line() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(b"user=0.10").is_empty());
        assert_eq!(buffer.pending_len(), 9);

        let lines = buffer.push(b", real=0.20\nnext");
        assert_eq!(lines, vec!["user=0.10, real=0.20"]);
        assert_eq!(buffer.pending_len(), 4);
    }

    #[test]
    fn test_line_buffer_skip_partial() {
        let mut buffer = LineBuffer::new();
        buffer.skip_partial = true;
        assert!(buffer.push(b"tail of old").is_empty());
        assert_eq!(buffer.push(b" line\nwhole\n"), vec!["whole"]);
    }

    #[test]
    fn test_tailer_replay_reads_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gc.log");
        std::fs::write(&path, "line 1\nline 2\n").unwrap();

        let mut tailer = FileTailer::open(&path, false).unwrap();
        assert_eq!(tailer.read_available(), vec!["line 1", "line 2"]);
        assert!(tailer.read_available().is_empty());
        assert_eq!(tailer.position().offset, 14);
    }

    #[test]
    fn test_tailer_tail_mode_starts_at_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gc.log");
        std::fs::write(&path, "old line 1\nold line 2\n").unwrap();

        let mut tailer = FileTailer::open(&path, true).unwrap();
        assert!(tailer.read_available().is_empty());

        append(&path, "new line\n");
        assert_eq!(tailer.read_available(), vec!["new line"]);
    }

    #[test]
    fn test_tailer_tail_mode_skips_fragment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gc.log");
        std::fs::write(&path, "old\nhalf a li").unwrap();

        let mut tailer = FileTailer::open(&path, true).unwrap();
        append(&path, "ne\nfresh\n");
        assert_eq!(tailer.read_available(), vec!["fresh"]);
    }

    #[test]
    fn test_tailer_reassembles_lines_across_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gc.log");
        let long = "x".repeat(100);
        std::fs::write(&path, format!("{}\nshort\n", long)).unwrap();

        let mut tailer = FileTailer::open(&path, false).unwrap().with_chunk_size(7);
        assert_eq!(tailer.read_available(), vec![long, "short".to_string()]);
    }

    #[test]
    fn test_tailer_withholds_incomplete_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gc.log");
        std::fs::write(&path, "complete\npartial").unwrap();

        let mut tailer = FileTailer::open(&path, false).unwrap();
        assert_eq!(tailer.read_available(), vec!["complete"]);

        append(&path, " now done\n");
        assert_eq!(tailer.read_available(), vec!["partial now done"]);
    }

    #[test]
    fn test_tailer_detects_replacement() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gc.log");
        std::fs::write(&path, "a\nb\n").unwrap();

        let mut tailer = fast(FileTailer::open(&path, false).unwrap());
        assert_eq!(tailer.read_available(), vec!["a", "b"]);

        std::fs::rename(&path, dir.path().join("gc.log.1")).unwrap();
        std::fs::write(&path, "c\n").unwrap();

        let running = AtomicBool::new(true);
        let lines = tailer.next_lines(&running, || {}).unwrap();
        assert_eq!(lines, vec!["c"]);
        assert_eq!(tailer.position().offset, 2);
    }

    #[test]
    fn test_tailer_detects_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gc.log");
        std::fs::write(&path, format!("{}\n", "a".repeat(1000))).unwrap();

        let mut tailer = FileTailer::open(&path, false).unwrap();
        assert_eq!(tailer.read_available().len(), 1);

        std::fs::write(&path, "after rotation\n").unwrap();
        assert_eq!(tailer.check_rotation().unwrap(), RotationCheck::Reopened);
        assert_eq!(tailer.read_available(), vec!["after rotation"]);
    }

    #[test]
    fn test_tailer_rotation_drops_stale_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gc.log");
        std::fs::write(&path, "kept\nstale frag").unwrap();

        let mut tailer = FileTailer::open(&path, false).unwrap();
        assert_eq!(tailer.read_available(), vec!["kept"]);

        std::fs::remove_file(&path).unwrap();
        std::fs::write(&path, "new\n").unwrap();
        assert_eq!(tailer.check_rotation().unwrap(), RotationCheck::Reopened);
        assert_eq!(tailer.read_available(), vec!["new"]);
    }

    #[test]
    fn test_tailer_unchanged_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gc.log");
        std::fs::write(&path, "x\n").unwrap();

        let mut tailer = FileTailer::open(&path, false).unwrap();
        tailer.read_available();
        assert_eq!(tailer.check_rotation().unwrap(), RotationCheck::Unchanged);
    }

    #[test]
    fn test_tailer_idle_callback_once_per_wait() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gc.log");
        std::fs::write(&path, "").unwrap();

        let mut tailer = fast(FileTailer::open(&path, false).unwrap());
        let running = AtomicBool::new(true);
        let mut idle = 0;
        let lines = tailer
            .next_lines(&running, || {
                idle += 1;
                if idle == 3 {
                    append(&path, "late line\n");
                }
            })
            .unwrap();

        assert_eq!(lines, vec!["late line"]);
        assert_eq!(idle, 3);
    }

    #[test]
    fn test_tailer_zero_poll_interval_still_sleeps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gc.log");
        std::fs::write(&path, "").unwrap();

        let mut tailer = FileTailer::open(&path, false)
            .unwrap()
            .with_poll_interval(Duration::ZERO);
        let running = AtomicBool::new(true);
        let mut idle = 0;
        let started = std::time::Instant::now();
        let lines = tailer
            .next_lines(&running, || {
                idle += 1;
                if idle == 5 {
                    running.store(false, Ordering::SeqCst);
                }
            })
            .unwrap();

        assert!(lines.is_empty());
        assert_eq!(idle, 5);
        assert!(started.elapsed() >= MIN_POLL_INTERVAL * 4);
    }

    #[test]
    fn test_tailer_stops_when_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gc.log");
        std::fs::write(&path, "").unwrap();

        let mut tailer = FileTailer::open(&path, false).unwrap();
        let running = AtomicBool::new(false);
        assert!(tailer.next_lines(&running, || {}).unwrap().is_empty());
    }

    #[test]
    fn test_tailer_missing_file_is_transient_then_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gc.log");
        std::fs::write(&path, "content\n").unwrap();

        let mut tailer = fast(FileTailer::open(&path, false).unwrap()).with_max_missing_polls(2);
        assert_eq!(tailer.read_available(), vec!["content"]);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(tailer.check_rotation().unwrap(), RotationCheck::Missing);
        assert_eq!(tailer.check_rotation().unwrap(), RotationCheck::Missing);
        match tailer.check_rotation() {
            Err(TailError::Unavailable { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected Unavailable, got {:?}", other),
        }
    }

    #[test]
    fn test_tailer_missing_counter_resets_on_recreate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gc.log");
        std::fs::write(&path, "one\n").unwrap();

        let mut tailer = FileTailer::open(&path, false).unwrap().with_max_missing_polls(1);
        tailer.read_available();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(tailer.check_rotation().unwrap(), RotationCheck::Missing);

        std::fs::write(&path, "two\n").unwrap();
        assert_eq!(tailer.check_rotation().unwrap(), RotationCheck::Reopened);
        assert_eq!(tailer.read_available(), vec!["two"]);
    }

    #[test]
    fn test_tailer_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileTailer::open(dir.path().join("absent.log"), false);
        assert!(matches!(result, Err(TailError::Open { .. })));
    }

    #[test]
    fn test_tailer_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gc.log");
        std::fs::write(&path, "abc\n").unwrap();

        let config = GcStatsConfig {
            chunk_size: 1,
            ..GcStatsConfig::new(&path)
        };
        let mut tailer = FileTailer::from_config(&config).unwrap();
        assert_eq!(tailer.path(), path);
        assert_eq!(tailer.read_available(), vec!["abc"]);
    }
}
