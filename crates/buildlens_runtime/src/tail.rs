//! Following a growing event file.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Counters reported by a finished tailer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TailStats {
    /// Complete lines sent
    pub lines: u64,
    /// Bytes read, including a discarded partial line
    pub bytes: u64,
}

/// Follows one file and sends each complete line, as raw bytes without its
/// terminator
pub struct Tailer {
    path: PathBuf,
    poll_interval: Duration,
}

impl Tailer {
    /// Create a new tailer
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            path: path.into(),
            poll_interval,
        }
    }

    /// Run until cancelled or the receiver goes away.
    ///
    /// A missing file is retried every poll interval. At end of file the
    /// tailer sleeps and reads again; a trailing partial line is kept until
    /// its newline arrives and is dropped on cancellation.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be opened or read
    pub async fn run(
        self,
        lines: mpsc::Sender<Vec<u8>>,
        cancel: CancellationToken,
    ) -> io::Result<TailStats> {
        let mut stats = TailStats::default();

        let file = loop {
            match tokio::fs::File::open(&self.path).await {
                Ok(file) => break file,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::trace!(path = %self.path.display(), "Waiting for event file");
                    if !self.pause(&cancel).await {
                        return Ok(stats);
                    }
                }
                Err(e) => return Err(e),
            }
        };
        tracing::debug!(path = %self.path.display(), "Following event file");

        let mut reader = BufReader::new(file);
        let mut pending = Vec::new();

        loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => break,
                read = reader.read_until(b'\n', &mut pending) => read?,
            };
            stats.bytes += read as u64;

            if pending.last() != Some(&b'\n') {
                if !self.pause(&cancel).await {
                    break;
                }
                continue;
            }

            while matches!(pending.last(), Some(b'\n' | b'\r')) {
                pending.pop();
            }
            let line = std::mem::take(&mut pending);

            tokio::select! {
                _ = cancel.cancelled() => break,
                sent = lines.send(line) => {
                    if sent.is_err() {
                        break;
                    }
                    stats.lines += 1;
                }
            }
        }

        if !pending.is_empty() {
            tracing::debug!(bytes = pending.len(), "Discarding partial line");
        }
        Ok(stats)
    }

    /// Sleep one poll interval; false when cancelled meanwhile
    async fn pause(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.poll_interval) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_follows_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"one\ntw").unwrap();
        file.flush().unwrap();

        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(
            Tailer::new(&path, Duration::from_millis(5)).run(tx, cancel.clone()),
        );

        assert_eq!(rx.recv().await.as_deref(), Some(&b"one"[..]));
        file.write_all(b"o\r\nthree\npart").unwrap();
        file.flush().unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some(&b"two"[..]));
        assert_eq!(rx.recv().await.as_deref(), Some(&b"three"[..]));

        cancel.cancel();
        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.lines, 3);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_utf8_passed_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bytes.json");
        std::fs::write(&path, b"ok\n\xff\xfe\n").unwrap();

        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(
            Tailer::new(&path, Duration::from_millis(5)).run(tx, cancel.clone()),
        );

        assert_eq!(rx.recv().await.as_deref(), Some(&b"ok"[..]));
        assert_eq!(rx.recv().await.as_deref(), Some(&[0xff, 0xfe][..]));

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_waits_for_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("later.json");

        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(
            Tailer::new(&path, Duration::from_millis(5)).run(tx, cancel.clone()),
        );

        tokio::time::sleep(Duration::from_millis(30)).await;
        std::fs::write(&path, b"hello\n").unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some(&b"hello"[..]));

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancel_while_waiting() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let stats = Tailer::new(dir.path().join("never"), Duration::from_secs(60))
            .run(tx, cancel)
            .await
            .unwrap();
        assert_eq!(stats, TailStats::default());
    }
}
