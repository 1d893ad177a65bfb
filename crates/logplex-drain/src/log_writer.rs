// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::errors::WriteError;
use crate::headers::FrameHeaders;
use crate::message::LogplexMessage;
use crate::router::Router;

pub const DEFAULT_DIR_MODE: u32 = 0o755;
pub const DEFAULT_FILE_MODE: u32 = 0o644;

#[async_trait]
pub trait LogWriter {
    /// Appends one line per message of an accepted batch, returning the number
    /// of lines written. Lines for the same destination keep their order in
    /// the batch.
    async fn write_batch(
        &self,
        headers: &FrameHeaders,
        messages: &[LogplexMessage],
    ) -> Result<usize, WriteError>;
}

/// Appends messages to plain text files chosen by a [`Router`].
///
/// Every destination path has its own lock, created the first time the path
/// is seen. A batch takes the locks of all its destinations, in path order,
/// before writing anything and keeps them until its last line is on disk, so
/// two batches never interleave lines in the same file. Lines themselves are
/// written in the order the messages were decoded, across all destinations.
pub struct FileLogWriter {
    router: Router,
    dir_mode: u32,
    file_mode: u32,
    /// Only holds paths some batch is currently writing to. Entries nobody
    /// holds are pruned after every batch, so the map cannot grow with the
    /// number of distinct sources seen over the process lifetime.
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl FileLogWriter {
    pub fn new(router: Router, dir_mode: u32, file_mode: u32) -> Self {
        FileLogWriter {
            router,
            dir_mode,
            file_mode,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    async fn lock_destination(&self, path: &Path) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(path.to_path_buf()).or_default())
        };
        lock.lock_owned().await
    }

    /// Drops the locks no batch holds or waits on. Clones are only handed out
    /// under the map lock, so a count of one means the map has the last one.
    async fn prune_locks(&self) {
        self.locks
            .lock()
            .await
            .retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    #[cfg(test)]
    async fn tracked_locks(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[async_trait]
impl LogWriter for FileLogWriter {
    async fn write_batch(
        &self,
        headers: &FrameHeaders,
        messages: &[LogplexMessage],
    ) -> Result<usize, WriteError> {
        if messages.is_empty() {
            return Ok(0);
        }
        let lines: Vec<(PathBuf, String)> = messages
            .iter()
            .map(|message| {
                (
                    self.router.route(&headers.drain_token, message),
                    message.to_log_line(&headers.drain_token),
                )
            })
            .collect();

        // BTreeSet iterates sorted, so every batch locks in the same order.
        let destinations: BTreeSet<&PathBuf> = lines.iter().map(|(path, _)| path).collect();
        let file_count = destinations.len();
        let mut guards = Vec::with_capacity(file_count);
        for path in destinations {
            guards.push(self.lock_destination(path).await);
        }

        let dir_mode = self.dir_mode;
        let file_mode = self.file_mode;
        // The guards move into the blocking task so the locks outlive a
        // cancelled request until the writes have actually finished.
        let result = tokio::task::spawn_blocking(move || {
            let _guards = guards;
            append_lines(lines, dir_mode, file_mode)
        })
        .await
        .map_err(|e| WriteError::Join(e.to_string()));
        self.prune_locks().await;
        let written = result??;

        debug!(
            "Appended {written} lines to {file_count} files for drain {}",
            headers.drain_token
        );
        Ok(written)
    }
}

/// Appends each line to its destination in the given order, opening every
/// file the first time it is needed. Stops at the first failure, so nothing
/// after the failing line reaches disk.
fn append_lines(
    lines: Vec<(PathBuf, String)>,
    dir_mode: u32,
    file_mode: u32,
) -> Result<usize, WriteError> {
    let mut files: HashMap<PathBuf, File> = HashMap::new();
    let mut written = 0;
    for (path, line) in lines {
        let file = match files.entry(path.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(open_destination(&path, dir_mode, file_mode)?),
        };
        write_line(file, &path, line)?;
        written += 1;
    }
    Ok(written)
}

fn open_destination(path: &Path, dir_mode: u32, file_mode: u32) -> Result<File, WriteError> {
    if let Some(parent) = path.parent() {
        create_dir(parent, dir_mode).map_err(|source| WriteError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    open_append(path, file_mode).map_err(|source| WriteError::Open {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes `line` and its terminator with a single write call. A partial
/// write is an error: the file has no framing that would let a reader skip
/// a torn line.
fn write_line(file: &mut File, path: &Path, line: String) -> Result<(), WriteError> {
    let mut buf = line.into_bytes();
    buf.push(b'\n');
    let n = file.write(&buf).map_err(|source| WriteError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    if n != buf.len() {
        return Err(WriteError::ShortWrite {
            path: path.to_path_buf(),
            written: n,
            expected: buf.len(),
        });
    }
    Ok(())
}

#[cfg_attr(not(unix), allow(unused_variables))]
fn create_dir(path: &Path, mode: u32) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }
    builder.create(path)
}

#[cfg_attr(not(unix), allow(unused_variables))]
fn open_append(path: &Path, mode: u32) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    options.open(path)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::message::tests::test_message;
    use crate::router::RoutingPolicy;

    fn headers(token: &str) -> FrameHeaders {
        FrameHeaders {
            drain_token: token.to_string(),
            ..Default::default()
        }
    }

    fn writer(root: &Path, policy: RoutingPolicy) -> FileLogWriter {
        FileLogWriter::new(Router::new(root, policy), DEFAULT_DIR_MODE, DEFAULT_FILE_MODE)
    }

    fn read_lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_one_file_per_source() {
        let dir = TempDir::new().unwrap();
        let writer = writer(dir.path(), RoutingPolicy::Source);
        let messages = vec![
            test_message("app", "web.1", "first web line"),
            test_message("app", "worker.1", "worker line"),
            test_message("app", "web.1", "second web line"),
        ];

        let written = writer.write_batch(&headers("d.abc"), &messages).await.unwrap();
        assert_eq!(written, 3);

        let drain_dir = dir.path().join("d.abc");
        let mut entries: Vec<_> = fs::read_dir(&drain_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        entries.sort();
        assert_eq!(entries, vec!["host.app.web.1.log", "host.app.worker.1.log"]);

        assert_eq!(
            read_lines(&drain_dir.join("host.app.web.1.log")),
            vec![
                "2012-11-30T06:45:29+00:00 local3.info d.abc host app web.1 first web line",
                "2012-11-30T06:45:29+00:00 local3.info d.abc host app web.1 second web line",
            ]
        );
        assert_eq!(
            read_lines(&drain_dir.join("host.app.worker.1.log")),
            vec!["2012-11-30T06:45:29+00:00 local3.info d.abc host app worker.1 worker line"]
        );
    }

    #[tokio::test]
    async fn test_repeated_writes_append() {
        let dir = TempDir::new().unwrap();
        let writer = writer(dir.path(), RoutingPolicy::Source);
        let messages = vec![test_message("app", "web.1", "hello")];

        writer.write_batch(&headers("d.new"), &messages).await.unwrap();
        writer.write_batch(&headers("d.new"), &messages).await.unwrap();

        let path = dir.path().join("d.new").join("host.app.web.1.log");
        assert_eq!(read_lines(&path).len(), 2);
    }

    #[tokio::test]
    async fn test_empty_batch_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let writer = writer(dir.path(), RoutingPolicy::Source);
        assert_eq!(writer.write_batch(&headers("d.abc"), &[]).await.unwrap(), 0);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_single_file_policy() {
        let dir = TempDir::new().unwrap();
        let writer = writer(dir.path(), RoutingPolicy::Single);
        let messages = vec![
            test_message("app", "web.1", "one"),
            test_message("app", "worker.1", "two"),
        ];
        writer.write_batch(&headers("d.a"), &messages).await.unwrap();
        writer.write_batch(&headers("d.b"), &messages).await.unwrap();

        let lines = read_lines(&dir.path().join("drain.log"));
        assert_eq!(lines.len(), 4);
        assert!(lines[2].contains(" d.b "));
    }

    #[tokio::test]
    async fn test_unwritable_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("not-a-directory");
        fs::write(&root, b"occupied").unwrap();
        let writer = writer(&root, RoutingPolicy::Source);

        let result = writer
            .write_batch(&headers("d.abc"), &[test_message("app", "web.1", "lost")])
            .await;
        assert!(matches!(result, Err(WriteError::CreateDir { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_configured_modes() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let writer = FileLogWriter::new(
            Router::new(dir.path(), RoutingPolicy::Source),
            0o700,
            0o600,
        );
        writer
            .write_batch(&headers("d.abc"), &[test_message("app", "web.1", "secret")])
            .await
            .unwrap();

        let drain_dir = dir.path().join("d.abc");
        let dir_mode = fs::metadata(&drain_dir).unwrap().permissions().mode() & 0o777;
        let file_mode = fs::metadata(drain_dir.join("host.app.web.1.log"))
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        // the process umask can only remove bits
        assert_eq!(dir_mode & !0o700, 0);
        assert_eq!(file_mode & !0o600, 0);
    }

    #[tokio::test]
    async fn test_failure_stops_at_first_unwritable_message() {
        let dir = TempDir::new().unwrap();
        let drain_dir = dir.path().join("d.abc");
        // a directory where the first message's file should go
        fs::create_dir_all(drain_dir.join("host.app.zz.log")).unwrap();
        let writer = writer(dir.path(), RoutingPolicy::Source);
        let messages = vec![
            test_message("app", "zz", "first"),
            test_message("app", "aa", "second"),
        ];

        let result = writer.write_batch(&headers("d.abc"), &messages).await;
        match result {
            Err(WriteError::Open { path, .. }) => {
                assert_eq!(path, drain_dir.join("host.app.zz.log"))
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!drain_dir.join("host.app.aa.log").exists());
    }

    #[tokio::test]
    async fn test_lines_follow_decoded_order_across_files() {
        let dir = TempDir::new().unwrap();
        let writer = writer(dir.path(), RoutingPolicy::Source);
        let messages = vec![
            test_message("app", "zz", "one"),
            test_message("app", "aa", "two"),
            test_message("app", "zz", "three"),
        ];
        assert_eq!(writer.write_batch(&headers("d.abc"), &messages).await.unwrap(), 3);

        let drain_dir = dir.path().join("d.abc");
        let zz = read_lines(&drain_dir.join("host.app.zz.log"));
        assert_eq!(zz.len(), 2);
        assert!(zz[0].ends_with(" one"));
        assert!(zz[1].ends_with(" three"));
        assert_eq!(read_lines(&drain_dir.join("host.app.aa.log")).len(), 1);
    }

    #[tokio::test]
    async fn test_idle_locks_are_pruned() {
        let dir = TempDir::new().unwrap();
        let writer = writer(dir.path(), RoutingPolicy::Source);
        for i in 0..20 {
            let messages = vec![test_message("app", &format!("web.{i}"), "hello")];
            writer.write_batch(&headers("d.abc"), &messages).await.unwrap();
        }
        assert_eq!(writer.tracked_locks().await, 0);

        // also after a failed batch
        let root = dir.path().join("occupied");
        fs::write(&root, b"file").unwrap();
        let failing = self::writer(&root, RoutingPolicy::Source);
        assert!(failing
            .write_batch(&headers("d.abc"), &[test_message("app", "web.1", "lost")])
            .await
            .is_err());
        assert_eq!(failing.tracked_locks().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_batches_do_not_interleave() {
        const BATCHES: usize = 16;
        const LINES_PER_BATCH: usize = 50;

        let dir = TempDir::new().unwrap();
        let writer = Arc::new(writer(dir.path(), RoutingPolicy::Drain));

        let mut handles = Vec::new();
        for batch in 0..BATCHES {
            let writer = Arc::clone(&writer);
            handles.push(tokio::spawn(async move {
                let padding = "x".repeat(4096);
                let messages: Vec<_> = (0..LINES_PER_BATCH)
                    .map(|line| {
                        test_message("app", "web.1", &format!("batch={batch} line={line} {padding}"))
                    })
                    .collect();
                writer.write_batch(&headers("d.shared"), &messages).await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), LINES_PER_BATCH);
        }

        let lines = read_lines(&dir.path().join("d.shared.log"));
        assert_eq!(lines.len(), BATCHES * LINES_PER_BATCH);
        for chunk in lines.chunks(LINES_PER_BATCH) {
            let batch = chunk[0]
                .split_whitespace()
                .find(|field| field.starts_with("batch="))
                .unwrap()
                .to_string();
            for (i, line) in chunk.iter().enumerate() {
                assert!(line.contains(&format!("{batch} line={i} ")), "interleaved line: {line}");
                assert!(line.ends_with(&"x".repeat(4096)));
            }
        }
    }
}
