//! Block storage: where serialized workout text is written back.
//!
//! A document holds one or more blocks fenced by "```workout" and "```".
//! A document without fences is a single block spanning the whole text.
//! Commits are full read-modify-write cycles of the document and fail closed
//! when the block moved or carries a different title.

use crate::error::PersistenceError;
use crate::parser::parse_workout;
use crate::{Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const FENCE_OPEN: &str = "```workout";
const FENCE_CLOSE: &str = "```";

/// Position of one block body inside a document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockContext {
    /// Ordinal among the document's blocks
    pub index: usize,
    /// First body line
    pub start: usize,
    /// One past the last body line
    pub end: usize,
}

/// Persistence collaborator for workout blocks
pub trait BlockStore {
    /// Fresh position context for a block. Fetch right before each commit.
    fn context(&self, block_index: usize) -> Result<Option<BlockContext>>;

    /// Current text of a block.
    fn read_block(&self, block_index: usize) -> Result<Option<String>>;

    /// Replace the block at `ctx` with `text`.
    fn commit(&mut self, ctx: &BlockContext, text: &str, expected_title: Option<&str>)
        -> Result<()>;
}

// ============================================================================
// Document Helpers
// ============================================================================

/// Locate every block in a document.
pub fn find_blocks(document: &str) -> Vec<BlockContext> {
    let lines: Vec<&str> = document.lines().collect();
    let mut blocks = Vec::new();
    let mut open: Option<usize> = None;

    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        match open {
            None if trimmed == FENCE_OPEN => open = Some(i),
            Some(start) if trimmed == FENCE_CLOSE => {
                blocks.push(BlockContext {
                    index: blocks.len(),
                    start: start + 1,
                    end: i,
                });
                open = None;
            }
            _ => {}
        }
    }

    if blocks.is_empty() && !lines.iter().any(|l| l.trim() == FENCE_OPEN) {
        blocks.push(BlockContext {
            index: 0,
            start: 0,
            end: lines.len(),
        });
    }
    blocks
}

pub fn block_text(document: &str, ctx: &BlockContext) -> String {
    document
        .lines()
        .skip(ctx.start)
        .take(ctx.end.saturating_sub(ctx.start))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replace a block body, checking position and title first.
pub fn splice_block(
    document: &str,
    ctx: &BlockContext,
    text: &str,
    expected_title: Option<&str>,
) -> std::result::Result<String, PersistenceError> {
    let current = find_blocks(document)
        .into_iter()
        .nth(ctx.index)
        .ok_or(PersistenceError::StaleContext)?;
    if &current != ctx {
        return Err(PersistenceError::StaleContext);
    }

    if let Some(expected) = expected_title {
        let found = parse_workout(&block_text(document, ctx)).metadata.title;
        if found != expected {
            return Err(PersistenceError::TitleMismatch {
                expected: expected.to_string(),
                found,
            });
        }
    }

    let lines: Vec<&str> = document.lines().collect();
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    out.extend_from_slice(&lines[..ctx.start]);
    out.extend(text.lines());
    out.extend_from_slice(&lines[ctx.end..]);

    let mut spliced = out.join("\n");
    if document.ends_with('\n') {
        spliced.push('\n');
    }
    Ok(spliced)
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// Document held in memory
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    document: String,
}

impl MemoryStore {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
        }
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    /// Overwrite the document, e.g. to simulate an external edit.
    pub fn replace_document(&mut self, document: impl Into<String>) {
        self.document = document.into();
    }
}

impl BlockStore for MemoryStore {
    fn context(&self, block_index: usize) -> Result<Option<BlockContext>> {
        Ok(find_blocks(&self.document).into_iter().nth(block_index))
    }

    fn read_block(&self, block_index: usize) -> Result<Option<String>> {
        Ok(self
            .context(block_index)?
            .map(|ctx| block_text(&self.document, &ctx)))
    }

    fn commit(
        &mut self,
        ctx: &BlockContext,
        text: &str,
        expected_title: Option<&str>,
    ) -> Result<()> {
        self.document = splice_block(&self.document, ctx, text, expected_title)?;
        Ok(())
    }
}

// ============================================================================
// File Store
// ============================================================================

/// Document stored in a file, rewritten atomically under an exclusive lock.
///
/// Locks are taken on a sidecar `<file>.lock`. The document itself is
/// replaced by rename on every commit.
#[derive(Clone, Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the sidecar file that serializes access to the document.
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn open_lock(&self) -> Result<File> {
        if !self.path.exists() {
            return Err(PersistenceError::MissingFile(self.path.clone()).into());
        }
        Ok(OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())?)
    }

    /// Read the whole document with a shared lock.
    pub fn read_document(&self) -> Result<String> {
        let lock = self.open_lock()?;
        lock.lock_shared()?;
        let read = std::fs::read_to_string(&self.path);
        lock.unlock()?;
        Ok(read?)
    }

    pub fn block_count(&self) -> Result<usize> {
        Ok(find_blocks(&self.read_document()?).len())
    }
}

impl BlockStore for FileStore {
    fn context(&self, block_index: usize) -> Result<Option<BlockContext>> {
        Ok(find_blocks(&self.read_document()?)
            .into_iter()
            .nth(block_index))
    }

    fn read_block(&self, block_index: usize) -> Result<Option<String>> {
        let document = self.read_document()?;
        Ok(find_blocks(&document)
            .into_iter()
            .nth(block_index)
            .map(|ctx| block_text(&document, &ctx)))
    }

    fn commit(
        &mut self,
        ctx: &BlockContext,
        text: &str,
        expected_title: Option<&str>,
    ) -> Result<()> {
        // Hold the lock across read, splice and replace so writers never interleave.
        let lock = self.open_lock()?;
        lock.lock_exclusive()?;

        let result = (|| -> Result<()> {
            let document = std::fs::read_to_string(&self.path)?;
            let spliced = splice_block(&document, ctx, text, expected_title)?;

            let parent = self
                .path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let temp = NamedTempFile::new_in(parent)?;
            {
                let mut writer = std::io::BufWriter::new(temp.as_file());
                writer.write_all(spliced.as_bytes())?;
                writer.flush()?;
            }
            temp.as_file().sync_all()?;
            temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
            Ok(())
        })();

        lock.unlock()?;
        result?;

        tracing::debug!("Committed block {} to {:?}", ctx.index, self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "# Notes\n\n```workout\ntitle: Push\nstate: planned\n---\n- [ ] Bench | Reps: [8]\n```\n\ntext\n\n```workout\ntitle: Pull\nstate: planned\n---\n- [ ] Row | Reps: [10]\n```\n";

    #[test]
    fn test_find_fenced_blocks() {
        let blocks = find_blocks(DOC);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], BlockContext { index: 0, start: 3, end: 7 });
        assert_eq!(blocks[1], BlockContext { index: 1, start: 12, end: 16 });
        assert!(block_text(DOC, &blocks[1]).starts_with("title: Pull"));
    }

    #[test]
    fn test_unfenced_document_is_one_block() {
        let blocks = find_blocks("title: A\n---\n- [ ] Row");
        assert_eq!(blocks, vec![BlockContext { index: 0, start: 0, end: 3 }]);
    }

    #[test]
    fn test_splice_replaces_only_target_block() {
        let ctx = find_blocks(DOC)[0].clone();
        let spliced = splice_block(
            DOC,
            &ctx,
            "title: Push\nstate: started\nstartDate: [2024-03-01 18:05]\n---\n- [\\] Bench | Reps: [8]",
            Some("Push"),
        )
        .unwrap();

        assert!(spliced.contains("startDate: [2024-03-01 18:05]"));
        assert!(spliced.contains("title: Pull"));
        assert!(spliced.ends_with("```\n"));
        // The second block moved down by one line.
        assert_eq!(find_blocks(&spliced)[1].start, 13);
    }

    #[test]
    fn test_splice_fails_closed() {
        let ctx = find_blocks(DOC)[0].clone();
        assert!(matches!(
            splice_block(DOC, &ctx, "title: X", Some("Pull")),
            Err(PersistenceError::TitleMismatch { .. })
        ));

        let stale = BlockContext { index: 1, start: 11, end: 16 };
        assert_eq!(
            splice_block(DOC, &stale, "title: X", None),
            Err(PersistenceError::StaleContext)
        );

        let missing = BlockContext { index: 5, start: 0, end: 1 };
        assert_eq!(
            splice_block(DOC, &missing, "title: X", None),
            Err(PersistenceError::StaleContext)
        );
    }

    #[test]
    fn test_memory_store_commit() {
        let mut store = MemoryStore::new(DOC);
        let ctx = store.context(1).unwrap().unwrap();
        store
            .commit(&ctx, "title: Pull\nstate: started\n---\n- [\\] Row | Reps: [10]", Some("Pull"))
            .unwrap();
        assert!(store.read_block(1).unwrap().unwrap().contains("state: started"));
        assert!(store.read_block(0).unwrap().unwrap().contains("state: planned"));
    }

    #[test]
    fn test_file_store_commit_is_atomic() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("plan.md");
        std::fs::write(&path, DOC).unwrap();

        let mut store = FileStore::new(&path);
        assert_eq!(store.block_count().unwrap(), 2);

        let ctx = store.context(0).unwrap().unwrap();
        store
            .commit(&ctx, "title: Push\nstate: started\n---\n- [\\] Bench | Reps: [8]", Some("Push"))
            .unwrap();

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert!(on_disk.contains("- [\\] Bench"));

        let extras: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "plan.md" && e.file_name() != "plan.md.lock")
            .collect();
        assert!(extras.is_empty(), "stray files: {:?}", extras);
    }

    #[test]
    fn test_file_store_waiting_writer_sees_previous_commit() {
        use std::sync::mpsc;
        use std::time::Duration;

        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("plan.md");
        std::fs::write(&path, DOC).unwrap();

        let store = FileStore::new(&path);
        let ctx = store.context(1).unwrap().unwrap();

        // First writer holds the lock.
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(store.lock_path())
            .unwrap();
        lock.lock_exclusive().unwrap();

        let (tx, rx) = mpsc::channel();
        let mut second = store.clone();
        let handle = std::thread::spawn(move || {
            tx.send(()).unwrap();
            second.commit(
                &ctx,
                "title: Pull\nstate: started\n---\n- [\\] Row | Reps: [10]",
                Some("Pull"),
            )
        });
        rx.recv().unwrap();
        std::thread::sleep(Duration::from_millis(100));

        // First writer replaces the document by rename, then releases.
        let first = DOC.replacen("state: planned", "state: started", 1);
        let temp = NamedTempFile::new_in(temp_dir.path()).unwrap();
        std::fs::write(temp.path(), &first).unwrap();
        temp.persist(&path).unwrap();
        lock.unlock().unwrap();

        handle.join().unwrap().unwrap();

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert!(on_disk.contains("title: Push\nstate: started"), "first commit lost");
        assert!(on_disk.contains("title: Pull\nstate: started"), "second commit lost");
    }

    #[test]
    fn test_concurrent_commits_to_different_blocks() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("plan.md");
        let doc: String = (0..8)
            .map(|i| format!("```workout\ntitle: W{i}\nstate: planned\n---\n- [ ] Row | Reps: [10]\n```\n"))
            .collect();
        std::fs::write(&path, doc).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let mut store = FileStore::new(&path);
                std::thread::spawn(move || {
                    let text = format!(
                        "title: W{i}\nstate: started\nstartDate: [2024-03-01 18:05]\n---\n- [\\] Row | Reps: [10]"
                    );
                    // Earlier blocks grow, so a context can go stale between fetch and commit.
                    loop {
                        let ctx = store.context(i).unwrap().unwrap();
                        match store.commit(&ctx, &text, Some(&format!("W{i}"))) {
                            Ok(()) => break,
                            Err(Error::Persistence(PersistenceError::StaleContext)) => continue,
                            Err(e) => panic!("commit failed: {}", e),
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let store = FileStore::new(&path);
        for i in 0..8 {
            let block = store.read_block(i).unwrap().unwrap();
            assert!(block.contains("state: started"), "block {} lost its commit", i);
        }
    }

    #[test]
    fn test_file_store_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(temp_dir.path().join("gone.md"));
        assert!(matches!(
            store.context(0),
            Err(Error::Persistence(PersistenceError::MissingFile(_)))
        ));
    }
}
