//! In-memory filesystem for testing
//!
//! Holds a tree of directories, files and symlinks behind a shared lock so a
//! test can keep a handle while the cleaner owns another. Failures can be
//! injected per operation and path to exercise the conservative branches.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{normalize_path as normalize, DirEntry, Filesystem};

const MAX_SYMLINK_HOPS: usize = 8;

/// Filesystem operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsOp {
    ListDir,
    PathExists,
    IsEmpty,
    RemoveAll,
    Canonicalize,
}

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File { len: u64 },
    Symlink { target: PathBuf },
}

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<PathBuf, Node>,
    faults: HashMap<(FsOp, PathBuf), io::ErrorKind>,
    removed: Vec<PathBuf>,
}

/// In-memory Filesystem implementation
#[derive(Debug, Clone, Default)]
pub struct MemoryFilesystem {
    state: Arc<Mutex<State>>,
}

impl MemoryFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a directory and any missing parents
    pub fn add_dir(&self, path: impl AsRef<Path>) -> &Self {
        self.insert(path.as_ref(), Node::Dir);
        self
    }

    /// Create a file of the given length and any missing parents
    pub fn add_file(&self, path: impl AsRef<Path>, len: u64) -> &Self {
        self.insert(path.as_ref(), Node::File { len });
        self
    }

    /// Create a symlink; relative targets resolve against the link's parent
    pub fn add_symlink(&self, path: impl AsRef<Path>, target: impl Into<PathBuf>) -> &Self {
        self.insert(
            path.as_ref(),
            Node::Symlink {
                target: target.into(),
            },
        );
        self
    }

    /// Make every call of `op` on exactly `path` fail with `kind`
    pub fn fail(&self, op: FsOp, path: impl AsRef<Path>, kind: io::ErrorKind) -> &Self {
        self.lock()
            .faults
            .insert((op, normalize(path.as_ref())), kind);
        self
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    /// Check whether a path exists, without following symlinks
    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.lock().nodes.contains_key(&normalize(path.as_ref()))
    }

    /// Paths passed to successful `remove_all` calls that removed something
    pub fn removed(&self) -> Vec<PathBuf> {
        self.lock().removed.clone()
    }

    /// Every path currently in the tree, sorted
    pub fn paths(&self) -> Vec<PathBuf> {
        self.lock().nodes.keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn insert(&self, path: &Path, node: Node) {
        let path = normalize(path);
        let mut state = self.lock();

        for ancestor in path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            state
                .nodes
                .entry(ancestor.to_path_buf())
                .or_insert(Node::Dir);
        }
        state.nodes.insert(path, node);
    }
}

impl State {
    fn check_fault(&self, op: FsOp, path: &Path) -> io::Result<()> {
        match self.faults.get(&(op, path.to_path_buf())) {
            Some(kind) => Err(io::Error::new(
                *kind,
                format!("injected {:?} failure on {}", op, path.display()),
            )),
            None => Ok(()),
        }
    }

    /// Follow symlinks until a non-link node is reached
    fn resolve(&self, path: &Path) -> io::Result<(PathBuf, &Node)> {
        let mut current = path.to_path_buf();

        for _ in 0..MAX_SYMLINK_HOPS {
            match self.nodes.get(&current) {
                None => return Err(not_found(&current)),
                Some(Node::Symlink { target }) => {
                    current = link_destination(&current, target);
                }
                Some(node) => return Ok((current, node)),
            }
        }

        Err(io::Error::other(format!(
            "too many levels of symbolic links: {}",
            path.display()
        )))
    }

    /// Resolve every component of `path`, following symlinks anywhere in it
    fn canonical(&self, path: &Path) -> io::Result<PathBuf> {
        let mut remaining: Vec<PathBuf> = path
            .components()
            .rev()
            .map(|c| PathBuf::from(c.as_os_str()))
            .collect();
        let mut resolved = PathBuf::new();
        let mut hops = 0;

        while let Some(part) = remaining.pop() {
            if part == Path::new("..") {
                resolved.pop();
                continue;
            }
            if part == Path::new(".") {
                continue;
            }
            resolved.push(&part);

            match self.nodes.get(&resolved) {
                None => return Err(not_found(&resolved)),
                Some(Node::Symlink { target }) => {
                    hops += 1;
                    if hops > MAX_SYMLINK_HOPS {
                        return Err(io::Error::other(format!(
                            "too many levels of symbolic links: {}",
                            path.display()
                        )));
                    }
                    // An absolute target replaces what was resolved so far
                    resolved.pop();
                    remaining.extend(
                        target
                            .components()
                            .rev()
                            .map(|c| PathBuf::from(c.as_os_str())),
                    );
                }
                Some(_) => {}
            }
        }

        Ok(resolved)
    }

    fn children<'a>(&'a self, dir: &'a Path) -> impl Iterator<Item = (&'a PathBuf, &'a Node)> {
        self.nodes
            .iter()
            .filter(move |(path, _)| path.parent() == Some(dir))
    }
}

#[async_trait]
impl Filesystem for MemoryFilesystem {
    async fn list_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let path = normalize(path);
        let state = self.lock();
        state.check_fault(FsOp::ListDir, &path)?;

        let (dir, node) = state.resolve(&path)?;
        if !matches!(node, Node::Dir) {
            return Err(io::Error::other(format!(
                "not a directory: {}",
                path.display()
            )));
        }

        Ok(state
            .children(&dir)
            .filter_map(|(child, node)| {
                child.file_name().map(|name| DirEntry {
                    name: name.to_string_lossy().into_owned(),
                    is_dir: matches!(node, Node::Dir),
                })
            })
            .collect())
    }

    async fn path_exists(&self, path: &Path) -> io::Result<()> {
        let path = normalize(path);
        let state = self.lock();
        state.check_fault(FsOp::PathExists, &path)?;
        state.resolve(&path).map(|_| ())
    }

    async fn is_empty(&self, path: &Path) -> io::Result<bool> {
        let path = normalize(path);
        let state = self.lock();
        state.check_fault(FsOp::IsEmpty, &path)?;

        let (resolved, node) = state.resolve(&path)?;
        match node {
            Node::Dir => Ok(state.children(&resolved).next().is_none()),
            Node::File { len } => Ok(*len == 0),
            Node::Symlink { .. } => Err(not_found(&path)),
        }
    }

    async fn remove_all(&self, path: &Path) -> io::Result<()> {
        let path = normalize(path);
        let mut state = self.lock();
        state.check_fault(FsOp::RemoveAll, &path)?;

        if !state.nodes.contains_key(&path) {
            return Ok(());
        }

        state.nodes.retain(|candidate, _| !candidate.starts_with(&path));
        state.removed.push(path);
        Ok(())
    }

    async fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        let path = normalize(path);
        let state = self.lock();
        state.check_fault(FsOp::Canonicalize, &path)?;
        state.canonical(&path)
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file or directory: {}", path.display()),
    )
}

fn link_destination(link: &Path, target: &Path) -> PathBuf {
    if target.is_absolute() {
        normalize(target)
    } else {
        let parent = link.parent().unwrap_or_else(|| Path::new("/"));
        normalize(&parent.join(target))
    }
}
