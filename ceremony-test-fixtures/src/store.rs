//! In-memory content-addressed store.
//!
//! File identifiers are blake3 digests over mtime and content; directory
//! identifiers are blake3 digests over the sorted `(name, child id)` pairs.
//! Identical inputs therefore always produce identical identifiers.

use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use bytes::Bytes;
use ceremony_common::CeremonyError;
use ceremony_pipeline::{AddOptions, AddedEntry, ContentStore, Mtime, StoreEntry, StoreFile};

const ID_PREFIX: &str = "mem";

#[derive(Clone, Debug)]
enum Node {
    File(Bytes),
    Dir(BTreeMap<String, String>),
}

enum Pending {
    File(Bytes, Mtime),
    Dir(BTreeMap<String, Pending>),
}

#[derive(Default)]
struct Inner {
    nodes: BTreeMap<String, Node>,
    pins: Vec<(String, String)>,
    offline: bool,
    add_calls: usize,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `files` under a fresh wrapping directory and return its id.
    pub fn insert_tree<P, C>(&self, files: impl IntoIterator<Item = (P, C)>) -> String
    where
        P: Into<String>,
        C: Into<Bytes>,
    {
        let files = files
            .into_iter()
            .map(|(path, content)| StoreFile {
                path: path.into(),
                content: content.into(),
                mtime: Mtime::EPOCH,
            })
            .collect();
        let mut inner = self.lock();
        let entries = add_files(&mut inner, files, true).unwrap_or_default();
        entries.last().map(|entry| entry.cid.clone()).unwrap_or_default()
    }

    /// Pins recorded so far as `(id, name)` pairs, in call order.
    pub fn pins(&self) -> Vec<(String, String)> {
        self.lock().pins.clone()
    }

    /// Number of `add_all` calls served.
    pub fn add_calls(&self) -> usize {
        self.lock().add_calls
    }

    /// While offline every call fails the way an unreachable daemon would.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Paths and contents of every file below the directory `id`, sorted by path.
    pub fn files_under(&self, id: &str) -> Vec<(String, Bytes)> {
        let inner = self.lock();
        let mut out = Vec::new();
        collect_files(&inner, id, "", &mut out);
        out
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn ls(&self, path: &str) -> Result<Vec<StoreEntry>, CeremonyError> {
        let inner = self.lock();
        check_online(&inner, path)?;
        match resolve(&inner, path)? {
            Node::Dir(children) => Ok(children
                .iter()
                .map(|(name, cid)| StoreEntry {
                    name: name.clone(),
                    cid: cid.clone(),
                    size: match inner.nodes.get(cid) {
                        Some(Node::File(content)) => content.len() as u64,
                        _ => 0,
                    },
                })
                .collect()),
            Node::File(_) => Err(fetch_error(path, "not a directory")),
        }
    }

    async fn cat(&self, path: &str) -> Result<Vec<u8>, CeremonyError> {
        let inner = self.lock();
        check_online(&inner, path)?;
        match resolve(&inner, path)? {
            Node::File(content) => Ok(content.to_vec()),
            Node::Dir(_) => Err(fetch_error(path, "this dag node is a directory")),
        }
    }

    async fn add_all(
        &self,
        files: Vec<StoreFile>,
        options: AddOptions,
    ) -> Result<Vec<AddedEntry>, CeremonyError> {
        let mut inner = self.lock();
        if inner.offline {
            return Err(CeremonyError::Publish("store offline".into()));
        }
        inner.add_calls += 1;
        add_files(&mut inner, files, options.wrap_with_directory)
    }

    async fn pin(&self, cid: &str, name: &str) -> Result<(), CeremonyError> {
        let mut inner = self.lock();
        if inner.offline {
            return Err(CeremonyError::Publish("store offline".into()));
        }
        if !inner.nodes.contains_key(cid) {
            return Err(CeremonyError::Publish(format!("cannot pin unknown id {cid}")));
        }
        inner.pins.push((cid.to_string(), name.to_string()));
        Ok(())
    }
}

fn check_online(inner: &Inner, path: &str) -> Result<(), CeremonyError> {
    if inner.offline {
        return Err(fetch_error(path, "store offline"));
    }
    Ok(())
}

fn fetch_error(path: &str, message: &str) -> CeremonyError {
    CeremonyError::Fetch {
        path: path.to_string(),
        message: message.to_string(),
    }
}

fn resolve<'a>(inner: &'a Inner, path: &str) -> Result<&'a Node, CeremonyError> {
    let mut segments = path.trim_matches('/').split('/');
    let root = segments.next().unwrap_or_default();
    let mut node = inner
        .nodes
        .get(root)
        .ok_or_else(|| fetch_error(path, "unknown root"))?;
    for segment in segments {
        let child = match node {
            Node::Dir(children) => children.get(segment),
            Node::File(_) => None,
        };
        node = child
            .and_then(|cid| inner.nodes.get(cid))
            .ok_or_else(|| fetch_error(path, "no link named in directory"))?;
    }
    Ok(node)
}

fn add_files(
    inner: &mut Inner,
    files: Vec<StoreFile>,
    wrap: bool,
) -> Result<Vec<AddedEntry>, CeremonyError> {
    let mut tree = BTreeMap::new();
    for file in files {
        insert_pending(&mut tree, &file.path, Pending::File(file.content, file.mtime))?;
    }

    let mut entries = Vec::new();
    let mut top = BTreeMap::new();
    for (name, pending) in tree {
        let (cid, _) = store_pending(inner, &name, pending, &mut entries);
        top.insert(name, cid);
    }
    if wrap {
        let cid = store_dir(inner, top);
        entries.push(AddedEntry {
            path: String::new(),
            cid,
            size: 0,
        });
    }
    Ok(entries)
}

fn insert_pending(
    tree: &mut BTreeMap<String, Pending>,
    path: &str,
    file: Pending,
) -> Result<(), CeremonyError> {
    match path.split_once('/') {
        None => {
            if tree.insert(path.to_string(), file).is_some() {
                return Err(CeremonyError::Publish(format!("duplicate path {path}")));
            }
            Ok(())
        }
        Some((dir, rest)) => {
            let entry = tree
                .entry(dir.to_string())
                .or_insert_with(|| Pending::Dir(BTreeMap::new()));
            match entry {
                Pending::Dir(children) => insert_pending(children, rest, file),
                Pending::File(..) => Err(CeremonyError::Publish(format!(
                    "{dir} is both a file and a directory"
                ))),
            }
        }
    }
}

fn store_pending(
    inner: &mut Inner,
    path: &str,
    pending: Pending,
    entries: &mut Vec<AddedEntry>,
) -> (String, u64) {
    match pending {
        Pending::File(content, mtime) => {
            let mut hasher = blake3::Hasher::new();
            hasher.update(b"file");
            hasher.update(&mtime.secs.to_le_bytes());
            hasher.update(&mtime.nsecs.to_le_bytes());
            hasher.update(&content);
            let cid = format!("{ID_PREFIX}{}", hasher.finalize().to_hex());
            let size = content.len() as u64;
            inner.nodes.insert(cid.clone(), Node::File(content));
            entries.push(AddedEntry {
                path: path.to_string(),
                cid: cid.clone(),
                size,
            });
            (cid, size)
        }
        Pending::Dir(children) => {
            let mut links = BTreeMap::new();
            for (name, child) in children {
                let (cid, _) = store_pending(inner, &format!("{path}/{name}"), child, entries);
                links.insert(name, cid);
            }
            let cid = store_dir(inner, links);
            entries.push(AddedEntry {
                path: path.to_string(),
                cid: cid.clone(),
                size: 0,
            });
            (cid, 0)
        }
    }
}

fn store_dir(inner: &mut Inner, links: BTreeMap<String, String>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"dir");
    for (name, cid) in &links {
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
        hasher.update(cid.as_bytes());
        hasher.update(&[0]);
    }
    let cid = format!("{ID_PREFIX}{}", hasher.finalize().to_hex());
    inner.nodes.insert(cid.clone(), Node::Dir(links));
    cid
}

fn collect_files(inner: &Inner, cid: &str, prefix: &str, out: &mut Vec<(String, Bytes)>) {
    match inner.nodes.get(cid) {
        Some(Node::File(content)) => out.push((prefix.to_string(), content.clone())),
        Some(Node::Dir(children)) => {
            for (name, child) in children {
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}/{name}")
                };
                collect_files(inner, child, &path, out);
            }
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, content: &'static [u8]) -> StoreFile {
        StoreFile {
            path: path.into(),
            content: Bytes::from_static(content),
            mtime: Mtime::EPOCH,
        }
    }

    const WRAP: AddOptions = AddOptions {
        wrap_with_directory: true,
    };

    #[tokio::test]
    async fn identical_inputs_share_identifiers() {
        let store = MemoryStore::new();
        let first = store
            .add_all(vec![file("a", b"1"), file("b", b"2")], WRAP)
            .await
            .unwrap();
        let second = store
            .add_all(vec![file("b", b"2"), file("a", b"1")], WRAP)
            .await
            .unwrap();
        assert_eq!(first.last().unwrap().cid, second.last().unwrap().cid);
        assert_eq!(first.last().unwrap().path, "");

        let changed = store
            .add_all(vec![file("a", b"1"), file("b", b"3")], WRAP)
            .await
            .unwrap();
        assert_ne!(first.last().unwrap().cid, changed.last().unwrap().cid);
    }

    #[tokio::test]
    async fn mtime_changes_identifier() {
        let store = MemoryStore::new();
        let epoch = store.add_all(vec![file("a", b"1")], WRAP).await.unwrap();
        let mut later = file("a", b"1");
        later.mtime = Mtime { secs: 1, nsecs: 0 };
        let later = store.add_all(vec![later], WRAP).await.unwrap();
        assert_ne!(epoch.last().unwrap().cid, later.last().unwrap().cid);
    }

    #[tokio::test]
    async fn nested_paths_resolve() {
        let store = MemoryStore::new();
        let root = store.insert_tree([("r1cs/1x1.r1cs", "r1cs"), ("zkeys/1x1.zkey", "zkey")]);

        let listing = store.ls(&format!("{root}/r1cs")).await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].name, "1x1.r1cs");
        assert_eq!(listing[0].size, 4);
        assert_eq!(store.cat(&format!("{root}/zkeys/1x1.zkey")).await.unwrap(), b"zkey");

        let err = store.cat(&format!("{root}/zkeys/2x2.zkey")).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(store.cat(&format!("{root}/zkeys")).await.is_err());
    }

    #[tokio::test]
    async fn offline_store_fails_every_call() {
        let store = MemoryStore::new();
        let root = store.insert_tree([("a", "1")]);
        store.set_offline(true);
        assert!(matches!(
            store.ls(&root).await,
            Err(CeremonyError::Fetch { .. })
        ));
        assert!(matches!(
            store.pin(&root, "x").await,
            Err(CeremonyError::Publish(_))
        ));
        store.set_offline(false);
        store.pin(&root, "x").await.unwrap();
        assert_eq!(store.pins(), vec![(root, "x".to_string())]);
    }

    #[tokio::test]
    async fn rejects_duplicate_paths() {
        let store = MemoryStore::new();
        let err = store
            .add_all(vec![file("a", b"1"), file("a", b"2")], WRAP)
            .await
            .unwrap_err();
        assert!(matches!(err, CeremonyError::Publish(_)));
    }
}
