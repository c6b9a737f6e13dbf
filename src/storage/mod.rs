pub mod codec;

use crate::error::Result;
use crate::models::Table;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use self::codec::FileFormat;

// ── Store trait ───────────────────────────────────────────────────────────────

/// Keyed object store holding tabular files.
///
/// Keys are `/`-separated. A missing key is `Ok(None)` from [`BlobStore::get`],
/// never an error.
pub trait BlobStore {
    /// Every key starting with `prefix`, sorted.
    fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Describes where an object lives, for log lines.
    fn location(&self, key: &str) -> String {
        key.to_string()
    }

    fn read_table(&self, key: &str) -> Result<Option<Table>> {
        debug!("Reading file {}", self.location(key));
        match self.get(key)? {
            Some(bytes) => codec::decode(&bytes, FileFormat::for_key(key)).map(Some),
            None => Ok(None),
        }
    }

    /// Write `table` under `key`. An empty table is skipped and `false` is
    /// returned; nothing is stored in that case.
    fn write_table(&self, table: &Table, key: &str, format: FileFormat) -> Result<bool> {
        if table.is_empty() {
            info!("Table for {} is empty, nothing written", self.location(key));
            return Ok(false);
        }
        let bytes = codec::encode(table, format)?;
        self.put(key, &bytes)?;
        info!("Wrote {} rows to {}", table.len(), self.location(key));
        Ok(true)
    }
}

// ── Local directory bucket ────────────────────────────────────────────────────

pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|part| !part.is_empty())
            .fold(self.root.clone(), |p, part| p.join(part))
    }

    fn collect_keys(&self, dir: &Path, keys: &mut Vec<String>) -> Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                self.collect_keys(&path, keys)?;
            } else if let Ok(rel) = path.strip_prefix(&self.root) {
                let key = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                keys.push(key);
            }
        }
        Ok(())
    }
}

impl BlobStore for LocalBlobStore {
    fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        // Only walk the directory the prefix points into.
        let start = match prefix.rfind('/') {
            Some(i) => self.path_for(&prefix[..i]),
            None => self.root.clone(),
        };
        if !start.is_dir() {
            return Ok(vec![]);
        }

        let mut keys = Vec::new();
        self.collect_keys(&start, &mut keys)?;
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match std::fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;
        Ok(())
    }

    fn location(&self, key: &str) -> String {
        format!("{}/{}", self.root.display(), key)
    }
}

// ── In-memory bucket ──────────────────────────────────────────────────────────

/// Bucket kept in a map. Used for tests and dry runs.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: RefCell<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.objects.borrow().len()
    }
}

impl BlobStore for MemoryBlobStore {
    fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .objects
            .borrow()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.objects.borrow().get(key).cloned())
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.objects
            .borrow_mut()
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn location(&self, key: &str) -> String {
        format!("memory://{}", key)
    }
}
