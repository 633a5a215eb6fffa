use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{
        Path,
        PathBuf,
    },
    sync::{
        Arc,
        Mutex,
    },
};

/// Session-scoped key/value storage.
pub trait SessionStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn clear(&mut self) -> Result<()>;
}

/// Lives as long as the process. Clones share the same entries.
#[derive(Clone, Debug, Default)]
pub struct InMemorySessionStore {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().map_err(|_| eyre!("session store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| eyre!("session store lock poisoned"))?;
        entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| eyre!("session store lock poisoned"))?;
        entries.clear();
        Ok(())
    }
}

/// JSON object on disk, so a session can outlive one run of the client.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileSessionStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = read_entries(&path)?;
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.entries)
            .wrap_err("Failed to serialize session entries")?;
        write_atomic(&self.path, &json)
            .wrap_err_with(|| format!("Failed to write session file {}", self.path.display()))
    }
}

/// Replaces `path` with `bytes` through a sibling temp file, so readers never
/// see a half-written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .wrap_err_with(|| format!("Failed to create directory {}", parent.display()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .wrap_err_with(|| format!("Failed to create temp file in {}", parent.display()))?;
    tmp.write_all(bytes)
        .wrap_err("Failed to write temp file")?;
    tmp.as_file()
        .sync_all()
        .wrap_err("Failed to sync temp file")?;
    tmp.persist(path)
        .map_err(|err| eyre!("Failed to replace {}: {}", path.display(), err.error))?;
    Ok(())
}

fn read_entries(path: &Path) -> Result<BTreeMap<String, String>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let data = fs::read(path)
        .wrap_err_with(|| format!("Failed to read session file {}", path.display()))?;
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(BTreeMap::new());
    }
    serde_json::from_slice(&data)
        .wrap_err_with(|| format!("Session file {} is not a JSON object", path.display()))
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_owned(), value.to_owned());
        self.flush()
    }

    fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        self.flush()
    }
}

impl<T: SessionStore + ?Sized> SessionStore for Box<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn clear(&mut self) -> Result<()> {
        (**self).clear()
    }
}

/// File-backed when `path` is given, otherwise process-scoped.
pub fn open_session_store(path: Option<&Path>) -> Result<Box<dyn SessionStore + Send>> {
    Ok(match path {
        Some(path) => Box::new(FileSessionStore::open(path)?),
        None => Box::new(InMemorySessionStore::new()),
    })
}
