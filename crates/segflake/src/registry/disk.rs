use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde_json::{Value, json};

use crate::{Mutex, Result, mutex::lock};

/// File name used by [`JsonKeyFile::in_dir`].
pub const MACHINE_KEYS_FILE: &str = "machine_keys.json";

/// Stable storage for the machine key list.
///
/// `save` must replace the whole list atomically: a reader never observes a
/// partially written list.
pub trait KeyDisk {
    /// Reads the persisted list. A list that was never saved reads as empty.
    ///
    /// # Errors
    ///
    /// Fails when the storage is unreadable or its content is corrupt.
    fn load(&self) -> Result<Vec<String>>;

    /// Replaces the persisted list with `keys`.
    ///
    /// # Errors
    ///
    /// Fails when the storage cannot be written.
    fn save(&self, keys: &[String]) -> Result<()>;
}

/// A JSON document (`{"keys": [...]}`) on the local filesystem.
///
/// Writes go to a sibling temporary file that is renamed over the target, so
/// a crash mid-write leaves the previous list intact.
#[derive(Debug, Clone)]
pub struct JsonKeyFile {
    path: PathBuf,
}

impl JsonKeyFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<dir>/machine_keys.json`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(MACHINE_KEYS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyDisk for JsonKeyFile {
    fn load(&self) -> Result<Vec<String>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut file: Value = serde_json::from_slice(&bytes)?;
        let keys = file.get_mut("keys").map_or(Value::Null, Value::take);
        Ok(serde_json::from_value(keys)?)
    }

    fn save(&self, keys: &[String]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_vec_pretty(&json!({ "keys": keys }))?;
        let tmp = self.path.with_extension("json.tmp");
        let written = fs::write(&tmp, body).and_then(|()| fs::rename(&tmp, &self.path));
        if written.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        Ok(written?)
    }
}

/// In-process [`KeyDisk`]; the list lives as long as the value.
#[derive(Debug, Default)]
pub struct MemoryKeyDisk {
    keys: Mutex<Vec<String>>,
}

impl MemoryKeyDisk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keys(keys: Vec<String>) -> Self {
        Self {
            keys: Mutex::new(keys),
        }
    }
}

impl KeyDisk for MemoryKeyDisk {
    fn load(&self) -> Result<Vec<String>> {
        Ok(lock(&self.keys)?.clone())
    }

    fn save(&self, keys: &[String]) -> Result<()> {
        *lock(&self.keys)? = keys.to_vec();
        Ok(())
    }
}

impl<D: KeyDisk + ?Sized> KeyDisk for &D {
    fn load(&self) -> Result<Vec<String>> {
        (**self).load()
    }

    fn save(&self, keys: &[String]) -> Result<()> {
        (**self).save(keys)
    }
}
