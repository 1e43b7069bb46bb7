//! Stable machine ids.
//!
//! Each process claims a slot in an append-only list of opaque keys; the
//! slot index is the numeric machine id fed to a
//! [`SnowflakeComposer`](crate::SnowflakeComposer). Keys survive restarts,
//! so a host keeps the same machine id for as long as its list is kept.

mod disk;
#[cfg(test)]
mod tests;

pub use disk::*;

use std::path::Path;

use rand::Rng;
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{BoxError, Error, Result};

/// One slot of the machine key list.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MachineKey {
    /// Position in the persisted list.
    pub machine_id: u64,
    pub key: String,
}

/// Claims and persists machine keys on a [`KeyDisk`].
///
/// # Example
///
/// ```
/// use segflake::{MachineRegistry, MemoryKeyDisk};
///
/// let registry = MachineRegistry::new(MemoryKeyDisk::new());
/// let keys = registry.get_or_init_machine_keys(2, |_, _| Ok(()))?;
/// assert_eq!(keys[1].machine_id, 1);
///
/// // Later calls return the same keys.
/// let again = registry.get_or_init_machine_keys(2, |_, _| Ok(()))?;
/// assert_eq!(keys, again);
/// # Ok::<(), segflake::Error>(())
/// ```
#[derive(Debug)]
pub struct MachineRegistry<D: KeyDisk = JsonKeyFile> {
    disk: D,
}

impl MachineRegistry {
    /// A registry persisted at `<dir>/machine_keys.json`.
    pub fn open(dir: impl AsRef<Path>) -> Self {
        Self::new(JsonKeyFile::in_dir(dir))
    }
}

impl<D: KeyDisk> MachineRegistry<D> {
    pub const fn new(disk: D) -> Self {
        Self { disk }
    }

    pub const fn disk(&self) -> &D {
        &self.disk
    }

    /// Returns the first `count` machine keys, creating and registering any
    /// that do not exist yet.
    ///
    /// `register` is called once per newly generated key, in machine id
    /// order, before the grown list is persisted. Existing keys are never
    /// re-registered, regenerated or reordered.
    ///
    /// # Errors
    ///
    /// - [`Error::Registration`] when `register` rejects a key; nothing is
    ///   persisted in that case
    /// - [`Error::Io`] or [`Error::Json`] when the list cannot be read or
    ///   written, including a corrupt list
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self, register)))]
    pub fn get_or_init_machine_keys<F>(&self, count: usize, mut register: F) -> Result<Vec<MachineKey>>
    where
        F: FnMut(u64, &str) -> core::result::Result<(), BoxError>,
    {
        let mut keys = self.disk.load()?;
        let existing = keys.len();
        if existing < count {
            let mut rng = rand::rng();
            for machine_id in existing..count {
                let key = format!("{:032x}", rng.random::<u128>());
                let machine_id = machine_id as u64;
                register(machine_id, &key)
                    .map_err(|source| Error::Registration { machine_id, source })?;
                keys.push(key);
            }
            self.disk.save(&keys)?;
            #[cfg(feature = "tracing")]
            tracing::debug!(
                added = count - existing,
                total = keys.len(),
                "registered machine keys"
            );
        }

        Ok(keys
            .into_iter()
            .take(count)
            .enumerate()
            .map(|(machine_id, key)| MachineKey {
                machine_id: machine_id as u64,
                key,
            })
            .collect())
    }
}
