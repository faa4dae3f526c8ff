use std::collections::HashMap;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Key-value storage every handler works against.
///
/// The Spin component uses the default Spin key-value store; the native server and the
/// tests use [`MemoryStore`]. Values are JSON documents.
pub trait KvStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()>;
    fn delete(&self, key: &str) -> anyhow::Result<()>;

    /// Replaces the value under `key` with what `f` returns for the current one.
    /// An error from `f` leaves the value untouched.
    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<&[u8]>) -> anyhow::Result<Vec<u8>>,
    ) -> anyhow::Result<()>;

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        match self.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        self.set(key, &serde_json::to_vec(value)?)
    }

    /// Read-modify-write of a JSON value as one step. A missing value starts
    /// from `T::default()`. Returns what `f` returns.
    fn update_json<T, R, F>(&self, key: &str, f: F) -> anyhow::Result<R>
    where
        T: DeserializeOwned + Serialize + Default,
        F: FnOnce(&mut T) -> R,
    {
        let mut f = Some(f);
        let mut out = None;
        self.update(key, &mut |current: Option<&[u8]>| {
            let mut value: T = match current {
                Some(bytes) => serde_json::from_slice(bytes)?,
                None => T::default(),
            };
            let f = f.take().ok_or_else(|| anyhow::anyhow!("update of {} applied twice", key))?;
            out = Some(f(&mut value));
            Ok(serde_json::to_vec(&value)?)
        })?;
        out.ok_or_else(|| anyhow::anyhow!("update of {} not applied", key))
    }
}

impl KvStore for spin_sdk::key_value::Store {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(spin_sdk::key_value::Store::get(self, key)?)
    }

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        Ok(spin_sdk::key_value::Store::set(self, key, value)?)
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        Ok(spin_sdk::key_value::Store::delete(self, key)?)
    }

    // The key-value interface has no compare-and-swap; Spin serves each request from
    // a fresh instance, so this is a plain read then write.
    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<&[u8]>) -> anyhow::Result<Vec<u8>>,
    ) -> anyhow::Result<()> {
        let current = spin_sdk::key_value::Store::get(self, key)?;
        let next = f(current.as_deref())?;
        Ok(spin_sdk::key_value::Store::set(self, key, &next)?)
    }
}

/// Process-local store. Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        entries.remove(key);
        Ok(())
    }

    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<&[u8]>) -> anyhow::Result<Vec<u8>>,
    ) -> anyhow::Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        let next = f(entries.get(key).map(Vec::as_slice))?;
        entries.insert(key.to_string(), next);
        Ok(())
    }
}
