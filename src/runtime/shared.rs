use anyhow::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex};

use crate::cluster::types::SiteId;
use crate::coherence::types::ValueSlot;

use super::service::Runtime;

/// Typed interior cell behind a `Shared` variable. The coherence engine sees
/// it only through the `ValueSlot` capability, as sized bytes.
pub(crate) struct ValueCell<T> {
    value: Mutex<T>,
}

impl<T> ValueSlot for ValueCell<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn size(&self) -> usize {
        let value = self.value.lock().unwrap();
        bincode::serialized_size(&*value).unwrap_or(0) as usize
    }

    fn snapshot(&self) -> Result<Vec<u8>> {
        let value = self.value.lock().unwrap();
        Ok(bincode::serialize(&*value)?)
    }

    fn restore(&self, bytes: &[u8]) -> Result<()> {
        let new = bincode::deserialize(bytes)?;
        *self.value.lock().unwrap() = new;
        Ok(())
    }
}

/// A typed variable kept coherent across every node in the cluster.
///
/// Reads and writes look local. Underneath, the runtime refreshes stale
/// copies from the owner before a read and migrates ownership to this node
/// before a write, so a completed write is the single valid copy anywhere.
///
/// Declare the variable identically on every node; the site token is the
/// only thing that ties the copies together.
pub struct Shared<T> {
    id: SiteId,
    runtime: Arc<Runtime>,
    cell: Arc<ValueCell<T>>,
}

impl<T> Shared<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub(crate) fn register(runtime: Arc<Runtime>, id: SiteId, initial: T) -> Result<Self> {
        let cell = Arc::new(ValueCell {
            value: Mutex::new(initial),
        });
        runtime.coherence().register(id, cell.clone() as Arc<dyn ValueSlot>)?;
        Ok(Self { id, runtime, cell })
    }

    /// The current value, refreshed from the owner if the local copy is
    /// stale. Reading an already-valid copy touches no network.
    pub async fn read(&self) -> T {
        self.runtime.coherence().before_local_read(self.id).await;
        self.cell.value.lock().unwrap().clone()
    }

    /// Replaces the value. On return this node holds the only valid copy;
    /// every other node will refresh on its next read.
    pub async fn write(&self, value: T) {
        self.runtime.coherence().before_local_write(self.id).await;
        *self.cell.value.lock().unwrap() = value;
        self.runtime.coherence().after_local_write(self.id).await;
    }

    /// Read-modify-write of the local copy under exclusive ownership.
    ///
    /// Ownership migration moves the right to write, not the bytes: the
    /// closure sees the local copy as it is. `read()` first when the update
    /// must build on the latest remote value.
    pub async fn update(&self, f: impl FnOnce(&mut T)) {
        self.runtime.coherence().before_local_write(self.id).await;
        {
            let mut value = self.cell.value.lock().unwrap();
            f(&mut *value);
        }
        self.runtime.coherence().after_local_write(self.id).await;
    }

    /// Publishes the final value to every peer and forgets the variable on
    /// this node. Peers keep reading the published value.
    pub async fn destroy(self) {
        self.runtime.coherence().unregister(self.id).await;
    }

    pub fn id(&self) -> SiteId {
        self.id
    }
}
