//! Shared packet store.
//!
//! Inbound PDUs are stored once and then passed around by [`StoreId`].
//! Reading a slot goes through a [`StoreAccessor`], which frees the slot
//! when dropped unless it was detached. Detaching is how ownership moves
//! to a protocol engine: the engine deletes the slot when it is done.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;

/// Opaque handle to a stored PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreId(u64);

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("no packet stored under {0}")]
    UnknownId(StoreId),

    #[error("packet store full ({capacity} slots)")]
    Full { capacity: usize },
}

/// In-memory store of PDU buffers, shared between the distribution layer,
/// the router and the engines.
#[derive(Clone)]
pub struct PacketStore {
    packets: Arc<DashMap<StoreId, Bytes>>,
    next_id: Arc<AtomicU64>,
    /// Reserved slots. Updated before the insert and after the remove, so
    /// it never drops below the map's length.
    occupied: Arc<AtomicUsize>,
    capacity: usize,
}

impl PacketStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            packets: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(0)),
            occupied: Arc::new(AtomicUsize::new(0)),
            capacity,
        }
    }

    /// Store a packet and return its handle.
    pub fn add(&self, data: impl Into<Bytes>) -> Result<StoreId, StoreError> {
        self.occupied
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .map_err(|_| StoreError::Full {
                capacity: self.capacity,
            })?;
        let id = StoreId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.packets.insert(id, data.into());
        Ok(id)
    }

    /// Borrow a stored packet. The slot is freed when the accessor drops
    /// unless [`StoreAccessor::detach`] is called.
    pub fn accessor(&self, id: StoreId) -> Result<StoreAccessor, StoreError> {
        let data = self.get(id).ok_or(StoreError::UnknownId(id))?;
        Ok(StoreAccessor {
            store: self.clone(),
            id,
            data,
            auto_delete: true,
        })
    }

    /// Copy-free read of a stored packet without taking a hold on it.
    pub fn get(&self, id: StoreId) -> Option<Bytes> {
        self.packets.get(&id).map(|entry| entry.value().clone())
    }

    /// Free a slot. Returns false if nothing was stored under `id`.
    pub fn delete(&self, id: StoreId) -> bool {
        let removed = self.packets.remove(&id).is_some();
        if removed {
            self.occupied.fetch_sub(1, Ordering::AcqRel);
        }
        removed
    }

    pub fn contains(&self, id: StoreId) -> bool {
        self.packets.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Scoped hold on one stored packet.
pub struct StoreAccessor {
    store: PacketStore,
    id: StoreId,
    data: Bytes,
    auto_delete: bool,
}

impl StoreAccessor {
    pub fn id(&self) -> StoreId {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Keep the slot alive past this accessor. Whoever holds the returned
    /// handle is responsible for deleting it.
    pub fn detach(mut self) -> StoreId {
        self.auto_delete = false;
        self.id
    }
}

impl Drop for StoreAccessor {
    fn drop(&mut self) {
        if self.auto_delete {
            self.store.delete(self.id);
        }
    }
}

impl fmt::Debug for StoreAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreAccessor")
            .field("id", &self.id)
            .field("len", &self.data.len())
            .field("auto_delete", &self.auto_delete)
            .finish()
    }
}
