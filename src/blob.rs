//! Blob memory management
//!
//! Music data arrives from the controller as plain byte vectors and is copied
//! into memory owned by the tone generator before the generator is told to
//! play it. The generator never owns the lifetime of that memory: the
//! [`BlobManager`] records every region it allocates and releases it, with the
//! size recorded at allocation time, before the slot is rebound.

use crate::{BridgeError, Result};
use std::fmt;
use tracing::{debug, warn};

/// Handle to a region of generator memory
///
/// Carries a generation counter so that a handle to a released region never
/// aliases a later allocation that reuses the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobPtr {
    index: u32,
    generation: u32,
}

impl BlobPtr {
    fn slot(&self) -> usize {
        self.index as usize
    }
}

impl fmt::Display for BlobPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blob#{}@{}", self.index, self.generation)
    }
}

/// Memory contract of a tone generator
///
/// Mirrors the allocation exports of the generator: the bridge allocates a
/// region, copies bytes in through [`GeneratorMemory::region_mut`], and later
/// returns it with the same size it asked for.
pub trait GeneratorMemory {
    /// Allocate `size` bytes
    ///
    /// # Errors
    ///
    /// Returns `EmptyBlob` for a zero size and `AllocationFailed` when the
    /// memory budget cannot hold the region.
    fn allocate(&mut self, size: usize) -> Result<BlobPtr>;

    /// Release a region previously returned by [`GeneratorMemory::allocate`]
    ///
    /// # Errors
    ///
    /// Returns `InvalidRegion` for an unknown or stale handle and
    /// `SizeMismatch` when `size` differs from the allocated size. Nothing is
    /// released in either case.
    fn deallocate(&mut self, ptr: BlobPtr, size: usize) -> Result<()>;

    /// Bytes that can still be allocated
    fn available(&self) -> usize;

    /// First `len` bytes of a live region
    fn region(&self, ptr: BlobPtr, len: usize) -> Option<&[u8]>;

    /// First `len` bytes of a live region, writable
    fn region_mut(&mut self, ptr: BlobPtr, len: usize) -> Option<&mut [u8]>;
}

#[derive(Debug, Default)]
struct Region {
    generation: u32,
    bytes: Option<Box<[u8]>>,
}

/// Default generator memory: boxed regions under a byte budget
#[derive(Debug)]
pub struct BlobArena {
    regions: Vec<Region>,
    free_slots: Vec<usize>,
    used: usize,
    limit: usize,
}

impl BlobArena {
    /// Create an arena that can hold at most `limit` bytes at once
    pub fn new(limit: usize) -> Self {
        BlobArena {
            regions: Vec::new(),
            free_slots: Vec::new(),
            used: 0,
            limit,
        }
    }

    /// Bytes currently allocated
    pub fn used(&self) -> usize {
        self.used
    }

    /// Number of live regions
    pub fn live_allocations(&self) -> usize {
        self.regions.iter().filter(|r| r.bytes.is_some()).count()
    }

    fn live_region(&self, ptr: BlobPtr) -> Option<&[u8]> {
        let region = self.regions.get(ptr.slot())?;
        if region.generation != ptr.generation {
            return None;
        }
        region.bytes.as_deref()
    }
}

impl GeneratorMemory for BlobArena {
    fn allocate(&mut self, size: usize) -> Result<BlobPtr> {
        if size == 0 {
            return Err(BridgeError::EmptyBlob);
        }
        let available = self.available();
        if size > available {
            return Err(BridgeError::AllocationFailed {
                requested: size,
                available,
            });
        }

        let slot = match self.free_slots.pop() {
            Some(slot) => slot,
            None => {
                self.regions.push(Region::default());
                self.regions.len() - 1
            }
        };
        let region = &mut self.regions[slot];
        region.generation = region.generation.wrapping_add(1);
        region.bytes = Some(vec![0u8; size].into_boxed_slice());
        self.used += size;

        Ok(BlobPtr {
            index: slot as u32,
            generation: region.generation,
        })
    }

    fn deallocate(&mut self, ptr: BlobPtr, size: usize) -> Result<()> {
        let region = self
            .regions
            .get_mut(ptr.slot())
            .filter(|r| r.generation == ptr.generation)
            .ok_or(BridgeError::InvalidRegion)?;
        let allocated = region
            .bytes
            .as_ref()
            .map(|b| b.len())
            .ok_or(BridgeError::InvalidRegion)?;
        if allocated != size {
            return Err(BridgeError::SizeMismatch {
                expected: allocated,
                actual: size,
            });
        }

        region.bytes = None;
        self.used -= size;
        self.free_slots.push(ptr.slot());
        Ok(())
    }

    fn available(&self) -> usize {
        self.limit.saturating_sub(self.used)
    }

    fn region(&self, ptr: BlobPtr, len: usize) -> Option<&[u8]> {
        self.live_region(ptr)
            .filter(|bytes| bytes.len() >= len)
            .map(|bytes| &bytes[..len])
    }

    fn region_mut(&mut self, ptr: BlobPtr, len: usize) -> Option<&mut [u8]> {
        let region = self.regions.get_mut(ptr.slot())?;
        if region.generation != ptr.generation {
            return None;
        }
        region
            .bytes
            .as_deref_mut()
            .filter(|bytes| bytes.len() >= len)
            .map(|bytes| &mut bytes[..len])
    }
}

/// Format slot a blob is bound into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobSlot {
    /// Register stream played by the sequence channel
    Sequence,
    /// Sound effect played by the patch-table channel
    PatchTable,
}

impl BlobSlot {
    /// Both slots, in index order
    pub const ALL: [BlobSlot; 2] = [BlobSlot::Sequence, BlobSlot::PatchTable];

    fn index(self) -> usize {
        match self {
            BlobSlot::Sequence => 0,
            BlobSlot::PatchTable => 1,
        }
    }
}

impl fmt::Display for BlobSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobSlot::Sequence => f.write_str("sequence"),
            BlobSlot::PatchTable => f.write_str("patch-table"),
        }
    }
}

/// A live blob: where it lives and how many bytes were allocated for it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobRecord {
    /// Region handle
    pub ptr: BlobPtr,
    /// Allocated size, used verbatim when the region is released
    pub len: usize,
}

/// Per-slot bookkeeping of live blobs
#[derive(Debug, Default)]
pub struct BlobManager {
    slots: [Option<BlobRecord>; 2],
    allocations: usize,
    deallocations: usize,
}

impl BlobManager {
    /// Create a manager with both slots empty
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `bytes` into generator memory and record it as the blob of `slot`
    ///
    /// The previous blob of the slot, if any, is released first using its
    /// recorded size. A request that cannot fit even after that release is
    /// refused before anything is touched, so the previous blob stays bound.
    ///
    /// # Errors
    ///
    /// - `EmptyBlob` if `bytes` is empty (nothing is allocated)
    /// - `AllocationFailed` if generator memory cannot hold the blob
    /// - whatever the memory reports if the previous blob cannot be released;
    ///   the previous blob then stays bound and nothing is allocated
    pub fn bind<M>(&mut self, memory: &mut M, slot: BlobSlot, bytes: &[u8]) -> Result<BlobRecord>
    where
        M: GeneratorMemory + ?Sized,
    {
        if bytes.is_empty() {
            return Err(BridgeError::EmptyBlob);
        }

        let reclaimable = self.slots[slot.index()].map_or(0, |r| r.len);
        let available = memory.available();
        if bytes.len() > available.saturating_add(reclaimable) {
            return Err(BridgeError::AllocationFailed {
                requested: bytes.len(),
                available,
            });
        }

        self.release(memory, slot)?;

        let ptr = memory.allocate(bytes.len())?;
        self.allocations += 1;
        match memory.region_mut(ptr, bytes.len()) {
            Some(region) => region.copy_from_slice(bytes),
            None => {
                // Fresh allocation must be addressable; give it back rather than leak.
                match memory.deallocate(ptr, bytes.len()) {
                    Ok(()) => self.deallocations += 1,
                    Err(err) => warn!(%slot, ptr = %ptr, "failed to release unaddressable blob: {err}"),
                }
                return Err(BridgeError::InvalidRegion);
            }
        }

        let record = BlobRecord {
            ptr,
            len: bytes.len(),
        };
        self.slots[slot.index()] = Some(record);
        debug!(%slot, ptr = %ptr, len = record.len, "bound blob");
        Ok(record)
    }

    /// Release the blob of `slot`, if any
    ///
    /// # Errors
    ///
    /// Passes on the memory's deallocation error. The record is kept, so the
    /// slot still owns exactly the region it owned before.
    pub fn release<M>(&mut self, memory: &mut M, slot: BlobSlot) -> Result<()>
    where
        M: GeneratorMemory + ?Sized,
    {
        let Some(old) = self.slots[slot.index()] else {
            return Ok(());
        };
        match memory.deallocate(old.ptr, old.len) {
            Ok(()) => {
                self.slots[slot.index()] = None;
                self.deallocations += 1;
                Ok(())
            }
            Err(err) => {
                warn!(%slot, ptr = %old.ptr, "failed to release blob: {err}");
                Err(err)
            }
        }
    }

    /// Release every live blob (session teardown)
    pub fn release_all<M>(&mut self, memory: &mut M)
    where
        M: GeneratorMemory + ?Sized,
    {
        for slot in BlobSlot::ALL {
            // Logged by `release`; a region that cannot be freed stays recorded
            let _ = self.release(memory, slot);
        }
    }

    /// Live blob of `slot`
    pub fn record(&self, slot: BlobSlot) -> Option<BlobRecord> {
        self.slots[slot.index()]
    }

    /// Number of slots currently holding a blob
    pub fn live_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Total successful allocations performed
    pub fn allocation_count(&self) -> usize {
        self.allocations
    }

    /// Total successful deallocations performed
    pub fn deallocation_count(&self) -> usize {
        self.deallocations
    }
}
