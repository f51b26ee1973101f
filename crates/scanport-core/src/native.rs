// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Native transfer memory.
//
// A data-transferred notification hands over a driver-owned memory region
// addressed by an opaque handle. The region must be locked before its bytes
// are read and unlocked afterwards, exactly once per lock. `LockedRegion`
// ties the unlock to scope exit so no early return can skip it.

use std::ops::Deref;

use crate::error::{Result, ScanportError};

/// Opaque driver handle to a memory region. Zero is the null handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(pub usize);

impl NativeHandle {
    pub const NULL: Self = Self(0);

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

/// Driver-owned memory behind a transfer notification.
///
/// Implementations free the region when dropped.
pub trait TransferMemory: Send {
    fn handle(&self) -> NativeHandle;

    /// Pin the region so `bytes` may be read.
    fn lock(&mut self) -> Result<()>;

    /// The locked bytes; empty while unlocked.
    fn bytes(&self) -> &[u8];

    fn unlock(&mut self);
}

/// Scoped lock over a [`TransferMemory`]; unlocks on drop.
pub struct LockedRegion<'a> {
    memory: &'a mut dyn TransferMemory,
}

impl<'a> LockedRegion<'a> {
    /// Validate the handle and lock the region.
    pub fn acquire(memory: &'a mut dyn TransferMemory) -> Result<Self> {
        if memory.handle().is_null() {
            return Err(ScanportError::Decode("transfer handle is null".into()));
        }
        memory.lock()?;
        Ok(Self { memory })
    }
}

impl Deref for LockedRegion<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.memory.bytes()
    }
}

impl Drop for LockedRegion<'_> {
    fn drop(&mut self) {
        self.memory.unlock();
    }
}

/// Heap-backed region used by simulated drivers and tests.
#[derive(Debug)]
pub struct HeapMemory {
    handle: NativeHandle,
    data: Vec<u8>,
    lock_count: u32,
}

impl HeapMemory {
    pub fn new(handle: NativeHandle, data: Vec<u8>) -> Self {
        Self {
            handle,
            data,
            lock_count: 0,
        }
    }

    /// Outstanding locks; zero once every lock has been released.
    pub fn lock_count(&self) -> u32 {
        self.lock_count
    }
}

impl TransferMemory for HeapMemory {
    fn handle(&self) -> NativeHandle {
        self.handle
    }

    fn lock(&mut self) -> Result<()> {
        self.lock_count += 1;
        Ok(())
    }

    fn bytes(&self) -> &[u8] {
        if self.lock_count > 0 { &self.data } else { &[] }
    }

    fn unlock(&mut self) {
        self.lock_count = self.lock_count.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_region_unlocks_on_drop() {
        let mut memory = HeapMemory::new(NativeHandle(7), vec![1, 2, 3]);
        {
            let region = LockedRegion::acquire(&mut memory).unwrap();
            assert_eq!(&region[..], &[1, 2, 3]);
        }
        assert_eq!(memory.lock_count(), 0);
        assert!(memory.bytes().is_empty());
    }

    #[test]
    fn null_handle_is_rejected_without_locking() {
        let mut memory = HeapMemory::new(NativeHandle::NULL, vec![1]);
        let err = LockedRegion::acquire(&mut memory).err().unwrap();
        assert!(matches!(err, ScanportError::Decode(_)));
        assert_eq!(memory.lock_count(), 0);
    }
}
