//! Deterministic in-memory stand-in for host physical memory and the
//! firmware-mediated RDMA transport, used by `vnic-tests` and by unit tests
//! in the layers above this one.
//!
//! Not `#[cfg(test)]`: like the teacher's `mm::test_fixtures`, this is a
//! public fixture module meant to be used as a dev-dependency by other
//! crates' own tests, not only this crate's.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::completion::DmaStatus;
use crate::keys::RKey;

/// A flat, growable byte space standing in for the emulated function's host
/// physical memory, addressed by absolute `u64` address.
pub struct SimHostMemory {
    bytes: Mutex<Vec<u8>>,
    registered: Mutex<HashSet<u32>>,
}

impl SimHostMemory {
    pub fn new(initial_size: usize) -> Self {
        Self {
            bytes: Mutex::new(vec![0u8; initial_size]),
            registered: Mutex::new(HashSet::new()),
        }
    }

    pub fn register_rkey(&self, rkey: RKey) {
        self.registered.lock().unwrap().insert(rkey.0);
    }

    fn ensure_capacity(bytes: &mut Vec<u8>, end: usize) {
        if bytes.len() < end {
            bytes.resize(end, 0);
        }
    }

    pub fn read_into(&self, addr: u64, rkey: RKey, out: &mut [u8]) -> DmaStatus {
        if !self.registered.lock().unwrap().contains(&rkey.0) {
            return DmaStatus::Error(format!("unregistered rkey {:?}", rkey));
        }
        let mut bytes = self.bytes.lock().unwrap();
        let start = addr as usize;
        let end = start + out.len();
        Self::ensure_capacity(&mut bytes, end);
        out.copy_from_slice(&bytes[start..end]);
        DmaStatus::Success
    }

    pub fn write_from(&self, addr: u64, rkey: RKey, data: &[u8]) -> DmaStatus {
        if !self.registered.lock().unwrap().contains(&rkey.0) {
            return DmaStatus::Error(format!("unregistered rkey {:?}", rkey));
        }
        let mut bytes = self.bytes.lock().unwrap();
        let start = addr as usize;
        let end = start + data.len();
        Self::ensure_capacity(&mut bytes, end);
        bytes[start..end].copy_from_slice(data);
        DmaStatus::Success
    }

    /// Direct poke/peek for test setup/assertions, bypassing rkey checks.
    pub fn poke(&self, addr: u64, data: &[u8]) {
        let mut bytes = self.bytes.lock().unwrap();
        let end = addr as usize + data.len();
        Self::ensure_capacity(&mut bytes, end);
        bytes[addr as usize..end].copy_from_slice(data);
    }

    pub fn peek(&self, addr: u64, len: usize) -> Vec<u8> {
        let mut bytes = self.bytes.lock().unwrap();
        let end = addr as usize + len;
        Self::ensure_capacity(&mut bytes, end);
        bytes[addr as usize..end].to_vec()
    }
}
