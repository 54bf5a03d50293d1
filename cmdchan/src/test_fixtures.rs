//! Deterministic in-memory command channel fakes.
//!
//! Not `#[cfg(test)]`: like the teacher's `mm::test_fixtures`, this is a
//! public fixture module meant to be used as a dev-dependency by other
//! crates' tests (`vnic-device`, `vnic-vqueue`, `vnic-controller`,
//! `vnic-tests`), not only this crate's own.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use vnic_abi::{Error, Result, VhcaId};

use crate::channel::CommandChannel;
use crate::opcode::Opcode;

/// A channel that always succeeds, optionally recording every call it saw
/// and letting a test script override specific opcodes' responses.
pub struct FakeChannel {
    pub calls: Mutex<Vec<(Opcode, Option<VhcaId>)>>,
    responses: Mutex<HashMap<Opcode, Vec<u8>>>,
    failures: Mutex<HashMap<Opcode, Error>>,
    next_object_id: AtomicU32,
}

impl Default for FakeChannel {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            responses: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            next_object_id: AtomicU32::new(1),
        }
    }
}

impl FakeChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a fixed byte response for every call against `opcode`.
    pub fn set_response(&self, opcode: Opcode, bytes: Vec<u8>) {
        self.responses.lock().unwrap().insert(opcode, bytes);
    }

    /// Script a hard failure for every call against `opcode`.
    pub fn fail_opcode(&self, opcode: Opcode, err: Error) {
        self.failures.lock().unwrap().insert(opcode, err);
    }

    pub fn call_count(&self, opcode: Opcode) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(o, _)| *o == opcode)
            .count()
    }

    /// Monotonically increasing id handed out for object creation, so
    /// callers building request bodies have something stable to embed.
    pub fn alloc_object_id(&self) -> u32 {
        self.next_object_id.fetch_add(1, Ordering::SeqCst)
    }

    fn respond(&self, opcode: Opcode, output: &mut [u8]) -> Result<()> {
        if let Some(err) = self.failures.lock().unwrap().get(&opcode) {
            return Err(clone_error(err));
        }
        if let Some(bytes) = self.responses.lock().unwrap().get(&opcode) {
            let n = bytes.len().min(output.len());
            output[..n].copy_from_slice(&bytes[..n]);
        }
        Ok(())
    }
}

fn clone_error(err: &Error) -> Error {
    match err {
        Error::BadArgument(s) => Error::BadArgument(s.clone()),
        Error::NotSupported(s) => Error::NotSupported(s.clone()),
        Error::NoDevice => Error::NoDevice,
        Error::CommandChannelFailure { opcode, syndrome } => Error::CommandChannelFailure {
            opcode: *opcode,
            syndrome: *syndrome,
        },
        Error::OutOfMemory => Error::OutOfMemory,
        Error::Busy => Error::Busy,
        Error::StateMismatch { expected, found } => Error::StateMismatch { expected, found },
        Error::DmaFailure(s) => Error::DmaFailure(s.clone()),
        Error::Truncated { needed, got } => Error::Truncated {
            needed: *needed,
            got: *got,
        },
        Error::Fatal(s) => Error::Fatal(s.clone()),
    }
}

impl CommandChannel for FakeChannel {
    fn general_cmd(&self, opcode: Opcode, _input: &[u8], output: &mut [u8]) -> Result<()> {
        self.calls.lock().unwrap().push((opcode, None));
        self.respond(opcode, output)
    }

    fn raw_tunneled_cmd(
        &self,
        opcode: Opcode,
        tunnel: VhcaId,
        _input: &[u8],
        output: &mut [u8],
    ) -> Result<()> {
        self.calls.lock().unwrap().push((opcode, Some(tunnel)));
        self.respond(opcode, output)
    }
}
