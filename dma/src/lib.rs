//! Memory & DMA layer (spec.md §4.2): buffer allocation, memory keys,
//! completions, and the DMA queue transport built on top of them.

pub mod buffer;
pub mod completion;
pub mod keys;
pub mod mkey;
pub mod queue;
pub mod sim;

pub use buffer::{BufferAllocator, DmaBuffer};
pub use completion::{Completion, DmaStatus};
pub use keys::{LKey, RKey};
pub use mkey::CrossMkey;
pub use queue::{DmaQueue, DmaQueueConfig};
pub use sim::SimHostMemory;
