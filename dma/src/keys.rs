//! Memory key newtypes.

/// Local key: authorizes this process's own memory for a DMA op.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct LKey(pub u32);

/// Remote key: authorizes access to a registered remote (host) memory
/// region. Combined with a `vhca_id` this is the "cross" memory key of
/// spec.md §3/§4.2.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RKey(pub u32);
