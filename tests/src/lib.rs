//! End-to-end scenario coverage (spec.md §8) across the full
//! cmdchan/dma/device/vqueue/controller stack. The actual test bodies live
//! under `tests/` (standard Cargo integration-test convention) so each
//! scenario gets its own process and a realistic public-API-only view of
//! the stack, the way a driver author outside this workspace would use it.
