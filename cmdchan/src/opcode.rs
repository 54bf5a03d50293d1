//! Firmware command opcodes and object types (spec.md §6).
//!
//! The concrete wire encoding of each opcode's request/response body is an
//! opaque dependency per spec.md §1 Non-goals; this module only enumerates
//! the opcodes and object types the control plane must be able to issue.

/// Top-level command opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    QueryHcaCap,
    EnableHca,
    DisableHca,
    InitHca,
    TeardownHca,
    CreateGeneralObject,
    ModifyGeneralObject,
    QueryGeneralObject,
    DestroyGeneralObject,
    HotplugDevice,
    HotunplugDevice,
    QueryEmulatedFunctionsInfo,
    QueryVuid,
    AllowOtherVhcaAccess,
    SetRoceAddress,
    QueryRoceAddress,
}

/// Generic-object type tag carried alongside `CreateGeneralObject` and its
/// siblings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectType {
    NvmeDeviceEmulation,
    NvmeSq,
    NvmeSqBe,
    NvmeCq,
    NvmeNamespace,
    NvmeSqCtrlCounters,
    VirtioNetDeviceEmulation,
    VirtioNetQ,
    VirtioBlkDeviceEmulation,
    VirtioBlkQ,
    VirtioFsDeviceEmulation,
    VirtioFsQ,
    VirtioQCounters,
    VhcaTunnel,
    EmulatedDevEq,
    VrdmaDeviceEmulation,
    Cq,
    Qp,
    Mkey,
    Pd,
    Tir,
    FlowTable,
    FlowGroup,
    Fte,
}

#[cfg(test)]
mod opcode_tests;
