//! Wire constants adopted by reference from the public virtio/NVMe specs
//! (spec.md §1 Non-goals: this crate does not redefine those layouts, it
//! only names the bits the control plane needs to branch on).

// =============================================================================
// VirtIO device status bits (device_status BAR field)
// =============================================================================

pub const VIRTIO_STATUS_ACKNOWLEDGE: u8 = 0x01;
pub const VIRTIO_STATUS_DRIVER: u8 = 0x02;
pub const VIRTIO_STATUS_DRIVER_OK: u8 = 0x04;
pub const VIRTIO_STATUS_FEATURES_OK: u8 = 0x08;
/// Canonical "please restart your driver" signal (spec.md §7).
pub const VIRTIO_STATUS_DEVICE_NEEDS_RESET: u8 = 0x40;
pub const VIRTIO_STATUS_FAILED: u8 = 0x80;

// =============================================================================
// VirtIO feature bits
// =============================================================================

pub const VIRTIO_F_VERSION_1: u64 = 1 << 32;

// =============================================================================
// VirtIO queue descriptor flags
// =============================================================================

pub const VIRTQ_DESC_F_NEXT: u16 = 1;
pub const VIRTQ_DESC_F_WRITE: u16 = 2;
pub const VIRTQ_DESC_F_INDIRECT: u16 = 4;

/// "No vector" sentinel for `queue_msix_vector` / `msix_config`.
pub const VIRTIO_MSI_NO_VECTOR: u16 = 0xFFFF;

// =============================================================================
// Section header name fields (migration payload, spec.md §6)
// =============================================================================

pub const SECTION_NAME_CTRL_CFG: &[u8; 12] = b"VIRTIO_CTRL\0";
pub const SECTION_NAME_COMMON_CFG: &[u8; 12] = b"COMMON_PCI_\0";
pub const SECTION_NAME_QUEUES_CFG: &[u8; 12] = b"QUEUES_CFG\0\0";
pub const SECTION_NAME_DEVICE_CFG: &[u8; 12] = b"DEVICE_CFG\0\0";

/// Byte size of a section header: `{u32 length; char name[12]}`.
pub const SECTION_HEADER_LEN: usize = 4 + 12;

// =============================================================================
// Admin virtqueue command classes/commands (spec.md §4.4 "Admin virtqueue",
// §8 scenario 5)
// =============================================================================

/// Live-migration control admin class.
pub const ADMIN_CLASS_MIG_CTRL: u8 = 64;

/// Read back the controller's current live-migration state.
pub const ADMIN_CMD_GET_STATUS: u8 = 1;

pub const ADMIN_STATUS_OK: u8 = 0;
pub const ADMIN_STATUS_ERROR: u8 = 1;
