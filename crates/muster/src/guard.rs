//! Overwrite Guard
//!
//! Restarting a recording at an already-populated block path would
//! silently clobber data. Before any start, the guard asks the storage
//! inspector which devices already have a recording at the active
//! block's path; the operator must explicitly confirm an overwrite.

use crate::registry::{Device, DeviceName};
use crate::sessions::Block;
use std::path::Path;

/// Answers whether a recording already exists for a device at a block
/// path. Filesystem in production, scripted in tests.
pub trait StorageInspector: Send + Sync {
    fn has_recording(&self, block_path: &Path, device: &DeviceName) -> bool;
}

/// Checks for the device's output file under the block directory.
pub struct FsInspector;

impl StorageInspector for FsInspector {
    fn has_recording(&self, block_path: &Path, device: &DeviceName) -> bool {
        block_path.join(format!("{}.avi", device)).exists()
    }
}

/// Devices that would be overwritten by a new start on `block`.
///
/// Empty input yields empty output; order follows the input.
pub fn cameras_with_existing_recording<'a>(
    inspector: &dyn StorageInspector,
    block: &Block,
    devices: impl Iterator<Item = &'a Device>,
) -> Vec<DeviceName> {
    devices
        .filter(|d| inspector.has_recording(&block.path, d.name()))
        .map(|d| d.name().clone())
        .collect()
}
