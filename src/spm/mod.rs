//! Software-managed scratchpad: the word-addressable device model and the
//! two-slab payload manager layered on top of it.

mod device;
mod manager;

pub use device::Scratchpad;
pub use manager::{SpmManager, E_SLOT_SIZE, VSLAB_START, V_SLOT_SIZE};
