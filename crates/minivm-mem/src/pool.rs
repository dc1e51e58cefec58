use minivm_core::{MemId, VmOpr};

/// Byte-addressed linear allocator with LIFO checkpoint/restore.
///
/// Allocation ids are the byte offset of the allocation at the time it
/// was made; they are monotonic within a run. Word access is
/// little-endian and may fail when the address falls outside the pool's
/// current checkpoint window.
pub trait MemoryPool {
    /// Extend the pool by `size` bytes and return the pre-extension
    /// offset as the allocation id. `zero` requests zero-filling; both
    /// back-ends zero-fill unconditionally.
    fn allocate(&mut self, size: u32, zero: bool) -> MemId;

    /// Read the 32-bit word at byte offset `addr`.
    fn load_word(&self, addr: MemId) -> Option<VmOpr>;

    /// Write the 32-bit word at byte offset `addr`.
    /// Returns false when the address is out of range.
    fn store_word(&mut self, addr: MemId, value: VmOpr) -> bool;

    /// Push the current high-water mark.
    fn save_state(&mut self);

    /// Pop the mark and drop everything allocated since the matching
    /// save. Saves and restores nest LIFO.
    fn restore_state(&mut self);

    /// Bytes currently allocated.
    fn size(&self) -> u32;
}
