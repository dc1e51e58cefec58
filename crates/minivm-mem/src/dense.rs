use minivm_core::{MemId, VmOpr};

use crate::pool::MemoryPool;

/// Memory pool backed by one contiguous byte vector.
///
/// Restoring a checkpoint truncates the vector, so ids beyond the mark
/// become invalid immediately.
#[derive(Debug, Default)]
pub struct DenseMemoryPool {
    bytes: Vec<u8>,
    states: Vec<u32>,
}

impl DenseMemoryPool {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryPool for DenseMemoryPool {
    fn allocate(&mut self, size: u32, _zero: bool) -> MemId {
        let id = self.bytes.len() as MemId;
        self.bytes.resize(self.bytes.len() + size as usize, 0);
        id
    }

    fn load_word(&self, addr: MemId) -> Option<VmOpr> {
        let addr = addr as usize;
        let bytes = self.bytes.get(addr..addr + 4)?;
        Some(VmOpr::from_le_bytes(bytes.try_into().ok()?))
    }

    fn store_word(&mut self, addr: MemId, value: VmOpr) -> bool {
        let addr = addr as usize;
        match self.bytes.get_mut(addr..addr + 4) {
            Some(slot) => {
                slot.copy_from_slice(&value.to_le_bytes());
                true
            }
            None => false,
        }
    }

    fn save_state(&mut self) {
        self.states.push(self.bytes.len() as u32);
    }

    fn restore_state(&mut self) {
        debug_assert!(!self.states.is_empty(), "unbalanced restore");
        if let Some(mark) = self.states.pop() {
            self.bytes.truncate(mark as usize);
        }
    }

    fn size(&self) -> u32 {
        self.bytes.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_returns_offsets() {
        let mut pool = DenseMemoryPool::new();
        assert_eq!(pool.allocate(8, true), 0);
        assert_eq!(pool.allocate(4, true), 8);
        assert_eq!(pool.size(), 12);
    }

    #[test]
    fn words_round_trip() {
        let mut pool = DenseMemoryPool::new();
        let id = pool.allocate(16, true);
        assert!(pool.store_word(id, -7));
        assert!(pool.store_word(id + 4, 0x0102_0304));
        assert_eq!(pool.load_word(id), Some(-7));
        assert_eq!(pool.load_word(id + 4), Some(0x0102_0304));
    }

    #[test]
    fn fresh_memory_is_zeroed() {
        let mut pool = DenseMemoryPool::new();
        let id = pool.allocate(8, true);
        assert_eq!(pool.load_word(id), Some(0));
        assert_eq!(pool.load_word(id + 4), Some(0));
    }

    #[test]
    fn out_of_range_access_fails() {
        let mut pool = DenseMemoryPool::new();
        let id = pool.allocate(4, true);
        assert_eq!(pool.load_word(id + 4), None);
        assert_eq!(pool.load_word(id + 1), None); // word spills past the end
        assert!(!pool.store_word(id + 4, 1));
    }

    #[test]
    fn restore_truncates() {
        let mut pool = DenseMemoryPool::new();
        pool.allocate(4, true);
        pool.save_state();
        let inner = pool.allocate(8, true);
        assert_eq!(pool.size(), 12);
        pool.restore_state();
        assert_eq!(pool.size(), 4);
        assert_eq!(pool.load_word(inner), None);
    }

    #[test]
    fn checkpoints_nest() {
        let mut pool = DenseMemoryPool::new();
        pool.save_state();
        pool.allocate(4, true);
        pool.save_state();
        pool.allocate(4, true);
        pool.restore_state();
        assert_eq!(pool.size(), 4);
        pool.restore_state();
        assert_eq!(pool.size(), 0);
    }
}
