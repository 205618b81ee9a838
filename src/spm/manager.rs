use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::trace;

use crate::error::{EngineError, Result};
use crate::model::{MemTag, SpmAddr, Word, WORD_BYTES};
use crate::spm::Scratchpad;

const ADDR_VSLAB_END: SpmAddr = 0;
const ADDR_VEMPTY_HEAD: SpmAddr = WORD_BYTES;
const ADDR_ESLAB_END: SpmAddr = 2 * WORD_BYTES;
const ADDR_EEMPTY_HEAD: SpmAddr = 3 * WORD_BYTES;

/// First byte of the vertex slab; the four metadata words live below it.
pub const VSLAB_START: SpmAddr = 4 * WORD_BYTES;

/// A slot is a tag word followed by a payload word.
pub const V_SLOT_SIZE: usize = 2 * WORD_BYTES;
pub const E_SLOT_SIZE: usize = 2 * WORD_BYTES;

/// Tag value marking an empty slot; a free slot's payload word threads the
/// slab's empty list.
const SPM_NULL: Word = 0;

/// Two-slab scratchpad allocator.
///
/// Vertex payloads fill a slab growing upward from [`VSLAB_START`]; edge
/// payloads fill a slab growing downward from the top. `vslab_end` is one past
/// the topmost vertex slot, `eslab_end` is one slot below the bottom-most edge
/// slot. Each slab reuses holes through a free list rooted in its
/// `*empty_head` metadata word, and a full slab may reclaim one hole from the
/// opposite slab by relocating that slab's boundary slot (compaction).
///
/// Lock order, when more than one is held: vslab, eslab, vslot_reloc,
/// eslot_reloc. `load_edata` needs the vertex-slab boundary, which it may not
/// take while holding only `eslab`, so its slow path drops the fast-path lock
/// and reacquires the full set in order.
pub struct SpmManager {
    spm: Scratchpad,
    vslab: Mutex<()>,
    eslab: Mutex<()>,
    vslot_reloc: Mutex<()>,
    eslot_reloc: Mutex<()>,
    failed_loads: AtomicU64,
}

impl SpmManager {
    pub fn new(spm: Scratchpad) -> Result<Self> {
        if spm.size_bytes() < VSLAB_START {
            return Err(EngineError::InvalidArgument(
                "scratchpad too small for slab metadata",
            ));
        }
        spm.write_word(ADDR_VSLAB_END, VSLAB_START as Word)?;
        spm.write_word(ADDR_VEMPTY_HEAD, SPM_NULL)?;
        spm.write_word(ADDR_ESLAB_END, (spm.size_bytes() - E_SLOT_SIZE) as Word)?;
        spm.write_word(ADDR_EEMPTY_HEAD, SPM_NULL)?;
        Ok(Self {
            spm,
            vslab: Mutex::new(()),
            eslab: Mutex::new(()),
            vslot_reloc: Mutex::new(()),
            eslot_reloc: Mutex::new(()),
            failed_loads: AtomicU64::new(0),
        })
    }

    /// Loads a vertex payload into the vertex slab.
    ///
    /// Returns false when the payload is already resident or when no slot can
    /// be found or made; only the latter counts into `num_failed_loads`.
    pub fn load_vdata(&self, tag: MemTag, value: Word) -> Result<bool> {
        let _vslab = self.vslab.lock();
        if self.find_vslot(tag)?.is_some() {
            return Ok(false);
        }
        if let Some(addr) = self.pop_free_slot(ADDR_VEMPTY_HEAD)? {
            self.fill_slot(addr, tag, value)?;
            return Ok(true);
        }
        // growing the slab needs a stable view of the edge-slab boundary
        let _eslab = self.eslab.lock();
        let end = self.vslab_end()?;
        if end + V_SLOT_SIZE <= self.eslab_end()? + E_SLOT_SIZE {
            self.spm.write_word(ADDR_VSLAB_END, (end + V_SLOT_SIZE) as Word)?;
            self.fill_slot(end, tag, value)?;
            return Ok(true);
        }
        let _ereloc = self.eslot_reloc.lock();
        if !self.compact_edge_slab()? {
            self.failed_loads.fetch_add(1, Ordering::Relaxed);
            return Ok(false);
        }
        self.spm.write_word(ADDR_VSLAB_END, (end + V_SLOT_SIZE) as Word)?;
        self.fill_slot(end, tag, value)?;
        Ok(true)
    }

    /// Loads an edge payload into the edge slab. Mirror of [`load_vdata`];
    /// see the type docs for the lock discipline of the slow path.
    ///
    /// [`load_vdata`]: SpmManager::load_vdata
    pub fn load_edata(&self, tag: MemTag, value: Word) -> Result<bool> {
        {
            let _eslab = self.eslab.lock();
            if self.find_eslot(tag)?.is_some() {
                return Ok(false);
            }
            if let Some(addr) = self.pop_free_slot(ADDR_EEMPTY_HEAD)? {
                self.fill_slot(addr, tag, value)?;
                return Ok(true);
            }
        }
        let _vslab = self.vslab.lock();
        let _eslab = self.eslab.lock();
        let _vreloc = self.vslot_reloc.lock();
        let _ereloc = self.eslot_reloc.lock();
        // the slab may have moved while no lock was held
        if self.find_eslot(tag)?.is_some() {
            return Ok(false);
        }
        if let Some(addr) = self.pop_free_slot(ADDR_EEMPTY_HEAD)? {
            self.fill_slot(addr, tag, value)?;
            return Ok(true);
        }
        let end = self.eslab_end()?;
        if end >= self.vslab_end()? + E_SLOT_SIZE {
            self.spm.write_word(ADDR_ESLAB_END, (end - E_SLOT_SIZE) as Word)?;
            self.fill_slot(end, tag, value)?;
            return Ok(true);
        }
        if !self.compact_vertex_slab()? {
            self.failed_loads.fetch_add(1, Ordering::Relaxed);
            return Ok(false);
        }
        self.spm.write_word(ADDR_ESLAB_END, (end - E_SLOT_SIZE) as Word)?;
        self.fill_slot(end, tag, value)?;
        Ok(true)
    }

    /// Evicts a vertex payload, returning the word to write back to main
    /// memory. `Ok(None)` when the payload is not resident.
    pub fn remove_vdata(&self, tag: MemTag) -> Result<Option<Word>> {
        let _vslab = self.vslab.lock();
        let Some(addr) = self.find_vslot(tag)? else {
            return Ok(None);
        };
        let mut payload = [0 as Word];
        self.spm.nbl_store(addr + WORD_BYTES, &mut payload)?;
        if addr + V_SLOT_SIZE == self.vslab_end()? {
            self.spm.write_word(ADDR_VSLAB_END, addr as Word)?;
        } else {
            self.push_free_slot(ADDR_VEMPTY_HEAD, addr)?;
        }
        Ok(Some(payload[0]))
    }

    /// Evicts an edge payload; mirror of [`remove_vdata`].
    ///
    /// [`remove_vdata`]: SpmManager::remove_vdata
    pub fn remove_edata(&self, tag: MemTag) -> Result<Option<Word>> {
        let _eslab = self.eslab.lock();
        let Some(addr) = self.find_eslot(tag)? else {
            return Ok(None);
        };
        let mut payload = [0 as Word];
        self.spm.nbl_store(addr + WORD_BYTES, &mut payload)?;
        if addr == self.eslab_end()? + E_SLOT_SIZE {
            self.spm.write_word(ADDR_ESLAB_END, addr as Word)?;
        } else {
            self.push_free_slot(ADDR_EEMPTY_HEAD, addr)?;
        }
        Ok(Some(payload[0]))
    }

    /// Reads a resident vertex payload; `Ok(None)` when not resident.
    pub fn read_vdata(&self, tag: MemTag) -> Result<Option<Word>> {
        let _vreloc = self.vslot_reloc.lock();
        match self.find_vslot(tag)? {
            Some(addr) => Ok(Some(self.spm.read_word(addr + WORD_BYTES)?)),
            None => Ok(None),
        }
    }

    /// Overwrites a resident vertex payload; false when not resident.
    pub fn write_vdata(&self, tag: MemTag, value: Word) -> Result<bool> {
        let _vreloc = self.vslot_reloc.lock();
        match self.find_vslot(tag)? {
            Some(addr) => {
                self.spm.write_word(addr + WORD_BYTES, value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn read_edata(&self, tag: MemTag) -> Result<Option<Word>> {
        let _ereloc = self.eslot_reloc.lock();
        match self.find_eslot(tag)? {
            Some(addr) => Ok(Some(self.spm.read_word(addr + WORD_BYTES)?)),
            None => Ok(None),
        }
    }

    pub fn write_edata(&self, tag: MemTag, value: Word) -> Result<bool> {
        let _ereloc = self.eslot_reloc.lock();
        match self.find_eslot(tag)? {
            Some(addr) => {
                self.spm.write_word(addr + WORD_BYTES, value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Loads that failed because neither slab could supply a slot.
    pub fn num_failed_loads(&self) -> u64 {
        self.failed_loads.load(Ordering::Relaxed)
    }

    pub fn barrier(&self) {
        self.spm.barrier();
    }

    fn vslab_end(&self) -> Result<SpmAddr> {
        Ok(self.spm.read_word(ADDR_VSLAB_END)? as SpmAddr)
    }

    fn eslab_end(&self) -> Result<SpmAddr> {
        Ok(self.spm.read_word(ADDR_ESLAB_END)? as SpmAddr)
    }

    /// Linear tag scan over the live vertex-slab region, skipping holes.
    fn find_vslot(&self, tag: MemTag) -> Result<Option<SpmAddr>> {
        let end = self.vslab_end()?;
        let mut cur = VSLAB_START;
        while cur < end {
            if self.spm.read_word(cur)? == tag.0 {
                return Ok(Some(cur));
            }
            cur += V_SLOT_SIZE;
        }
        Ok(None)
    }

    /// Linear tag scan over the live edge-slab region, from the top down.
    fn find_eslot(&self, tag: MemTag) -> Result<Option<SpmAddr>> {
        let end = self.eslab_end()?;
        let mut cur = self.spm.size_bytes() - E_SLOT_SIZE;
        while cur > end {
            if self.spm.read_word(cur)? == tag.0 {
                return Ok(Some(cur));
            }
            cur -= E_SLOT_SIZE;
        }
        Ok(None)
    }

    fn fill_slot(&self, addr: SpmAddr, tag: MemTag, value: Word) -> Result<()> {
        self.spm.write_word(addr, tag.0)?;
        self.spm.nbl_load(&[value], addr + WORD_BYTES)?;
        Ok(())
    }

    fn pop_free_slot(&self, head_addr: SpmAddr) -> Result<Option<SpmAddr>> {
        let head = self.spm.read_word(head_addr)?;
        if head == SPM_NULL {
            return Ok(None);
        }
        let next = self.spm.read_word(head as SpmAddr + WORD_BYTES)?;
        self.spm.write_word(head_addr, next)?;
        Ok(Some(head as SpmAddr))
    }

    fn push_free_slot(&self, head_addr: SpmAddr, addr: SpmAddr) -> Result<()> {
        let head = self.spm.read_word(head_addr)?;
        self.spm.write_word(addr, SPM_NULL)?;
        self.spm.write_word(addr + WORD_BYTES, head)?;
        self.spm.write_word(head_addr, addr as Word)?;
        Ok(())
    }

    /// Splices `slot` out of the free list rooted at `head_addr`.
    fn unlink_free_slot(&self, head_addr: SpmAddr, slot: SpmAddr) -> Result<()> {
        let next_of_slot = self.spm.read_word(slot + WORD_BYTES)?;
        let head = self.spm.read_word(head_addr)?;
        if head as SpmAddr == slot {
            self.spm.write_word(head_addr, next_of_slot)?;
            return Ok(());
        }
        let mut cur = head as SpmAddr;
        loop {
            let next = self.spm.read_word(cur + WORD_BYTES)?;
            if next == SPM_NULL {
                return Err(EngineError::Corruption(
                    "empty slot not threaded on its slab's free list",
                ));
            }
            if next as SpmAddr == slot {
                self.spm.write_word(cur + WORD_BYTES, next_of_slot)?;
                return Ok(());
            }
            cur = next as SpmAddr;
        }
    }

    /// Shrinks the edge slab by one slot so the vertex slab can grow.
    ///
    /// The bottom-most edge slot moves into a free hole; when that slot is
    /// itself a hole it is spliced off the free list instead. Caller holds
    /// vslab, eslab and eslot_reloc. Returns false when the edge slab has no
    /// holes.
    fn compact_edge_slab(&self) -> Result<bool> {
        if self.spm.read_word(ADDR_EEMPTY_HEAD)? == SPM_NULL {
            return Ok(false);
        }
        let end = self.eslab_end()?;
        let last = end + E_SLOT_SIZE;
        let last_tag = self.spm.read_word(last)?;
        if last_tag == SPM_NULL {
            self.unlink_free_slot(ADDR_EEMPTY_HEAD, last)?;
        } else {
            let dest = self
                .pop_free_slot(ADDR_EEMPTY_HEAD)?
                .ok_or(EngineError::Corruption("edge free list emptied mid-compaction"))?;
            self.spm.write_word(dest, last_tag)?;
            let payload = self.spm.read_word(last + WORD_BYTES)?;
            self.spm.write_word(dest + WORD_BYTES, payload)?;
        }
        self.spm.write_word(ADDR_ESLAB_END, last as Word)?;
        trace!(freed = last, "edge slab compacted for vertex load");
        Ok(true)
    }

    /// Mirror of [`compact_edge_slab`]: shrinks the vertex slab so the edge
    /// slab can grow. Caller holds the full lock set.
    ///
    /// [`compact_edge_slab`]: SpmManager::compact_edge_slab
    fn compact_vertex_slab(&self) -> Result<bool> {
        if self.spm.read_word(ADDR_VEMPTY_HEAD)? == SPM_NULL {
            return Ok(false);
        }
        let end = self.vslab_end()?;
        let last = end - V_SLOT_SIZE;
        let last_tag = self.spm.read_word(last)?;
        if last_tag == SPM_NULL {
            self.unlink_free_slot(ADDR_VEMPTY_HEAD, last)?;
        } else {
            let dest = self
                .pop_free_slot(ADDR_VEMPTY_HEAD)?
                .ok_or(EngineError::Corruption("vertex free list emptied mid-compaction"))?;
            self.spm.write_word(dest, last_tag)?;
            let payload = self.spm.read_word(last + WORD_BYTES)?;
            self.spm.write_word(dest + WORD_BYTES, payload)?;
        }
        self.spm.write_word(ADDR_VSLAB_END, last as Word)?;
        trace!(freed = last, "vertex slab compacted for edge load");
        Ok(true)
    }
}
