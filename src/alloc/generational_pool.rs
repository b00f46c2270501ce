//! A handle-based object pool over reserved virtual memory.
//!
//! The reservation holds two parallel arrays: elements at a fixed stride and
//! one 8-byte link record per slot. Both are committed a growth step at a time
//! as the pool fills, so element addresses never move.
//!
//! Every touched slot is on exactly one of two lists threaded through the
//! records: the free list (singly linked, reused on `allocate`) and the
//! allocated list (doubly linked, in allocation order, walked by iteration).
//! Each free bumps the slot's generation, so a handle kept past its element's
//! lifetime is rejected instead of aliasing the slot's next occupant.

use super::allocator::{AllocError, RawAlloc};
use super::id::{next_generation, pack, ElementId};
use super::page::align_up;
use super::stats::PoolStats;
use crate::config::{ConfigError, FreeListOrder, PoolConfig};
use crate::log::{vm_debug, vm_trace};
use crate::vm::{CommitRegion, Reservation, SystemVm, VirtualMemory, VmError};
use core::alloc::Layout;
use core::fmt;
use core::iter::FusedIterator;
use core::marker::PhantomData;
use core::mem;
use core::ops::{Index, IndexMut};
use core::ptr::{self, NonNull};
use zerocopy::FromZeroes;

/// Why a handle was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleFault {
    /// The handle names slot 0.
    Null,
    /// The slot lies beyond every slot the pool has handed out.
    OutOfBounds,
    /// The slot is free, or the handle lacks the allocated bit.
    NotAllocated,
    /// The slot has been freed (and possibly reused) since the handle was issued.
    StaleGeneration,
}

impl fmt::Display for HandleFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Null => "null handle",
            Self::OutOfBounds => "slot out of bounds",
            Self::NotAllocated => "slot not allocated",
            Self::StaleGeneration => "stale generation",
        })
    }
}

/// A handle failed validation. Double frees and use-after-free show up here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InvalidHandle {
    /// The packed handle as passed in.
    pub raw: u32,
    /// What the check found.
    pub reason: HandleFault,
}

impl fmt::Display for InvalidHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid element id {:#010x}: {}", self.raw, self.reason)
    }
}

impl std::error::Error for InvalidHandle {}

/// Link record stored next to each element.
///
/// `next_word` uses the handle layout: the allocated bit and generation are
/// the slot's own, the low bits are the next slot on whichever list the slot
/// is on. `prev` is only meaningful on the allocated list.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromZeroes)]
struct SlotRecord {
    prev: u32,
    next_word: u32,
}

const RECORD_SIZE: usize = mem::size_of::<SlotRecord>();

/// Decoded view of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Free { generation: u32, next_free: u32 },
    Allocated { generation: u32, next: u32 },
}

impl SlotRecord {
    #[inline]
    fn state<const INDEX_BITS: u32>(self) -> SlotState {
        let word = ElementId::<INDEX_BITS>::from_raw(self.next_word);
        if word.is_allocated_bit() {
            SlotState::Allocated {
                generation: word.generation(),
                next: word.slot(),
            }
        } else {
            SlotState::Free {
                generation: word.generation(),
                next_free: word.slot(),
            }
        }
    }

    #[inline]
    fn new<const INDEX_BITS: u32>(prev: u32, state: SlotState) -> Self {
        let next_word = match state {
            SlotState::Free { generation, next_free } => pack::<INDEX_BITS>(false, generation, next_free),
            SlotState::Allocated { generation, next } => pack::<INDEX_BITS>(true, generation, next),
        };
        Self { prev, next_word }
    }

    #[inline]
    fn with_next<const INDEX_BITS: u32>(self, next: u32) -> Self {
        let mask = ElementId::<INDEX_BITS>::INDEX_MASK;
        Self {
            prev: self.prev,
            next_word: (self.next_word & !mask) | (next & mask),
        }
    }
}

/// Addresses of the two arrays. Slots are 1-based.
#[derive(Debug, Clone, Copy)]
struct SlotTable {
    base: NonNull<u8>,
    records: usize,
    stride: usize,
}

impl SlotTable {
    #[inline]
    fn element<T>(self, slot: u32) -> NonNull<T> {
        debug_assert!(slot != 0);
        // SAFETY: slot is within the reserved element array.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add((slot as usize - 1) * self.stride).cast()) }
    }

    #[inline]
    fn record_ptr(self, slot: u32) -> *mut SlotRecord {
        debug_assert!(slot != 0);
        // SAFETY: slot is within the reserved record array.
        unsafe {
            self.base
                .as_ptr()
                .add(self.records + (slot as usize - 1) * RECORD_SIZE)
                .cast()
        }
    }

    /// # Safety
    /// The record must be committed.
    #[inline]
    unsafe fn load(self, slot: u32) -> SlotRecord {
        self.record_ptr(slot).read()
    }

    /// # Safety
    /// The record must be committed.
    #[inline]
    unsafe fn store(self, slot: u32, record: SlotRecord) {
        self.record_ptr(slot).write(record)
    }
}

/// Element stride: size rounded so every slot stays aligned, one byte for ZSTs
/// so that each slot still has its own address.
const fn stride_of<T>() -> usize {
    let size = mem::size_of::<T>();
    let align = mem::align_of::<T>();
    if size > align {
        size
    } else {
        align
    }
}

/// A pool of `T` addressed by generational [`ElementId`]s.
///
/// `T` must be [`FromZeroes`]: slots come out of freshly committed pages as
/// all-zero bytes and are handed out without construction. The pool never
/// drops its elements; types that own resources need to be cleaned up by the
/// caller before `deallocate`.
///
/// Slots reused from the free list are not cleared. Use
/// [`allocate_zeroed`](Self::allocate_zeroed) or [`insert`](Self::insert)
/// when stale contents matter.
///
/// # Examples
///
/// ```rust
/// use vmpool::GenerationalPool;
///
/// let mut pool: GenerationalPool<u64> = GenerationalPool::new(1024, 64).unwrap();
/// let a = pool.insert(1).unwrap();
/// let b = pool.insert(2).unwrap();
/// pool[a] += 10;
/// assert_eq!(pool[a], 11);
///
/// pool.deallocate(b).unwrap();
/// assert!(!pool.is_valid(b));
/// assert!(pool.get(b).is_err());
///
/// let c = pool.insert(3).unwrap();
/// assert_eq!(c.slot(), b.slot());
/// assert_ne!(c, b);
/// ```
pub struct GenerationalPool<T, const INDEX_BITS: u32 = 20, V: VirtualMemory = SystemVm> {
    reservation: Reservation<V>,
    table: SlotTable,
    elements: CommitRegion,
    records: CommitRegion,
    count: u32,
    cap: u32,
    committed_cap: u32,
    reserved_cap: u32,
    grow_count: u32,
    free_head: u32,
    alloc_head: u32,
    alloc_tail: u32,
    order: FreeListOrder,
    _marker: PhantomData<T>,
}

// The pool exclusively owns its reservation and the elements in it.
unsafe impl<T: Send, const INDEX_BITS: u32, V: VirtualMemory + Send> Send for GenerationalPool<T, INDEX_BITS, V> {}

impl<T: FromZeroes, const INDEX_BITS: u32> GenerationalPool<T, INDEX_BITS, SystemVm> {
    /// Reserves room for `reserved_count` elements, committing `grow_count`
    /// slots at a time.
    pub fn new(reserved_count: u32, grow_count: u32) -> Result<Self, AllocError> {
        Self::with_config(&PoolConfig::new(reserved_count, grow_count))
    }

    /// Creates a pool from a config.
    pub fn with_config(config: &PoolConfig) -> Result<Self, AllocError> {
        Self::with_vm(SystemVm, config)
    }
}

impl<T: FromZeroes, const INDEX_BITS: u32, V: VirtualMemory> GenerationalPool<T, INDEX_BITS, V> {
    /// Creates a pool on a custom virtual memory provider.
    ///
    /// Nothing is committed until the first allocation.
    pub fn with_vm(vm: V, config: &PoolConfig) -> Result<Self, AllocError> {
        let () = ElementId::<INDEX_BITS>::CHECK_BITS;
        config.validate(ElementId::<INDEX_BITS>::INDEX_MAX)?;

        let page_size = vm.page_size()?.page_size;
        if mem::align_of::<T>() > page_size {
            return Err(ConfigError::OverAligned {
                align: mem::align_of::<T>(),
                page_size,
            }
            .into());
        }

        let reserved = config.reserved_count as usize;
        let stride = stride_of::<T>();
        let element_bytes = reserved
            .checked_mul(stride)
            .and_then(|bytes| align_up(bytes, page_size))
            .ok_or(ConfigError::Overflow)?;
        let record_bytes = reserved
            .checked_mul(RECORD_SIZE)
            .and_then(|bytes| align_up(bytes, page_size))
            .ok_or(ConfigError::Overflow)?;
        let total = element_bytes.checked_add(record_bytes).ok_or(ConfigError::Overflow)?;

        let reservation = Reservation::with_vm(vm, total)?;
        let grow = config.grow_count as usize;
        let elements = CommitRegion::new(0, element_bytes, grow.saturating_mul(stride), page_size);
        let records = CommitRegion::new(element_bytes, record_bytes, grow.saturating_mul(RECORD_SIZE), page_size);

        vm_debug!(
            reserved = config.reserved_count,
            grow = config.grow_count,
            stride,
            order = ?config.free_list_order,
            "pool created"
        );

        Ok(Self {
            table: SlotTable {
                base: reservation.base(),
                records: element_bytes,
                stride,
            },
            reservation,
            elements,
            records,
            count: 0,
            cap: 0,
            committed_cap: 0,
            reserved_cap: config.reserved_count,
            grow_count: config.grow_count,
            free_head: 0,
            alloc_head: 0,
            alloc_tail: 0,
            order: config.free_list_order,
            _marker: PhantomData,
        })
    }

    /// Live elements.
    #[inline]
    pub fn len(&self) -> u32 {
        self.count
    }

    /// Whether no element is live.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Slots handed out at least once since the last reset.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.cap
    }

    /// Slots backed by committed memory.
    #[inline]
    pub fn committed_capacity(&self) -> u32 {
        self.committed_cap
    }

    /// Most elements the pool can ever hold.
    #[inline]
    pub fn reserved_capacity(&self) -> u32 {
        self.reserved_cap
    }

    /// The free list policy chosen at construction.
    #[inline]
    pub fn free_list_order(&self) -> FreeListOrder {
        self.order
    }

    /// Address of slot 1. Element `i` (0-based) lives at `base + i * stride`.
    #[inline]
    pub fn base(&self) -> NonNull<T> {
        self.table.base.cast()
    }

    /// Distance in bytes between consecutive elements.
    #[inline]
    pub fn stride(&self) -> usize {
        self.table.stride
    }

    /// Current usage.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            len: self.count,
            capacity: self.cap,
            committed_capacity: self.committed_cap,
            reserved_capacity: self.reserved_cap,
            committed_bytes: self.elements.committed() + self.records.committed(),
            reserved_bytes: self.reservation.len(),
        }
    }

    #[inline]
    fn record(&self, slot: u32) -> SlotRecord {
        debug_assert!(slot != 0 && slot <= self.cap);
        // SAFETY: slots up to cap are committed.
        unsafe { self.table.load(slot) }
    }

    #[inline]
    fn set_record(&mut self, slot: u32, record: SlotRecord) {
        debug_assert!(slot != 0 && slot <= self.committed_cap);
        // SAFETY: slots up to committed_cap are committed.
        unsafe { self.table.store(slot, record) }
    }

    #[inline]
    fn state(&self, slot: u32) -> SlotState {
        self.record(slot).state::<INDEX_BITS>()
    }

    /// Commits another growth step of both arrays.
    fn grow_committed(&mut self) -> Result<(), AllocError> {
        if self.committed_cap >= self.reserved_cap {
            return Err(AllocError::Exhausted {
                requested: self.committed_cap as usize + 1,
                available: self.reserved_cap as usize,
            });
        }
        let target = self.committed_cap.saturating_add(self.grow_count).min(self.reserved_cap);
        let before = self.committed_cap;
        self.commit_slots(target)?;
        vm_trace!(from = before, to = self.committed_cap, "pool grew");
        Ok(())
    }

    /// Commits both arrays up to `slots`. Page rounding may commit more, and
    /// every fully backed slot counts towards the committed capacity.
    fn commit_slots(&mut self, slots: u32) -> Result<(), AllocError> {
        let slots = slots as usize;
        self.elements.ensure(&self.reservation, slots * self.table.stride)?;
        self.records.ensure(&self.reservation, slots * RECORD_SIZE)?;
        let by_elements = self.elements.committed() / self.table.stride;
        let by_records = self.records.committed() / RECORD_SIZE;
        self.committed_cap = by_elements.min(by_records).min(self.reserved_cap as usize) as u32;
        Ok(())
    }

    /// Takes a slot off the free list, or the next never-used slot.
    /// Returns the slot and the generation it carries.
    fn acquire(&mut self) -> Result<(u32, u32), AllocError> {
        if self.free_head != 0 {
            let slot = self.free_head;
            return match self.state(slot) {
                SlotState::Free { generation, next_free } => {
                    self.free_head = next_free;
                    Ok((slot, generation))
                }
                SlotState::Allocated { .. } => unreachable!("allocated slot {slot} on the free list"),
            };
        }
        if self.cap == self.committed_cap {
            self.grow_committed()?;
        }
        self.cap += 1;
        Ok((self.cap, 0))
    }

    /// Appends `slot` to the allocated list.
    fn link_tail(&mut self, slot: u32, generation: u32) {
        let tail = self.alloc_tail;
        self.set_record(slot, SlotRecord::new::<INDEX_BITS>(tail, SlotState::Allocated { generation, next: 0 }));
        if tail == 0 {
            self.alloc_head = slot;
        } else {
            let record = self.record(tail).with_next::<INDEX_BITS>(slot);
            self.set_record(tail, record);
        }
        self.alloc_tail = slot;
        self.count += 1;
    }

    /// Allocates a slot and returns its handle and element.
    ///
    /// A slot that has never been used reads as zero. A recycled slot keeps
    /// whatever its previous occupant left behind.
    ///
    /// # Errors
    /// [`AllocError::Exhausted`] when all reserved slots are live, or
    /// [`AllocError::Vm`] if committing more memory fails. The pool is
    /// unchanged in both cases.
    pub fn allocate(&mut self) -> Result<(ElementId<INDEX_BITS>, &mut T), AllocError> {
        let (id, element) = self.allocate_slot()?;
        // SAFETY: the slot is committed, aligned and now exclusively allocated.
        Ok((id, unsafe { &mut *element.as_ptr() }))
    }

    /// Allocates a slot and clears it to zero.
    pub fn allocate_zeroed(&mut self) -> Result<(ElementId<INDEX_BITS>, &mut T), AllocError> {
        let (id, element) = self.allocate_slot()?;
        // SAFETY: all-zero is a valid T.
        unsafe {
            element.as_ptr().write_bytes(0, 1);
            Ok((id, &mut *element.as_ptr()))
        }
    }

    /// Allocates a slot holding `value`. Whatever the slot held before is
    /// overwritten without being dropped.
    pub fn insert(&mut self, value: T) -> Result<ElementId<INDEX_BITS>, AllocError> {
        let (id, element) = self.allocate_slot()?;
        // SAFETY: element is valid for writes.
        unsafe { element.as_ptr().write(value) };
        Ok(id)
    }

    fn allocate_slot(&mut self) -> Result<(ElementId<INDEX_BITS>, NonNull<T>), AllocError> {
        let (slot, generation) = self.acquire()?;
        self.link_tail(slot, generation);
        Ok((ElementId::new(generation, slot), self.table.element(slot)))
    }

    /// Validates `id` and returns its slot.
    fn check(&self, id: ElementId<INDEX_BITS>) -> Result<u32, InvalidHandle> {
        let fault = |reason| InvalidHandle { raw: id.to_raw(), reason };
        let slot = id.slot();
        if slot == 0 {
            return Err(fault(HandleFault::Null));
        }
        if !id.is_allocated_bit() {
            return Err(fault(HandleFault::NotAllocated));
        }
        if slot > self.cap {
            return Err(fault(HandleFault::OutOfBounds));
        }
        match self.state(slot) {
            SlotState::Allocated { generation, .. } if generation == id.generation() => Ok(slot),
            SlotState::Allocated { .. } => Err(fault(HandleFault::StaleGeneration)),
            SlotState::Free { generation, .. } if generation != id.generation() => {
                Err(fault(HandleFault::StaleGeneration))
            }
            SlotState::Free { .. } => Err(fault(HandleFault::NotAllocated)),
        }
    }

    /// Inserts a freed slot into the free list according to the pool's order.
    /// Returns the slot it should point at.
    fn free_list_insert(&mut self, slot: u32) -> u32 {
        let head = self.free_head;
        if self.order == FreeListOrder::Lifo || head == 0 || slot < head {
            self.free_head = slot;
            return head;
        }
        let mut cur = head;
        loop {
            let SlotState::Free { generation, next_free } = self.state(cur) else {
                unreachable!("allocated slot {cur} on the free list");
            };
            if next_free == 0 || next_free > slot {
                self.set_record(cur, SlotRecord::new::<INDEX_BITS>(0, SlotState::Free { generation, next_free: slot }));
                return next_free;
            }
            cur = next_free;
        }
    }

    /// Frees the element behind `id`.
    ///
    /// The slot's generation is bumped, so `id` and every copy of it stop
    /// validating. The element is not dropped.
    ///
    /// # Errors
    /// [`InvalidHandle`] for a null, foreign, stale or already freed handle.
    /// The pool is left untouched.
    pub fn deallocate(&mut self, id: ElementId<INDEX_BITS>) -> Result<(), InvalidHandle> {
        let slot = self.check(id)?;
        let record = self.record(slot);
        let SlotState::Allocated { generation, next } = record.state::<INDEX_BITS>() else {
            unreachable!("checked handle points at a free slot");
        };

        let prev = record.prev;
        if prev == 0 {
            self.alloc_head = next;
        } else {
            let prev_record = self.record(prev).with_next::<INDEX_BITS>(next);
            self.set_record(prev, prev_record);
        }
        if next == 0 {
            self.alloc_tail = prev;
        } else {
            let mut next_record = self.record(next);
            next_record.prev = prev;
            self.set_record(next, next_record);
        }

        let next_free = self.free_list_insert(slot);
        self.set_record(
            slot,
            SlotRecord::new::<INDEX_BITS>(
                0,
                SlotState::Free {
                    generation: next_generation::<INDEX_BITS>(generation),
                    next_free,
                },
            ),
        );
        self.count -= 1;
        Ok(())
    }

    /// Pointer to the element behind `id`.
    pub fn get_ptr(&self, id: ElementId<INDEX_BITS>) -> Result<NonNull<T>, InvalidHandle> {
        let slot = self.check(id)?;
        Ok(self.table.element(slot))
    }

    /// Shared access to the element behind `id`.
    pub fn get(&self, id: ElementId<INDEX_BITS>) -> Result<&T, InvalidHandle> {
        let ptr = self.get_ptr(id)?;
        // SAFETY: validated, committed and borrowed through &self.
        Ok(unsafe { &*ptr.as_ptr() })
    }

    /// Exclusive access to the element behind `id`.
    pub fn get_mut(&mut self, id: ElementId<INDEX_BITS>) -> Result<&mut T, InvalidHandle> {
        let ptr = self.get_ptr(id)?;
        // SAFETY: validated, committed and borrowed through &mut self.
        Ok(unsafe { &mut *ptr.as_ptr() })
    }

    /// Whether `id` names a live element.
    #[inline]
    pub fn is_valid(&self, id: ElementId<INDEX_BITS>) -> bool {
        self.check(id).is_ok()
    }

    /// 0-based index of the element behind `id`.
    pub fn index_of(&self, id: ElementId<INDEX_BITS>) -> Result<u32, InvalidHandle> {
        self.check(id).map(|slot| slot - 1)
    }

    /// Handle of the live element at 0-based `index`.
    pub fn id_of_index(&self, index: u32) -> Option<ElementId<INDEX_BITS>> {
        let slot = index.checked_add(1)?;
        if slot > self.cap {
            return None;
        }
        match self.state(slot) {
            SlotState::Allocated { generation, .. } => Some(ElementId::new(generation, slot)),
            SlotState::Free { .. } => None,
        }
    }

    /// Whether the element at 0-based `index` is live.
    #[inline]
    pub fn is_allocated(&self, index: u32) -> bool {
        self.id_of_index(index).is_some()
    }

    /// Handle of the live element at `ptr`.
    ///
    /// `None` unless `ptr` is the exact start of a live element of this pool.
    pub fn id_of_ptr(&self, ptr: *const T) -> Option<ElementId<INDEX_BITS>> {
        let offset = (ptr as usize).checked_sub(self.table.base.as_ptr() as usize)?;
        if offset % self.table.stride != 0 {
            return None;
        }
        let index = u32::try_from(offset / self.table.stride).ok()?;
        self.id_of_index(index)
    }

    /// Handle of the live slot at `slot`, which must be allocated.
    #[inline]
    fn handle(&self, slot: u32) -> Option<ElementId<INDEX_BITS>> {
        if slot == 0 {
            return None;
        }
        match self.state(slot) {
            SlotState::Allocated { generation, .. } => Some(ElementId::new(generation, slot)),
            SlotState::Free { .. } => unreachable!("free slot {slot} on the allocated list"),
        }
    }

    /// The element allocated after `id`, or the first one when `id` is `None`.
    ///
    /// Walks allocation order. Freeing elements while walking is allowed as
    /// long as the element `id` names is still live.
    pub fn next(&self, id: Option<ElementId<INDEX_BITS>>) -> Result<Option<ElementId<INDEX_BITS>>, InvalidHandle> {
        let Some(id) = id else {
            return Ok(self.handle(self.alloc_head));
        };
        let slot = self.check(id)?;
        let SlotState::Allocated { next, .. } = self.state(slot) else {
            unreachable!("checked handle points at a free slot");
        };
        Ok(self.handle(next))
    }

    /// The element allocated before `id`, or the last one when `id` is `None`.
    pub fn prev(&self, id: Option<ElementId<INDEX_BITS>>) -> Result<Option<ElementId<INDEX_BITS>>, InvalidHandle> {
        let Some(id) = id else {
            return Ok(self.handle(self.alloc_tail));
        };
        let slot = self.check(id)?;
        Ok(self.handle(self.record(slot).prev))
    }

    /// The handle `id`'s slot had one generation earlier.
    ///
    /// Useful for producing a handle that is guaranteed stale.
    #[inline]
    pub fn decrement_generation(&self, id: ElementId<INDEX_BITS>) -> ElementId<INDEX_BITS> {
        id.prev_generation()
    }

    /// Live elements in allocation order.
    pub fn iter(&self) -> Iter<'_, T, INDEX_BITS> {
        Iter {
            table: self.table,
            front: self.alloc_head,
            back: self.alloc_tail,
            remaining: self.count,
            _marker: PhantomData,
        }
    }

    /// Live elements in allocation order, mutably.
    pub fn iter_mut(&mut self) -> IterMut<'_, T, INDEX_BITS> {
        IterMut {
            table: self.table,
            front: self.alloc_head,
            back: self.alloc_tail,
            remaining: self.count,
            _marker: PhantomData,
        }
    }

    fn clear_state(&mut self) {
        self.count = 0;
        self.cap = 0;
        self.committed_cap = 0;
        self.free_head = 0;
        self.alloc_head = 0;
        self.alloc_tail = 0;
    }

    /// Frees every element and decommits all memory. The reservation is kept.
    ///
    /// Outstanding handles stop validating. Slots handed out afterwards start
    /// again at generation zero and read as zero, so a handle kept across a
    /// reset can match its slot's next occupant.
    pub fn reset(&mut self) -> Result<(), VmError> {
        vm_debug!(len = self.count, capacity = self.cap, "pool reset");
        self.clear_state();
        let elements = self.elements.decommit_all(&self.reservation);
        let records = self.records.decommit_all(&self.reservation);
        elements.and(records)
    }

    /// Releases the reservation, reporting failure instead of logging it.
    pub fn release(self) -> Result<(), VmError> {
        self.reservation.release()
    }
}

impl<T: FromZeroes + Copy, const INDEX_BITS: u32, V: VirtualMemory> GenerationalPool<T, INDEX_BITS, V> {
    /// Resets the pool and fills slots `1..=elements.len()` with copies of
    /// `elements`, all live at generation zero.
    ///
    /// The allocated list is rebuilt in slot order, so iteration and handles
    /// (`id_of_index(i)` for `i < elements.len()`) work straight away. This
    /// differs from a bare bulk copy that leaves the populated slots unlinked
    /// until the next allocate or deallocate; with unlinked slots, iterating
    /// or freeing one of them would corrupt the list.
    ///
    /// # Errors
    /// [`AllocError::Exhausted`] if `elements` does not fit the reservation,
    /// in which case the pool is not touched.
    pub fn reset_and_populate(&mut self, elements: &[T]) -> Result<(), AllocError> {
        let n = match u32::try_from(elements.len()) {
            Ok(n) if n <= self.reserved_cap => n,
            _ => {
                return Err(AllocError::Exhausted {
                    requested: elements.len(),
                    available: self.reserved_cap as usize,
                })
            }
        };
        self.reset()?;
        if n == 0 {
            return Ok(());
        }

        self.commit_slots(n)?;

        // SAFETY: n elements are committed; stride equals size_of::<T>() for
        // every non-zero-sized T, so the array is contiguous.
        unsafe {
            ptr::copy_nonoverlapping(elements.as_ptr(), self.table.element::<T>(1).as_ptr(), elements.len());
        }
        for slot in 1..=n {
            let next = if slot < n { slot + 1 } else { 0 };
            self.set_record(slot, SlotRecord::new::<INDEX_BITS>(slot - 1, SlotState::Allocated { generation: 0, next }));
        }
        self.count = n;
        self.cap = n;
        self.alloc_head = 1;
        self.alloc_tail = n;
        vm_debug!(len = n, "pool populated");
        Ok(())
    }
}

impl<T: FromZeroes, const INDEX_BITS: u32, V: VirtualMemory> Index<ElementId<INDEX_BITS>>
    for GenerationalPool<T, INDEX_BITS, V>
{
    type Output = T;

    /// # Panics
    /// If `id` is not a live handle of this pool.
    fn index(&self, id: ElementId<INDEX_BITS>) -> &T {
        match self.get(id) {
            Ok(element) => element,
            Err(err) => panic!("{err}"),
        }
    }
}

impl<T: FromZeroes, const INDEX_BITS: u32, V: VirtualMemory> IndexMut<ElementId<INDEX_BITS>>
    for GenerationalPool<T, INDEX_BITS, V>
{
    fn index_mut(&mut self, id: ElementId<INDEX_BITS>) -> &mut T {
        match self.get_mut(id) {
            Ok(element) => element,
            Err(err) => panic!("{err}"),
        }
    }
}

unsafe impl<T: FromZeroes, const INDEX_BITS: u32, V: VirtualMemory> RawAlloc for GenerationalPool<T, INDEX_BITS, V> {
    /// Hands out one element slot for any layout that fits a `T`.
    fn allocate(&mut self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.size() > mem::size_of::<T>() || layout.align() > mem::align_of::<T>() {
            return Err(AllocError::InvalidLayout);
        }
        let (_, element) = self.allocate_slot()?;
        Ok(element.cast())
    }

    unsafe fn grow(
        &mut self,
        ptr: NonNull<u8>,
        _old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<u8>, AllocError> {
        if new_layout.size() > mem::size_of::<T>() || new_layout.align() > mem::align_of::<T>() {
            return Err(AllocError::InvalidLayout);
        }
        Ok(ptr)
    }

    unsafe fn shrink(
        &mut self,
        ptr: NonNull<u8>,
        _old_layout: Layout,
        new_layout: Layout,
    ) -> Result<NonNull<u8>, AllocError> {
        if new_layout.align() > mem::align_of::<T>() {
            return Err(AllocError::InvalidLayout);
        }
        Ok(ptr)
    }

    /// # Panics
    /// If `ptr` is not a live element of this pool.
    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, _layout: Layout) {
        let freed = match self.id_of_ptr(ptr.as_ptr().cast::<T>()) {
            Some(id) => Self::deallocate(self, id).is_ok(),
            None => false,
        };
        if !freed {
            panic!("{ptr:p} is not a live element of this pool");
        }
    }

    fn reset(&mut self) -> Result<(), AllocError> {
        Self::reset(self).map_err(AllocError::from)
    }
}

impl<T, const INDEX_BITS: u32, V: VirtualMemory> fmt::Debug for GenerationalPool<T, INDEX_BITS, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationalPool")
            .field("base", &self.table.base)
            .field("len", &self.count)
            .field("capacity", &self.cap)
            .field("committed_capacity", &self.committed_cap)
            .field("reserved_capacity", &self.reserved_cap)
            .field("order", &self.order)
            .finish()
    }
}

/// Iterator over `(ElementId, &T)` in allocation order.
pub struct Iter<'a, T, const INDEX_BITS: u32> {
    table: SlotTable,
    front: u32,
    back: u32,
    remaining: u32,
    _marker: PhantomData<&'a T>,
}

/// Iterator over `(ElementId, &mut T)` in allocation order.
pub struct IterMut<'a, T, const INDEX_BITS: u32> {
    table: SlotTable,
    front: u32,
    back: u32,
    remaining: u32,
    _marker: PhantomData<&'a mut T>,
}

/// Steps one end of an allocated-list walk. Returns the slot, its generation
/// and the neighbour in the walking direction.
///
/// # Safety
/// `slot` must be a committed, allocated slot.
#[inline]
unsafe fn step<const INDEX_BITS: u32>(table: SlotTable, slot: u32, forward: bool) -> (u32, u32) {
    let record = table.load(slot);
    match record.state::<INDEX_BITS>() {
        SlotState::Allocated { generation, next } => (generation, if forward { next } else { record.prev }),
        SlotState::Free { .. } => unreachable!("free slot {slot} on the allocated list"),
    }
}

macro_rules! impl_iter {
    ($name:ident, $lt:lifetime, $item:ty, $deref:ident) => {
        impl<$lt, T, const INDEX_BITS: u32> Iterator for $name<$lt, T, INDEX_BITS> {
            type Item = (ElementId<INDEX_BITS>, $item);

            fn next(&mut self) -> Option<Self::Item> {
                if self.remaining == 0 {
                    return None;
                }
                let slot = self.front;
                // SAFETY: remaining > 0, so front is a live slot.
                let (generation, next) = unsafe { step::<INDEX_BITS>(self.table, slot, true) };
                self.front = next;
                self.remaining -= 1;
                let element = self.table.element::<T>(slot);
                Some((ElementId::new(generation, slot), unsafe { $deref(element) }))
            }

            fn size_hint(&self) -> (usize, Option<usize>) {
                (self.remaining as usize, Some(self.remaining as usize))
            }
        }

        impl<$lt, T, const INDEX_BITS: u32> DoubleEndedIterator for $name<$lt, T, INDEX_BITS> {
            fn next_back(&mut self) -> Option<Self::Item> {
                if self.remaining == 0 {
                    return None;
                }
                let slot = self.back;
                // SAFETY: remaining > 0, so back is a live slot.
                let (generation, prev) = unsafe { step::<INDEX_BITS>(self.table, slot, false) };
                self.back = prev;
                self.remaining -= 1;
                let element = self.table.element::<T>(slot);
                Some((ElementId::new(generation, slot), unsafe { $deref(element) }))
            }
        }

        impl<$lt, T, const INDEX_BITS: u32> ExactSizeIterator for $name<$lt, T, INDEX_BITS> {}
        impl<$lt, T, const INDEX_BITS: u32> FusedIterator for $name<$lt, T, INDEX_BITS> {}
    };
}

#[inline]
unsafe fn shared<'a, T>(ptr: NonNull<T>) -> &'a T {
    &*ptr.as_ptr()
}

#[inline]
unsafe fn exclusive<'a, T>(ptr: NonNull<T>) -> &'a mut T {
    &mut *ptr.as_ptr()
}

impl_iter!(Iter, 'a, &'a T, shared);
impl_iter!(IterMut, 'a, &'a mut T, exclusive);

impl<'a, T: FromZeroes, const INDEX_BITS: u32, V: VirtualMemory> IntoIterator for &'a GenerationalPool<T, INDEX_BITS, V> {
    type Item = (ElementId<INDEX_BITS>, &'a T);
    type IntoIter = Iter<'a, T, INDEX_BITS>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T: FromZeroes, const INDEX_BITS: u32, V: VirtualMemory> IntoIterator
    for &'a mut GenerationalPool<T, INDEX_BITS, V>
{
    type Item = (ElementId<INDEX_BITS>, &'a mut T);
    type IntoIter = IterMut<'a, T, INDEX_BITS>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}
