use std::alloc::Layout;
use std::ptr::NonNull;
use vmpool::{AllocError, GenerationalPool, RawAlloc, SystemAlloc, VirtualArena};

/// A tiny growable buffer that takes its backend by handle.
struct Buf<A: RawAlloc> {
    alloc: A,
    ptr: NonNull<u8>,
    len: usize,
    cap: usize,
}

impl<A: RawAlloc> Buf<A> {
    fn new(mut alloc: A) -> Result<Self, AllocError> {
        let ptr = alloc.allocate(Layout::array::<u8>(8).unwrap())?;
        Ok(Self { alloc, ptr, len: 0, cap: 8 })
    }

    fn push(&mut self, byte: u8) -> Result<(), AllocError> {
        if self.len == self.cap {
            let old = Layout::array::<u8>(self.cap).unwrap();
            let new = Layout::array::<u8>(self.cap * 2).unwrap();
            self.ptr = unsafe { self.alloc.grow(self.ptr, old, new)? };
            self.cap *= 2;
        }
        unsafe { self.ptr.as_ptr().add(self.len).write(byte) };
        self.len += 1;
        Ok(())
    }

    fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    fn free(mut self) {
        unsafe { self.alloc.deallocate(self.ptr, Layout::array::<u8>(self.cap).unwrap()) };
    }
}

fn fill<A: RawAlloc>(alloc: A) -> Vec<u8> {
    let mut buf = Buf::new(alloc).unwrap();
    for i in 0..1000u32 {
        buf.push((i % 256) as u8).unwrap();
    }
    let out = buf.as_slice().to_vec();
    buf.free();
    out
}

#[test]
fn test_same_code_on_every_backend() {
    let expected: Vec<u8> = (0..1000u32).map(|i| (i % 256) as u8).collect();

    assert_eq!(fill(SystemAlloc), expected);

    let mut arena = VirtualArena::new(1 << 20, 4096).unwrap();
    assert_eq!(fill(&mut arena), expected);
    // only the last block was ever grown, so nothing was abandoned
    assert_eq!(arena.used(), 1024);
    RawAlloc::reset(&mut arena).unwrap();
    assert_eq!(arena.used(), 0);
}

#[test]
fn test_pool_as_backend() {
    let mut pool: GenerationalPool<[u64; 4]> = GenerationalPool::new(64, 8).unwrap();
    let layout = Layout::new::<[u64; 4]>();

    let a = RawAlloc::allocate_zeroed(&mut pool, Layout::new::<u64>()).unwrap();
    let b = RawAlloc::allocate(&mut pool, layout).unwrap();
    assert_eq!(pool.len(), 2);
    assert!(pool.id_of_ptr(a.as_ptr().cast::<[u64; 4]>()).is_some());

    // too large or over-aligned requests are refused
    assert!(matches!(
        RawAlloc::allocate(&mut pool, Layout::new::<[u64; 5]>()),
        Err(AllocError::InvalidLayout)
    ));
    assert!(matches!(
        RawAlloc::allocate(&mut pool, Layout::from_size_align(8, 64).unwrap()),
        Err(AllocError::InvalidLayout)
    ));

    unsafe {
        // resizing within one element keeps the pointer
        let grown = RawAlloc::grow(&mut pool, a, Layout::new::<u64>(), layout).unwrap();
        assert_eq!(grown, a);
        assert!(RawAlloc::grow(&mut pool, a, layout, Layout::new::<[u64; 8]>()).is_err());

        RawAlloc::deallocate(&mut pool, b, layout);
    }
    assert_eq!(pool.len(), 1);
    RawAlloc::reset(&mut pool).unwrap();
    assert!(pool.is_empty());
}

#[test]
#[should_panic(expected = "not a live element")]
fn test_pool_backend_double_free_panics() {
    let mut pool: GenerationalPool<u64> = GenerationalPool::new(8, 8).unwrap();
    let layout = Layout::new::<u64>();
    let p = RawAlloc::allocate(&mut pool, layout).unwrap();
    unsafe {
        RawAlloc::deallocate(&mut pool, p, layout);
        RawAlloc::deallocate(&mut pool, p, layout);
    }
}

#[test]
fn test_arena_deallocate_is_noop() {
    let mut arena = VirtualArena::new(1 << 16, 4096).unwrap();
    let layout = Layout::new::<u64>();
    let a = RawAlloc::allocate(&mut arena, layout).unwrap();
    let _b = RawAlloc::allocate(&mut arena, layout).unwrap();
    unsafe { arena.deallocate(a, layout) };
    assert_eq!(arena.used(), 16);
}

#[test]
fn test_error_display() {
    let err = AllocError::Exhausted { requested: 10, available: 4 };
    assert_eq!(err.to_string(), "reservation exhausted: 10 requested, 4 reserved");
    let err: Box<dyn std::error::Error> = Box::new(AllocError::InvalidLayout);
    assert!(err.source().is_none());
}
