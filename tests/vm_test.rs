use std::cell::Cell;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::ptr::NonNull;
use std::rc::Rc;

use vmpool::{
    AllocError, ArenaConfig, GenerationalPool, MappedFile, PageSize, PoolConfig, Protection, Reservation, SystemVm,
    VirtualArena, VirtualMemory, VmError,
};

/// Forwards to the system but refuses to commit past a byte budget.
#[derive(Clone)]
struct BudgetVm {
    budget: Rc<Cell<usize>>,
    commits: Rc<Cell<usize>>,
}

impl BudgetVm {
    fn new(budget: usize) -> Self {
        Self {
            budget: Rc::new(Cell::new(budget)),
            commits: Rc::new(Cell::new(0)),
        }
    }
}

unsafe impl VirtualMemory for BudgetVm {
    fn page_size(&self) -> Result<PageSize, VmError> {
        SystemVm.page_size()
    }

    unsafe fn reserve(&self, hint: *mut u8, size: usize) -> Result<NonNull<u8>, VmError> {
        SystemVm.reserve(hint, size)
    }

    unsafe fn commit(&self, addr: NonNull<u8>, size: usize, prot: Protection) -> Result<(), VmError> {
        let left = self.budget.get();
        if size > left {
            return Err(VmError::Commit {
                size,
                source: io::Error::from(io::ErrorKind::OutOfMemory),
            });
        }
        SystemVm.commit(addr, size, prot)?;
        self.budget.set(left - size);
        self.commits.set(self.commits.get() + 1);
        Ok(())
    }

    unsafe fn protect(&self, addr: NonNull<u8>, size: usize, prot: Protection) -> Result<(), VmError> {
        SystemVm.protect(addr, size, prot)
    }

    unsafe fn decommit(&self, addr: NonNull<u8>, size: usize) -> Result<(), VmError> {
        SystemVm.decommit(addr, size)?;
        self.budget.set(self.budget.get() + size);
        Ok(())
    }

    unsafe fn release(&self, addr: NonNull<u8>, size: usize) -> Result<(), VmError> {
        SystemVm.release(addr, size)
    }
}

fn page_size() -> usize {
    SystemVm.page_size().unwrap().page_size
}

#[test]
fn test_pool_commit_failure_is_recoverable() {
    let page = page_size();
    // one page of elements plus one page of records
    let vm = BudgetVm::new(2 * page);
    let per_page = (page / 8) as u32;
    let config = PoolConfig::new(per_page * 4, per_page);
    let mut pool: GenerationalPool<u64, 20, BudgetVm> = GenerationalPool::with_vm(vm.clone(), &config).unwrap();

    for i in 0..per_page {
        pool.insert(u64::from(i)).unwrap();
    }
    assert_eq!(pool.committed_capacity(), per_page);

    let err = pool.insert(0).unwrap_err();
    assert!(matches!(err, AllocError::Vm(VmError::Commit { .. })), "{err}");
    assert_eq!(pool.len(), per_page);
    assert_eq!(pool.capacity(), per_page);

    // freeing makes room without any new commit
    let first = pool.id_of_index(0).unwrap();
    pool.deallocate(first).unwrap();
    let reused = pool.insert(7).unwrap();
    assert_eq!(reused.slot(), first.slot());

    vm.budget.set(usize::MAX / 2);
    let id = pool.insert(99).unwrap();
    assert_eq!(pool[id], 99);
    assert_eq!(pool.len(), per_page + 1);
}

#[test]
fn test_pool_reset_returns_budget() {
    let page = page_size();
    let vm = BudgetVm::new(4 * page);
    let config = PoolConfig::new(1024, 16);
    let mut pool: GenerationalPool<u32, 20, BudgetVm> = GenerationalPool::with_vm(vm.clone(), &config).unwrap();
    pool.insert(1).unwrap();
    assert!(vm.budget.get() < 4 * page);
    pool.reset().unwrap();
    assert_eq!(vm.budget.get(), 4 * page);
}

#[test]
fn test_arena_commit_failure_leaves_cursor() {
    let page = page_size();
    let vm = BudgetVm::new(page);
    let arena = VirtualArena::with_vm(vm.clone(), &ArenaConfig::new(1 << 20, page)).unwrap();

    arena.alloc_raw(page, 1).unwrap();
    assert_eq!(vm.commits.get(), 1);
    assert!(matches!(arena.alloc_raw(1, 1), Err(AllocError::Vm(_))));
    assert_eq!(arena.used(), page);

    vm.budget.set(page);
    assert!(arena.alloc_raw(1, 1).is_ok());
}

#[test]
fn test_reservation_protect() {
    let res = Reservation::new(1 << 20).unwrap();
    let page = res.page_size();
    res.commit(0, 2 * page, Protection::ReadWrite).unwrap();
    unsafe { res.base().as_ptr().write(5) };
    res.protect(0, page, Protection::Read).unwrap();
    assert_eq!(unsafe { *res.base().as_ptr() }, 5);
    res.protect(0, page, Protection::ReadWrite).unwrap();
    res.decommit(0, 2 * page).unwrap();
    res.release().unwrap();
}

fn scratch_file(name: &str, contents: &[u8]) -> PathBuf {
    let path = std::env::temp_dir().join(format!("vmpool-{}-{name}", std::process::id()));
    let mut file = File::create(&path).unwrap();
    file.write_all(contents).unwrap();
    path
}

#[test]
fn test_map_file_read_only() {
    let contents: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    let path = scratch_file("ro", &contents);
    let file = File::open(&path).unwrap();

    let mut map = MappedFile::map(&file, Protection::Read, 5000, 1000).unwrap();
    assert_eq!(map.len(), 1000);
    assert_eq!(map.as_slice(), &contents[5000..6000]);
    assert!(map.as_mut_slice().is_none());
    map.unmap().unwrap();

    drop(file);
    fs::remove_file(path).unwrap();
}

#[test]
fn test_map_file_write_through() {
    let path = scratch_file("rw", &[0u8; 8192]);
    let file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
    {
        let mut map = MappedFile::map(&file, Protection::ReadWrite, 100, 16).unwrap();
        map.as_mut_slice().unwrap().copy_from_slice(b"mapped file data");
    }
    drop(file);
    let on_disk = fs::read(&path).unwrap();
    assert_eq!(&on_disk[100..116], b"mapped file data");
    fs::remove_file(path).unwrap();
}
