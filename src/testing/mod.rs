//! Test Doubles for the Collaborator Traits
//!
//! In-memory implementations of every [`crate::hal`] trait, used by the
//! crate's own tests and usable by embedders to exercise boundary behavior
//! without hardware. Pure safe code over `alloc`; nothing here is
//! compiled out in release builds, mirroring how an embedder would ship a
//! RAM-backed bring-up environment.

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, VecDeque};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use spin::Mutex;

use crate::hal::{AddressSpace, Console, FileHandle, FileSystem, Scheduler, Spawner};
use crate::mm::{VirtAddr, PAGE_MASK, PAGE_SIZE};
use crate::proc::Pid;

/// Page-granular user address space over heap memory.
///
/// Only explicitly mapped pages exist; everything else behaves as unmapped
/// and fails the probe, exactly like a hole in a real page table.
pub struct MemAddressSpace {
    pages: Mutex<BTreeMap<usize, Box<[u8]>>>,
}

impl MemAddressSpace {
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(BTreeMap::new()),
        }
    }

    /// Map (and zero) the page containing `addr`.
    pub fn map_page(&self, addr: VirtAddr) {
        self.pages
            .lock()
            .entry(addr.page_number())
            .or_insert_with(|| vec![0u8; PAGE_SIZE].into_boxed_slice());
    }

    /// Drop the mapping for the page containing `addr`.
    pub fn unmap_page(&self, addr: VirtAddr) {
        self.pages.lock().remove(&addr.page_number());
    }

    /// Test setup: place bytes at `addr`. Panics on an unmapped page.
    pub fn store_bytes(&self, addr: VirtAddr, bytes: &[u8]) {
        for (offset, &byte) in bytes.iter().enumerate() {
            let a = VirtAddr::new(addr.as_usize() + offset);
            assert!(self.write_byte(a, byte), "store_bytes hit unmapped {a}");
        }
    }

    /// Test setup: place one little-endian stack word at `addr`.
    pub fn store_word(&self, addr: VirtAddr, word: u64) {
        self.store_bytes(addr, &word.to_le_bytes());
    }

    /// Test assertion helper: snapshot `len` bytes at `addr`.
    pub fn snapshot(&self, addr: VirtAddr, len: usize) -> Vec<u8> {
        (0..len)
            .map(|offset| {
                let a = VirtAddr::new(addr.as_usize() + offset);
                self.read_byte(a).expect("snapshot hit unmapped page")
            })
            .collect()
    }
}

impl Default for MemAddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpace for MemAddressSpace {
    fn is_mapped(&self, addr: VirtAddr) -> bool {
        self.pages.lock().contains_key(&addr.page_number())
    }

    fn read_byte(&self, addr: VirtAddr) -> Option<u8> {
        let pages = self.pages.lock();
        let page = pages.get(&addr.page_number())?;
        Some(page[addr.as_usize() & PAGE_MASK])
    }

    fn write_byte(&self, addr: VirtAddr, byte: u8) -> bool {
        let mut pages = self.pages.lock();
        match pages.get_mut(&addr.page_number()) {
            Some(page) => {
                page[addr.as_usize() & PAGE_MASK] = byte;
                true
            }
            None => false,
        }
    }
}

#[derive(Debug)]
struct OpenState {
    name: String,
    pos: usize,
}

#[derive(Debug, Default)]
struct FsInner {
    files: BTreeMap<String, Vec<u8>>,
    handles: BTreeMap<u64, OpenState>,
    next_handle: u64,
}

/// Named byte-vector files with per-handle positions.
///
/// Fixed-size files: writes do not grow a file past its created length,
/// like the flat filesystem this boundary fronts in its reference
/// environment.
pub struct MemFileSystem {
    inner: Mutex<FsInner>,
}

impl MemFileSystem {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(FsInner::default()),
        }
    }

    /// Test setup: install a file with contents.
    pub fn install(&self, name: &str, data: &[u8]) {
        self.inner
            .lock()
            .files
            .insert(String::from(name), data.to_vec());
    }

    /// Test assertion helper: a file's current contents.
    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.inner.lock().files.get(name).cloned()
    }

    /// Number of handles currently open; zero once every owner closed or
    /// was torn down.
    pub fn open_handles(&self) -> usize {
        self.inner.lock().handles.len()
    }
}

impl Default for MemFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for MemFileSystem {
    fn create(&self, path: &str, size: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.files.contains_key(path) {
            return false;
        }
        inner.files.insert(String::from(path), vec![0u8; size as usize]);
        true
    }

    fn remove(&self, path: &str) -> bool {
        self.inner.lock().files.remove(path).is_some()
    }

    fn open(&self, path: &str) -> Option<FileHandle> {
        let mut inner = self.inner.lock();
        if !inner.files.contains_key(path) {
            return None;
        }
        inner.next_handle += 1;
        let id = inner.next_handle;
        inner.handles.insert(
            id,
            OpenState {
                name: String::from(path),
                pos: 0,
            },
        );
        Some(FileHandle(id))
    }

    fn read(&self, handle: FileHandle, buf: &mut [u8]) -> i64 {
        let mut inner = self.inner.lock();
        let Some(state) = inner.handles.get(&handle.0) else {
            return -1;
        };
        let (name, pos) = (state.name.clone(), state.pos);
        let Some(file) = inner.files.get(&name) else {
            return -1;
        };
        let pos = pos.min(file.len());
        let n = buf.len().min(file.len() - pos);
        buf[..n].copy_from_slice(&file[pos..pos + n]);
        if let Some(state) = inner.handles.get_mut(&handle.0) {
            state.pos += n;
        }
        n as i64
    }

    fn write(&self, handle: FileHandle, buf: &[u8]) -> i64 {
        let mut inner = self.inner.lock();
        let Some(state) = inner.handles.get(&handle.0) else {
            return -1;
        };
        let (name, pos) = (state.name.clone(), state.pos);
        let Some(file) = inner.files.get_mut(&name) else {
            return -1;
        };
        let pos = pos.min(file.len());
        let n = buf.len().min(file.len() - pos);
        file[pos..pos + n].copy_from_slice(&buf[..n]);
        if let Some(state) = inner.handles.get_mut(&handle.0) {
            state.pos += n;
        }
        n as i64
    }

    fn size(&self, handle: FileHandle) -> i64 {
        let inner = self.inner.lock();
        let Some(state) = inner.handles.get(&handle.0) else {
            return -1;
        };
        match inner.files.get(&state.name) {
            Some(file) => file.len() as i64,
            None => -1,
        }
    }

    fn seek(&self, handle: FileHandle, pos: u64) {
        if let Some(state) = self.inner.lock().handles.get_mut(&handle.0) {
            state.pos = pos as usize;
        }
    }

    fn tell(&self, handle: FileHandle) -> i64 {
        match self.inner.lock().handles.get(&handle.0) {
            Some(state) => state.pos as i64,
            None => -1,
        }
    }

    fn close(&self, handle: FileHandle) {
        self.inner.lock().handles.remove(&handle.0);
    }
}

/// Console with queued input and captured output.
///
/// `read_char` spins until input arrives, which makes it genuinely blocking
/// under a threaded test.
pub struct ScriptedConsole {
    input: Mutex<VecDeque<u8>>,
    output: Mutex<Vec<u8>>,
}

impl ScriptedConsole {
    pub fn new() -> Self {
        Self {
            input: Mutex::new(VecDeque::new()),
            output: Mutex::new(Vec::new()),
        }
    }

    /// Queue bytes for `read_char` to consume.
    pub fn push_input(&self, bytes: &[u8]) {
        self.input.lock().extend(bytes.iter().copied());
    }

    /// Take everything written so far.
    pub fn take_output(&self) -> Vec<u8> {
        core::mem::take(&mut *self.output.lock())
    }
}

impl Default for ScriptedConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl Console for ScriptedConsole {
    fn read_char(&self) -> u8 {
        loop {
            if let Some(byte) = self.input.lock().pop_front() {
                return byte;
            }
            core::hint::spin_loop();
        }
    }

    fn write_bytes(&self, bytes: &[u8]) {
        self.output.lock().extend_from_slice(bytes);
    }
}

#[derive(Default)]
struct WakeSlot {
    token: AtomicBool,
}

/// Spin-parking scheduler implementing the register-then-block protocol.
///
/// `prepare_block` clears any stale token, `wake` delivers one, and `block`
/// spins until a token is present. Pure atomics, so it works with real
/// threads in integration tests and degenerates to a no-op in single-step
/// scenarios where the condition is already true.
pub struct ParkScheduler {
    slots: Mutex<BTreeMap<u64, Arc<WakeSlot>>>,
}

impl ParkScheduler {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(BTreeMap::new()),
        }
    }

    fn slot(&self, pid: Pid) -> Arc<WakeSlot> {
        self.slots.lock().entry(pid.0).or_default().clone()
    }
}

impl Default for ParkScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ParkScheduler {
    fn prepare_block(&self, pid: Pid) {
        self.slot(pid).token.store(false, Ordering::SeqCst);
    }

    fn block(&self, pid: Pid) {
        let slot = self.slot(pid);
        while !slot.token.swap(false, Ordering::SeqCst) {
            core::hint::spin_loop();
        }
    }

    fn wake(&self, pid: Pid) {
        self.slot(pid).token.store(true, Ordering::SeqCst);
    }
}

type SpawnHook = Box<dyn Fn(&str) -> Option<Pid> + Send + Sync>;

/// Loader double: records every command line and answers through an
/// optional hook (default: spawn failure).
pub struct SpawnRecorder {
    calls: Mutex<Vec<String>>,
    hook: Mutex<Option<SpawnHook>>,
}

impl SpawnRecorder {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            hook: Mutex::new(None),
        }
    }

    /// A recorder that answers every spawn with `pid`.
    pub fn returning(pid: Pid) -> Self {
        let recorder = Self::new();
        recorder.set_hook(move |_| Some(pid));
        recorder
    }

    /// Route spawns through `hook` (e.g. to build a real child record).
    pub fn set_hook(&self, hook: impl Fn(&str) -> Option<Pid> + Send + Sync + 'static) {
        *self.hook.lock() = Some(Box::new(hook));
    }

    /// Command lines seen so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl Default for SpawnRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Spawner for SpawnRecorder {
    fn spawn(&self, command_line: &str) -> Option<Pid> {
        self.calls.lock().push(String::from(command_line));
        match &*self.hook.lock() {
            Some(hook) => hook(command_line),
            None => None,
        }
    }
}
