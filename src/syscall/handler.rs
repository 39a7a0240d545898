//! System Call Dispatch and Handlers
//!
//! [`Kernel::handle_trap`] is invoked once per user request. It validates
//! the call-number slot, decodes the call, validates each argument slot
//! before reading it, validates pointer arguments before dereferencing
//! them, and routes to the matching handler.
//!
//! # Locking
//! The dispatcher itself holds no locks. Handlers take exactly what they
//! need: the global filesystem lock around collaborator calls, the caller's
//! descriptor-table lock around table updates. No lock is held across a
//! user-memory validation step or a block on console input, and every early
//! exit releases what it took.

use alloc::vec;
use alloc::vec::Vec;

use crate::hal::{AddressSpace, Console, FileSystem, Scheduler, Spawner};
use crate::mm::VirtAddr;
use crate::proc::{Pid, Process, CONSOLE_INPUT_FD, CONSOLE_OUTPUT_FD};
use crate::sync;

use super::frame::ArgReader;
use super::validate::{copy_in, copy_out, read_cstr, validate_range, Access, Fault};
use super::{Flow, SyscallId, TrapFrame, FAILURE, MAX_COMMAND_LINE};

/// Decode a descriptor argument. The ABI slot is 64 bits wide but
/// descriptors are `i32` values; a word outside that range names no
/// descriptor and must not alias one after truncation.
fn fd_word(word: u64) -> Option<i32> {
    i32::try_from(word).ok()
}

/// The boundary layer's view of the kernel: the five collaborators every
/// handler may need.
///
/// The trap glue builds one of these (typically once, at boot) and calls
/// [`handle_trap`](Self::handle_trap) with the current process and the
/// captured frame.
pub struct Kernel<'a> {
    pub mem: &'a dyn AddressSpace,
    pub fs: &'a dyn FileSystem,
    pub console: &'a dyn Console,
    pub spawner: &'a dyn Spawner,
    pub sched: &'a dyn Scheduler,
}

impl Kernel<'_> {
    /// Handle one trapped syscall from `proc`.
    pub fn handle_trap(&self, proc: &Process, frame: &TrapFrame) -> Flow {
        let reader = ArgReader::new(self.mem, frame);

        let word = match reader.call_number() {
            Ok(word) => word,
            Err(fault) => return self.fatal(proc, fault),
        };
        let Some(id) = SyscallId::from_word(word) else {
            log::warn!("[SYSCALL] {}: unknown call number {}", proc.name(), word);
            return Flow::Return(FAILURE);
        };
        log::trace!("[SYSCALL] {}: {:?}", proc.name(), id);

        // Probe the whole argument block up front; a call whose slots are
        // not all readable dies before any handler runs.
        for slot in 0..id.arg_count() {
            if let Err(fault) = reader.arg(slot) {
                return self.fatal(proc, fault);
            }
        }

        // halt and exit never return to the caller; everything else funnels
        // into a value for the return slot or a fatal fault.
        let result = match id {
            SyscallId::Halt => {
                log::info!("[SYSCALL] halt requested by {}", proc.name());
                return Flow::Halt;
            }
            SyscallId::Exit => match reader.arg(0) {
                Ok(status) => {
                    proc.terminate(status as i32, self.fs, self.sched);
                    return Flow::Terminated;
                }
                Err(fault) => return self.fatal(proc, fault),
            },
            SyscallId::Exec => self.sys_exec(proc, &reader),
            SyscallId::Wait => self.sys_wait(proc, &reader),
            SyscallId::Create => self.sys_create(&reader),
            SyscallId::Remove => self.sys_remove(&reader),
            SyscallId::Open => self.sys_open(proc, &reader),
            SyscallId::Filesize => self.sys_filesize(proc, &reader),
            SyscallId::Read => self.sys_read(proc, &reader),
            SyscallId::Write => self.sys_write(proc, &reader),
            SyscallId::Seek => self.sys_seek(proc, &reader),
            SyscallId::Tell => self.sys_tell(proc, &reader),
            SyscallId::Close => self.sys_close(proc, &reader),
        };

        match result {
            Ok(value) => Flow::Return(value),
            Err(fault) => self.fatal(proc, fault),
        }
    }

    /// Fatal validation failure: the process dies with exit code -1 and
    /// nothing is returned to it.
    fn fatal(&self, proc: &Process, fault: Fault) -> Flow {
        log::warn!("[SYSCALL] {}: {} - killed", proc.name(), fault);
        proc.terminate(-1, self.fs, self.sched);
        Flow::Terminated
    }

    /// `exec(command_line) -> new pid | -1`
    ///
    /// The program name is the token before the first space. Existence is
    /// confirmed by an open/close round trip under the filesystem lock
    /// before the loader is involved at all.
    fn sys_exec(&self, proc: &Process, reader: &ArgReader<'_>) -> Result<i64, Fault> {
        let path = VirtAddr::new(reader.arg(0)? as usize);
        let command_line = read_cstr(self.mem, path, MAX_COMMAND_LINE)?;

        let program = command_line.split(' ').next().unwrap_or("");
        if program.is_empty() {
            return Ok(FAILURE);
        }

        {
            let _fs_guard = sync::filesys();
            match self.fs.open(program) {
                Some(probe) => self.fs.close(probe),
                None => return Ok(FAILURE),
            }
        }

        match self.spawner.spawn(&command_line) {
            Some(pid) => {
                log::trace!("[SYSCALL] {}: exec '{}' -> {}", proc.name(), program, pid);
                Ok(pid.0 as i64)
            }
            None => Ok(FAILURE),
        }
    }

    /// `wait(pid) -> exit code | -1`
    fn sys_wait(&self, proc: &Process, reader: &ArgReader<'_>) -> Result<i64, Fault> {
        let pid = Pid(reader.arg(0)?);
        match proc.children().wait(pid, self.sched) {
            Some(code) => Ok(i64::from(code)),
            None => Ok(FAILURE),
        }
    }

    /// `create(path, size) -> bool`
    fn sys_create(&self, reader: &ArgReader<'_>) -> Result<i64, Fault> {
        let path = VirtAddr::new(reader.arg(0)? as usize);
        let size = reader.arg(1)?;
        let name = read_cstr(self.mem, path, MAX_COMMAND_LINE)?;

        let _fs_guard = sync::filesys();
        Ok(i64::from(self.fs.create(&name, size)))
    }

    /// `remove(path) -> bool`
    fn sys_remove(&self, reader: &ArgReader<'_>) -> Result<i64, Fault> {
        let path = VirtAddr::new(reader.arg(0)? as usize);
        let name = read_cstr(self.mem, path, MAX_COMMAND_LINE)?;

        let _fs_guard = sync::filesys();
        Ok(i64::from(self.fs.remove(&name)))
    }

    /// `open(path) -> fd | -1`
    fn sys_open(&self, proc: &Process, reader: &ArgReader<'_>) -> Result<i64, Fault> {
        let path = VirtAddr::new(reader.arg(0)? as usize);
        let name = read_cstr(self.mem, path, MAX_COMMAND_LINE)?;

        let handle = {
            let _fs_guard = sync::filesys();
            self.fs.open(&name)
        };
        let Some(handle) = handle else {
            return Ok(FAILURE);
        };

        let mut files = proc.files().lock();
        let fd = files.allocate();
        files.insert(fd, handle);
        Ok(i64::from(fd))
    }

    /// `filesize(fd) -> size | -1`
    fn sys_filesize(&self, proc: &Process, reader: &ArgReader<'_>) -> Result<i64, Fault> {
        let Some(fd) = fd_word(reader.arg(0)?) else {
            return Ok(FAILURE);
        };
        let Some(handle) = proc.files().lock().lookup(fd) else {
            return Ok(FAILURE);
        };

        let _fs_guard = sync::filesys();
        Ok(self.fs.size(handle))
    }

    /// `read(fd, buf, len) -> bytes read | -1`
    ///
    /// The destination range is validated in full before anything is
    /// consumed from the console or the file, so a bad buffer can never
    /// cause a partial transfer.
    fn sys_read(&self, proc: &Process, reader: &ArgReader<'_>) -> Result<i64, Fault> {
        let fd = fd_word(reader.arg(0)?);
        let buf = VirtAddr::new(reader.arg(1)? as usize);
        let len = reader.arg(2)? as usize;

        validate_range(self.mem, buf, len, Access::WRITE)?;

        if fd == Some(CONSOLE_INPUT_FD) {
            // Blocks until len characters have arrived. No locks held here.
            let mut data = Vec::with_capacity(len);
            for _ in 0..len {
                data.push(self.console.read_char());
            }
            copy_out(self.mem, buf, &data)?;
            return Ok(len as i64);
        }

        let Some(handle) = fd.and_then(|fd| proc.files().lock().lookup(fd)) else {
            return Ok(FAILURE);
        };

        let mut data = vec![0u8; len];
        let transferred = {
            let _fs_guard = sync::filesys();
            self.fs.read(handle, &mut data)
        };
        if transferred < 0 {
            return Ok(FAILURE);
        }
        copy_out(self.mem, buf, &data[..transferred as usize])?;
        Ok(transferred)
    }

    /// `write(fd, buf, len) -> bytes written | -1`
    fn sys_write(&self, proc: &Process, reader: &ArgReader<'_>) -> Result<i64, Fault> {
        let fd = fd_word(reader.arg(0)?);
        let buf = VirtAddr::new(reader.arg(1)? as usize);
        let len = reader.arg(2)? as usize;

        // Validates the full source range and snapshots it kernel-side.
        let data = copy_in(self.mem, buf, len)?;

        if fd == Some(CONSOLE_OUTPUT_FD) {
            self.console.write_bytes(&data);
            return Ok(len as i64);
        }

        let Some(handle) = fd.and_then(|fd| proc.files().lock().lookup(fd)) else {
            return Ok(FAILURE);
        };

        let transferred = {
            let _fs_guard = sync::filesys();
            self.fs.write(handle, &data)
        };
        Ok(if transferred < 0 { FAILURE } else { transferred })
    }

    /// `seek(fd, pos)`; -1 on a dead descriptor, otherwise 0.
    fn sys_seek(&self, proc: &Process, reader: &ArgReader<'_>) -> Result<i64, Fault> {
        let Some(fd) = fd_word(reader.arg(0)?) else {
            return Ok(FAILURE);
        };
        let pos = reader.arg(1)?;
        let Some(handle) = proc.files().lock().lookup(fd) else {
            return Ok(FAILURE);
        };

        let _fs_guard = sync::filesys();
        self.fs.seek(handle, pos);
        Ok(0)
    }

    /// `tell(fd) -> position | -1`
    fn sys_tell(&self, proc: &Process, reader: &ArgReader<'_>) -> Result<i64, Fault> {
        let Some(fd) = fd_word(reader.arg(0)?) else {
            return Ok(FAILURE);
        };
        let Some(handle) = proc.files().lock().lookup(fd) else {
            return Ok(FAILURE);
        };

        let _fs_guard = sync::filesys();
        Ok(self.fs.tell(handle))
    }

    /// `close(fd)`; closing an unknown descriptor is a no-op.
    fn sys_close(&self, proc: &Process, reader: &ArgReader<'_>) -> Result<i64, Fault> {
        let Some(fd) = fd_word(reader.arg(0)?) else {
            return Ok(0);
        };
        let removed = proc.files().lock().remove(fd);
        if let Some(handle) = removed {
            let _fs_guard = sync::filesys();
            self.fs.close(handle);
        }
        Ok(0)
    }
}
