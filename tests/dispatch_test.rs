//! End-to-end dispatcher scenarios: call decoding, argument validation,
//! descriptor behavior, console and file transfers.

use trapgate::mm::{VirtAddr, PAGE_SIZE};
use trapgate::testing::{
    MemAddressSpace, MemFileSystem, ParkScheduler, ScriptedConsole, SpawnRecorder,
};
use trapgate::{Flow, Kernel, Pid, Process, SyscallId, TrapFrame};

/// User stack page for the calling process.
const STACK: usize = 0x2000_0000;
/// Scratch data page for buffers and path strings.
const DATA: usize = 0x3000_0000;

struct Env {
    mem: MemAddressSpace,
    fs: MemFileSystem,
    console: ScriptedConsole,
    spawner: SpawnRecorder,
    sched: ParkScheduler,
}

impl Env {
    fn new() -> Self {
        let mem = MemAddressSpace::new();
        mem.map_page(VirtAddr::new(STACK));
        mem.map_page(VirtAddr::new(DATA));
        Self {
            mem,
            fs: MemFileSystem::new(),
            console: ScriptedConsole::new(),
            spawner: SpawnRecorder::new(),
            sched: ParkScheduler::new(),
        }
    }

    fn kernel(&self) -> Kernel<'_> {
        Kernel {
            mem: &self.mem,
            fs: &self.fs,
            console: &self.console,
            spawner: &self.spawner,
            sched: &self.sched,
        }
    }

    /// Lay out a call on the user stack: number at the stack pointer,
    /// arguments in the following slots.
    fn push_call(&self, id: u64, args: &[u64]) -> TrapFrame {
        let sp = VirtAddr::new(STACK);
        self.mem.store_word(sp, id);
        for (i, &arg) in args.iter().enumerate() {
            self.mem.store_word(VirtAddr::new(STACK + 8 * (i + 1)), arg);
        }
        TrapFrame::new(sp)
    }

    /// Place a NUL-terminated string at an offset inside the data page and
    /// return its user address.
    fn push_str(&self, offset: usize, s: &str) -> u64 {
        let addr = VirtAddr::new(DATA + offset);
        self.mem.store_bytes(addr, s.as_bytes());
        self.mem
            .store_bytes(VirtAddr::new(DATA + offset + s.len()), &[0]);
        addr.as_usize() as u64
    }
}

fn open_fd(env: &Env, proc: &Process, path: &str) -> i64 {
    let ptr = env.push_str(0x800, path);
    match env
        .kernel()
        .handle_trap(proc, &env.push_call(SyscallId::Open as u64, &[ptr]))
    {
        Flow::Return(fd) => fd,
        other => panic!("open did not return: {other:?}"),
    }
}

#[test]
fn unknown_call_number_is_defined_error_and_process_survives() {
    let env = Env::new();
    let proc = Process::new_root(Pid(1), "init");

    let flow = env.kernel().handle_trap(&proc, &env.push_call(999, &[]));
    assert_eq!(flow, Flow::Return(-1));

    // The process is intact and can keep issuing syscalls.
    let buf = env.push_str(0, "hi");
    let flow = env
        .kernel()
        .handle_trap(&proc, &env.push_call(SyscallId::Write as u64, &[1, buf, 2]));
    assert_eq!(flow, Flow::Return(2));
    assert_eq!(env.console.take_output(), b"hi");
}

#[test]
fn halt_stops_the_machine() {
    let env = Env::new();
    let proc = Process::new_root(Pid(1), "init");
    let flow = env
        .kernel()
        .handle_trap(&proc, &env.push_call(SyscallId::Halt as u64, &[]));
    assert_eq!(flow, Flow::Halt);
}

#[test]
fn console_write_returns_len_and_reaches_console() {
    let env = Env::new();
    let proc = Process::new_root(Pid(1), "init");
    let buf = env.push_str(0, "hello console");

    let flow = env
        .kernel()
        .handle_trap(&proc, &env.push_call(SyscallId::Write as u64, &[1, buf, 13]));
    assert_eq!(flow, Flow::Return(13));
    assert_eq!(env.console.take_output(), b"hello console");
}

#[test]
fn console_read_blocks_until_enough_input() {
    let env = Env::new();
    let proc = Process::new_root(Pid(1), "init");
    let frame = env.push_call(SyscallId::Read as u64, &[0, DATA as u64, 3]);

    std::thread::scope(|scope| {
        let feeder = scope.spawn(|| {
            std::thread::sleep(std::time::Duration::from_millis(30));
            env.console.push_input(b"abc");
        });
        let flow = env.kernel().handle_trap(&proc, &frame);
        assert_eq!(flow, Flow::Return(3));
        feeder.join().unwrap();
    });
    assert_eq!(env.mem.snapshot(VirtAddr::new(DATA), 3), b"abc");
}

#[test]
fn open_yields_distinct_increasing_descriptors() {
    let env = Env::new();
    let proc = Process::new_root(Pid(1), "init");
    for name in ["a", "b", "c"] {
        env.fs.install(name, b"x");
    }

    let mut last = 1;
    for name in ["a", "b", "c"] {
        let fd = open_fd(&env, &proc, name);
        assert!(fd >= 2, "console descriptors must never be handed out");
        assert!(fd > last, "descriptors must strictly increase");
        last = fd;
    }
}

#[test]
fn create_open_write_seek_read_round_trip() {
    let env = Env::new();
    let proc = Process::new_root(Pid(1), "init");
    let kernel = env.kernel();

    let path = env.push_str(0x100, "notes");
    let flow = kernel.handle_trap(&proc, &env.push_call(SyscallId::Create as u64, &[path, 16]));
    assert_eq!(flow, Flow::Return(1));
    // Creating the same file again is refused.
    let flow = kernel.handle_trap(&proc, &env.push_call(SyscallId::Create as u64, &[path, 16]));
    assert_eq!(flow, Flow::Return(0));

    let fd = open_fd(&env, &proc, "notes") as u64;
    assert_eq!(
        kernel.handle_trap(&proc, &env.push_call(SyscallId::Filesize as u64, &[fd])),
        Flow::Return(16)
    );

    let buf = env.push_str(0x200, "hello");
    assert_eq!(
        kernel.handle_trap(&proc, &env.push_call(SyscallId::Write as u64, &[fd, buf, 5])),
        Flow::Return(5)
    );
    assert_eq!(
        kernel.handle_trap(&proc, &env.push_call(SyscallId::Tell as u64, &[fd])),
        Flow::Return(5)
    );

    assert_eq!(
        kernel.handle_trap(&proc, &env.push_call(SyscallId::Seek as u64, &[fd, 0])),
        Flow::Return(0)
    );
    let dst = (DATA + 0x300) as u64;
    assert_eq!(
        kernel.handle_trap(&proc, &env.push_call(SyscallId::Read as u64, &[fd, dst, 5])),
        Flow::Return(5)
    );
    assert_eq!(env.mem.snapshot(VirtAddr::new(DATA + 0x300), 5), b"hello");

    let contents = env.fs.contents("notes").unwrap();
    assert_eq!(&contents[..5], b"hello");
}

#[test]
fn remove_reports_presence() {
    let env = Env::new();
    let proc = Process::new_root(Pid(1), "init");
    env.fs.install("junk", b"");

    let path = env.push_str(0, "junk");
    let kernel = env.kernel();
    assert_eq!(
        kernel.handle_trap(&proc, &env.push_call(SyscallId::Remove as u64, &[path])),
        Flow::Return(1)
    );
    assert_eq!(
        kernel.handle_trap(&proc, &env.push_call(SyscallId::Remove as u64, &[path])),
        Flow::Return(0)
    );
}

#[test]
fn closed_descriptor_rejects_io_and_leaves_others_alone() {
    let env = Env::new();
    let proc = Process::new_root(Pid(1), "init");
    env.fs.install("a", b"aaaa");
    env.fs.install("b", b"bbbb");

    let fd_a = open_fd(&env, &proc, "a") as u64;
    let fd_b = open_fd(&env, &proc, "b") as u64;

    let kernel = env.kernel();
    assert_eq!(
        kernel.handle_trap(&proc, &env.push_call(SyscallId::Close as u64, &[fd_a])),
        Flow::Return(0)
    );

    let dst = DATA as u64;
    assert_eq!(
        kernel.handle_trap(&proc, &env.push_call(SyscallId::Read as u64, &[fd_a, dst, 4])),
        Flow::Return(-1)
    );
    assert_eq!(
        kernel.handle_trap(&proc, &env.push_call(SyscallId::Write as u64, &[fd_a, dst, 4])),
        Flow::Return(-1)
    );

    // The sibling descriptor still works.
    assert_eq!(
        kernel.handle_trap(&proc, &env.push_call(SyscallId::Read as u64, &[fd_b, dst, 4])),
        Flow::Return(4)
    );
    assert_eq!(env.mem.snapshot(VirtAddr::new(DATA), 4), b"bbbb");

    // Closing again, or closing garbage, is a quiet no-op.
    assert_eq!(
        kernel.handle_trap(&proc, &env.push_call(SyscallId::Close as u64, &[fd_a])),
        Flow::Return(0)
    );
    assert_eq!(
        kernel.handle_trap(&proc, &env.push_call(SyscallId::Close as u64, &[4096])),
        Flow::Return(0)
    );
}

#[test]
fn metadata_calls_on_dead_descriptor_return_failure() {
    let env = Env::new();
    let proc = Process::new_root(Pid(1), "init");
    let kernel = env.kernel();

    for id in [SyscallId::Filesize, SyscallId::Tell] {
        assert_eq!(
            kernel.handle_trap(&proc, &env.push_call(id as u64, &[42])),
            Flow::Return(-1)
        );
    }
    assert_eq!(
        kernel.handle_trap(&proc, &env.push_call(SyscallId::Seek as u64, &[42, 0])),
        Flow::Return(-1)
    );
}

#[test]
fn descriptor_word_beyond_i32_names_no_descriptor() {
    let env = Env::new();
    let proc = Process::new_root(Pid(1), "init");
    env.fs.install("f", b"data");
    let fd = open_fd(&env, &proc, "f") as u64;
    let kernel = env.kernel();

    // The low 32 bits collide with the console output fd and with the live
    // descriptor; the full 64-bit word names neither.
    let console_alias = (1u64 << 32) | 1;
    let file_alias = (1u64 << 32) | fd;
    let buf = env.push_str(0, "hi");

    assert_eq!(
        kernel.handle_trap(
            &proc,
            &env.push_call(SyscallId::Write as u64, &[console_alias, buf, 2])
        ),
        Flow::Return(-1)
    );
    assert!(env.console.take_output().is_empty());

    // Low bits of zero must not turn into a blocking console read.
    assert_eq!(
        kernel.handle_trap(
            &proc,
            &env.push_call(SyscallId::Read as u64, &[1u64 << 32, DATA as u64, 2])
        ),
        Flow::Return(-1)
    );

    for id in [SyscallId::Filesize, SyscallId::Tell] {
        assert_eq!(
            kernel.handle_trap(&proc, &env.push_call(id as u64, &[file_alias])),
            Flow::Return(-1)
        );
    }
    assert_eq!(
        kernel.handle_trap(&proc, &env.push_call(SyscallId::Seek as u64, &[file_alias, 0])),
        Flow::Return(-1)
    );

    // Closing the alias is a quiet no-op that leaves the real fd open.
    assert_eq!(
        kernel.handle_trap(&proc, &env.push_call(SyscallId::Close as u64, &[file_alias])),
        Flow::Return(0)
    );
    assert_eq!(
        kernel.handle_trap(&proc, &env.push_call(SyscallId::Read as u64, &[fd, DATA as u64, 4])),
        Flow::Return(4)
    );
    assert_eq!(env.mem.snapshot(VirtAddr::new(DATA), 4), b"data");
}

#[test]
fn bad_stack_pointer_is_fatal() {
    let env = Env::new();
    let proc = Process::new_root(Pid(1), "init");

    // Unmapped stack: even the call-number slot cannot be validated.
    let frame = TrapFrame::new(VirtAddr::new(0x7fff_0000));
    let flow = env.kernel().handle_trap(&proc, &frame);
    assert_eq!(flow, Flow::Terminated);
    assert_eq!(proc.exit_code(), Some(-1));
}

#[test]
fn buffer_spilling_into_unmapped_page_is_rejected_in_full() {
    let env = Env::new();
    let proc = Process::new_root(Pid(1), "init");
    env.fs.install("f", b"0123456789abcdef");
    let fd = open_fd(&env, &proc, "f") as u64;

    // Buffer starts near the end of the mapped data page and runs off it.
    let edge = (DATA + PAGE_SIZE - 4) as u64;
    let flow = env
        .kernel()
        .handle_trap(&proc, &env.push_call(SyscallId::Read as u64, &[fd, edge, 64]));
    assert_eq!(flow, Flow::Terminated);
    assert_eq!(proc.exit_code(), Some(-1));

    // Nothing was transferred into the mapped head of the buffer.
    assert_eq!(
        env.mem.snapshot(VirtAddr::new(DATA + PAGE_SIZE - 4), 4),
        &[0, 0, 0, 0]
    );
}

#[test]
fn write_from_bad_buffer_kills_without_touching_the_file() {
    let env = Env::new();
    let proc = Process::new_root(Pid(1), "writer");
    env.fs.install("f", &[0u8; 8]);
    let fd = open_fd(&env, &proc, "f") as u64;

    let edge = (DATA + PAGE_SIZE - 4) as u64;
    let flow = env
        .kernel()
        .handle_trap(&proc, &env.push_call(SyscallId::Write as u64, &[fd, edge, 64]));
    assert_eq!(flow, Flow::Terminated);
    assert_eq!(env.fs.contents("f").unwrap(), vec![0u8; 8]);
}

#[test]
fn exec_missing_program_fails_without_spawning() {
    let env = Env::new();
    let proc = Process::new_root(Pid(1), "init");
    let path = env.push_str(0, "no-such-program arg");

    let flow = env
        .kernel()
        .handle_trap(&proc, &env.push_call(SyscallId::Exec as u64, &[path]));
    assert_eq!(flow, Flow::Return(-1));
    assert!(env.spawner.calls().is_empty());
}

#[test]
fn exec_empty_program_token_fails() {
    let env = Env::new();
    let proc = Process::new_root(Pid(1), "init");
    for cmdline in ["", " leading-space"] {
        let path = env.push_str(0, cmdline);
        let flow = env
            .kernel()
            .handle_trap(&proc, &env.push_call(SyscallId::Exec as u64, &[path]));
        assert_eq!(flow, Flow::Return(-1));
    }
    assert!(env.spawner.calls().is_empty());
}

#[test]
fn exec_passes_full_command_line_to_the_loader() {
    let mut env = Env::new();
    env.spawner = SpawnRecorder::returning(Pid(7));
    let proc = Process::new_root(Pid(1), "init");
    env.fs.install("echo", b"\x7fELF");

    let path = env.push_str(0, "echo hello world");
    let flow = env
        .kernel()
        .handle_trap(&proc, &env.push_call(SyscallId::Exec as u64, &[path]));
    assert_eq!(flow, Flow::Return(7));
    assert_eq!(env.spawner.calls(), vec!["echo hello world".to_string()]);
    // The existence probe did not leak a handle.
    assert_eq!(env.fs.open_handles(), 0);
}
