//! Shared test utilities for livecd-builder tests.
//!
//! [`FakeRunner`] stands in for the host: it records every command and
//! simulates the files the real tools would produce (the extracted seed,
//! squashfs images, ISOs), so whole pipelines run inside a temp directory
//! without root, mounts or network.

#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};

use livecd_builder::config::Config;
use livecd_builder::context::BuildContext;
use livecd_builder::layout::Layout;
use livecd_builder::process::{Cmd, CommandResult, Runner};
use tempfile::TempDir;

pub const REMOTE_SEED: &str = "20240101T000000Z/stage3-amd64-openrc-20240101T000000Z.tar.xz";
pub const KERNEL_NAME: &str = "vmlinuz-6.6.30-gentoo-dist";
pub const INITRAMFS_NAME: &str = "initramfs-6.6.30-gentoo-dist.img";

/// Test environment: a configuration rooted in a temp directory, with a fake
/// package repository, syslinux files and resolver config.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    pub root: PathBuf,
    pub config: Config,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().to_path_buf();

        let mut config = Config::with_base_dir(&root.join("base"));

        let repo = root.join("repo");
        write(&repo.join("profiles/repo_name"), b"gentoo\n");
        config.repo_dir = repo;

        let syslinux = root.join("syslinux");
        for name in ["isolinux.bin", "ldlinux.c32", "isohdpfx.bin"] {
            write(&syslinux.join(name), b"syslinux");
        }
        config.syslinux_dir = syslinux;

        let resolv = root.join("resolv.conf");
        write(&resolv, b"nameserver 192.0.2.53\n");
        config.host_resolv_conf = resolv;

        config.builder_storedir = root.join("catalyst");
        config.packages = vec!["app-editors/nano".into(), "app-admin/sudo".into()];
        config.services = vec!["sshd".into()];

        Self {
            _temp_dir: temp_dir,
            root,
            config,
        }
    }

    pub fn layout(&self) -> Layout {
        self.config.layout()
    }

    /// Put a cached seed and a non-empty snapshot in place.
    pub fn seed_inputs(&self) {
        let layout = self.layout();
        write(&layout.seed_archive(), b"stage3 tarball");
        write(&layout.snapshot(), b"hsqs snapshot");
    }

    /// Context that polls the runner's interrupt flag instead of the
    /// process-wide one.
    pub fn context<'a>(&'a self, runner: &'a FakeRunner) -> BuildContext<'a> {
        BuildContext::with_interrupt(&self.config, runner, &runner.interrupt)
    }
}

/// Recording stand-in for the host's process runner.
#[derive(Default)]
pub struct FakeRunner {
    calls: RefCell<Vec<Cmd>>,
    /// Substring of the rendered command line -> exit code.
    failures: Vec<(String, i32)>,
    /// Programs that fail to spawn.
    missing: Vec<String>,
    /// Substring of the rendered command line -> file it creates.
    creates: Vec<(String, PathBuf)>,
    index: Option<String>,
    pgrep_output: String,
    no_kernel: bool,
    interrupt_after: Option<String>,
    pub interrupt: AtomicBool,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands whose rendered line contains `pattern` exit with `code`.
    pub fn fail_on(mut self, pattern: &str, code: i32) -> Self {
        self.failures.push((pattern.to_string(), code));
        self
    }

    /// `program` is not installed.
    pub fn missing(mut self, program: &str) -> Self {
        self.missing.push(program.to_string());
        self
    }

    /// Commands whose line contains `pattern` leave a file at `path`.
    pub fn creating(mut self, pattern: &str, path: PathBuf) -> Self {
        self.creates.push((pattern.to_string(), path));
        self
    }

    /// Content served for the mirror's index file.
    pub fn with_index(mut self, text: &str) -> Self {
        self.index = Some(text.to_string());
        self
    }

    pub fn with_pgrep(mut self, output: &str) -> Self {
        self.pgrep_output = output.to_string();
        self
    }

    /// The extracted seed has no kernel in `boot/`.
    pub fn without_kernel(mut self) -> Self {
        self.no_kernel = true;
        self
    }

    /// Raise the interrupt flag once a command containing `pattern` ran.
    pub fn interrupt_after(mut self, pattern: &str) -> Self {
        self.interrupt_after = Some(pattern.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Cmd> {
        self.calls.borrow().clone()
    }

    /// Rendered command lines in invocation order.
    pub fn lines(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|c| c.to_string()).collect()
    }

    pub fn count(&self, program: &str) -> usize {
        self.calls.borrow().iter().filter(|c| c.program() == program).count()
    }

    pub fn ran(&self, pattern: &str) -> bool {
        self.lines().iter().any(|l| l.contains(pattern))
    }

    /// Last argument of every invocation of `program`, in order.
    pub fn targets_of(&self, program: &str) -> Vec<PathBuf> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.program() == program)
            .filter_map(|c| c.get_args().last().map(PathBuf::from))
            .collect()
    }

    fn simulate(&self, cmd: &Cmd) -> String {
        let args = cmd.get_args();
        match cmd.program() {
            "curl" => match cmd.arg_after("-o") {
                Some(out) => write(Path::new(out), b"stage3 tarball"),
                None => {
                    return self
                        .index
                        .clone()
                        .unwrap_or_else(|| format!("# ts=1704067200\n{REMOTE_SEED} 267328860\n"))
                }
            },
            "tar" => {
                if let Some(root) = cmd.arg_after("-C") {
                    populate_root(Path::new(root), !self.no_kernel);
                }
            }
            "mksquashfs" => {
                if let Some(out) = args.get(1) {
                    write(Path::new(out), b"hsqs image");
                }
            }
            "grub-mkrescue" => {
                if let Some(out) = cmd.arg_after("-o") {
                    write(Path::new(out), b"ISO from grub-mkrescue");
                }
            }
            "xorriso" => {
                if let Some(out) = cmd.arg_after("-o") {
                    write(Path::new(out), b"ISO from xorriso");
                }
            }
            "grub-mkstandalone" => {
                if let Some(out) = cmd.arg_after("-o") {
                    write(Path::new(out), b"EFI loader");
                }
            }
            "mkfs.fat" => {
                if let Some(out) = cmd.arg_after("-C") {
                    write(Path::new(out), b"FAT image");
                }
            }
            "pgrep" => return self.pgrep_output.clone(),
            _ => {}
        }
        String::new()
    }
}

impl Runner for FakeRunner {
    fn run(&self, cmd: &Cmd) -> io::Result<CommandResult> {
        self.calls.borrow_mut().push(cmd.clone());
        let line = cmd.to_string();

        if self.missing.iter().any(|p| p == cmd.program()) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "No such file or directory"));
        }
        if let Some(pattern) = &self.interrupt_after {
            if line.contains(pattern.as_str()) {
                self.interrupt.store(true, Ordering::SeqCst);
            }
        }
        if let Some((_, code)) = self.failures.iter().find(|(p, _)| line.contains(p.as_str())) {
            return Ok(result(*code, String::new(), "simulated failure".to_string()));
        }

        let stdout = self.simulate(cmd);
        for (pattern, path) in &self.creates {
            if line.contains(pattern.as_str()) {
                write(path, b"ISO from the builder");
            }
        }
        // pgrep exits 1 when nothing matches.
        if cmd.program() == "pgrep" && stdout.is_empty() {
            return Ok(result(1, stdout, String::new()));
        }
        Ok(result(0, stdout, String::new()))
    }
}

fn result(code: i32, stdout: String, stderr: String) -> CommandResult {
    CommandResult {
        status: ExitStatus::from_raw(code << 8),
        stdout,
        stderr,
    }
}

/// What extracting a stage3 seed leaves behind, as far as the pipeline cares.
fn populate_root(root: &Path, with_kernel: bool) {
    write(&root.join("etc/gentoo-release"), b"Gentoo Base System release 2.14\n");
    fs::create_dir_all(root.join("usr/bin")).expect("Failed to create usr/bin");
    fs::create_dir_all(root.join("boot")).expect("Failed to create boot");
    if with_kernel {
        write(&root.join("boot").join(KERNEL_NAME), b"kernel image");
        write(&root.join("boot").join(INITRAMFS_NAME), b"initramfs");
    }
}

/// Write a file, creating parent directories.
pub fn write(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir");
    }
    fs::write(path, content).expect("Failed to write file");
}

/// Assert that a file exists at the given path.
pub fn assert_file_exists(path: &Path) {
    assert!(path.exists(), "File should exist: {}", path.display());
}

/// Assert that a file contains the given content.
pub fn assert_file_contains(path: &Path, content: &str) {
    let file_content = fs::read_to_string(path)
        .unwrap_or_else(|_| panic!("Failed to read file: {}", path.display()));
    assert!(
        file_content.contains(content),
        "File {} should contain '{}', but has:\n{}",
        path.display(),
        content,
        file_content
    );
}

/// Text of every stage log written so far.
pub fn all_logs(env: &TestEnv) -> String {
    let mut text = String::new();
    if let Ok(entries) = fs::read_dir(env.layout().logs_dir()) {
        for entry in entries.filter_map(|e| e.ok()) {
            text.push_str(&fs::read_to_string(entry.path()).unwrap_or_default());
        }
    }
    text
}

/// `.iso` files directly inside `dir`.
pub fn isos_in(dir: &Path) -> Vec<PathBuf> {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("iso"))
            .collect(),
        Err(_) => Vec::new(),
    }
}
