//! Shared fixtures for integration tests: a fake proc/sys tree and a
//! privileged reader double.

#![allow(dead_code)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use herakles_device_probe::error::Result;
use herakles_device_probe::source::SharedReader;
use herakles_device_probe::{Config, DeviceContext, PrivilegedReader, ProbeError};
use tempfile::TempDir;

pub const STAT_TWO_CORES: &str = "cpu  20 0 20 160 0 0 0\n\
                                  cpu0 10 0 10 80 0 0 0\n\
                                  cpu1 10 0 10 80 0 0 0\n\
                                  intr 12345\n";

pub const MEMINFO: &str = "MemTotal:        2048000 kB\n\
                           MemFree:           12000 kB\n\
                           MemAvailable:    1024000 kB\n\
                           Active:           512000 kB\n\
                           Inactive:         307200 kB\n";

pub const SDA_STAT: &str = "     100        0     2000      300      50        0     800      200        0      400      500\n";

/// A temporary directory laid out like `/proc` and `/sys`.
pub struct FakeTree {
    dir: TempDir,
}

impl FakeTree {
    pub fn new() -> Self {
        let tree = Self {
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
        };
        fs::create_dir_all(tree.proc_root()).expect("mkdir proc");
        fs::create_dir_all(tree.sys_root()).expect("mkdir sys");
        tree
    }

    /// Tree with two cores, meminfo and nothing else.
    pub fn minimal() -> Self {
        let tree = Self::new();
        tree.write("proc/stat", STAT_TWO_CORES);
        tree.write("proc/meminfo", MEMINFO);
        tree
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn proc_root(&self) -> PathBuf {
        self.root().join("proc")
    }

    pub fn sys_root(&self) -> PathBuf {
        self.root().join("sys")
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }

    pub fn write(&self, rel: &str, content: &str) {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, content).expect("write");
    }

    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.paths.proc_root = self.proc_root();
        config.paths.sys_root = self.sys_root();
        config.block_mounts = Some(vec![]);
        config
    }

    pub fn discover(&self, config: &Config, reader: SharedReader) -> DeviceContext {
        DeviceContext::discover_with(config, reader)
    }
}

/// Privileged reader double that counts calls and either serves the file
/// or refuses.
pub struct CountingReader {
    pub calls: AtomicUsize,
    allow: bool,
}

impl CountingReader {
    pub fn allowing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            allow: true,
        })
    }

    pub fn denying() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            allow: false,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PrivilegedReader for CountingReader {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.allow {
            fs::read(path).map_err(|e| ProbeError::from_io(path, e))
        } else {
            Err(ProbeError::AccessDenied(path.to_path_buf()))
        }
    }
}

/// In-memory sink for formatted log lines.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("log buffer")).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log buffer").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs `f` with every log event of this thread written to a buffer.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, buffer.contents())
}
