//! Kernel counter sources with a privileged-read fallback.
//!
//! A [`CounterSource`] keeps one pseudo-file open and re-reads it from offset
//! zero on every sample, reusing a single text buffer. When the normal open or
//! read is refused it switches, exactly once, to a [`PrivilegedReader`]. Any
//! further failure disables the source for the rest of the session.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{ProbeError, Result};

/// Escalated read path used only after a normal read was denied.
pub trait PrivilegedReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<Vec<u8>>;
}

pub type SharedReader = Arc<dyn PrivilegedReader>;

/// Reader for sessions without any privilege escalation configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unprivileged;

impl PrivilegedReader for Unprivileged {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        Err(ProbeError::AccessDenied(path.to_path_buf()))
    }
}

/// Runs an external helper (`su`, `sudo -n`, ...) that prints the file.
///
/// `{path}` inside any argument is replaced by the node path; without a
/// placeholder the path is appended as the last argument.
#[derive(Debug, Clone)]
pub struct CommandReader {
    argv: Vec<String>,
}

impl CommandReader {
    pub const PATH_PLACEHOLDER: &'static str = "{path}";

    pub fn new(argv: Vec<String>) -> Option<Self> {
        match argv.first() {
            Some(program) if !program.trim().is_empty() => Some(Self { argv }),
            _ => None,
        }
    }

    pub fn argv_for(&self, path: &Path) -> Vec<String> {
        let target = path.to_string_lossy();
        let mut substituted = false;
        let mut argv: Vec<String> = self
            .argv
            .iter()
            .map(|arg| {
                if arg.contains(Self::PATH_PLACEHOLDER) {
                    substituted = true;
                    arg.replace(Self::PATH_PLACEHOLDER, &target)
                } else {
                    arg.clone()
                }
            })
            .collect();
        if !substituted {
            argv.push(target.into_owned());
        }
        argv
    }
}

impl PrivilegedReader for CommandReader {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let argv = self.argv_for(path);
        let output = Command::new(&argv[0])
            .args(&argv[1..])
            .output()
            .map_err(|e| ProbeError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        if !output.status.success() {
            debug!(
                "privileged read of {} exited with {}: {}",
                path.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Err(ProbeError::AccessDenied(path.to_path_buf()));
        }
        Ok(output.stdout)
    }
}

/// Access state of a [`CounterSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Available,
    /// Served by the privileged reader.
    Degraded,
    Unavailable,
}

/// A single re-readable text pseudo-file.
pub struct CounterSource {
    path: PathBuf,
    file: Option<File>,
    privileged: SharedReader,
    state: SourceState,
    buf: String,
}

impl CounterSource {
    /// Opens `path`, falling back to `privileged` when the open is denied.
    pub fn open(path: impl Into<PathBuf>, privileged: SharedReader) -> Result<Self> {
        let path = path.into();
        match File::open(&path) {
            Ok(file) => Ok(Self {
                path,
                file: Some(file),
                privileged,
                state: SourceState::Available,
                buf: String::with_capacity(1024),
            }),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                warn!("cannot access {}, trying privileged read", path.display());
                let mut source = Self::privileged(path, privileged);
                source.fill()?;
                Ok(source)
            }
            Err(e) => Err(ProbeError::from_io(&path, e)),
        }
    }

    /// A source that is served by `privileged` from the start.
    pub fn privileged(path: impl Into<PathBuf>, privileged: SharedReader) -> Self {
        Self {
            path: path.into(),
            file: None,
            privileged,
            state: SourceState::Degraded,
            buf: String::with_capacity(1024),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    pub fn is_available(&self) -> bool {
        self.state != SourceState::Unavailable
    }

    /// Disables the source permanently, e.g. after a structural parse failure.
    pub fn invalidate(&mut self) {
        self.state = SourceState::Unavailable;
        self.file = None;
    }

    /// Re-reads the whole node and returns its current contents.
    pub fn read_all(&mut self) -> Result<&str> {
        self.fill()?;
        Ok(&self.buf)
    }

    fn fill(&mut self) -> Result<()> {
        match self.state {
            SourceState::Unavailable => Err(ProbeError::Unavailable(self.path.clone())),
            SourceState::Degraded => self.fill_privileged(),
            SourceState::Available => match self.fill_direct() {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                    warn!("read of {} denied, trying privileged read", self.path.display());
                    self.state = SourceState::Degraded;
                    self.file = None;
                    self.fill_privileged()
                }
                Err(e) => {
                    warn!("disabling {}: {}", self.path.display(), e);
                    self.invalidate();
                    Err(ProbeError::Io {
                        path: self.path.clone(),
                        source: e,
                    })
                }
            },
        }
    }

    fn fill_direct(&mut self) -> io::Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::other("source has no open handle"))?;
        file.seek(SeekFrom::Start(0))?;
        self.buf.clear();
        file.read_to_string(&mut self.buf)?;
        Ok(())
    }

    fn fill_privileged(&mut self) -> Result<()> {
        match self.privileged.read(&self.path) {
            Ok(bytes) => {
                self.buf.clear();
                self.buf.push_str(&String::from_utf8_lossy(&bytes));
                Ok(())
            }
            Err(e) => {
                warn!("privileged read of {} failed: {}", self.path.display(), e);
                self.invalidate();
                Err(e)
            }
        }
    }
}

/// One-shot read of a small sysfs attribute, trimmed.
///
/// Used for nodes that come and go with device state (cpufreq files of an
/// offline core), where holding a handle open makes no sense.
pub fn read_node(path: &Path, privileged: &dyn PrivilegedReader) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content.trim().to_string()),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            let bytes = privileged.read(path)?;
            Ok(String::from_utf8_lossy(&bytes).trim().to_string())
        }
        Err(e) => Err(ProbeError::from_io(path, e)),
    }
}

/// Reads a node holding a single signed integer.
pub fn read_node_i64(path: &Path, privileged: &dyn PrivilegedReader) -> Result<i64> {
    let text = read_node(path, privileged)?;
    text.parse::<i64>()
        .map_err(|e| ProbeError::parse(path.display().to_string(), e.to_string()))
}

/// A sysfs attribute re-read on every render.
///
/// Behaves like [`read_node`], except that once the privileged reader has
/// refused the node it is not asked again.
#[derive(Debug, Clone)]
pub struct SysNode {
    path: PathBuf,
    refused: bool,
}

impl SysNode {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            refused: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&mut self, privileged: &dyn PrivilegedReader) -> Result<String> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content.trim().to_string()),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                if self.refused {
                    return Err(ProbeError::AccessDenied(self.path.clone()));
                }
                match privileged.read(&self.path) {
                    Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).trim().to_string()),
                    Err(e) => {
                        debug!("{}: privileged read refused: {}", self.path.display(), e);
                        self.refused = true;
                        Err(e)
                    }
                }
            }
            Err(e) => Err(ProbeError::from_io(&self.path, e)),
        }
    }

    pub fn read_i64(&mut self, privileged: &dyn PrivilegedReader) -> Result<i64> {
        let text = self.read(privileged)?;
        text.parse::<i64>()
            .map_err(|e| ProbeError::parse(self.path.display().to_string(), e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct CountingReader {
        calls: AtomicUsize,
        reply: Option<&'static str>,
    }

    impl PrivilegedReader for CountingReader {
        fn read(&self, path: &Path) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Some(text) => Ok(text.as_bytes().to_vec()),
                None => Err(ProbeError::AccessDenied(path.to_path_buf())),
            }
        }
    }

    #[test]
    fn test_read_all_sees_fresh_content() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("stat");
        fs::write(&path, "first\n").expect("write");

        let mut source = CounterSource::open(&path, Arc::new(Unprivileged)).expect("open");
        assert_eq!(source.read_all().expect("read"), "first\n");

        fs::write(&path, "second value\n").expect("rewrite");
        assert_eq!(source.read_all().expect("read"), "second value\n");
        assert_eq!(source.state(), SourceState::Available);
    }

    #[test]
    fn test_open_missing_is_not_found() {
        let dir = tempdir().expect("Failed to create temp dir");
        let result = CounterSource::open(dir.path().join("absent"), Arc::new(Unprivileged));
        assert!(matches!(result, Err(ProbeError::NotFound(_))));
    }

    #[test]
    fn test_privileged_source_reads_through_reader() {
        let reader = Arc::new(CountingReader {
            calls: AtomicUsize::new(0),
            reply: Some("42\n"),
        });
        let mut source = CounterSource::privileged("/sys/secret", reader.clone());
        assert_eq!(source.read_all().expect("read"), "42\n");
        assert_eq!(source.state(), SourceState::Degraded);
        assert_eq!(reader.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_privileged_read_fails_fast_afterwards() {
        let reader = Arc::new(CountingReader {
            calls: AtomicUsize::new(0),
            reply: None,
        });
        let mut source = CounterSource::privileged("/sys/secret", reader.clone());

        assert!(matches!(source.read_all(), Err(ProbeError::AccessDenied(_))));
        assert_eq!(source.state(), SourceState::Unavailable);

        assert!(matches!(source.read_all(), Err(ProbeError::Unavailable(_))));
        assert_eq!(reader.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_read_error_disables_source() {
        let dir = tempdir().expect("Failed to create temp dir");
        let node = dir.path().join("stat");
        fs::create_dir(&node).expect("mkdir");

        // opening a directory succeeds, reading it fails with EISDIR
        let mut source = CounterSource::open(&node, Arc::new(Unprivileged)).expect("open");
        assert!(matches!(source.read_all(), Err(ProbeError::Io { .. })));
        assert_eq!(source.state(), SourceState::Unavailable);
        assert!(matches!(source.read_all(), Err(ProbeError::Unavailable(_))));
    }

    #[test]
    fn test_invalidate_is_permanent() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("meminfo");
        fs::write(&path, "MemTotal: 1 kB\n").expect("write");

        let mut source = CounterSource::open(&path, Arc::new(Unprivileged)).expect("open");
        source.invalidate();
        assert!(!source.is_available());
        assert!(matches!(source.read_all(), Err(ProbeError::Unavailable(_))));
    }

    #[test]
    fn test_denied_open_falls_back_once() {
        use std::os::unix::fs::PermissionsExt;

        // root ignores file modes, nothing to deny
        if nix::unistd::geteuid().is_root() {
            return;
        }

        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("locked");
        fs::write(&path, "7\n").expect("write");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o000)).expect("chmod");

        let reader = Arc::new(CountingReader {
            calls: AtomicUsize::new(0),
            reply: Some("7\n"),
        });
        let mut source = CounterSource::open(&path, reader.clone()).expect("open");
        assert_eq!(source.state(), SourceState::Degraded);
        assert_eq!(source.read_all().expect("read"), "7\n");
        assert_eq!(reader.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_refused_node_not_escalated_again() {
        use std::os::unix::fs::PermissionsExt;

        // root ignores file modes, nothing to deny
        if nix::unistd::geteuid().is_root() {
            return;
        }

        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("scaling_cur_freq");
        fs::write(&path, "1804800\n").expect("write");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o000)).expect("chmod");

        let reader = CountingReader {
            calls: AtomicUsize::new(0),
            reply: None,
        };
        let mut node = SysNode::new(&path);
        for _ in 0..3 {
            assert!(matches!(node.read_i64(&reader), Err(ProbeError::AccessDenied(_))));
        }
        assert_eq!(reader.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_sys_node_reads_plain_file() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("scaling_governor");
        fs::write(&path, "schedutil\n").expect("write");

        let mut node = SysNode::new(&path);
        assert_eq!(node.read(&Unprivileged).expect("read"), "schedutil");
        assert!(matches!(node.read_i64(&Unprivileged), Err(ProbeError::ParseMismatch { .. })));

        let mut missing = SysNode::new(dir.path().join("online"));
        assert!(matches!(missing.read(&Unprivileged), Err(ProbeError::NotFound(_))));
    }

    #[test]
    fn test_command_reader_argv() {
        let reader = CommandReader::new(vec!["su".into(), "-c".into(), "cat {path}".into()])
            .expect("non-empty argv");
        assert_eq!(
            reader.argv_for(Path::new("/proc/stat")),
            vec!["su", "-c", "cat /proc/stat"]
        );

        let reader = CommandReader::new(vec!["sudo".into(), "-n".into(), "cat".into()])
            .expect("non-empty argv");
        assert_eq!(
            reader.argv_for(Path::new("/proc/stat")),
            vec!["sudo", "-n", "cat", "/proc/stat"]
        );

        assert!(CommandReader::new(vec![]).is_none());
        assert!(CommandReader::new(vec!["  ".into()]).is_none());
    }

    #[test]
    fn test_command_reader_runs_helper() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("node");
        fs::write(&path, "1234\n").expect("write");

        let reader = CommandReader::new(vec!["cat".into()]).expect("argv");
        assert_eq!(reader.read(&path).expect("cat"), b"1234\n");

        let missing = dir.path().join("missing");
        assert!(matches!(
            reader.read(&missing),
            Err(ProbeError::AccessDenied(_))
        ));
    }

    #[test]
    fn test_read_node_i64() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("temp");
        fs::write(&path, "41500\n").expect("write");
        assert_eq!(read_node_i64(&path, &Unprivileged).expect("read"), 41500);

        fs::write(&path, "hot\n").expect("write");
        assert!(matches!(
            read_node_i64(&path, &Unprivileged),
            Err(ProbeError::ParseMismatch { .. })
        ));
    }
}
