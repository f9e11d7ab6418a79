use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use super::error::{Error, Result};
use super::{InterfaceResolver, LOOPBACK_INTERFACE};
use crate::error::ResultOkLogExt;
use crate::stats::InterfaceStats;

/// Number of header lines in `/proc/<pid>/net/dev`.
const LINK_LIST_HEADER_LINES: usize = 2;

/// Reads interface counters of a process' network namespace through procfs.
///
/// For a pid, the namespace is pinned by opening `<proc>/<pid>/ns/net`, and the links of
/// that namespace are listed from `<proc>/<pid>/net/dev`. If the namespace behind the pid
/// changes while the links are read (e.g. because the pid was reused), the result is
/// discarded.
#[derive(Debug, Clone)]
pub struct ProcfsResolver {
    proc_root: PathBuf,
}

impl Default for ProcfsResolver {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcfsResolver {
    /// Creates a resolver reading from the procfs mounted at `proc_root`.
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    pub fn proc_root(&self) -> &Path {
        &self.proc_root
    }

    /// Reads the interface counters of `pid`, excluding loopback.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace or the link list cannot be opened, if any line of
    /// the link list is malformed, or if the namespace changed while reading.
    pub fn try_resolve(&self, pid: u32) -> Result<BTreeMap<String, InterfaceStats>> {
        let namespace = NamespaceHandle::open(&self.proc_root, pid)?;
        let mut links = LinkList::open(&self.proc_root, pid)?;
        let interfaces = links.read_interfaces()?;
        namespace.verify()?;
        Ok(interfaces)
    }
}

impl InterfaceResolver for ProcfsResolver {
    fn resolve_interfaces(&self, pid: u32) -> BTreeMap<String, InterfaceStats> {
        self.try_resolve(pid)
            .ok_log(log::Level::Debug)
            .unwrap_or_default()
    }
}

/// An open handle on the network namespace of a process.
///
/// Holding the handle keeps the namespace alive; it is released when dropped.
#[derive(Debug)]
struct NamespaceHandle {
    pid: u32,
    path: PathBuf,
    file: File,
}

impl NamespaceHandle {
    fn open(proc_root: &Path, pid: u32) -> Result<Self> {
        let path = proc_root.join(pid.to_string()).join("ns/net");
        let file = File::open(&path).map_err(|source| Error::NamespaceOpen {
            pid,
            path: path.clone(),
            source,
        })?;

        Ok(Self { pid, path, file })
    }

    /// Returns the `(device, inode)` pair identifying the namespace.
    fn identity(metadata: &std::fs::Metadata) -> (u64, u64) {
        (metadata.dev(), metadata.ino())
    }

    /// Checks that `pid` still belongs to the namespace this handle was opened on.
    fn verify(&self) -> Result<()> {
        let changed = || Error::NamespaceChanged { pid: self.pid };
        let pinned = self.file.metadata().map_err(|_| changed())?;
        let current = std::fs::metadata(&self.path).map_err(|_| changed())?;

        if Self::identity(&pinned) != Self::identity(&current) {
            return Err(changed());
        }
        Ok(())
    }
}

/// The link listing of a network namespace, as found in `/proc/<pid>/net/dev`.
#[derive(Debug)]
struct LinkList<R> {
    path: PathBuf,
    reader: R,
}

impl LinkList<BufReader<File>> {
    fn open(proc_root: &Path, pid: u32) -> Result<Self> {
        let path = proc_root.join(pid.to_string()).join("net/dev");
        let file = File::open(&path).map_err(|source| Error::LinkListOpen {
            path: path.clone(),
            source,
        })?;

        Ok(Self {
            path,
            reader: BufReader::new(file),
        })
    }
}

impl<R: BufRead> LinkList<R> {
    /// Reads the counters of every link, skipping loopback.
    fn read_interfaces(&mut self) -> Result<BTreeMap<String, InterfaceStats>> {
        let mut interfaces = BTreeMap::new();
        let mut line = String::new();
        let mut lineno = 0;

        for _ in 0..LINK_LIST_HEADER_LINES {
            lineno += 1;
            if self.read_line(&mut line)? == 0 {
                return Err(self.malformed(lineno, "missing header"));
            }
            line.clear();
        }

        while self.read_line(&mut line)? != 0 {
            lineno += 1;
            if !line.trim().is_empty() {
                let stats = parse_interface_line(&line)
                    .map_err(|reason| self.malformed(lineno, reason))?;
                if stats.name != LOOPBACK_INTERFACE {
                    interfaces.insert(stats.name.clone(), stats);
                }
            }
            line.clear();
        }

        Ok(interfaces)
    }

    fn read_line(&mut self, line: &mut String) -> Result<usize> {
        self.reader
            .read_line(line)
            .map_err(|source| Error::LinkListRead {
                path: self.path.clone(),
                source,
            })
    }

    fn malformed(&self, line: usize, reason: &'static str) -> Error {
        Error::MalformedLine {
            path: self.path.clone(),
            line,
            reason,
        }
    }
}

/// Parses a single interface line of `/proc/<pid>/net/dev`.
///
/// The line holds the interface name followed by a colon and sixteen counters: eight
/// receive counters (`bytes packets errs drop fifo frame compressed multicast`) and eight
/// transmit counters (`bytes packets errs drop fifo colls carrier compressed`).
fn parse_interface_line(line: &str) -> std::result::Result<InterfaceStats, &'static str> {
    let (name, data) = line.trim().split_once(':').ok_or("missing interface name")?;
    let name = name.trim();
    if name.is_empty() {
        return Err("missing interface name");
    }

    let mut values = [0u64; 16];
    let mut fields = data.split_whitespace();
    for value in values.iter_mut() {
        *value = fields
            .next()
            .ok_or("too few counters")?
            .parse()
            .map_err(|_| "invalid counter")?;
    }

    let [
        rx_bytes,
        rx_packets,
        rx_errors,
        rx_dropped,
        _rx_fifo,
        _rx_frame,
        _rx_compressed,
        _rx_multicast,
        tx_bytes,
        tx_packets,
        tx_errors,
        tx_dropped,
        ..,
    ] = values;

    Ok(InterfaceStats {
        name: name.to_owned(),
        rx_bytes,
        rx_packets,
        rx_errors,
        rx_dropped,
        tx_bytes,
        tx_packets,
        tx_errors,
        tx_dropped,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    const HEADER: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
";

    fn link_list(body: &str) -> LinkList<Cursor<Vec<u8>>> {
        LinkList {
            path: PathBuf::from("/proc/1/net/dev"),
            reader: Cursor::new(format!("{HEADER}{body}").into_bytes()),
        }
    }

    /// Creates `<root>/<pid>/ns/net` and `<root>/<pid>/net/dev` with the given link list.
    fn fake_proc(pid: u32, net_dev: Option<&str>) -> tempfile::TempDir {
        let root = tempfile::tempdir().expect("failed to create temp dir");
        let pid_dir = root.path().join(pid.to_string());
        std::fs::create_dir_all(pid_dir.join("ns")).unwrap();
        std::fs::write(pid_dir.join("ns/net"), b"").unwrap();
        if let Some(net_dev) = net_dev {
            std::fs::create_dir_all(pid_dir.join("net")).unwrap();
            std::fs::write(pid_dir.join("net/dev"), format!("{HEADER}{net_dev}")).unwrap();
        }
        root
    }

    #[test]
    fn test_parse_interface_line() {
        let stats = parse_interface_line(
            "  eth0: 10240    100     1    2    0     0          0         0  20480   200     3    4    0     0       0          0\n",
        )
        .unwrap();
        assert_eq!(
            stats,
            InterfaceStats {
                name: "eth0".to_owned(),
                rx_bytes: 10240,
                rx_packets: 100,
                rx_errors: 1,
                rx_dropped: 2,
                tx_bytes: 20480,
                tx_packets: 200,
                tx_errors: 3,
                tx_dropped: 4,
            }
        );
    }

    #[test]
    fn test_parse_interface_line_without_space_after_colon() {
        let stats =
            parse_interface_line("eth0:1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16").unwrap();
        assert_eq!(stats.rx_bytes, 1);
        assert_eq!(stats.tx_dropped, 12);
    }

    #[test]
    fn test_parse_interface_line_errors() {
        assert_eq!(
            parse_interface_line("eth0 1 2 3").unwrap_err(),
            "missing interface name"
        );
        assert_eq!(
            parse_interface_line(": 1 2 3").unwrap_err(),
            "missing interface name"
        );
        assert_eq!(
            parse_interface_line("eth0: 123 456").unwrap_err(),
            "too few counters"
        );
        assert_eq!(
            parse_interface_line("eth0: xyz 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0").unwrap_err(),
            "invalid counter"
        );
    }

    #[test]
    fn test_read_interfaces_skips_loopback() {
        let mut links = link_list(
            "    lo: 999 999 0 0 0 0 0 0 999 999 0 0 0 0 0 0
  eth0: 100 200 0 0 0 0 0 0 300 400 0 0 0 0 0 0
  eth1: 10 20 0 0 0 0 0 0 30 40 0 0 0 0 0 0
",
        );
        let interfaces = links.read_interfaces().unwrap();
        assert_eq!(interfaces.len(), 2);
        assert!(!interfaces.contains_key("lo"));
        assert_eq!(interfaces["eth0"].tx_packets, 400);
        assert_eq!(interfaces["eth1"].rx_bytes, 10);
    }

    #[test]
    fn test_read_interfaces_keeps_non_loopback_prefixes() {
        let mut links = link_list(
            "  lo0: 1 1 0 0 0 0 0 0 1 1 0 0 0 0 0 0
  docker0: 2 2 0 0 0 0 0 0 2 2 0 0 0 0 0 0
",
        );
        let interfaces = links.read_interfaces().unwrap();
        assert_eq!(
            interfaces.keys().map(String::as_str).collect::<Vec<_>>(),
            ["docker0", "lo0"]
        );
    }

    #[test]
    fn test_read_interfaces_only_headers() {
        let mut links = link_list("");
        assert!(links.read_interfaces().unwrap().is_empty());
    }

    #[test]
    fn test_read_interfaces_missing_header() {
        let mut links = LinkList {
            path: PathBuf::from("/proc/1/net/dev"),
            reader: &b""[..],
        };
        match links.read_interfaces().unwrap_err() {
            Error::MalformedLine { line, reason, .. } => {
                assert_eq!(line, 1);
                assert_eq!(reason, "missing header");
            }
            err => panic!("expected MalformedLine, got {err:?}"),
        }
    }

    #[test]
    fn test_read_interfaces_malformed_line_fails_whole_listing() {
        let mut links = link_list(
            "  eth0: 100 200 0 0 0 0 0 0 300 400 0 0 0 0 0 0
 badif: 123 456
",
        );
        match links.read_interfaces().unwrap_err() {
            Error::MalformedLine { line, reason, .. } => {
                assert_eq!(line, 4);
                assert_eq!(reason, "too few counters");
            }
            err => panic!("expected MalformedLine, got {err:?}"),
        }
    }

    #[test]
    fn test_resolver_reads_fake_procfs() {
        let root = fake_proc(
            1234,
            Some(
                "    lo: 999 999 0 0 0 0 0 0 999 999 0 0 0 0 0 0
  eth0: 100 200 1 2 0 0 0 0 300 400 3 4 0 0 0 0
",
            ),
        );
        let resolver = ProcfsResolver::new(root.path());
        let interfaces = resolver.resolve_interfaces(1234);
        assert_eq!(interfaces.len(), 1);
        let eth0 = &interfaces["eth0"];
        assert_eq!(eth0.name, "eth0");
        assert_eq!(eth0.rx_errors, 1);
        assert_eq!(eth0.rx_dropped, 2);
        assert_eq!(eth0.tx_errors, 3);
        assert_eq!(eth0.tx_dropped, 4);
    }

    #[test]
    fn test_resolver_unknown_pid_is_empty() {
        let root = fake_proc(1234, Some(""));
        let resolver = ProcfsResolver::new(root.path());

        match resolver.try_resolve(4321).unwrap_err() {
            Error::NamespaceOpen { pid, source, .. } => {
                assert_eq!(pid, 4321);
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            err => panic!("expected NamespaceOpen, got {err:?}"),
        }
        assert!(resolver.resolve_interfaces(4321).is_empty());
    }

    #[test]
    fn test_resolver_missing_link_list_is_empty() {
        let root = fake_proc(1234, None);
        let resolver = ProcfsResolver::new(root.path());

        assert!(matches!(
            resolver.try_resolve(1234).unwrap_err(),
            Error::LinkListOpen { .. }
        ));
        assert!(resolver.resolve_interfaces(1234).is_empty());
    }

    #[test]
    fn test_resolver_malformed_link_list_is_empty() {
        let root = fake_proc(
            1234,
            Some(
                "  eth0: 100 200 0 0 0 0 0 0 300 400 0 0 0 0 0 0
  eth1: broken
",
            ),
        );
        let resolver = ProcfsResolver::new(root.path());
        assert!(resolver.resolve_interfaces(1234).is_empty());
    }

    #[test]
    fn test_namespace_replaced_while_reading() {
        let root = fake_proc(1234, Some(""));
        let handle = NamespaceHandle::open(root.path(), 1234).unwrap();
        assert!(handle.verify().is_ok());

        let ns_path = root.path().join("1234/ns/net");
        std::fs::remove_file(&ns_path).unwrap();
        std::fs::write(&ns_path, b"").unwrap();

        // The pinned file keeps its inode alive, so the replacement gets a new one.
        assert!(matches!(
            handle.verify().unwrap_err(),
            Error::NamespaceChanged { pid: 1234 }
        ));
    }

    #[test]
    fn test_live_procfs_self() {
        // Only meaningful on Linux hosts with a mounted procfs.
        let pid = std::process::id();
        let resolver = ProcfsResolver::default();
        if !resolver.proc_root().join(pid.to_string()).join("net/dev").exists() {
            return;
        }
        let interfaces = resolver.resolve_interfaces(pid);
        assert!(!interfaces.contains_key(LOOPBACK_INTERFACE));
    }
}
