//! Physical directory identity.
//!
//! Two spellings of the same folder (trailing separators, `.` segments,
//! symlinks, junctions, drive aliases) must compare equal when rules are
//! matched, so identity is taken from the filesystem instead of the path
//! string: device + inode on Unix, volume serial + file index on Windows.

use std::fmt;
use std::io;
use std::path::Path;

use crate::error::{EngineError, Result};

/// Volume + file-index tuple identifying one directory on this machine.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirIdentity {
    volume: u64,
    index: u64,
}

impl DirIdentity {
    /// Resolve the identity of an existing path.
    pub fn of(path: &Path) -> Result<Self> {
        identify(path)
            .map(|(volume, index)| Self { volume, index })
            .map_err(|source| EngineError::DirIdentity {
                path: path.to_path_buf(),
                source,
            })
    }
}

impl fmt::Debug for DirIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DirIdentity({:x}:{:x})", self.volume, self.index)
    }
}

/// True when both paths exist and resolve to the same physical directory.
pub fn same_dir(a: &Path, b: &Path) -> bool {
    match (DirIdentity::of(a), DirIdentity::of(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(unix)]
fn identify(path: &Path) -> io::Result<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;

    let meta = std::fs::metadata(path)?;
    Ok((meta.dev(), meta.ino()))
}

#[cfg(windows)]
fn identify(path: &Path) -> io::Result<(u64, u64)> {
    use std::os::windows::fs::OpenOptionsExt;
    use std::os::windows::io::AsRawHandle;

    use windows_sys::Win32::Storage::FileSystem::{
        BY_HANDLE_FILE_INFORMATION, FILE_FLAG_BACKUP_SEMANTICS,
        FILE_SHARE_DELETE, FILE_SHARE_READ, FILE_SHARE_WRITE,
        GetFileInformationByHandle,
    };

    // Directories can only be opened with backup semantics.
    let handle = std::fs::OpenOptions::new()
        .access_mode(0)
        .share_mode(FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE)
        .custom_flags(FILE_FLAG_BACKUP_SEMANTICS)
        .open(path)?;

    // SAFETY: the struct is plain data and fully written on success; the
    // handle stays open for the duration of the call.
    let mut info: BY_HANDLE_FILE_INFORMATION = unsafe { std::mem::zeroed() };
    let ok = unsafe {
        GetFileInformationByHandle(handle.as_raw_handle() as _, &mut info)
    };
    if ok == 0 {
        return Err(io::Error::last_os_error());
    }

    let index =
        (u64::from(info.nFileIndexHigh) << 32) | u64::from(info.nFileIndexLow);
    Ok((u64::from(info.dwVolumeSerialNumber), index))
}

#[cfg(not(any(unix, windows)))]
fn identify(path: &Path) -> io::Result<(u64, u64)> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("directory identity unsupported for {}", path.display()),
    ))
}
