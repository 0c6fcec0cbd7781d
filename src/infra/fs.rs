//! # File System Operations Module / 文件系统操作模块
//!
//! Small file-system helpers used by the driver: executable checks, `PATH`
//! lookup, host name, tolerant removal and byte-for-byte comparison.
//!
//! 驱动使用的文件系统辅助功能：可执行检查、`PATH` 查找、主机名、
//! 容错删除以及逐字节比较。

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Whether `path` is a regular file the current user may execute.
/// `path` 是否为当前用户可执行的普通文件。
pub fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Resolves a program name against `PATH`; names with a directory part are checked directly.
pub fn which(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|full| is_executable(full))
}

/// The machine's host name.
pub fn host_name() -> String {
    #[cfg(unix)]
    {
        let mut buf = [0u8; 256];
        // SAFETY: the buffer is valid for `buf.len()` bytes and gethostname NUL-terminates on success.
        let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
        if rc == 0 {
            let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
            return String::from_utf8_lossy(&buf[..end]).into_owned();
        }
    }
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

/// Removes a file if it is present. A missing file is not an error.
///
/// 如果文件存在则删除。文件不存在不视为错误。
pub async fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Whether a removal failed because something still holds the file open.
pub fn is_resource_busy(error: &std::io::Error) -> bool {
    #[cfg(unix)]
    {
        error.raw_os_error() == Some(libc::EBUSY)
    }
    #[cfg(not(unix))]
    {
        error.kind() == std::io::ErrorKind::ResourceBusy
    }
}

/// Byte-for-byte comparison of two files.
pub async fn files_equal(expected: &Path, actual: &Path) -> Result<bool> {
    let expected_bytes = tokio::fs::read(expected)
        .await
        .with_context(|| format!("Failed to read {}", expected.display()))?;
    let actual_bytes = tokio::fs::read(actual)
        .await
        .with_context(|| format!("Failed to read {}", actual.display()))?;
    Ok(expected_bytes == actual_bytes)
}

/// Whether `path` names a readable regular file.
pub fn is_readable_file(path: &Path) -> bool {
    path.is_file() && std::fs::File::open(path).is_ok()
}
