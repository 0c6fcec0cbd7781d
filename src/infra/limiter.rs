//! # Execution Limiter / 执行限制器
//!
//! Caps how many test executables run at once across independent driver
//! processes on one machine, using advisory file locks in a shared directory.
//! When disabled every acquisition yields a no-op guard.
//!
//! 通过共享目录中的建议性文件锁，限制同一台机器上多个独立驱动进程
//! 同时运行的测试可执行文件数量。禁用时每次获取都得到一个空操作守卫。

use std::fs::{File, OpenOptions, TryLockError};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

use crate::core::config::ExecLimitSettings;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Default)]
pub struct ExecutionLimiter {
    settings: Option<ExecLimitSettings>,
}

/// Held for the lifetime of one executable run. Dropping it releases the slot.
/// 在一次可执行文件运行期间持有；丢弃时释放槽位。
#[derive(Debug)]
pub enum LimitGuard {
    /// The limiter is disabled.
    Unlimited,
    /// A slot lock is held.
    Held { file: File, path: PathBuf },
    /// No slot freed up within the wait bound; the run proceeds unlocked.
    Expired,
}

impl Drop for LimitGuard {
    fn drop(&mut self) {
        if let LimitGuard::Held { file, .. } = self {
            let _ = file.unlock();
        }
    }
}

impl ExecutionLimiter {
    pub fn new(settings: Option<ExecLimitSettings>) -> Self {
        Self { settings }
    }

    /// Waits up to `wait` for a free slot.
    ///
    /// 最多等待 `wait` 时长以获取空闲槽位。
    ///
    /// # Errors
    /// Returns an I/O error when a lock file cannot be created or the file
    /// system does not support locking.
    pub async fn acquire(&self, wait: Duration) -> std::io::Result<LimitGuard> {
        let Some(settings) = &self.settings else {
            return Ok(LimitGuard::Unlimited);
        };
        std::fs::create_dir_all(&settings.dir)?;
        let start = Instant::now();
        loop {
            for slot in 0..settings.slots.max(1) {
                let path = settings.dir.join(format!("sub_test-exec-limit.{slot}.lock"));
                let file = OpenOptions::new()
                    .create(true)
                    .truncate(false)
                    .write(true)
                    .open(&path)?;
                match file.try_lock() {
                    Ok(()) => return Ok(LimitGuard::Held { file, path }),
                    Err(TryLockError::WouldBlock) => {}
                    Err(TryLockError::Error(e)) => return Err(e),
                }
            }
            if start.elapsed() >= wait {
                return Ok(LimitGuard::Expired);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}
