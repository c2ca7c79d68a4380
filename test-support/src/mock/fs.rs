//! FS 相关操作的 Mock 实现
//!
//! 注意：这里不直接依赖 `memfs` crate（避免循环依赖）。
//! `memfs` crate 在 `cfg(test)` 下为这些类型实现其 trait（`FsOps`）。

use core::sync::atomic::{AtomicU64, Ordering};

/// Mock 的 FS 运行时操作
///
/// - 页大小固定为 4096
/// - 时钟每次读取前进 1 纳秒，保证时间戳单调递增
/// - 凭据固定为 root（uid = gid = 0）
pub struct MockFsOps {
    clock_ns: AtomicU64,
    uid: u32,
    gid: u32,
}

impl MockFsOps {
    pub const fn new() -> Self {
        Self {
            clock_ns: AtomicU64::new(1_000_000_000),
            uid: 0,
            gid: 0,
        }
    }

    pub fn page_size(&self) -> usize {
        4096
    }

    /// 读取并推进时钟，返回 (秒, 纳秒)
    pub fn tick(&self) -> (i64, i64) {
        let ns = self.clock_ns.fetch_add(1, Ordering::Relaxed);
        ((ns / 1_000_000_000) as i64, (ns % 1_000_000_000) as i64)
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn gid(&self) -> u32 {
        self.gid
    }
}

impl Default for MockFsOps {
    fn default() -> Self {
        Self::new()
    }
}

/// 全局 Mock 实例
pub static MOCK_FS_OPS: MockFsOps = MockFsOps::new();
