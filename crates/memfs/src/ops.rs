//! FS 运行时操作 trait 定义和注册
//!
//! 此模块定义了文件系统引擎需要的外部依赖接口，通过 trait 抽象实现与宿主框架的解耦。

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::inode::{Cred, TimeSpec};

/// FS 运行时操作
///
/// 此 trait 抽象了引擎需要的宿主能力：页大小配置、墙上时钟和调用者凭据。
/// 宿主需要实现此 trait 并在挂载前注册。
pub trait FsOps: Send + Sync {
    // ========== 配置 ==========

    /// 获取内容缓冲区的页大小（必须是 2 的幂）
    fn page_size(&self) -> usize;

    // ========== 时间 ==========

    /// 获取当前时间
    fn timespec_now(&self) -> TimeSpec;

    // ========== 任务上下文 ==========

    /// 获取当前调用者的凭据（fsuid / fsgid）
    fn current_cred(&self) -> Cred;
}

static FS_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static FS_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册 FS 操作实现
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_fs_ops(ops: &'static dyn FsOps) {
    let ptr = ops as *const dyn FsOps;
    // SAFETY: 将 fat pointer 拆分为 data 和 vtable 两部分存储
    let (data, vtable) = unsafe { core::mem::transmute::<*const dyn FsOps, (usize, usize)>(ptr) };
    FS_OPS_DATA.store(data, Ordering::Release);
    FS_OPS_VTABLE.store(vtable, Ordering::Release);
}

/// 获取已注册的 FS 操作实现
///
/// # Panics
/// 如果尚未调用 [`register_fs_ops`] 注册实现，则 panic
#[inline]
pub fn fs_ops() -> &'static dyn FsOps {
    let data = FS_OPS_DATA.load(Ordering::Acquire);
    let vtable = FS_OPS_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        #[cfg(test)]
        {
            extern crate test_support;
            return &test_support::mock::fs::MOCK_FS_OPS;
        }
        #[cfg(not(test))]
        panic!("memfs: FsOps not registered");
    }
    // SAFETY: 重组 fat pointer
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn FsOps>((data, vtable)) }
}
