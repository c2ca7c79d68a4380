//! 同步原语
//!
//! 向文件系统引擎提供基本的锁原语：
//!
//! - [`SpinLock`] - 互斥自旋锁，保护 inode 元数据等短临界区
//! - [`RwLock`] - 读写自旋锁，允许并发读者（目录查找、文件读取）
//!
//! 两者都基于原子操作实现原始锁（[`RawSpinLock`] / [`RawRwSpinLock`]），
//! 再由 `lock_api` 提供带 RAII 保护器的数据封装。
//!
//! # 注意
//! 锁均不可重入。在持有锁时再次获取同一把锁将导致死锁。

#![no_std]

mod raw_spin_lock;
mod rw_lock;
mod spin_lock;

pub use raw_spin_lock::RawSpinLock;
pub use rw_lock::{RawRwSpinLock, RwLock, RwLockReadGuard, RwLockWriteGuard};
pub use spin_lock::{SpinLock, SpinLockGuard};
