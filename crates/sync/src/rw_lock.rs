//! 读写锁实现
//!
//! 允许多个读者同时访问或单个写者独占访问。
//! 使用单个 AtomicUsize 编码状态：[WRITER(1bit)][READERS(余下位)]。
//!
//! # 不变量
//! - WRITER_BIT=1 时，READERS 必须为 0（写者独占）
//! - WRITER_BIT=0 时，READERS 可以 > 0（多读者共享）
//!
//! # 已知限制
//! - 写者饥饿：连续读者可能饿死写者
//! - 不支持锁升级/降级：尝试升级会死锁

use core::{
    hint,
    sync::atomic::{AtomicUsize, Ordering},
};

const WRITER_BIT: usize = 1 << (usize::BITS - 1);
const READER_MASK: usize = WRITER_BIT - 1;

/// 原始读写自旋锁，实现 `lock_api::RawRwLock`。
#[derive(Debug)]
pub struct RawRwSpinLock {
    state: AtomicUsize,
}

impl RawRwSpinLock {
    /// 创建新的原始读写锁
    pub const fn new() -> Self {
        Self {
            state: AtomicUsize::new(0),
        }
    }

    /// 当前读者数量
    pub fn reader_count(&self) -> usize {
        self.state.load(Ordering::Relaxed) & READER_MASK
    }

    /// 是否有写者持有锁
    pub fn is_write_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) & WRITER_BIT != 0
    }
}

impl Default for RawRwSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl lock_api::RawRwLock for RawRwSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self::new();

    type GuardMarker = lock_api::GuardSend;

    fn lock_shared(&self) {
        while !self.try_lock_shared() {
            hint::spin_loop();
        }
    }

    fn try_lock_shared(&self) -> bool {
        let mut state = self.state.load(Ordering::Relaxed);
        loop {
            // 有写者或读者计数将溢出
            if state & WRITER_BIT != 0 || state & READER_MASK == READER_MASK {
                return false;
            }

            match self.state.compare_exchange_weak(
                state,
                state + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(current) => state = current,
            }
        }
    }

    unsafe fn unlock_shared(&self) {
        self.state.fetch_sub(1, Ordering::Release);
    }

    fn lock_exclusive(&self) {
        loop {
            // 先检查 state 是否为 0，减少 CAS 失败时的总线争用
            if self.state.load(Ordering::Relaxed) == 0
                && self
                    .state
                    .compare_exchange_weak(0, WRITER_BIT, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
            {
                return;
            }
            hint::spin_loop();
        }
    }

    fn try_lock_exclusive(&self) -> bool {
        self.state
            .compare_exchange(0, WRITER_BIT, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock_exclusive(&self) {
        self.state.store(0, Ordering::Release);
    }

    fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) != 0
    }

    fn is_locked_exclusive(&self) -> bool {
        self.is_write_locked()
    }
}

/// 读写锁，允许多个读者或单个写者
pub type RwLock<T> = lock_api::RwLock<RawRwSpinLock, T>;

/// 读锁的 RAII 保护器
pub type RwLockReadGuard<'a, T> = lock_api::RwLockReadGuard<'a, RawRwSpinLock, T>;

/// 写锁的 RAII 保护器
pub type RwLockWriteGuard<'a, T> = lock_api::RwLockWriteGuard<'a, RawRwSpinLock, T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rwlock_read_basic() {
        let lock = RwLock::new(42);

        let guard = lock.read();
        assert_eq!(*guard, 42);
        assert_eq!(unsafe { lock.raw() }.reader_count(), 1);
        assert!(!unsafe { lock.raw() }.is_write_locked());

        drop(guard);
        assert_eq!(unsafe { lock.raw() }.reader_count(), 0);
    }

    #[test]
    fn test_rwlock_write_basic() {
        let lock = RwLock::new(100);

        let mut guard = lock.write();
        assert_eq!(*guard, 100);
        assert!(lock.is_locked_exclusive());

        *guard = 200;
        drop(guard);

        assert!(!lock.is_locked());
        assert_eq!(*lock.read(), 200);
    }

    #[test]
    fn test_rwlock_multiple_readers() {
        let lock = RwLock::new(42);

        let guard1 = lock.read();
        let guard2 = lock.read();
        let guard3 = lock.read();
        assert_eq!(unsafe { lock.raw() }.reader_count(), 3);
        assert_eq!(*guard1 + *guard2 + *guard3, 126);

        drop(guard1);
        drop(guard2);
        assert_eq!(unsafe { lock.raw() }.reader_count(), 1);

        drop(guard3);
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_rwlock_writer_excludes_readers() {
        let lock = RwLock::new(0);

        let guard = lock.write();
        // 尝试获取读锁应该失败
        assert!(lock.try_read().is_none());
        assert!(lock.try_write().is_none());
        drop(guard);

        // 释放写锁后应该可以获取读锁
        let read_guard = lock.try_read();
        assert!(read_guard.is_some());
        // 有读者时写锁失败
        assert!(lock.try_write().is_none());
    }
}
