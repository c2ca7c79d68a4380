//! 文件系统实例
//!
//! [`MemFs`] 是一次挂载：拥有一个节点仓库和根目录，负责挂载时建立根目录、
//! 统计信息以及卸载时的整体拆除。

use alloc::sync::Arc;

use crate::config::{FS_TYPE, MAX_NAME_LEN, MEMFS_MAGIC, MountOptions};
use crate::error::FsError;
use crate::inode::{FileMode, InodeType};
use crate::node::MemInode;
use crate::ops::fs_ops;
use crate::store::NodeStore;

/// 文件系统统计信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatFs {
    /// 文件系统魔数
    pub magic: u64,
    /// 块大小（单位：字节）
    pub block_size: usize,
    /// 总块数
    pub total_blocks: usize,
    /// 空闲块数
    pub free_blocks: usize,
    /// 可用块数（非特权用户）
    pub available_blocks: usize,
    /// 总 inode 数（0 表示无上限）
    pub total_inodes: usize,
    /// 空闲 inode 数
    pub free_inodes: usize,
    /// 最大文件名长度
    pub max_filename_len: usize,
}

/// 内存文件系统实例
pub struct MemFs {
    store: Arc<NodeStore>,
    root: Arc<MemInode>,
    options: MountOptions,
    mounted: bool,
}

impl MemFs {
    /// 挂载新实例
    ///
    /// 根目录以 `options.mode` 创建。节点分配失败返回 [`FsError::OutOfMemory`]；
    /// `mode` 带有非目录类型位时返回 [`FsError::RootCreationFailed`]。
    /// 失败时不会留下半成品实例。
    pub fn mount(options: MountOptions) -> Result<Self, FsError> {
        let type_bits = options.mode.file_type_bits();
        if type_bits != 0 && type_bits != FileMode::S_IFDIR.bits() {
            log::warn!(
                "memfs: root mode {:o} is not a directory",
                options.mode.bits()
            );
            return Err(FsError::RootCreationFailed);
        }

        let page_size = fs_ops().page_size();
        check_page_size(page_size)?;

        let store = NodeStore::new(&options, page_size);
        let root = store
            .allocate(
                InodeType::Directory,
                Some(options.mode),
                None,
                fs_ops().current_cred(),
            )
            .inspect_err(|e| log::warn!("memfs: failed to allocate root inode: {}", e))?;

        log::info!(
            "memfs: mounted (mode {:o}, size {:?}, nr_inodes {:?})",
            options.mode.permissions().bits(),
            options.max_bytes,
            options.max_inodes
        );

        Ok(Self {
            store,
            root,
            options,
            mounted: true,
        })
    }

    /// 解析挂载数据字符串后挂载
    pub fn mount_with_data(data: &str) -> Result<Self, FsError> {
        Self::mount(MountOptions::parse(data)?)
    }

    /// 根目录
    pub fn root(&self) -> &Arc<MemInode> {
        &self.root
    }

    /// 挂载选项
    pub fn options(&self) -> &MountOptions {
        &self.options
    }

    /// 节点仓库
    pub fn store(&self) -> &Arc<NodeStore> {
        &self.store
    }

    /// 文件系统类型名称
    pub fn fs_type(&self) -> &'static str {
        FS_TYPE
    }

    /// 文件系统魔数
    pub fn magic(&self) -> u64 {
        MEMFS_MAGIC
    }

    /// 同步文件系统
    pub fn sync(&self) -> Result<(), FsError> {
        // 数据完全在内存中，无需同步
        Ok(())
    }

    /// 获取文件系统统计信息
    pub fn statfs(&self) -> Result<StatFs, FsError> {
        let page_size = self.store.page_size();
        let pages = self.store.pages();

        let (total_blocks, free_blocks) = match pages.max_pages() {
            Some(max) => (max, max.saturating_sub(pages.allocated())),
            // 无限制时，使用一个较大的值
            None => {
                let total = usize::MAX / page_size;
                (total, total.saturating_sub(pages.allocated()))
            }
        };

        let (total_inodes, free_inodes) = match self.store.max_inodes() {
            Some(max) => (max, max.saturating_sub(self.store.live_nodes())),
            None => (0, 0),
        };

        Ok(StatFs {
            magic: MEMFS_MAGIC,
            block_size: page_size,
            total_blocks,
            free_blocks,
            available_blocks: free_blocks,
            total_inodes,
            free_inodes,
            max_filename_len: MAX_NAME_LEN,
        })
    }

    /// 卸载
    ///
    /// 总是成功。仍打开的句柄作为异常记录到日志，之后通过它们的操作返回
    /// [`FsError::Stale`]。
    pub fn unmount(mut self) {
        self.teardown();
    }

    /// 检查后卸载：仍有打开的句柄时把实例原样交还，并返回 [`FsError::Busy`]
    pub fn try_unmount(self) -> Result<(), (MemFs, FsError)> {
        let handles = self.store.open_handles();
        if handles > 0 {
            log::debug!("memfs: unmount refused, {} handle(s) open", handles);
            return Err((self, FsError::Busy));
        }
        self.unmount();
        Ok(())
    }

    fn teardown(&mut self) {
        if !self.mounted {
            return;
        }
        self.mounted = false;

        let handles = self.store.open_handles();
        if handles > 0 {
            log::warn!(
                "memfs: unmounting with {} open handle(s), they become stale",
                handles
            );
        }

        let released = self.store.teardown();
        log::info!("memfs: superblock killed, {} inode(s) released", released);
    }
}

/// 宿主提供的页大小必须是 2 的幂，否则无法建立根目录
fn check_page_size(page_size: usize) -> Result<(), FsError> {
    if !page_size.is_power_of_two() {
        log::warn!("memfs: unsupported page size {}", page_size);
        return Err(FsError::RootCreationFailed);
    }
    Ok(())
}

impl Drop for MemFs {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl core::fmt::Debug for MemFs {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemFs")
            .field("options", &self.options)
            .field("store", &self.store)
            .field("mounted", &self.mounted)
            .finish()
    }
}
