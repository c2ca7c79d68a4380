//! 节点仓库
//!
//! 每个文件系统实例一个 [`NodeStore`]：分配 inode 编号、执行节点数量与页预算、
//! 持有所有存活节点的强引用，并在卸载时统一拆除。

use alloc::collections::BTreeMap;
use alloc::sync::{Arc, Weak};
use core::sync::atomic::{AtomicUsize, Ordering};

use sync::SpinLock;

use crate::config::MountOptions;
use crate::content::PageBudget;
use crate::error::FsError;
use crate::inode::{Cred, FileMode, InodeType};
use crate::node::{MemInode, NodeMeta};
use crate::ops::fs_ops;

/// 第一个分配出去的 inode 编号（根目录）
const FIRST_INODE_NO: usize = 1;

/// 节点仓库
pub struct NodeStore {
    /// 所有未释放的节点
    nodes: SpinLock<BTreeMap<usize, Arc<MemInode>>>,
    next_inode_no: AtomicUsize,
    max_inodes: Option<usize>,
    pages: PageBudget,
    default_mode: FileMode,
    max_file_size: usize,
    page_size: usize,
    /// 串行化跨目录 rename
    rename_lock: SpinLock<()>,
    self_ref: Weak<NodeStore>,
}

impl NodeStore {
    /// 按挂载选项创建空仓库
    pub fn new(options: &MountOptions, page_size: usize) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            nodes: SpinLock::new(BTreeMap::new()),
            next_inode_no: AtomicUsize::new(FIRST_INODE_NO),
            max_inodes: options.max_inodes,
            pages: PageBudget::new(options.max_pages(page_size)),
            default_mode: options.mode.permissions(),
            max_file_size: options.max_file_size,
            page_size,
            rename_lock: SpinLock::new(()),
            self_ref: self_ref.clone(),
        })
    }

    /// 分配新节点
    ///
    /// 属主规则：uid 取调用者；父目录带 `S_ISGID` 时 gid 继承父目录，
    /// 新目录同时继承 `S_ISGID`；否则 gid 取调用者。
    ///
    /// 节点数量达到上限时返回 [`FsError::OutOfMemory`]。
    pub fn allocate(
        &self,
        inode_type: InodeType,
        mode: Option<FileMode>,
        parent: Option<&MemInode>,
        cred: Cred,
    ) -> Result<Arc<MemInode>, FsError> {
        let mut mode = mode.unwrap_or(self.default_mode).with_type(inode_type);
        let mut gid = cred.gid;
        if let Some(parent) = parent {
            if parent.mode().contains(FileMode::S_ISGID) {
                gid = parent.gid();
                if inode_type == InodeType::Directory {
                    mode |= FileMode::S_ISGID;
                }
            }
        }

        let now = fs_ops().timespec_now();
        let meta = NodeMeta {
            mode,
            uid: cred.uid,
            gid,
            atime: now,
            mtime: now,
            ctime: now,
        };

        let mut nodes = self.nodes.lock();
        if let Some(max) = self.max_inodes {
            if nodes.len() >= max {
                log::debug!("memfs: inode limit {} reached", max);
                return Err(FsError::OutOfMemory);
            }
        }

        let inode_no = self.next_inode_no.fetch_add(1, Ordering::Relaxed);
        let node = MemInode::new(
            inode_no,
            inode_type,
            meta,
            self.page_size,
            self.self_ref.clone(),
        );
        nodes.insert(inode_no, Arc::clone(&node));

        Ok(node)
    }

    /// 按编号查找未释放的节点
    pub fn get(&self, inode_no: usize) -> Option<Arc<MemInode>> {
        self.nodes.lock().get(&inode_no).cloned()
    }

    /// 未释放的节点数量
    pub fn live_nodes(&self) -> usize {
        self.nodes.lock().len()
    }

    /// 所有节点上打开的句柄总数
    pub fn open_handles(&self) -> usize {
        self.nodes
            .lock()
            .values()
            .map(|node| node.open_handles())
            .sum()
    }

    /// 已物化的内容页数
    pub fn allocated_pages(&self) -> usize {
        self.pages.allocated()
    }

    /// 节点数量上限
    pub fn max_inodes(&self) -> Option<usize> {
        self.max_inodes
    }

    /// 内容页预算
    pub fn pages(&self) -> &PageBudget {
        &self.pages
    }

    /// 单个文件大小上限
    pub fn max_file_size(&self) -> usize {
        self.max_file_size
    }

    /// 页大小
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub(crate) fn rename_lock(&self) -> &SpinLock<()> {
        &self.rename_lock
    }

    /// 回收一个已进入 `Released` 状态的节点
    pub(crate) fn release(&self, node: &MemInode) {
        let removed = self.nodes.lock().remove(&node.inode_no());
        if removed.is_none() {
            log::warn!(
                "memfs: releasing inode {} which is not registered",
                node.inode_no()
            );
        }
        node.drop_body(&self.pages);
        log::debug!("memfs: released inode {}", node.inode_no());
    }

    /// 拆除全部节点，返回被回收的节点数
    ///
    /// 之后通过残留句柄进行的操作得到 [`FsError::Stale`]。
    pub(crate) fn teardown(&self) -> usize {
        let nodes = core::mem::take(&mut *self.nodes.lock());
        for node in nodes.values() {
            node.force_release(&self.pages);
        }
        nodes.len()
    }
}

impl core::fmt::Debug for NodeStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NodeStore")
            .field("live_nodes", &self.live_nodes())
            .field("max_inodes", &self.max_inodes)
            .field("pages", &self.pages)
            .field("page_size", &self.page_size)
            .finish()
    }
}
