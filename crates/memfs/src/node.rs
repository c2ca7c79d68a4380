//! 节点（inode）实现
//!
//! [`MemInode`] 是文件系统中的身份单位：普通文件或目录。节点的类型相关部分用
//! [`NodeBody`] 标签联合表示，普通文件持有 [`ContentBuffer`]，目录持有 [`DirectoryTable`]。
//!
//! # 链接数与存活计数
//!
//! - **链接数**：引用该节点的目录项数量。目录创建时为 2（父目录中的目录项 + 自身的 `.`），
//!   每个子目录的 `..` 再为其加 1。
//! - **存活计数**：通过 [`MemInode::open`] 打开的句柄数量。
//!
//! 链接数归零且存活计数为零时节点被释放；仍有句柄时进入 `Unlinked` 状态，
//! 直到最后一个句柄关闭。
//!
//! # 锁顺序
//!
//! 1. 实例的 rename 锁（仅跨目录 rename）
//! 2. 目录表锁：祖先先于后代；两个无祖先关系的目录按 inode 编号升序
//! 3. 内容缓冲区锁
//! 4. 元数据锁、生命周期锁、父指针锁（叶子锁，持有期间不获取其它锁）

use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::ops::Deref;

use sync::{RwLock, SpinLock};

use crate::config::MAX_LINKS;
use crate::content::{ContentBuffer, PageBudget};
use crate::dir::{DirectoryTable, validate_name};
use crate::error::FsError;
use crate::inode::{
    DirEntry, FileMode, InodeMetadata, InodeType, NodeState, SetAttr, TimeSpec,
};
use crate::ops::fs_ops;
use crate::store::NodeStore;

/// 节点的类型相关部分
pub(crate) enum NodeBody {
    /// 普通文件的内容
    File(RwLock<ContentBuffer>),
    /// 目录的子项表
    Directory(RwLock<DirectoryTable>),
}

/// 可变元数据
#[derive(Debug, Clone)]
pub(crate) struct NodeMeta {
    pub(crate) mode: FileMode,
    pub(crate) uid: u32,
    pub(crate) gid: u32,
    pub(crate) atime: TimeSpec,
    pub(crate) mtime: TimeSpec,
    pub(crate) ctime: TimeSpec,
}

/// 链接数、句柄数与状态，三者一起变化
#[derive(Debug)]
struct Lifecycle {
    nlinks: usize,
    handles: usize,
    state: NodeState,
}

/// 内存文件系统节点
pub struct MemInode {
    inode_no: usize,
    inode_type: InodeType,

    /// Inode 元数据
    meta: SpinLock<NodeMeta>,

    lifecycle: SpinLock<Lifecycle>,

    body: NodeBody,

    /// 父目录（弱引用，避免循环引用；仅目录使用）
    parent: SpinLock<Weak<MemInode>>,

    /// 所属节点仓库
    store: Weak<NodeStore>,

    /// 指向自身的弱引用
    self_ref: Weak<MemInode>,
}

impl MemInode {
    /// 创建新节点，由 [`NodeStore::allocate`] 调用
    pub(crate) fn new(
        inode_no: usize,
        inode_type: InodeType,
        meta: NodeMeta,
        page_size: usize,
        store: Weak<NodeStore>,
    ) -> Arc<Self> {
        let body = match inode_type {
            InodeType::File => NodeBody::File(RwLock::new(ContentBuffer::new(page_size))),
            InodeType::Directory => NodeBody::Directory(RwLock::new(DirectoryTable::new())),
        };
        let nlinks = match inode_type {
            InodeType::Directory => 2,
            InodeType::File => 1,
        };

        Arc::new_cyclic(|self_ref| Self {
            inode_no,
            inode_type,
            meta: SpinLock::new(meta),
            lifecycle: SpinLock::new(Lifecycle {
                nlinks,
                handles: 0,
                state: NodeState::Linked,
            }),
            body,
            parent: SpinLock::new(Weak::new()),
            store,
            self_ref: self_ref.clone(),
        })
    }

    /// Inode 编号
    pub fn inode_no(&self) -> usize {
        self.inode_no
    }

    /// 节点类型
    pub fn inode_type(&self) -> InodeType {
        self.inode_type
    }

    /// 是否为目录
    pub fn is_dir(&self) -> bool {
        self.inode_type == InodeType::Directory
    }

    /// 当前链接数
    pub fn nlinks(&self) -> usize {
        self.lifecycle.lock().nlinks
    }

    /// 当前打开的句柄数
    pub fn open_handles(&self) -> usize {
        self.lifecycle.lock().handles
    }

    /// 生命周期状态
    pub fn state(&self) -> NodeState {
        self.lifecycle.lock().state
    }

    /// 文件大小（目录为 0）
    pub fn size(&self) -> usize {
        match &self.body {
            NodeBody::File(content) => content.read().size(),
            NodeBody::Directory(_) => 0,
        }
    }

    /// 打开节点，返回增加存活计数的句柄
    pub fn open(self: &Arc<Self>) -> Result<InodeHandle, FsError> {
        let mut lc = self.lifecycle.lock();
        if lc.state == NodeState::Released {
            return Err(FsError::Stale);
        }
        lc.handles += 1;
        drop(lc);

        Ok(InodeHandle {
            node: Arc::clone(self),
        })
    }

    /// 获取文件元数据
    pub fn metadata(&self) -> Result<InodeMetadata, FsError> {
        let (nlinks, state) = {
            let lc = self.lifecycle.lock();
            (lc.nlinks, lc.state)
        };
        if state == NodeState::Released {
            return Err(FsError::Stale);
        }

        let (size, blocks) = match &self.body {
            NodeBody::File(content) => {
                let content = content.read();
                let bytes = content.materialized_pages() * content.page_size();
                (content.size(), bytes / 512)
            }
            NodeBody::Directory(_) => (0, 0),
        };
        let meta = self.meta.lock().clone();

        Ok(InodeMetadata {
            inode_no: self.inode_no,
            inode_type: self.inode_type,
            mode: meta.mode,
            uid: meta.uid,
            gid: meta.gid,
            size,
            atime: meta.atime,
            mtime: meta.mtime,
            ctime: meta.ctime,
            nlinks,
            blocks,
        })
    }

    // ========== 目录操作 ==========

    /// 在目录中查找子项
    ///
    /// `.` 返回自身，`..` 返回父目录（根目录返回自身）。
    pub fn lookup(&self, name: &str) -> Result<Arc<MemInode>, FsError> {
        let table = self.dir()?;
        self.ensure_live()?;

        match name {
            "." => self.self_ref.upgrade().ok_or(FsError::Stale),
            ".." => match self.parent() {
                Some(parent) => Ok(parent),
                None => self.self_ref.upgrade().ok_or(FsError::Stale),
            },
            _ => table.read().get(name).cloned().ok_or(FsError::NotFound),
        }
    }

    /// 在目录中创建普通文件，`mode` 为 `None` 时使用实例默认权限
    pub fn create(&self, name: &str, mode: Option<FileMode>) -> Result<Arc<MemInode>, FsError> {
        self.create_child(name, InodeType::File, mode)
    }

    /// 在目录中创建子目录，`mode` 为 `None` 时使用实例默认权限
    pub fn mkdir(&self, name: &str, mode: Option<FileMode>) -> Result<Arc<MemInode>, FsError> {
        self.create_child(name, InodeType::Directory, mode)
    }

    /// 在目录中创建指定类型的子节点
    pub fn create_child(
        &self,
        name: &str,
        inode_type: InodeType,
        mode: Option<FileMode>,
    ) -> Result<Arc<MemInode>, FsError> {
        let table_lock = self.dir()?;
        validate_name(name)?;
        let store = self.store()?;

        let mut table = table_lock.write();
        self.ensure_linked()?;

        if table.contains(name) {
            return Err(FsError::AlreadyExists);
        }
        if inode_type == InodeType::Directory && self.nlinks() >= MAX_LINKS {
            return Err(FsError::TooManyLinks);
        }

        let cred = fs_ops().current_cred();
        let child = store.allocate(inode_type, mode, Some(self), cred)?;

        if inode_type == InodeType::Directory {
            *child.parent.lock() = self.self_ref.clone();
            // 子目录的 `..`
            self.lifecycle.lock().nlinks += 1;
        }
        table.insert(name, Arc::clone(&child))?;
        drop(table);

        self.touch_mtime();
        log::debug!(
            "memfs: created {:?} '{}' (ino {}) in ino {}",
            inode_type,
            name,
            child.inode_no,
            self.inode_no
        );

        Ok(child)
    }

    /// 为已有节点创建硬链接
    ///
    /// 目录不能被硬链接（单父节点树语义）。
    pub fn link(&self, name: &str, target: &Arc<MemInode>) -> Result<(), FsError> {
        let table_lock = self.dir()?;
        validate_name(name)?;
        if target.is_dir() {
            return Err(FsError::NotPermitted);
        }
        let store = self.store()?;
        if !target.belongs_to(&store) {
            return Err(FsError::CrossDevice);
        }

        let mut table = table_lock.write();
        self.ensure_linked()?;

        if table.contains(name) {
            return Err(FsError::AlreadyExists);
        }
        target.inc_link()?;
        table.insert(name, Arc::clone(target))?;
        drop(table);

        target.touch_ctime();
        self.touch_mtime();
        log::debug!(
            "memfs: linked '{}' -> ino {} in ino {}",
            name,
            target.inode_no,
            self.inode_no
        );

        Ok(())
    }

    /// 删除普通文件的目录项
    ///
    /// 链接数归零且没有打开的句柄时，节点被释放。
    pub fn unlink(&self, name: &str) -> Result<(), FsError> {
        let table_lock = self.dir()?;
        validate_name(name)?;
        self.ensure_live()?;

        let mut table = table_lock.write();

        match table.get(name) {
            None => return Err(FsError::NotFound),
            Some(child) if child.is_dir() => return Err(FsError::IsDirectory),
            Some(_) => {}
        }
        let child = table.remove(name).ok_or(FsError::NotFound)?;

        child.touch_ctime();
        if child.dec_links(1) {
            child.release();
        }
        drop(table);

        self.touch_mtime();
        log::debug!(
            "memfs: unlinked '{}' (ino {}) from ino {}",
            name,
            child.inode_no,
            self.inode_no
        );

        Ok(())
    }

    /// 删除空子目录
    pub fn rmdir(&self, name: &str) -> Result<(), FsError> {
        let table_lock = self.dir()?;
        validate_name(name)?;
        self.ensure_live()?;

        let mut table = table_lock.write();

        let child = table.get(name).cloned().ok_or(FsError::NotFound)?;
        let child_table = child.dir()?;

        let release = {
            // 持有子目录读锁直到它脱离目录树，防止并发创建
            let child_table = child_table.read();
            if !child_table.is_empty() {
                return Err(FsError::DirectoryNotEmpty);
            }
            table.remove(name);
            self.dec_subdir_link();
            child.clear_links()
        };
        drop(table);

        if release {
            child.release();
        }
        self.touch_mtime();
        log::debug!(
            "memfs: removed directory '{}' (ino {}) from ino {}",
            name,
            child.inode_no,
            self.inode_no
        );

        Ok(())
    }

    /// 重命名 / 移动（原子操作）
    ///
    /// - 源不存在返回 [`FsError::NotFound`]
    /// - 目标已存在时，类型必须兼容（目录只能替换空目录，文件只能替换文件）
    /// - 目录不能移动到自身或其后代之下
    /// - 源与目标是同一节点时什么也不做
    ///
    /// 所有检查都在修改之前完成，失败时状态与调用前一致。
    pub fn rename(
        &self,
        old_name: &str,
        new_parent: &Arc<MemInode>,
        new_name: &str,
    ) -> Result<(), FsError> {
        let old_table_lock = self.dir()?;
        let new_table_lock = new_parent.dir()?;
        validate_name(old_name)?;
        validate_name(new_name)?;
        let store = self.store()?;
        if !new_parent.belongs_to(&store) {
            return Err(FsError::CrossDevice);
        }

        if core::ptr::eq(self, &**new_parent) {
            let mut table = old_table_lock.write();
            return self.rename_locked(&mut *table, None, old_name, new_parent, new_name);
        }

        // 跨目录：串行化所有跨目录 rename，使祖先关系在持锁期间保持稳定
        let _rename_guard = store.rename_lock().lock();

        let self_first = if new_parent.is_descendant_of(self) {
            true
        } else if self.is_descendant_of(new_parent) {
            false
        } else {
            self.inode_no < new_parent.inode_no
        };

        let (mut old_table, mut new_table) = if self_first {
            let old_table = old_table_lock.write();
            let new_table = new_table_lock.write();
            (old_table, new_table)
        } else {
            let new_table = new_table_lock.write();
            let old_table = old_table_lock.write();
            (old_table, new_table)
        };

        self.rename_locked(
            &mut *old_table,
            Some(&mut *new_table),
            old_name,
            new_parent,
            new_name,
        )
    }

    /// 持有目录表锁后的 rename 主体；`new_table` 为 `None` 表示同目录
    fn rename_locked(
        &self,
        old_table: &mut DirectoryTable,
        new_table: Option<&mut DirectoryTable>,
        old_name: &str,
        new_parent: &Arc<MemInode>,
        new_name: &str,
    ) -> Result<(), FsError> {
        self.ensure_linked()?;
        new_parent.ensure_linked()?;

        let same_dir = new_table.is_none();
        let source = old_table.get(old_name).cloned().ok_or(FsError::NotFound)?;
        let target = match new_table.as_deref() {
            Some(table) => table.get(new_name).cloned(),
            None => old_table.get(new_name).cloned(),
        };

        if let Some(target) = &target {
            if Arc::ptr_eq(target, &source) {
                return Ok(());
            }
        }

        if source.is_dir() && !same_dir {
            if core::ptr::eq(&*source, &**new_parent) || new_parent.is_descendant_of(&source) {
                return Err(FsError::InvalidArgument);
            }
            if target.is_none() && new_parent.nlinks() >= MAX_LINKS {
                return Err(FsError::TooManyLinks);
            }
        }

        if let Some(target) = &target {
            match (source.is_dir(), target.is_dir()) {
                (true, false) => return Err(FsError::NotDirectory),
                (false, true) => return Err(FsError::IsDirectory),
                (true, true) => target.ensure_empty_target(self)?,
                (false, false) => {}
            }
        }

        // ---- 以下不再失败 ----
        old_table.remove(old_name);
        let dest = match new_table {
            Some(table) => table,
            None => old_table,
        };

        if let Some(replaced) = dest.remove(new_name) {
            let release = if replaced.is_dir() {
                new_parent.dec_subdir_link();
                replaced.clear_links()
            } else {
                replaced.dec_links(1)
            };
            replaced.touch_ctime();
            if release {
                replaced.release();
            }
        }
        dest.insert(new_name, Arc::clone(&source))?;

        if source.is_dir() && !same_dir {
            self.dec_subdir_link();
            new_parent.lifecycle.lock().nlinks += 1;
            *source.parent.lock() = Arc::downgrade(new_parent);
        }

        source.touch_ctime();
        self.touch_mtime();
        if !same_dir {
            new_parent.touch_mtime();
        }
        log::debug!(
            "memfs: renamed '{}' (ino {}) in ino {} to '{}' in ino {}",
            old_name,
            source.inode_no,
            self.inode_no,
            new_name,
            new_parent.inode_no
        );

        Ok(())
    }

    /// 列出目录内容：`.`、`..`，然后按名字排序的子项
    pub fn readdir(&self) -> Result<Vec<DirEntry>, FsError> {
        let table = self.dir()?;
        self.ensure_live()?;

        let parent_inode_no = self
            .parent()
            .map(|parent| parent.inode_no)
            .unwrap_or(self.inode_no);

        let table = table.read();
        let mut entries = Vec::with_capacity(table.len() + 2);

        entries.push(DirEntry {
            name: String::from("."),
            inode_no: self.inode_no,
            inode_type: InodeType::Directory,
        });
        entries.push(DirEntry {
            name: String::from(".."),
            inode_no: parent_inode_no,
            inode_type: InodeType::Directory,
        });

        for (name, child) in table.iter() {
            entries.push(DirEntry {
                name: String::from(name),
                inode_no: child.inode_no,
                inode_type: child.inode_type,
            });
        }

        Ok(entries)
    }

    // ========== 文件操作 ==========

    /// 从指定偏移量读取数据
    ///
    /// 读取长度被截断到文件末尾；偏移超出文件大小时返回 0。
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, FsError> {
        let content = self.content()?;
        self.ensure_live()?;

        let bytes_read = content.read().read(offset, buf);
        self.meta.lock().atime = fs_ops().timespec_now();

        Ok(bytes_read)
    }

    /// 向指定偏移量写入数据
    ///
    /// 超出单文件大小上限的部分被截掉；偏移本身已达上限时返回 [`FsError::FileTooLarge`]。
    pub fn write_at(&self, offset: usize, data: &[u8]) -> Result<usize, FsError> {
        let content = self.content()?;
        let store = self.store()?;
        self.ensure_live()?;
        if data.is_empty() {
            return Ok(0);
        }

        let limit = store.max_file_size();
        if offset >= limit {
            return Err(FsError::FileTooLarge);
        }
        let data = &data[..data.len().min(limit - offset)];

        let mut content = content.write();
        self.ensure_live()?;
        let bytes_written = content.write(offset, data, store.pages())?;
        drop(content);

        self.touch_mtime();
        Ok(bytes_written)
    }

    /// 截断文件到指定大小
    pub fn truncate(&self, size: usize) -> Result<(), FsError> {
        self.setattr(SetAttr {
            size: Some(size),
            ..SetAttr::default()
        })
    }

    // ========== 属性操作 ==========

    /// 修改属性
    ///
    /// 权限修改保留类型位；任何修改都会刷新 ctime，大小变化还会刷新 mtime。
    pub fn setattr(&self, attr: SetAttr) -> Result<(), FsError> {
        let store = self.store()?;
        self.ensure_live()?;

        if let Some(size) = attr.size {
            let content = self.content()?;
            if size > store.max_file_size() {
                return Err(FsError::FileTooLarge);
            }
            let mut content = content.write();
            self.ensure_live()?;
            content.truncate(size, store.pages());
        }

        let now = fs_ops().timespec_now();
        let mut meta = self.meta.lock();
        if let Some(mode) = attr.mode {
            meta.mode = mode.with_type(self.inode_type);
        }
        if let Some(uid) = attr.uid {
            meta.uid = uid;
        }
        if let Some(gid) = attr.gid {
            meta.gid = gid;
        }
        if let Some(atime) = attr.atime {
            meta.atime = atime;
        }
        match attr.mtime {
            Some(mtime) => meta.mtime = mtime,
            None if attr.size.is_some() => meta.mtime = now,
            None => {}
        }
        meta.ctime = now;

        Ok(())
    }

    /// 修改文件权限模式
    pub fn chmod(&self, mode: FileMode) -> Result<(), FsError> {
        self.setattr(SetAttr {
            mode: Some(mode),
            ..SetAttr::default()
        })
    }

    /// 修改文件所有者和组
    pub fn chown(&self, uid: u32, gid: u32) -> Result<(), FsError> {
        self.setattr(SetAttr {
            uid: Some(uid),
            gid: Some(gid),
            ..SetAttr::default()
        })
    }

    /// 设置文件时间戳
    pub fn set_times(&self, atime: Option<TimeSpec>, mtime: Option<TimeSpec>) -> Result<(), FsError> {
        self.setattr(SetAttr {
            atime,
            mtime,
            ..SetAttr::default()
        })
    }

    // ========== 内部辅助 ==========

    fn dir(&self) -> Result<&RwLock<DirectoryTable>, FsError> {
        match &self.body {
            NodeBody::Directory(table) => Ok(table),
            NodeBody::File(_) => Err(FsError::NotDirectory),
        }
    }

    fn content(&self) -> Result<&RwLock<ContentBuffer>, FsError> {
        match &self.body {
            NodeBody::File(content) => Ok(content),
            NodeBody::Directory(_) => Err(FsError::IsDirectory),
        }
    }

    fn store(&self) -> Result<Arc<NodeStore>, FsError> {
        self.store.upgrade().ok_or(FsError::Stale)
    }

    /// 是否属于给定的节点仓库（同一文件系统实例）
    pub(crate) fn belongs_to(&self, store: &Arc<NodeStore>) -> bool {
        core::ptr::eq(self.store.as_ptr(), Arc::as_ptr(store))
    }

    pub(crate) fn mode(&self) -> FileMode {
        self.meta.lock().mode
    }

    pub(crate) fn gid(&self) -> u32 {
        self.meta.lock().gid
    }

    fn parent(&self) -> Option<Arc<MemInode>> {
        self.parent.lock().upgrade()
    }

    /// 是否位于 `ancestor` 之下（沿父指针向上查找）
    fn is_descendant_of(&self, ancestor: &MemInode) -> bool {
        let mut cur = self.parent();
        while let Some(node) = cur {
            if core::ptr::eq(&*node, ancestor) {
                return true;
            }
            cur = node.parent();
        }
        false
    }

    /// 已释放的节点不能再操作
    fn ensure_live(&self) -> Result<(), FsError> {
        match self.state() {
            NodeState::Released => Err(FsError::Stale),
            _ => Ok(()),
        }
    }

    /// 只有仍在目录树中的目录才能增加子项
    fn ensure_linked(&self) -> Result<(), FsError> {
        match self.state() {
            NodeState::Linked => Ok(()),
            NodeState::Unlinked => Err(FsError::NotFound),
            NodeState::Released => Err(FsError::Stale),
        }
    }

    /// 作为 rename 目标被替换的目录必须为空
    ///
    /// 目标是源的祖先（例如源所在目录本身）时必然非空，此时不加锁直接拒绝，
    /// 避免逆着树的方向获取目录锁。
    fn ensure_empty_target(&self, old_parent: &MemInode) -> Result<(), FsError> {
        if core::ptr::eq(self, old_parent) || old_parent.is_descendant_of(self) {
            return Err(FsError::DirectoryNotEmpty);
        }
        if !self.dir()?.read().is_empty() {
            return Err(FsError::DirectoryNotEmpty);
        }
        Ok(())
    }

    fn inc_link(&self) -> Result<(), FsError> {
        let mut lc = self.lifecycle.lock();
        match lc.state {
            NodeState::Linked => {}
            NodeState::Unlinked => return Err(FsError::NotFound),
            NodeState::Released => return Err(FsError::Stale),
        }
        if lc.nlinks >= MAX_LINKS {
            return Err(FsError::TooManyLinks);
        }
        lc.nlinks += 1;
        Ok(())
    }

    /// 减少链接数，返回调用者是否需要释放该节点
    fn dec_links(&self, count: usize) -> bool {
        let mut lc = self.lifecycle.lock();
        lc.nlinks = lc.nlinks.saturating_sub(count);
        if lc.nlinks != 0 || lc.state != NodeState::Linked {
            return false;
        }
        if lc.handles == 0 {
            lc.state = NodeState::Released;
            true
        } else {
            lc.state = NodeState::Unlinked;
            false
        }
    }

    /// 目录脱离目录树：目录项与自身的 `.` 一起移除
    fn clear_links(&self) -> bool {
        let nlinks = self.nlinks();
        self.dec_links(nlinks)
    }

    /// 子目录离开时去掉其 `..` 贡献的链接
    fn dec_subdir_link(&self) {
        let mut lc = self.lifecycle.lock();
        lc.nlinks = lc.nlinks.saturating_sub(1);
    }

    /// 关闭一个句柄
    fn close(&self) {
        let release = {
            let mut lc = self.lifecycle.lock();
            lc.handles = lc.handles.saturating_sub(1);
            if lc.handles == 0 && lc.state == NodeState::Unlinked {
                lc.state = NodeState::Released;
                true
            } else {
                false
            }
        };
        if release {
            self.release();
        }
    }

    /// 释放节点（状态已被置为 `Released`）
    fn release(&self) {
        match self.store.upgrade() {
            Some(store) => store.release(self),
            None => log::warn!(
                "memfs: inode {} released after its instance was torn down",
                self.inode_no
            ),
        }
    }

    /// 卸载时强制释放，不论链接数与句柄
    pub(crate) fn force_release(&self, pages: &PageBudget) {
        {
            let mut lc = self.lifecycle.lock();
            lc.nlinks = 0;
            lc.state = NodeState::Released;
        }
        self.drop_body(pages);
    }

    /// 回收内容存储；目录则拆除其目录表
    pub(crate) fn drop_body(&self, pages: &PageBudget) {
        match &self.body {
            NodeBody::File(content) => {
                content.write().clear(pages);
            }
            NodeBody::Directory(table) => {
                let children = table.write().drain();
                drop(children);
                *self.parent.lock() = Weak::new();
            }
        }
    }

    fn touch_mtime(&self) {
        let now = fs_ops().timespec_now();
        let mut meta = self.meta.lock();
        meta.mtime = now;
        meta.ctime = now;
    }

    fn touch_ctime(&self) {
        let now = fs_ops().timespec_now();
        self.meta.lock().ctime = now;
    }
}

impl core::fmt::Debug for MemInode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemInode")
            .field("inode_no", &self.inode_no)
            .field("inode_type", &self.inode_type)
            .field("lifecycle", &*self.lifecycle.lock())
            .finish()
    }
}

/// 打开的节点句柄
///
/// 持有期间节点不会被物理释放（即使链接数已归零）；Drop 时关闭。
pub struct InodeHandle {
    node: Arc<MemInode>,
}

impl InodeHandle {
    /// 句柄引用的节点
    pub fn inode(&self) -> &Arc<MemInode> {
        &self.node
    }
}

impl Deref for InodeHandle {
    type Target = MemInode;

    fn deref(&self) -> &MemInode {
        &self.node
    }
}

impl Drop for InodeHandle {
    fn drop(&mut self) {
        self.node.close();
    }
}

impl core::fmt::Debug for InodeHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("InodeHandle").field(&self.node.inode_no).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MountOptions;
    use crate::fs::MemFs;

    fn mount() -> MemFs {
        MemFs::mount(MountOptions::default()).unwrap()
    }

    fn names(dir: &MemInode) -> Vec<String> {
        dir.readdir().unwrap().into_iter().map(|e| e.name).collect()
    }

    #[test]
    fn test_lookup_dot_and_dotdot() {
        let fs = mount();
        let root = fs.root();
        let sub = root.mkdir("sub", None).unwrap();

        assert!(Arc::ptr_eq(&root.lookup(".").unwrap(), root));
        assert!(Arc::ptr_eq(&root.lookup("..").unwrap(), root));
        assert!(Arc::ptr_eq(&sub.lookup("..").unwrap(), root));
        assert!(Arc::ptr_eq(&root.lookup("sub").unwrap(), &sub));
        assert_eq!(root.lookup("SUB").unwrap_err(), FsError::NotFound);
    }

    #[test]
    fn test_create_and_collision() {
        let fs = mount();
        let root = fs.root();
        let file = root.create("a", None).unwrap();

        assert_eq!(file.inode_type(), InodeType::File);
        assert_eq!(file.nlinks(), 1);
        assert_eq!(file.metadata().unwrap().mode.bits(), 0o100775);
        assert_eq!(root.create("a", None).unwrap_err(), FsError::AlreadyExists);
        assert_eq!(root.mkdir("a", None).unwrap_err(), FsError::AlreadyExists);
        assert_eq!(root.create("", None).unwrap_err(), FsError::InvalidArgument);
        assert_eq!(file.create("b", None).unwrap_err(), FsError::NotDirectory);
    }

    #[test]
    fn test_mkdir_link_counts() {
        let fs = mount();
        let root = fs.root();
        assert_eq!(root.nlinks(), 2);

        let a = root.mkdir("a", None).unwrap();
        let _b = root.mkdir("b", None).unwrap();
        assert_eq!(a.nlinks(), 2);
        assert_eq!(root.nlinks(), 4);

        root.rmdir("b").unwrap();
        assert_eq!(root.nlinks(), 3);
    }

    #[test]
    fn test_readdir_order() {
        let fs = mount();
        let root = fs.root();
        root.create("zeta", None).unwrap();
        root.mkdir("alpha", None).unwrap();
        root.create("mid", None).unwrap();

        assert_eq!(names(root), [".", "..", "alpha", "mid", "zeta"]);

        let entries = root.readdir().unwrap();
        assert_eq!(entries[0].inode_no, root.inode_no());
        assert_eq!(entries[1].inode_no, root.inode_no());
        assert_eq!(entries[2].inode_type, InodeType::Directory);
    }

    #[test]
    fn test_link_and_unlink() {
        let fs = mount();
        let root = fs.root();
        let dir = root.mkdir("d", None).unwrap();
        let file = root.create("f", None).unwrap();

        dir.link("g", &file).unwrap();
        assert_eq!(file.nlinks(), 2);
        assert!(Arc::ptr_eq(&dir.lookup("g").unwrap(), &file));

        assert_eq!(root.link("x", &dir).unwrap_err(), FsError::NotPermitted);
        assert_eq!(root.link("d", &file).unwrap_err(), FsError::AlreadyExists);

        root.unlink("f").unwrap();
        assert_eq!(file.nlinks(), 1);
        assert_eq!(file.state(), NodeState::Linked);

        dir.unlink("g").unwrap();
        assert_eq!(file.nlinks(), 0);
        assert_eq!(file.state(), NodeState::Released);
        assert_eq!(dir.lookup("g").unwrap_err(), FsError::NotFound);
    }

    #[test]
    fn test_link_across_instances() {
        let fs1 = mount();
        let fs2 = mount();
        let file = fs1.root().create("f", None).unwrap();
        assert_eq!(fs2.root().link("f", &file).unwrap_err(), FsError::CrossDevice);
        assert_eq!(
            fs1.root().rename("f", fs2.root(), "f").unwrap_err(),
            FsError::CrossDevice
        );
    }

    #[test]
    fn test_unlink_errors() {
        let fs = mount();
        let root = fs.root();
        root.mkdir("d", None).unwrap();
        assert_eq!(root.unlink("missing").unwrap_err(), FsError::NotFound);
        assert_eq!(root.unlink("d").unwrap_err(), FsError::IsDirectory);
    }

    #[test]
    fn test_unlink_with_open_handle() {
        let fs = mount();
        let root = fs.root();
        let file = root.create("f", None).unwrap();
        file.write_at(0, b"still here").unwrap();

        let handle = file.open().unwrap();
        root.unlink("f").unwrap();
        assert_eq!(file.state(), NodeState::Unlinked);
        assert_eq!(fs.store().live_nodes(), 2);

        let mut buf = [0u8; 10];
        assert_eq!(handle.read_at(0, &mut buf).unwrap(), 10);
        assert_eq!(&buf, b"still here");
        // 无链接的节点不能再被链接
        assert_eq!(root.link("f2", &file).unwrap_err(), FsError::NotFound);

        drop(handle);
        assert_eq!(file.state(), NodeState::Released);
        assert_eq!(fs.store().live_nodes(), 1);
        assert_eq!(fs.store().allocated_pages(), 0);
    }

    #[test]
    fn test_rmdir() {
        let fs = mount();
        let root = fs.root();
        let dir = root.mkdir("d", None).unwrap();
        dir.create("f", None).unwrap();
        root.create("file", None).unwrap();

        assert_eq!(root.rmdir("d").unwrap_err(), FsError::DirectoryNotEmpty);
        assert_eq!(root.rmdir("file").unwrap_err(), FsError::NotDirectory);
        assert_eq!(root.rmdir("nope").unwrap_err(), FsError::NotFound);

        dir.unlink("f").unwrap();
        root.rmdir("d").unwrap();
        assert_eq!(dir.nlinks(), 0);
        assert_eq!(dir.state(), NodeState::Released);
        assert_eq!(root.nlinks(), 2);
    }

    #[test]
    fn test_removed_directory_refuses_new_entries() {
        let fs = mount();
        let root = fs.root();
        let dir = root.mkdir("d", None).unwrap();
        let handle = dir.open().unwrap();

        root.rmdir("d").unwrap();
        assert_eq!(dir.state(), NodeState::Unlinked);
        assert_eq!(handle.create("f", None).unwrap_err(), FsError::NotFound);
        assert_eq!(names(&handle), [".", ".."]);
    }

    #[test]
    fn test_rename_same_directory() {
        let fs = mount();
        let root = fs.root();
        let file = root.create("a", None).unwrap();

        root.rename("a", root, "b").unwrap();
        assert_eq!(root.lookup("a").unwrap_err(), FsError::NotFound);
        assert!(Arc::ptr_eq(&root.lookup("b").unwrap(), &file));
        assert_eq!(file.nlinks(), 1);
    }

    #[test]
    fn test_rename_onto_same_node_is_noop() {
        let fs = mount();
        let root = fs.root();
        let file = root.create("a", None).unwrap();
        root.link("b", &file).unwrap();

        root.rename("a", root, "b").unwrap();
        assert!(root.lookup("a").is_ok());
        assert!(root.lookup("b").is_ok());
        assert_eq!(file.nlinks(), 2);
    }

    #[test]
    fn test_rename_replaces_file() {
        let fs = mount();
        let root = fs.root();
        let dir = root.mkdir("d", None).unwrap();
        let src = root.create("src", None).unwrap();
        let victim = dir.create("dst", None).unwrap();

        root.rename("src", &dir, "dst").unwrap();
        assert!(Arc::ptr_eq(&dir.lookup("dst").unwrap(), &src));
        assert_eq!(victim.state(), NodeState::Released);
        assert_eq!(src.nlinks(), 1);
    }

    #[test]
    fn test_rename_type_mismatch() {
        let fs = mount();
        let root = fs.root();
        root.mkdir("dir", None).unwrap();
        root.create("file", None).unwrap();

        assert_eq!(root.rename("dir", root, "file").unwrap_err(), FsError::NotDirectory);
        assert_eq!(root.rename("file", root, "dir").unwrap_err(), FsError::IsDirectory);
        assert_eq!(root.rename("missing", root, "x").unwrap_err(), FsError::NotFound);
        // 失败不留下任何修改
        assert_eq!(names(root), [".", "..", "dir", "file"]);
    }

    #[test]
    fn test_rename_directory_moves_dotdot() {
        let fs = mount();
        let root = fs.root();
        let a = root.mkdir("a", None).unwrap();
        let b = root.mkdir("b", None).unwrap();
        let moved = a.mkdir("m", None).unwrap();
        assert_eq!(a.nlinks(), 3);

        a.rename("m", &b, "m").unwrap();
        assert_eq!(a.nlinks(), 2);
        assert_eq!(b.nlinks(), 3);
        assert_eq!(moved.nlinks(), 2);
        assert!(Arc::ptr_eq(&moved.lookup("..").unwrap(), &b));
    }

    #[test]
    fn test_rename_directory_over_empty_directory() {
        let fs = mount();
        let root = fs.root();
        let src = root.mkdir("src", None).unwrap();
        let dst = root.mkdir("dst", None).unwrap();
        assert_eq!(root.nlinks(), 4);

        root.rename("src", root, "dst").unwrap();
        assert_eq!(root.nlinks(), 3);
        assert_eq!(dst.state(), NodeState::Released);
        assert!(Arc::ptr_eq(&root.lookup("dst").unwrap(), &src));
    }

    #[test]
    fn test_rename_directory_over_non_empty_directory() {
        let fs = mount();
        let root = fs.root();
        root.mkdir("src", None).unwrap();
        let dst = root.mkdir("dst", None).unwrap();
        dst.create("f", None).unwrap();

        assert_eq!(
            root.rename("src", root, "dst").unwrap_err(),
            FsError::DirectoryNotEmpty
        );
    }

    #[test]
    fn test_rename_onto_ancestor_is_not_empty() {
        let fs = mount();
        let root = fs.root();
        let a = root.mkdir("a", None).unwrap();
        a.mkdir("a", None).unwrap();

        // 用子目录替换其父目录
        assert_eq!(a.rename("a", root, "a").unwrap_err(), FsError::DirectoryNotEmpty);
    }

    #[test]
    fn test_rename_into_descendant() {
        let fs = mount();
        let root = fs.root();
        let a = root.mkdir("a", None).unwrap();
        let b = a.mkdir("b", None).unwrap();
        let c = b.mkdir("c", None).unwrap();

        assert_eq!(root.rename("a", &c, "a").unwrap_err(), FsError::InvalidArgument);
        assert_eq!(root.rename("a", &a, "x").unwrap_err(), FsError::InvalidArgument);
        assert!(Arc::ptr_eq(&c.lookup("..").unwrap(), &b));
        assert_eq!(root.nlinks(), 3);
    }

    #[test]
    fn test_file_io() {
        let fs = mount();
        let file = fs.root().create("f", None).unwrap();

        assert_eq!(file.write_at(0, b"hello world").unwrap(), 11);
        let mut buf = [0u8; 5];
        assert_eq!(file.read_at(6, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"world");
        assert_eq!(file.read_at(11, &mut buf).unwrap(), 0);

        let meta = file.metadata().unwrap();
        assert_eq!(meta.size, 11);
        assert_eq!(meta.blocks, 8);

        let dir = fs.root().mkdir("d", None).unwrap();
        assert_eq!(dir.read_at(0, &mut buf).unwrap_err(), FsError::IsDirectory);
        assert_eq!(dir.write_at(0, b"x").unwrap_err(), FsError::IsDirectory);
    }

    #[test]
    fn test_write_past_max_file_size() {
        let fs = MemFs::mount_with_data("maxbytes=100").unwrap();
        let file = fs.root().create("f", None).unwrap();

        assert_eq!(file.write_at(100, b"x").unwrap_err(), FsError::FileTooLarge);
        assert_eq!(file.write_at(98, b"abcd").unwrap(), 2);
        assert_eq!(file.size(), 100);
        assert_eq!(file.truncate(101).unwrap_err(), FsError::FileTooLarge);
    }

    #[test]
    fn test_setattr() {
        let fs = mount();
        let file = fs.root().create("f", None).unwrap();
        file.write_at(0, b"0123456789").unwrap();
        let before = file.metadata().unwrap();

        file.chmod(FileMode::from_bits_truncate(0o040600)).unwrap();
        file.chown(1000, 1000).unwrap();
        file.truncate(4).unwrap();
        let t = TimeSpec::new(42, 7);
        file.set_times(Some(t), Some(t)).unwrap();

        let meta = file.metadata().unwrap();
        assert_eq!(meta.mode.bits(), 0o100600);
        assert_eq!((meta.uid, meta.gid), (1000, 1000));
        assert_eq!(meta.size, 4);
        assert_eq!(meta.atime, t);
        assert_eq!(meta.mtime, t);
        assert!(meta.ctime > before.ctime);

        let dir = fs.root().mkdir("d", None).unwrap();
        assert_eq!(dir.truncate(0).unwrap_err(), FsError::IsDirectory);
    }

    #[test]
    fn test_create_stamps_parent_times() {
        let fs = mount();
        let root = fs.root();
        let before = root.metadata().unwrap();
        root.create("f", None).unwrap();
        let after = root.metadata().unwrap();

        assert!(after.mtime > before.mtime);
        assert!(after.ctime > before.ctime);
    }

    #[test]
    fn test_open_released_node_is_stale() {
        let fs = mount();
        let root = fs.root();
        let file = root.create("f", None).unwrap();
        root.unlink("f").unwrap();

        assert_eq!(file.open().unwrap_err(), FsError::Stale);
        assert_eq!(file.metadata().unwrap_err(), FsError::Stale);
        assert_eq!(file.write_at(0, b"x").unwrap_err(), FsError::Stale);
        assert_eq!(file.write_at(0, b"").unwrap_err(), FsError::Stale);
    }

    #[test]
    fn test_empty_write_after_teardown_is_stale() {
        let fs = mount();
        let file = fs.root().create("f", None).unwrap();
        assert_eq!(file.write_at(0, b"").unwrap(), 0);

        drop(fs);
        assert_eq!(file.write_at(0, b"").unwrap_err(), FsError::Stale);
    }
}
