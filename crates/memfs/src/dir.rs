//! 目录表
//!
//! 目录节点独占的“名字 → 节点”映射。名字在同一目录内唯一，
//! 插入重名项显式失败而不是覆盖。

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;

use crate::config::MAX_NAME_LEN;
use crate::error::FsError;
use crate::node::MemInode;

/// 校验目录项名字
///
/// 名字必须非空、不是 `.` / `..`、不含 `/` 与 NUL，且不超过 [`MAX_NAME_LEN`] 字节。
pub fn validate_name(name: &str) -> Result<(), FsError> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(FsError::InvalidArgument);
    }
    if name.bytes().any(|b| b == b'/' || b == 0) {
        return Err(FsError::InvalidArgument);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(FsError::NameTooLong);
    }
    Ok(())
}

/// 目录表
#[derive(Default)]
pub struct DirectoryTable {
    entries: BTreeMap<String, Arc<MemInode>>,
}

impl DirectoryTable {
    /// 创建空目录表
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// 按名字精确查找（区分大小写）
    pub fn get(&self, name: &str) -> Option<&Arc<MemInode>> {
        self.entries.get(name)
    }

    /// 是否存在该名字
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// 插入新目录项，重名时返回 [`FsError::AlreadyExists`]
    pub fn insert(&mut self, name: &str, node: Arc<MemInode>) -> Result<(), FsError> {
        if self.entries.contains_key(name) {
            return Err(FsError::AlreadyExists);
        }
        self.entries.insert(String::from(name), node);
        Ok(())
    }

    /// 移除目录项
    pub fn remove(&mut self, name: &str) -> Option<Arc<MemInode>> {
        self.entries.remove(name)
    }

    /// 目录项数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空目录
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按名字顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<MemInode>)> {
        self.entries.iter().map(|(name, node)| (name.as_str(), node))
    }

    /// 取出全部目录项（卸载时拆除树）
    pub fn drain(&mut self) -> BTreeMap<String, Arc<MemInode>> {
        core::mem::take(&mut self.entries)
    }
}
