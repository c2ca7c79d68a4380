//! 内存层次文件系统引擎
//!
//! 所有数据只存在于内存中的文件系统，包括：
//!
//! - [`MemFs`] - 文件系统实例（挂载 / 卸载）
//! - [`NodeStore`] - 节点仓库，负责编号分配与容量预算
//! - [`MemInode`] - 节点：目录操作、文件读写与属性
//! - [`ContentBuffer`] - 按页稀疏存储的文件内容，未写入区域读作 0
//! - [`DirectoryTable`] - 目录中“名字 → 节点”的映射
//!
//! 引擎需要的宿主能力（页大小、时钟、调用者凭据）通过 [`FsOps`] 注入。

#![no_std]

extern crate alloc;

pub mod config;
pub mod error;
pub mod ops;

mod content;
mod dir;
mod fs;
mod inode;
mod node;
mod store;

// Re-export ops
pub use ops::{FsOps, fs_ops, register_fs_ops};

// Re-export error
pub use error::FsError;

// Re-export config
pub use config::{DEFAULT_MODE, FS_TYPE, MAX_NAME_LEN, MEMFS_MAGIC, MountOptions};

// Re-export inode
pub use inode::{
    Cred, DirEntry, FileMode, InodeMetadata, InodeType, NodeState, SetAttr, TimeSpec,
};

// Re-export content
pub use content::{ContentBuffer, PageBudget};

// Re-export dir
pub use dir::{DirectoryTable, validate_name};

// Re-export node
pub use node::{InodeHandle, MemInode};

// Re-export store
pub use store::NodeStore;

// Re-export fs
pub use fs::{MemFs, StatFs};
