//! 节点公共类型
//!
//! 定义节点类型、权限位、元数据快照等在各模块之间共享的数据结构。

use alloc::string::String;

/// 时间戳
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeSpec {
    /// 秒
    pub tv_sec: i64,
    /// 纳秒
    pub tv_nsec: i64,
}

impl TimeSpec {
    /// 构造时间戳
    pub const fn new(tv_sec: i64, tv_nsec: i64) -> Self {
        Self { tv_sec, tv_nsec }
    }
}

/// 调用者凭据（用于新节点的属主标记）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cred {
    /// 文件系统用户 ID
    pub uid: u32,
    /// 文件系统组 ID
    pub gid: u32,
}

/// 文件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeType {
    /// 普通文件
    File,
    /// 目录
    Directory,
}

impl InodeType {
    /// 对应的 `S_IFMT` 类型位
    pub fn mode_bits(self) -> FileMode {
        match self {
            InodeType::File => FileMode::S_IFREG,
            InodeType::Directory => FileMode::S_IFDIR,
        }
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// 文件权限和类型（与 POSIX 兼容）
    pub struct FileMode: u32 {
        // 文件类型掩码
        /// 文件类型掩码
        const S_IFMT   = 0o170000;
        /// 普通文件
        const S_IFREG  = 0o100000;
        /// 目录
        const S_IFDIR  = 0o040000;

        // 用户权限
        /// 用户读
        const S_IRUSR  = 0o400;
        /// 用户写
        const S_IWUSR  = 0o200;
        /// 用户执行
        const S_IXUSR  = 0o100;

        // 组权限
        /// 组读
        const S_IRGRP  = 0o040;
        /// 组写
        const S_IWGRP  = 0o020;
        /// 组执行
        const S_IXGRP  = 0o010;

        // 其他用户权限
        /// 其他读
        const S_IROTH  = 0o004;
        /// 其他写
        const S_IWOTH  = 0o002;
        /// 其他执行
        const S_IXOTH  = 0o001;

        // 特殊位
        /// Set UID
        const S_ISUID  = 0o4000;
        /// Set GID
        const S_ISGID  = 0o2000;
        /// Sticky bit
        const S_ISVTX  = 0o1000;
    }
}

impl FileMode {
    /// 所有权限位（含特殊位）
    pub const PERMISSION_MASK: u32 = 0o7777;

    /// 去掉类型位，只保留权限位
    pub fn permissions(self) -> FileMode {
        FileMode::from_bits_truncate(self.bits() & Self::PERMISSION_MASK)
    }

    /// 类型位（`S_IFMT` 部分）
    pub fn file_type_bits(self) -> u32 {
        self.bits() & FileMode::S_IFMT.bits()
    }

    /// 以给定类型替换类型位
    pub fn with_type(self, inode_type: InodeType) -> FileMode {
        self.permissions() | inode_type.mode_bits()
    }
}

/// 轻量级目录项（readdir 返回）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// 文件名
    pub name: String,
    /// Inode 编号
    pub inode_no: usize,
    /// 文件类型
    pub inode_type: InodeType,
}

/// 文件元数据
#[derive(Debug, Clone)]
pub struct InodeMetadata {
    /// Inode 编号
    pub inode_no: usize,
    /// 文件类型
    pub inode_type: InodeType,
    /// 权限位（含类型位）
    pub mode: FileMode,
    /// 用户 ID
    pub uid: u32,
    /// 组 ID
    pub gid: u32,
    /// 文件大小（字节）
    pub size: usize,
    /// 访问时间
    pub atime: TimeSpec,
    /// 修改时间
    pub mtime: TimeSpec,
    /// 状态改变时间
    pub ctime: TimeSpec,
    /// 硬链接数
    pub nlinks: usize,
    /// 占用的块数（512B 为单位）
    pub blocks: usize,
}

/// 属性修改请求，字段为 `None` 表示不修改
#[derive(Debug, Clone, Copy, Default)]
pub struct SetAttr {
    /// 新权限位（类型位被忽略）
    pub mode: Option<FileMode>,
    /// 新属主
    pub uid: Option<u32>,
    /// 新属组
    pub gid: Option<u32>,
    /// 新文件大小（仅普通文件）
    pub size: Option<usize>,
    /// 新访问时间
    pub atime: Option<TimeSpec>,
    /// 新修改时间
    pub mtime: Option<TimeSpec>,
}

/// 节点生命周期状态
///
/// `Linked` → `Unlinked` → `Released`，其中 `Released` 为终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// 至少被一个目录项引用
    Linked,
    /// 链接数为 0，但仍有打开的句柄
    Unlinked,
    /// 已释放，内容存储已回收
    Released,
}
