//! 文件系统错误类型
//!
//! 定义了与 POSIX 兼容的文件系统错误码，可通过 [`FsError::to_errno()`] 转换为系统调用错误码。

use core::fmt;

/// 文件系统错误类型
///
/// 各错误码对应标准 POSIX errno 值。所有错误都是局部的：
/// 返回错误的操作不会留下部分生效的修改。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    // 资源相关
    /// 内存分配失败 (-ENOMEM)
    OutOfMemory,
    /// 容量不足 (-ENOSPC)
    NoSpace,
    /// 文件过大 (-EFBIG)
    FileTooLarge,

    // 文件/目录相关
    /// 文件不存在 (-ENOENT)
    NotFound,
    /// 文件已存在 (-EEXIST)
    AlreadyExists,
    /// 不是目录 (-ENOTDIR)
    NotDirectory,
    /// 是目录 (-EISDIR)
    IsDirectory,
    /// 目录非空 (-ENOTEMPTY)
    DirectoryNotEmpty,
    /// 硬链接过多 (-EMLINK)
    TooManyLinks,

    // 参数相关
    /// 无效参数 (-EINVAL)
    InvalidArgument,
    /// 文件名过长 (-ENAMETOOLONG)
    NameTooLong,
    /// 操作不允许 (-EPERM)
    NotPermitted,
    /// 跨文件系统实例的链接或移动 (-EXDEV)
    CrossDevice,

    // 生命周期相关
    /// 资源忙 (-EBUSY)
    Busy,
    /// 节点已释放或所属实例已卸载 (-ESTALE)
    Stale,
    /// 挂载时无法建立根目录 (-ENOMEM)
    RootCreationFailed,
}

impl FsError {
    /// 转换为系统调用错误码（负数）
    pub fn to_errno(&self) -> isize {
        match self {
            FsError::NotPermitted => -1,
            FsError::NotFound => -2,
            FsError::OutOfMemory => -12,
            FsError::Busy => -16,
            FsError::AlreadyExists => -17,
            FsError::CrossDevice => -18,
            FsError::NotDirectory => -20,
            FsError::IsDirectory => -21,
            FsError::InvalidArgument => -22,
            FsError::FileTooLarge => -27,
            FsError::NoSpace => -28,
            FsError::TooManyLinks => -31,
            FsError::NameTooLong => -36,
            FsError::DirectoryNotEmpty => -39,
            FsError::Stale => -116,
            FsError::RootCreationFailed => -12,
        }
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            FsError::OutOfMemory => "out of memory",
            FsError::NoSpace => "no space left on device",
            FsError::FileTooLarge => "file too large",
            FsError::NotFound => "no such file or directory",
            FsError::AlreadyExists => "file exists",
            FsError::NotDirectory => "not a directory",
            FsError::IsDirectory => "is a directory",
            FsError::DirectoryNotEmpty => "directory not empty",
            FsError::TooManyLinks => "too many links",
            FsError::InvalidArgument => "invalid argument",
            FsError::NameTooLong => "file name too long",
            FsError::NotPermitted => "operation not permitted",
            FsError::CrossDevice => "invalid cross-device link",
            FsError::Busy => "device or resource busy",
            FsError::Stale => "stale file handle",
            FsError::RootCreationFailed => "failed to create root directory",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for FsError {}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_errno_values() {
        assert_eq!(FsError::NotFound.to_errno(), -2);
        assert_eq!(FsError::AlreadyExists.to_errno(), -17);
        assert_eq!(FsError::DirectoryNotEmpty.to_errno(), -39);
        assert_eq!(FsError::OutOfMemory.to_errno(), -12);
        // 根目录创建失败对外表现为 ENOMEM
        assert_eq!(
            FsError::RootCreationFailed.to_errno(),
            FsError::OutOfMemory.to_errno()
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(FsError::NotDirectory.to_string(), "not a directory");
        assert_eq!(FsError::Stale.to_string(), "stale file handle");
    }
}
