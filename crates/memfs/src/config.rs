//! 挂载配置
//!
//! 常量与挂载选项。挂载选项以 tmpfs 风格的逗号分隔字符串传入，例如
//! `"mode=0755,size=16m,nr_inodes=1k"`。

use crate::error::FsError;
use crate::inode::FileMode;

/// 文件系统类型名
pub const FS_TYPE: &str = "memfs";

/// 超级块魔数
pub const MEMFS_MAGIC: u64 = 0xdead_beef;

/// 默认创建权限（根目录以及未指定权限的新节点）
pub const DEFAULT_MODE: u32 = 0o775;

/// 文件名最大长度（字节）
pub const MAX_NAME_LEN: usize = 255;

/// 单个节点的链接数上限
pub const MAX_LINKS: usize = u32::MAX as usize;

/// 单个文件允许到达的最大偏移
pub const MAX_FILE_SIZE: usize = isize::MAX as usize;

/// 挂载选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountOptions {
    /// 默认创建权限，用于根目录以及未显式指定权限的新节点
    pub mode: FileMode,
    /// 文件内容容量上限（字节），`None` 表示无限制
    pub max_bytes: Option<usize>,
    /// 节点数量上限（含根目录），`None` 表示无限制
    pub max_inodes: Option<usize>,
    /// 单个文件大小上限
    pub max_file_size: usize,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            mode: FileMode::from_bits_truncate(DEFAULT_MODE),
            max_bytes: None,
            max_inodes: None,
            max_file_size: MAX_FILE_SIZE,
        }
    }
}

impl MountOptions {
    /// 解析挂载数据字符串
    ///
    /// 支持的选项：
    ///
    /// - `mode=<八进制>`：默认创建权限
    /// - `size=<n>[k|m|g]`：内容容量上限，0 表示无限制
    /// - `nr_inodes=<n>[k|m|g]`：节点数量上限，0 表示无限制
    /// - `maxbytes=<n>[k|m|g]`：单个文件大小上限
    ///
    /// 空字符串得到默认选项；未知选项或格式错误返回 [`FsError::InvalidArgument`]。
    pub fn parse(data: &str) -> Result<Self, FsError> {
        let mut opts = Self::default();

        for opt in data.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, value) = opt.split_once('=').ok_or(FsError::InvalidArgument)?;
            match key {
                "mode" => {
                    let bits =
                        u32::from_str_radix(value, 8).map_err(|_| FsError::InvalidArgument)?;
                    // 只允许权限位和类型位
                    if bits & !(FileMode::PERMISSION_MASK | FileMode::S_IFMT.bits()) != 0 {
                        return Err(FsError::InvalidArgument);
                    }
                    opts.mode = FileMode::from_bits_retain(bits);
                }
                "size" => {
                    let bytes = parse_size(value)?;
                    opts.max_bytes = (bytes != 0).then_some(bytes);
                }
                "nr_inodes" => {
                    let count = parse_size(value)?;
                    opts.max_inodes = (count != 0).then_some(count);
                }
                "maxbytes" => {
                    let bytes = parse_size(value)?;
                    if bytes == 0 || bytes > MAX_FILE_SIZE {
                        return Err(FsError::InvalidArgument);
                    }
                    opts.max_file_size = bytes;
                }
                _ => {
                    log::warn!("memfs: unknown mount option '{}'", key);
                    return Err(FsError::InvalidArgument);
                }
            }
        }

        Ok(opts)
    }

    /// 页预算：容量上限换算成页数（向下取整），`None` 表示无限制
    pub fn max_pages(&self, page_size: usize) -> Option<usize> {
        self.max_bytes.map(|bytes| bytes / page_size)
    }
}

/// 解析带可选 k/m/g 后缀的数值
fn parse_size(value: &str) -> Result<usize, FsError> {
    let (digits, shift) = match value.as_bytes().last() {
        Some(b'k' | b'K') => (&value[..value.len() - 1], 10),
        Some(b'm' | b'M') => (&value[..value.len() - 1], 20),
        Some(b'g' | b'G') => (&value[..value.len() - 1], 30),
        _ => (value, 0),
    };

    let n: usize = digits.parse().map_err(|_| FsError::InvalidArgument)?;
    n.checked_mul(1usize << shift)
        .ok_or(FsError::InvalidArgument)
}
