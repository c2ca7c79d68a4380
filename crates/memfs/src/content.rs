//! 内容缓冲区
//!
//! 普通文件的数据存储：按字节偏移寻址，由固定大小的页组成（稀疏存储）。
//!
//! # 零填充不变量
//!
//! 对任意 `offset < size`，读取结果要么是写入过的数据，要么是 0：
//!
//! - 未物化的页读作全 0，不会为空洞分配内存
//! - 新物化的页在分配时即清零，因此短写入之外的页内剩余部分必为 0
//! - 截断缩小时，新的最后一页中超出新大小的部分被清零，之后再扩展也读到 0
//!
//! 写入在独占持有缓冲区期间完成“物化 + 拷贝 + 推进 size”，读者不会观察到
//! size 已推进而数据尚未写入的状态。

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::error::FsError;

/// 一个已物化的页
type Page = Box<[u8]>;

/// 分配一个清零的页
///
/// 分配失败返回 [`FsError::OutOfMemory`] 而不是中止进程。
fn alloc_zeroed_page(page_size: usize) -> Result<Page, FsError> {
    let mut page = Vec::new();
    page.try_reserve_exact(page_size)
        .map_err(|_| FsError::OutOfMemory)?;
    page.resize(page_size, 0u8);
    Ok(page.into_boxed_slice())
}

/// 页预算
///
/// 一个文件系统实例内所有内容缓冲区共享的已分配页计数与上限。
#[derive(Debug)]
pub struct PageBudget {
    allocated: AtomicUsize,
    max_pages: Option<usize>,
}

impl PageBudget {
    /// 创建页预算，`None` 表示无限制
    pub const fn new(max_pages: Option<usize>) -> Self {
        Self {
            allocated: AtomicUsize::new(0),
            max_pages,
        }
    }

    /// 预留一页，超出上限时返回 [`FsError::NoSpace`]
    pub fn reserve(&self) -> Result<(), FsError> {
        self.allocated
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| match self.max_pages {
                Some(max) if n >= max => None,
                _ => Some(n + 1),
            })
            .map(|_| ())
            .map_err(|_| FsError::NoSpace)
    }

    /// 归还若干页
    pub fn release(&self, pages: usize) {
        if pages == 0 {
            return;
        }
        let mut cur = self.allocated.load(Ordering::Acquire);
        loop {
            match self.allocated.compare_exchange_weak(
                cur,
                cur.saturating_sub(pages),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => cur = actual,
            }
        }
    }

    /// 已分配页数
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Acquire)
    }

    /// 页数上限
    pub fn max_pages(&self) -> Option<usize> {
        self.max_pages
    }
}

/// 普通文件的内容缓冲区
#[derive(Debug)]
pub struct ContentBuffer {
    /// 已物化的数据页，按页号索引（稀疏存储）
    pages: BTreeMap<usize, Page>,
    /// 逻辑大小
    size: usize,
    page_size: usize,
}

impl ContentBuffer {
    /// 创建空缓冲区
    pub fn new(page_size: usize) -> Self {
        debug_assert!(page_size.is_power_of_two());
        Self {
            pages: BTreeMap::new(),
            size: 0,
            page_size,
        }
    }

    /// 逻辑大小（文件末尾偏移）
    pub fn size(&self) -> usize {
        self.size
    }

    /// 页大小
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// 已物化的页数
    pub fn materialized_pages(&self) -> usize {
        self.pages.len()
    }

    /// 从 `offset` 读取，返回读取的字节数
    ///
    /// 读取长度被截断到 `size - offset`；`offset >= size` 时返回 0。
    pub fn read(&self, offset: usize, buf: &mut [u8]) -> usize {
        if offset >= self.size {
            return 0;
        }

        let read_size = buf.len().min(self.size - offset);
        let mut bytes_read = 0;

        while bytes_read < read_size {
            let pos = offset + bytes_read;
            let page_index = pos / self.page_size;
            let page_offset = pos % self.page_size;
            let read_len = (self.page_size - page_offset).min(read_size - bytes_read);
            let dst = &mut buf[bytes_read..bytes_read + read_len];

            match self.pages.get(&page_index) {
                Some(page) => dst.copy_from_slice(&page[page_offset..page_offset + read_len]),
                None => dst.fill(0),
            }

            bytes_read += read_len;
        }

        bytes_read
    }

    /// 在 `offset` 写入 `data`，返回写入的字节数
    ///
    /// 若中途页预算耗尽或分配失败：已拷贝的部分照常提交并返回其长度；
    /// 一个字节都未写入时返回错误。
    pub fn write(&mut self, offset: usize, data: &[u8], budget: &PageBudget) -> Result<usize, FsError> {
        if data.is_empty() {
            return Ok(0);
        }
        offset
            .checked_add(data.len())
            .ok_or(FsError::FileTooLarge)?;

        let mut bytes_written = 0;

        while bytes_written < data.len() {
            let pos = offset + bytes_written;
            let page_index = pos / self.page_size;
            let page_offset = pos % self.page_size;
            let write_len = (self.page_size - page_offset).min(data.len() - bytes_written);

            let page = match self.materialize(page_index, budget) {
                Ok(page) => page,
                Err(e) if bytes_written == 0 => return Err(e),
                Err(e) => {
                    log::debug!(
                        "memfs: short write at {}: {} of {} bytes ({})",
                        offset,
                        bytes_written,
                        data.len(),
                        e
                    );
                    break;
                }
            };
            page[page_offset..page_offset + write_len]
                .copy_from_slice(&data[bytes_written..bytes_written + write_len]);

            bytes_written += write_len;
        }

        self.size = self.size.max(offset + bytes_written);
        Ok(bytes_written)
    }

    /// 截断或扩展到 `new_size`
    ///
    /// 缩小时释放新末尾之后的整页，并清零新的最后一页中超出部分；
    /// 扩展时只移动 size，新增区间读作 0。
    pub fn truncate(&mut self, new_size: usize, budget: &PageBudget) {
        if new_size < self.size {
            let keep_pages = new_size.div_ceil(self.page_size);
            let freed = self.pages.split_off(&keep_pages);
            budget.release(freed.len());

            let tail = new_size % self.page_size;
            if tail != 0 {
                if let Some(page) = self.pages.get_mut(&(new_size / self.page_size)) {
                    page[tail..].fill(0);
                }
            }
        }

        self.size = new_size;
    }

    /// 释放全部页并将大小置 0，返回释放的页数
    pub fn clear(&mut self, budget: &PageBudget) -> usize {
        let freed = self.pages.len();
        self.pages = BTreeMap::new();
        self.size = 0;
        budget.release(freed);
        freed
    }

    /// 获取（必要时物化）指定页
    fn materialize(&mut self, page_index: usize, budget: &PageBudget) -> Result<&mut [u8], FsError> {
        if !self.pages.contains_key(&page_index) {
            budget.reserve()?;
            match alloc_zeroed_page(self.page_size) {
                Ok(page) => {
                    self.pages.insert(page_index, page);
                }
                Err(e) => {
                    budget.release(1);
                    return Err(e);
                }
            }
        }

        self.pages
            .get_mut(&page_index)
            .map(|page| &mut page[..])
            .ok_or(FsError::OutOfMemory)
    }
}
