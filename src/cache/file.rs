//! 后备文件抽象
//!
//! 缓存按字节偏移读写后备文件。[`MemFile`] 是内存实现，克隆出来的句柄
//! 共享同一份数据，便于在缓存外检查写回结果或模拟 I/O 故障。

use crate::error::{Error, ErrorKind, Result};
use alloc::{rc::Rc, vec::Vec};
use core::cell::RefCell;

/// 后备文件 trait
///
/// 实现者只需提供按字节偏移的读写；越界访问应返回 `UnexpectedIo`。
pub trait BackingFile {
    /// 文件长度（字节）
    fn len(&self) -> u64;

    /// 是否为空文件
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 从 `offset` 读取 `buf.len()` 字节
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// 向 `offset` 写入 `buf`
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()>;

    /// 把写入持久化
    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemFileInner {
    data: Vec<u8>,
    read_fault_from: Option<u64>,
    writes: u64,
    syncs: u64,
}

/// 内存后备文件
#[derive(Debug, Clone, Default)]
pub struct MemFile {
    inner: Rc<RefCell<MemFileInner>>,
}

impl MemFile {
    /// 创建指定长度的全零文件
    pub fn new(len: usize) -> Self {
        Self::from_vec(alloc::vec![0u8; len])
    }

    /// 用已有内容创建文件
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(MemFileInner {
                data,
                ..MemFileInner::default()
            })),
        }
    }

    /// 拷贝出当前全部内容
    pub fn snapshot(&self) -> Vec<u8> {
        self.inner.borrow().data.clone()
    }

    /// 拷贝出 `[offset, offset + len)` 的内容
    pub fn read_range(&self, offset: usize, len: usize) -> Vec<u8> {
        self.inner.borrow().data[offset..offset + len].to_vec()
    }

    /// 直接修改内容（绕过缓存）
    pub fn write_range(&self, offset: usize, data: &[u8]) {
        self.inner.borrow_mut().data[offset..offset + data.len()].copy_from_slice(data);
    }

    /// 让 `offset` 及之后的读取失败；`None` 取消故障
    pub fn set_read_fault(&self, offset: Option<u64>) {
        self.inner.borrow_mut().read_fault_from = offset;
    }

    /// 累计写入次数
    pub fn write_count(&self) -> u64 {
        self.inner.borrow().writes
    }

    /// 累计 sync 次数
    pub fn sync_count(&self) -> u64 {
        self.inner.borrow().syncs
    }

    fn check_range(&self, offset: u64, len: usize) -> Result<usize> {
        let end = offset
            .checked_add(len as u64)
            .ok_or(Error::new(ErrorKind::UnexpectedIo, "I/O range overflow"))?;
        if end > self.len() {
            return Err(Error::new(ErrorKind::UnexpectedIo, "I/O beyond end of file"));
        }
        Ok(offset as usize)
    }
}

impl BackingFile for MemFile {
    fn len(&self) -> u64 {
        self.inner.borrow().data.len() as u64
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let start = self.check_range(offset, buf.len())?;
        let inner = self.inner.borrow();
        if let Some(fault) = inner.read_fault_from {
            if offset + buf.len() as u64 > fault {
                return Err(Error::new(ErrorKind::UnexpectedIo, "injected read fault"));
            }
        }
        buf.copy_from_slice(&inner.data[start..start + buf.len()]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        let start = self.check_range(offset, buf.len())?;
        let mut inner = self.inner.borrow_mut();
        inner.data[start..start + buf.len()].copy_from_slice(buf);
        inner.writes += 1;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.inner.borrow_mut().syncs += 1;
        Ok(())
    }
}
