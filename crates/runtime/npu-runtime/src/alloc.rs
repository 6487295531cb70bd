//! 设备内存分配器
//!
//! [`DeviceAllocator`] 是调度层对内存子系统的全部要求：分配、
//! 释放、清零。地址以 `usize` 表示，跨线程传递不需要额外的
//! unsafe 标注。[`HostAllocator`] 是宿主内存参考实现，测试与
//! CI 在没有 NPU 的机器上用它跑完整的调度路径。

use std::alloc::Layout;
use std::sync::atomic::{AtomicUsize, Ordering};

use npu_core::{DeviceId, NpuError, NpuResult};

/// 设备缓冲区的默认对齐（厂商运行时按 64 字节对齐返回）
const BUFFER_ALIGN: usize = 64;

/// 设备内存分配器接缝
///
/// 实现必须线程安全；同一地址的 `free` 只会被调用一次。
pub trait DeviceAllocator: Send + Sync {
    /// 在指定设备上分配 `bytes` 字节，返回缓冲区基地址
    fn alloc(&self, bytes: usize, device: DeviceId) -> NpuResult<usize>;

    /// 释放 `alloc` 返回的缓冲区
    fn free(&self, addr: usize, bytes: usize, device: DeviceId);

    /// 将 `[addr, addr+bytes)` 清零
    fn memset_zero(&self, addr: usize, bytes: usize, device: DeviceId) -> NpuResult<()>;
}

/// 宿主内存分配器
///
/// 维护在用分配计数，泄漏检查直接读取 [`HostAllocator::live`]。
#[derive(Debug, Default)]
pub struct HostAllocator {
    live: AtomicUsize,
    bytes_in_use: AtomicUsize,
}

impl HostAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前在用的分配数量
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// 当前在用的总字节数
    pub fn bytes_in_use(&self) -> usize {
        self.bytes_in_use.load(Ordering::SeqCst)
    }

    fn layout(bytes: usize) -> NpuResult<Layout> {
        Layout::from_size_align(bytes.max(1), BUFFER_ALIGN)
            .map_err(|_| NpuError::invalid("bytes", format!("invalid allocation size {}", bytes)))
    }
}

impl DeviceAllocator for HostAllocator {
    fn alloc(&self, bytes: usize, device: DeviceId) -> NpuResult<usize> {
        let layout = Self::layout(bytes)?;
        // SAFETY: layout 非零大小且对齐合法
        let ptr = unsafe { std::alloc::alloc(layout) };
        if ptr.is_null() {
            log::warn!("host allocation of {} bytes failed", bytes);
            return Err(NpuError::BadAlloc { bytes, device });
        }
        self.live.fetch_add(1, Ordering::SeqCst);
        self.bytes_in_use.fetch_add(bytes, Ordering::SeqCst);
        Ok(ptr as usize)
    }

    fn free(&self, addr: usize, bytes: usize, _device: DeviceId) {
        let layout = match Self::layout(bytes) {
            Ok(l) => l,
            Err(_) => return,
        };
        // SAFETY: addr 来自同一分配器的 alloc，layout 参数一致
        unsafe { std::alloc::dealloc(addr as *mut u8, layout) };
        self.live.fetch_sub(1, Ordering::SeqCst);
        self.bytes_in_use.fetch_sub(bytes, Ordering::SeqCst);
    }

    fn memset_zero(&self, addr: usize, bytes: usize, _device: DeviceId) -> NpuResult<()> {
        // SAFETY: 调用方保证 [addr, addr+bytes) 在同一分配内
        unsafe { std::ptr::write_bytes(addr as *mut u8, 0, bytes) };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_free_balance() {
        let alloc = HostAllocator::new();
        let a = alloc.alloc(128, 0).expect("alloc 128");
        let b = alloc.alloc(4096, 0).expect("alloc 4096");
        assert_eq!(alloc.live(), 2);
        assert_eq!(alloc.bytes_in_use(), 128 + 4096);
        alloc.free(a, 128, 0);
        alloc.free(b, 4096, 0);
        assert_eq!(alloc.live(), 0);
        assert_eq!(alloc.bytes_in_use(), 0);
    }

    #[test]
    fn test_alloc_is_aligned() {
        let alloc = HostAllocator::new();
        let addr = alloc.alloc(100, 0).expect("alloc");
        assert_eq!(addr % BUFFER_ALIGN, 0);
        alloc.free(addr, 100, 0);
    }

    #[test]
    fn test_memset_zero() {
        let alloc = HostAllocator::new();
        let addr = alloc.alloc(64, 0).expect("alloc");
        unsafe { std::ptr::write_bytes(addr as *mut u8, 0xAB, 64) };
        alloc.memset_zero(addr, 64, 0).expect("memset");
        let slice = unsafe { std::slice::from_raw_parts(addr as *const u8, 64) };
        assert!(slice.iter().all(|&b| b == 0));
        alloc.free(addr, 64, 0);
    }

    #[test]
    fn test_zero_size_alloc() {
        let alloc = HostAllocator::new();
        let addr = alloc.alloc(0, 0).expect("zero-size alloc");
        assert_ne!(addr, 0);
        alloc.free(addr, 0, 0);
        assert_eq!(alloc.live(), 0);
    }
}
