//! 执行流
//!
//! 流句柄由设备运行时创建，这里只保存它的裸指针形式并维护
//! 缓冲区保留列表：异步算子执行期间输入与工作区必须存活，
//! [`Stream::retain`] 把缓冲区挂到流上，[`Stream::synchronize`]
//! 在设备完成后统一放行。流内 FIFO 顺序由设备运行时保证，
//! 这一层不做任何排序。

use std::ffi::c_void;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use npu_core::DeviceId;

use crate::tensor::DeviceBuffer;

/// 执行流
pub struct Stream {
    device: DeviceId,
    raw: usize,
    retained: Mutex<Vec<Arc<DeviceBuffer>>>,
    drained_total: AtomicU64,
}

impl Stream {
    /// 包装一个设备运行时创建的流句柄
    pub fn new(device: DeviceId, raw_handle: usize) -> Self {
        Stream {
            device,
            raw: raw_handle,
            retained: Mutex::new(Vec::new()),
            drained_total: AtomicU64::new(0),
        }
    }

    /// 流所在设备
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// 厂商 ABI 的流句柄
    pub fn raw(&self) -> *mut c_void {
        self.raw as *mut c_void
    }

    /// 将缓冲区挂到流上，直到下一次同步才释放
    pub fn retain(&self, buf: Arc<DeviceBuffer>) {
        self.retained.lock().push(buf);
    }

    /// 当前挂起的缓冲区数量
    pub fn retained_count(&self) -> usize {
        self.retained.lock().len()
    }

    /// 历史累计放行的缓冲区数量
    pub fn drained_total(&self) -> u64 {
        self.drained_total.load(Ordering::Relaxed)
    }

    /// 设备完成本流全部工作后调用，放行所有挂起的缓冲区
    pub fn synchronize(&self) {
        let drained: Vec<_> = std::mem::take(&mut *self.retained.lock());
        if !drained.is_empty() {
            self.drained_total
                .fetch_add(drained.len() as u64, Ordering::Relaxed);
            log::debug!(
                "stream {:#x} on device {} released {} retained buffers",
                self.raw,
                self.device,
                drained.len()
            );
        }
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        let pending = self.retained.get_mut().len();
        if pending > 0 {
            log::warn!(
                "stream {:#x} dropped with {} buffers still retained",
                self.raw,
                pending
            );
        }
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("device", &self.device)
            .field("raw", &format_args!("{:#x}", self.raw))
            .field("retained", &self.retained_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::{DeviceAllocator, HostAllocator};

    fn dyn_alloc(alloc: &Arc<HostAllocator>) -> Arc<dyn DeviceAllocator> {
        alloc.clone()
    }

    #[test]
    fn test_retain_until_synchronize() {
        let alloc = Arc::new(HostAllocator::new());
        let stream = Stream::new(0, 0xdead_0000);
        let buf = Arc::new(DeviceBuffer::alloc(dyn_alloc(&alloc), 256, 0).expect("buffer"));
        stream.retain(buf.clone());
        drop(buf);
        assert_eq!(alloc.live(), 1, "stream keeps the buffer alive");
        assert_eq!(stream.retained_count(), 1);

        stream.synchronize();
        assert_eq!(stream.retained_count(), 0);
        assert_eq!(alloc.live(), 0);
        assert_eq!(stream.drained_total(), 1);
    }

    #[test]
    fn test_synchronize_empty_stream() {
        let stream = Stream::new(1, 0x1000);
        stream.synchronize();
        assert_eq!(stream.retained_count(), 0);
        assert_eq!(stream.drained_total(), 0);
    }

    #[test]
    fn test_retain_many() {
        let alloc = Arc::new(HostAllocator::new());
        let stream = Stream::new(0, 0x2000);
        for _ in 0..8 {
            let buf = Arc::new(DeviceBuffer::alloc(dyn_alloc(&alloc), 32, 0).expect("buffer"));
            stream.retain(buf);
        }
        assert_eq!(alloc.live(), 8);
        stream.synchronize();
        assert_eq!(alloc.live(), 0);
        assert_eq!(stream.drained_total(), 8);
    }
}
