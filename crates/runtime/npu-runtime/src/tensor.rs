//! 设备缓冲区与张量描述
//!
//! [`DeviceBuffer`] 是一段引用计数的设备内存，最后一个引用释放
//! 时归还给分配器。[`Tensor`] 在缓冲区之上描述形状、步长与元素
//! 偏移，ROI 视图与原张量共享缓冲区。所有尺寸以元素为单位，
//! 与厂商张量构造函数的参数约定一致。

use std::ffi::c_void;
use std::sync::Arc;

use npu_core::{DataType, DeviceId, NpuError, NpuResult};

use crate::alloc::DeviceAllocator;

/// 引用计数的设备缓冲区
///
/// 释放发生在最后一个 `Arc` 掉落时，经由创建它的分配器。
pub struct DeviceBuffer {
    addr: usize,
    len: usize,
    device: DeviceId,
    alloc: Arc<dyn DeviceAllocator>,
}

impl DeviceBuffer {
    /// 在指定设备上分配 `bytes` 字节
    pub fn alloc(
        alloc: Arc<dyn DeviceAllocator>,
        bytes: usize,
        device: DeviceId,
    ) -> NpuResult<Self> {
        let addr = alloc.alloc(bytes, device)?;
        Ok(DeviceBuffer {
            addr,
            len: bytes,
            device,
            alloc,
        })
    }

    /// 缓冲区基地址
    pub fn addr(&self) -> usize {
        self.addr
    }

    /// 基地址的裸指针形式，供 FFI 使用
    pub fn as_ptr(&self) -> *mut c_void {
        self.addr as *mut c_void
    }

    /// 缓冲区字节数
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 所在设备
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// 将 `[offset, offset+bytes)` 清零
    pub fn fill_zero(&self, offset: usize, bytes: usize) -> NpuResult<()> {
        let end = offset.checked_add(bytes).ok_or_else(|| {
            NpuError::invalid("bytes", "zero-fill range overflows".to_string())
        })?;
        if end > self.len {
            return Err(NpuError::invalid(
                "bytes",
                format!(
                    "zero-fill range {}..{} exceeds buffer of {} bytes",
                    offset, end, self.len
                ),
            ));
        }
        self.alloc.memset_zero(self.addr + offset, bytes, self.device)
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        self.alloc.free(self.addr, self.len, self.device);
    }
}

impl std::fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("addr", &format_args!("{:#x}", self.addr))
            .field("len", &self.len)
            .field("device", &self.device)
            .finish()
    }
}

/// 张量描述
///
/// 形状、步长、元素偏移加一个共享的设备缓冲区。ROI 视图通过
/// [`Tensor::roi`] 创建，保持底层缓冲区不变、仅调整偏移与形状，
/// `storage_shape` 始终记录缓冲区的稠密形状。
#[derive(Debug, Clone)]
pub struct Tensor {
    buf: Arc<DeviceBuffer>,
    shape: Vec<i64>,
    strides: Vec<i64>,
    elem_offset: i64,
    storage_shape: Vec<i64>,
    dtype: DataType,
}

impl Tensor {
    /// 在指定设备上分配一个稠密张量
    pub fn new(
        alloc: Arc<dyn DeviceAllocator>,
        device: DeviceId,
        shape: &[i64],
        dtype: DataType,
    ) -> NpuResult<Self> {
        let numel = checked_numel(shape)?;
        let bytes = (numel as usize)
            .checked_mul(dtype.elem_size())
            .ok_or_else(|| NpuError::invalid("shape", "tensor byte size overflows"))?;
        let buf = Arc::new(DeviceBuffer::alloc(alloc, bytes, device)?);
        Ok(Tensor {
            strides: dense_strides(shape),
            shape: shape.to_vec(),
            storage_shape: shape.to_vec(),
            elem_offset: 0,
            dtype,
            buf,
        })
    }

    /// 把既有缓冲区包装成稠密张量
    pub fn from_buffer(
        buf: Arc<DeviceBuffer>,
        shape: &[i64],
        dtype: DataType,
    ) -> NpuResult<Self> {
        let numel = checked_numel(shape)?;
        let need = (numel as usize)
            .checked_mul(dtype.elem_size())
            .ok_or_else(|| NpuError::invalid("shape", "tensor byte size overflows"))?;
        if need > buf.len() {
            return Err(NpuError::invalid(
                "shape",
                format!("tensor needs {} bytes, buffer has {}", need, buf.len()),
            ));
        }
        Ok(Tensor {
            strides: dense_strides(shape),
            shape: shape.to_vec(),
            storage_shape: shape.to_vec(),
            elem_offset: 0,
            dtype,
            buf,
        })
    }

    /// 创建 ROI 视图
    ///
    /// `start` 与 `size` 的秩必须与张量一致；视图共享缓冲区，
    /// 元素偏移按步长累加。
    pub fn roi(&self, start: &[i64], size: &[i64]) -> NpuResult<Self> {
        if start.len() != self.shape.len() || size.len() != self.shape.len() {
            return Err(NpuError::invalid(
                "roi",
                format!(
                    "roi rank {}/{} does not match tensor rank {}",
                    start.len(),
                    size.len(),
                    self.shape.len()
                ),
            ));
        }
        let mut offset = self.elem_offset;
        for d in 0..start.len() {
            if start[d] < 0 || size[d] < 1 || start[d] + size[d] > self.shape[d] {
                return Err(NpuError::invalid(
                    "roi",
                    format!(
                        "roi [{}, +{}) out of bounds for dim {} of extent {}",
                        start[d], size[d], d, self.shape[d]
                    ),
                ));
            }
            offset += start[d] * self.strides[d];
        }
        Ok(Tensor {
            buf: Arc::clone(&self.buf),
            shape: size.to_vec(),
            strides: self.strides.clone(),
            elem_offset: offset,
            storage_shape: self.storage_shape.clone(),
            dtype: self.dtype,
        })
    }

    pub fn shape(&self) -> &[i64] {
        &self.shape
    }

    pub fn strides(&self) -> &[i64] {
        &self.strides
    }

    /// 底层缓冲区的稠密形状
    pub fn storage_shape(&self) -> &[i64] {
        &self.storage_shape
    }

    /// 距缓冲区基地址的元素偏移
    pub fn elem_offset(&self) -> i64 {
        self.elem_offset
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn device(&self) -> DeviceId {
        self.buf.device()
    }

    /// 元素个数
    pub fn numel(&self) -> i64 {
        self.shape.iter().product()
    }

    /// 视图覆盖的字节数（按稠密布局计）
    pub fn nbytes(&self) -> usize {
        self.numel() as usize * self.dtype.elem_size()
    }

    /// 底层缓冲区
    pub fn buffer(&self) -> &Arc<DeviceBuffer> {
        &self.buf
    }

    /// 缓冲区基地址（厂商构造函数的 data 参数，偏移单独传递）
    pub fn base_ptr(&self) -> *mut c_void {
        self.buf.as_ptr()
    }

    /// 视图首元素地址
    pub fn data_ptr(&self) -> *mut c_void {
        let byte_off = self.elem_offset as usize * self.dtype.elem_size();
        (self.buf.addr() + byte_off) as *mut c_void
    }

    /// 步长是否为当前形状的稠密布局
    pub fn is_contiguous(&self) -> bool {
        self.strides == dense_strides(&self.shape)
    }

    /// 是否为视图（偏移非零、非稠密或形状小于存储形状）
    pub fn is_view(&self) -> bool {
        self.elem_offset != 0 || !self.is_contiguous() || self.shape != self.storage_shape
    }

    /// 两个张量是否共享同一缓冲区
    pub fn same_storage(&self, other: &Tensor) -> bool {
        Arc::ptr_eq(&self.buf, &other.buf)
    }

    /// 将视图覆盖的区间清零
    ///
    /// 仅支持稠密视图；带步长的视图没有连续的字节区间可清。
    pub fn zero_(&self) -> NpuResult<()> {
        if !self.is_contiguous() {
            return Err(NpuError::invalid(
                "tensor",
                "zero-fill requires a contiguous tensor",
            ));
        }
        let byte_off = self.elem_offset as usize * self.dtype.elem_size();
        self.buf.fill_zero(byte_off, self.nbytes())
    }
}

/// 行主序稠密步长
pub fn dense_strides(shape: &[i64]) -> Vec<i64> {
    let mut strides = vec![1i64; shape.len()];
    for d in (0..shape.len().saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * shape[d + 1];
    }
    strides
}

fn checked_numel(shape: &[i64]) -> NpuResult<i64> {
    if shape.is_empty() {
        return Err(NpuError::invalid("shape", "tensor rank must be at least 1"));
    }
    let mut numel: i64 = 1;
    for (d, &extent) in shape.iter().enumerate() {
        if extent < 1 {
            return Err(NpuError::invalid(
                "shape",
                format!("dim {} has non-positive extent {}", d, extent),
            ));
        }
        numel = numel.checked_mul(extent).ok_or_else(|| {
            NpuError::invalid("shape", "element count overflows".to_string())
        })?;
    }
    Ok(numel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::HostAllocator;

    fn host() -> Arc<HostAllocator> {
        Arc::new(HostAllocator::new())
    }

    #[test]
    fn test_dense_tensor_layout() {
        let alloc = host();
        let t = Tensor::new(alloc.clone(), 0, &[2, 3, 4], DataType::Float).expect("tensor");
        assert_eq!(t.strides(), &[12, 4, 1]);
        assert_eq!(t.numel(), 24);
        assert_eq!(t.nbytes(), 96);
        assert!(t.is_contiguous());
        assert!(!t.is_view());
        assert_eq!(alloc.bytes_in_use(), 96);
    }

    #[test]
    fn test_buffer_released_on_last_drop() {
        let alloc = host();
        let t = Tensor::new(alloc.clone(), 0, &[8, 8], DataType::Int32).expect("tensor");
        let view = t.roi(&[2, 2], &[4, 4]).expect("roi");
        drop(t);
        assert_eq!(alloc.live(), 1, "view keeps the buffer alive");
        drop(view);
        assert_eq!(alloc.live(), 0);
    }

    #[test]
    fn test_roi_offset_math() {
        let alloc = host();
        let t = Tensor::new(alloc, 0, &[4, 6], DataType::Uint8).expect("tensor");
        let v = t.roi(&[1, 2], &[2, 3]).expect("roi");
        assert_eq!(v.elem_offset(), 1 * 6 + 2);
        assert_eq!(v.shape(), &[2, 3]);
        assert_eq!(v.strides(), &[6, 1]);
        assert_eq!(v.storage_shape(), &[4, 6]);
        assert!(v.is_view());
        assert!(!v.is_contiguous());
        assert!(v.same_storage(&t));
        let addr = v.data_ptr() as usize;
        assert_eq!(addr, t.base_ptr() as usize + 8);
    }

    #[test]
    fn test_roi_of_roi_accumulates() {
        let alloc = host();
        let t = Tensor::new(alloc, 0, &[8, 8], DataType::Float).expect("tensor");
        let v1 = t.roi(&[2, 0], &[4, 8]).expect("first roi");
        let v2 = v1.roi(&[1, 3], &[2, 2]).expect("second roi");
        assert_eq!(v2.elem_offset(), 2 * 8 + (1 * 8 + 3));
    }

    #[test]
    fn test_roi_bounds_rejected() {
        let alloc = host();
        let t = Tensor::new(alloc, 0, &[4, 4], DataType::Float).expect("tensor");
        assert!(t.roi(&[0, 0], &[5, 1]).is_err());
        assert!(t.roi(&[3, 0], &[2, 4]).is_err());
        assert!(t.roi(&[-1, 0], &[1, 1]).is_err());
        assert!(t.roi(&[0, 0], &[0, 1]).is_err());
        assert!(t.roi(&[0], &[1]).is_err());
    }

    #[test]
    fn test_zero_fill() {
        let alloc = host();
        let t = Tensor::new(alloc, 0, &[16], DataType::Uint8).expect("tensor");
        unsafe { std::ptr::write_bytes(t.data_ptr() as *mut u8, 0xFF, 16) };
        t.zero_().expect("zero");
        let bytes = unsafe { std::slice::from_raw_parts(t.data_ptr() as *const u8, 16) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_zero_fill_subrange_keeps_rest() {
        let alloc = host();
        let t = Tensor::new(alloc, 0, &[4, 4], DataType::Uint8).expect("tensor");
        unsafe { std::ptr::write_bytes(t.base_ptr() as *mut u8, 0xFF, 16) };
        // 行视图是稠密的，可以清零
        let row = t.roi(&[2, 0], &[1, 4]).expect("row view");
        assert!(row.is_contiguous());
        row.zero_().expect("zero row");
        let bytes = unsafe { std::slice::from_raw_parts(t.base_ptr() as *const u8, 16) };
        assert!(bytes[0..8].iter().all(|&b| b == 0xFF));
        assert!(bytes[8..12].iter().all(|&b| b == 0));
        assert!(bytes[12..16].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_zero_fill_strided_view_rejected() {
        let alloc = host();
        let t = Tensor::new(alloc, 0, &[4, 4], DataType::Float).expect("tensor");
        let col = t.roi(&[0, 1], &[4, 1]).expect("column view");
        assert!(col.zero_().is_err());
    }

    #[test]
    fn test_from_buffer_size_check() {
        let alloc = host();
        let buf = Arc::new(DeviceBuffer::alloc(alloc, 64, 0).expect("buffer"));
        assert!(Tensor::from_buffer(buf.clone(), &[4, 4], DataType::Float).is_ok());
        assert!(Tensor::from_buffer(buf, &[4, 5], DataType::Float).is_err());
    }

    #[test]
    fn test_invalid_shapes_rejected() {
        let alloc = host();
        assert!(Tensor::new(alloc.clone(), 0, &[], DataType::Float).is_err());
        assert!(Tensor::new(alloc.clone(), 0, &[0, 4], DataType::Float).is_err());
        assert!(Tensor::new(alloc, 0, &[-2], DataType::Float).is_err());
    }
}
