//! 张量与流运行时
//!
//! 调度层消费的窄运行时接口：设备内存分配器、引用计数的设备
//! 缓冲区、带 ROI 视图的张量描述，以及挂接缓冲区保留列表的流。
//! 分配器是 trait 接缝，宿主内存实现用于测试与 CI，设备实现
//! 由部署方注入。

pub mod alloc;
pub mod stream;
pub mod tensor;

pub use alloc::{DeviceAllocator, HostAllocator};
pub use stream::Stream;
pub use tensor::{DeviceBuffer, Tensor};
