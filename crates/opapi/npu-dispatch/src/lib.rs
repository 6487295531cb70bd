//! NPU 算子调度层
//!
//! 在厂商算子库的两段式 ABI（工作区查询 + 流上执行）之上提供按名字
//! 调度的入口。上层只拿 [`Tensor`](npu_runtime::Tensor) 与通用属性包
//! 调用 [`Dispatcher::run_op`]；参数编组、厂商对象生命周期、工作区
//! 分配与流保留全部在本层完成。
//!
//! 厂商库缺失或符号不齐时进程正常运行，对应算子报不支持，由
//! [`Dispatcher::is_supported`] 提前探测。

pub mod custom;
pub mod dispatcher;
pub mod op;
pub mod policy;

mod marshal;

pub use custom::CustomKernel;
pub use dispatcher::Dispatcher;
pub use op::{Op, OpKind};
pub use policy::{Arity, RoiMode};

/// 打开厂商库并解析进程级符号表，幂等。
///
/// [`Dispatcher::new`] 会隐式完成同样的初始化，显式调用只是为了
/// 在启动阶段提前暴露配置错误。
pub fn init(cfg: &npu_core::OpApiConfig) -> npu_core::NpuResult<()> {
    npu_opapi::ensure_initialized(cfg).map(|_| ())
}
