//! 自定义算子扩展点
//!
//! 内建表之外的算子可以用 [`CustomKernel`] 注册进调度器，按名字调用。
//! 自定义核走与内建算子相同的两阶段协议：先报工作区大小，再在流上
//! 发射。工作区由调度器分配并挂到流的保留清单，核自身不管理缓冲。

use std::collections::HashMap;
use std::sync::Arc;

use npu_core::NpuResult;
use npu_runtime::{DeviceBuffer, Stream, Tensor};
use parking_lot::RwLock;

/// 用户提供的算子实现。
///
/// `launch` 在调用线程上执行，入队到 `stream` 的工作由实现自行负责；
/// 返回 `Ok` 表示命令已入队（或同步完成）。
pub trait CustomKernel: Send + Sync {
    /// 本次调用需要的工作区字节数，0 表示不需要。
    fn workspace_size(&self, ins: &[Tensor], outs: &[Tensor]) -> NpuResult<u64> {
        let _ = (ins, outs);
        Ok(0)
    }

    /// 发射算子。`workspace` 的生命周期由调度器托管，至少存活到
    /// 下一次流同步。
    fn launch(
        &self,
        ins: &[Tensor],
        outs: &[Tensor],
        workspace: Option<&DeviceBuffer>,
        stream: &Stream,
    ) -> NpuResult<()>;
}

/// 名字到自定义核的并发注册表。
pub(crate) struct CustomRegistry {
    kernels: RwLock<HashMap<String, Arc<dyn CustomKernel>>>,
}

impl CustomRegistry {
    pub(crate) fn new() -> Self {
        CustomRegistry {
            kernels: RwLock::new(HashMap::new()),
        }
    }

    /// 已注册过返回 false，不覆盖。
    pub(crate) fn insert(&self, name: String, kernel: Arc<dyn CustomKernel>) -> bool {
        let mut map = self.kernels.write();
        if map.contains_key(&name) {
            return false;
        }
        map.insert(name, kernel);
        true
    }

    pub(crate) fn get(&self, name: &str) -> Option<Arc<dyn CustomKernel>> {
        self.kernels.read().get(name).cloned()
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.kernels.read().contains_key(name)
    }
}
