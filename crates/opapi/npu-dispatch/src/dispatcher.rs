//! 两段式调度器
//!
//! 单次调用的完整序列：
//!
//! 1. 解析算子名与属性（未知名字查自定义注册表）
//! 2. 元数、参数-张量一致性、设备一致性、ROI 策略校验
//! 3. 为每个输入输出构建厂商张量句柄
//! 4. 查询段：编组参数，拿到工作区大小与执行器
//! 5. 分配一次性工作区并挂到流的保留清单
//! 6. 需要预清零的算子清零输出
//! 7. 执行段：在流上发射
//! 8. 成功后把输入缓冲挂到流的保留清单，保证入队命令读到活内存
//!
//! 第一个失败立即返回，后续步骤不再执行；句柄与辅助对象全部按
//! RAII 销毁，任何路径都不遗留厂商对象。调度器自身无锁，流的
//! 先进先出由设备运行时保证。

use std::sync::Arc;

use npu_core::{CommonOpAttrs, NpuError, NpuResult, OpApiConfig};
use npu_opapi::ffi::ACL_SUCCESS;
use npu_opapi::{NativeTensor, SymbolTable, ensure_initialized};
use npu_runtime::{DeviceAllocator, DeviceBuffer, Stream, Tensor};

use crate::custom::{CustomKernel, CustomRegistry};
use crate::marshal;
use crate::op::{Op, OpKind};
use crate::policy;

/// 算子调度器。
///
/// 持有进程级符号表与设备分配器，可跨线程共享（`&self` 接口，
/// 内部只有自定义注册表一把读写锁）。
pub struct Dispatcher {
    table: Arc<SymbolTable>,
    allocator: Arc<dyn DeviceAllocator>,
    custom: CustomRegistry,
}

impl Dispatcher {
    /// 打开厂商库（进程内只发生一次）并构建调度器。
    pub fn new(cfg: &OpApiConfig, allocator: Arc<dyn DeviceAllocator>) -> NpuResult<Self> {
        let table = ensure_initialized(cfg)?;
        Ok(Self::with_table(table, allocator))
    }

    /// 用现成符号表构建，测试与嵌入场景使用。
    pub fn with_table(table: Arc<SymbolTable>, allocator: Arc<dyn DeviceAllocator>) -> Self {
        Dispatcher {
            table,
            allocator,
            custom: CustomRegistry::new(),
        }
    }

    pub fn table(&self) -> &SymbolTable {
        &self.table
    }

    /// 注册自定义算子。名字不得与内建算子冲突，也不得重复注册。
    pub fn register_custom(&self, name: &str, kernel: Arc<dyn CustomKernel>) -> NpuResult<()> {
        if OpKind::from_name(name).is_some() {
            return Err(NpuError::invalid(
                "op",
                format!("'{}' is a builtin operator", name),
            ));
        }
        if !self.custom.insert(name.to_string(), kernel) {
            return Err(NpuError::invalid(
                "op",
                format!("operator '{}' already registered", name),
            ));
        }
        log::info!("registered custom operator '{}'", name);
        Ok(())
    }

    /// 名字当前是否可调度：内建算子要求两段符号齐备，否则查自定义
    /// 注册表。
    pub fn is_supported(&self, name: &str) -> bool {
        match OpKind::from_name(name) {
            Some(kind) => self.pair_supported(kind),
            None => self.custom.contains(name),
        }
    }

    /// 两段符号齐备的内建算子名清单。
    pub fn supported_ops(&self) -> Vec<&'static str> {
        OpKind::ALL
            .iter()
            .copied()
            .filter(|k| self.pair_supported(*k))
            .map(OpKind::name)
            .collect()
    }

    /// 按名字调度一次算子调用。
    pub fn run_op(
        &self,
        name: &str,
        attrs: &CommonOpAttrs,
        ins: &[Tensor],
        outs: &[Tensor],
        stream: &Stream,
    ) -> NpuResult<()> {
        match OpKind::from_name(name) {
            Some(kind) => {
                let op = Op::parse(kind, attrs)?;
                self.run(&op, ins, outs, stream)
            }
            None => match self.custom.get(name) {
                Some(kernel) => self.run_custom(name, &*kernel, ins, outs, stream),
                None => {
                    log::warn!("unknown operator '{}'", name);
                    Err(NpuError::invalid(
                        "op",
                        format!("unknown operator '{}'", name),
                    ))
                }
            },
        }
    }

    /// 调度一个已解析的算子。
    pub fn run(&self, op: &Op, ins: &[Tensor], outs: &[Tensor], stream: &Stream) -> NpuResult<()> {
        let kind = op.kind();
        policy::check_arity(kind, ins.len(), outs.len())?;
        policy::check_op_tensors(op, ins, outs)?;
        check_devices(ins, outs, stream)?;
        policy::check_roi(kind, ins, outs)?;

        let native_ins = build_handles(&self.table, ins)?;
        let native_outs = build_handles(&self.table, outs)?;

        let launch = marshal::prepare(&self.table, op, ins, outs, &native_ins, &native_outs)?;
        let workspace = self.alloc_workspace(launch.ws_bytes, stream)?;

        if policy::needs_zeroed_output(kind) {
            for t in outs {
                t.zero_()?;
            }
        }

        let ws_ptr = workspace
            .as_ref()
            .map_or(std::ptr::null_mut(), |b| b.as_ptr());
        log::debug!(
            "launching {} via {} (workspace {} bytes)",
            kind.name(),
            launch.run_symbol,
            launch.ws_bytes
        );
        // SAFETY: 工作区、执行器、张量句柄与辅助对象此刻全部存活，
        // 执行器在本次调用后由厂商消费
        let status =
            unsafe { (launch.run)(ws_ptr, launch.ws_bytes, launch.executor, stream.raw()) };
        if status != ACL_SUCCESS {
            log::warn!(
                "operator {} failed in {} with status {}",
                kind.name(),
                launch.run_symbol,
                status
            );
            return Err(NpuError::vendor(launch.run_symbol, status));
        }

        // 入队的命令异步读取输入，缓冲必须活到下一次流同步
        for t in ins {
            stream.retain(t.buffer().clone());
        }
        Ok(())
    }

    fn run_custom(
        &self,
        name: &str,
        kernel: &dyn CustomKernel,
        ins: &[Tensor],
        outs: &[Tensor],
        stream: &Stream,
    ) -> NpuResult<()> {
        check_devices(ins, outs, stream)?;
        for t in ins.iter().chain(outs.iter()) {
            if t.is_view() {
                return Err(NpuError::invalid(
                    "roi",
                    format!("custom operator '{}' requires dense tensors", name),
                ));
            }
        }
        let ws_bytes = kernel.workspace_size(ins, outs)?;
        let workspace = self.alloc_workspace(ws_bytes, stream)?;
        log::debug!(
            "launching custom operator '{}' (workspace {} bytes)",
            name,
            ws_bytes
        );
        kernel.launch(ins, outs, workspace.as_deref(), stream)?;
        for t in ins {
            stream.retain(t.buffer().clone());
        }
        Ok(())
    }

    /// 工作区是单次调用的一次性缓冲：分配后立即挂到流的保留清单，
    /// 下一次流同步统一释放，失败路径也不例外。
    fn alloc_workspace(&self, bytes: u64, stream: &Stream) -> NpuResult<Option<Arc<DeviceBuffer>>> {
        if bytes == 0 {
            return Ok(None);
        }
        let buf = Arc::new(DeviceBuffer::alloc(
            self.allocator.clone(),
            bytes as usize,
            stream.device(),
        )?);
        stream.retain(buf.clone());
        Ok(Some(buf))
    }

    fn pair_supported(&self, kind: OpKind) -> bool {
        let t = &*self.table;
        match kind {
            OpKind::Add => t.add.is_supported(),
            OpKind::Sub => t.sub.is_supported(),
            OpKind::Mul => t.mul.is_supported(),
            OpKind::Div => t.div.is_supported(),
            OpKind::BitwiseAnd => t.bitwise_and.is_supported(),
            OpKind::BitwiseOr => t.bitwise_or.is_supported(),
            OpKind::BitwiseXor => t.bitwise_xor.is_supported(),
            OpKind::LogicalAnd => t.logical_and.is_supported(),
            OpKind::LogicalOr => t.logical_or.is_supported(),
            OpKind::Equal => t.eq_tensor.is_supported(),
            OpKind::Greater => t.gt_tensor.is_supported(),
            OpKind::Less => t.lt_tensor.is_supported(),
            OpKind::Matmul => t.matmul.is_supported(),
            OpKind::Muls => t.muls.is_supported(),
            OpKind::Pow => t.pow_tensor_scalar.is_supported(),
            OpKind::Abs => t.abs.is_supported(),
            OpKind::Neg => t.neg.is_supported(),
            OpKind::Exp => t.exp.is_supported(),
            OpKind::Log => t.log.is_supported(),
            OpKind::Sqrt => t.sqrt.is_supported(),
            OpKind::Reciprocal => t.reciprocal.is_supported(),
            OpKind::Floor => t.floor.is_supported(),
            OpKind::Ceil => t.ceil.is_supported(),
            OpKind::Round => t.round.is_supported(),
            OpKind::BitwiseNot => t.bitwise_not.is_supported(),
            OpKind::LogicalNot => t.logical_not.is_supported(),
            OpKind::Clip => t.clamp.is_supported(),
            OpKind::Cast => t.cast.is_supported(),
            OpKind::Permute => t.permute.is_supported(),
            OpKind::Flip => t.flip.is_supported(),
            OpKind::Expand => t.expand.is_supported(),
            OpKind::Split => t.split_tensor.is_supported(),
            OpKind::Concat => t.cat.is_supported(),
            OpKind::Sum => t.reduce_sum.is_supported(),
            OpKind::Mean => t.mean.is_supported(),
            OpKind::Threshold => t.threshold.is_supported(),
            OpKind::MinMaxLoc => t.min_max_loc.is_supported(),
            OpKind::Rotate => t.rotate.is_supported(),
        }
    }
}

fn check_devices(ins: &[Tensor], outs: &[Tensor], stream: &Stream) -> NpuResult<()> {
    for t in ins.iter().chain(outs.iter()) {
        if t.device() != stream.device() {
            return Err(NpuError::invalid(
                "device",
                format!(
                    "tensor on device {} but stream on device {}",
                    t.device(),
                    stream.device()
                ),
            ));
        }
    }
    Ok(())
}

fn build_handles(table: &SymbolTable, tensors: &[Tensor]) -> NpuResult<Vec<NativeTensor>> {
    tensors.iter().map(|t| NativeTensor::new(table, t)).collect()
}
