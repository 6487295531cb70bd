//! 布局家族的查询段编组
//!
//! Permute/Flip/Expand 共享同一个查询段形状：轴列表降为厂商整数数组。

use std::ptr;

use npu_core::NpuResult;
use npu_opapi::ffi::{AclOpExecutor, WsIntArrayFn};
use npu_opapi::{NativeIntArray, NativeTensor, OpPair, SymbolTable};

use super::{Aux, Launch, seal};

pub(crate) fn int_array(
    table: &SymbolTable,
    pair: &OpPair<WsIntArrayFn>,
    dims: &[i64],
    ins: &[NativeTensor],
    outs: &[NativeTensor],
) -> NpuResult<Launch> {
    let (ws_fn, run) = pair.require()?;
    let axes = NativeIntArray::new(table, dims)?;
    let mut ws_bytes = 0u64;
    let mut executor: *mut AclOpExecutor = ptr::null_mut();
    // SAFETY: 整数数组随 Aux 存活到执行段之后
    let status = unsafe {
        ws_fn(
            ins[0].handle(),
            axes.handle(),
            outs[0].handle_mut(),
            &mut ws_bytes,
            &mut executor,
        )
    };
    seal(
        pair,
        run,
        status,
        ws_bytes,
        executor,
        Aux {
            arrays: vec![axes],
            ..Default::default()
        },
    )
}
