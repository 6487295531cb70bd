//! 归约家族的查询段编组
//!
//! Sum/Mean 同型：归约轴降为整数数组，输出 dtype 显式下发（调用方
//! 已把缺省值解析为输出张量的 dtype）。

use std::ptr;

use npu_core::{DataType, NpuResult};
use npu_opapi::ffi::{AclOpExecutor, WsReduceFn};
use npu_opapi::{NativeIntArray, NativeTensor, OpPair, SymbolTable};

use super::{Aux, Launch, seal};

pub(crate) fn reduce(
    table: &SymbolTable,
    pair: &OpPair<WsReduceFn>,
    dims: &[i64],
    keep_dims: bool,
    out_dtype: DataType,
    ins: &[NativeTensor],
    outs: &[NativeTensor],
) -> NpuResult<Launch> {
    let (ws_fn, run) = pair.require()?;
    let axes = NativeIntArray::new(table, dims)?;
    let mut ws_bytes = 0u64;
    let mut executor: *mut AclOpExecutor = ptr::null_mut();
    // SAFETY: 轴数组随 Aux 存活到执行段之后
    let status = unsafe {
        ws_fn(
            ins[0].handle(),
            axes.handle(),
            keep_dims,
            out_dtype.acl(),
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
