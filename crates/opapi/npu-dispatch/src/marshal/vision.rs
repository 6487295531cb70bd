//! 自定义库家族的查询段编组
//!
//! Threshold/MinMaxLoc/Rotate 来自扩展算子库。阈值化的两个标量一律
//! 按 FLOAT 下发，与扩展库的实现约定一致。

use std::ptr;

use npu_core::NpuResult;
use npu_opapi::ffi::{AclOpExecutor, WsMinMaxLocFn, WsRotateFn, WsThresholdFn};
use npu_opapi::{NativeScalar, NativeTensor, OpPair, SymbolTable};

use super::{Aux, Launch, seal};

pub(crate) fn threshold(
    table: &SymbolTable,
    pair: &OpPair<WsThresholdFn>,
    thresh: f64,
    max_val: f64,
    threshold_type: i64,
    ins: &[NativeTensor],
    outs: &[NativeTensor],
) -> NpuResult<Launch> {
    let (ws_fn, run) = pair.require()?;
    let thresh_s = NativeScalar::from_f32(table, thresh as f32)?;
    let max_s = NativeScalar::from_f32(table, max_val as f32)?;
    let mut ws_bytes = 0u64;
    let mut executor: *mut AclOpExecutor = ptr::null_mut();
    // SAFETY: 标量随 Aux 存活到执行段之后
    let status = unsafe {
        ws_fn(
            ins[0].handle(),
            thresh_s.handle(),
            max_s.handle(),
            threshold_type,
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
            scalars: vec![thresh_s, max_s],
            ..Default::default()
        },
    )
}

pub(crate) fn min_max_loc(
    pair: &OpPair<WsMinMaxLocFn>,
    ins: &[NativeTensor],
    outs: &[NativeTensor],
) -> NpuResult<Launch> {
    let (ws_fn, run) = pair.require()?;
    let mut ws_bytes = 0u64;
    let mut executor: *mut AclOpExecutor = ptr::null_mut();
    // SAFETY: 四个输出句柄在本作用域存活，顺序为 min/max/minLoc/maxLoc
    let status = unsafe {
        ws_fn(
            ins[0].handle(),
            outs[0].handle_mut(),
            outs[1].handle_mut(),
            outs[2].handle_mut(),
            outs[3].handle_mut(),
            &mut ws_bytes,
            &mut executor,
        )
    };
    seal(pair, run, status, ws_bytes, executor, Aux::default())
}

pub(crate) fn rotate(
    pair: &OpPair<WsRotateFn>,
    mode: i64,
    ins: &[NativeTensor],
    outs: &[NativeTensor],
) -> NpuResult<Launch> {
    let (ws_fn, run) = pair.require()?;
    let mut ws_bytes = 0u64;
    let mut executor: *mut AclOpExecutor = ptr::null_mut();
    // SAFETY: 同 threshold，无辅助对象
    let status = unsafe {
        ws_fn(
            ins[0].handle(),
            mode,
            outs[0].handle_mut(),
            &mut ws_bytes,
            &mut executor,
        )
    };
    seal(pair, run, status, ws_bytes, executor, Aux::default())
}
