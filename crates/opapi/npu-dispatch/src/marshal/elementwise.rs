//! 逐元素家族的查询段编组
//!
//! 二元、带 alpha 的二元、矩阵乘、张量-标量、一元、截断、类型转换。
//! 标量降级规则：alpha 与张量-标量值统一按 FLOAT 下发；截断的上下界
//! 跟随输入 dtype：u8 走 INT32，其余一律 FLOAT。

use std::ptr;

use npu_core::{DataType, NpuResult};
use npu_opapi::ffi::{
    AclOpExecutor, WsBinaryAlphaFn, WsBinaryFn, WsCastFn, WsClampFn, WsMatmulFn, WsTensorScalarFn,
    WsUnaryFn,
};
use npu_opapi::{NativeScalar, NativeTensor, OpPair, SymbolTable};

use super::{Aux, Launch, seal};

pub(crate) fn binary(
    pair: &OpPair<WsBinaryFn>,
    ins: &[NativeTensor],
    outs: &[NativeTensor],
) -> NpuResult<Launch> {
    let (ws_fn, run) = pair.require()?;
    let mut ws_bytes = 0u64;
    let mut executor: *mut AclOpExecutor = ptr::null_mut();
    // SAFETY: 句柄由本次调用的包装器持有，查询段只读元数据
    let status = unsafe {
        ws_fn(
            ins[0].handle(),
            ins[1].handle(),
            outs[0].handle_mut(),
            &mut ws_bytes,
            &mut executor,
        )
    };
    seal(pair, run, status, ws_bytes, executor, Aux::default())
}

pub(crate) fn binary_alpha(
    table: &SymbolTable,
    pair: &OpPair<WsBinaryAlphaFn>,
    alpha: i64,
    ins: &[NativeTensor],
    outs: &[NativeTensor],
) -> NpuResult<Launch> {
    let (ws_fn, run) = pair.require()?;
    let alpha = NativeScalar::from_f32(table, alpha as f32)?;
    let mut ws_bytes = 0u64;
    let mut executor: *mut AclOpExecutor = ptr::null_mut();
    // SAFETY: alpha 标量随 Aux 存活到执行段之后
    let status = unsafe {
        ws_fn(
            ins[0].handle(),
            ins[1].handle(),
            alpha.handle(),
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
            scalars: vec![alpha],
            ..Default::default()
        },
    )
}

pub(crate) fn matmul(
    pair: &OpPair<WsMatmulFn>,
    cube_math_type: i8,
    ins: &[NativeTensor],
    outs: &[NativeTensor],
) -> NpuResult<Launch> {
    let (ws_fn, run) = pair.require()?;
    let mut ws_bytes = 0u64;
    let mut executor: *mut AclOpExecutor = ptr::null_mut();
    // SAFETY: 同 binary
    let status = unsafe {
        ws_fn(
            ins[0].handle(),
            ins[1].handle(),
            outs[0].handle_mut(),
            cube_math_type,
            &mut ws_bytes,
            &mut executor,
        )
    };
    seal(pair, run, status, ws_bytes, executor, Aux::default())
}

pub(crate) fn tensor_scalar(
    table: &SymbolTable,
    pair: &OpPair<WsTensorScalarFn>,
    value: f32,
    ins: &[NativeTensor],
    outs: &[NativeTensor],
) -> NpuResult<Launch> {
    let (ws_fn, run) = pair.require()?;
    let scalar = NativeScalar::from_f32(table, value)?;
    let mut ws_bytes = 0u64;
    let mut executor: *mut AclOpExecutor = ptr::null_mut();
    // SAFETY: 标量随 Aux 存活到执行段之后
    let status = unsafe {
        ws_fn(
            ins[0].handle(),
            scalar.handle(),
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
            scalars: vec![scalar],
            ..Default::default()
        },
    )
}

pub(crate) fn unary(
    pair: &OpPair<WsUnaryFn>,
    ins: &[NativeTensor],
    outs: &[NativeTensor],
) -> NpuResult<Launch> {
    let (ws_fn, run) = pair.require()?;
    let mut ws_bytes = 0u64;
    let mut executor: *mut AclOpExecutor = ptr::null_mut();
    // SAFETY: 同 binary
    let status = unsafe {
        ws_fn(
            ins[0].handle(),
            outs[0].handle_mut(),
            &mut ws_bytes,
            &mut executor,
        )
    };
    seal(pair, run, status, ws_bytes, executor, Aux::default())
}

pub(crate) fn clamp(
    table: &SymbolTable,
    pair: &OpPair<WsClampFn>,
    lo: f64,
    hi: f64,
    dtype: DataType,
    ins: &[NativeTensor],
    outs: &[NativeTensor],
) -> NpuResult<Launch> {
    let (ws_fn, run) = pair.require()?;
    // 仅 u8 输入下发 INT32 界（f64 -> i32 的 as 转换自带饱和），
    // 其余 dtype 包括别的整型都走 FLOAT
    let (lo_s, hi_s) = if matches!(dtype, DataType::Uint8) {
        (
            NativeScalar::from_i32(table, lo as i32)?,
            NativeScalar::from_i32(table, hi as i32)?,
        )
    } else {
        (
            NativeScalar::from_f32(table, lo as f32)?,
            NativeScalar::from_f32(table, hi as f32)?,
        )
    };
    let mut ws_bytes = 0u64;
    let mut executor: *mut AclOpExecutor = ptr::null_mut();
    // SAFETY: 两个界标量随 Aux 存活到执行段之后
    let status = unsafe {
        ws_fn(
            ins[0].handle(),
            lo_s.handle(),
            hi_s.handle(),
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
            scalars: vec![lo_s, hi_s],
            ..Default::default()
        },
    )
}

pub(crate) fn cast(
    pair: &OpPair<WsCastFn>,
    to: DataType,
    ins: &[NativeTensor],
    outs: &[NativeTensor],
) -> NpuResult<Launch> {
    let (ws_fn, run) = pair.require()?;
    let mut ws_bytes = 0u64;
    let mut executor: *mut AclOpExecutor = ptr::null_mut();
    // SAFETY: 同 binary
    let status = unsafe {
        ws_fn(
            ins[0].handle(),
            to.acl(),
            outs[0].handle_mut(),
            &mut ws_bytes,
            &mut executor,
        )
    };
    seal(pair, run, status, ws_bytes, executor, Aux::default())
}
