//! 张量列表家族的查询段编组
//!
//! Split 把输出侧打包成列表，Concat 把输入侧打包成列表。列表句柄与
//! 成员张量句柄各自销毁，互不接管。

use std::ptr;

use npu_core::NpuResult;
use npu_opapi::ffi::{AclOpExecutor, WsCatFn, WsSplitFn};
use npu_opapi::{NativeTensor, NativeTensorList, OpPair, SymbolTable};

use super::{Aux, Launch, seal};

pub(crate) fn split(
    table: &SymbolTable,
    pair: &OpPair<WsSplitFn>,
    axis: i64,
    sections: u64,
    ins: &[NativeTensor],
    outs: &[NativeTensor],
) -> NpuResult<Launch> {
    let (ws_fn, run) = pair.require()?;
    let out_list = NativeTensorList::new(table, outs)?;
    let mut ws_bytes = 0u64;
    let mut executor: *mut AclOpExecutor = ptr::null_mut();
    // SAFETY: 列表与成员句柄都在本作用域存活，列表随 Aux 延续
    let status = unsafe {
        ws_fn(
            ins[0].handle(),
            sections,
            axis,
            out_list.handle_mut(),
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
            lists: vec![out_list],
            ..Default::default()
        },
    )
}

pub(crate) fn concat(
    table: &SymbolTable,
    pair: &OpPair<WsCatFn>,
    axis: i64,
    ins: &[NativeTensor],
    outs: &[NativeTensor],
) -> NpuResult<Launch> {
    let (ws_fn, run) = pair.require()?;
    let in_list = NativeTensorList::new(table, ins)?;
    let mut ws_bytes = 0u64;
    let mut executor: *mut AclOpExecutor = ptr::null_mut();
    // SAFETY: 同 split
    let status = unsafe {
        ws_fn(
            in_list.handle(),
            axis,
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
            lists: vec![in_list],
            ..Default::default()
        },
    )
}
