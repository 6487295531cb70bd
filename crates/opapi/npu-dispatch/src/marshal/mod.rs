//! 查询段编组
//!
//! 每个算子家族一个编组函数：把类型化参数降为厂商对象（标量、整数
//! 数组、张量列表），调用查询段入口点，产出待执行的 [`Launch`]。
//! 辅助对象的所有权进入 `Launch`，在执行段结束前保持存活；`Launch`
//! 被丢弃时按 RAII 逐个销毁，失败路径同样生效。

use npu_core::{NpuError, NpuResult};
use npu_opapi::ffi::{ACL_SUCCESS, AclOpExecutor, AclnnStatus, RunFn};
use npu_opapi::{
    NativeIntArray, NativeScalar, NativeTensor, NativeTensorList, OpPair, SymbolTable,
};
use npu_runtime::Tensor;

use crate::op::Op;

pub(crate) mod elementwise;
pub(crate) mod layout;
pub(crate) mod lists;
pub(crate) mod reduce;
pub(crate) mod vision;

/// 查询段产出的厂商辅助对象，必须活到执行段完成。
#[derive(Default)]
pub(crate) struct Aux {
    pub scalars: Vec<NativeScalar>,
    pub arrays: Vec<NativeIntArray>,
    pub lists: Vec<NativeTensorList>,
}

/// 查询段完成后的待执行状态。
pub(crate) struct Launch {
    /// 厂商报告的工作区字节数
    pub ws_bytes: u64,
    /// 执行器对象，由执行段消费
    pub executor: *mut AclOpExecutor,
    /// 执行段入口点
    pub run: RunFn,
    /// 执行段符号名，用于失败报告
    pub run_symbol: String,
    /// 生命周期托管的辅助对象
    pub aux: Aux,
}

/// 查询段收尾：非零状态保留厂商状态码报错，成功则封装 [`Launch`]。
fn seal<W: Copy>(
    pair: &OpPair<W>,
    run: RunFn,
    status: AclnnStatus,
    ws_bytes: u64,
    executor: *mut AclOpExecutor,
    aux: Aux,
) -> NpuResult<Launch> {
    if status != ACL_SUCCESS {
        return Err(NpuError::vendor(pair.ws_symbol(), status));
    }
    Ok(Launch {
        ws_bytes,
        executor,
        run,
        run_symbol: pair.run_symbol(),
        aux,
    })
}

/// 按算子家族编组并执行查询段。
///
/// `ins`/`outs` 的个数已经过元数校验，这里直接按位置取用。
pub(crate) fn prepare(
    table: &SymbolTable,
    op: &Op,
    ins_t: &[Tensor],
    outs_t: &[Tensor],
    ins: &[NativeTensor],
    outs: &[NativeTensor],
) -> NpuResult<Launch> {
    match op {
        Op::Add { alpha } => elementwise::binary_alpha(table, &table.add, *alpha, ins, outs),
        Op::Sub { alpha } => elementwise::binary_alpha(table, &table.sub, *alpha, ins, outs),
        Op::Mul => elementwise::binary(&table.mul, ins, outs),
        Op::Div => elementwise::binary(&table.div, ins, outs),
        Op::BitwiseAnd => elementwise::binary(&table.bitwise_and, ins, outs),
        Op::BitwiseOr => elementwise::binary(&table.bitwise_or, ins, outs),
        Op::BitwiseXor => elementwise::binary(&table.bitwise_xor, ins, outs),
        Op::LogicalAnd => elementwise::binary(&table.logical_and, ins, outs),
        Op::LogicalOr => elementwise::binary(&table.logical_or, ins, outs),
        Op::Equal => elementwise::binary(&table.eq_tensor, ins, outs),
        Op::Greater => elementwise::binary(&table.gt_tensor, ins, outs),
        Op::Less => elementwise::binary(&table.lt_tensor, ins, outs),
        Op::Matmul { cube_math_type } => {
            elementwise::matmul(&table.matmul, *cube_math_type, ins, outs)
        }
        Op::Muls { scalar } => elementwise::tensor_scalar(table, &table.muls, *scalar, ins, outs),
        Op::Pow { exponent } => {
            elementwise::tensor_scalar(table, &table.pow_tensor_scalar, *exponent, ins, outs)
        }
        Op::Abs => elementwise::unary(&table.abs, ins, outs),
        Op::Neg => elementwise::unary(&table.neg, ins, outs),
        Op::Exp => elementwise::unary(&table.exp, ins, outs),
        Op::Log => elementwise::unary(&table.log, ins, outs),
        Op::Sqrt => elementwise::unary(&table.sqrt, ins, outs),
        Op::Reciprocal => elementwise::unary(&table.reciprocal, ins, outs),
        Op::Floor => elementwise::unary(&table.floor, ins, outs),
        Op::Ceil => elementwise::unary(&table.ceil, ins, outs),
        Op::Round => elementwise::unary(&table.round, ins, outs),
        Op::BitwiseNot => elementwise::unary(&table.bitwise_not, ins, outs),
        Op::LogicalNot => elementwise::unary(&table.logical_not, ins, outs),
        Op::Clip { lo, hi } => {
            elementwise::clamp(table, &table.clamp, *lo, *hi, ins_t[0].dtype(), ins, outs)
        }
        Op::Cast { to } => elementwise::cast(&table.cast, *to, ins, outs),
        Op::Permute { dims } => layout::int_array(table, &table.permute, dims, ins, outs),
        Op::Flip { dims } => layout::int_array(table, &table.flip, dims, ins, outs),
        Op::Expand { shape } => layout::int_array(table, &table.expand, shape, ins, outs),
        Op::Split { axis, sections } => {
            lists::split(table, &table.split_tensor, *axis, *sections, ins, outs)
        }
        Op::Concat { axis } => lists::concat(table, &table.cat, *axis, ins, outs),
        Op::Sum {
            dims,
            keep_dims,
            out_dtype,
        } => reduce::reduce(
            table,
            &table.reduce_sum,
            dims,
            *keep_dims,
            out_dtype.unwrap_or(outs_t[0].dtype()),
            ins,
            outs,
        ),
        Op::Mean {
            dims,
            keep_dims,
            out_dtype,
        } => reduce::reduce(
            table,
            &table.mean,
            dims,
            *keep_dims,
            out_dtype.unwrap_or(outs_t[0].dtype()),
            ins,
            outs,
        ),
        Op::Threshold {
            thresh,
            max_val,
            threshold_type,
        } => vision::threshold(
            table,
            &table.threshold,
            *thresh,
            *max_val,
            *threshold_type,
            ins,
            outs,
        ),
        Op::MinMaxLoc => vision::min_max_loc(&table.min_max_loc, ins, outs),
        Op::Rotate { mode } => vision::rotate(&table.rotate, *mode, ins, outs),
    }
}
