//! 调度策略表
//!
//! 每个内建算子的元数（输入/输出个数）、ROI 视图策略、以及是否需要
//! 预清零输出，都集中在这里查表。调度器不对单个算子写特判。

use npu_core::{NpuError, NpuResult};
use npu_runtime::Tensor;

use crate::op::{Op, OpKind};

// ============================================================================
// 元数
// ============================================================================

/// 算子的输入/输出个数约束。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// 固定个数。
    Exact { ins: usize, outs: usize },
    /// 一个输入，输出个数由 sections 决定（Split）。
    OneToMany,
    /// 至少一个输入，一个输出（Concat）。
    ManyToOne,
}

pub fn arity(kind: OpKind) -> Arity {
    match kind {
        OpKind::Add
        | OpKind::Sub
        | OpKind::Mul
        | OpKind::Div
        | OpKind::BitwiseAnd
        | OpKind::BitwiseOr
        | OpKind::BitwiseXor
        | OpKind::LogicalAnd
        | OpKind::LogicalOr
        | OpKind::Equal
        | OpKind::Greater
        | OpKind::Less
        | OpKind::Matmul => Arity::Exact { ins: 2, outs: 1 },
        OpKind::Muls
        | OpKind::Pow
        | OpKind::Abs
        | OpKind::Neg
        | OpKind::Exp
        | OpKind::Log
        | OpKind::Sqrt
        | OpKind::Reciprocal
        | OpKind::Floor
        | OpKind::Ceil
        | OpKind::Round
        | OpKind::BitwiseNot
        | OpKind::LogicalNot
        | OpKind::Clip
        | OpKind::Cast
        | OpKind::Permute
        | OpKind::Flip
        | OpKind::Expand
        | OpKind::Sum
        | OpKind::Mean
        | OpKind::Threshold
        | OpKind::Rotate => Arity::Exact { ins: 1, outs: 1 },
        OpKind::Split => Arity::OneToMany,
        OpKind::Concat => Arity::ManyToOne,
        // min, max, min 坐标, max 坐标
        OpKind::MinMaxLoc => Arity::Exact { ins: 1, outs: 4 },
    }
}

/// 校验张量个数与算子元数一致。
pub fn check_arity(kind: OpKind, ins: usize, outs: usize) -> NpuResult<()> {
    let ok = match arity(kind) {
        Arity::Exact { ins: i, outs: o } => ins == i && outs == o,
        Arity::OneToMany => ins == 1 && outs >= 1,
        Arity::ManyToOne => ins >= 1 && outs == 1,
    };
    if ok {
        Ok(())
    } else {
        Err(NpuError::invalid(
            "arity",
            format!(
                "{} does not accept {} inputs / {} outputs",
                kind.name(),
                ins,
                outs
            ),
        ))
    }
}

/// 参数与张量组合的一致性校验，在触达厂商库之前执行。
pub(crate) fn check_op_tensors(op: &Op, _ins: &[Tensor], outs: &[Tensor]) -> NpuResult<()> {
    match op {
        Op::Split { sections, .. } => {
            if *sections as usize != outs.len() {
                return Err(NpuError::invalid(
                    "sections",
                    format!(
                        "Split into {} sections needs {} outputs, got {}",
                        sections,
                        sections,
                        outs.len()
                    ),
                ));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

// ============================================================================
// ROI 视图策略
// ============================================================================

/// 算子对 ROI 视图（非稠密张量）的接受程度。
///
/// 逐元素算子天然支持带 stride 的视图，只需防住输入输出共享存储
/// 且其中一方是视图的别名写。改变布局或聚合数据的算子一律要求
/// 稠密张量。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoiMode {
    /// 视图无限制。
    Allow,
    /// 视图可用，但拒绝"共享存储 + 任一方为视图"的别名组合。
    RejectAliased,
    /// 任何张量都不得是视图。
    Reject,
}

pub fn roi_mode(kind: OpKind) -> RoiMode {
    match kind {
        OpKind::Add
        | OpKind::Sub
        | OpKind::Mul
        | OpKind::Div
        | OpKind::BitwiseAnd
        | OpKind::BitwiseOr
        | OpKind::BitwiseXor
        | OpKind::LogicalAnd
        | OpKind::LogicalOr
        | OpKind::Equal
        | OpKind::Greater
        | OpKind::Less
        | OpKind::Muls
        | OpKind::Pow
        | OpKind::Abs
        | OpKind::Neg
        | OpKind::Exp
        | OpKind::Log
        | OpKind::Sqrt
        | OpKind::Reciprocal
        | OpKind::Floor
        | OpKind::Ceil
        | OpKind::Round
        | OpKind::BitwiseNot
        | OpKind::LogicalNot
        | OpKind::Clip
        | OpKind::Cast => RoiMode::RejectAliased,
        OpKind::Matmul
        | OpKind::Permute
        | OpKind::Flip
        | OpKind::Expand
        | OpKind::Split
        | OpKind::Concat
        | OpKind::Sum
        | OpKind::Mean
        | OpKind::Threshold
        | OpKind::Rotate => RoiMode::Reject,
        // 统计输出是新张量，输入 ROI 直接可用
        OpKind::MinMaxLoc => RoiMode::Allow,
    }
}

/// 按 ROI 策略校验本次调用的张量组合。
pub fn check_roi(kind: OpKind, ins: &[Tensor], outs: &[Tensor]) -> NpuResult<()> {
    match roi_mode(kind) {
        RoiMode::Allow => Ok(()),
        RoiMode::Reject => {
            for t in ins.iter().chain(outs.iter()) {
                if t.is_view() {
                    return Err(NpuError::invalid(
                        "roi",
                        format!("{} requires dense tensors, got a view", kind.name()),
                    ));
                }
            }
            Ok(())
        }
        RoiMode::RejectAliased => {
            for i in ins {
                for o in outs {
                    if i.same_storage(o) && (i.is_view() || o.is_view()) {
                        return Err(NpuError::invalid(
                            "roi",
                            format!(
                                "{} cannot alias a view input with an output in the same buffer",
                                kind.name()
                            ),
                        ));
                    }
                }
            }
            Ok(())
        }
    }
}

// ============================================================================
// 输出预清零
// ============================================================================

/// 执行前需要把输出清零的算子。
///
/// 目前只有 Sum：厂商实现会将部分和累加进输出缓冲，脏内存会污染结果。
pub fn needs_zeroed_output(kind: OpKind) -> bool {
    matches!(kind, OpKind::Sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use npu_core::ErrorKind;

    #[test]
    fn test_arity_table() {
        assert_eq!(arity(OpKind::Add), Arity::Exact { ins: 2, outs: 1 });
        assert_eq!(arity(OpKind::Abs), Arity::Exact { ins: 1, outs: 1 });
        assert_eq!(arity(OpKind::MinMaxLoc), Arity::Exact { ins: 1, outs: 4 });
        assert_eq!(arity(OpKind::Split), Arity::OneToMany);
        assert_eq!(arity(OpKind::Concat), Arity::ManyToOne);
    }

    #[test]
    fn test_check_arity_rejects_mismatch() {
        assert!(check_arity(OpKind::Add, 2, 1).is_ok());
        let err = check_arity(OpKind::Add, 1, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParam);
        assert!(check_arity(OpKind::Split, 1, 3).is_ok());
        assert!(check_arity(OpKind::Split, 2, 3).is_err());
        assert!(check_arity(OpKind::Concat, 4, 1).is_ok());
        assert!(check_arity(OpKind::Concat, 4, 2).is_err());
    }

    #[test]
    fn test_zero_init_set() {
        assert!(needs_zeroed_output(OpKind::Sum));
        assert!(!needs_zeroed_output(OpKind::Mean));
        assert!(!needs_zeroed_output(OpKind::Add));
    }

    #[test]
    fn test_roi_mode_table() {
        assert_eq!(roi_mode(OpKind::Add), RoiMode::RejectAliased);
        assert_eq!(roi_mode(OpKind::Cast), RoiMode::RejectAliased);
        assert_eq!(roi_mode(OpKind::Permute), RoiMode::Reject);
        assert_eq!(roi_mode(OpKind::Matmul), RoiMode::Reject);
        assert_eq!(roi_mode(OpKind::MinMaxLoc), RoiMode::Allow);
    }
}
