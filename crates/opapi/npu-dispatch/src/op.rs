//! 算子模型
//!
//! 对外的算子名是稳定字符串（"Add"、"Clip"、"Sum" 等），与厂商入口点名
//! 解耦。`OpKind` 是无参数判别，用于名字查表与策略查表；`Op` 携带
//! 已经校验过的类型化参数。属性解析集中在 [`Op::parse`]，保证进入
//! 调度器的算子不再有缺参或越界参数。

use npu_core::{CommonOpAttrs, DataType, NpuError, NpuResult};

// ============================================================================
// OpKind: 无参数判别
// ============================================================================

/// 内建算子的判别标识。
///
/// 与 [`Op`] 一一对应。名字表见 [`OpKind::name`]。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    // 逐元素二元
    Add,
    Sub,
    Mul,
    Div,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    LogicalAnd,
    LogicalOr,
    // 逐元素比较
    Equal,
    Greater,
    Less,
    // 矩阵乘
    Matmul,
    // 张量-标量
    Muls,
    Pow,
    // 逐元素一元
    Abs,
    Neg,
    Exp,
    Log,
    Sqrt,
    Reciprocal,
    Floor,
    Ceil,
    Round,
    BitwiseNot,
    LogicalNot,
    Clip,
    Cast,
    // 布局
    Permute,
    Flip,
    Expand,
    // 张量列表
    Split,
    Concat,
    // 归约
    Sum,
    Mean,
    // 自定义库
    Threshold,
    MinMaxLoc,
    Rotate,
}

impl OpKind {
    /// 全部内建算子，顺序与声明一致。
    pub const ALL: [OpKind; 38] = [
        OpKind::Add,
        OpKind::Sub,
        OpKind::Mul,
        OpKind::Div,
        OpKind::BitwiseAnd,
        OpKind::BitwiseOr,
        OpKind::BitwiseXor,
        OpKind::LogicalAnd,
        OpKind::LogicalOr,
        OpKind::Equal,
        OpKind::Greater,
        OpKind::Less,
        OpKind::Matmul,
        OpKind::Muls,
        OpKind::Pow,
        OpKind::Abs,
        OpKind::Neg,
        OpKind::Exp,
        OpKind::Log,
        OpKind::Sqrt,
        OpKind::Reciprocal,
        OpKind::Floor,
        OpKind::Ceil,
        OpKind::Round,
        OpKind::BitwiseNot,
        OpKind::LogicalNot,
        OpKind::Clip,
        OpKind::Cast,
        OpKind::Permute,
        OpKind::Flip,
        OpKind::Expand,
        OpKind::Split,
        OpKind::Concat,
        OpKind::Sum,
        OpKind::Mean,
        OpKind::Threshold,
        OpKind::MinMaxLoc,
        OpKind::Rotate,
    ];

    /// 对外的稳定算子名。
    pub fn name(self) -> &'static str {
        match self {
            OpKind::Add => "Add",
            OpKind::Sub => "Sub",
            OpKind::Mul => "Mul",
            OpKind::Div => "Div",
            OpKind::BitwiseAnd => "BitwiseAnd",
            OpKind::BitwiseOr => "BitwiseOr",
            OpKind::BitwiseXor => "BitwiseXor",
            OpKind::LogicalAnd => "LogicalAnd",
            OpKind::LogicalOr => "LogicalOr",
            OpKind::Equal => "Equal",
            OpKind::Greater => "Greater",
            OpKind::Less => "Less",
            OpKind::Matmul => "Matmul",
            OpKind::Muls => "Muls",
            OpKind::Pow => "Pow",
            OpKind::Abs => "Abs",
            OpKind::Neg => "Neg",
            OpKind::Exp => "Exp",
            OpKind::Log => "Log",
            OpKind::Sqrt => "Sqrt",
            OpKind::Reciprocal => "Reciprocal",
            OpKind::Floor => "Floor",
            OpKind::Ceil => "Ceil",
            OpKind::Round => "Round",
            OpKind::BitwiseNot => "BitwiseNot",
            OpKind::LogicalNot => "LogicalNot",
            OpKind::Clip => "Clip",
            OpKind::Cast => "Cast",
            OpKind::Permute => "Permute",
            OpKind::Flip => "Flip",
            OpKind::Expand => "Expand",
            OpKind::Split => "Split",
            OpKind::Concat => "Concat",
            OpKind::Sum => "Sum",
            OpKind::Mean => "Mean",
            OpKind::Threshold => "Threshold",
            OpKind::MinMaxLoc => "MinMaxLoc",
            OpKind::Rotate => "Rotate",
        }
    }

    /// 按对外名字反查。未知名字返回 `None`，由调用方决定落到
    /// 自定义算子还是报错。
    pub fn from_name(name: &str) -> Option<OpKind> {
        OpKind::ALL.iter().copied().find(|k| k.name() == name)
    }
}

// ============================================================================
// Op: 类型化算子
// ============================================================================

/// 携带已校验参数的算子。
///
/// 由 [`Op::parse`] 从通用属性包构造，之后各字段不再需要运行期校验。
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// out = in0 + alpha * in1
    Add { alpha: i64 },
    /// out = in0 - alpha * in1
    Sub { alpha: i64 },
    Mul,
    Div,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    LogicalAnd,
    LogicalOr,
    Equal,
    Greater,
    Less,
    /// cube_math_type 控制 cube 单元的精度模式，直传厂商。
    Matmul { cube_math_type: i8 },
    Muls { scalar: f32 },
    Pow { exponent: f32 },
    Abs,
    Neg,
    Exp,
    Log,
    Sqrt,
    Reciprocal,
    Floor,
    Ceil,
    Round,
    BitwiseNot,
    LogicalNot,
    /// 区间截断。界标量按输入 dtype 下发（u8 为 INT32，其余 FLOAT）。
    Clip { lo: f64, hi: f64 },
    Cast { to: DataType },
    Permute { dims: Vec<i64> },
    Flip { dims: Vec<i64> },
    Expand { shape: Vec<i64> },
    /// 沿 axis 均分为 sections 份，输出个数必须等于 sections。
    Split { axis: i64, sections: u64 },
    Concat { axis: i64 },
    /// 归约求和。输出在执行前清零。
    Sum {
        dims: Vec<i64>,
        keep_dims: bool,
        out_dtype: Option<DataType>,
    },
    Mean {
        dims: Vec<i64>,
        keep_dims: bool,
        out_dtype: Option<DataType>,
    },
    Threshold {
        thresh: f64,
        max_val: f64,
        threshold_type: i64,
    },
    MinMaxLoc,
    /// mode: 0 = 90 度, 1 = 180 度, 2 = 270 度。
    Rotate { mode: i64 },
}

impl Op {
    pub fn kind(&self) -> OpKind {
        match self {
            Op::Add { .. } => OpKind::Add,
            Op::Sub { .. } => OpKind::Sub,
            Op::Mul => OpKind::Mul,
            Op::Div => OpKind::Div,
            Op::BitwiseAnd => OpKind::BitwiseAnd,
            Op::BitwiseOr => OpKind::BitwiseOr,
            Op::BitwiseXor => OpKind::BitwiseXor,
            Op::LogicalAnd => OpKind::LogicalAnd,
            Op::LogicalOr => OpKind::LogicalOr,
            Op::Equal => OpKind::Equal,
            Op::Greater => OpKind::Greater,
            Op::Less => OpKind::Less,
            Op::Matmul { .. } => OpKind::Matmul,
            Op::Muls { .. } => OpKind::Muls,
            Op::Pow { .. } => OpKind::Pow,
            Op::Abs => OpKind::Abs,
            Op::Neg => OpKind::Neg,
            Op::Exp => OpKind::Exp,
            Op::Log => OpKind::Log,
            Op::Sqrt => OpKind::Sqrt,
            Op::Reciprocal => OpKind::Reciprocal,
            Op::Floor => OpKind::Floor,
            Op::Ceil => OpKind::Ceil,
            Op::Round => OpKind::Round,
            Op::BitwiseNot => OpKind::BitwiseNot,
            Op::LogicalNot => OpKind::LogicalNot,
            Op::Clip { .. } => OpKind::Clip,
            Op::Cast { .. } => OpKind::Cast,
            Op::Permute { .. } => OpKind::Permute,
            Op::Flip { .. } => OpKind::Flip,
            Op::Expand { .. } => OpKind::Expand,
            Op::Split { .. } => OpKind::Split,
            Op::Concat { .. } => OpKind::Concat,
            Op::Sum { .. } => OpKind::Sum,
            Op::Mean { .. } => OpKind::Mean,
            Op::Threshold { .. } => OpKind::Threshold,
            Op::MinMaxLoc => OpKind::MinMaxLoc,
            Op::Rotate { .. } => OpKind::Rotate,
        }
    }

    /// 从通用属性包解析出类型化算子。
    ///
    /// 解析规则:
    /// - `Add`/`Sub`: `ints[0]` 为 alpha，缺省 1
    /// - `Matmul`: `ints[0]` 为 cube_math_type，缺省 0
    /// - `Muls`/`Pow`: `floats[0]` 必填
    /// - `Clip`: `floats[0]`/`floats[1]` 为下/上界，必填且 lo <= hi
    /// - `Cast`: `dtype` 必填
    /// - `Permute`/`Flip`/`Expand`: `ints` 为轴/形状，非空
    /// - `Split`: `ints[0]` 为 axis，`ints[1]` 为 sections (> 0)
    /// - `Concat`: `ints[0]` 为 axis
    /// - `Sum`/`Mean`: `ints` 为归约轴（空 = 全部），`floats[0]` 非零表示
    ///   keep_dims，`dtype` 可选指定输出类型
    /// - `Threshold`: `floats[0]`/`floats[1]` 为阈值/上限，`ints[0]` 为
    ///   阈值类型 (0..=4)，缺省 0
    /// - `Rotate`: `ints[0]` 为模式 (0..=2)，必填
    ///
    /// 缺参或越界一律返回 `InvalidParameter`，不触达厂商库。
    pub fn parse(kind: OpKind, attrs: &CommonOpAttrs) -> NpuResult<Op> {
        let op = match kind {
            OpKind::Add => Op::Add {
                alpha: attrs.int(0).unwrap_or(1),
            },
            OpKind::Sub => Op::Sub {
                alpha: attrs.int(0).unwrap_or(1),
            },
            OpKind::Mul => Op::Mul,
            OpKind::Div => Op::Div,
            OpKind::BitwiseAnd => Op::BitwiseAnd,
            OpKind::BitwiseOr => Op::BitwiseOr,
            OpKind::BitwiseXor => Op::BitwiseXor,
            OpKind::LogicalAnd => Op::LogicalAnd,
            OpKind::LogicalOr => Op::LogicalOr,
            OpKind::Equal => Op::Equal,
            OpKind::Greater => Op::Greater,
            OpKind::Less => Op::Less,
            OpKind::Matmul => {
                let raw = attrs.int(0).unwrap_or(0);
                let cube_math_type = i8::try_from(raw).map_err(|_| {
                    NpuError::invalid("cube_math_type", format!("value {} out of range", raw))
                })?;
                Op::Matmul { cube_math_type }
            }
            OpKind::Muls => Op::Muls {
                scalar: attrs.require_float(0, "Muls")? as f32,
            },
            OpKind::Pow => Op::Pow {
                exponent: attrs.require_float(0, "Pow")? as f32,
            },
            OpKind::Abs => Op::Abs,
            OpKind::Neg => Op::Neg,
            OpKind::Exp => Op::Exp,
            OpKind::Log => Op::Log,
            OpKind::Sqrt => Op::Sqrt,
            OpKind::Reciprocal => Op::Reciprocal,
            OpKind::Floor => Op::Floor,
            OpKind::Ceil => Op::Ceil,
            OpKind::Round => Op::Round,
            OpKind::BitwiseNot => Op::BitwiseNot,
            OpKind::LogicalNot => Op::LogicalNot,
            OpKind::Clip => {
                let lo = attrs.require_float(0, "Clip")?;
                let hi = attrs.require_float(1, "Clip")?;
                if lo > hi {
                    return Err(NpuError::invalid(
                        "clip_bounds",
                        format!("lower bound {} above upper bound {}", lo, hi),
                    ));
                }
                Op::Clip { lo, hi }
            }
            OpKind::Cast => Op::Cast {
                to: attrs.require_dtype("Cast")?,
            },
            OpKind::Permute => Op::Permute {
                dims: require_axes(attrs, "Permute")?,
            },
            OpKind::Flip => Op::Flip {
                dims: require_axes(attrs, "Flip")?,
            },
            OpKind::Expand => Op::Expand {
                shape: require_axes(attrs, "Expand")?,
            },
            OpKind::Split => {
                let axis = attrs.require_int(0, "Split")?;
                let sections = attrs.require_int(1, "Split")?;
                if sections <= 0 {
                    return Err(NpuError::invalid(
                        "sections",
                        format!("Split needs a positive section count, got {}", sections),
                    ));
                }
                Op::Split {
                    axis,
                    sections: sections as u64,
                }
            }
            OpKind::Concat => Op::Concat {
                axis: attrs.require_int(0, "Concat")?,
            },
            OpKind::Sum => Op::Sum {
                dims: attrs.ints.clone(),
                keep_dims: attrs.float(0).map(|v| v != 0.0).unwrap_or(false),
                out_dtype: attrs.dtype,
            },
            OpKind::Mean => Op::Mean {
                dims: attrs.ints.clone(),
                keep_dims: attrs.float(0).map(|v| v != 0.0).unwrap_or(false),
                out_dtype: attrs.dtype,
            },
            OpKind::Threshold => {
                let threshold_type = attrs.int(0).unwrap_or(0);
                if !(0..=4).contains(&threshold_type) {
                    return Err(NpuError::invalid(
                        "threshold_type",
                        format!("expected 0..=4, got {}", threshold_type),
                    ));
                }
                Op::Threshold {
                    thresh: attrs.require_float(0, "Threshold")?,
                    max_val: attrs.require_float(1, "Threshold")?,
                    threshold_type,
                }
            }
            OpKind::MinMaxLoc => Op::MinMaxLoc,
            OpKind::Rotate => {
                let mode = attrs.require_int(0, "Rotate")?;
                if !(0..=2).contains(&mode) {
                    return Err(NpuError::invalid(
                        "rotate_mode",
                        format!("expected 0..=2, got {}", mode),
                    ));
                }
                Op::Rotate { mode }
            }
        };
        Ok(op)
    }
}

fn require_axes(attrs: &CommonOpAttrs, op: &str) -> NpuResult<Vec<i64>> {
    if attrs.ints.is_empty() {
        return Err(NpuError::invalid(
            "dims",
            format!("{} needs a non-empty axis list", op),
        ));
    }
    Ok(attrs.ints.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use npu_core::ErrorKind;

    #[test]
    fn test_name_round_trip() {
        for kind in OpKind::ALL {
            assert_eq!(OpKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(OpKind::from_name("NoSuchOp"), None);
        assert_eq!(OpKind::from_name("add"), None); // 大小写敏感
    }

    #[test]
    fn test_alpha_defaults_to_one() {
        let op = Op::parse(OpKind::Add, &CommonOpAttrs::default()).unwrap();
        assert_eq!(op, Op::Add { alpha: 1 });
        let op = Op::parse(OpKind::Sub, &CommonOpAttrs::default().with_ints(vec![4])).unwrap();
        assert_eq!(op, Op::Sub { alpha: 4 });
    }

    #[test]
    fn test_clip_requires_ordered_bounds() {
        let attrs = CommonOpAttrs::default().with_floats(vec![2.0, 1.0]);
        let err = Op::parse(OpKind::Clip, &attrs).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParam);

        let attrs = CommonOpAttrs::default().with_floats(vec![-1.0, 1.0]);
        assert_eq!(
            Op::parse(OpKind::Clip, &attrs).unwrap(),
            Op::Clip { lo: -1.0, hi: 1.0 }
        );
    }

    #[test]
    fn test_missing_required_attr() {
        assert!(Op::parse(OpKind::Muls, &CommonOpAttrs::default()).is_err());
        assert!(Op::parse(OpKind::Cast, &CommonOpAttrs::default()).is_err());
        assert!(Op::parse(OpKind::Permute, &CommonOpAttrs::default()).is_err());
        assert!(Op::parse(OpKind::Rotate, &CommonOpAttrs::default()).is_err());
    }

    #[test]
    fn test_split_rejects_bad_sections() {
        let attrs = CommonOpAttrs::default().with_ints(vec![0, 0]);
        assert!(Op::parse(OpKind::Split, &attrs).is_err());
        let attrs = CommonOpAttrs::default().with_ints(vec![1, 3]);
        assert_eq!(
            Op::parse(OpKind::Split, &attrs).unwrap(),
            Op::Split {
                axis: 1,
                sections: 3
            }
        );
    }

    #[test]
    fn test_reduce_keep_dims_flag() {
        let attrs = CommonOpAttrs::default()
            .with_ints(vec![0, 2])
            .with_floats(vec![1.0]);
        match Op::parse(OpKind::Sum, &attrs).unwrap() {
            Op::Sum {
                dims, keep_dims, ..
            } => {
                assert_eq!(dims, vec![0, 2]);
                assert!(keep_dims);
            }
            other => panic!("unexpected op: {:?}", other),
        }
    }

    #[test]
    fn test_matmul_cube_range() {
        let attrs = CommonOpAttrs::default().with_ints(vec![1000]);
        assert!(Op::parse(OpKind::Matmul, &attrs).is_err());
        let attrs = CommonOpAttrs::default().with_ints(vec![1]);
        assert_eq!(
            Op::parse(OpKind::Matmul, &attrs).unwrap(),
            Op::Matmul { cube_math_type: 1 }
        );
    }

    #[test]
    fn test_rotate_mode_range() {
        let attrs = CommonOpAttrs::default().with_ints(vec![3]);
        assert!(Op::parse(OpKind::Rotate, &attrs).is_err());
    }
}
