//! 算子属性包
//!
//! 字符串入口（按算子名分发）使用的位置属性容器。整数与浮点
//! 属性按位置取值，位置含义由具体算子定义；解析发生在 dispatch
//! 层的单一入口，这里只提供取值辅助。

use crate::{DataType, NpuError, NpuResult};

/// 通用算子属性
///
/// `ints` / `floats` 为位置参数列表，`dtype` 供需要目标类型的
/// 算子（如 Cast、归约）使用。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommonOpAttrs {
    /// 整数位置参数
    pub ints: Vec<i64>,
    /// 浮点位置参数
    pub floats: Vec<f64>,
    /// 可选的目标元素类型
    pub dtype: Option<DataType>,
}

impl CommonOpAttrs {
    /// 空属性包
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置整数参数
    pub fn with_ints(mut self, ints: impl Into<Vec<i64>>) -> Self {
        self.ints = ints.into();
        self
    }

    /// 设置浮点参数
    pub fn with_floats(mut self, floats: impl Into<Vec<f64>>) -> Self {
        self.floats = floats.into();
        self
    }

    /// 设置目标元素类型
    pub fn with_dtype(mut self, dtype: DataType) -> Self {
        self.dtype = Some(dtype);
        self
    }

    /// 按位置取整数参数
    pub fn int(&self, idx: usize) -> Option<i64> {
        self.ints.get(idx).copied()
    }

    /// 按位置取浮点参数
    pub fn float(&self, idx: usize) -> Option<f64> {
        self.floats.get(idx).copied()
    }

    /// 必选整数参数，缺失时报参数错误
    pub fn require_int(&self, idx: usize, op: &str) -> NpuResult<i64> {
        self.int(idx).ok_or_else(|| {
            NpuError::invalid(
                "intAttr",
                format!("operator {} requires int attribute at position {}", op, idx),
            )
        })
    }

    /// 必选浮点参数，缺失时报参数错误
    pub fn require_float(&self, idx: usize, op: &str) -> NpuResult<f64> {
        self.float(idx).ok_or_else(|| {
            NpuError::invalid(
                "floatAttr",
                format!(
                    "operator {} requires float attribute at position {}",
                    op, idx
                ),
            )
        })
    }

    /// 必选目标类型，缺失时报参数错误
    pub fn require_dtype(&self, op: &str) -> NpuResult<DataType> {
        self.dtype.ok_or_else(|| {
            NpuError::invalid(
                "dtype",
                format!("operator {} requires a target data type", op),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_access() {
        let attrs = CommonOpAttrs::new()
            .with_ints([2i64, 3])
            .with_floats([0.5f64]);
        assert_eq!(attrs.int(0), Some(2));
        assert_eq!(attrs.int(1), Some(3));
        assert_eq!(attrs.int(2), None);
        assert_eq!(attrs.float(0), Some(0.5));
    }

    #[test]
    fn test_required_attr_errors_name_the_operator() {
        let attrs = CommonOpAttrs::new();
        let err = attrs.require_float(1, "Clip").expect_err("missing attr");
        match err {
            NpuError::InvalidParameter { name, message } => {
                assert_eq!(name, "floatAttr");
                assert!(message.contains("Clip"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_require_dtype() {
        let attrs = CommonOpAttrs::new().with_dtype(DataType::Float16);
        assert_eq!(
            attrs.require_dtype("Cast").expect("dtype present"),
            DataType::Float16
        );
        assert!(CommonOpAttrs::new().require_dtype("Cast").is_err());
    }
}
