//! 元素类型定义
//!
//! 枚举值与厂商 ABI 的 `aclDataType` 数值一一对应，跨 FFI 边界
//! 直接按数值传递，不做任何重映射。

use crate::{NpuError, NpuResult};

/// 张量元素类型
///
/// 判别值即厂商 ABI 数值，`as i32` 可直接进入 FFI 调用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum DataType {
    /// 32 位浮点
    Float = 0,
    /// 16 位浮点
    Float16 = 1,
    /// 有符号 8 位整数
    Int8 = 2,
    /// 有符号 32 位整数
    Int32 = 3,
    /// 无符号 8 位整数
    Uint8 = 4,
    /// 有符号 16 位整数
    Int16 = 6,
    /// 无符号 16 位整数
    Uint16 = 7,
    /// 无符号 32 位整数
    Uint32 = 8,
    /// 有符号 64 位整数
    Int64 = 9,
    /// 无符号 64 位整数
    Uint64 = 10,
    /// 64 位浮点
    Double = 11,
    /// 布尔
    Bool = 12,
}

impl DataType {
    /// 厂商 ABI 数值
    pub fn acl(self) -> i32 {
        self as i32
    }

    /// 单个元素的字节数
    pub fn elem_size(self) -> usize {
        match self {
            DataType::Int8 | DataType::Uint8 | DataType::Bool => 1,
            DataType::Float16 | DataType::Int16 | DataType::Uint16 => 2,
            DataType::Float | DataType::Int32 | DataType::Uint32 => 4,
            DataType::Int64 | DataType::Uint64 | DataType::Double => 8,
        }
    }

    /// 是否为整数族类型（含布尔）
    pub fn is_integer(self) -> bool {
        !matches!(self, DataType::Float | DataType::Float16 | DataType::Double)
    }

    /// 是否为浮点族类型
    pub fn is_float(self) -> bool {
        matches!(self, DataType::Float | DataType::Float16 | DataType::Double)
    }

    /// 从厂商 ABI 数值还原，未知数值报参数错误
    pub fn from_acl(value: i32) -> NpuResult<Self> {
        let dt = match value {
            0 => DataType::Float,
            1 => DataType::Float16,
            2 => DataType::Int8,
            3 => DataType::Int32,
            4 => DataType::Uint8,
            6 => DataType::Int16,
            7 => DataType::Uint16,
            8 => DataType::Uint32,
            9 => DataType::Int64,
            10 => DataType::Uint64,
            11 => DataType::Double,
            12 => DataType::Bool,
            other => {
                return Err(NpuError::invalid(
                    "dtype",
                    format!("unknown aclDataType value {}", other),
                ));
            }
        };
        Ok(dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acl_values_match_vendor_abi() {
        assert_eq!(DataType::Float.acl(), 0);
        assert_eq!(DataType::Float16.acl(), 1);
        assert_eq!(DataType::Int8.acl(), 2);
        assert_eq!(DataType::Int32.acl(), 3);
        assert_eq!(DataType::Uint8.acl(), 4);
        assert_eq!(DataType::Int16.acl(), 6);
        assert_eq!(DataType::Uint16.acl(), 7);
        assert_eq!(DataType::Uint32.acl(), 8);
        assert_eq!(DataType::Int64.acl(), 9);
        assert_eq!(DataType::Uint64.acl(), 10);
        assert_eq!(DataType::Double.acl(), 11);
        assert_eq!(DataType::Bool.acl(), 12);
    }

    #[test]
    fn test_elem_size() {
        assert_eq!(DataType::Uint8.elem_size(), 1);
        assert_eq!(DataType::Float16.elem_size(), 2);
        assert_eq!(DataType::Float.elem_size(), 4);
        assert_eq!(DataType::Int64.elem_size(), 8);
        assert_eq!(DataType::Double.elem_size(), 8);
    }

    #[test]
    fn test_roundtrip_and_unknown_value() {
        for v in [0, 1, 2, 3, 4, 6, 7, 8, 9, 10, 11, 12] {
            let dt = DataType::from_acl(v).expect("known value");
            assert_eq!(dt.acl(), v);
        }
        assert!(DataType::from_acl(5).is_err());
        assert!(DataType::from_acl(99).is_err());
    }

    #[test]
    fn test_family_predicates() {
        assert!(DataType::Uint8.is_integer());
        assert!(DataType::Bool.is_integer());
        assert!(!DataType::Float.is_integer());
        assert!(DataType::Float16.is_float());
        assert!(!DataType::Int64.is_float());
    }
}
