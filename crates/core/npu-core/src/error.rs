//! 统一错误类型
//!
//! 调度层所有模块共用的错误类型。厂商返回的状态码在
//! [`NpuError::Vendor`] 中原样保留以便诊断，调用方通过
//! [`NpuError::kind`] 得到粗粒度类别进行分支。

use std::error::Error;
use std::fmt;

use crate::DeviceId;

/// 统一的 NPU 调度层错误类型
///
/// 所有子模块的错误最终都转换为这个类型。结构化变体保留
/// 诊断所需的细节（符号名、厂商状态码、失败的 API 名称），
/// [`ErrorKind`] 提供粗粒度分类。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NpuError {
    /// 符号未解析，对应算子不可用
    Unsupported {
        /// 缺失的入口点名称
        symbol: String,
    },
    /// 设备内存分配失败
    BadAlloc {
        /// 请求的字节数
        bytes: usize,
        /// 目标设备
        device: DeviceId,
    },
    /// 参数校验失败
    InvalidParameter {
        /// 参数名称
        name: String,
        /// 错误描述
        message: String,
    },
    /// 厂商调用返回非零状态码
    Vendor {
        /// 失败的入口点名称
        api: String,
        /// 厂商状态码，原样保留
        code: i32,
    },
    /// 厂商构造函数返回空句柄
    NullHandle {
        /// 失败的构造函数名称
        api: &'static str,
    },
}

/// 粗粒度错误类别
///
/// 调用方按类别分支，不需要理解每个结构化变体。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 入口点未解析
    Unsupported,
    /// 内存分配失败
    BadAlloc,
    /// 参数错误
    InvalidParam,
    /// 厂商调用失败
    VendorFailure,
}

impl NpuError {
    /// 构造未支持错误
    pub fn unsupported(symbol: impl Into<String>) -> Self {
        NpuError::Unsupported {
            symbol: symbol.into(),
        }
    }

    /// 构造参数错误
    pub fn invalid(name: impl Into<String>, message: impl Into<String>) -> Self {
        NpuError::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }

    /// 构造厂商调用错误
    pub fn vendor(api: impl Into<String>, code: i32) -> Self {
        NpuError::Vendor {
            api: api.into(),
            code,
        }
    }

    /// 返回粗粒度错误类别
    pub fn kind(&self) -> ErrorKind {
        match self {
            NpuError::Unsupported { .. } => ErrorKind::Unsupported,
            NpuError::BadAlloc { .. } => ErrorKind::BadAlloc,
            NpuError::InvalidParameter { .. } => ErrorKind::InvalidParam,
            NpuError::Vendor { .. } | NpuError::NullHandle { .. } => ErrorKind::VendorFailure,
        }
    }

    /// 厂商状态码（仅 [`NpuError::Vendor`] 携带）
    pub fn vendor_code(&self) -> Option<i32> {
        match self {
            NpuError::Vendor { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for NpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NpuError::Unsupported { symbol } => {
                write!(f, "Operator entry point '{}' is not available", symbol)
            }
            NpuError::BadAlloc { bytes, device } => {
                write!(
                    f,
                    "Failed to allocate {} bytes on device {}",
                    bytes, device
                )
            }
            NpuError::InvalidParameter { name, message } => {
                write!(f, "Invalid parameter '{}': {}", name, message)
            }
            NpuError::Vendor { api, code } => {
                write!(f, "Vendor call {} failed with status {}", api, code)
            }
            NpuError::NullHandle { api } => {
                write!(f, "Vendor call {} returned a null handle", api)
            }
        }
    }
}

impl Error for NpuError {}

/// 调度层统一 Result 类型
pub type NpuResult<T> = Result<T, NpuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            NpuError::unsupported("aclnnAdd").kind(),
            ErrorKind::Unsupported
        );
        assert_eq!(
            NpuError::BadAlloc {
                bytes: 64,
                device: 0
            }
            .kind(),
            ErrorKind::BadAlloc
        );
        assert_eq!(
            NpuError::invalid("op", "unknown operator").kind(),
            ErrorKind::InvalidParam
        );
        assert_eq!(
            NpuError::vendor("aclnnAdd", 161001).kind(),
            ErrorKind::VendorFailure
        );
        assert_eq!(
            NpuError::NullHandle {
                api: "aclCreateTensor"
            }
            .kind(),
            ErrorKind::VendorFailure
        );
    }

    #[test]
    fn test_vendor_code_preserved() {
        let err = NpuError::vendor("aclnnCast", 561103);
        assert_eq!(err.vendor_code(), Some(561103));
        assert_eq!(
            err.to_string(),
            "Vendor call aclnnCast failed with status 561103"
        );
    }

    #[test]
    fn test_vendor_code_absent_for_other_kinds() {
        assert_eq!(NpuError::unsupported("aclnnMean").vendor_code(), None);
        assert_eq!(NpuError::invalid("roi", "out of bounds").vendor_code(), None);
    }
}
