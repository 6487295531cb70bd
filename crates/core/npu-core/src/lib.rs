//! NPU 算子调度层核心类型
//!
//! 提供整个调度层共享的基础设施：统一错误类型、元素类型定义、
//! 算子属性包以及配置管理。上层 crate（runtime / opapi / dispatch）
//! 都建立在这些类型之上。

pub mod attrs;
pub mod config;
pub mod dtype;
pub mod error;

pub use attrs::CommonOpAttrs;
pub use config::OpApiConfig;
pub use dtype::DataType;
pub use error::{ErrorKind, NpuError, NpuResult};

/// 设备编号，与厂商运行时的 device id 一致
pub type DeviceId = i32;
