//! 配置管理
//!
//! 调度层的运行时配置：厂商库搜索目录与缺库策略。配置来源
//! 优先级从低到高为：默认值、TOML 文件、环境变量。

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{NpuError, NpuResult};

/// 库目录环境变量
pub const ENV_LIB_DIR: &str = "NPU_OPAPI_DIR";
/// 严格模式环境变量（"1"/"true" 开启）
pub const ENV_STRICT: &str = "NPU_OPAPI_STRICT";

/// 算子 API 层配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpApiConfig {
    /// 厂商库搜索目录，`None` 时按系统默认路径查找
    pub lib_dir: Option<PathBuf>,
    /// 严格模式：开库失败立即报错而不是软降级
    pub strict: bool,
}

impl Default for OpApiConfig {
    fn default() -> Self {
        Self::defaults()
    }
}

impl OpApiConfig {
    /// 默认配置：系统路径查找、软降级
    pub fn defaults() -> Self {
        OpApiConfig {
            lib_dir: None,
            strict: false,
        }
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> NpuResult<()> {
        if let Some(dir) = &self.lib_dir {
            if dir.as_os_str().is_empty() {
                return Err(NpuError::invalid("lib_dir", "library directory is empty"));
            }
        }
        Ok(())
    }

    /// 合并两个配置，`other` 优先级更高
    pub fn merge(&self, other: &Self) -> Self {
        OpApiConfig {
            lib_dir: other.lib_dir.clone().or_else(|| self.lib_dir.clone()),
            strict: other.strict || self.strict,
        }
    }

    /// 从 TOML 字符串加载配置
    pub fn from_toml(text: &str) -> NpuResult<Self> {
        let cfg: OpApiConfig = toml::from_str(text)
            .map_err(|e| NpuError::invalid("config", format!("TOML parse error: {}", e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// 从环境变量加载覆盖项
    ///
    /// 未设置的变量保持 `self` 的值；非法布尔值记一条警告后忽略。
    pub fn with_env_overrides(&self) -> Self {
        let mut cfg = self.clone();
        if let Ok(dir) = std::env::var(ENV_LIB_DIR) {
            if dir.is_empty() {
                log::warn!("{} is set but empty, ignoring", ENV_LIB_DIR);
            } else {
                cfg.lib_dir = Some(PathBuf::from(dir));
            }
        }
        if let Ok(strict) = std::env::var(ENV_STRICT) {
            match strict.as_str() {
                "1" | "true" | "TRUE" => cfg.strict = true,
                "0" | "false" | "FALSE" => cfg.strict = false,
                other => {
                    log::warn!("{} has invalid value '{}', ignoring", ENV_STRICT, other);
                }
            }
        }
        cfg
    }
}
