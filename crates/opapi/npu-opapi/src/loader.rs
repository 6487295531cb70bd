//! 厂商库装载
//!
//! 三个厂商动态库按固定文件名各打开一次：对象生命周期库、
//! 通用算子库、自定义算子库。开库失败默认软降级（记警告、
//! 符号槽置空，首次使用时才报错），严格模式下立即失败。
//! 全局符号表经 `OnceLock` 一次性初始化，重复调用观察到
//! 同一张表。

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU32, Ordering};

use libloading::Library;
use thiserror::Error;

use npu_core::{NpuError, NpuResult, OpApiConfig};

use crate::symbols::SymbolTable;

/// 对象生命周期库（张量/标量/数组/列表的创建与销毁）
pub const LIB_OBJECT: &str = "libacl_op_compiler.so";
/// 通用算子库
pub const LIB_OPAPI: &str = "libopapi.so";
/// 自定义算子库
pub const LIB_CUST: &str = "libcust_opapi.so";

static OPEN_ATTEMPTS: AtomicU32 = AtomicU32::new(0);
static INIT_RUNS: AtomicU32 = AtomicU32::new(0);
static GLOBAL_TABLE: OnceLock<NpuResult<Arc<SymbolTable>>> = OnceLock::new();

/// 装载阶段错误
#[derive(Debug, Error)]
pub enum LoadError {
    /// 动态库打开失败
    #[error("Failed to open library {name}: {reason}")]
    LibraryOpen { name: String, reason: String },
    /// 符号缺失
    #[error("Symbol {name} not found")]
    SymbolNotFound { name: String },
}

impl From<LoadError> for NpuError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::LibraryOpen { name, .. } => NpuError::unsupported(name),
            LoadError::SymbolNotFound { name } => NpuError::unsupported(name),
        }
    }
}

/// 符号来源
///
/// 真实部署下是一个打开的动态库；测试注入一张名字到地址的
/// 表；开库失败后的占位来源对任何查找都返回 `None`。
#[derive(Debug)]
pub enum SymbolSource {
    /// 已打开的动态库（进程生命周期内常驻）
    Library(&'static Library),
    /// 注入的符号表，地址以 `usize` 登记
    Table(HashMap<String, usize>),
    /// 库未打开，所有查找落空
    Missing,
}

impl SymbolSource {
    /// 按名字解析符号为 `T` 类型的函数指针
    ///
    /// # Safety
    ///
    /// 调用方必须保证 `T` 与该符号真实的 C 签名一致。
    pub unsafe fn resolve<T: Copy>(&self, name: &str) -> Option<T> {
        debug_assert_eq!(std::mem::size_of::<T>(), std::mem::size_of::<usize>());
        match self {
            SymbolSource::Library(lib) => {
                // SAFETY: 签名一致性由调用方保证
                let sym = unsafe { lib.get::<T>(name.as_bytes()) };
                match sym {
                    Ok(sym) => Some(*sym),
                    Err(_) => None,
                }
            }
            SymbolSource::Table(map) => map.get(name).map(|&addr| {
                // SAFETY: 表中登记的地址与 T 的签名一致性由注入方保证
                unsafe { std::mem::transmute_copy::<usize, T>(&addr) }
            }),
            SymbolSource::Missing => None,
        }
    }

    /// 该来源是否真实可用
    pub fn is_present(&self) -> bool {
        !matches!(self, SymbolSource::Missing)
    }
}

/// 三个厂商库的符号来源
#[derive(Debug)]
pub struct OpApiLibraries {
    /// 对象生命周期库
    pub object: SymbolSource,
    /// 通用算子库
    pub opapi: SymbolSource,
    /// 自定义算子库
    pub cust: SymbolSource,
}

impl OpApiLibraries {
    /// 按配置打开三个厂商库
    ///
    /// 软降级模式下失败的库记一条警告并留空；严格模式下
    /// 第一个打不开的库即返回错误。
    pub fn open(cfg: &OpApiConfig) -> NpuResult<Self> {
        cfg.validate()?;
        let object = open_one(LIB_OBJECT, cfg)?;
        let opapi = open_one(LIB_OPAPI, cfg)?;
        let cust = open_one(LIB_CUST, cfg)?;
        Ok(OpApiLibraries {
            object,
            opapi,
            cust,
        })
    }

    /// 全部用注入表构造，测试专用
    pub fn from_tables(
        object: HashMap<String, usize>,
        opapi: HashMap<String, usize>,
        cust: HashMap<String, usize>,
    ) -> Self {
        OpApiLibraries {
            object: SymbolSource::Table(object),
            opapi: SymbolSource::Table(opapi),
            cust: SymbolSource::Table(cust),
        }
    }
}

fn open_one(name: &str, cfg: &OpApiConfig) -> NpuResult<SymbolSource> {
    let path: PathBuf = match &cfg.lib_dir {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    };
    OPEN_ATTEMPTS.fetch_add(1, Ordering::SeqCst);
    // SAFETY: 厂商库的装载副作用由其自身约定
    let lib = unsafe { Library::new(&path) };
    match lib {
        Ok(lib) => {
            tracing::info!("loaded vendor library {}", path.display());
            // 进程生命周期内常驻，符号指针因此长存
            Ok(SymbolSource::Library(Box::leak(Box::new(lib))))
        }
        Err(e) => {
            if cfg.strict {
                tracing::error!("failed to open vendor library {}: {}", path.display(), e);
                Err(LoadError::LibraryOpen {
                    name: name.to_string(),
                    reason: e.to_string(),
                }
                .into())
            } else {
                tracing::warn!(
                    "vendor library {} unavailable, operators degrade to unsupported: {}",
                    path.display(),
                    e
                );
                Ok(SymbolSource::Missing)
            }
        }
    }
}

/// 历史累计的开库尝试次数
pub fn open_attempts() -> u32 {
    OPEN_ATTEMPTS.load(Ordering::SeqCst)
}

/// 进程级一次性初始化
///
/// 首次调用打开厂商库并解析全部符号；后续调用无论配置为何
/// 都观察到首次的结果（完整或降级的同一张表）。
pub fn ensure_initialized(cfg: &OpApiConfig) -> NpuResult<Arc<SymbolTable>> {
    GLOBAL_TABLE
        .get_or_init(|| {
            INIT_RUNS.fetch_add(1, Ordering::SeqCst);
            let libs = OpApiLibraries::open(cfg)?;
            Ok(Arc::new(SymbolTable::resolve_from(&libs)))
        })
        .clone()
}

#[cfg(test)]
fn init_runs() -> u32 {
    INIT_RUNS.load(Ordering::SeqCst)
}
