//! 厂商算子库接入层
//!
//! 三个厂商动态库的装载、进程级符号表、原生对象的 RAII 包装，
//! 以及供测试注入的进程内桩厂商。上层调度按符号表里的入口点
//! 对驱动两段式算子协议。

pub mod ffi;
pub mod loader;
pub mod objects;
pub mod symbols;
pub mod testing;

pub use loader::{
    LIB_CUST, LIB_OBJECT, LIB_OPAPI, LoadError, OpApiLibraries, SymbolSource, ensure_initialized,
    open_attempts,
};
pub use objects::{NativeIntArray, NativeScalar, NativeTensor, NativeTensorList};
pub use symbols::{ObjectFns, OpPair, SymbolReport, SymbolTable};
