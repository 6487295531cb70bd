//! 符号表
//!
//! 每个厂商入口点一个 `Option` 函数指针槽，初始化后只读。
//! 算子的查询段与执行段在 [`OpPair`] 中成对解析：任何一半
//! 缺失，整对在 [`OpPair::require`] 处报不支持，调用方拿到
//! 的要么是完整可用的一对指针，要么是错误，不存在半解析
//! 状态被误用的可能。

use npu_core::{NpuError, NpuResult};

use crate::ffi::*;
use crate::loader::{OpApiLibraries, SymbolSource};

/// 一个算子的入口点对
///
/// `W` 是该算子家族的查询段签名，执行段全家族同型。
#[derive(Clone, Copy)]
pub struct OpPair<W: Copy> {
    base: &'static str,
    ws: Option<W>,
    run: Option<RunFn>,
}

impl<W: Copy> OpPair<W> {
    /// 算子基名（如 `Add`）
    pub fn base(&self) -> &'static str {
        self.base
    }

    /// 查询段符号名
    pub fn ws_symbol(&self) -> String {
        format!("aclnn{}GetWorkspaceSize", self.base)
    }

    /// 执行段符号名
    pub fn run_symbol(&self) -> String {
        format!("aclnn{}", self.base)
    }

    /// 两段是否都已解析
    pub fn is_supported(&self) -> bool {
        self.ws.is_some() && self.run.is_some()
    }

    /// 取出完整的入口点对，任何一半缺失即报不支持
    pub fn require(&self) -> NpuResult<(W, RunFn)> {
        match (self.ws, self.run) {
            (Some(ws), Some(run)) => Ok((ws, run)),
            (None, _) => Err(NpuError::unsupported(self.ws_symbol())),
            (_, None) => Err(NpuError::unsupported(self.run_symbol())),
        }
    }
}

/// 对象生命周期入口点
///
/// 创建与销毁成组使用；包装层在创建任何句柄前同时要求两端，
/// 保证创建出来的句柄一定能销毁。
pub struct ObjectFns {
    create_tensor: Option<CreateTensorFn>,
    destroy_tensor: Option<DestroyTensorFn>,
    create_scalar: Option<CreateScalarFn>,
    destroy_scalar: Option<DestroyScalarFn>,
    create_int_array: Option<CreateIntArrayFn>,
    destroy_int_array: Option<DestroyIntArrayFn>,
    create_tensor_list: Option<CreateTensorListFn>,
    destroy_tensor_list: Option<DestroyTensorListFn>,
}

macro_rules! object_accessor {
    ($field:ident, $ty:ty, $symbol:literal) => {
        pub fn $field(&self) -> NpuResult<$ty> {
            self.$field.ok_or_else(|| NpuError::unsupported($symbol))
        }
    };
}

impl ObjectFns {
    object_accessor!(create_tensor, CreateTensorFn, "aclCreateTensor");
    object_accessor!(destroy_tensor, DestroyTensorFn, "aclDestroyTensor");
    object_accessor!(create_scalar, CreateScalarFn, "aclCreateScalar");
    object_accessor!(destroy_scalar, DestroyScalarFn, "aclDestroyScalar");
    object_accessor!(create_int_array, CreateIntArrayFn, "aclCreateIntArray");
    object_accessor!(destroy_int_array, DestroyIntArrayFn, "aclDestroyIntArray");
    object_accessor!(create_tensor_list, CreateTensorListFn, "aclCreateTensorList");
    object_accessor!(
        destroy_tensor_list,
        DestroyTensorListFn,
        "aclDestroyTensorList"
    );

    fn resolve(src: &SymbolSource, rep: &mut ReportBuilder) -> ObjectFns {
        // SAFETY: 各符号的签名与 ffi 模块的类型别名一一对应
        unsafe {
            let create_tensor = src.resolve::<CreateTensorFn>("aclCreateTensor");
            let destroy_tensor = src.resolve::<DestroyTensorFn>("aclDestroyTensor");
            let create_scalar = src.resolve::<CreateScalarFn>("aclCreateScalar");
            let destroy_scalar = src.resolve::<DestroyScalarFn>("aclDestroyScalar");
            let create_int_array = src.resolve::<CreateIntArrayFn>("aclCreateIntArray");
            let destroy_int_array = src.resolve::<DestroyIntArrayFn>("aclDestroyIntArray");
            let create_tensor_list = src.resolve::<CreateTensorListFn>("aclCreateTensorList");
            let destroy_tensor_list = src.resolve::<DestroyTensorListFn>("aclDestroyTensorList");
            rep.note("aclCreateTensor", create_tensor.is_some());
            rep.note("aclDestroyTensor", destroy_tensor.is_some());
            rep.note("aclCreateScalar", create_scalar.is_some());
            rep.note("aclDestroyScalar", destroy_scalar.is_some());
            rep.note("aclCreateIntArray", create_int_array.is_some());
            rep.note("aclDestroyIntArray", destroy_int_array.is_some());
            rep.note("aclCreateTensorList", create_tensor_list.is_some());
            rep.note("aclDestroyTensorList", destroy_tensor_list.is_some());
            ObjectFns {
                create_tensor,
                destroy_tensor,
                create_scalar,
                destroy_scalar,
                create_int_array,
                destroy_int_array,
                create_tensor_list,
                destroy_tensor_list,
            }
        }
    }
}

/// 符号解析报告
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolReport {
    /// 查找过的符号总数
    pub attempted: usize,
    /// 成功解析的符号数
    pub resolved: usize,
    /// 缺失的符号名
    pub missing: Vec<String>,
}

#[derive(Default)]
struct ReportBuilder {
    attempted: usize,
    missing: Vec<String>,
}

impl ReportBuilder {
    fn note(&mut self, name: &str, found: bool) {
        self.attempted += 1;
        if !found {
            self.missing.push(name.to_string());
        }
    }

    fn finish(self) -> SymbolReport {
        SymbolReport {
            attempted: self.attempted,
            resolved: self.attempted - self.missing.len(),
            missing: self.missing,
        }
    }
}

/// 进程级符号表
///
/// 初始化时一次性解析全部入口点，之后只读共享，不持锁。
pub struct SymbolTable {
    /// 对象生命周期入口点
    pub objects: ObjectFns,

    // ========================================================================
    // 带 alpha 标量的二元算子
    // ========================================================================
    pub add: OpPair<WsBinaryAlphaFn>,
    pub sub: OpPair<WsBinaryAlphaFn>,

    // ========================================================================
    // 二元算子
    // ========================================================================
    pub mul: OpPair<WsBinaryFn>,
    pub div: OpPair<WsBinaryFn>,
    pub bitwise_and: OpPair<WsBinaryFn>,
    pub bitwise_or: OpPair<WsBinaryFn>,
    pub bitwise_xor: OpPair<WsBinaryFn>,
    pub logical_and: OpPair<WsBinaryFn>,
    pub logical_or: OpPair<WsBinaryFn>,
    pub eq_tensor: OpPair<WsBinaryFn>,
    pub gt_tensor: OpPair<WsBinaryFn>,
    pub lt_tensor: OpPair<WsBinaryFn>,
    pub matmul: OpPair<WsMatmulFn>,

    // ========================================================================
    // 张量-标量算子
    // ========================================================================
    pub muls: OpPair<WsTensorScalarFn>,
    pub pow_tensor_scalar: OpPair<WsTensorScalarFn>,

    // ========================================================================
    // 一元算子
    // ========================================================================
    pub abs: OpPair<WsUnaryFn>,
    pub neg: OpPair<WsUnaryFn>,
    pub exp: OpPair<WsUnaryFn>,
    pub log: OpPair<WsUnaryFn>,
    pub sqrt: OpPair<WsUnaryFn>,
    pub reciprocal: OpPair<WsUnaryFn>,
    pub floor: OpPair<WsUnaryFn>,
    pub ceil: OpPair<WsUnaryFn>,
    pub round: OpPair<WsUnaryFn>,
    pub bitwise_not: OpPair<WsUnaryFn>,
    pub logical_not: OpPair<WsUnaryFn>,

    // ========================================================================
    // 带参数的单输入算子
    // ========================================================================
    pub clamp: OpPair<WsClampFn>,
    pub cast: OpPair<WsCastFn>,
    pub permute: OpPair<WsIntArrayFn>,
    pub flip: OpPair<WsIntArrayFn>,
    pub expand: OpPair<WsIntArrayFn>,

    // ========================================================================
    // 张量列表算子
    // ========================================================================
    pub split_tensor: OpPair<WsSplitFn>,
    pub cat: OpPair<WsCatFn>,

    // ========================================================================
    // 归约算子
    // ========================================================================
    pub reduce_sum: OpPair<WsReduceFn>,
    pub mean: OpPair<WsReduceFn>,

    // ========================================================================
    // 自定义库算子
    // ========================================================================
    pub threshold: OpPair<WsThresholdFn>,
    pub min_max_loc: OpPair<WsMinMaxLocFn>,
    pub rotate: OpPair<WsRotateFn>,

    report: SymbolReport,
}

fn pair<W: Copy>(src: &SymbolSource, base: &'static str, rep: &mut ReportBuilder) -> OpPair<W> {
    let ws_name = format!("aclnn{}GetWorkspaceSize", base);
    let run_name = format!("aclnn{}", base);
    // SAFETY: W 是该算子家族的查询段签名，执行段同型于 RunFn
    let ws = unsafe { src.resolve::<W>(&ws_name) };
    let run = unsafe { src.resolve::<RunFn>(&run_name) };
    rep.note(&ws_name, ws.is_some());
    rep.note(&run_name, run.is_some());
    if ws.is_some() != run.is_some() {
        tracing::warn!(
            "operator {} resolved only half of its entry point pair",
            base
        );
    }
    OpPair { base, ws, run }
}

impl SymbolTable {
    /// 从三个库来源一次性解析全部入口点
    pub fn resolve_from(libs: &OpApiLibraries) -> SymbolTable {
        let mut rep = ReportBuilder::default();
        let objects = ObjectFns::resolve(&libs.object, &mut rep);
        let mut table = SymbolTable {
            objects,
            add: pair(&libs.opapi, "Add", &mut rep),
            sub: pair(&libs.opapi, "Sub", &mut rep),
            mul: pair(&libs.opapi, "Mul", &mut rep),
            div: pair(&libs.opapi, "Div", &mut rep),
            bitwise_and: pair(&libs.opapi, "BitwiseAndTensor", &mut rep),
            bitwise_or: pair(&libs.opapi, "BitwiseOrTensor", &mut rep),
            bitwise_xor: pair(&libs.opapi, "BitwiseXorTensor", &mut rep),
            logical_and: pair(&libs.opapi, "LogicalAnd", &mut rep),
            logical_or: pair(&libs.opapi, "LogicalOr", &mut rep),
            eq_tensor: pair(&libs.opapi, "EqTensor", &mut rep),
            gt_tensor: pair(&libs.opapi, "GtTensor", &mut rep),
            lt_tensor: pair(&libs.opapi, "LtTensor", &mut rep),
            matmul: pair(&libs.opapi, "Matmul", &mut rep),
            muls: pair(&libs.opapi, "Muls", &mut rep),
            pow_tensor_scalar: pair(&libs.opapi, "PowTensorScalar", &mut rep),
            abs: pair(&libs.opapi, "Abs", &mut rep),
            neg: pair(&libs.opapi, "Neg", &mut rep),
            exp: pair(&libs.opapi, "Exp", &mut rep),
            log: pair(&libs.opapi, "Log", &mut rep),
            sqrt: pair(&libs.opapi, "Sqrt", &mut rep),
            reciprocal: pair(&libs.opapi, "Reciprocal", &mut rep),
            floor: pair(&libs.opapi, "Floor", &mut rep),
            ceil: pair(&libs.opapi, "Ceil", &mut rep),
            round: pair(&libs.opapi, "Round", &mut rep),
            bitwise_not: pair(&libs.opapi, "BitwiseNot", &mut rep),
            logical_not: pair(&libs.opapi, "LogicalNot", &mut rep),
            clamp: pair(&libs.opapi, "Clamp", &mut rep),
            cast: pair(&libs.opapi, "Cast", &mut rep),
            permute: pair(&libs.opapi, "Permute", &mut rep),
            flip: pair(&libs.opapi, "Flip", &mut rep),
            expand: pair(&libs.opapi, "Expand", &mut rep),
            split_tensor: pair(&libs.opapi, "SplitTensor", &mut rep),
            cat: pair(&libs.opapi, "Cat", &mut rep),
            reduce_sum: pair(&libs.opapi, "ReduceSum", &mut rep),
            mean: pair(&libs.opapi, "Mean", &mut rep),
            threshold: pair(&libs.cust, "ThresholdOpencv", &mut rep),
            min_max_loc: pair(&libs.cust, "MinMaxLocOpencv", &mut rep),
            rotate: pair(&libs.cust, "RotateOpencv", &mut rep),
            report: SymbolReport::default(),
        };
        table.report = rep.finish();
        if table.report.missing.is_empty() {
            tracing::info!(
                "resolved all {} vendor entry points",
                table.report.attempted
            );
        } else {
            tracing::warn!(
                "{} of {} vendor entry points missing, affected operators degrade to unsupported",
                table.report.missing.len(),
                table.report.attempted
            );
        }
        table
    }

    /// 符号解析报告
    pub fn report(&self) -> &SymbolReport {
        &self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    unsafe extern "C" fn ws_unary_stub(
        _a: *const AclTensor,
        _out: *mut AclTensor,
        ws: *mut u64,
        _exec: *mut *mut AclOpExecutor,
    ) -> AclnnStatus {
        unsafe { *ws = 0 };
        ACL_SUCCESS
    }

    unsafe extern "C" fn run_stub(
        _ws: *mut std::ffi::c_void,
        _ws_size: u64,
        _exec: *mut AclOpExecutor,
        _stream: AclrtStream,
    ) -> AclnnStatus {
        ACL_SUCCESS
    }

    fn table_with(entries: &[(&str, usize)]) -> SymbolTable {
        let mut ops = HashMap::new();
        for (name, addr) in entries {
            ops.insert((*name).to_string(), *addr);
        }
        let libs = OpApiLibraries::from_tables(HashMap::new(), ops, HashMap::new());
        SymbolTable::resolve_from(&libs)
    }

    #[test]
    fn test_pair_resolved_together() {
        let table = table_with(&[
            ("aclnnAbsGetWorkspaceSize", ws_unary_stub as usize),
            ("aclnnAbs", run_stub as usize),
        ]);
        assert!(table.abs.is_supported());
        table.abs.require().expect("both halves present");
    }

    #[test]
    fn test_half_pair_is_unsupported() {
        // 只有查询段，没有执行段
        let table = table_with(&[("aclnnAbsGetWorkspaceSize", ws_unary_stub as usize)]);
        assert!(!table.abs.is_supported());
        let err = table.abs.require().expect_err("run half missing");
        match err {
            NpuError::Unsupported { symbol } => assert_eq!(symbol, "aclnnAbs"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_missing_pair_names_ws_symbol() {
        let table = table_with(&[]);
        let err = table.mean.require().expect_err("nothing resolved");
        match err {
            NpuError::Unsupported { symbol } => {
                assert_eq!(symbol, "aclnnMeanGetWorkspaceSize");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_report_counts() {
        let table = table_with(&[
            ("aclnnAbsGetWorkspaceSize", ws_unary_stub as usize),
            ("aclnnAbs", run_stub as usize),
        ]);
        let rep = table.report();
        // 8 个对象符号 + 38 个算子对
        assert_eq!(rep.attempted, 8 + 38 * 2);
        assert_eq!(rep.resolved, 2);
        assert_eq!(rep.missing.len(), rep.attempted - rep.resolved);
        assert!(rep.missing.iter().any(|s| s == "aclCreateTensor"));
        assert!(!rep.missing.iter().any(|s| s == "aclnnAbs"));
    }

    #[test]
    fn test_object_accessor_reports_symbol_name() {
        let table = table_with(&[]);
        let err = table
            .objects
            .create_scalar()
            .expect_err("object library empty");
        match err {
            NpuError::Unsupported { symbol } => assert_eq!(symbol, "aclCreateScalar"),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
