//! 进程内测试桩厂商库
//!
//! 全量入口点的 Rust 实现，配合注入式符号来源，让本 crate 与
//! 上层调度 crate 的测试在没有 NPU 的机器上驱动完整的两段式
//! 协议。桩记录每类句柄的创建/销毁次数、标量与数组参数，并
//! 支持按阶段注入失败。全局状态经测试锁串行化，用
//! [`take`] 领取桩即自动复位。

use std::collections::HashMap;
use std::ffi::c_void;

use parking_lot::{Mutex, MutexGuard};

use npu_core::DataType;

use crate::ffi::*;
use crate::loader::OpApiLibraries;
use crate::symbols::SymbolTable;

/// 每类句柄与调用的计数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StubCounters {
    pub tensors_created: usize,
    pub tensors_destroyed: usize,
    pub scalars_created: usize,
    pub scalars_destroyed: usize,
    pub arrays_created: usize,
    pub arrays_destroyed: usize,
    pub lists_created: usize,
    pub lists_destroyed: usize,
    pub ws_queries: usize,
    pub executes: usize,
}

impl StubCounters {
    /// 每类句柄的创建数是否都等于销毁数
    pub fn balanced(&self) -> bool {
        self.tensors_created == self.tensors_destroyed
            && self.scalars_created == self.scalars_destroyed
            && self.arrays_created == self.arrays_destroyed
            && self.lists_created == self.lists_destroyed
    }

    /// 创建过的句柄总数
    pub fn created_total(&self) -> usize {
        self.tensors_created + self.scalars_created + self.arrays_created + self.lists_created
    }
}

/// 执行段行为
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecBehavior {
    /// 什么都不做
    Nop,
    /// 把第一个输出当前的字节内容快照下来
    SnapshotFirstOutput,
    /// 把第一个输入的字节拷贝到第一个输出
    CopyFirstInputToFirstOutput,
}

struct StubConfig {
    ws_bytes: u64,
    ws_status: AclnnStatus,
    exec_status: AclnnStatus,
    fail_tensor_create_at: Option<usize>,
    behavior: ExecBehavior,
}

struct ScalarRecord {
    dtype: i32,
    bytes: Vec<u8>,
}

struct StubState {
    counters: StubCounters,
    config: StubConfig,
    scalar_records: Vec<ScalarRecord>,
    int_arrays: Vec<Vec<i64>>,
    list_sizes: Vec<u64>,
    output_snapshot: Option<Vec<u8>>,
    last_workspace: Option<(usize, u64)>,
    tensor_creates_seen: usize,
}

impl StubState {
    const fn new() -> Self {
        StubState {
            counters: StubCounters {
                tensors_created: 0,
                tensors_destroyed: 0,
                scalars_created: 0,
                scalars_destroyed: 0,
                arrays_created: 0,
                arrays_destroyed: 0,
                lists_created: 0,
                lists_destroyed: 0,
                ws_queries: 0,
                executes: 0,
            },
            config: StubConfig {
                ws_bytes: 0,
                ws_status: ACL_SUCCESS,
                exec_status: ACL_SUCCESS,
                fail_tensor_create_at: None,
                behavior: ExecBehavior::Nop,
            },
            scalar_records: Vec::new(),
            int_arrays: Vec::new(),
            list_sizes: Vec::new(),
            output_snapshot: None,
            last_workspace: None,
            tensor_creates_seen: 0,
        }
    }
}

static STATE: Mutex<StubState> = Mutex::new(StubState::new());
static TEST_LOCK: Mutex<()> = Mutex::new(());

/// 桩厂商的独占使用权
///
/// 持有期间其他测试无法使用桩；领取时全局状态已复位。
pub struct StubVendor {
    _guard: MutexGuard<'static, ()>,
}

/// 领取桩厂商并复位其全部状态
pub fn take() -> StubVendor {
    let guard = TEST_LOCK.lock();
    *STATE.lock() = StubState::new();
    StubVendor { _guard: guard }
}

impl StubVendor {
    /// 完整符号表（全部入口点可用）
    pub fn table(&self) -> SymbolTable {
        self.table_without(&[])
    }

    /// 去掉指定符号后的表，模拟部分缺失的部署
    pub fn table_without(&self, missing: &[&str]) -> SymbolTable {
        let mut object = object_map();
        let mut opapi = HashMap::new();
        for (base, ws_addr) in generic_entries() {
            opapi.insert(format!("aclnn{}GetWorkspaceSize", base), ws_addr);
            opapi.insert(format!("aclnn{}", base), run as usize);
        }
        let mut cust = HashMap::new();
        for (base, ws_addr) in cust_entries() {
            cust.insert(format!("aclnn{}GetWorkspaceSize", base), ws_addr);
            cust.insert(format!("aclnn{}", base), run as usize);
        }
        for name in missing {
            object.remove(*name);
            opapi.remove(*name);
            cust.remove(*name);
        }
        let libs = OpApiLibraries::from_tables(object, opapi, cust);
        SymbolTable::resolve_from(&libs)
    }

    /// 当前计数快照
    pub fn counters(&self) -> StubCounters {
        STATE.lock().counters.clone()
    }

    /// 设定查询段报告的工作区字节数
    pub fn set_ws_bytes(&self, bytes: u64) {
        STATE.lock().config.ws_bytes = bytes;
    }

    /// 让查询段返回指定状态码
    pub fn fail_ws_query(&self, code: AclnnStatus) {
        STATE.lock().config.ws_status = code;
    }

    /// 让执行段返回指定状态码
    pub fn fail_execute(&self, code: AclnnStatus) {
        STATE.lock().config.exec_status = code;
    }

    /// 让第 `nth` 次（1 起）张量创建返回空句柄
    pub fn fail_tensor_create_at(&self, nth: usize) {
        STATE.lock().config.fail_tensor_create_at = Some(nth);
    }

    /// 设定执行段行为
    pub fn set_behavior(&self, behavior: ExecBehavior) {
        STATE.lock().config.behavior = behavior;
    }

    /// 创建过的标量的元素类型，按创建顺序
    pub fn scalar_dtypes(&self) -> Vec<i32> {
        STATE.lock().scalar_records.iter().map(|r| r.dtype).collect()
    }

    /// 创建过的标量的原始字节，按创建顺序
    pub fn scalar_values(&self) -> Vec<Vec<u8>> {
        STATE
            .lock()
            .scalar_records
            .iter()
            .map(|r| r.bytes.clone())
            .collect()
    }

    /// 创建过的整数数组内容，按创建顺序
    pub fn int_arrays(&self) -> Vec<Vec<i64>> {
        STATE.lock().int_arrays.clone()
    }

    /// 创建过的张量列表长度，按创建顺序
    pub fn list_sizes(&self) -> Vec<u64> {
        STATE.lock().list_sizes.clone()
    }

    /// 执行段拍下的第一个输出快照
    pub fn output_snapshot(&self) -> Option<Vec<u8>> {
        STATE.lock().output_snapshot.clone()
    }

    /// 最近一次执行段收到的工作区指针与大小
    pub fn last_workspace(&self) -> Option<(usize, u64)> {
        STATE.lock().last_workspace
    }
}

// ============================================================================
// 桩对象
// ============================================================================

struct StubTensor {
    data: usize,
    nbytes: usize,
}

struct StubScalar {
    _dtype: i32,
}

struct StubIntArray {
    _len: u64,
}

struct StubTensorList {
    _len: u64,
}

struct StubExecutor {
    ins: Vec<(usize, usize)>,
    outs: Vec<(usize, usize)>,
}

fn tensor_span(handle: *const AclTensor) -> (usize, usize) {
    // SAFETY: 句柄由本桩的 create_tensor 创建
    let t = unsafe { &*(handle as *const StubTensor) };
    (t.data, t.nbytes)
}

fn finish_ws_query(
    st: &mut StubState,
    ins: Vec<(usize, usize)>,
    outs: Vec<(usize, usize)>,
    ws: *mut u64,
    exec: *mut *mut AclOpExecutor,
) -> AclnnStatus {
    st.counters.ws_queries += 1;
    if st.config.ws_status != ACL_SUCCESS {
        return st.config.ws_status;
    }
    // SAFETY: 查询段的两个出参由调用方提供有效指针
    unsafe {
        *ws = st.config.ws_bytes;
        *exec = Box::into_raw(Box::new(StubExecutor { ins, outs })) as *mut AclOpExecutor;
    }
    ACL_SUCCESS
}

// ============================================================================
// 对象生命周期桩
// ============================================================================

unsafe extern "C" fn create_tensor(
    view_dims: *const i64,
    view_dims_num: u64,
    data_type: i32,
    _stride: *const i64,
    offset: i64,
    _format: i32,
    _storage_dims: *const i64,
    _storage_dims_num: u64,
    tensor_data: *mut c_void,
) -> *mut AclTensor {
    let mut st = STATE.lock();
    st.tensor_creates_seen += 1;
    if st.config.fail_tensor_create_at == Some(st.tensor_creates_seen) {
        return std::ptr::null_mut();
    }
    let numel: i64 = if view_dims.is_null() {
        0
    } else {
        // SAFETY: 维度数组长度由 view_dims_num 给出
        unsafe { std::slice::from_raw_parts(view_dims, view_dims_num as usize) }
            .iter()
            .product()
    };
    let elem = DataType::from_acl(data_type)
        .map(|d| d.elem_size())
        .unwrap_or(1);
    st.counters.tensors_created += 1;
    let data = tensor_data as usize + offset as usize * elem;
    Box::into_raw(Box::new(StubTensor {
        data,
        nbytes: numel as usize * elem,
    })) as *mut AclTensor
}

unsafe extern "C" fn destroy_tensor(tensor: *const AclTensor) -> AclError {
    if tensor.is_null() {
        return -1;
    }
    // SAFETY: 句柄由 create_tensor 生成，只销毁一次
    drop(unsafe { Box::from_raw(tensor as *mut StubTensor) });
    STATE.lock().counters.tensors_destroyed += 1;
    ACL_SUCCESS
}

unsafe extern "C" fn create_scalar(value: *mut c_void, data_type: i32) -> *mut AclScalar {
    let size = DataType::from_acl(data_type)
        .map(|d| d.elem_size())
        .unwrap_or(8);
    // SAFETY: 调用方提供至少 size 字节的标量值
    let bytes = unsafe { std::slice::from_raw_parts(value as *const u8, size) }.to_vec();
    let mut st = STATE.lock();
    st.scalar_records.push(ScalarRecord {
        dtype: data_type,
        bytes,
    });
    st.counters.scalars_created += 1;
    Box::into_raw(Box::new(StubScalar { _dtype: data_type })) as *mut AclScalar
}

unsafe extern "C" fn destroy_scalar(scalar: *const AclScalar) -> AclError {
    if scalar.is_null() {
        return -1;
    }
    // SAFETY: 句柄由 create_scalar 生成，只销毁一次
    drop(unsafe { Box::from_raw(scalar as *mut StubScalar) });
    STATE.lock().counters.scalars_destroyed += 1;
    ACL_SUCCESS
}

unsafe extern "C" fn create_int_array(value: *const i64, size: u64) -> *mut AclIntArray {
    let values = if value.is_null() {
        Vec::new()
    } else {
        // SAFETY: 数组长度由 size 给出
        unsafe { std::slice::from_raw_parts(value, size as usize) }.to_vec()
    };
    let mut st = STATE.lock();
    st.int_arrays.push(values);
    st.counters.arrays_created += 1;
    Box::into_raw(Box::new(StubIntArray { _len: size })) as *mut AclIntArray
}

unsafe extern "C" fn destroy_int_array(array: *const AclIntArray) -> AclError {
    if array.is_null() {
        return -1;
    }
    // SAFETY: 句柄由 create_int_array 生成，只销毁一次
    drop(unsafe { Box::from_raw(array as *mut StubIntArray) });
    STATE.lock().counters.arrays_destroyed += 1;
    ACL_SUCCESS
}

unsafe extern "C" fn create_tensor_list(
    _value: *const *const AclTensor,
    size: u64,
) -> *mut AclTensorList {
    let mut st = STATE.lock();
    st.list_sizes.push(size);
    st.counters.lists_created += 1;
    Box::into_raw(Box::new(StubTensorList { _len: size })) as *mut AclTensorList
}

unsafe extern "C" fn destroy_tensor_list(list: *const AclTensorList) -> AclError {
    if list.is_null() {
        return -1;
    }
    // 只销毁列表本身，成员张量由各自的销毁调用负责
    // SAFETY: 句柄由 create_tensor_list 生成，只销毁一次
    drop(unsafe { Box::from_raw(list as *mut StubTensorList) });
    STATE.lock().counters.lists_destroyed += 1;
    ACL_SUCCESS
}

// ============================================================================
// 查询段桩（按算子家族一个）
// ============================================================================

unsafe extern "C" fn ws_binary(
    a: *const AclTensor,
    b: *const AclTensor,
    out: *mut AclTensor,
    ws: *mut u64,
    exec: *mut *mut AclOpExecutor,
) -> AclnnStatus {
    let mut st = STATE.lock();
    finish_ws_query(
        &mut st,
        vec![tensor_span(a), tensor_span(b)],
        vec![tensor_span(out)],
        ws,
        exec,
    )
}

unsafe extern "C" fn ws_binary_alpha(
    a: *const AclTensor,
    b: *const AclTensor,
    _alpha: *const AclScalar,
    out: *mut AclTensor,
    ws: *mut u64,
    exec: *mut *mut AclOpExecutor,
) -> AclnnStatus {
    let mut st = STATE.lock();
    finish_ws_query(
        &mut st,
        vec![tensor_span(a), tensor_span(b)],
        vec![tensor_span(out)],
        ws,
        exec,
    )
}

unsafe extern "C" fn ws_matmul(
    a: *const AclTensor,
    b: *const AclTensor,
    out: *mut AclTensor,
    _cube_math_type: i8,
    ws: *mut u64,
    exec: *mut *mut AclOpExecutor,
) -> AclnnStatus {
    let mut st = STATE.lock();
    finish_ws_query(
        &mut st,
        vec![tensor_span(a), tensor_span(b)],
        vec![tensor_span(out)],
        ws,
        exec,
    )
}

unsafe extern "C" fn ws_tensor_scalar(
    a: *const AclTensor,
    _scalar: *const AclScalar,
    out: *mut AclTensor,
    ws: *mut u64,
    exec: *mut *mut AclOpExecutor,
) -> AclnnStatus {
    let mut st = STATE.lock();
    finish_ws_query(
        &mut st,
        vec![tensor_span(a)],
        vec![tensor_span(out)],
        ws,
        exec,
    )
}

unsafe extern "C" fn ws_unary(
    a: *const AclTensor,
    out: *mut AclTensor,
    ws: *mut u64,
    exec: *mut *mut AclOpExecutor,
) -> AclnnStatus {
    let mut st = STATE.lock();
    finish_ws_query(
        &mut st,
        vec![tensor_span(a)],
        vec![tensor_span(out)],
        ws,
        exec,
    )
}

unsafe extern "C" fn ws_clamp(
    a: *const AclTensor,
    _min: *const AclScalar,
    _max: *const AclScalar,
    out: *mut AclTensor,
    ws: *mut u64,
    exec: *mut *mut AclOpExecutor,
) -> AclnnStatus {
    let mut st = STATE.lock();
    finish_ws_query(
        &mut st,
        vec![tensor_span(a)],
        vec![tensor_span(out)],
        ws,
        exec,
    )
}

unsafe extern "C" fn ws_cast(
    a: *const AclTensor,
    _dtype: i32,
    out: *mut AclTensor,
    ws: *mut u64,
    exec: *mut *mut AclOpExecutor,
) -> AclnnStatus {
    let mut st = STATE.lock();
    finish_ws_query(
        &mut st,
        vec![tensor_span(a)],
        vec![tensor_span(out)],
        ws,
        exec,
    )
}

unsafe extern "C" fn ws_int_array(
    a: *const AclTensor,
    _dims: *const AclIntArray,
    out: *mut AclTensor,
    ws: *mut u64,
    exec: *mut *mut AclOpExecutor,
) -> AclnnStatus {
    let mut st = STATE.lock();
    finish_ws_query(
        &mut st,
        vec![tensor_span(a)],
        vec![tensor_span(out)],
        ws,
        exec,
    )
}

unsafe extern "C" fn ws_split(
    a: *const AclTensor,
    _sections: u64,
    _dim: i64,
    _out: *mut AclTensorList,
    ws: *mut u64,
    exec: *mut *mut AclOpExecutor,
) -> AclnnStatus {
    let mut st = STATE.lock();
    finish_ws_query(&mut st, vec![tensor_span(a)], Vec::new(), ws, exec)
}

unsafe extern "C" fn ws_cat(
    _tensors: *const AclTensorList,
    _dim: i64,
    out: *mut AclTensor,
    ws: *mut u64,
    exec: *mut *mut AclOpExecutor,
) -> AclnnStatus {
    let mut st = STATE.lock();
    finish_ws_query(&mut st, Vec::new(), vec![tensor_span(out)], ws, exec)
}

unsafe extern "C" fn ws_reduce(
    a: *const AclTensor,
    _dims: *const AclIntArray,
    _keep_dims: bool,
    _dtype: i32,
    out: *mut AclTensor,
    ws: *mut u64,
    exec: *mut *mut AclOpExecutor,
) -> AclnnStatus {
    let mut st = STATE.lock();
    finish_ws_query(
        &mut st,
        vec![tensor_span(a)],
        vec![tensor_span(out)],
        ws,
        exec,
    )
}

unsafe extern "C" fn ws_threshold(
    a: *const AclTensor,
    _thresh: *const AclScalar,
    _max_val: *const AclScalar,
    _threshold_type: i64,
    out: *mut AclTensor,
    ws: *mut u64,
    exec: *mut *mut AclOpExecutor,
) -> AclnnStatus {
    let mut st = STATE.lock();
    finish_ws_query(
        &mut st,
        vec![tensor_span(a)],
        vec![tensor_span(out)],
        ws,
        exec,
    )
}

unsafe extern "C" fn ws_min_max_loc(
    a: *const AclTensor,
    min_val: *mut AclTensor,
    max_val: *mut AclTensor,
    min_loc: *mut AclTensor,
    max_loc: *mut AclTensor,
    ws: *mut u64,
    exec: *mut *mut AclOpExecutor,
) -> AclnnStatus {
    let mut st = STATE.lock();
    finish_ws_query(
        &mut st,
        vec![tensor_span(a)],
        vec![
            tensor_span(min_val),
            tensor_span(max_val),
            tensor_span(min_loc),
            tensor_span(max_loc),
        ],
        ws,
        exec,
    )
}

unsafe extern "C" fn ws_rotate(
    a: *const AclTensor,
    _mode: i64,
    out: *mut AclTensor,
    ws: *mut u64,
    exec: *mut *mut AclOpExecutor,
) -> AclnnStatus {
    let mut st = STATE.lock();
    finish_ws_query(
        &mut st,
        vec![tensor_span(a)],
        vec![tensor_span(out)],
        ws,
        exec,
    )
}

// ============================================================================
// 执行段桩（全家族共用）
// ============================================================================

unsafe extern "C" fn run(
    workspace: *mut c_void,
    workspace_size: u64,
    executor: *mut AclOpExecutor,
    _stream: AclrtStream,
) -> AclnnStatus {
    let mut st = STATE.lock();
    st.counters.executes += 1;
    st.last_workspace = Some((workspace as usize, workspace_size));
    // 执行段消费执行器，成功失败都不再归还
    let exec = if executor.is_null() {
        None
    } else {
        // SAFETY: 执行器由查询段桩生成，只消费一次
        Some(unsafe { Box::from_raw(executor as *mut StubExecutor) })
    };
    if st.config.exec_status != ACL_SUCCESS {
        return st.config.exec_status;
    }
    if let Some(exec) = exec {
        match st.config.behavior {
            ExecBehavior::Nop => {}
            ExecBehavior::SnapshotFirstOutput => {
                if let Some(&(data, nbytes)) = exec.outs.first() {
                    // SAFETY: 输出区间由桩张量记录，在调用期间有效
                    let bytes =
                        unsafe { std::slice::from_raw_parts(data as *const u8, nbytes) };
                    st.output_snapshot = Some(bytes.to_vec());
                }
            }
            ExecBehavior::CopyFirstInputToFirstOutput => {
                if let (Some(&(src, src_n)), Some(&(dst, dst_n))) =
                    (exec.ins.first(), exec.outs.first())
                {
                    let n = src_n.min(dst_n);
                    // SAFETY: 桩张量的输入输出区间互不重叠
                    unsafe {
                        std::ptr::copy_nonoverlapping(src as *const u8, dst as *mut u8, n)
                    };
                }
            }
        }
    }
    ACL_SUCCESS
}

// ============================================================================
// 符号注册表
// ============================================================================

fn object_map() -> HashMap<String, usize> {
    let mut m = HashMap::new();
    m.insert("aclCreateTensor".to_string(), create_tensor as usize);
    m.insert("aclDestroyTensor".to_string(), destroy_tensor as usize);
    m.insert("aclCreateScalar".to_string(), create_scalar as usize);
    m.insert("aclDestroyScalar".to_string(), destroy_scalar as usize);
    m.insert("aclCreateIntArray".to_string(), create_int_array as usize);
    m.insert("aclDestroyIntArray".to_string(), destroy_int_array as usize);
    m.insert(
        "aclCreateTensorList".to_string(),
        create_tensor_list as usize,
    );
    m.insert(
        "aclDestroyTensorList".to_string(),
        destroy_tensor_list as usize,
    );
    m
}

fn generic_entries() -> Vec<(&'static str, usize)> {
    vec![
        ("Add", ws_binary_alpha as usize),
        ("Sub", ws_binary_alpha as usize),
        ("Mul", ws_binary as usize),
        ("Div", ws_binary as usize),
        ("BitwiseAndTensor", ws_binary as usize),
        ("BitwiseOrTensor", ws_binary as usize),
        ("BitwiseXorTensor", ws_binary as usize),
        ("LogicalAnd", ws_binary as usize),
        ("LogicalOr", ws_binary as usize),
        ("EqTensor", ws_binary as usize),
        ("GtTensor", ws_binary as usize),
        ("LtTensor", ws_binary as usize),
        ("Matmul", ws_matmul as usize),
        ("Muls", ws_tensor_scalar as usize),
        ("PowTensorScalar", ws_tensor_scalar as usize),
        ("Abs", ws_unary as usize),
        ("Neg", ws_unary as usize),
        ("Exp", ws_unary as usize),
        ("Log", ws_unary as usize),
        ("Sqrt", ws_unary as usize),
        ("Reciprocal", ws_unary as usize),
        ("Floor", ws_unary as usize),
        ("Ceil", ws_unary as usize),
        ("Round", ws_unary as usize),
        ("BitwiseNot", ws_unary as usize),
        ("LogicalNot", ws_unary as usize),
        ("Clamp", ws_clamp as usize),
        ("Cast", ws_cast as usize),
        ("Permute", ws_int_array as usize),
        ("Flip", ws_int_array as usize),
        ("Expand", ws_int_array as usize),
        ("SplitTensor", ws_split as usize),
        ("Cat", ws_cat as usize),
        ("ReduceSum", ws_reduce as usize),
        ("Mean", ws_reduce as usize),
    ]
}

fn cust_entries() -> Vec<(&'static str, usize)> {
    vec![
        ("ThresholdOpencv", ws_threshold as usize),
        ("MinMaxLocOpencv", ws_min_max_loc as usize),
        ("RotateOpencv", ws_rotate as usize),
    ]
}
