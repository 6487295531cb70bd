//! 厂商 ABI 类型定义
//!
//! 不透明句柄、状态码与全部入口点的函数指针类型。符号名是
//! 固定的 C 导出名，按字节精确匹配；两段式算子入口统一为
//! `aclnn<Name>GetWorkspaceSize` / `aclnn<Name>`，其中查询段
//! 的参数形状按算子家族分组，执行段全家族同型。

use std::ffi::c_void;

/// 厂商算子调用状态码，0 为成功
pub type AclnnStatus = i32;
/// 对象生命周期调用状态码，0 为成功
pub type AclError = i32;
/// 成功状态
pub const ACL_SUCCESS: i32 = 0;

/// NCHW 布局
pub const ACL_FORMAT_NCHW: i32 = 0;
/// NHWC 布局
pub const ACL_FORMAT_NHWC: i32 = 1;
/// 无特定语义的默认布局，本层全部张量按 ND 传递
pub const ACL_FORMAT_ND: i32 = 2;

/// 厂商张量句柄
#[repr(C)]
pub struct AclTensor {
    _opaque: [u8; 0],
}

/// 厂商标量句柄
#[repr(C)]
pub struct AclScalar {
    _opaque: [u8; 0],
}

/// 厂商整数数组句柄
#[repr(C)]
pub struct AclIntArray {
    _opaque: [u8; 0],
}

/// 厂商张量列表句柄
#[repr(C)]
pub struct AclTensorList {
    _opaque: [u8; 0],
}

/// 厂商执行器对象，查询段产出、执行段消费
#[repr(C)]
pub struct AclOpExecutor {
    _opaque: [u8; 0],
}

/// 流句柄，由设备运行时创建
pub type AclrtStream = *mut c_void;

// ============================================================================
// 对象生命周期入口点
// ============================================================================

/// `aclCreateTensor`
pub type CreateTensorFn = unsafe extern "C" fn(
    view_dims: *const i64,
    view_dims_num: u64,
    data_type: i32,
    stride: *const i64,
    offset: i64,
    format: i32,
    storage_dims: *const i64,
    storage_dims_num: u64,
    tensor_data: *mut c_void,
) -> *mut AclTensor;

/// `aclDestroyTensor`
pub type DestroyTensorFn = unsafe extern "C" fn(tensor: *const AclTensor) -> AclError;

/// `aclCreateScalar`
pub type CreateScalarFn =
    unsafe extern "C" fn(value: *mut c_void, data_type: i32) -> *mut AclScalar;

/// `aclDestroyScalar`
pub type DestroyScalarFn = unsafe extern "C" fn(scalar: *const AclScalar) -> AclError;

/// `aclCreateIntArray`
pub type CreateIntArrayFn =
    unsafe extern "C" fn(value: *const i64, size: u64) -> *mut AclIntArray;

/// `aclDestroyIntArray`
pub type DestroyIntArrayFn = unsafe extern "C" fn(array: *const AclIntArray) -> AclError;

/// `aclCreateTensorList`
pub type CreateTensorListFn =
    unsafe extern "C" fn(value: *const *const AclTensor, size: u64) -> *mut AclTensorList;

/// `aclDestroyTensorList`
pub type DestroyTensorListFn = unsafe extern "C" fn(list: *const AclTensorList) -> AclError;

// ============================================================================
// 算子入口点
// ============================================================================

/// 执行段 `aclnn<Name>`，全部算子同型
pub type RunFn = unsafe extern "C" fn(
    workspace: *mut c_void,
    workspace_size: u64,
    executor: *mut AclOpExecutor,
    stream: AclrtStream,
) -> AclnnStatus;

/// 二元算子查询段：`(self, other, out)`
pub type WsBinaryFn = unsafe extern "C" fn(
    *const AclTensor,
    *const AclTensor,
    *mut AclTensor,
    *mut u64,
    *mut *mut AclOpExecutor,
) -> AclnnStatus;

/// 带 alpha 标量的二元算子查询段：`(self, other, alpha, out)`
pub type WsBinaryAlphaFn = unsafe extern "C" fn(
    *const AclTensor,
    *const AclTensor,
    *const AclScalar,
    *mut AclTensor,
    *mut u64,
    *mut *mut AclOpExecutor,
) -> AclnnStatus;

/// 矩阵乘查询段：`(self, other, out, cubeMathType)`
pub type WsMatmulFn = unsafe extern "C" fn(
    *const AclTensor,
    *const AclTensor,
    *mut AclTensor,
    i8,
    *mut u64,
    *mut *mut AclOpExecutor,
) -> AclnnStatus;

/// 张量-标量算子查询段：`(self, scalar, out)`
pub type WsTensorScalarFn = unsafe extern "C" fn(
    *const AclTensor,
    *const AclScalar,
    *mut AclTensor,
    *mut u64,
    *mut *mut AclOpExecutor,
) -> AclnnStatus;

/// 一元算子查询段：`(self, out)`
pub type WsUnaryFn = unsafe extern "C" fn(
    *const AclTensor,
    *mut AclTensor,
    *mut u64,
    *mut *mut AclOpExecutor,
) -> AclnnStatus;

/// 截断查询段：`(self, min, max, out)`
pub type WsClampFn = unsafe extern "C" fn(
    *const AclTensor,
    *const AclScalar,
    *const AclScalar,
    *mut AclTensor,
    *mut u64,
    *mut *mut AclOpExecutor,
) -> AclnnStatus;

/// 类型转换查询段：`(self, dtype, out)`
pub type WsCastFn = unsafe extern "C" fn(
    *const AclTensor,
    i32,
    *mut AclTensor,
    *mut u64,
    *mut *mut AclOpExecutor,
) -> AclnnStatus;

/// 整数数组参数算子查询段：`(self, dims, out)`
pub type WsIntArrayFn = unsafe extern "C" fn(
    *const AclTensor,
    *const AclIntArray,
    *mut AclTensor,
    *mut u64,
    *mut *mut AclOpExecutor,
) -> AclnnStatus;

/// 拆分查询段：`(self, splitSections, dim, outList)`
pub type WsSplitFn = unsafe extern "C" fn(
    *const AclTensor,
    u64,
    i64,
    *mut AclTensorList,
    *mut u64,
    *mut *mut AclOpExecutor,
) -> AclnnStatus;

/// 拼接查询段：`(tensors, dim, out)`
pub type WsCatFn = unsafe extern "C" fn(
    *const AclTensorList,
    i64,
    *mut AclTensor,
    *mut u64,
    *mut *mut AclOpExecutor,
) -> AclnnStatus;

/// 归约查询段：`(self, dims, keepDims, dtype, out)`
pub type WsReduceFn = unsafe extern "C" fn(
    *const AclTensor,
    *const AclIntArray,
    bool,
    i32,
    *mut AclTensor,
    *mut u64,
    *mut *mut AclOpExecutor,
) -> AclnnStatus;

/// 阈值化查询段：`(self, thresh, maxVal, type, out)`
pub type WsThresholdFn = unsafe extern "C" fn(
    *const AclTensor,
    *const AclScalar,
    *const AclScalar,
    i64,
    *mut AclTensor,
    *mut u64,
    *mut *mut AclOpExecutor,
) -> AclnnStatus;

/// 最值定位查询段：`(self, minVal, maxVal, minLoc, maxLoc)`
pub type WsMinMaxLocFn = unsafe extern "C" fn(
    *const AclTensor,
    *mut AclTensor,
    *mut AclTensor,
    *mut AclTensor,
    *mut AclTensor,
    *mut u64,
    *mut *mut AclOpExecutor,
) -> AclnnStatus;

/// 旋转查询段：`(self, mode, out)`
pub type WsRotateFn = unsafe extern "C" fn(
    *const AclTensor,
    i64,
    *mut AclTensor,
    *mut u64,
    *mut *mut AclOpExecutor,
) -> AclnnStatus;
