//! 厂商原生对象的 RAII 包装
//!
//! 每个包装在创建时同时取得创建与销毁两个入口点：销毁端缺失
//! 则根本不会创建句柄，创建出来的句柄一定能在 `Drop` 中销毁。
//! 销毁失败只记警告，不会二次销毁。包装持有裸句柄，生命周期
//! 限定在单次调度调用内。

use std::ffi::c_void;

use npu_core::{DataType, NpuError, NpuResult};
use npu_runtime::Tensor;

use crate::ffi::*;
use crate::symbols::SymbolTable;

/// 厂商张量句柄
#[derive(Debug)]
pub struct NativeTensor {
    handle: *mut AclTensor,
    destroy: DestroyTensorFn,
}

impl NativeTensor {
    /// 按张量描述创建厂商句柄
    ///
    /// 形状、步长、偏移按元素传递，布局固定为 ND，数据指针为
    /// 缓冲区基地址（偏移由厂商侧套用）。
    pub fn new(table: &SymbolTable, tensor: &Tensor) -> NpuResult<Self> {
        let create = table.objects.create_tensor()?;
        let destroy = table.objects.destroy_tensor()?;
        let shape = tensor.shape();
        let strides = tensor.strides();
        let storage = tensor.storage_shape();
        // SAFETY: 指针参数都指向本调用栈上存活的切片
        let handle = unsafe {
            create(
                shape.as_ptr(),
                shape.len() as u64,
                tensor.dtype().acl(),
                strides.as_ptr(),
                tensor.elem_offset(),
                ACL_FORMAT_ND,
                storage.as_ptr(),
                storage.len() as u64,
                tensor.base_ptr(),
            )
        };
        if handle.is_null() {
            return Err(NpuError::NullHandle {
                api: "aclCreateTensor",
            });
        }
        Ok(NativeTensor { handle, destroy })
    }

    /// 裸句柄（输入位）
    pub fn handle(&self) -> *const AclTensor {
        self.handle
    }

    /// 裸句柄（输出位）
    pub fn handle_mut(&self) -> *mut AclTensor {
        self.handle
    }
}

impl Drop for NativeTensor {
    fn drop(&mut self) {
        // SAFETY: 句柄有效且仅销毁一次
        let code = unsafe { (self.destroy)(self.handle) };
        if code != ACL_SUCCESS {
            tracing::warn!("aclDestroyTensor returned {}", code);
        }
    }
}

/// 厂商标量句柄
#[derive(Debug)]
pub struct NativeScalar {
    handle: *mut AclScalar,
    destroy: DestroyScalarFn,
}

impl NativeScalar {
    fn create(table: &SymbolTable, value: *mut c_void, dtype: DataType) -> NpuResult<Self> {
        let create = table.objects.create_scalar()?;
        let destroy = table.objects.destroy_scalar()?;
        // SAFETY: value 指向本调用栈上的标量，厂商拷贝其值
        let handle = unsafe { create(value, dtype.acl()) };
        if handle.is_null() {
            return Err(NpuError::NullHandle {
                api: "aclCreateScalar",
            });
        }
        Ok(NativeScalar { handle, destroy })
    }

    /// 32 位整型标量
    pub fn from_i32(table: &SymbolTable, value: i32) -> NpuResult<Self> {
        let mut v = value;
        Self::create(table, &mut v as *mut i32 as *mut c_void, DataType::Int32)
    }

    /// 32 位浮点标量
    pub fn from_f32(table: &SymbolTable, value: f32) -> NpuResult<Self> {
        let mut v = value;
        Self::create(table, &mut v as *mut f32 as *mut c_void, DataType::Float)
    }

    /// 裸句柄
    pub fn handle(&self) -> *const AclScalar {
        self.handle
    }
}

impl Drop for NativeScalar {
    fn drop(&mut self) {
        // SAFETY: 句柄有效且仅销毁一次
        let code = unsafe { (self.destroy)(self.handle) };
        if code != ACL_SUCCESS {
            tracing::warn!("aclDestroyScalar returned {}", code);
        }
    }
}

/// 厂商整数数组句柄
#[derive(Debug)]
pub struct NativeIntArray {
    handle: *mut AclIntArray,
    destroy: DestroyIntArrayFn,
}

impl NativeIntArray {
    pub fn new(table: &SymbolTable, values: &[i64]) -> NpuResult<Self> {
        let create = table.objects.create_int_array()?;
        let destroy = table.objects.destroy_int_array()?;
        // SAFETY: values 在调用期间存活，厂商拷贝内容
        let handle = unsafe { create(values.as_ptr(), values.len() as u64) };
        if handle.is_null() {
            return Err(NpuError::NullHandle {
                api: "aclCreateIntArray",
            });
        }
        Ok(NativeIntArray { handle, destroy })
    }

    /// 裸句柄
    pub fn handle(&self) -> *const AclIntArray {
        self.handle
    }
}

impl Drop for NativeIntArray {
    fn drop(&mut self) {
        // SAFETY: 句柄有效且仅销毁一次
        let code = unsafe { (self.destroy)(self.handle) };
        if code != ACL_SUCCESS {
            tracing::warn!("aclDestroyIntArray returned {}", code);
        }
    }
}

/// 厂商张量列表句柄
///
/// 列表只引用成员张量，销毁列表不销毁成员；成员句柄由各自的
/// [`NativeTensor`] 负责，列表销毁是额外的一次清理。
#[derive(Debug)]
pub struct NativeTensorList {
    handle: *mut AclTensorList,
    destroy: DestroyTensorListFn,
}

impl NativeTensorList {
    pub fn new(table: &SymbolTable, members: &[NativeTensor]) -> NpuResult<Self> {
        let create = table.objects.create_tensor_list()?;
        let destroy = table.objects.destroy_tensor_list()?;
        let handles: Vec<*const AclTensor> = members.iter().map(|m| m.handle()).collect();
        // SAFETY: 句柄数组在调用期间存活
        let handle = unsafe { create(handles.as_ptr(), handles.len() as u64) };
        if handle.is_null() {
            return Err(NpuError::NullHandle {
                api: "aclCreateTensorList",
            });
        }
        Ok(NativeTensorList { handle, destroy })
    }

    /// 裸句柄（输入位）
    pub fn handle(&self) -> *const AclTensorList {
        self.handle
    }

    /// 裸句柄（输出位）
    pub fn handle_mut(&self) -> *mut AclTensorList {
        self.handle
    }
}

impl Drop for NativeTensorList {
    fn drop(&mut self) {
        // SAFETY: 句柄有效且仅销毁一次
        let code = unsafe { (self.destroy)(self.handle) };
        if code != ACL_SUCCESS {
            tracing::warn!("aclDestroyTensorList returned {}", code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use npu_core::ErrorKind;
    use npu_runtime::HostAllocator;
    use std::sync::Arc;

    fn tensor() -> Tensor {
        Tensor::new(Arc::new(HostAllocator::new()), 0, &[2, 2], DataType::Float)
            .expect("tensor")
    }

    #[test]
    fn test_tensor_wrapper_destroys_on_drop() {
        let stub = testing::take();
        let table = stub.table();
        {
            let _native = NativeTensor::new(&table, &tensor()).expect("native tensor");
            assert_eq!(stub.counters().tensors_created, 1);
            assert_eq!(stub.counters().tensors_destroyed, 0);
        }
        let counters = stub.counters();
        assert_eq!(counters.tensors_destroyed, 1);
        assert!(counters.balanced());
    }

    #[test]
    fn test_scalar_dtype_reaches_vendor() {
        let stub = testing::take();
        let table = stub.table();
        {
            let _a = NativeScalar::from_i32(&table, 7).expect("int scalar");
            let _b = NativeScalar::from_f32(&table, 1.5).expect("float scalar");
        }
        assert_eq!(
            stub.scalar_dtypes(),
            vec![DataType::Int32.acl(), DataType::Float.acl()]
        );
        assert!(stub.counters().balanced());
    }

    #[test]
    fn test_create_failure_reports_null_handle() {
        let stub = testing::take();
        let table = stub.table();
        stub.fail_tensor_create_at(1);
        let err = NativeTensor::new(&table, &tensor()).expect_err("injected failure");
        assert_eq!(err.kind(), ErrorKind::VendorFailure);
        // 创建失败的句柄不存在，也就没有销毁
        let counters = stub.counters();
        assert_eq!(counters.tensors_created, 0);
        assert_eq!(counters.tensors_destroyed, 0);
    }

    #[test]
    fn test_missing_object_library_blocks_creation() {
        let stub = testing::take();
        let table = stub.table_without(&["aclDestroyTensor"]);
        // 销毁端缺失时创建被拒绝，不会产生无法回收的句柄
        let err = NativeTensor::new(&table, &tensor()).expect_err("no destroy symbol");
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert_eq!(stub.counters().tensors_created, 0);
    }

    #[test]
    fn test_tensor_list_only_destroys_list() {
        let stub = testing::take();
        let table = stub.table();
        {
            let members = vec![
                NativeTensor::new(&table, &tensor()).expect("member 0"),
                NativeTensor::new(&table, &tensor()).expect("member 1"),
            ];
            let _list = NativeTensorList::new(&table, &members).expect("list");
            assert_eq!(stub.list_sizes(), vec![2]);
        }
        let counters = stub.counters();
        assert_eq!(counters.lists_created, 1);
        assert_eq!(counters.lists_destroyed, 1);
        assert_eq!(counters.tensors_created, 2);
        assert_eq!(counters.tensors_destroyed, 2);
    }
}
