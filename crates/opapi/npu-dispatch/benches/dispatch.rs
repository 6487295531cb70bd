//! 算子调度性能基准测试
//!
//! 全部走桩厂商，测的是调度层自身的固定开销：校验、句柄构建、
//! 参数编组与两段调用。

use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use npu_core::{CommonOpAttrs, DataType};
use npu_dispatch::{Dispatcher, Op, OpKind};
use npu_opapi::testing;
use npu_runtime::{HostAllocator, Stream, Tensor};

fn f32_tensor(alloc: &Arc<HostAllocator>, shape: &[i64]) -> Tensor {
    Tensor::new(alloc.clone(), 0, shape, DataType::Float).unwrap()
}

fn bench_run_op_add(c: &mut Criterion) {
    let stub = testing::take();
    let alloc = Arc::new(HostAllocator::new());
    let d = Dispatcher::with_table(Arc::new(stub.table()), alloc.clone());
    let stream = Stream::new(0, 0x1000);

    let ins = [f32_tensor(&alloc, &[64, 64]), f32_tensor(&alloc, &[64, 64])];
    let outs = [f32_tensor(&alloc, &[64, 64])];
    let attrs = CommonOpAttrs::default();

    c.bench_function("run_op_add", |b| {
        b.iter(|| {
            black_box(d.run_op("Add", &attrs, &ins, &outs, &stream)).unwrap();
            // 每轮清空保留清单，避免无限增长
            stream.synchronize();
        });
    });
}

fn bench_run_op_abs_with_workspace(c: &mut Criterion) {
    let stub = testing::take();
    stub.set_ws_bytes(4096);
    let alloc = Arc::new(HostAllocator::new());
    let d = Dispatcher::with_table(Arc::new(stub.table()), alloc.clone());
    let stream = Stream::new(0, 0x1000);

    let ins = [f32_tensor(&alloc, &[64, 64])];
    let outs = [f32_tensor(&alloc, &[64, 64])];
    let attrs = CommonOpAttrs::default();

    c.bench_function("run_op_abs_with_workspace", |b| {
        b.iter(|| {
            black_box(d.run_op("Abs", &attrs, &ins, &outs, &stream)).unwrap();
            stream.synchronize();
        });
    });
}

fn bench_parse_attrs(c: &mut Criterion) {
    let attrs = CommonOpAttrs::default()
        .with_ints(vec![0, 2])
        .with_floats(vec![1.0]);

    c.bench_function("parse_reduce_attrs", |b| {
        b.iter(|| {
            black_box(Op::parse(OpKind::Sum, &attrs)).unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_run_op_add,
    bench_run_op_abs_with_workspace,
    bench_parse_attrs
);
criterion_main!(benches);
