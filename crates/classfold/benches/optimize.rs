use classfold::classfile::{AttributeInfo, ClassFile, CodeAttribute, ConstantPool, MethodInfo, ACC_STATIC};
use classfold::{optimize, optimize_bytes, OptimizeOptions};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

/// `int b = 62; int c = (b + 764) * 3; return c + 1234 - b;`
const COMPUTE: [u8; 19] = [
    0x10, 62, 0x3b, 0x1a, 0x11, 0x02, 0xfc, 0x60, 0x06, 0x68, 0x3c, 0x1b, 0x11, 0x04, 0xd2, 0x60,
    0x1a, 0x64, 0xac,
];

/// `int acc = 1; acc = acc * 3 + 1;` repeated `rounds` times, then
/// `return acc + arg;`. The argument keeps the method from collapsing.
fn chain(rounds: usize) -> Vec<u8> {
    let mut code = vec![0x04, 0x3c]; // iconst_1; istore_1
    for _ in 0..rounds {
        // iload_1; iconst_3; imul; iconst_1; iadd; istore_1
        code.extend_from_slice(&[0x1b, 0x06, 0x68, 0x04, 0x60, 0x3c]);
    }
    code.extend_from_slice(&[0x1b, 0x1a, 0x60, 0xac]); // iload_1; iload_0; iadd; ireturn
    code
}

fn synthetic_class(methods: usize) -> ClassFile {
    let mut pool = ConstantPool::new();
    let this_class = pool.add_class("Bench").unwrap();
    let super_class = pool.add_class("java/lang/Object").unwrap();
    let code_name = pool.add_utf8("Code").unwrap();
    let mut infos = Vec::with_capacity(methods);
    for i in 0..methods {
        let (descriptor, code, max_locals) = if i % 2 == 0 {
            ("()I", COMPUTE.to_vec(), 2)
        } else {
            ("(I)I", chain(50), 2)
        };
        infos.push(MethodInfo {
            access_flags: ACC_STATIC,
            name_index: pool.add_utf8(&format!("m{i}")).unwrap(),
            descriptor_index: pool.add_utf8(descriptor).unwrap(),
            attributes: vec![AttributeInfo {
                name_index: code_name,
                info: CodeAttribute {
                    max_stack: 2,
                    max_locals,
                    code,
                    exception_table: vec![],
                    attributes: vec![],
                }
                .to_info(),
            }],
        });
    }
    ClassFile {
        minor_version: 0,
        major_version: 50,
        constant_pool: pool,
        access_flags: 0x21,
        this_class,
        super_class,
        interfaces: vec![],
        fields: vec![],
        methods: infos,
        attributes: vec![],
    }
}

fn optimize_class_bench(c: &mut Criterion) {
    let class = synthetic_class(64);
    let options = OptimizeOptions::default();
    c.bench_function("optimize 64 methods", |b| {
        b.iter(|| optimize(black_box(class.clone()), &options).unwrap())
    });
}

fn optimize_bytes_bench(c: &mut Criterion) {
    let bytes = synthetic_class(64).to_bytes();
    let options = OptimizeOptions::default();
    c.bench_function("parse + optimize + write 64 methods", |b| {
        b.iter(|| optimize_bytes(black_box(&bytes), &options).unwrap())
    });
}

criterion_group!(benches, optimize_class_bench, optimize_bytes_bench);
criterion_main!(benches);
