#![cfg(test)]

use super::builder::{Emit, FuncBuilder};
use super::print::*;
use super::ssa::*;
use super::types::{AccessMode, AddressSpace, ScalarKind, Type};

#[test]
fn test_print_decomposed_load() {
    let mut module = Module::new();
    let g = module.add_global(
        GlobalVar::new("sb", AddressSpace::Storage, Type::BufferHandle(AccessMode::ReadWrite), AccessMode::ReadWrite)
            .with_binding(0, 1),
    );

    let mut builder = FuncBuilder::new(vec![], Type::f32());
    let buffer = builder.push_inst(InstKind::Global(g), module.global(g).pointer_type()).unwrap();
    let offset = builder.const_u32(8).unwrap();
    let word = builder
        .push_inst(
            InstKind::BufferLoad {
                buffer,
                op: BufferLoadOp::Load,
                offset,
            },
            Type::u32(),
        )
        .unwrap();
    let x = builder.bitcast(word, Type::f32()).unwrap();
    builder.terminate(Terminator::Return(x)).unwrap();
    module.add_function("main", builder.finish().unwrap());

    let expected = "\
storage @group(0) @binding(1) var sb: buffer<read_write>

fn main() -> f32 {
  bb0:
    %0: buffer<read_write> = global sb
    %1: u32 = 8u
    %2: u32 = %0.Load %1
    %3: f32 = bitcast %2
    ret %3
}
";
    assert_eq!(print_module(&module), expected);
}

#[test]
fn test_print_access_and_block_params() {
    let mut module = Module::new();
    let ptr_ty = Type::ptr(AddressSpace::Uniform, Type::f32(), AccessMode::Read);
    let rows = Type::array(Type::vec(ScalarKind::F32, 4), 4);
    let g = module.add_global(GlobalVar::new("ub", AddressSpace::Uniform, rows, AccessMode::Read));

    let mut builder = FuncBuilder::new(vec![(Type::u32(), "i".to_string())], Type::Void);
    let i = builder.get_param(0);
    let base = builder.push_inst(InstKind::Global(g), module.global(g).pointer_type()).unwrap();
    let _ = builder
        .push_inst(
            InstKind::Access {
                base,
                indices: vec![Index::Dynamic(i), Index::Static(1)],
            },
            ptr_ty,
        )
        .unwrap();
    let (next, _) = builder.create_block_with_params(vec![Type::u32()]);
    builder.terminate(Terminator::Branch { target: next, args: vec![i] }).unwrap();
    builder.switch_to_block(next).unwrap();
    builder.terminate(Terminator::ReturnUnit).unwrap();
    let id = module.add_function("walk", builder.finish().unwrap());

    let text = print_function(&module, module.function(id));
    assert!(text.starts_with("fn walk(i %0: u32) -> void {\n"));
    assert!(text.contains("%1: ptr<uniform, array<vec4<f32>, 4>, read> = global ub\n"));
    assert!(text.contains("%2: ptr<uniform, f32, read> = access %1, %0, 1\n"));
    assert!(text.contains("    br bb1(%0)\n"));
    assert!(text.contains("  bb1(%3: u32):\n"));
}

#[test]
fn test_print_call_and_atomic() {
    let mut module = Module::new();
    let g = module.add_global(GlobalVar::new(
        "counter",
        AddressSpace::Workgroup,
        Type::Atomic(ScalarKind::U32),
        AccessMode::ReadWrite,
    ));

    let mut callee = FuncBuilder::new(vec![], Type::Void);
    callee.terminate(Terminator::ReturnUnit).unwrap();
    let callee = module.add_function("tick", callee.finish().unwrap());

    let mut builder = FuncBuilder::new(vec![], Type::u32());
    let ptr = builder.push_inst(InstKind::Global(g), module.global(g).pointer_type()).unwrap();
    let one = builder.const_u32(1).unwrap();
    let old = builder
        .push_inst(
            InstKind::Atomic {
                op: AtomicOp::Add,
                ptr,
                args: vec![one],
            },
            Type::u32(),
        )
        .unwrap();
    builder
        .push_void_inst(InstKind::Call {
            func: callee,
            args: vec![],
        })
        .unwrap();
    builder.terminate(Terminator::Return(old)).unwrap();
    let id = module.add_function("main", builder.finish().unwrap());

    let text = print_function(&module, module.function(id));
    assert!(text.contains("%2: u32 = atomicAdd %0, %1\n"));
    assert!(text.contains("    call tick()\n"));
}
