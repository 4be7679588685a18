#![cfg(test)]

use crate::ir::{ScalarKind, Type};
use crate::layout::*;

fn vec3f() -> Type {
    Type::vec(ScalarKind::F32, 3)
}

#[test]
fn test_round_up() {
    assert_eq!(round_up(16, 0), Some(0));
    assert_eq!(round_up(16, 1), Some(16));
    assert_eq!(round_up(16, 16), Some(16));
    assert_eq!(round_up(4, 13), Some(16));
    assert_eq!(round_up(0, 7), Some(7));
    assert_eq!(round_up(16, u32::MAX - 3), None);
}

#[test]
fn test_oversized_types_have_no_size() {
    let layout = HostShareableLayout;
    assert_eq!(layout.size_of(&Type::array(Type::vec(ScalarKind::F32, 4), u32::MAX / 8)), None);
    assert_eq!(layout.stride_of(&Type::array(Type::u32(), u32::MAX / 4)), Some(u32::MAX - 3));
    assert_eq!(
        layout.size_of(&Type::array(Type::array(Type::u32(), u32::MAX / 4), 2)),
        None
    );
}

#[test]
fn test_scalar_and_vector_layout() {
    let layout = HostShareableLayout;
    assert_eq!(layout.size_of(&Type::f32()), Some(4));
    assert_eq!(layout.size_of(&Type::f16()), Some(2));
    assert_eq!(layout.size_of(&Type::bool()), None);

    assert_eq!(layout.align_of(&Type::vec(ScalarKind::F32, 2)), Some(8));
    assert_eq!(layout.align_of(&vec3f()), Some(16));
    assert_eq!(layout.size_of(&vec3f()), Some(12));
    assert_eq!(layout.stride_of(&vec3f()), Some(16));

    assert_eq!(layout.align_of(&Type::vec(ScalarKind::F16, 3)), Some(8));
    assert_eq!(layout.size_of(&Type::vec(ScalarKind::F16, 4)), Some(8));
}

#[test]
fn test_matrix_layout() {
    let layout = HostShareableLayout;
    assert_eq!(layout.size_of(&Type::mat(ScalarKind::F32, 4, 4)), Some(64));
    assert_eq!(layout.size_of(&Type::mat(ScalarKind::F32, 3, 3)), Some(48));
    assert_eq!(layout.size_of(&Type::mat(ScalarKind::F32, 2, 2)), Some(32));
    assert_eq!(layout.align_of(&Type::mat(ScalarKind::F32, 4, 3)), Some(16));
}

#[test]
fn test_column_stride_is_16_for_every_row_count() {
    let layout = HostShareableLayout;
    for rows in 2..=4 {
        assert_eq!(layout.column_stride_of(&Type::mat(ScalarKind::F32, 2, rows)), Some(16));
        assert_eq!(layout.column_stride_of(&Type::mat(ScalarKind::F16, 3, rows)), Some(16));
    }
    assert_eq!(layout.column_stride_of(&Type::f32()), None);
}

#[test]
fn test_array_layout() {
    let layout = HostShareableLayout;
    assert_eq!(layout.size_of(&Type::array(vec3f(), 5)), Some(80));
    assert_eq!(layout.size_of(&Type::array(Type::u32(), 3)), Some(12));
    assert_eq!(layout.size_of(&Type::runtime_array(Type::u32())), None);
    assert_eq!(layout.align_of(&Type::runtime_array(vec3f())), Some(16));
}

#[test]
fn test_lay_out_struct_offsets() {
    let layout = HostShareableLayout;
    let s1 = lay_out_struct(
        &layout,
        "S1",
        vec![("a", Type::i32()), ("b", vec3f()), ("c", Type::i32())],
    )
    .unwrap();

    let offsets: Vec<u32> = s1.members.iter().map(|m| m.offset).collect();
    assert_eq!(offsets, vec![0, 16, 28]);

    let ty = Type::Struct(s1);
    assert_eq!(layout.align_of(&ty), Some(16));
    assert_eq!(layout.size_of(&ty), Some(32));
    assert_eq!(layout.stride_of(&Type::array(ty, 3)), Some(32));
}

#[test]
fn test_lay_out_struct_runtime_tail() {
    let layout = HostShareableLayout;
    let s = lay_out_struct(
        &layout,
        "SB",
        vec![("n", Type::u32()), ("data", Type::runtime_array(vec3f()))],
    )
    .unwrap();

    assert_eq!(s.members[1].offset, 16);
    assert_eq!(s.members[1].size, 0);
    assert_eq!(layout.size_of(&Type::Struct(s)), None);
}

#[test]
fn test_lay_out_struct_rejects_inner_runtime_array() {
    let fields = vec![("data", Type::runtime_array(Type::u32())), ("n", Type::u32())];
    assert!(lay_out_struct(&HostShareableLayout, "Bad", fields).is_none());
}

#[test]
fn test_lay_out_struct_rejects_bool() {
    let fields = vec![("flag", Type::bool())];
    assert!(lay_out_struct(&HostShareableLayout, "Flags", fields).is_none());
}

#[test]
fn test_member_offset_reads_struct() {
    let s = lay_out_struct(&HostShareableLayout, "S", vec![("a", Type::f32()), ("b", Type::vec(ScalarKind::F32, 2))])
        .unwrap();
    assert_eq!(HostShareableLayout.member_offset(&s, 1), Some(8));
    assert_eq!(HostShareableLayout.member_offset(&s, 2), None);
}
