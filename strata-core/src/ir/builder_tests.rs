#![cfg(test)]

use super::builder::*;
use super::ssa::*;
use super::types::Type;

fn dummy_span() -> Span {
    Span::new(1, 1, 1, 1)
}

#[test]
fn test_simple_function() {
    // fn add(x: u32, y: u32) -> u32 { x + y }
    let mut builder = FuncBuilder::new(
        vec![(Type::u32(), "x".to_string()), (Type::u32(), "y".to_string())],
        Type::u32(),
    );

    let x = builder.get_param(0);
    let y = builder.get_param(1);
    let result = builder.binary(BinaryOp::Add, x, y, Type::u32()).unwrap();
    builder.terminate(Terminator::Return(result)).unwrap();

    let body = builder.finish().unwrap();

    assert_eq!(body.params.len(), 2);
    assert_eq!(body.num_blocks(), 1);
    assert_eq!(body.num_insts(), 1);
    assert_eq!(body.num_values(), 3); // x, y, result
}

#[test]
fn test_span_is_attached() {
    let mut builder = FuncBuilder::new(vec![], Type::u32());
    builder.set_span(dummy_span());
    let one = builder.const_u32(1).unwrap();
    builder.terminate(Terminator::Return(one)).unwrap();

    let body = builder.finish().unwrap();
    assert_eq!(body.get_inst(InstId(0)).span, dummy_span());
}

#[test]
fn test_push_after_terminate_fails() {
    let mut builder = FuncBuilder::new(vec![], Type::Void);
    builder.terminate(Terminator::ReturnUnit).unwrap();

    let result = builder.const_u32(0);
    assert!(matches!(result, Err(BuilderError::BlockAlreadyTerminated(BlockId(0)))));
    assert!(matches!(
        builder.terminate(Terminator::Unreachable),
        Err(BuilderError::BlockAlreadyTerminated(_))
    ));
}

#[test]
fn test_switch_requires_terminated_block() {
    let mut builder = FuncBuilder::new(vec![], Type::Void);
    let next = builder.create_block();

    assert!(matches!(builder.switch_to_block(next), Err(BuilderError::UnterminatedBlock(BlockId(0)))));

    builder.terminate(Terminator::Branch { target: next, args: vec![] }).unwrap();
    builder.switch_to_block(next).unwrap();
    assert_eq!(builder.current_block(), Some(next));
    assert!(!builder.is_current_terminated());
}

#[test]
fn test_finish_unterminated_fails() {
    let mut builder = FuncBuilder::new(vec![], Type::Void);
    let _ = builder.create_block();
    builder.terminate(Terminator::ReturnUnit).unwrap();

    assert!(matches!(builder.finish(), Err(BuilderError::UnterminatedBlock(BlockId(1)))));
}

#[test]
fn test_block_params() {
    let mut builder = FuncBuilder::new(vec![], Type::u32());
    let (merge, params) = builder.create_block_with_named_params(vec![(Type::u32(), "acc".to_string())]);
    let zero = builder.const_u32(0).unwrap();
    builder
        .terminate(Terminator::Branch {
            target: merge,
            args: vec![zero],
        })
        .unwrap();
    builder.switch_to_block(merge).unwrap();
    builder.terminate(Terminator::Return(params[0])).unwrap();

    let body = builder.finish().unwrap();
    let block = body.get_block(merge);
    assert_eq!(block.params.len(), 1);
    assert_eq!(block.params[0].name.as_deref(), Some("acc"));
    assert_eq!(body.get_value_type(params[0]), &Type::u32());
}

#[test]
fn test_counted_loop_structure() {
    let mut builder = FuncBuilder::new(vec![(Type::u32(), "n".to_string())], Type::Void);
    let n = builder.get_param(0);
    let lp = builder.create_counted_loop();

    let zero = builder.const_u32(0).unwrap();
    builder
        .terminate(Terminator::Branch {
            target: lp.header,
            args: vec![zero],
        })
        .unwrap();

    builder.switch_to_block(lp.header).unwrap();
    let done = builder.binary(BinaryOp::GreaterThanEqual, lp.index, n, Type::bool()).unwrap();
    builder
        .terminate(Terminator::CondBranch {
            cond: done,
            then_target: lp.exit,
            then_args: vec![],
            else_target: lp.body,
            else_args: vec![],
        })
        .unwrap();

    builder.switch_to_block(lp.body).unwrap();
    builder
        .terminate(Terminator::Branch {
            target: lp.continuing,
            args: vec![],
        })
        .unwrap();

    builder.switch_to_block(lp.continuing).unwrap();
    let one = builder.const_u32(1).unwrap();
    let next = builder.binary(BinaryOp::Add, lp.index, one, Type::u32()).unwrap();
    builder
        .terminate(Terminator::Branch {
            target: lp.header,
            args: vec![next],
        })
        .unwrap();

    builder.switch_to_block(lp.exit).unwrap();
    builder.terminate(Terminator::ReturnUnit).unwrap();

    let body = builder.finish().unwrap();
    assert_eq!(body.num_blocks(), 5);
    assert!(matches!(
        body.get_block(lp.header).control,
        Some(ControlHeader::Loop { merge, continue_block }) if merge == lp.exit && continue_block == lp.continuing
    ));
    assert_eq!(body.get_block(lp.header).params[0].value, lp.index);
    assert!(super::verify::verify_func(&body).is_ok());
}

#[test]
fn test_insert_before_keeps_order() {
    let mut builder = FuncBuilder::new(vec![], Type::u32());
    builder.set_span(dummy_span());
    let a = builder.const_u32(1).unwrap();
    let b = builder.const_u32(2).unwrap();
    builder.terminate(Terminator::Return(b)).unwrap();
    let mut body = builder.finish().unwrap();

    let anchor = body.value_defs()[&b];
    let (x, y) = {
        let mut e = InsertBefore::new(&mut body, BlockId::ENTRY, anchor);
        let x = e.const_u32(10).unwrap();
        let y = e.binary(BinaryOp::Add, a, x, Type::u32()).unwrap();
        (x, y)
    };

    let results: Vec<Option<ValueId>> =
        body.get_block(BlockId::ENTRY).insts.iter().map(|&i| body.get_inst(i).result).collect();
    assert_eq!(results, vec![Some(a), Some(x), Some(y), Some(b)]);

    // Inserted instructions take the anchor's span.
    let y_def = body.value_defs()[&y];
    assert_eq!(body.get_inst(y_def).span, dummy_span());
}

#[test]
fn test_insert_before_missing_anchor() {
    let mut builder = FuncBuilder::new(vec![], Type::Void);
    let _ = builder.const_u32(1).unwrap();
    let other = builder.create_block();
    builder.terminate(Terminator::Branch { target: other, args: vec![] }).unwrap();
    builder.switch_to_block(other).unwrap();
    builder.terminate(Terminator::ReturnUnit).unwrap();
    let mut body = builder.finish().unwrap();

    let mut e = InsertBefore::new(&mut body, other, InstId(0));
    assert!(matches!(e.const_u32(3), Err(BuilderError::AnchorNotFound(InstId(0)))));
}

#[test]
fn test_replace_all_uses_reaches_terminators() {
    let mut builder = FuncBuilder::new(vec![(Type::u32(), "x".to_string())], Type::u32());
    let x = builder.get_param(0);
    let one = builder.const_u32(1).unwrap();
    let sum = builder.binary(BinaryOp::Add, x, one, Type::u32()).unwrap();
    builder.terminate(Terminator::Return(x)).unwrap();
    let mut body = builder.finish().unwrap();

    body.replace_all_uses(x, one);

    let add = body.get_inst(body.value_defs()[&sum]);
    assert!(matches!(add.kind, InstKind::Binary { lhs, .. } if lhs == one));
    assert!(matches!(body.get_block(BlockId::ENTRY).terminator, Some(Terminator::Return(v)) if v == one));
}

#[test]
fn test_remove_inst() {
    let mut builder = FuncBuilder::new(vec![], Type::Void);
    let _ = builder.const_u32(1).unwrap();
    let two = builder.const_u32(2).unwrap();
    builder.terminate(Terminator::ReturnUnit).unwrap();
    let mut body = builder.finish().unwrap();

    let id = body.value_defs()[&two];
    body.remove_inst(BlockId::ENTRY, id);

    assert_eq!(body.get_block(BlockId::ENTRY).insts, vec![InstId(0)]);
    assert!(!body.value_defs().contains_key(&two));
}
