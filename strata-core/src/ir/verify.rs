//! SSA verification pass.
//!
//! Verifies that an SSA function body satisfies the key invariants:
//! - Every value is defined before use
//! - Every value is defined exactly once
//! - Every block has a terminator
//! - Block argument counts match at branch sites
//!
//! [`verify_module`] additionally checks the output contract of buffer
//! decomposition: no instruction dereferences a storage or uniform pointer,
//! and every buffer-backed variable has become a buffer handle.

use std::collections::HashMap;

use super::ssa::{Block, BlockId, FuncBody, InstId, Module, Terminator, ValueId};
use super::types::Type;

/// Verification error.
#[derive(Debug, Clone)]
pub enum VerifyError {
    /// A value was used before it was defined.
    UseBeforeDef {
        value: ValueId,
        use_block: BlockId,
        use_inst: Option<usize>,
    },

    /// A value was defined multiple times.
    MultipleDef {
        value: ValueId,
        first_def: DefLocation,
        second_def: DefLocation,
    },

    /// A block has no terminator.
    MissingTerminator { block: BlockId },

    /// Branch passes wrong number of arguments to target block.
    BlockArgCountMismatch {
        branch_block: BlockId,
        target_block: BlockId,
        expected: usize,
        got: usize,
    },

    /// An instruction still reads or writes through a buffer pointer.
    BufferDereference { block: BlockId, inst: InstId },

    /// A storage or uniform variable kept its structured type.
    UnrewrittenBufferVar { name: String },

    /// A function-level error, tagged with the function's name.
    InFunction { function: String, error: Box<VerifyError> },
}

/// Location where a value was defined.
#[derive(Debug, Clone)]
pub enum DefLocation {
    /// Function parameter.
    Param(usize),
    /// Block parameter.
    BlockParam(BlockId, usize),
    /// Instruction result.
    Inst(BlockId, usize),
}

impl std::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyError::UseBeforeDef {
                value,
                use_block,
                use_inst,
            } => {
                if let Some(inst) = use_inst {
                    write!(
                        f,
                        "Value {} used before definition in block {} at instruction {}",
                        value, use_block, inst
                    )
                } else {
                    write!(
                        f,
                        "Value {} used before definition in block {} (terminator)",
                        value, use_block
                    )
                }
            }
            VerifyError::MultipleDef {
                value,
                first_def,
                second_def,
            } => {
                write!(
                    f,
                    "Value {} defined multiple times: {:?} and {:?}",
                    value, first_def, second_def
                )
            }
            VerifyError::MissingTerminator { block } => {
                write!(f, "Block {} has no terminator", block)
            }
            VerifyError::BlockArgCountMismatch {
                branch_block,
                target_block,
                expected,
                got,
            } => {
                write!(
                    f,
                    "Branch from {} to {} passes {} args, but block expects {}",
                    branch_block, target_block, got, expected
                )
            }
            VerifyError::BufferDereference { block, inst } => {
                write!(f, "Instruction {} in block {} dereferences a buffer pointer", inst, block)
            }
            VerifyError::UnrewrittenBufferVar { name } => {
                write!(f, "Buffer variable '{}' was not rewritten to a buffer handle", name)
            }
            VerifyError::InFunction { function, error } => write!(f, "in {}: {}", function, error),
        }
    }
}

impl std::error::Error for VerifyError {}

/// Verify that a function body satisfies SSA invariants.
pub fn verify_func(body: &FuncBody) -> Result<(), Vec<VerifyError>> {
    let mut verifier = Verifier::new(body);
    verifier.verify();

    if verifier.errors.is_empty() { Ok(()) } else { Err(verifier.errors) }
}

/// Verify every function of a decomposed module, plus the buffer contract.
pub fn verify_module(module: &Module) -> Result<(), Vec<VerifyError>> {
    let mut errors = Vec::new();

    for var in module.globals.values() {
        if var.space.is_buffer_backed() && !matches!(var.ty, Type::BufferHandle(_)) {
            errors.push(VerifyError::UnrewrittenBufferVar { name: var.name.clone() });
        }
    }

    for func in module.functions.values() {
        let tag = |error: VerifyError| VerifyError::InFunction {
            function: func.name.clone(),
            error: Box::new(error),
        };
        if let Err(func_errors) = verify_func(&func.body) {
            errors.extend(func_errors.into_iter().map(tag));
        }
        for (block, inst) in func.body.placed_insts() {
            let Some(ptr) = func.body.get_inst(inst).kind.dereferences() else {
                continue;
            };
            if func.body.get_value_type(ptr).is_buffer_pointer() {
                errors.push(tag(VerifyError::BufferDereference { block, inst }));
            }
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

struct Verifier<'a> {
    body: &'a FuncBody,
    /// Map from value to where it's defined.
    value_defs: HashMap<ValueId, DefLocation>,
    errors: Vec<VerifyError>,
}

impl<'a> Verifier<'a> {
    fn new(body: &'a FuncBody) -> Self {
        Verifier {
            body,
            value_defs: HashMap::new(),
            errors: Vec::new(),
        }
    }

    fn verify(&mut self) {
        for (i, (value, _, _)) in self.body.params.iter().enumerate() {
            self.define_value(*value, DefLocation::Param(i));
        }

        for (block_idx, block) in self.body.blocks.iter().enumerate() {
            let block_id = BlockId(block_idx as u32);
            self.verify_block(block_id, block);
        }
    }

    fn verify_block(&mut self, block_id: BlockId, block: &Block) {
        for (i, param) in block.params.iter().enumerate() {
            self.define_value(param.value, DefLocation::BlockParam(block_id, i));
        }

        for (inst_idx, &inst_id) in block.insts.iter().enumerate() {
            let inst = self.body.get_inst(inst_id);

            for value in inst.kind.operands() {
                self.check_value_defined(value, block_id, Some(inst_idx));
            }

            if let Some(result) = inst.result {
                self.define_value(result, DefLocation::Inst(block_id, inst_idx));
            }
        }

        match &block.terminator {
            None => {
                self.errors.push(VerifyError::MissingTerminator { block: block_id });
            }
            Some(term) => {
                self.verify_terminator(block_id, term);
            }
        }
    }

    fn verify_terminator(&mut self, block_id: BlockId, term: &Terminator) {
        for value in term.operands() {
            self.check_value_defined(value, block_id, None);
        }
        match term {
            Terminator::Branch { target, args } => {
                self.check_arg_count(block_id, *target, args.len());
            }
            Terminator::CondBranch {
                then_target,
                then_args,
                else_target,
                else_args,
                ..
            } => {
                self.check_arg_count(block_id, *then_target, then_args.len());
                self.check_arg_count(block_id, *else_target, else_args.len());
            }
            Terminator::Return(_) | Terminator::ReturnUnit | Terminator::Unreachable => {}
        }
    }

    fn check_arg_count(&mut self, branch_block: BlockId, target_block: BlockId, got: usize) {
        let expected = self.body.get_block(target_block).params.len();
        if got != expected {
            self.errors.push(VerifyError::BlockArgCountMismatch {
                branch_block,
                target_block,
                expected,
                got,
            });
        }
    }

    fn define_value(&mut self, value: ValueId, loc: DefLocation) {
        if let Some(existing) = self.value_defs.get(&value) {
            self.errors.push(VerifyError::MultipleDef {
                value,
                first_def: existing.clone(),
                second_def: loc,
            });
        } else {
            self.value_defs.insert(value, loc);
        }
    }

    fn check_value_defined(&mut self, value: ValueId, block_id: BlockId, inst_idx: Option<usize>) {
        if !self.value_defs.contains_key(&value) {
            self.errors.push(VerifyError::UseBeforeDef {
                value,
                use_block: block_id,
                use_inst: inst_idx,
            });
        }
    }
}
