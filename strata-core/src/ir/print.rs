//! Textual dump of IR modules.
//!
//! The format is for humans and tests only; nothing parses it back.
//!
//! ```text
//! storage @group(0) @binding(0) var sb: buffer<read_write>
//!
//! fn main() -> void {
//!   bb0:
//!     %0: buffer<read_write> = global sb
//!     %1: u32 = 8u
//!     %2: u32 = %0.Load %1
//!     %3: f32 = bitcast %2
//!     ret
//! }
//! ```

use std::fmt::{self, Write};

use super::ssa::{Function, GlobalVar, Index, InstKind, Module, Terminator, ValueId};

pub fn print_module(module: &Module) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_module(&mut out, module);
    out
}

pub fn print_function(module: &Module, func: &Function) -> String {
    let mut out = String::new();
    let _ = write_function(&mut out, module, func);
    out
}

fn write_module(out: &mut String, module: &Module) -> fmt::Result {
    for var in module.globals.values() {
        writeln!(out, "{}", var)?;
    }
    for func in module.functions.values() {
        writeln!(out)?;
        write_function(out, module, func)?;
    }
    Ok(())
}

impl fmt::Display for GlobalVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.space)?;
        if let Some(bp) = self.binding {
            write!(f, " @group({}) @binding({})", bp.group, bp.binding)?;
        }
        write!(f, " var {}: {}", self.name, self.ty)
    }
}

fn write_function(out: &mut String, module: &Module, func: &Function) -> fmt::Result {
    let body = &func.body;
    let params: Vec<String> = body.params.iter().map(|(v, ty, name)| format!("{} {}: {}", name, v, ty)).collect();
    writeln!(out, "fn {}({}) -> {} {{", func.name, params.join(", "), body.return_ty)?;

    for (b, block) in body.blocks.iter().enumerate() {
        write!(out, "  bb{}", b)?;
        if !block.params.is_empty() {
            let params: Vec<String> = block.params.iter().map(|p| format!("{}: {}", p.value, p.ty)).collect();
            write!(out, "({})", params.join(", "))?;
        }
        writeln!(out, ":")?;

        for &inst_id in &block.insts {
            let inst = body.get_inst(inst_id);
            write!(out, "    ")?;
            if let Some(result) = inst.result {
                write!(out, "{}: {} = ", result, inst.result_ty)?;
            }
            write_kind(out, module, &inst.kind)?;
            writeln!(out)?;
        }

        match &block.terminator {
            Some(term) => writeln!(out, "    {}", term)?,
            None => writeln!(out, "    <unterminated>")?,
        }
    }
    writeln!(out, "}}")
}

fn list(values: &[ValueId]) -> String {
    values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ")
}

fn index(i: &Index) -> String {
    match i {
        Index::Static(n) => n.to_string(),
        Index::Dynamic(v) => v.to_string(),
    }
}

fn write_kind(out: &mut String, module: &Module, kind: &InstKind) -> fmt::Result {
    match kind {
        InstKind::Literal(lit) => write!(out, "{}", lit),
        InstKind::Zero => write!(out, "zero"),
        InstKind::Global(g) => match module.globals.get(*g) {
            Some(var) => write!(out, "global {}", var.name),
            None => write!(out, "global ?{}", g.0),
        },
        InstKind::Var { name, init } => match init {
            Some(v) => write!(out, "var {} = {}", name, v),
            None => write!(out, "var {}", name),
        },
        InstKind::Let { name, value } => write!(out, "let {} = {}", name, value),
        InstKind::Access { base, indices } => {
            let indices: Vec<String> = indices.iter().map(index).collect();
            write!(out, "access {}, {}", base, indices.join(", "))
        }
        InstKind::Load { ptr } => write!(out, "load {}", ptr),
        InstKind::Store { ptr, value } => write!(out, "store {}, {}", ptr, value),
        InstKind::LoadVectorElement { ptr, index: i } => write!(out, "load_vector_element {}, {}", ptr, index(i)),
        InstKind::StoreVectorElement { ptr, index: i, value } => {
            write!(out, "store_vector_element {}, {}, {}", ptr, index(i), value)
        }
        InstKind::Atomic { op, ptr, args } => {
            write!(out, "{} {}", op, ptr)?;
            if !args.is_empty() {
                write!(out, ", {}", list(args))?;
            }
            Ok(())
        }
        InstKind::Binary { op, lhs, rhs } => write!(out, "{} {}, {}", op, lhs, rhs),
        InstKind::Bitcast { value } => write!(out, "bitcast {}", value),
        InstKind::Construct(operands) => write!(out, "construct {}", list(operands)),
        InstKind::Extract { composite, index } => write!(out, "extract {}, {}", composite, index),
        InstKind::Call { func, args } => {
            let name = module.functions.get(*func).map(|f| f.name.as_str()).unwrap_or("?");
            write!(out, "call {}({})", name, list(args))
        }
        InstKind::BufferLoad { buffer, op, offset } => write!(out, "{}.{} {}", buffer, op, offset),
        InstKind::BufferStore {
            buffer,
            op,
            offset,
            value,
        } => write!(out, "{}.{} {}, {}", buffer, op, offset, value),
        InstKind::BufferAtomic {
            buffer,
            op,
            offset,
            args,
        } => {
            write!(out, "{}.{} {}", buffer, op, offset)?;
            if !args.is_empty() {
                write!(out, ", {}", list(args))?;
            }
            Ok(())
        }
        InstKind::BufferLength { buffer } => write!(out, "{}.Length", buffer),
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Branch { target, args } => write!(f, "br {}({})", target, list(args)),
            Terminator::CondBranch {
                cond,
                then_target,
                then_args,
                else_target,
                else_args,
            } => write!(
                f,
                "br_if {}, {}({}), {}({})",
                cond,
                then_target,
                list(then_args),
                else_target,
                list(else_args)
            ),
            Terminator::Return(v) => write!(f, "ret {}", v),
            Terminator::ReturnUnit => write!(f, "ret"),
            Terminator::Unreachable => write!(f, "unreachable"),
        }
    }
}
