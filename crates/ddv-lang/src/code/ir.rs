use std::sync::Arc;

use smol_str::SmolStr;

use super::builtin::Builtin;
use super::compiled::CompiledBlock;
use super::scope::Slot;
use crate::script::ast::{BinaryOp, UnaryOp};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// The intermediate representation a code context lowers script trees into
/// before compiling them to closures.
#[derive(Debug, Clone)]
pub enum Code {
    Constant(Value),
    Local(Slot),
    Assign(Slot, Box<Code>),
    RuntimeMember(SmolStr),
    Array(Vec<Code>),
    Member(Box<Code>, SmolStr),
    Index(Box<Code>, Box<Code>),
    Call(Builtin, Vec<Code>),
    Unary(UnaryOp, Box<Code>),
    Binary(BinaryOp, Box<Code>, Box<Code>),
    Logical(LogicalOp, Box<Code>, Box<Code>),
    Conditional {
        condition: Box<Code>,
        then: Box<Code>,
        otherwise: Box<Code>,
    },
    /// Evaluates every statement; the value is the last one's.
    Block(Vec<Code>),
    Loop {
        slot: Slot,
        iterable: Box<Code>,
        body: Box<Code>,
    },
    Return(Box<Code>),
    /// Accumulates the value into the output.
    Emit(Box<Code>),
    /// Accumulates literal text into the output.
    Text(String),
    /// A separately compiled sub-scope spliced in place.
    Nested(Arc<CompiledBlock>),
}

impl Code {
    pub const NONE: Code = Code::Constant(Value::None);

    pub fn block(mut statements: Vec<Code>) -> Code {
        if statements.len() == 1 {
            statements.remove(0)
        } else {
            Code::Block(statements)
        }
    }
}
