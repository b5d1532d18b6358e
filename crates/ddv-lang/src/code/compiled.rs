//! Closures produced from [`Code`] and the artifacts built from them.

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use smol_str::SmolStr;

use super::ir::{Code, LogicalOp};
use crate::cache::Checksum;
use crate::error::compile::CompileError;
use crate::error::runtime::RuntimeError;
use crate::runtime::Runtime;
use crate::script::ast::{BinaryOp, UnaryOp};
use crate::value::Value;

/// Why evaluation left the normal statement flow.
#[derive(Debug, Clone, PartialEq)]
pub enum Unwind {
    Return(Value),
    Fault(RuntimeError),
}

impl From<RuntimeError> for Unwind {
    fn from(error: RuntimeError) -> Self {
        Unwind::Fault(error)
    }
}

/// The per-invocation state: the hoisted local slots, the bound runtime and the output accumulator.
pub struct Frame<'a> {
    slots: Vec<Value>,
    runtime: &'a Runtime,
    output: String,
    iterations: usize,
    max_iterations: usize,
}

impl<'a> Frame<'a> {
    pub fn new(runtime: &'a Runtime, slot_count: usize, max_iterations: usize) -> Self {
        Self {
            slots: vec![Value::None; slot_count],
            runtime,
            output: String::new(),
            iterations: 0,
            max_iterations,
        }
    }

    pub fn emit(&mut self, value: &Value) {
        match value {
            Value::String(s) => self.output.push_str(s),
            Value::None => {}
            value => self.output.push_str(&value.to_string()),
        }
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn into_output(self) -> String {
        self.output
    }

    fn load(&self, slot: usize) -> Value {
        self.slots.get(slot).cloned().unwrap_or_default()
    }

    fn store(&mut self, slot: usize, value: Value) {
        if slot >= self.slots.len() {
            self.slots.resize(slot + 1, Value::None);
        }
        self.slots[slot] = value;
    }

    fn tick(&mut self) -> Result<(), RuntimeError> {
        self.iterations += 1;
        if self.iterations > self.max_iterations {
            Err(RuntimeError::IterationLimit(self.max_iterations))
        } else {
            Ok(())
        }
    }
}

/// A compiled expression or statement.
pub type CompiledExpr = Arc<dyn Fn(&mut Frame<'_>) -> Result<Value, Unwind> + Send + Sync>;

/// The result of invoking a compiled function: a value, or the description of the fault that stopped it.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Value(Value),
    Fault(String),
}

impl Outcome {
    pub fn is_fault(&self) -> bool {
        matches!(self, Outcome::Fault(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Outcome::Value(value) => Some(value),
            Outcome::Fault(_) => None,
        }
    }

    /// Output text: the value's display form, or the fault description in its place.
    pub fn into_text(self) -> String {
        match self {
            Outcome::Value(Value::String(s)) => s,
            Outcome::Value(value) => value.to_string(),
            Outcome::Fault(description) => description,
        }
    }
}

/// A nested sub-scope compiled on its own and spliced into its parent as a loop or conditional body.
pub struct CompiledBlock {
    pub name: Option<SmolStr>,
    pub checksum: Checksum,
    /// Frame size the block needs, including the slots of its enclosing scopes.
    pub slot_count: usize,
    pub diagnostics: Vec<CompileError>,
    pub(crate) body: CompiledExpr,
}

impl Debug for CompiledBlock {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledBlock")
            .field("name", &self.name)
            .field("checksum", &self.checksum)
            .field("slot_count", &self.slot_count)
            .finish_non_exhaustive()
    }
}

pub type Routine = Arc<dyn Fn(&Runtime) -> Outcome + Send + Sync>;

/// A completed, invocable function. Immutable and safe to call from many threads.
pub struct CompiledFunction {
    pub name: Option<SmolStr>,
    pub model_type: SmolStr,
    pub checksum: Checksum,
    pub slot_count: usize,
    pub diagnostics: Vec<CompileError>,
    pub(crate) routine: Routine,
}

impl CompiledFunction {
    pub fn invoke(&self, runtime: &Runtime) -> Outcome {
        (self.routine)(runtime)
    }
}

impl Debug for CompiledFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledFunction")
            .field("name", &self.name)
            .field("model_type", &self.model_type)
            .field("checksum", &self.checksum)
            .field("slot_count", &self.slot_count)
            .finish_non_exhaustive()
    }
}

/// Compiles an IR tree into a closure.
pub fn compile(code: &Code) -> CompiledExpr {
    match code {
        Code::Constant(value) => {
            let value = value.clone();
            Arc::new(move |_: &mut Frame<'_>| Ok(value.clone()))
        }
        Code::Local(slot) => {
            let slot = *slot;
            Arc::new(move |frame: &mut Frame<'_>| Ok(frame.load(slot)))
        }
        Code::Assign(slot, value) => {
            let slot = *slot;
            let value = compile(value);
            Arc::new(move |frame: &mut Frame<'_>| {
                let value = value(frame)?;
                frame.store(slot, value.clone());
                Ok(value)
            })
        }
        Code::RuntimeMember(name) => {
            let name = name.clone();
            Arc::new(move |frame: &mut Frame<'_>| {
                frame
                    .runtime
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| RuntimeError::MissingRuntimeMember(name.clone()).into())
            })
        }
        Code::Array(items) => {
            let items: Vec<CompiledExpr> = items.iter().map(compile).collect();
            Arc::new(move |frame: &mut Frame<'_>| {
                let items = items.iter().map(|item| item(frame)).collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Array(items))
            })
        }
        Code::Member(target, name) => {
            let target = compile(target);
            let name = name.clone();
            Arc::new(move |frame: &mut Frame<'_>| Ok(member(target(frame)?, &name)?))
        }
        Code::Index(target, index) => {
            let target = compile(target);
            let index = compile(index);
            Arc::new(move |frame: &mut Frame<'_>| {
                let target = target(frame)?;
                let index = index(frame)?;
                Ok(index_of(target, index)?)
            })
        }
        Code::Call(builtin, args) => {
            let builtin = *builtin;
            let args: Vec<CompiledExpr> = args.iter().map(compile).collect();
            Arc::new(move |frame: &mut Frame<'_>| {
                let args = args.iter().map(|arg| arg(frame)).collect::<Result<Vec<_>, _>>()?;
                Ok(builtin.call(args, frame)?)
            })
        }
        Code::Unary(op, operand) => {
            let op = *op;
            let operand = compile(operand);
            Arc::new(move |frame: &mut Frame<'_>| {
                let value = operand(frame)?;
                match (op, value) {
                    (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
                    (UnaryOp::Negate, Value::Number(n)) => Ok(Value::Number(-n)),
                    (UnaryOp::Negate, value) => Err(invalid_types("-", &[&value]).into()),
                }
            })
        }
        Code::Binary(op, left, right) => {
            let op = *op;
            let left = compile(left);
            let right = compile(right);
            Arc::new(move |frame: &mut Frame<'_>| {
                let left = left(frame)?;
                let right = right(frame)?;
                Ok(binary(op, left, right)?)
            })
        }
        Code::Logical(op, left, right) => {
            let op = *op;
            let left = compile(left);
            let right = compile(right);
            Arc::new(move |frame: &mut Frame<'_>| {
                let left = left(frame)?.is_truthy();
                let result = match op {
                    LogicalOp::And => left && right(frame)?.is_truthy(),
                    LogicalOp::Or => left || right(frame)?.is_truthy(),
                };
                Ok(Value::Bool(result))
            })
        }
        Code::Conditional {
            condition,
            then,
            otherwise,
        } => {
            let condition = compile(condition);
            let then = compile(then);
            let otherwise = compile(otherwise);
            Arc::new(move |frame: &mut Frame<'_>| {
                if condition(frame)?.is_truthy() {
                    then(frame)
                } else {
                    otherwise(frame)
                }
            })
        }
        Code::Block(statements) => {
            let statements: Vec<CompiledExpr> = statements.iter().map(compile).collect();
            Arc::new(move |frame: &mut Frame<'_>| {
                let mut last = Value::None;
                for statement in &statements {
                    last = statement(frame)?;
                }
                Ok(last)
            })
        }
        Code::Loop { slot, iterable, body } => {
            let slot = *slot;
            let iterable = compile(iterable);
            let body = compile(body);
            Arc::new(move |frame: &mut Frame<'_>| {
                for item in items(iterable(frame)?)? {
                    frame.tick()?;
                    frame.store(slot, item);
                    body(frame)?;
                }
                Ok(Value::None)
            })
        }
        Code::Return(value) => {
            let value = compile(value);
            Arc::new(move |frame: &mut Frame<'_>| Err(Unwind::Return(value(frame)?)))
        }
        Code::Emit(value) => {
            let value = compile(value);
            Arc::new(move |frame: &mut Frame<'_>| {
                let value = value(frame)?;
                frame.emit(&value);
                Ok(Value::None)
            })
        }
        Code::Text(text) => {
            let text = text.clone();
            Arc::new(move |frame: &mut Frame<'_>| {
                frame.output.push_str(&text);
                Ok(Value::None)
            })
        }
        Code::Nested(block) => {
            let block = Arc::clone(block);
            Arc::new(move |frame: &mut Frame<'_>| (block.body)(frame))
        }
    }
}

fn invalid_types(name: &str, args: &[&Value]) -> RuntimeError {
    RuntimeError::InvalidTypes {
        name: name.into(),
        args: args.iter().map(|arg| SmolStr::new(arg.type_name())).collect(),
    }
}

fn member(target: Value, name: &str) -> Result<Value, RuntimeError> {
    match target {
        Value::Dict(mut dict) => Ok(dict.remove(name).unwrap_or_default()),
        Value::None => Ok(Value::None),
        target => Err(RuntimeError::InvalidMemberAccess {
            member: name.into(),
            type_name: target.type_name().into(),
        }),
    }
}

fn index_of(target: Value, index: Value) -> Result<Value, RuntimeError> {
    match (target, index) {
        (Value::Array(mut items), Value::Number(n)) => {
            let i = usize::try_from(n.to_int()).map_err(|_| RuntimeError::IndexOutOfBounds(n))?;
            if !n.is_int() || i >= items.len() {
                return Err(RuntimeError::IndexOutOfBounds(n));
            }
            Ok(items.swap_remove(i))
        }
        (Value::String(s), Value::Number(n)) => usize::try_from(n.to_int())
            .ok()
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::String(c.to_string()))
            .ok_or(RuntimeError::IndexOutOfBounds(n)),
        (Value::Dict(mut dict), Value::String(key)) => Ok(dict.remove(key.as_str()).unwrap_or_default()),
        (Value::None, _) => Ok(Value::None),
        (target, index) => Err(invalid_types("[]", &[&target, &index])),
    }
}

fn items(value: Value) -> Result<Vec<Value>, RuntimeError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Dict(dict) => Ok(dict.into_keys().map(Value::from).collect()),
        Value::None => Ok(Vec::new()),
        value => Err(RuntimeError::NotIterable(value.type_name().into())),
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, RuntimeError> {
    match (op, left, right) {
        (BinaryOp::Eq, left, right) => Ok(Value::Bool(left == right)),
        (BinaryOp::Ne, left, right) => Ok(Value::Bool(left != right)),
        (BinaryOp::Add, Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
        (BinaryOp::Add, Value::Array(mut a), Value::Array(b)) => {
            a.extend(b);
            Ok(Value::Array(a))
        }
        (BinaryOp::Add, Value::String(a), b) => Ok(Value::String(a + &b.to_string())),
        (BinaryOp::Add, a, Value::String(b)) => Ok(Value::String(a.to_string() + &b)),
        (BinaryOp::Sub, Value::Number(a), Value::Number(b)) => Ok(Value::Number(a - b)),
        (BinaryOp::Mul, Value::Number(a), Value::Number(b)) => Ok(Value::Number(a * b)),
        (BinaryOp::Div | BinaryOp::Rem, Value::Number(_), Value::Number(b)) if b.is_zero() => {
            Err(RuntimeError::ZeroDivision)
        }
        (BinaryOp::Div, Value::Number(a), Value::Number(b)) => Ok(Value::Number(a / b)),
        (BinaryOp::Rem, Value::Number(a), Value::Number(b)) => Ok(Value::Number(a % b)),
        (BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte, left, right) => {
            let ordering = match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => None,
            };
            let Some(ordering) = ordering else {
                return Err(invalid_types(op.symbol(), &[&left, &right]));
            };
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Lte => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        (op, left, right) => Err(invalid_types(op.symbol(), &[&left, &right])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::number::Number;
    use crate::value::Dict;
    use rstest::rstest;

    fn eval(code: Code) -> Result<Value, Unwind> {
        let mut model = Dict::new();
        model.insert("Name".into(), "Ada".into());
        model.insert("Items".into(), vec![1, 2, 3].into());
        let runtime = Runtime::new().with("model", model);
        let mut frame = Frame::new(&runtime, 2, 10);
        compile(&code)(&mut frame)
    }

    fn constant(value: impl Into<Value>) -> Box<Code> {
        Box::new(Code::Constant(value.into()))
    }

    #[rstest]
    #[case(Code::Binary(BinaryOp::Add, constant(1), constant(2)), Ok(Value::from(3)))]
    #[case(Code::Binary(BinaryOp::Add, constant("a"), constant(1)), Ok(Value::from("a1")))]
    #[case(Code::Binary(BinaryOp::Div, constant(1), constant(0)), Err(Unwind::Fault(RuntimeError::ZeroDivision)))]
    #[case(Code::Binary(BinaryOp::Lt, constant("a"), constant("b")), Ok(Value::TRUE))]
    #[case(Code::Logical(LogicalOp::Or, constant(0), constant("x")), Ok(Value::TRUE))]
    #[case(Code::Unary(UnaryOp::Not, constant("")), Ok(Value::TRUE))]
    #[case(Code::Member(Box::new(Code::RuntimeMember("model".into())), "Name".into()), Ok(Value::from("Ada")))]
    #[case(Code::Member(Box::new(Code::RuntimeMember("model".into())), "Nope".into()), Ok(Value::None))]
    #[case(
        Code::Member(constant(1), "x".into()),
        Err(Unwind::Fault(RuntimeError::InvalidMemberAccess { member: "x".into(), type_name: "number".into() }))
    )]
    #[case(
        Code::RuntimeMember("user".into()),
        Err(Unwind::Fault(RuntimeError::MissingRuntimeMember("user".into())))
    )]
    #[case(Code::Index(constant(vec![1, 2]), constant(1)), Ok(Value::from(2)))]
    #[case(
        Code::Index(constant(vec![1, 2]), constant(5)),
        Err(Unwind::Fault(RuntimeError::IndexOutOfBounds(Number::from(5))))
    )]
    #[case(Code::Return(constant(7)), Err(Unwind::Return(Value::from(7))))]
    fn test_eval(#[case] code: Code, #[case] expected: Result<Value, Unwind>) {
        assert_eq!(eval(code), expected);
    }

    #[test]
    fn test_loop_and_emit() {
        let runtime = Runtime::new();
        let mut frame = Frame::new(&runtime, 1, 10);
        let code = Code::Loop {
            slot: 0,
            iterable: constant(vec!["a", "b"]),
            body: Box::new(Code::Block(vec![Code::Text("<".into()), Code::Emit(Box::new(Code::Local(0)))])),
        };

        compile(&code)(&mut frame).unwrap();
        assert_eq!(frame.output(), "<a<b");
    }

    #[test]
    fn test_iteration_limit() {
        let runtime = Runtime::new();
        let mut frame = Frame::new(&runtime, 1, 2);
        let code = Code::Loop {
            slot: 0,
            iterable: constant(vec![1, 2, 3]),
            body: Box::new(Code::NONE),
        };

        assert_eq!(
            compile(&code)(&mut frame),
            Err(Unwind::Fault(RuntimeError::IterationLimit(2)))
        );
    }

    #[rstest]
    #[case(Outcome::Value(Value::from("hi")), "hi")]
    #[case(Outcome::Value(Value::from(2)), "2")]
    #[case(Outcome::Fault("Divided by 0".into()), "Divided by 0")]
    fn test_outcome_text(#[case] outcome: Outcome, #[case] expected: &str) {
        assert_eq!(outcome.into_text(), expected);
    }
}
