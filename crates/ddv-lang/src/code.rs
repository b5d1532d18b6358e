//! Compilation of script trees into reusable closures.
//!
//! A [`CodeContext`] lowers fragments into [`Code`], nesting loop and
//! conditional bodies as separately cached [`CompiledBlock`]s, and finally
//! compiles everything into a [`CompiledFunction`] bound to one runtime contract.

pub mod builtin;
pub mod compiled;
pub mod context;
pub mod ir;
pub mod lower;
pub mod scope;

pub use builtin::{BUILTINS, Builtin};
pub use compiled::{CompiledBlock, CompiledExpr, CompiledFunction, Frame, Outcome, Unwind};
pub use context::{CodeContext, CompileEnv, Completion, ContextKind};
pub use ir::Code;
pub use scope::{ScopeStack, Slot};
