use smol_str::SmolStr;
use thiserror::Error;

use crate::number::Number;

type FunctionName = SmolStr;

/// A fault raised while running a compiled function.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("{message}")]
    UserDefined { message: String },
    #[error(r#"Invalid types for "{}", got {}"#, name, args.join(", "))]
    InvalidTypes { name: FunctionName, args: Vec<SmolStr> },
    #[error("Divided by 0")]
    ZeroDivision,
    #[error("Index out of bounds {0}")]
    IndexOutOfBounds(Number),
    #[error("Cannot access member \"{member}\" of {type_name}")]
    InvalidMemberAccess { member: SmolStr, type_name: SmolStr },
    #[error("Cannot iterate over {0}")]
    NotIterable(SmolStr),
    #[error("Runtime member \"@{0}\" is not set")]
    MissingRuntimeMember(SmolStr),
    #[error("Maximum iteration count {0} exceeded")]
    IterationLimit(usize),
}
