//! Editable JVM bytecode.
//!
//! A method's `code` array is decoded into an [`InsnList`] of typed
//! instructions. Passes edit the list by id; [`MethodBody::to_code`] lays it
//! out again and encodes the narrowest form of every instruction.

mod body;
mod decode;
mod encode;
mod list;
pub mod opcodes;
mod stack;
mod types;

pub use body::{CodeAttr, Handler, LineNumber, LocalVariable, MethodBody};
pub use decode::decode;
pub use encode::{encode, insn_size, MAX_CODE_LEN};
pub use list::{InsnList, Node};
pub use stack::{max_stack, stack_effect};
pub use types::{
    ArithOp, BitOp, Category, CmpKind, Cond, Insn, InsnId, Narrow, Push, Value,
};
