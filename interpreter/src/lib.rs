pub mod interpreter;
pub mod parser;
pub mod resolver;

pub(crate) mod ast;
mod callable;
pub(crate) mod env;
mod error;
mod limits;
mod native;
mod reference;
mod stack;
mod stdlib;
mod value;

pub use error::{Error, RunError};
pub use interpreter::Interpreter;
