pub mod value;
pub mod table;
pub mod callback;
pub mod stack;
pub mod arith;
pub mod processor;
