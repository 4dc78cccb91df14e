pub mod context;
pub mod expr;
pub mod func;
pub mod helpers;
pub mod stmt;
pub mod types;
