//! Names are resolved and types checked here before the program tree is
//! flattened into three-address code, renamed into SSA form for inspection and
//! optimized.

pub mod ir;
pub mod optimization;
pub mod scope;
pub mod semantic;
pub mod ssa;
pub mod types;
