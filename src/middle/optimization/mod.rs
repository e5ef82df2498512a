//! Optimizations over three-address code. These only look at a small window
//! of neighbouring instructions and never build a control flow graph.

pub mod peephole;
