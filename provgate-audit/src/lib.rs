//! Static auditor for provisioning scripts.
//!
//! Parses a script into a syntax tree and reports what it would do: which SDK
//! names it imports, which app class it defines, which inputs it reads, which
//! privileged SDK calls it makes (with statically resolved arguments), and
//! which raw process primitives it reaches for. Nothing is executed.

mod analyzer;
mod facts;
mod value;

pub use analyzer::{
    analyze, analyze_file, APP_BASE_CLASS, INPUTS_ATTRIBUTE, INSTALL_METHOD, REGISTER_FUNCTION,
    SDK_MODULE,
};
pub use facts::{FactSheet, InputKey, PrivilegedCall, UnsafePattern};
pub use value::{resolve, Literal, DYNAMIC_MARKER};
