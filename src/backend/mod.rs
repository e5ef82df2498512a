//! The backend lowers optimized three-address code into 32-bit NASM assembly.
//! Every variable and temporary lives in a fixed 4-byte cell in `.bss`, so
//! there is no register allocation. Values pass through `eax` (and `ebx` for
//! a second operand) one instruction at a time.

pub mod assemblers;
pub mod layout;
pub mod targets;

use self::targets::Target;

/// Options controlling assembly generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodegenOptions {
    pub target: Target,
    /// Emit each IR instruction as a comment above its lowering
    pub emit_comments: bool,
}

/// A complete assembly file split into its sections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembly {
    pub entry_symbol: &'static str,
    pub print_symbol: &'static str,
    /// Lines of the `.data` section (string constants and print formats)
    pub data: Vec<String>,
    /// Lines of the `.bss` section, one cell per variable or temporary
    pub storage: Vec<String>,
    /// Body of the entry point, including prologue and epilogue
    pub text: Vec<String>,
}

impl Assembly {
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.data.len() + self.storage.len() + self.text.len() + 6);

        lines.push("section .data".to_owned());
        lines.extend(self.data.iter().cloned());
        lines.push("section .bss".to_owned());
        lines.extend(self.storage.iter().cloned());
        lines.push(format!("extern {}", self.print_symbol));
        lines.push("section .text".to_owned());
        lines.push(format!("global {}", self.entry_symbol));
        lines.push(format!("{}:", self.entry_symbol));
        lines.extend(self.text.iter().cloned());

        lines
    }
}

impl core::fmt::Display for Assembly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for line in self.lines() {
            writeln!(f, "{line}")?;
        }

        Ok(())
    }
}
