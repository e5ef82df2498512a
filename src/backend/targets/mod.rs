use crate::{
    backend::{Assembly, CodegenOptions},
    middle::ir,
};

mod i686;

pub trait CodeGenerator {
    fn translate_to_asm(&self, program: &ir::Program, options: &CodegenOptions) -> Assembly;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, strum::Display)]
pub enum Target {
    /// 32-bit Windows, C symbols carry a leading underscore
    #[default]
    #[value(name = "i686-windows")]
    #[strum(serialize = "i686-windows")]
    I686Windows,
    /// 32-bit Linux (ELF)
    #[value(name = "i686-linux")]
    #[strum(serialize = "i686-linux")]
    I686Linux,
}

impl Target {
    pub fn get_code_generator(self) -> impl CodeGenerator {
        match self {
            Target::I686Windows => i686::CodeGeneratorI686 {
                entry_symbol: "_main",
                print_symbol: "_printf",
            },
            Target::I686Linux => i686::CodeGeneratorI686 {
                entry_symbol: "main",
                print_symbol: "printf",
            },
        }
    }
}
