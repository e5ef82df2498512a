use crate::{
    backend::layout::{StorageLayout, destination_cell, temporary_cell, variable_cell},
    middle::{
        ir::{Destination, Operand},
        types::Constant,
    },
};

/// Builds the body of the entry point line by line
pub struct Assembler<'a> {
    output: Vec<String>,
    layout: &'a StorageLayout,
}

/// Where an operand's value comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Immediate(i32),
    /// Address of a data section label
    Address(String),
    /// Contents of a storage cell
    Memory(String),
}

impl core::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Immediate(value) => write!(f, "{value}"),
            Value::Address(label) => f.write_str(label),
            Value::Memory(cell) => write!(f, "[{cell}]"),
        }
    }
}

impl<'a> Assembler<'a> {
    pub fn new(layout: &'a StorageLayout) -> Self {
        Self {
            output: Vec::new(),
            layout,
        }
    }

    pub fn into_output(self) -> Vec<String> {
        self.output
    }

    pub fn emit(&mut self, string: impl AsRef<str>) {
        self.output.push(format!("    {}", string.as_ref()));
    }

    pub fn label(&mut self, name: impl AsRef<str>) {
        self.output.push(format!("{}:", name.as_ref()));
    }

    pub fn comment(&mut self, comment: impl AsRef<str>) {
        self.emit(format!("; {}", comment.as_ref()));
    }

    /// `ebx` is callee saved and used as a scratch register
    pub fn function_prologue(&mut self) {
        self.emit(format!("push {}", X86Register::Ebp));
        self.emit(format!("mov {}, {}", X86Register::Ebp, X86Register::Esp));
        self.emit(format!("push {}", X86Register::Ebx));
    }

    /// Returns 0 to the caller
    pub fn function_epilogue(&mut self) {
        self.emit(format!("mov {}, 0", X86Register::Eax));
        self.emit(format!("pop {}", X86Register::Ebx));
        self.emit(format!("pop {}", X86Register::Ebp));
        self.emit("ret");
    }

    /// Storage is integer only. Floats are truncated and lists are
    /// represented by their length.
    pub fn value_of(&self, operand: &Operand) -> Value {
        match operand {
            Operand::Variable(variable) => Value::Memory(variable_cell(variable)),
            Operand::Temporary(temporary) => Value::Memory(temporary_cell(*temporary)),
            Operand::Constant(Constant::Int(value)) => Value::Immediate(*value as i32),
            Operand::Constant(Constant::Float(value)) => Value::Immediate(value.trunc() as i32),
            Operand::Constant(Constant::Bool(value)) => Value::Immediate(*value as i32),
            Operand::Constant(Constant::Str(value)) => match self.layout.string_label(value) {
                Some(label) => Value::Address(label.to_owned()),
                None => Value::Immediate(0),
            },
            Operand::List(elements) => Value::Immediate(elements.len() as i32),
        }
    }

    pub fn load_operand(&mut self, destination: X86FullRegister, source: &Operand) -> X86Register {
        let register = destination.as_32_bit();
        let value = self.value_of(source);

        self.emit(format!("mov {register}, {value}"));

        register
    }

    pub fn store_register(&mut self, destination: &Destination, source: X86FullRegister) {
        self.emit(format!(
            "mov dword [{}], {}",
            destination_cell(destination),
            source.as_32_bit()
        ));
    }

    /// Immediates and addresses are stored directly, memory goes through `eax`
    pub fn store_operand(&mut self, destination: &Destination, source: &Operand) {
        match self.value_of(source) {
            Value::Memory(_) => {
                self.load_operand(X86FullRegister::Eax, source);
                self.store_register(destination, X86FullRegister::Eax);
            }
            value => self.emit(format!("mov dword [{}], {value}", destination_cell(destination))),
        }
    }

    pub fn push_operand(&mut self, operand: &Operand) {
        match self.value_of(operand) {
            value @ Value::Address(_) => self.emit(format!("push {value}")),
            value => self.emit(format!("push dword {value}")),
        }
    }

    /// Leaves 1 in the register if it was non-zero and 0 otherwise
    pub fn normalize_truth(&mut self, register: X86FullRegister) {
        self.emit(format!("cmp {}, 0", register.as_32_bit()));
        self.emit(format!("mov {}, 0", register.as_32_bit()));
        self.emit(format!("setne {}", register.as_8_bit()));
    }
}

/// Scratch register used to hold operand values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum X86FullRegister {
    Eax,
    Ebx,
}

impl X86FullRegister {
    pub fn as_32_bit(self) -> X86Register {
        match self {
            Self::Eax => X86Register::Eax,
            Self::Ebx => X86Register::Ebx,
        }
    }

    pub fn as_8_bit(self) -> X86Register {
        match self {
            Self::Eax => X86Register::Al,
            Self::Ebx => X86Register::Bl,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
#[rustfmt::skip]
pub enum X86Register {
    // 32-bit
    Eax, Ebx, Ebp, Esp,

    // 8-bit low
    Al, Bl,
}
