//! Three-address code. Control flow is flattened into labels and jumps and
//! every operation has at most two operands and an explicitly named result.

use itertools::Itertools;

use crate::{
    frontend::ast::{BinaryOperator, UnaryOperator},
    index::{Index, simple_index},
    middle::types::{Constant, Type},
};

pub mod lowering;
pub mod pretty_print;

simple_index! {
    /// A compiler introduced value, assigned once per generation pass
    pub struct Temporary;
}

simple_index! {
    /// A jump target
    pub struct Label;
}

impl core::fmt::Display for Temporary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.0)
    }
}

impl core::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Hands out temporaries and labels for one compilation, both numbered from 1
#[derive(Debug, Clone)]
pub struct NameGenerator {
    next_temporary: Temporary,
    next_label: Label,
}

impl Default for NameGenerator {
    fn default() -> Self {
        Self {
            next_temporary: Temporary::new(1),
            next_label: Label::new(1),
        }
    }
}

impl NameGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn temporary(&mut self) -> Temporary {
        let temporary = self.next_temporary;
        self.next_temporary = temporary.next();
        temporary
    }

    pub fn label(&mut self) -> Label {
        let label = self.next_label;
        self.next_label = label.next();
        label
    }
}

/// A user variable, optionally carrying an SSA version
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Variable {
    pub name: String,
    pub version: Option<u32>,
}

impl Variable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }
}

impl core::fmt::Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.version {
            Some(version) => write!(f, "{}#{version}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Variable(Variable),
    Temporary(Temporary),
    Constant(Constant),
    List(Vec<Operand>),
}

impl Operand {
    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable(Variable::new(name))
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match self {
            Operand::Constant(constant) => Some(constant),
            _ => None,
        }
    }
}

impl From<Destination> for Operand {
    fn from(destination: Destination) -> Self {
        match destination {
            Destination::Variable(variable) => Operand::Variable(variable),
            Destination::Temporary(temporary) => Operand::Temporary(temporary),
        }
    }
}

impl core::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Variable(variable) => write!(f, "{variable}"),
            Operand::Temporary(temporary) => write!(f, "{temporary}"),
            Operand::Constant(constant) => write!(f, "{constant}"),
            Operand::List(elements) => write!(f, "[{}]", elements.iter().join(", ")),
        }
    }
}

/// Where the result of an instruction is written
#[derive(Debug, Clone, PartialEq)]
pub enum Destination {
    Variable(Variable),
    Temporary(Temporary),
}

impl Destination {
    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable(Variable::new(name))
    }
}

impl core::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Variable(variable) => write!(f, "{variable}"),
            Destination::Temporary(temporary) => write!(f, "{temporary}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Declaration marker used only to lay out storage
    Declare { ty: Type, name: String },
    Copy {
        destination: Destination,
        source: Operand,
    },
    Unary {
        operator: UnaryOperator,
        destination: Destination,
        operand: Operand,
    },
    Binary {
        operator: BinaryOperator,
        destination: Destination,
        lhs: Operand,
        rhs: Operand,
    },
    /// Jumps to `target` when `condition` is false
    IfFalse { condition: Operand, target: Label },
    Goto(Label),
    Label(Label),
    Print(Operand),
}

impl Instruction {
    /// The label this instruction may transfer control to
    pub fn jump_target(&self) -> Option<Label> {
        match self {
            Instruction::IfFalse { target, .. } | Instruction::Goto(target) => Some(*target),
            _ => None,
        }
    }

    /// Every operand read by this instruction
    pub fn operands_mut(&mut self) -> Vec<&mut Operand> {
        match self {
            Instruction::Copy { source, .. } => vec![source],
            Instruction::Unary { operand, .. } => vec![operand],
            Instruction::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            Instruction::IfFalse { condition, .. } => vec![condition],
            Instruction::Print(operand) => vec![operand],
            Instruction::Declare { .. } | Instruction::Goto(_) | Instruction::Label(_) => {
                Vec::new()
            }
        }
    }

    pub fn destination_mut(&mut self) -> Option<&mut Destination> {
        match self {
            Instruction::Copy { destination, .. }
            | Instruction::Unary { destination, .. }
            | Instruction::Binary { destination, .. } => Some(destination),
            _ => None,
        }
    }
}

impl core::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::Declare { ty, name } => write!(f, "DECL {ty} {name}"),
            Instruction::Copy {
                destination,
                source,
            } => write!(f, "{destination} = {source}"),
            Instruction::Unary {
                operator,
                destination,
                operand,
            } => write!(f, "{destination} = {operator}{operand}"),
            Instruction::Binary {
                operator,
                destination,
                lhs,
                rhs,
            } => write!(f, "{destination} = {lhs} {operator} {rhs}"),
            Instruction::IfFalse { condition, target } => {
                write!(f, "ifFalse {condition} goto {target}")
            }
            Instruction::Goto(target) => write!(f, "goto {target}"),
            Instruction::Label(label) => write!(f, "{label}:"),
            Instruction::Print(operand) => write!(f, "PRINT {operand}"),
        }
    }
}

/// An ordered instruction stream
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub instructions: Vec<Instruction>,
}

impl Program {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// One instruction per line
impl core::fmt::Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for instruction in &self.instructions {
            writeln!(f, "{instruction}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_numbered_from_one() {
        let mut names = NameGenerator::new();

        assert_eq!(names.temporary().to_string(), "t1");
        assert_eq!(names.temporary().to_string(), "t2");
        assert_eq!(names.label().to_string(), "L1");
    }

    #[test]
    fn renders_the_instruction_grammar() {
        let mut names = NameGenerator::new();
        let t1 = names.temporary();
        let l1 = names.label();

        let program = Program::new(vec![
            Instruction::Declare {
                ty: Type::Int,
                name: "x".into(),
            },
            Instruction::Binary {
                operator: BinaryOperator::Add,
                destination: Destination::Temporary(t1),
                lhs: Operand::Constant(Constant::Int(2)),
                rhs: Operand::variable("x"),
            },
            Instruction::Unary {
                operator: UnaryOperator::LogicalNot,
                destination: Destination::Variable(Variable {
                    name: "b".into(),
                    version: Some(2),
                }),
                operand: Operand::Constant(Constant::Bool(true)),
            },
            Instruction::IfFalse {
                condition: Operand::Temporary(t1),
                target: l1,
            },
            Instruction::Copy {
                destination: Destination::variable("l"),
                source: Operand::List(vec![
                    Operand::Constant(Constant::Int(1)),
                    Operand::Constant(Constant::Str("a".into())),
                ]),
            },
            Instruction::Goto(l1),
            Instruction::Label(l1),
            Instruction::Print(Operand::variable("x")),
        ]);

        assert_eq!(
            program.to_string(),
            indoc::indoc! {r#"
                DECL INT x
                t1 = 2 + x
                b#2 = !true
                ifFalse t1 goto L1
                l = [1, "a"]
                goto L1
                L1:
                PRINT x
            "#}
        );
    }
}
