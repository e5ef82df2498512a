use hashbrown::HashMap;
use tracing::debug;

use crate::{
    frontend::ast::BinaryOperatorClass,
    index::Index,
    middle::{
        ir::{self, Destination, Instruction, Operand, Temporary, Variable},
        types::{Constant, Type},
    },
};

/// Width in bytes of every storage cell
pub const CELL_SIZE: usize = 4;

pub const FORMAT_INT: &str = "fmt_int";
pub const FORMAT_STR: &str = "fmt_str";

/// A fixed memory cell holding one variable or temporary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageCell {
    pub name: String,
    pub ty: Type,
}

/// A read-only string in the data section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringConstant {
    pub label: String,
    pub value: String,
}

/// Memory layout of a whole program: storage cells for every variable and
/// temporary, labels for every distinct string literal, and which print
/// formats are needed. All lists are in first-seen order.
#[derive(Debug, Default)]
pub struct StorageLayout {
    cells: Vec<StorageCell>,
    cell_indices: HashMap<String, usize>,
    strings: Vec<StringConstant>,
    string_labels: HashMap<String, usize>,
    uses_format_int: bool,
    uses_format_str: bool,
}

pub fn variable_cell(variable: &Variable) -> String {
    match variable.version {
        Some(version) => format!("v_{}_{version}", variable.name),
        None => format!("v_{}", variable.name),
    }
}

pub fn temporary_cell(temporary: Temporary) -> String {
    format!("tmp_{}", temporary.index())
}

pub fn destination_cell(destination: &Destination) -> String {
    match destination {
        Destination::Variable(variable) => variable_cell(variable),
        Destination::Temporary(temporary) => temporary_cell(*temporary),
    }
}

impl StorageLayout {
    pub fn collect(program: &ir::Program) -> Self {
        let mut layout = Self::default();

        for instruction in &program.instructions {
            match instruction {
                Instruction::Declare { ty, name } => {
                    layout.add_cell(variable_cell(&Variable::new(name.as_str())), Some(*ty));
                }
                Instruction::Copy {
                    destination,
                    source,
                } => {
                    layout.add_cell(destination_cell(destination), None);
                    layout.add_operand(source);
                }
                Instruction::Unary {
                    destination,
                    operand,
                    ..
                } => {
                    layout.add_cell(destination_cell(destination), None);
                    layout.add_operand(operand);
                }
                Instruction::Binary {
                    destination,
                    lhs,
                    rhs,
                    ..
                } => {
                    layout.add_cell(destination_cell(destination), None);
                    layout.add_operand(lhs);
                    layout.add_operand(rhs);
                }
                Instruction::IfFalse { condition, .. } => layout.add_operand(condition),
                Instruction::Print(operand) => layout.add_operand(operand),
                Instruction::Goto(_) | Instruction::Label(_) => {}
            }
        }

        layout.propagate_strings(program);

        // Cell types are only final once every declaration has been seen
        for instruction in &program.instructions {
            match instruction {
                Instruction::Print(operand) if layout.holds_string(operand) => {
                    layout.uses_format_str = true
                }
                Instruction::Print(_) => layout.uses_format_int = true,
                _ => {}
            }
        }

        debug!(
            cells = layout.cells.len(),
            strings = layout.strings.len(),
            "collected storage layout"
        );

        layout
    }

    /// Declared types override the INT default of cells seen before their
    /// declaration
    fn add_cell(&mut self, name: String, ty: Option<Type>) {
        if let Some(&index) = self.cell_indices.get(&name) {
            if let Some(ty) = ty {
                self.cells[index].ty = ty;
            }
        } else {
            self.cell_indices.insert(name.clone(), self.cells.len());
            self.cells.push(StorageCell {
                name,
                ty: ty.unwrap_or(Type::Int),
            });
        }
    }

    /// Marks every cell that receives a string address as a string cell.
    /// Repeats until nothing changes since loops can carry a string back to
    /// an earlier copy.
    fn propagate_strings(&mut self, program: &ir::Program) {
        let mut changed = true;

        while changed {
            changed = false;

            for instruction in &program.instructions {
                let receives_string = match instruction {
                    Instruction::Copy {
                        destination,
                        source,
                    } => self.holds_string(source).then_some(destination),
                    Instruction::Binary {
                        operator,
                        destination,
                        lhs,
                        rhs,
                    } if operator.class() == BinaryOperatorClass::Arithmetic => {
                        (self.holds_string(lhs) || self.holds_string(rhs)).then_some(destination)
                    }
                    _ => None,
                };

                if let Some(destination) = receives_string {
                    changed |= self.mark_string(&destination_cell(destination));
                }
            }
        }
    }

    /// Returns whether the cell type changed
    fn mark_string(&mut self, name: &str) -> bool {
        match self.cell_indices.get(name) {
            Some(&index) if self.cells[index].ty != Type::String => {
                self.cells[index].ty = Type::String;
                true
            }
            _ => false,
        }
    }

    fn add_operand(&mut self, operand: &Operand) {
        match operand {
            Operand::Variable(variable) => self.add_cell(variable_cell(variable), None),
            Operand::Temporary(temporary) => self.add_cell(temporary_cell(*temporary), None),
            Operand::Constant(Constant::Str(value)) => {
                if !self.string_labels.contains_key(value) {
                    self.string_labels.insert(value.clone(), self.strings.len());
                    self.strings.push(StringConstant {
                        label: format!("str_{}", self.strings.len() + 1),
                        value: value.clone(),
                    });
                }
            }
            Operand::Constant(_) => {}
            Operand::List(elements) => {
                for element in elements {
                    self.add_operand(element);
                }
            }
        }
    }

    /// Whether the operand is a string literal or names a cell holding a
    /// string address
    pub fn holds_string(&self, operand: &Operand) -> bool {
        let name = match operand {
            Operand::Constant(Constant::Str(_)) => return true,
            Operand::Variable(variable) => variable_cell(variable),
            Operand::Temporary(temporary) => temporary_cell(*temporary),
            _ => return false,
        };

        self.cell_indices
            .get(&name)
            .is_some_and(|index| self.cells[*index].ty == Type::String)
    }

    pub fn string_label(&self, value: &str) -> Option<&str> {
        self.string_labels
            .get(value)
            .map(|index| self.strings[*index].label.as_str())
    }

    pub fn data_lines(&self) -> Vec<String> {
        let mut lines = self
            .strings
            .iter()
            .map(|string| format!("{} db {}, 0", string.label, format_nasm_string(&string.value)))
            .collect::<Vec<_>>();

        if self.uses_format_int {
            lines.push(format!(r#"{FORMAT_INT} db "%d", 10, 0"#));
        }

        if self.uses_format_str {
            lines.push(format!(r#"{FORMAT_STR} db "%s", 10, 0"#));
        }

        lines
    }

    pub fn storage_lines(&self) -> Vec<String> {
        self.cells
            .iter()
            .map(|cell| format!("{} resd {}", cell.name, CELL_SIZE / 4))
            .collect()
    }
}

/// Quotes a string for a NASM `db` directive. Quotes and line breaks cannot
/// appear inside a NASM string so they are written as byte values.
fn format_nasm_string(string: &str) -> String {
    let string = string.replace("\\\"", "\"");

    let mut parts = Vec::new();

    let mut last = 0;
    for (index, matched) in string.match_indices(['"', '\n', '\r']) {
        if last != index {
            parts.push(format!("\"{}\"", &string[last..index]));
        }

        for b in matched.bytes() {
            parts.push(format!("0x{b:X}"));
        }

        last = index + matched.len();
    }
    if last < string.len() {
        parts.push(format!("\"{}\"", &string[last..]));
    }
    if parts.is_empty() {
        parts.push("\"\"".to_owned());
    }

    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frontend::{SourceFile, parser::Parser},
        middle::ir::{NameGenerator, lowering::IrGenerator},
    };

    fn layout(source: &str) -> StorageLayout {
        let source = SourceFile::in_memory(source);
        let program = Parser::parse_program(&source).unwrap();
        let ir = IrGenerator::lower_program(&program, &mut NameGenerator::new());

        StorageLayout::collect(&ir)
    }

    #[test]
    fn collects_cells_in_first_seen_order() {
        let layout = layout("int x = 1 + 2; bool b; b = x > 1;");

        assert_eq!(
            layout.storage_lines(),
            vec!["tmp_1 resd 1", "v_x resd 1", "v_b resd 1", "tmp_2 resd 1"]
        );
        assert!(layout.data_lines().is_empty());
    }

    #[test]
    fn deduplicates_strings_and_picks_formats() {
        let layout = layout(
            "string s = \"hi\"; print(\"hi\"); print(s); print(\"bye\"); int n = 2; print(n);",
        );

        assert_eq!(layout.string_label("hi"), Some("str_1"));
        assert_eq!(layout.string_label("bye"), Some("str_2"));
        assert_eq!(
            layout.data_lines(),
            vec![
                r#"str_1 db "hi", 0"#,
                r#"str_2 db "bye", 0"#,
                r#"fmt_int db "%d", 10, 0"#,
                r#"fmt_str db "%s", 10, 0"#,
            ]
        );
        assert!(layout.holds_string(&Operand::variable("s")));
        assert!(!layout.holds_string(&Operand::variable("n")));
    }

    #[test]
    fn declaration_after_first_use_sets_type() {
        let layout = layout("s = \"a\"; string s;");

        assert_eq!(
            layout.cells,
            vec![StorageCell {
                name: "v_s".into(),
                ty: Type::String,
            }]
        );
    }

    #[test]
    fn temporaries_holding_strings_are_string_cells() {
        let layout = layout("bool c = true; print(c ? \"a\" : \"b\"); int n = c ? 1 : 2;");

        assert!(layout.holds_string(&Operand::Temporary(Temporary::new(1))));
        assert!(!layout.holds_string(&Operand::Temporary(Temporary::new(2))));
        assert!(layout.holds_string(&Operand::Constant(Constant::Str("a".into()))));
        assert_eq!(
            layout.data_lines(),
            vec![
                r#"str_1 db "a", 0"#,
                r#"str_2 db "b", 0"#,
                r#"fmt_str db "%s", 10, 0"#,
            ]
        );
    }

    #[test]
    fn shadowed_names_keep_separate_types() {
        let layout = layout("int x = 5; print(x); { string x = \"hi\"; print(x); }");

        assert_eq!(
            layout.cells,
            vec![
                StorageCell {
                    name: "v_x".into(),
                    ty: Type::Int,
                },
                StorageCell {
                    name: "v_x.1".into(),
                    ty: Type::String,
                },
            ]
        );
        assert!(!layout.holds_string(&Operand::variable("x")));
        assert!(layout.holds_string(&Operand::variable("x.1")));
    }

    #[test]
    fn escapes_quotes_and_newlines() {
        assert_eq!(format_nasm_string(r#"say \"hi\""#), r#""say ", 0x22, "hi", 0x22"#);
        assert_eq!(format_nasm_string("a\nb"), r#""a", 0xA, "b""#);
        assert_eq!(format_nasm_string(""), r#""""#);
    }
}
