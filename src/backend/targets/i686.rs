use tracing::debug;

use crate::{
    backend::{
        Assembly, CodegenOptions,
        assemblers::x86::{Assembler, X86FullRegister},
        layout::{FORMAT_INT, FORMAT_STR, StorageLayout},
        targets::CodeGenerator,
    },
    frontend::ast::{BinaryOperator, BinaryOperatorClass, UnaryOperator},
    middle::{
        ir::{self, Destination, Instruction, Operand},
        types::Constant,
    },
};

/// 32-bit x86 code generator calling the C `printf` for output
pub struct CodeGeneratorI686 {
    pub entry_symbol: &'static str,
    pub print_symbol: &'static str,
}

impl CodeGenerator for CodeGeneratorI686 {
    fn translate_to_asm(&self, program: &ir::Program, options: &CodegenOptions) -> Assembly {
        let layout = StorageLayout::collect(program);
        let mut assembler = Assembler::new(&layout);

        assembler.function_prologue();

        for instruction in &program.instructions {
            if options.emit_comments && !matches!(instruction, Instruction::Label(_)) {
                assembler.comment(instruction.to_string());
            }

            self.codegen_instruction(&mut assembler, &layout, instruction);
        }

        assembler.function_epilogue();

        let text = assembler.into_output();

        debug!(
            target = %options.target,
            lines = text.len(),
            "generated assembly"
        );

        Assembly {
            entry_symbol: self.entry_symbol,
            print_symbol: self.print_symbol,
            data: layout.data_lines(),
            storage: layout.storage_lines(),
            text,
        }
    }
}

impl CodeGeneratorI686 {
    fn codegen_instruction(
        &self,
        assembler: &mut Assembler,
        layout: &StorageLayout,
        instruction: &Instruction,
    ) {
        match instruction {
            // Only used for the storage layout
            Instruction::Declare { .. } => {}
            Instruction::Label(label) => assembler.label(label.to_string()),
            Instruction::Goto(target) => assembler.emit(format!("jmp {target}")),
            Instruction::IfFalse { condition, target } => {
                let register = assembler.load_operand(X86FullRegister::Eax, condition);
                assembler.emit(format!("cmp {register}, 0"));
                assembler.emit(format!("je {target}"));
            }
            Instruction::Print(operand) => self.codegen_print(assembler, layout, operand),
            Instruction::Copy {
                destination,
                source,
            } => assembler.store_operand(destination, source),
            Instruction::Unary {
                operator: UnaryOperator::LogicalNot,
                destination,
                operand,
            } => {
                let register = assembler.load_operand(X86FullRegister::Eax, operand);
                assembler.emit(format!("cmp {register}, 0"));
                assembler.emit(format!("mov {register}, 0"));
                assembler.emit(format!("sete {}", X86FullRegister::Eax.as_8_bit()));
                assembler.store_register(destination, X86FullRegister::Eax);
            }
            Instruction::Binary {
                operator,
                destination,
                lhs,
                rhs,
            } => codegen_binary(assembler, *operator, destination, lhs, rhs),
        }
    }

    /// Pushes the value and then a `%s` format for strings or a `%d` format
    /// for everything else. A literal is never passed as the format itself so
    /// a `%` inside it prints as is.
    fn codegen_print(&self, assembler: &mut Assembler, layout: &StorageLayout, operand: &Operand) {
        let format = if layout.holds_string(operand) {
            FORMAT_STR
        } else {
            FORMAT_INT
        };

        assembler.push_operand(operand);
        assembler.emit(format!("push {format}"));
        assembler.emit(format!("call {}", self.print_symbol));
        assembler.emit("add esp, 8");
    }
}

fn is_scalar(operand: &Operand) -> bool {
    !matches!(operand, Operand::Constant(Constant::Str(_)) | Operand::List(_))
}

fn codegen_binary(
    assembler: &mut Assembler,
    operator: BinaryOperator,
    destination: &Destination,
    lhs: &Operand,
    rhs: &Operand,
) {
    // Strings and lists have no arithmetic, keep the right operand
    if !is_scalar(lhs) || !is_scalar(rhs) {
        assembler.store_operand(destination, rhs);
        return;
    }

    let accumulator = assembler.load_operand(X86FullRegister::Eax, lhs);
    let rhs_value = assembler.value_of(rhs);

    match operator.class() {
        BinaryOperatorClass::Arithmetic => match operator {
            BinaryOperator::Add => assembler.emit(format!("add {accumulator}, {rhs_value}")),
            BinaryOperator::Subtract => assembler.emit(format!("sub {accumulator}, {rhs_value}")),
            BinaryOperator::Multiply => assembler.emit(format!("imul {accumulator}, {rhs_value}")),
            _ => {
                assembler.emit("cdq");
                let divisor = assembler.load_operand(X86FullRegister::Ebx, rhs);
                assembler.emit(format!("idiv {divisor}"));
            }
        },
        BinaryOperatorClass::Logical => {
            assembler.normalize_truth(X86FullRegister::Eax);
            let other = assembler.load_operand(X86FullRegister::Ebx, rhs);
            assembler.normalize_truth(X86FullRegister::Ebx);

            let instruction = if operator == BinaryOperator::LogicalAnd {
                "and"
            } else {
                "or"
            };
            assembler.emit(format!("{instruction} {accumulator}, {other}"));
        }
        BinaryOperatorClass::Equality | BinaryOperatorClass::Relational => {
            assembler.emit(format!("cmp {accumulator}, {rhs_value}"));
            assembler.emit(format!("mov {accumulator}, 0"));
            assembler.emit(format!(
                "{} {}",
                set_instruction(operator),
                X86FullRegister::Eax.as_8_bit()
            ));
        }
    }

    assembler.store_register(destination, X86FullRegister::Eax);
}

fn set_instruction(operator: BinaryOperator) -> &'static str {
    match operator {
        BinaryOperator::Equals => "sete",
        BinaryOperator::NotEquals => "setne",
        BinaryOperator::GreaterThan => "setg",
        BinaryOperator::LessThan => "setl",
        BinaryOperator::GreaterThanOrEqualTo => "setge",
        BinaryOperator::LessThanOrEqualTo => "setle",
        _ => unreachable!("{operator} is not a comparison"),
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::{
        backend::targets::Target,
        frontend::{SourceFile, parser::Parser},
        middle::{
            ir::{NameGenerator, lowering::IrGenerator},
            optimization::peephole::optimize,
        },
    };

    fn compile(source: &str, options: CodegenOptions) -> Assembly {
        let source = SourceFile::in_memory(source);
        let program = Parser::parse_program(&source).unwrap();
        let ir = IrGenerator::lower_program(&program, &mut NameGenerator::new());

        options
            .target
            .get_code_generator()
            .translate_to_asm(&optimize(&ir), &options)
    }

    fn body(source: &str) -> Vec<String> {
        let assembly = compile(source, CodegenOptions::default());
        let text = assembly.text;

        // Strip the prologue and epilogue
        text[3..text.len() - 4].to_vec()
    }

    #[test]
    fn emits_whole_file() {
        let assembly = compile("int x; x = 2 + 3; print(x);", CodegenOptions::default());

        assert_eq!(
            assembly.to_string(),
            indoc! {r#"
                section .data
                fmt_int db "%d", 10, 0
                section .bss
                v_x resd 1
                tmp_1 resd 1
                extern _printf
                section .text
                global _main
                _main:
                    push ebp
                    mov ebp, esp
                    push ebx
                    mov dword [tmp_1], 5
                    mov eax, [tmp_1]
                    mov dword [v_x], eax
                    push dword [v_x]
                    push fmt_int
                    call _printf
                    add esp, 8
                    mov eax, 0
                    pop ebx
                    pop ebp
                    ret
            "#}
        );
    }

    #[test]
    fn linux_target_uses_plain_symbols() {
        let assembly = compile(
            "print(\"hi\");",
            CodegenOptions {
                target: Target::I686Linux,
                ..Default::default()
            },
        );

        assert!(assembly.lines().contains(&"extern printf".to_owned()));
        assert!(assembly.lines().contains(&"main:".to_owned()));
        assert_eq!(
            assembly.data,
            vec![r#"str_1 db "hi", 0"#, r#"fmt_str db "%s", 10, 0"#]
        );
        assert_eq!(
            assembly.text[3..assembly.text.len() - 4],
            [
                "    push str_1",
                "    push fmt_str",
                "    call printf",
                "    add esp, 8",
            ]
        );
    }

    #[test]
    fn percent_signs_in_literals_are_not_formats() {
        let assembly = compile("print(\"100%d\");", CodegenOptions::default());

        assert_eq!(
            assembly.data,
            vec![r#"str_1 db "100%d", 0"#, r#"fmt_str db "%s", 10, 0"#]
        );
        assert_eq!(assembly.text[3..5], ["    push str_1", "    push fmt_str"]);
    }

    #[test]
    fn lowers_control_flow() {
        assert_eq!(
            body("int n = 3; while (n > 0) n -= 1;"),
            [
                "    mov dword [v_n], 3",
                "L1:",
                "    mov eax, [v_n]",
                "    cmp eax, 0",
                "    mov eax, 0",
                "    setg al",
                "    mov dword [tmp_1], eax",
                "    mov eax, [tmp_1]",
                "    cmp eax, 0",
                "    je L2",
                "    mov eax, [v_n]",
                "    sub eax, 1",
                "    mov dword [v_n], eax",
                "    jmp L1",
                "L2:",
            ]
        );
    }

    #[test]
    fn lowers_division_and_logic() {
        assert_eq!(
            body("int a; int q; bool b; bool c; q = a / 2; c = b && true; c = !b;"),
            [
                "    mov eax, [v_a]",
                "    cdq",
                "    mov ebx, 2",
                "    idiv ebx",
                "    mov dword [tmp_1], eax",
                "    mov eax, [tmp_1]",
                "    mov dword [v_q], eax",
                "    mov eax, [v_b]",
                "    cmp eax, 0",
                "    mov eax, 0",
                "    setne al",
                "    mov ebx, 1",
                "    cmp ebx, 0",
                "    mov ebx, 0",
                "    setne bl",
                "    and eax, ebx",
                "    mov dword [tmp_2], eax",
                "    mov eax, [tmp_2]",
                "    mov dword [v_c], eax",
                "    mov eax, [v_b]",
                "    cmp eax, 0",
                "    mov eax, 0",
                "    sete al",
                "    mov dword [tmp_3], eax",
                "    mov eax, [tmp_3]",
                "    mov dword [v_c], eax",
            ]
        );
    }

    #[test]
    fn prints_strings_with_string_format() {
        let assembly = compile(
            "string s = \"hey\"; print(s); print(true);",
            CodegenOptions::default(),
        );

        assert_eq!(
            assembly.data,
            vec![
                r#"str_1 db "hey", 0"#,
                r#"fmt_int db "%d", 10, 0"#,
                r#"fmt_str db "%s", 10, 0"#,
            ]
        );
        assert_eq!(
            assembly.text[3..assembly.text.len() - 4],
            [
                "    mov dword [v_s], str_1",
                "    push dword [v_s]",
                "    push fmt_str",
                "    call _printf",
                "    add esp, 8",
                "    push dword 1",
                "    push fmt_int",
                "    call _printf",
                "    add esp, 8",
            ]
        );
    }

    #[test]
    fn string_operands_fall_back_to_storing_rhs() {
        assert_eq!(
            body("string s; s = s + \"x\";"),
            [
                "    mov dword [tmp_1], str_1",
                "    mov eax, [tmp_1]",
                "    mov dword [v_s], eax",
            ]
        );
    }

    #[test]
    fn string_valued_ternary_prints_with_string_format() {
        assert_eq!(
            body("bool c = true; print(c ? \"a\" : \"b\");"),
            [
                "    mov dword [v_c], 1",
                "    mov eax, [v_c]",
                "    cmp eax, 0",
                "    je L1",
                "    mov dword [tmp_1], str_1",
                "    jmp L2",
                "L1:",
                "    mov dword [tmp_1], str_2",
                "L2:",
                "    push dword [tmp_1]",
                "    push fmt_str",
                "    call _printf",
                "    add esp, 8",
            ]
        );
    }

    #[test]
    fn shadowed_names_print_with_their_own_format() {
        let assembly = compile(
            "int x = 5; print(x); { string x = \"hi\"; print(x); }",
            CodegenOptions::default(),
        );

        assert_eq!(assembly.storage, vec!["v_x resd 1", "v_x.1 resd 1"]);
        assert_eq!(
            assembly.text[3..assembly.text.len() - 4],
            [
                "    mov dword [v_x], 5",
                "    push dword [v_x]",
                "    push fmt_int",
                "    call _printf",
                "    add esp, 8",
                "    mov dword [v_x.1], str_1",
                "    push dword [v_x.1]",
                "    push fmt_str",
                "    call _printf",
                "    add esp, 8",
            ]
        );
    }

    #[test]
    fn comments_show_the_lowered_instruction() {
        let assembly = compile(
            "x = 1;",
            CodegenOptions {
                emit_comments: true,
                ..Default::default()
            },
        );

        assert_eq!(
            assembly.text[3..5],
            ["    ; x = 1", "    mov dword [v_x], 1"]
        );
    }
}
