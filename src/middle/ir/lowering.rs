use hashbrown::HashMap;
use tracing::debug;

use crate::{
    frontend::ast::{self, Expression, ForInitializer, Literal, Statement, StepDirection},
    middle::{
        ir::{Destination, Instruction, NameGenerator, Operand, Program},
        types::Constant,
    },
};

/// Flattens a program tree into three-address code
///
/// The tree is assumed to have passed semantic analysis. Nothing is
/// re-validated here. A declaration that shadows an earlier one of the same
/// name is renamed to `name.N` so every declaration gets its own storage.
#[derive(Debug)]
pub struct IrGenerator<'names> {
    names: &'names mut NameGenerator,
    instructions: Vec<Instruction>,
    /// Source name to IR name, innermost scope last. Never empty.
    scopes: Vec<HashMap<String, String>>,
    /// Number of declarations lowered so far for each source name
    declarations: HashMap<String, u32>,
}

impl<'names> IrGenerator<'names> {
    pub fn lower_program(program: &ast::Program, names: &'names mut NameGenerator) -> Program {
        let mut generator = Self {
            names,
            instructions: Vec::new(),
            scopes: vec![HashMap::new()],
            declarations: HashMap::new(),
        };

        for statement in &program.statements {
            generator.lower_statement(statement);
        }

        debug!(
            instructions = generator.instructions.len(),
            "generated three-address code"
        );

        Program::new(generator.instructions)
    }

    fn emit(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Binds a declared name in the innermost scope and returns its IR name
    fn bind(&mut self, name: &str) -> String {
        let count = self.declarations.entry(name.to_owned()).or_insert(0);
        let ir_name = match *count {
            0 => name.to_owned(),
            n => format!("{name}.{n}"),
        };
        *count += 1;

        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_owned(), ir_name.clone());
        }

        ir_name
    }

    /// The IR name of the visible declaration. Undeclared names are kept as is.
    fn resolve(&self, name: &str) -> String {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .cloned()
            .unwrap_or_else(|| name.to_owned())
    }

    fn lower_statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Declaration(declaration) => self.lower_declaration(declaration),
            Statement::Expression(expression) => self.lower_discarded(expression),
            Statement::If {
                condition,
                positive,
                negative,
            } => {
                let condition = self.lower_expression(condition);
                let else_label = self.names.label();

                self.emit(Instruction::IfFalse {
                    condition,
                    target: else_label,
                });
                self.lower_statement(positive);

                match negative {
                    Some(negative) => {
                        let end_label = self.names.label();

                        self.emit(Instruction::Goto(end_label));
                        self.emit(Instruction::Label(else_label));
                        self.lower_statement(negative);
                        self.emit(Instruction::Label(end_label));
                    }
                    None => self.emit(Instruction::Label(else_label)),
                }
            }
            Statement::While { condition, body } => {
                let top_label = self.names.label();
                let end_label = self.names.label();

                self.emit(Instruction::Label(top_label));
                let condition = self.lower_expression(condition);
                self.emit(Instruction::IfFalse {
                    condition,
                    target: end_label,
                });
                self.lower_statement(body);
                self.emit(Instruction::Goto(top_label));
                self.emit(Instruction::Label(end_label));
            }
            Statement::For {
                initializer,
                condition,
                update,
                body,
            } => {
                let opens_scope = matches!(initializer, Some(ForInitializer::Declaration(_)));

                if opens_scope {
                    self.push_scope();
                }

                match initializer {
                    Some(ForInitializer::Declaration(declaration)) => {
                        self.lower_declaration(declaration)
                    }
                    Some(ForInitializer::Expression(expression)) => self.lower_discarded(expression),
                    None => {}
                }

                let top_label = self.names.label();
                let end_label = self.names.label();

                self.emit(Instruction::Label(top_label));

                // A missing condition loops forever
                if let Some(condition) = condition {
                    let condition = self.lower_expression(condition);
                    self.emit(Instruction::IfFalse {
                        condition,
                        target: end_label,
                    });
                }

                self.lower_statement(body);

                if let Some(update) = update {
                    self.lower_discarded(update);
                }

                self.emit(Instruction::Goto(top_label));
                self.emit(Instruction::Label(end_label));

                if opens_scope {
                    self.pop_scope();
                }
            }
            Statement::Block(statements) => {
                self.push_scope();

                for statement in statements {
                    self.lower_statement(statement);
                }

                self.pop_scope();
            }
            Statement::Print(expression) => {
                let operand = self.lower_expression(expression);
                self.emit(Instruction::Print(operand));
            }
            Statement::Empty => {}
        }
    }

    /// Initializer instructions come first so the marker is immediately
    /// followed by the initializing copy. The name is bound before the
    /// initializer is lowered, matching semantic analysis.
    fn lower_declaration(&mut self, declaration: &ast::Declaration) {
        let name = self.bind(&declaration.name);
        let value = declaration
            .initializer
            .as_ref()
            .map(|initializer| self.lower_expression(initializer));

        self.emit(Instruction::Declare {
            ty: declaration.ty,
            name: name.clone(),
        });

        if let Some(source) = value {
            self.emit(Instruction::Copy {
                destination: Destination::variable(name),
                source,
            });
        }
    }

    /// Lowers an expression whose value is not used. A bare increment only
    /// emits its update.
    fn lower_discarded(&mut self, expression: &Expression) {
        match expression {
            Expression::Increment { name, direction } => self.emit_step(name, *direction),
            expression => {
                self.lower_expression(expression);
            }
        }
    }

    /// `name = name + 1` (or `- 1`)
    fn emit_step(&mut self, name: &str, direction: StepDirection) {
        let name = self.resolve(name);

        self.emit(Instruction::Binary {
            operator: direction.binary_operator(),
            destination: Destination::variable(&name),
            lhs: Operand::variable(name),
            rhs: Operand::Constant(Constant::Int(1)),
        });
    }

    /// Appends the instructions computing an expression and returns the
    /// operand holding its result
    fn lower_expression(&mut self, expression: &Expression) -> Operand {
        match expression {
            Expression::Literal(literal) => Operand::Constant(match literal {
                Literal::Int(value) => Constant::Int(*value),
                Literal::Float(value) => Constant::Float(*value),
                Literal::Bool(value) => Constant::Bool(*value),
                Literal::Str(value) => Constant::Str(value.clone()),
            }),
            Expression::Identifier(name) => Operand::variable(self.resolve(name)),
            Expression::Binary { operator, lhs, rhs } => {
                let lhs = self.lower_expression(lhs);
                let rhs = self.lower_expression(rhs);
                let temporary = self.names.temporary();

                self.emit(Instruction::Binary {
                    operator: *operator,
                    destination: Destination::Temporary(temporary),
                    lhs,
                    rhs,
                });

                Operand::Temporary(temporary)
            }
            Expression::Unary { operator, operand } => {
                let operand = self.lower_expression(operand);
                let temporary = self.names.temporary();

                self.emit(Instruction::Unary {
                    operator: *operator,
                    destination: Destination::Temporary(temporary),
                    operand,
                });

                Operand::Temporary(temporary)
            }
            Expression::Ternary {
                condition,
                positive,
                negative,
            } => {
                let condition = self.lower_expression(condition);
                let result = self.names.temporary();
                let else_label = self.names.label();
                let end_label = self.names.label();

                self.emit(Instruction::IfFalse {
                    condition,
                    target: else_label,
                });

                let positive = self.lower_expression(positive);
                self.emit(Instruction::Copy {
                    destination: Destination::Temporary(result),
                    source: positive,
                });
                self.emit(Instruction::Goto(end_label));

                self.emit(Instruction::Label(else_label));
                let negative = self.lower_expression(negative);
                self.emit(Instruction::Copy {
                    destination: Destination::Temporary(result),
                    source: negative,
                });
                self.emit(Instruction::Label(end_label));

                Operand::Temporary(result)
            }
            Expression::Assignment { name, value } => {
                let source = self.lower_expression(value);
                let name = self.resolve(name);

                self.emit(Instruction::Copy {
                    destination: Destination::variable(&name),
                    source,
                });

                Operand::variable(name)
            }
            Expression::CompoundAssignment {
                operator,
                name,
                value,
            } => {
                let rhs = self.lower_expression(value);
                let name = self.resolve(name);

                self.emit(Instruction::Binary {
                    operator: operator.binary_operator(),
                    destination: Destination::variable(&name),
                    lhs: Operand::variable(&name),
                    rhs,
                });

                Operand::variable(name)
            }
            // Both prefix and postfix forms produce the value from before the
            // update
            Expression::Increment { name, direction } => {
                let before = self.names.temporary();

                self.emit(Instruction::Copy {
                    destination: Destination::Temporary(before),
                    source: Operand::variable(self.resolve(name)),
                });
                self.emit_step(name, *direction);

                Operand::Temporary(before)
            }
            Expression::List(elements) => Operand::List(
                elements
                    .iter()
                    .map(|element| self.lower_expression(element))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::frontend::{SourceFile, parser::Parser};

    fn lower(source: &str) -> String {
        let source = SourceFile::in_memory(source);
        let program = Parser::parse_program(&source).unwrap();
        let mut names = NameGenerator::new();

        IrGenerator::lower_program(&program, &mut names).to_string()
    }

    #[test]
    fn lowers_declaration_and_arithmetic() {
        assert_eq!(
            lower("int x; x = 2 + 3;"),
            indoc! {"
                DECL INT x
                t1 = 2 + 3
                x = t1
            "}
        );
    }

    #[test]
    fn declaration_marker_precedes_initializing_copy() {
        assert_eq!(
            lower("int x = 1 * 2 + 3;"),
            indoc! {"
                t1 = 1 * 2
                t2 = t1 + 3
                DECL INT x
                x = t2
            "}
        );
    }

    #[test]
    fn postfix_increment_captures_old_value() {
        assert_eq!(
            lower("int i = 4; int y; y = i++;"),
            indoc! {"
                DECL INT i
                i = 4
                DECL INT y
                t1 = i
                i = i + 1
                y = t1
            "}
        );
    }

    #[test]
    fn statement_increment_only_updates() {
        assert_eq!(
            lower("i++; --j; k += 2;"),
            indoc! {"
                i = i + 1
                j = j - 1
                k = k + 2
            "}
        );
    }

    #[test]
    fn lowers_if_else() {
        assert_eq!(
            lower("if (a < 1) { x = 1; } else { x = 2; }"),
            indoc! {"
                t1 = a < 1
                ifFalse t1 goto L1
                x = 1
                goto L2
                L1:
                x = 2
                L2:
            "}
        );
    }

    #[test]
    fn lowers_if_without_else() {
        assert_eq!(
            lower("if (b) print(\"yes\");"),
            indoc! {r#"
                ifFalse b goto L1
                PRINT "yes"
                L1:
            "#}
        );
    }

    #[test]
    fn lowers_while() {
        assert_eq!(
            lower("while (n > 0) n -= 1;"),
            indoc! {"
                L1:
                t1 = n > 0
                ifFalse t1 goto L2
                n = n - 1
                goto L1
                L2:
            "}
        );
    }

    #[test]
    fn lowers_for() {
        assert_eq!(
            lower("for (int i = 0; i < 3; i++) print(i);"),
            indoc! {"
                DECL INT i
                i = 0
                L1:
                t1 = i < 3
                ifFalse t1 goto L2
                PRINT i
                i = i + 1
                goto L1
                L2:
            "}
        );
    }

    #[test]
    fn for_without_condition_has_no_guard() {
        assert_eq!(
            lower("for (;;) x = 1;"),
            indoc! {"
                L1:
                x = 1
                goto L1
                L2:
            "}
        );
    }

    #[test]
    fn ternary_shares_one_result_temporary() {
        assert_eq!(
            lower("m = a > b ? a : b;"),
            indoc! {"
                t1 = a > b
                ifFalse t1 goto L1
                t2 = a
                goto L2
                L1:
                t2 = b
                L2:
                m = t2
            "}
        );
    }

    #[test]
    fn lowers_unary_lists_and_negation() {
        assert_eq!(
            lower("b = !c; l = [1, x + 1]; n = -x;"),
            indoc! {"
                t1 = !c
                b = t1
                t2 = x + 1
                l = [1, t2]
                t3 = 0 - x
                n = t3
            "}
        );
    }

    #[test]
    fn shadowing_declaration_gets_its_own_name() {
        assert_eq!(
            lower("int x = 1; { int x = 2; x += 1; } print(x);"),
            indoc! {"
                DECL INT x
                x = 1
                DECL INT x.1
                x.1 = 2
                x.1 = x.1 + 1
                PRINT x
            "}
        );
    }

    #[test]
    fn shadowing_may_change_the_type() {
        assert_eq!(
            lower("int x = 5; print(x); { string x = \"hi\"; print(x); } x++;"),
            indoc! {r#"
                DECL INT x
                x = 5
                PRINT x
                DECL STRING x.1
                x.1 = "hi"
                PRINT x.1
                x = x + 1
            "#}
        );
    }

    #[test]
    fn loop_variables_are_scoped_to_their_loop() {
        assert_eq!(
            lower("for (int i = 0; i < 1; i++) {} for (int i = 0; i < 1; i++) {}"),
            indoc! {"
                DECL INT i
                i = 0
                L1:
                t1 = i < 1
                ifFalse t1 goto L2
                i = i + 1
                goto L1
                L2:
                DECL INT i.1
                i.1 = 0
                L3:
                t2 = i.1 < 1
                ifFalse t2 goto L4
                i.1 = i.1 + 1
                goto L3
                L4:
            "}
        );
    }

    #[test]
    fn numbering_restarts_for_each_generator() {
        assert_eq!(lower("x = 1 + 2;"), lower("x = 1 + 2;"));
    }
}
