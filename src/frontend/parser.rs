use tracing::debug;

use crate::{
    frontend::{
        SourceFile,
        ast::{
            BinaryOperator, CompoundOperator, Declaration, Expression, ForInitializer, Literal,
            Program, Statement, StepDirection, UnaryOperator,
        },
        lexer::{Keyword, Lexer, Span, SyntaxError, Token, TokenKind},
    },
    middle::types::Type,
};

type ParseResult<T> = Result<T, SyntaxError>;

#[derive(Debug)]
pub struct Parser<'source> {
    lexer: Lexer<'source>,
}

impl<'source> Parser<'source> {
    pub fn parse_program(source_file: &'source SourceFile) -> ParseResult<Program> {
        let mut parser = Self {
            lexer: Lexer::new(source_file),
        };

        let mut program = Program::default();

        while parser.lexer.peek()?.is_some() {
            program.statements.push(parser.parse_statement()?);
        }

        debug!(
            origin = %source_file.origin,
            statements = program.statements.len(),
            "parsed program"
        );

        Ok(program)
    }

    fn source(&self) -> &'source SourceFile {
        self.lexer.source()
    }

    fn value_of(&self, token: Token) -> &'source str {
        self.source().value_of_span(token.span)
    }

    fn expect_peek(&mut self, expecting: &str) -> ParseResult<Token> {
        match self.lexer.peek()? {
            Some(token) => Ok(token),
            None => Err(SyntaxError::new(
                format!("Expected {expecting} but reached end of file"),
                self.lexer.eof_span(),
            )),
        }
    }

    fn expect_next(&mut self, expecting: &str) -> ParseResult<Token> {
        match self.lexer.next()? {
            Some(token) => Ok(token),
            None => Err(SyntaxError::new(
                format!("Expected {expecting} but reached end of file"),
                self.lexer.eof_span(),
            )),
        }
    }

    fn expect_next_to_be(&mut self, kind: TokenKind) -> ParseResult<Token> {
        let token = self.expect_next(&format!("{kind:?}"))?;

        if token.kind != kind {
            return Err(SyntaxError::new(
                format!(
                    "Expected {:?} but found {:?} ({})",
                    kind,
                    token.kind,
                    self.value_of(token)
                ),
                token.span,
            ));
        }

        Ok(token)
    }

    fn next_is(&mut self, kind: TokenKind) -> ParseResult<bool> {
        Ok(self.lexer.peek()?.is_some_and(|t| t.kind == kind))
    }

    /// Consumes the next token only if it has the given kind
    fn eat(&mut self, kind: TokenKind) -> ParseResult<bool> {
        if self.next_is(kind)? {
            self.lexer.next()?;
            return Ok(true);
        }

        Ok(false)
    }

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        let peeked = self.expect_peek("statement")?;

        match peeked.kind {
            kind if kind.is_type_keyword() => {
                let declaration = self.parse_declaration()?;
                self.expect_next_to_be(TokenKind::Semicolon)?;
                Ok(Statement::Declaration(declaration))
            }
            TokenKind::Keyword(Keyword::If) => self.parse_if_statement(),
            TokenKind::Keyword(Keyword::While) => self.parse_while_statement(),
            TokenKind::Keyword(Keyword::For) => self.parse_for_statement(),
            TokenKind::Keyword(Keyword::Print) => {
                self.lexer.next()?;
                self.expect_next_to_be(TokenKind::OpenParen)?;
                let expression = self.parse_expression()?;
                self.expect_next_to_be(TokenKind::CloseParen)?;
                self.expect_next_to_be(TokenKind::Semicolon)?;
                Ok(Statement::Print(expression))
            }
            TokenKind::OpenBrace => Ok(Statement::Block(self.parse_block()?)),
            TokenKind::Semicolon => {
                self.lexer.next()?;
                Ok(Statement::Empty)
            }
            _ => {
                let expression = self.parse_expression()?;
                self.expect_next_to_be(TokenKind::Semicolon)?;
                Ok(Statement::Expression(expression))
            }
        }
    }

    /// { statement* }
    fn parse_block(&mut self) -> ParseResult<Vec<Statement>> {
        self.expect_next_to_be(TokenKind::OpenBrace)?;

        let mut statements = Vec::new();

        while !self.next_is(TokenKind::CloseBrace)? {
            if self.lexer.peek()?.is_none() {
                return Err(SyntaxError::new(
                    "Expected closing brace but reached end of file",
                    self.lexer.eof_span(),
                ));
            }

            statements.push(self.parse_statement()?);
        }

        self.expect_next_to_be(TokenKind::CloseBrace)?;

        Ok(statements)
    }

    /// int name = initializer
    fn parse_declaration(&mut self) -> ParseResult<Declaration> {
        let type_token = self.expect_next("type name")?;
        let ty = match type_token.kind {
            TokenKind::Keyword(Keyword::Int) => Type::Int,
            TokenKind::Keyword(Keyword::Float) => Type::Float,
            TokenKind::Keyword(Keyword::String) => Type::String,
            TokenKind::Keyword(Keyword::Bool) => Type::Bool,
            TokenKind::Keyword(Keyword::List) => Type::List,
            _ => {
                return Err(SyntaxError::new(
                    format!("Expected type name but found {}", self.value_of(type_token)),
                    type_token.span,
                ));
            }
        };

        let name = self.parse_identifier()?;

        let initializer = if self.eat(TokenKind::Equals)? {
            Some(self.parse_expression()?)
        } else {
            None
        };

        Ok(Declaration {
            ty,
            name,
            initializer,
        })
    }

    fn parse_identifier(&mut self) -> ParseResult<String> {
        let token = self.expect_next_to_be(TokenKind::Identifier)?;
        Ok(self.value_of(token).to_owned())
    }

    /// if (condition) statement else statement
    fn parse_if_statement(&mut self) -> ParseResult<Statement> {
        self.expect_next_to_be(TokenKind::Keyword(Keyword::If))?;
        let condition = self.parse_parenthesized_expression()?;
        let positive = Box::new(self.parse_statement()?);

        let negative = if self.eat(TokenKind::Keyword(Keyword::Else))? {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };

        Ok(Statement::If {
            condition,
            positive,
            negative,
        })
    }

    /// while (condition) statement
    fn parse_while_statement(&mut self) -> ParseResult<Statement> {
        self.expect_next_to_be(TokenKind::Keyword(Keyword::While))?;
        let condition = self.parse_parenthesized_expression()?;
        let body = Box::new(self.parse_statement()?);

        Ok(Statement::While { condition, body })
    }

    /// for (initializer; condition; update) statement
    fn parse_for_statement(&mut self) -> ParseResult<Statement> {
        self.expect_next_to_be(TokenKind::Keyword(Keyword::For))?;
        self.expect_next_to_be(TokenKind::OpenParen)?;

        let peeked = self.expect_peek("for loop initializer")?;
        let initializer = if peeked.kind == TokenKind::Semicolon {
            None
        } else if peeked.kind.is_type_keyword() {
            Some(ForInitializer::Declaration(self.parse_declaration()?))
        } else {
            Some(ForInitializer::Expression(self.parse_expression()?))
        };
        self.expect_next_to_be(TokenKind::Semicolon)?;

        let condition = if self.next_is(TokenKind::Semicolon)? {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_next_to_be(TokenKind::Semicolon)?;

        let update = if self.next_is(TokenKind::CloseParen)? {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_next_to_be(TokenKind::CloseParen)?;

        let body = Box::new(self.parse_statement()?);

        Ok(Statement::For {
            initializer,
            condition,
            update,
            body,
        })
    }

    fn parse_parenthesized_expression(&mut self) -> ParseResult<Expression> {
        self.expect_next_to_be(TokenKind::OpenParen)?;
        let expression = self.parse_expression()?;
        self.expect_next_to_be(TokenKind::CloseParen)?;
        Ok(expression)
    }

    fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.parse_assignment_expression()
    }

    /// Assignments are right associative and only valid with a bare identifier
    /// on the left hand side
    fn parse_assignment_expression(&mut self) -> ParseResult<Expression> {
        let start = self.expect_peek("expression")?.span.start;
        let lhs = self.parse_ternary_expression()?;

        let Some(operator) = self.lexer.peek()? else {
            return Ok(lhs);
        };

        if !operator.kind.is_assignment_operator() {
            return Ok(lhs);
        }

        self.lexer.next()?;

        let Expression::Identifier(name) = lhs else {
            return Err(SyntaxError::new(
                "Left hand side of an assignment must be a variable name",
                Span::new(start, operator.span.start),
            ));
        };

        let value = Box::new(self.parse_assignment_expression()?);

        Ok(match operator.kind {
            TokenKind::PlusEquals => Expression::CompoundAssignment {
                operator: CompoundOperator::Add,
                name,
                value,
            },
            TokenKind::MinusEquals => Expression::CompoundAssignment {
                operator: CompoundOperator::Subtract,
                name,
                value,
            },
            _ => Expression::Assignment { name, value },
        })
    }

    /// condition ? positive : negative
    fn parse_ternary_expression(&mut self) -> ParseResult<Expression> {
        let condition = self.parse_logical_or_expression()?;

        if !self.eat(TokenKind::Question)? {
            return Ok(condition);
        }

        let positive = self.parse_expression()?;
        self.expect_next_to_be(TokenKind::Colon)?;
        let negative = self.parse_ternary_expression()?;

        Ok(Expression::Ternary {
            condition: Box::new(condition),
            positive: Box::new(positive),
            negative: Box::new(negative),
        })
    }

    /// Parses a left associative chain of binary operators at one precedence
    /// level
    fn parse_binary_level(
        &mut self,
        operand: fn(&mut Self) -> ParseResult<Expression>,
        operator_for: fn(TokenKind) -> Option<BinaryOperator>,
    ) -> ParseResult<Expression> {
        let mut lhs = operand(self)?;

        while let Some(operator) = self
            .lexer
            .peek()?
            .and_then(|token| operator_for(token.kind))
        {
            self.lexer.next()?;
            let rhs = operand(self)?;
            lhs = Expression::binary(operator, lhs, rhs);
        }

        Ok(lhs)
    }

    fn parse_logical_or_expression(&mut self) -> ParseResult<Expression> {
        self.parse_binary_level(Self::parse_logical_and_expression, |kind| match kind {
            TokenKind::LogicalOr => Some(BinaryOperator::LogicalOr),
            _ => None,
        })
    }

    fn parse_logical_and_expression(&mut self) -> ParseResult<Expression> {
        self.parse_binary_level(Self::parse_equality_expression, |kind| match kind {
            TokenKind::LogicalAnd => Some(BinaryOperator::LogicalAnd),
            _ => None,
        })
    }

    fn parse_equality_expression(&mut self) -> ParseResult<Expression> {
        self.parse_binary_level(Self::parse_relational_expression, |kind| match kind {
            TokenKind::DoubleEquals => Some(BinaryOperator::Equals),
            TokenKind::NotEquals => Some(BinaryOperator::NotEquals),
            _ => None,
        })
    }

    fn parse_relational_expression(&mut self) -> ParseResult<Expression> {
        self.parse_binary_level(Self::parse_term_expression, |kind| match kind {
            TokenKind::LessThan => Some(BinaryOperator::LessThan),
            TokenKind::LessThanOrEqualTo => Some(BinaryOperator::LessThanOrEqualTo),
            TokenKind::GreaterThan => Some(BinaryOperator::GreaterThan),
            TokenKind::GreaterThanOrEqualTo => Some(BinaryOperator::GreaterThanOrEqualTo),
            _ => None,
        })
    }

    fn parse_term_expression(&mut self) -> ParseResult<Expression> {
        self.parse_binary_level(Self::parse_factor_expression, |kind| match kind {
            TokenKind::Plus => Some(BinaryOperator::Add),
            TokenKind::Minus => Some(BinaryOperator::Subtract),
            _ => None,
        })
    }

    fn parse_factor_expression(&mut self) -> ParseResult<Expression> {
        self.parse_binary_level(Self::parse_unary_expression, |kind| match kind {
            TokenKind::Asterisk => Some(BinaryOperator::Multiply),
            TokenKind::Divide => Some(BinaryOperator::Divide),
            _ => None,
        })
    }

    fn parse_unary_expression(&mut self) -> ParseResult<Expression> {
        let peeked = self.expect_peek("expression")?;

        match peeked.kind {
            TokenKind::Bang => {
                self.lexer.next()?;
                let operand = self.parse_unary_expression()?;

                Ok(Expression::Unary {
                    operator: UnaryOperator::LogicalNot,
                    operand: Box::new(operand),
                })
            }
            TokenKind::Minus => {
                self.lexer.next()?;

                Ok(match self.parse_unary_expression()? {
                    Expression::Literal(Literal::Int(value)) => {
                        Expression::Literal(Literal::Int(value.wrapping_neg()))
                    }
                    Expression::Literal(Literal::Float(value)) => {
                        Expression::Literal(Literal::Float(-value))
                    }
                    operand => Expression::binary(BinaryOperator::Subtract, Expression::int(0), operand),
                })
            }
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                self.lexer.next()?;
                let name = self.parse_identifier()?;

                Ok(Expression::Increment {
                    name,
                    direction: step_direction(peeked.kind),
                })
            }
            _ => self.parse_postfix_expression(),
        }
    }

    fn parse_postfix_expression(&mut self) -> ParseResult<Expression> {
        let expression = self.parse_atomic_expression()?;

        let Some(token) = self.lexer.peek()? else {
            return Ok(expression);
        };

        match (expression, token.kind) {
            (Expression::Identifier(name), TokenKind::PlusPlus | TokenKind::MinusMinus) => {
                self.lexer.next()?;

                Ok(Expression::Increment {
                    name,
                    direction: step_direction(token.kind),
                })
            }
            (expression, _) => Ok(expression),
        }
    }

    fn parse_atomic_expression(&mut self) -> ParseResult<Expression> {
        let token = self.expect_next("expression")?;
        let value = self.value_of(token);

        match token.kind {
            TokenKind::IntegerLiteral => value
                .parse()
                .map(|value| Expression::Literal(Literal::Int(value)))
                .map_err(|_| SyntaxError::new("Integer literal is too large", token.span)),
            TokenKind::FloatLiteral => value
                .parse()
                .map(|value| Expression::Literal(Literal::Float(value)))
                .map_err(|_| SyntaxError::new("Malformed float literal", token.span)),
            TokenKind::BooleanLiteral => Ok(Expression::Literal(Literal::Bool(value == "true"))),
            TokenKind::StringLiteral => Ok(Expression::Literal(Literal::Str(
                value[1..value.len() - 1].to_owned(),
            ))),
            TokenKind::Identifier => Ok(Expression::Identifier(value.to_owned())),
            TokenKind::OpenParen => {
                let expression = self.parse_expression()?;
                self.expect_next_to_be(TokenKind::CloseParen)?;
                Ok(expression)
            }
            TokenKind::OpenBracket => {
                let mut elements = Vec::new();

                if !self.next_is(TokenKind::CloseBracket)? {
                    elements.push(self.parse_expression()?);

                    while self.eat(TokenKind::Comma)? {
                        elements.push(self.parse_expression()?);
                    }
                }

                self.expect_next_to_be(TokenKind::CloseBracket)?;
                Ok(Expression::List(elements))
            }
            _ => Err(SyntaxError::new(
                format!("Expected expression but found {value}"),
                token.span,
            )),
        }
    }
}

fn step_direction(kind: TokenKind) -> StepDirection {
    if kind == TokenKind::PlusPlus {
        StepDirection::Increment
    } else {
        StepDirection::Decrement
    }
}
