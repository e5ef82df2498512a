use colored::{ColoredString, Colorize};
use itertools::Itertools;

use crate::middle::ir::{self, Destination, Instruction, Operand};

/// Prints a titled, colorized listing of an instruction stream
pub fn pretty_print_ir(title: &str, program: &ir::Program) {
    println!("{}", format!("; {title}").bright_black());

    for instruction in &program.instructions {
        match instruction {
            Instruction::Label(_) => println!("{}", colored_instruction(instruction)),
            _ => println!("    {}", colored_instruction(instruction)),
        }
    }

    println!();
}

pub fn colored_instruction(instruction: &Instruction) -> String {
    match instruction {
        Instruction::Declare { ty, name } => {
            format!("{} {} {}", "DECL".magenta(), ty.to_string().yellow(), name)
        }
        Instruction::Copy {
            destination,
            source,
        } => format!(
            "{} {} {}",
            colored_destination(destination),
            "=".white(),
            colored_operand(source)
        ),
        Instruction::Unary {
            operator,
            destination,
            operand,
        } => format!(
            "{} {} {}{}",
            colored_destination(destination),
            "=".white(),
            operator.to_string().white(),
            colored_operand(operand)
        ),
        Instruction::Binary {
            operator,
            destination,
            lhs,
            rhs,
        } => format!(
            "{} {} {} {} {}",
            colored_destination(destination),
            "=".white(),
            colored_operand(lhs),
            operator.to_string().white(),
            colored_operand(rhs)
        ),
        Instruction::IfFalse { condition, target } => format!(
            "{} {} {} {}",
            "ifFalse".cyan(),
            colored_operand(condition),
            "goto".cyan(),
            target.to_string().bright_red()
        ),
        Instruction::Goto(target) => {
            format!("{} {}", "goto".cyan(), target.to_string().bright_red())
        }
        Instruction::Label(label) => format!("{label}:").bright_red().to_string(),
        Instruction::Print(operand) => format!("{} {}", "PRINT".magenta(), colored_operand(operand)),
    }
}

fn colored_destination(destination: &Destination) -> ColoredString {
    match destination {
        Destination::Temporary(_) => destination.to_string().green(),
        Destination::Variable(_) => destination.to_string().blue(),
    }
}

fn colored_operand(operand: &Operand) -> String {
    match operand {
        Operand::Variable(variable) => variable.to_string().blue().to_string(),
        Operand::Temporary(temporary) => temporary.to_string().green().to_string(),
        Operand::Constant(constant) => constant.to_string().purple().to_string(),
        Operand::List(elements) => format!(
            "[{}]",
            elements.iter().map(colored_operand).join(", ")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::{ir::NameGenerator, types::Constant};

    #[test]
    fn uncolored_listing_matches_plain_text() {
        colored::control::set_override(false);

        let mut names = NameGenerator::new();
        let instruction = Instruction::IfFalse {
            condition: Operand::List(vec![
                Operand::Temporary(names.temporary()),
                Operand::Constant(Constant::Bool(true)),
            ]),
            target: names.label(),
        };

        assert_eq!(colored_instruction(&instruction), instruction.to_string());
    }
}
