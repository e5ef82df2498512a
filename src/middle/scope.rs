use hashbrown::{HashMap, HashSet};

use crate::{
    index::{IndexVec, simple_index},
    middle::{
        semantic::SemanticError,
        types::{Constant, Type},
    },
};

simple_index! {
    /// Identifies a declared variable in the symbol table
    pub struct SymbolId;
}

/// A declared variable
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub ty: Type,
    /// Value the variable is known to hold at the current point of analysis
    pub constant: Option<Constant>,
    /// Number of nested scopes open when the variable was declared
    pub depth: usize,
}

/// Symbol table for one compilation
///
/// Scopes nest in a stack on top of the global scope. Every symbol ever
/// declared is kept (in declaration order) even after its scope closes.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: IndexVec<SymbolId, Symbol>,
    global_scope: HashMap<String, SymbolId>,
    stack: Vec<HashMap<String, SymbolId>>,
    declared_names: HashSet<String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of scopes open on top of the global scope
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Creates a new block scope
    pub fn push_scope(&mut self) {
        self.stack.push(HashMap::new());
    }

    /// Destroys the current block scope
    pub fn pop_scope(&mut self) {
        assert!(
            !self.stack.is_empty(),
            "Attempted to pop a block scope from the global context"
        );

        self.stack.pop();
    }

    fn current_scope_mut(&mut self) -> &mut HashMap<String, SymbolId> {
        self.stack.last_mut().unwrap_or(&mut self.global_scope)
    }

    /// Binds a new variable in the innermost scope
    pub fn declare(&mut self, name: &str, ty: Type) -> Result<SymbolId, SemanticError> {
        if self.current_scope_mut().contains_key(name) {
            return Err(SemanticError::Redeclaration {
                name: name.to_owned(),
            });
        }

        let depth = self.depth();
        let id = self.symbols.push(Symbol {
            name: name.to_owned(),
            ty,
            constant: None,
            depth,
        });
        self.current_scope_mut().insert(name.to_owned(), id);
        self.declared_names.insert(name.to_owned());

        Ok(id)
    }

    /// Finds the visible binding for a name, searching from the innermost
    /// scope outward
    pub fn resolve(&self, name: &str) -> Result<SymbolId, SemanticError> {
        let visible = self
            .stack
            .iter()
            .rev()
            .chain(std::iter::once(&self.global_scope))
            .find_map(|scope| scope.get(name));

        match visible {
            Some(id) => Ok(*id),
            None if self.declared_names.contains(name) => Err(SemanticError::UseOutOfScope {
                name: name.to_owned(),
            }),
            None => Err(SemanticError::UndeclaredVariable {
                name: name.to_owned(),
            }),
        }
    }

    /// The visible symbol for a name, if any
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.resolve(name).ok().map(|id| self.get(id))
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id]
    }

    /// Every declared symbol in declaration order
    pub fn entries(&self) -> &[Symbol] {
        self.symbols.as_slice()
    }
}

impl core::fmt::Display for SymbolTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for symbol in self.symbols.iter() {
            write!(
                f,
                "{}{} {}",
                "  ".repeat(symbol.depth),
                symbol.ty,
                symbol.name
            )?;

            if let Some(constant) = &symbol.constant {
                write!(f, " = {constant}")?;
            }

            writeln!(f)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_scopes_shadow_and_close() {
        let mut table = SymbolTable::new();

        let outer = table.declare("x", Type::Int).unwrap();
        table.push_scope();
        let inner = table.declare("x", Type::Float).unwrap();

        assert_eq!(table.resolve("x"), Ok(inner));
        assert_eq!(table.get(inner).depth, 1);

        table.pop_scope();

        assert_eq!(table.resolve("x"), Ok(outer));
        assert_eq!(table.depth(), 0);
        assert_eq!(table.entries().len(), 2);
    }

    #[test]
    fn redeclaration_only_checks_innermost_scope() {
        let mut table = SymbolTable::new();

        table.declare("x", Type::Int).unwrap();
        assert_eq!(
            table.declare("x", Type::Bool),
            Err(SemanticError::Redeclaration { name: "x".into() })
        );
    }

    #[test]
    fn distinguishes_out_of_scope_from_undeclared() {
        let mut table = SymbolTable::new();

        table.push_scope();
        table.declare("i", Type::Int).unwrap();
        table.pop_scope();

        assert_eq!(
            table.resolve("i"),
            Err(SemanticError::UseOutOfScope { name: "i".into() })
        );
        assert_eq!(
            table.resolve("j"),
            Err(SemanticError::UndeclaredVariable { name: "j".into() })
        );
        assert!(table.lookup("i").is_none());
    }

    #[test]
    fn renders_entries_with_constants() {
        let mut table = SymbolTable::new();

        let x = table.declare("x", Type::Int).unwrap();
        table.get_mut(x).constant = Some(Constant::Int(5));
        table.push_scope();
        table.declare("s", Type::String).unwrap();
        table.pop_scope();

        assert_eq!(table.to_string(), "INT x = 5\n  STRING s\n");
    }
}
