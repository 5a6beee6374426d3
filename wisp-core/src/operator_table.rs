//! The operator table (spec.md §3, §6): a singleton object holding operator
//! precedences and the assignment-operator → target-slot mapping the
//! shuffler consults.

use std::collections::HashMap;

/// Sentinel precedence for assignment operators: looser than any
/// non-assignment operator (spec.md §4.3), and always right-associative.
pub const ASSIGN_PRECEDENCE: i32 = -1;

/// Operator precedences and assignment desugaring targets.
///
/// Lower precedence binds tighter, except for the assignment sentinel
/// [`ASSIGN_PRECEDENCE`], which is defined to be looser than every other
/// operator regardless of its numeric value.
#[derive(Debug, Clone)]
pub struct OperatorTable {
    /// symbol → precedence. Every entry here is left-associative.
    pub operators: HashMap<String, i32>,
    /// symbol → target slot name, e.g. `:=` → `setSlot`. Every entry here
    /// is right-associative and binds looser than anything in `operators`.
    pub assign_operators: HashMap<String, String>,
}

impl OperatorTable {
    /// An empty table with no operators registered.
    pub fn empty() -> Self {
        Self {
            operators: HashMap::new(),
            assign_operators: HashMap::new(),
        }
    }

    /// The default table seeded at VM construction (spec.md §6).
    pub fn default_table() -> Self {
        let mut operators = HashMap::new();
        let mut add = |prec: i32, syms: &[&str]| {
            for s in syms {
                operators.insert((*s).to_owned(), prec);
            }
        };
        add(0, &["?", "@", "@@"]);
        add(1, &["**"]);
        add(2, &["%", "*", "/"]);
        add(3, &["+", "-"]);
        add(4, &["<<", ">>"]);
        add(5, &["<", "<=", ">", ">="]);
        add(6, &["!=", "=="]);
        add(7, &["&"]);
        add(8, &["^"]);
        add(9, &["|"]);
        add(10, &["&&", "and"]);
        add(11, &["||", "or"]);
        add(12, &[".."]);
        add(
            13,
            &[
                "%=", "&=", "*=", "+=", "-=", "/=", "<<=", ">>=", "^=", "|=",
            ],
        );
        add(14, &["return"]);

        let mut assign_operators = HashMap::new();
        assign_operators.insert("::=".to_owned(), "newSlot".to_owned());
        assign_operators.insert(":=".to_owned(), "setSlot".to_owned());
        assign_operators.insert("=".to_owned(), "updateSlot".to_owned());

        Self {
            operators,
            assign_operators,
        }
    }

    /// The precedence of a non-assignment operator, if registered.
    pub fn precedence(&self, symbol: &str) -> Option<i32> {
        self.operators.get(symbol).copied()
    }

    /// Whether `symbol` is an assignment operator.
    pub fn is_assign(&self, symbol: &str) -> bool {
        self.assign_operators.contains_key(symbol)
    }

    /// The target slot name an assignment operator desugars to.
    pub fn assign_target(&self, symbol: &str) -> Option<&str> {
        self.assign_operators.get(symbol).map(String::as_str)
    }

    /// Whether `symbol` is an operator of any kind (assignment or not).
    pub fn is_operator(&self, symbol: &str) -> bool {
        self.operators.contains_key(symbol) || self.assign_operators.contains_key(symbol)
    }

    /// Register or override a non-assignment operator's precedence.
    pub fn set_operator(&mut self, symbol: impl Into<String>, precedence: i32) {
        self.operators.insert(symbol.into(), precedence);
    }

    /// Register or override an assignment operator's target slot.
    pub fn set_assign_operator(&mut self, symbol: impl Into<String>, target: impl Into<String>) {
        self.assign_operators.insert(symbol.into(), target.into());
    }
}

impl Default for OperatorTable {
    fn default() -> Self {
        Self::default_table()
    }
}
