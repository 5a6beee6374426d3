//! The operator-precedence shuffler (spec.md §4.3).
//!
//! Rewrites a freshly parsed, flat [`RawMessage`] chain into its canonical
//! nested form: operator nodes become unary calls whose argument is the
//! (possibly further-shuffled) right-hand chain, and assignment operators
//! desugar into `setSlot`/`updateSlot`/`newSlot`-style calls.
//!
//! The algorithm flattens a chain into a token list (stripping `next`
//! links, keeping each token's pre-bundled `args`), then parses that list
//! with a precedence-climbing pass rather than the level-stack machine
//! described at design level in the spec — the two describe the same
//! left-associative, tightest-binds-first rewrite, and a recursive
//! descent is far less error-prone to get right over owned tree nodes.

use wisp_core::error::ShuffleError;
use wisp_core::message::{RawMessage, Symbol, SymbolKind};
use wisp_core::object::{ObjectRef, Payload};
use wisp_core::operator_table::OperatorTable;

const NO_SHUFFLING_PRAGMA: &str = "__noShuffling__";

/// Shuffle a flat, freshly parsed chain into its canonical nested form.
///
/// Identity for a chain whose head is the `__noShuffling__` pragma
/// message (spec.md §4.3): such a chain is returned completely
/// untouched, including its own sub-args and the remainder of its
/// `next` chain.
pub fn shuffle(chain: RawMessage, table: &OperatorTable) -> Result<RawMessage, ShuffleError> {
    if is_no_shuffling_pragma(&chain) {
        return Ok(chain);
    }

    let tokens = flatten(chain);
    shuffle_tokens(tokens, table)
}

fn is_no_shuffling_pragma(msg: &RawMessage) -> bool {
    msg.symbol.kind == SymbolKind::Identifier && msg.symbol.text == NO_SHUFFLING_PRAGMA
}

/// Strip every `next` link off a chain, returning its nodes in order.
/// Each node keeps its own `args` (a parser's pre-bundled operator
/// argument, if any) untouched.
fn flatten(chain: RawMessage) -> Vec<RawMessage> {
    let mut tokens = Vec::new();
    let mut cursor = Some(chain);
    while let Some(mut node) = cursor {
        cursor = node.next.take().map(|boxed| *boxed);
        tokens.push(node);
    }
    tokens
}

/// Shuffle an already-flattened token list: split on top-level
/// terminators into statements, shuffle each, and rejoin with the
/// terminators preserved as chain continuations.
fn shuffle_tokens(tokens: Vec<RawMessage>, table: &OperatorTable) -> Result<RawMessage, ShuffleError> {
    let mut pos = 0usize;
    let mut result: Option<RawMessage> = None;

    while pos < tokens.len() {
        if tokens[pos].symbol.kind == SymbolKind::Terminator {
            let term = tokens[pos].clone();
            pos += 1;
            attach(&mut result, term);
            continue;
        }
        let stmt = parse_statement(&tokens, &mut pos, table)?;
        attach(&mut result, stmt);
    }

    Ok(result.expect("flatten() always yields at least one token"))
}

fn attach(result: &mut Option<RawMessage>, node: RawMessage) {
    match result {
        None => *result = Some(node),
        Some(head) => head.append(node),
    }
}

/// One statement: either an assignment desugaring or an ordinary
/// precedence-climbed operator chain.
fn parse_statement(
    tokens: &[RawMessage],
    pos: &mut usize,
    table: &OperatorTable,
) -> Result<RawMessage, ShuffleError> {
    let lhs = consume_plain_run(tokens, pos, table)?;

    if *pos < tokens.len() && table.is_assign(&tokens[*pos].symbol.text) {
        parse_assignment(lhs, tokens, pos, table)
    } else {
        continue_operators(lhs, tokens, pos, table, i32::MAX)
    }
}

/// Desugar `lhs := rhs` (and `=`, `::=`, or any user-added assign
/// operator) into a call to the assign operator's target slot
/// (spec.md §4.3 steps 1-5).
fn parse_assignment(
    lhs: RawMessage,
    tokens: &[RawMessage],
    pos: &mut usize,
    table: &OperatorTable,
) -> Result<RawMessage, ShuffleError> {
    if !lhs.args.is_empty() {
        return Err(ShuffleError::AssignToCall(lhs.symbol.text));
    }

    let mut op_tok = tokens[*pos].clone();
    *pos += 1;
    if op_tok.args.len() > 1 {
        return Err(ShuffleError::TooManyArgs(op_tok.symbol.text));
    }

    let mut rhs_tokens: Vec<RawMessage> = Vec::new();
    if let Some(pre_bundled) = op_tok.args.pop() {
        rhs_tokens.push(pre_bundled);
    }
    while *pos < tokens.len() && tokens[*pos].symbol.kind != SymbolKind::Terminator {
        rhs_tokens.push(tokens[*pos].clone());
        *pos += 1;
    }
    if rhs_tokens.is_empty() {
        return Err(ShuffleError::MissingRhs(op_tok.symbol.text));
    }

    let rhs_chain = {
        let mut iter = rhs_tokens.into_iter();
        let mut head = iter.next().expect("checked non-empty above");
        for tok in iter {
            head.append(tok);
        }
        head
    };
    let rhs_shuffled = shuffle_tokens(flatten(rhs_chain), table)?;

    let target_slot = table
        .assign_target(&op_tok.symbol.text)
        .expect("is_assign() implies assign_target() is Some")
        .to_owned();

    // lhs's memo (if it had one, e.g. a prior literal cache) is dropped along
    // with lhs itself: only its name survives, as a fresh string-literal arg.
    // It needs its own memo (spec.md §3: string-literal messages carry a
    // cached value) so evaluating it yields the name itself rather than
    // sending `lhs`'s name as an identifier lookup.
    let lhs_name = lhs.symbol.text;
    let name_literal = RawMessage::new(Symbol::string(lhs_name.clone()))
        .at(lhs.location)
        .with_memo(ObjectRef::new(Payload::Sequence(lhs_name.into_bytes())));

    Ok(RawMessage::new(Symbol::ident(target_slot))
        .at(op_tok.location)
        .with_args(vec![name_literal, rhs_shuffled]))
}

/// Consume a maximal run of plain (non-operator, non-terminator) tokens,
/// chained via `next`. At least one token is always consumed.
fn consume_plain_run(
    tokens: &[RawMessage],
    pos: &mut usize,
    table: &OperatorTable,
) -> Result<RawMessage, ShuffleError> {
    let mut head = tokens[*pos].clone();
    *pos += 1;
    while *pos < tokens.len() && !is_boundary(&tokens[*pos], table) {
        head.append(tokens[*pos].clone());
        *pos += 1;
    }
    Ok(head)
}

fn is_boundary(msg: &RawMessage, table: &OperatorTable) -> bool {
    msg.symbol.kind == SymbolKind::Terminator || table.is_operator(&msg.symbol.text)
}

/// Absorb a run of non-assignment operators whose precedence is tight
/// enough for this level (<= `max_prec`) onto the end of `head`,
/// recursing for each operator's right-hand operand with a strictly
/// tighter threshold so same-precedence operators stay left-associative
/// at the current level instead of nesting into the right-hand side.
fn continue_operators(
    mut head: RawMessage,
    tokens: &[RawMessage],
    pos: &mut usize,
    table: &OperatorTable,
    max_prec: i32,
) -> Result<RawMessage, ShuffleError> {
    loop {
        if *pos >= tokens.len() {
            return Ok(head);
        }
        let next = &tokens[*pos];
        if next.symbol.kind == SymbolKind::Terminator || table.is_assign(&next.symbol.text) {
            return Ok(head);
        }
        let prec = match table.precedence(&next.symbol.text) {
            Some(p) => p,
            None => return Err(ShuffleError::UnknownOperator(next.symbol.text.clone())),
        };
        if prec > max_prec {
            return Ok(head);
        }

        let mut op_tok = tokens[*pos].clone();
        *pos += 1;
        if op_tok.args.len() > 1 {
            return Err(ShuffleError::TooManyArgs(op_tok.symbol.text));
        }

        let rhs = match op_tok.args.pop() {
            Some(pre_bundled) => shuffle_tokens(flatten(pre_bundled), table)?,
            None => {
                if *pos >= tokens.len() {
                    return Err(ShuffleError::MissingRhs(op_tok.symbol.text));
                }
                let rhs_head = consume_plain_run(tokens, pos, table)?;
                continue_operators(rhs_head, tokens, pos, table, prec - 1)?
            }
        };

        op_tok.args = vec![rhs];
        head.append(op_tok);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wisp_core::id::SourceLocation;

    fn ident(name: &str) -> RawMessage {
        RawMessage::new(Symbol::ident(name))
    }

    fn chain(names: &[&str]) -> RawMessage {
        let mut iter = names.iter();
        let mut head = ident(iter.next().unwrap());
        for n in iter {
            head.append(ident(n));
        }
        head
    }

    #[test]
    fn no_shuffling_pragma_is_identity() {
        let table = OperatorTable::default_table();
        let input = ident(NO_SHUFFLING_PRAGMA).with_next(chain(&["x", "+", "y"]));
        let shuffled = shuffle(input.clone(), &table).unwrap();
        assert_eq!(shuffled.symbol.text, NO_SHUFFLING_PRAGMA);
        assert_eq!(
            shuffled.next.unwrap().symbol.text,
            input.next.unwrap().symbol.text
        );
    }

    #[test]
    fn x_plus_y_times_z_nests_by_precedence() {
        let table = OperatorTable::default_table();
        let input = chain(&["x", "+", "y", "*", "z"]);
        let shuffled = shuffle(input, &table).unwrap();

        assert_eq!(shuffled.symbol.text, "x");
        let plus = shuffled.next.as_ref().expect("x is followed by +");
        assert_eq!(plus.symbol.text, "+");
        assert_eq!(plus.args.len(), 1);
        let rhs = &plus.args[0];
        assert_eq!(rhs.symbol.text, "y");
        let star = rhs.next.as_ref().expect("y is followed by *");
        assert_eq!(star.symbol.text, "*");
        assert_eq!(star.args.len(), 1);
        assert_eq!(star.args[0].symbol.text, "z");
    }

    #[test]
    fn left_associative_same_precedence_chains_sequentially() {
        let table = OperatorTable::default_table();
        let input = chain(&["a", "-", "b", "-", "c"]);
        let shuffled = shuffle(input, &table).unwrap();

        assert_eq!(shuffled.symbol.text, "a");
        let minus1 = shuffled.next.as_ref().unwrap();
        assert_eq!(minus1.symbol.text, "-");
        assert_eq!(minus1.args[0].symbol.text, "b");
        assert!(minus1.args[0].next.is_none());
        let minus2 = minus1.next.as_ref().expect("second - follows first at the same level");
        assert_eq!(minus2.symbol.text, "-");
        assert_eq!(minus2.args[0].symbol.text, "c");
    }

    #[test]
    fn assignment_desugars_to_set_slot() {
        let table = OperatorTable::default_table();
        let input = ident("x").with_next(
            RawMessage::new(Symbol {
                kind: SymbolKind::Identifier,
                text: ":=".to_owned(),
            })
            .with_next(RawMessage::new(Symbol::number("1"))),
        );
        let shuffled = shuffle(input, &table).unwrap();

        assert_eq!(shuffled.symbol.text, "setSlot");
        assert_eq!(shuffled.args.len(), 2);
        assert_eq!(shuffled.args[0].symbol.text, "x");
        assert_eq!(shuffled.args[0].symbol.kind, SymbolKind::String);
        match shuffled.args[0].memo.as_ref().expect("name literal must carry a memo").payload() {
            Payload::Sequence(bytes) => assert_eq!(bytes, b"x"),
            other => panic!("expected a sequence payload, got {other:?}"),
        }
        assert_eq!(shuffled.args[1].symbol.text, "1");
    }

    #[test]
    fn chained_assignment_is_right_associative() {
        let table = OperatorTable::default_table();
        // x := y := z
        let assign = |text: &str| RawMessage::new(Symbol { kind: SymbolKind::Identifier, text: text.to_owned() });
        let input = ident("x")
            .with_next(assign(":=").with_next(ident("y").with_next(assign(":=").with_next(ident("z")))));
        let shuffled = shuffle(input, &table).unwrap();

        assert_eq!(shuffled.symbol.text, "setSlot");
        assert_eq!(shuffled.args[0].symbol.text, "x");
        let inner = &shuffled.args[1];
        assert_eq!(inner.symbol.text, "setSlot");
        assert_eq!(inner.args[0].symbol.text, "y");
        assert_eq!(inner.args[1].symbol.text, "z");
    }

    #[test]
    fn assign_to_call_expression_is_rejected() {
        let table = OperatorTable::default_table();
        let mut lhs = ident("foo");
        lhs.args = vec![ident("arg")];
        let input = lhs.with_next(
            RawMessage::new(Symbol {
                kind: SymbolKind::Identifier,
                text: ":=".to_owned(),
            })
            .with_next(RawMessage::new(Symbol::number("1"))),
        );
        let err = shuffle(input, &table).unwrap_err();
        assert!(matches!(err, ShuffleError::AssignToCall(_)));
    }

    #[test]
    fn assignment_with_no_rhs_is_an_error() {
        let table = OperatorTable::default_table();
        let input = ident("x").with_next(RawMessage::new(Symbol {
            kind: SymbolKind::Identifier,
            text: ":=".to_owned(),
        }));
        let err = shuffle(input, &table).unwrap_err();
        assert!(matches!(err, ShuffleError::MissingRhs(_)));
    }

    #[test]
    fn unknown_operator_symbol_is_rejected() {
        let table = OperatorTable::default_table();
        let input = chain(&["x", "~>", "y"]);
        let err = shuffle(input, &table).unwrap_err();
        match err {
            ShuffleError::UnknownOperator(sym) => assert_eq!(sym, "~>"),
            other => panic!("expected UnknownOperator, got {other:?}"),
        }
    }

    #[test]
    fn shuffling_an_already_shuffled_chain_is_idempotent() {
        let table = OperatorTable::default_table();
        let once = shuffle(chain(&["x", "+", "y", "*", "z"]), &table).unwrap();
        let twice = shuffle(once.clone(), &table).unwrap();
        assert_eq!(format!("{once:?}"), format!("{twice:?}"));
    }

    #[test]
    fn location_is_preserved_on_plain_chain_members() {
        let table = OperatorTable::default_table();
        let input = ident("x").at(SourceLocation::new("f.wisp", 3));
        let shuffled = shuffle(input, &table).unwrap();
        assert_eq!(shuffled.location, SourceLocation::new("f.wisp", 3));
    }
}
