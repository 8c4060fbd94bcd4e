//! Declaration extraction
//!
//! Builds the symbol table of one module (parameters first, then locals in
//! source order) and strips `Declare` statements from its body, including
//! declarations nested in control-flow blocks. Zero dimensions and arrays
//! larger than [`MAX_CELLS`] are rejected here.

use super::symbols::{SymbolTable, VarSymbol};
use crate::ast::{Module, Stmt, StmtKind};
use crate::common::Span;
use crate::diagnostics::CompileError;
use crate::types::{MAX_CELLS, checked_cells};

/// Symbols and declaration-free body of a module
#[derive(Debug, Clone)]
pub struct Extracted {
    pub symbols: SymbolTable,
    pub body: Vec<Stmt>,
}

/// Extract the declarations of `module`
pub fn extract(module: &Module) -> Result<Extracted, Vec<CompileError>> {
    let mut extractor = Extractor {
        symbols: SymbolTable::new(module.name.clone()),
        errors: Vec::new(),
    };

    for param in &module.params {
        let mut symbol = VarSymbol::new(&param.name, param.kind, param.dims.clone(), param.span);
        symbol.by_ref = param.by_ref;
        symbol.is_param = true;
        extractor.declare(symbol);
    }

    let body = extractor.strip(&module.body);

    if !extractor.errors.is_empty() {
        return Err(extractor.errors);
    }
    tracing::debug!(
        "module `{}`: {} symbol(s)",
        module.name,
        extractor.symbols.len()
    );
    Ok(Extracted {
        symbols: extractor.symbols,
        body,
    })
}

struct Extractor {
    symbols: SymbolTable,
    errors: Vec<CompileError>,
}

impl Extractor {
    fn declare(&mut self, symbol: VarSymbol) {
        if checked_cells(&symbol.dims).is_none() {
            self.errors.push(CompileError::InvalidDimension {
                name: symbol.name.clone(),
                max: MAX_CELLS,
                span: symbol.span.into(),
                line: symbol.span.line,
            });
            return;
        }
        let second = symbol.ty().to_string();
        let (name, span) = (symbol.name.clone(), symbol.span);
        if let Err(first) = self.symbols.insert(symbol) {
            let error = repeated(&name, first, second, span);
            self.errors.push(error);
        }
    }

    fn strip(&mut self, stmts: &[Stmt]) -> Vec<Stmt> {
        let mut kept = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            let kind = match &stmt.kind {
                StmtKind::Declare(declarators) => {
                    for d in declarators {
                        self.declare(VarSymbol::new(&d.name, d.kind, d.dims.clone(), d.span));
                    }
                    continue;
                }
                StmtKind::If {
                    cond,
                    then_branch,
                    else_branch,
                } => StmtKind::If {
                    cond: cond.clone(),
                    then_branch: self.strip(then_branch),
                    else_branch: self.strip(else_branch),
                },
                StmtKind::While { cond, body } => StmtKind::While {
                    cond: cond.clone(),
                    body: self.strip(body),
                },
                StmtKind::Until {
                    body,
                    cond,
                    cond_span,
                } => StmtKind::Until {
                    body: self.strip(body),
                    cond: cond.clone(),
                    cond_span: *cond_span,
                },
                StmtKind::For {
                    counter,
                    from,
                    to,
                    body,
                } => StmtKind::For {
                    counter: counter.clone(),
                    from: from.clone(),
                    to: to.clone(),
                    body: self.strip(body),
                },
                other => other.clone(),
            };
            kept.push(Stmt {
                kind,
                span: stmt.span,
            });
        }
        kept
    }
}

fn repeated(name: &str, first: &VarSymbol, second: String, span: Span) -> CompileError {
    CompileError::RepeatedVariable {
        name: name.to_string(),
        first: first.ty().to_string(),
        second,
        span: span.into(),
        first_span: first.span.into(),
        line: span.line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn main_of(source: &str) -> Module {
        let tokens = lex(source).expect("lexing failed");
        parse(&tokens).expect("parsing failed").main
    }

    #[test]
    fn test_nested_declarations_are_removed() {
        let module = main_of("entero a\nsi verdadero entonces\n real b\n b <- 1\nfinsi");
        let extracted = extract(&module).expect("extraction failed");
        let names: Vec<_> = extracted.symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(extracted.body.len(), 1);
        let StmtKind::If { then_branch, .. } = &extracted.body[0].kind else {
            panic!("expected if");
        };
        assert_eq!(then_branch.len(), 1);
    }

    #[test]
    fn test_repeated_variable_reports_both_types() {
        let module = main_of("entero a\nreal a[2]");
        let errors = extract(&module).unwrap_err();
        assert_eq!(errors.len(), 1);
        match &errors[0] {
            CompileError::RepeatedVariable {
                first, second, line, ..
            } => {
                assert_eq!(first, "entero");
                assert_eq!(second, "real[2]");
                assert_eq!(*line, 2);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
