use std::fmt;
use std::sync::Arc;

use crate::error::ComputationError;

/// Lambda term. Children are shared so closures can point into a term
/// without copying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Var(String),
    App(Arc<Term>, Arc<Term>),
    Abs(String, Arc<Term>),
}

impl Term {
    pub fn var(name: impl Into<String>) -> Self {
        Term::Var(name.into())
    }

    pub fn app(function: Term, argument: Term) -> Self {
        Term::App(Arc::new(function), Arc::new(argument))
    }

    pub fn abs(param: impl Into<String>, body: Term) -> Self {
        Term::Abs(param.into(), Arc::new(body))
    }

    pub fn is_abstraction(&self) -> bool {
        matches!(self, Term::Abs(..))
    }
}

/// Unbound variables that look like names refer to data elsewhere in the network
pub fn is_external(name: &str) -> bool {
    name.starts_with('/')
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Var(name) => f.write_str(name),
            Term::Abs(param, body) => write!(f, "\\{}.{}", param, body),
            Term::App(function, argument) => {
                if function.is_abstraction() {
                    write!(f, "({})", function)?;
                } else {
                    write!(f, "{}", function)?;
                }
                match argument.as_ref() {
                    Term::Var(_) => write!(f, " {}", argument),
                    _ => write!(f, " ({})", argument),
                }
            }
        }
    }
}

/// Deepest term the parser builds and readback produces
pub const MAX_TERM_DEPTH: usize = 512;

/// Parse an expression.
///
/// Abstractions are written `\x.M`, `λx.M` or `@x M` and extend as far
/// right as possible. Application is juxtaposition and associates to the
/// left. Any run of characters other than whitespace and parentheses is a
/// variable. Terms deeper than [`MAX_TERM_DEPTH`] are rejected.
pub fn parse_term(input: &str) -> Result<Term, ComputationError> {
    let mut parser = Parser {
        input,
        pos: 0,
        nesting: 0,
    };
    let (term, _) = parser.application()?;
    parser.skip_whitespace();
    match parser.peek() {
        None => Ok(term),
        Some(c) => Err(ComputationError::UnexpectedToken {
            token: c.to_string(),
            offset: parser.pos,
        }),
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    nesting: usize,
}

fn bounded(depth: usize) -> Result<usize, ComputationError> {
    if depth > MAX_TERM_DEPTH {
        Err(ComputationError::TooDeep(MAX_TERM_DEPTH))
    } else {
        Ok(depth)
    }
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn word(&mut self, stop: impl Fn(char) -> bool) -> &str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == '(' || c == ')' || stop(c) {
                break;
            }
            self.bump();
        }
        &self.input[start..self.pos]
    }

    // Returns the term together with its depth.
    fn application(&mut self) -> Result<(Term, usize), ComputationError> {
        self.nesting = bounded(self.nesting + 1)?;
        let mut term: Option<(Term, usize)> = None;
        loop {
            self.skip_whitespace();
            match self.peek() {
                None | Some(')') => break,
                Some(_) => {
                    let (atom, atom_depth) = self.atom()?;
                    term = Some(match term {
                        None => (atom, atom_depth),
                        Some((function, depth)) => {
                            let depth = bounded(depth.max(atom_depth) + 1)?;
                            (Term::app(function, atom), depth)
                        }
                    });
                }
            }
        }
        self.nesting -= 1;
        term.ok_or_else(|| ComputationError::Parse(format!("expected a term at offset {}", self.pos)))
    }

    fn atom(&mut self) -> Result<(Term, usize), ComputationError> {
        match self.peek() {
            Some('(') => {
                self.bump();
                let inner = self.application()?;
                match self.bump() {
                    Some(')') => Ok(inner),
                    _ => Err(ComputationError::Parse("unclosed parenthesis".to_string())),
                }
            }
            Some('\\') | Some('λ') => {
                self.bump();
                let param = self.binder(|c| c == '.')?;
                match self.bump() {
                    Some('.') => {}
                    other => {
                        return Err(ComputationError::UnexpectedToken {
                            token: other.map(String::from).unwrap_or_default(),
                            offset: self.pos,
                        })
                    }
                }
                self.abstraction(param)
            }
            Some('@') => {
                self.bump();
                let param = self.binder(|_| false)?;
                self.abstraction(param)
            }
            _ => Ok((Term::var(self.word(|_| false)), 1)),
        }
    }

    fn abstraction(&mut self, param: String) -> Result<(Term, usize), ComputationError> {
        let (body, depth) = self.application()?;
        Ok((Term::abs(param, body), bounded(depth + 1)?))
    }

    fn binder(&mut self, stop: impl Fn(char) -> bool) -> Result<String, ComputationError> {
        let offset = self.pos;
        let name = self.word(stop).to_string();
        if name.is_empty() {
            return Err(ComputationError::UnexpectedToken {
                token: self.peek().map(String::from).unwrap_or_default(),
                offset,
            });
        }
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_is_left_associative() {
        let term = parse_term("f a b").unwrap();
        let expected = Term::app(Term::app(Term::var("f"), Term::var("a")), Term::var("b"));
        assert_eq!(term, expected);
    }

    #[test]
    fn test_lambda_forms_agree() {
        let expected = Term::abs("x", Term::app(Term::var("x"), Term::var("y")));
        assert_eq!(parse_term("\\x.x y").unwrap(), expected);
        assert_eq!(parse_term("λx.x y").unwrap(), expected);
        assert_eq!(parse_term("@x x y").unwrap(), expected);
    }

    #[test]
    fn test_parentheses_and_names() {
        let term = parse_term("(\\x.x) /data/file.txt").unwrap();
        let expected = Term::app(Term::abs("x", Term::var("x")), Term::var("/data/file.txt"));
        assert_eq!(term, expected);
        assert!(is_external("/data/file.txt"));
        assert!(!is_external("42"));
    }

    #[test]
    fn test_display_reparses() {
        for source in ["(\\x.x) 42", "\\f.\\x.f (f x)", "a (b c) d", "(\\x.x x) (\\y.y)"] {
            let term = parse_term(source).unwrap();
            assert_eq!(parse_term(&term.to_string()).unwrap(), term, "{}", source);
        }
        assert_eq!(parse_term("(\\x.x) 42").unwrap().to_string(), "(\\x.x) 42");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_term(""), Err(ComputationError::Parse(_))));
        assert!(matches!(parse_term("(a b"), Err(ComputationError::Parse(_))));
        assert!(matches!(parse_term("a b)"), Err(ComputationError::UnexpectedToken { .. })));
        assert!(matches!(parse_term("\\.x"), Err(ComputationError::UnexpectedToken { .. })));
        assert!(matches!(parse_term("\\x x"), Err(ComputationError::UnexpectedToken { .. })));
    }

    #[test]
    fn test_depth_limit() {
        let nested = format!("{}x{}", "(".repeat(8000), ")".repeat(8000));
        assert_eq!(parse_term(&nested), Err(ComputationError::TooDeep(MAX_TERM_DEPTH)));
        let unclosed = "(".repeat(8000);
        assert_eq!(parse_term(&unclosed), Err(ComputationError::TooDeep(MAX_TERM_DEPTH)));
        let lambdas = "@x ".repeat(4000) + "x";
        assert_eq!(parse_term(&lambdas), Err(ComputationError::TooDeep(MAX_TERM_DEPTH)));
        let chain = vec!["a"; 4000].join(" ");
        assert_eq!(parse_term(&chain), Err(ComputationError::TooDeep(MAX_TERM_DEPTH)));

        let shallow = format!("{}x{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(parse_term(&shallow).unwrap(), Term::var("x"));
    }
}
