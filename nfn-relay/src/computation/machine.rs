//! Call-by-name Krivine machine.
//!
//! State is `<term, environment, stack>`. Transitions:
//!
//! 1. `<M N, e, s>` pushes the closure `(N, e)` and continues with `M`.
//! 2. `<\x.M, e, c::s>` binds `x` to `c` and continues with `M`.
//! 3. `<x, e, s>` continues with the closure bound to `x`. An unbound name
//!    starting with `/` suspends the machine until its data is supplied
//!    through [`Machine::resume`]; any other unbound name is a literal.
//! 4. `<\x.M, e, []>` is in normal form.
//!
//! Only rules 1 and 2 count as transitions; variable lookups are counted
//! separately.

use std::collections::HashMap;
use std::sync::Arc;

use crate::computation::term::{is_external, parse_term, Term, MAX_TERM_DEPTH};
use crate::error::ComputationError;

/// Term paired with the environment it must be evaluated in
#[derive(Debug, Clone)]
pub struct Closure {
    pub term: Arc<Term>,
    pub env: Environment,
}

/// Persistent variable bindings. Extending an environment never changes
/// the closures already holding it.
#[derive(Debug, Clone, Default)]
pub struct Environment(Option<Arc<Binding>>);

#[derive(Debug)]
struct Binding {
    name: String,
    value: Closure,
    next: Environment,
}

impl Environment {
    pub fn bind(&self, name: String, value: Closure) -> Self {
        Environment(Some(Arc::new(Binding {
            name,
            value,
            next: self.clone(),
        })))
    }

    pub fn lookup(&self, name: &str) -> Option<&Closure> {
        let mut current = &self.0;
        while let Some(binding) = current {
            if binding.name == name {
                return Some(&binding.value);
            }
            current = &binding.next.0;
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

impl Drop for Environment {
    // Unlink iteratively so long chains do not overflow the stack.
    fn drop(&mut self) {
        let mut current = self.0.take();
        while let Some(binding) = current {
            match Arc::try_unwrap(binding) {
                Ok(mut binding) => current = binding.next.0.take(),
                Err(_) => break,
            }
        }
    }
}

/// Data obtained for an external name
#[derive(Debug, Clone)]
enum Resolved {
    Code(Arc<Term>),
    Data(Vec<u8>),
}

/// Normal form reached by the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Abstraction with its environment substituted in
    Function(Term),
    /// Unbound, non-external variable
    Literal(String),
    /// Opaque payload fetched for an external name
    Data(Vec<u8>),
}

impl Value {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Value::Function(term) => term.to_string().into_bytes(),
            Value::Literal(text) => text.into_bytes(),
            Value::Data(bytes) => bytes,
        }
    }
}

/// Result of a single transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Continue,
    Done(Value),
    /// Waiting for the data named by the external reference
    Suspend(String),
}

/// Result of running until the machine stops
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done(Value),
    Suspended(String),
}

#[derive(Debug, Clone)]
pub struct Machine {
    term: Arc<Term>,
    env: Environment,
    stack: Vec<Closure>,
    externals: HashMap<String, Resolved>,
    awaiting: Option<String>,
    transitions: u64,
    lookups: u64,
}

impl Machine {
    pub fn new(term: Term) -> Self {
        Self {
            term: Arc::new(term),
            env: Environment::default(),
            stack: Vec::new(),
            externals: HashMap::new(),
            awaiting: None,
            transitions: 0,
            lookups: 0,
        }
    }

    /// Rule 1 and rule 2 transitions taken so far
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Rule 3 variable resolutions taken so far
    pub fn lookups(&self) -> u64 {
        self.lookups
    }

    /// External name the machine is suspended on
    pub fn awaiting(&self) -> Option<&str> {
        self.awaiting.as_deref()
    }

    pub fn step(&mut self) -> Result<Step, ComputationError> {
        if let Some(name) = &self.awaiting {
            return Ok(Step::Suspend(name.clone()));
        }

        let term = Arc::clone(&self.term);
        match term.as_ref() {
            Term::App(function, argument) => {
                self.stack.push(Closure {
                    term: Arc::clone(argument),
                    env: self.env.clone(),
                });
                self.term = Arc::clone(function);
                self.transitions += 1;
                Ok(Step::Continue)
            }
            Term::Abs(param, body) => match self.stack.pop() {
                Some(argument) => {
                    self.env = self.env.bind(param.clone(), argument);
                    self.term = Arc::clone(body);
                    self.transitions += 1;
                    Ok(Step::Continue)
                }
                None => Ok(Step::Done(Value::Function(readback(&term, &self.env)?))),
            },
            Term::Var(name) => {
                if let Some(closure) = self.env.lookup(name).cloned() {
                    self.term = closure.term;
                    self.env = closure.env;
                    self.lookups += 1;
                    return Ok(Step::Continue);
                }
                match self.externals.get(name) {
                    Some(Resolved::Code(code)) => {
                        self.term = Arc::clone(code);
                        self.env = Environment::default();
                        self.lookups += 1;
                        Ok(Step::Continue)
                    }
                    Some(Resolved::Data(bytes)) => self.finish(name, Value::Data(bytes.clone())),
                    None if is_external(name) => {
                        self.awaiting = Some(name.clone());
                        Ok(Step::Suspend(name.clone()))
                    }
                    None => self.finish(name, Value::Literal(name.clone())),
                }
            }
        }
    }

    fn finish(&self, name: &str, value: Value) -> Result<Step, ComputationError> {
        if self.stack.is_empty() {
            Ok(Step::Done(value))
        } else {
            Err(ComputationError::StuckTerm(name.to_string()))
        }
    }

    /// Step until the machine finishes or suspends, failing once more than
    /// `limit` steps have been taken in total
    pub fn run(&mut self, limit: u64) -> Result<Outcome, ComputationError> {
        loop {
            match self.step()? {
                Step::Continue => {
                    if self.transitions + self.lookups > limit {
                        return Err(ComputationError::StepLimit(limit));
                    }
                }
                Step::Done(value) => return Ok(Outcome::Done(value)),
                Step::Suspend(name) => return Ok(Outcome::Suspended(name)),
            }
        }
    }

    /// Supply the data for the external name the machine is waiting on.
    /// A payload that parses to an abstraction is used as code, anything
    /// else as an opaque value.
    pub fn resume(&mut self, payload: &[u8]) -> Result<(), ComputationError> {
        let name = self.awaiting.take().ok_or(ComputationError::NotSuspended)?;
        let code = std::str::from_utf8(payload)
            .ok()
            .and_then(|text| parse_term(text).ok())
            .filter(Term::is_abstraction);
        let resolved = match code {
            Some(term) => Resolved::Code(Arc::new(term)),
            None => Resolved::Data(payload.to_vec()),
        };
        self.externals.insert(name, resolved);
        Ok(())
    }
}

/// Close a term over its environment so it can be printed on its own.
/// Fails if the closed term would be deeper than [`MAX_TERM_DEPTH`].
fn readback(term: &Term, env: &Environment) -> Result<Term, ComputationError> {
    let mut fresh = 0;
    let closed = substitute(term, env, &[], 1, &mut fresh)?;
    Ok(rename(&closed, &mut Vec::new()))
}

// Binders get unique `name#n` placeholders so substituted terms cannot be
// captured; `rename` turns them back into readable names.
fn substitute(
    term: &Term,
    env: &Environment,
    scope: &[(String, String)],
    depth: usize,
    fresh: &mut u64,
) -> Result<Term, ComputationError> {
    if depth > MAX_TERM_DEPTH {
        return Err(ComputationError::TooDeep(MAX_TERM_DEPTH));
    }
    match term {
        Term::Var(name) => {
            if let Some((_, unique)) = scope.iter().rev().find(|(original, _)| original == name) {
                return Ok(Term::Var(unique.clone()));
            }
            let Some(mut closure) = env.lookup(name) else {
                return Ok(Term::Var(name.clone()));
            };
            // follow variable-to-variable bindings in a loop
            loop {
                match closure.term.as_ref() {
                    Term::Var(next) => match closure.env.lookup(next) {
                        Some(bound) => closure = bound,
                        None => return Ok(Term::Var(next.clone())),
                    },
                    _ => return substitute(&closure.term, &closure.env, &[], depth, fresh),
                }
            }
        }
        Term::App(function, argument) => Ok(Term::app(
            substitute(function, env, scope, depth + 1, fresh)?,
            substitute(argument, env, scope, depth + 1, fresh)?,
        )),
        Term::Abs(param, body) => {
            let unique = format!("{}#{}", param, fresh);
            *fresh += 1;
            let mut inner = scope.to_vec();
            inner.push((param.clone(), unique.clone()));
            Ok(Term::abs(unique, substitute(body, env, &inner, depth + 1, fresh)?))
        }
    }
}

fn rename(term: &Term, names: &mut Vec<(String, String)>) -> Term {
    match term {
        Term::Var(name) => Term::Var(display_name(name, names)),
        Term::App(function, argument) => Term::app(rename(function, names), rename(argument, names)),
        Term::Abs(unique, body) => {
            let mut free = Vec::new();
            free_vars(body, &mut vec![unique.clone()], &mut free);
            let taken: Vec<String> = free.iter().map(|v| display_name(v, names)).collect();

            let base = unique.split('#').next().unwrap_or(unique).to_string();
            let mut chosen = base;
            while taken.contains(&chosen) {
                chosen.push('\'');
            }

            names.push((unique.clone(), chosen.clone()));
            let body = rename(body, names);
            names.pop();
            Term::abs(chosen, body)
        }
    }
}

fn display_name(name: &str, names: &[(String, String)]) -> String {
    names
        .iter()
        .rev()
        .find(|(unique, _)| unique == name)
        .map(|(_, shown)| shown.clone())
        .unwrap_or_else(|| name.to_string())
}

fn free_vars(term: &Term, bound: &mut Vec<String>, out: &mut Vec<String>) {
    match term {
        Term::Var(name) => {
            if !bound.contains(name) && !out.contains(name) {
                out.push(name.clone());
            }
        }
        Term::App(function, argument) => {
            free_vars(function, bound, out);
            free_vars(argument, bound, out);
        }
        Term::Abs(param, body) => {
            bound.push(param.clone());
            free_vars(body, bound, out);
            bound.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(source: &str) -> Machine {
        Machine::new(parse_term(source).unwrap())
    }

    #[test]
    fn test_identity_takes_two_transitions() {
        let mut m = machine("(\\x.x) 42");
        assert_eq!(m.step().unwrap(), Step::Continue);
        assert_eq!(m.step().unwrap(), Step::Continue);
        assert_eq!(m.transitions(), 2);
        assert_eq!(m.run(100).unwrap(), Outcome::Done(Value::Literal("42".to_string())));
        assert_eq!(m.transitions(), 2);
        assert_eq!(m.lookups(), 1);
    }

    #[test]
    fn test_call_by_name_discards_unused_argument() {
        let mut m = machine("(\\x.\\y.x) a /never/fetched");
        assert_eq!(m.run(100).unwrap(), Outcome::Done(Value::Literal("a".to_string())));
    }

    #[test]
    fn test_abstraction_result_is_closed() {
        let mut m = machine("(\\x.\\y.x) a");
        let Outcome::Done(value) = m.run(100).unwrap() else {
            panic!("expected a value");
        };
        assert_eq!(value.into_bytes(), b"\\y.a".to_vec());
    }

    #[test]
    fn test_readback_avoids_capture() {
        let mut m = machine("(\\x.\\y.x) y");
        let Outcome::Done(value) = m.run(100).unwrap() else {
            panic!("expected a value");
        };
        assert_eq!(value, Value::Function(Term::abs("y'", Term::var("y"))));
    }

    #[test]
    fn test_suspends_on_external_data() {
        let mut m = machine("(\\x.x) /data/item");
        assert_eq!(m.run(100).unwrap(), Outcome::Suspended("/data/item".to_string()));
        assert_eq!(m.awaiting(), Some("/data/item"));
        // stays suspended until data arrives
        assert_eq!(m.step().unwrap(), Step::Suspend("/data/item".to_string()));

        m.resume(b"hello").unwrap();
        assert_eq!(m.run(100).unwrap(), Outcome::Done(Value::Data(b"hello".to_vec())));
        assert!(matches!(m.resume(b"again"), Err(ComputationError::NotSuspended)));
    }

    #[test]
    fn test_fetched_abstraction_is_code() {
        let mut m = machine("/lib/id 7");
        assert_eq!(m.run(100).unwrap(), Outcome::Suspended("/lib/id".to_string()));
        m.resume(b"\\y.y").unwrap();
        assert_eq!(m.run(100).unwrap(), Outcome::Done(Value::Literal("7".to_string())));
    }

    #[test]
    fn test_applying_a_literal_is_stuck() {
        let mut m = machine("foo bar");
        assert!(matches!(m.run(100), Err(ComputationError::StuckTerm(name)) if name == "foo"));
    }

    #[test]
    fn test_step_limit() {
        let mut m = machine("(\\x.x x) (\\x.x x)");
        assert!(matches!(m.run(1000), Err(ComputationError::StepLimit(1000))));
    }

    #[test]
    fn test_readback_depth_is_bounded() {
        // each binding wraps the previous term in one more application
        let mut env = Environment::default();
        let mut term = Term::var("v0");
        for i in 1..=MAX_TERM_DEPTH {
            let previous = format!("v{}", i - 1);
            env = env.bind(
                previous.clone(),
                Closure {
                    term: Arc::new(term),
                    env: env.clone(),
                },
            );
            term = Term::app(Term::var(previous), Term::var("z"));
        }
        let body = Term::abs("z", term);
        assert_eq!(readback(&body, &env), Err(ComputationError::TooDeep(MAX_TERM_DEPTH)));
        assert!(readback(&Term::abs("z", Term::var("v0")), &env).is_ok());
    }

    #[test]
    fn test_long_environment_drops() {
        let mut env = Environment::default();
        let closure = Closure {
            term: Arc::new(Term::var("v")),
            env: Environment::default(),
        };
        for i in 0..200_000 {
            env = env.bind(format!("x{}", i), closure.clone());
        }
        assert!(env.lookup("x0").is_some());
        drop(env);
    }
}
