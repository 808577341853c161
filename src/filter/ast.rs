use std::sync::Arc;

use crate::domain::Pilot;

use super::error::CompileError;

pub type EvalFn = Arc<dyn Fn(&Pilot) -> bool + Send + Sync>;
pub type CompileFn<'a> = dyn Fn(Condition) -> Result<EvalFn, CompileError> + 'a;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
  Equals,
  NotEquals,
  Matches,
  NotMatches,
  Less,
  Greater,
  LessOrEqual,
  GreaterOrEqual,
}

#[derive(Debug, Clone)]
pub enum Value {
  Integer(i64),
  Float(f64),
  Str(String),
}

impl Value {
  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Value::Integer(i) => Some(*i as f64),
      Value::Float(f) => Some(*f),
      Value::Str(_) => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::Str(s) => Some(s),
      _ => None,
    }
  }
}

#[derive(Debug, Clone)]
pub struct Condition {
  pub field: String,
  pub operator: Operator,
  pub value: Value,
}

#[derive(Debug, Clone, Copy)]
pub enum CombineOperator {
  And,
  Or,
}

/// Parsed filter query, two-phase: `parse` builds this tree with raw
/// `Condition` leaves; `compile` walks it once, replacing every condition
/// with a closure over `Pilot` (and, for regex operators, a precompiled
/// `Regex` so an invalid pattern surfaces here rather than on first
/// evaluation). `evaluate` then just walks compiled closures.
pub enum Node {
  Condition(Condition),
  Not(Box<Node>),
  Group(Box<Node>),
  Combine(Box<Node>, CombineOperator, Box<Node>),
  Compiled(EvalFn),
}

impl Node {
  pub fn compile(self, cb: &CompileFn) -> Result<Node, CompileError> {
    match self {
      Node::Condition(c) => Ok(Node::Compiled(cb(c)?)),
      Node::Not(inner) => Ok(Node::Not(Box::new(inner.compile(cb)?))),
      Node::Group(inner) => Ok(Node::Group(Box::new(inner.compile(cb)?))),
      Node::Combine(l, op, r) => Ok(Node::Combine(
        Box::new(l.compile(cb)?),
        op,
        Box::new(r.compile(cb)?),
      )),
      Node::Compiled(f) => Ok(Node::Compiled(f)),
    }
  }

  pub fn evaluate(&self, pilot: &Pilot) -> bool {
    match self {
      Node::Compiled(f) => f(pilot),
      Node::Not(inner) => !inner.evaluate(pilot),
      Node::Group(inner) => inner.evaluate(pilot),
      Node::Combine(l, CombineOperator::And, r) => l.evaluate(pilot) && r.evaluate(pilot),
      Node::Combine(l, CombineOperator::Or, r) => l.evaluate(pilot) || r.evaluate(pilot),
      Node::Condition(_) => unreachable!("evaluate called on an uncompiled node"),
    }
  }
}
