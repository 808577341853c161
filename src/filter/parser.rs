use super::ast::{CombineOperator, Condition, Node, Operator, Value};
use super::error::ParseError;
use super::token::{Token, TokenFlow, TokenKind};

pub fn parse(tokens: &[Token]) -> Result<Node, ParseError> {
  let mut tf = TokenFlow::new(tokens);
  let expr = parse_expression(&mut tf)?;
  if tf.current().kind != TokenKind::EOF {
    return Err(unexpected(&tf, "end of expression"));
  }
  Ok(expr)
}

fn parse_expression(tf: &mut TokenFlow) -> Result<Node, ParseError> {
  let left = parse_unary(tf)?;
  match tf.current().kind {
    TokenKind::And => {
      tf.advance();
      let right = parse_expression(tf)?;
      Ok(Node::Combine(Box::new(left), CombineOperator::And, Box::new(right)))
    }
    TokenKind::Or => {
      tf.advance();
      let right = parse_expression(tf)?;
      Ok(Node::Combine(Box::new(left), CombineOperator::Or, Box::new(right)))
    }
    _ => Ok(left),
  }
}

fn parse_unary(tf: &mut TokenFlow) -> Result<Node, ParseError> {
  match tf.current().kind {
    TokenKind::Not => {
      tf.advance();
      let inner = parse_unary(tf)?;
      Ok(Node::Not(Box::new(inner)))
    }
    TokenKind::LeftParen => {
      tf.advance();
      let inner = parse_expression(tf)?;
      if tf.current().kind != TokenKind::RightParen {
        return Err(unexpected(tf, ")"));
      }
      tf.advance();
      Ok(Node::Group(Box::new(inner)))
    }
    TokenKind::Ident => Ok(Node::Condition(parse_condition(tf)?)),
    _ => Err(unexpected(tf, "identifier, ( or not")),
  }
}

fn parse_condition(tf: &mut TokenFlow) -> Result<Condition, ParseError> {
  let field = tf.current().src.clone();
  tf.advance();
  let operator = parse_operator(tf)?;
  let value = parse_value(tf)?;

  if matches!(operator, Operator::Matches | Operator::NotMatches) && value.as_str().is_none() {
    return Err(ParseError::InvalidValueType { field });
  }

  Ok(Condition {
    field,
    operator,
    value,
  })
}

fn parse_operator(tf: &mut TokenFlow) -> Result<Operator, ParseError> {
  let op = match tf.current().kind {
    TokenKind::Equals => Operator::Equals,
    TokenKind::NotEquals => Operator::NotEquals,
    TokenKind::Matches => Operator::Matches,
    TokenKind::NotMatches => Operator::NotMatches,
    TokenKind::Less => Operator::Less,
    TokenKind::Greater => Operator::Greater,
    TokenKind::LessOrEqual => Operator::LessOrEqual,
    TokenKind::GreaterOrEqual => Operator::GreaterOrEqual,
    _ => return Err(unexpected(tf, "an operator")),
  };
  tf.advance();
  Ok(op)
}

fn parse_value(tf: &mut TokenFlow) -> Result<Value, ParseError> {
  let tok = tf.current().clone();
  let value = match tok.kind {
    TokenKind::Integer => Value::Integer(tok.src.parse().map_err(|_| ParseError::UnexpectedToken {
      expected: "integer".to_owned(),
      found: tok.src.clone(),
      line: tok.line,
      pos: tok.pos,
    })?),
    TokenKind::Float => Value::Float(tok.src.parse().map_err(|_| ParseError::UnexpectedToken {
      expected: "float".to_owned(),
      found: tok.src.clone(),
      line: tok.line,
      pos: tok.pos,
    })?),
    TokenKind::String => Value::Str(tok.src),
    _ => return Err(unexpected(tf, "a value")),
  };
  tf.advance();
  Ok(value)
}

fn unexpected(tf: &TokenFlow, expected: &str) -> ParseError {
  let tok = tf.current();
  if tok.kind == TokenKind::EOF {
    ParseError::UnexpectedEOF
  } else {
    ParseError::UnexpectedToken {
      expected: expected.to_owned(),
      found: tok.src.clone(),
      line: tok.line,
      pos: tok.pos,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{FlightPlan, Pilot};
  use crate::filter::error::CompileError;
  use crate::filter::ast::EvalFn;
  use std::sync::Arc;

  fn compile_test(node: Node) -> Node {
    node
      .compile(&|c: Condition| -> Result<EvalFn, CompileError> {
        let field = c.field.clone();
        match field.as_str() {
          "x" => {
            let want = c.value.as_f64().unwrap();
            Ok(match c.operator {
              Operator::Greater => Arc::new(move |_: &Pilot| want < 5.0),
              _ => Arc::new(|_: &Pilot| true),
            })
          }
          _ => Ok(Arc::new(|_: &Pilot| false)),
        }
      })
      .unwrap()
  }

  #[test]
  fn test_not() {
    let tokens = super::super::lexer::Lexer::new("not (x > 5)").parse().unwrap();
    let node = parse(&tokens).unwrap();
    let compiled = compile_test(node);
    let pilot = sample_pilot();
    // inner closure always evaluates to `want < 5.0` = true regardless of pilot,
    // so `not` must flip it to false.
    assert!(!compiled.evaluate(&pilot));
  }

  fn sample_pilot() -> Pilot {
    Pilot {
      cid: 1,
      name: "Test".into(),
      callsign: "ABC123".into(),
      server: "S".into(),
      pilot_rating: 1,
      position: crate::types::Point { lat: 0.0, lng: 0.0 },
      altitude: 35000,
      groundspeed: 400,
      heading: 90,
      transponder: "2000".into(),
      qnh_i_hg: 2992,
      qnh_mb: 1013,
      flight_plan: Some(FlightPlan {
        flight_rules: "I".into(),
        aircraft: "B738".into(),
        departure: "EGLL".into(),
        arrival: "EDDF".into(),
        alternate: "".into(),
        cruise_tas: 450,
        altitude: 35000,
        deptime: "".into(),
        enroute_time: "".into(),
        fuel_time: "".into(),
        remarks: "".into(),
        route: "".into(),
      }),
      logon_time: chrono::Utc::now(),
      last_updated: chrono::Utc::now(),
    }
  }
}
