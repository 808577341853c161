pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod token;

use std::sync::Arc;

use regex::Regex;

use crate::domain::pilot::normalise_flight_rules;
use crate::domain::{FlightPlan, Object, Pilot};
use crate::geoidx::Filter;

use ast::{Condition, EvalFn, Operator, Value};
use error::{CompileError, FilterCompileError};

/// Compiles a query string (§4.3) into a predicate over index objects. Only
/// `Pilot` payloads can match; everything else evaluates to `false`.
pub fn compile_pilot_filter(query: &str) -> Result<Filter, FilterCompileError> {
  let tokens = lexer::Lexer::new(query).parse()?;
  let tree = parser::parse(&tokens)?;
  let compiled = tree.compile(&compile_condition)?;
  Ok(Arc::new(move |obj: &Object| match obj.as_pilot() {
    Some(p) => compiled.evaluate(p),
    None => false,
  }))
}

fn compile_condition(c: Condition) -> Result<EvalFn, CompileError> {
  match c.field.to_ascii_lowercase().as_str() {
    "callsign" => string_field(c, |p: &Pilot| p.callsign.clone()),
    "name" => string_field(c, |p: &Pilot| p.name.clone()),
    "aircraft" => fp_string_field(c, |fp: &FlightPlan| fp.aircraft.clone()),
    "departure" => fp_string_field(c, |fp: &FlightPlan| fp.departure.clone()),
    "arrival" => fp_string_field(c, |fp: &FlightPlan| fp.arrival.clone()),
    "alt" => numeric_field(c, |p: &Pilot| p.altitude as f64),
    "gs" => numeric_field(c, |p: &Pilot| p.groundspeed as f64),
    "lat" => numeric_field(c, |p: &Pilot| p.position.lat),
    "lng" => numeric_field(c, |p: &Pilot| p.position.lng),
    "rules" => rules_field(c),
    other => Err(CompileError::UnknownField(other.to_owned())),
  }
}

fn string_field(
  c: Condition,
  accessor: impl Fn(&Pilot) -> String + Send + Sync + 'static,
) -> Result<EvalFn, CompileError> {
  build_string_eval(c, move |p| Some(accessor(p)))
}

fn fp_string_field(
  c: Condition,
  accessor: impl Fn(&FlightPlan) -> String + Send + Sync + 'static,
) -> Result<EvalFn, CompileError> {
  build_string_eval(c, move |p: &Pilot| p.flight_plan.as_ref().map(&accessor))
}

fn build_string_eval(
  c: Condition,
  get: impl Fn(&Pilot) -> Option<String> + Send + Sync + 'static,
) -> Result<EvalFn, CompileError> {
  let Condition {
    field,
    operator,
    value,
  } = c;
  let want = value.as_str().ok_or_else(|| CompileError::TypeMismatch {
    field: field.clone(),
    expected: "string".to_owned(),
  })?.to_owned();

  match operator {
    Operator::Equals => Ok(Arc::new(move |p: &Pilot| {
      get(p).map(|v| v == want).unwrap_or(false)
    })),
    Operator::NotEquals => Ok(Arc::new(move |p: &Pilot| {
      get(p).map(|v| v != want).unwrap_or(false)
    })),
    Operator::Matches | Operator::NotMatches => {
      let re = Regex::new(&want).map_err(|source| CompileError::InvalidRegex {
        field: field.clone(),
        pattern: want.clone(),
        source,
      })?;
      let negate = operator == Operator::NotMatches;
      Ok(Arc::new(move |p: &Pilot| {
        get(p).map(|v| re.is_match(&v) != negate).unwrap_or(false)
      }))
    }
    _ => Err(CompileError::TypeMismatch {
      field,
      expected: "=, !=, ~ or !~".to_owned(),
    }),
  }
}

fn numeric_field(
  c: Condition,
  accessor: impl Fn(&Pilot) -> f64 + Send + Sync + 'static,
) -> Result<EvalFn, CompileError> {
  let Condition {
    field,
    operator,
    value,
  } = c;
  let want = value.as_f64().ok_or_else(|| CompileError::TypeMismatch {
    field: field.clone(),
    expected: "number".to_owned(),
  })?;
  let cmp: fn(f64, f64) -> bool = match operator {
    Operator::Equals => |a, b| a == b,
    Operator::NotEquals => |a, b| a != b,
    Operator::Less => |a, b| a < b,
    Operator::Greater => |a, b| a > b,
    Operator::LessOrEqual => |a, b| a <= b,
    Operator::GreaterOrEqual => |a, b| a >= b,
    Operator::Matches | Operator::NotMatches => {
      return Err(CompileError::TypeMismatch {
        field,
        expected: "=,!=,<,<=,>,>=".to_owned(),
      })
    }
  };
  Ok(Arc::new(move |p: &Pilot| cmp(accessor(p), want)))
}

fn rules_field(c: Condition) -> Result<EvalFn, CompileError> {
  if !matches!(c.operator, Operator::Equals | Operator::NotEquals) {
    return Err(CompileError::TypeMismatch {
      field: "rules".to_owned(),
      expected: "= or !=".to_owned(),
    });
  }
  let raw = c.value.as_str().ok_or_else(|| CompileError::TypeMismatch {
    field: "rules".to_owned(),
    expected: "string".to_owned(),
  })?;
  let want = normalise_flight_rules(raw).ok_or_else(|| CompileError::InvalidRulesValue(raw.to_owned()))?;
  let negate = matches!(c.operator, Operator::NotEquals);
  Ok(Arc::new(move |p: &Pilot| match &p.flight_plan {
    Some(fp) => (fp.flight_rules == want) != negate,
    None => false,
  }))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Airport, FlightPlan};
  use crate::types::Point;

  fn pilot(callsign: &str, altitude: i32, rules: Option<&str>) -> Pilot {
    Pilot {
      cid: 1,
      name: "Test Pilot".into(),
      callsign: callsign.into(),
      server: "S1".into(),
      pilot_rating: 1,
      position: Point { lat: 10.0, lng: 20.0 },
      altitude,
      groundspeed: 250,
      heading: 90,
      transponder: "2000".into(),
      qnh_i_hg: 2992,
      qnh_mb: 1013,
      flight_plan: rules.map(|r| FlightPlan {
        flight_rules: r.to_owned(),
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

  #[test]
  fn test_callsign_equals() {
    let f = compile_pilot_filter("callsign = \"ABC123\"").unwrap();
    assert!(f(&Object::Pilot(pilot("ABC123", 10000, None))));
    assert!(!f(&Object::Pilot(pilot("XYZ999", 10000, None))));
  }

  #[test]
  fn test_alt_and_rules() {
    let f = compile_pilot_filter("alt >= 30000 and rules = IFR").unwrap();
    assert!(f(&Object::Pilot(pilot("A1", 35000, Some("I")))));
    assert!(!f(&Object::Pilot(pilot("A2", 35000, Some("V")))));
    assert!(!f(&Object::Pilot(pilot("A3", 35000, None))));
    assert!(!f(&Object::Pilot(pilot("A4", 10000, Some("I")))));
  }

  #[test]
  fn test_non_pilot_never_matches() {
    let f = compile_pilot_filter("callsign = \"ABC123\"").unwrap();
    let airport = Airport {
      icao: "EGLL".into(),
      iata: "LHR".into(),
      name: "Heathrow".into(),
      country: "UK".into(),
      position: Point { lat: 51.47, lng: -0.45 },
      is_controlled: true,
    };
    assert!(!f(&Object::Airport(airport)));
  }

  #[test]
  fn test_invalid_regex_is_compile_error() {
    let err = compile_pilot_filter("aircraft ~ \"(\"").err().unwrap();
    assert!(matches!(err, FilterCompileError::Compile(CompileError::InvalidRegex { .. })));
  }

  #[test]
  fn test_not_combinator() {
    let f = compile_pilot_filter("not callsign = \"ABC123\"").unwrap();
    assert!(!f(&Object::Pilot(pilot("ABC123", 10000, None))));
    assert!(f(&Object::Pilot(pilot("XYZ999", 10000, None))));
  }

  #[test]
  fn test_regex_callsign_prefix() {
    let f = compile_pilot_filter("callsign ~ \"^BA\"").unwrap();
    assert!(f(&Object::Pilot(pilot("BA123", 10000, None))));
    assert!(!f(&Object::Pilot(pilot("LH123", 10000, None))));
  }
}
