use std::iter::Peekable;
use std::str::Chars;

use super::error::ParseError;
use super::token::{Token, TokenKind};

struct StringReader<'a> {
  chars: Peekable<Chars<'a>>,
  curr: Option<char>,
  line: usize,
  pos: usize,
}

impl<'a> StringReader<'a> {
  fn new(src: &'a str) -> Self {
    let mut chars = src.chars().peekable();
    let curr = chars.next();
    Self {
      chars,
      curr,
      line: 1,
      pos: 0,
    }
  }

  fn peek(&mut self) -> Option<char> {
    self.chars.peek().copied()
  }

  fn advance(&mut self) {
    if self.curr == Some('\n') {
      self.line += 1;
      self.pos = 0;
    } else {
      self.pos += 1;
    }
    self.curr = self.chars.next();
  }
}

pub struct Lexer<'a> {
  r: StringReader<'a>,
}

impl<'a> Lexer<'a> {
  pub fn new(query: &'a str) -> Self {
    Self {
      r: StringReader::new(query),
    }
  }

  pub fn parse(mut self) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    loop {
      self.skip_whitespace();
      let (line, pos) = (self.r.line, self.r.pos);
      let Some(c) = self.r.curr else {
        tokens.push(Token {
          src: String::new(),
          kind: TokenKind::EOF,
          line,
          pos,
        });
        break;
      };

      let tok = match c {
        '(' => self.single(TokenKind::LeftParen, "("),
        ')' => self.single(TokenKind::RightParen, ")"),
        '=' => self.read_equals(),
        '~' => self.single(TokenKind::Matches, "~"),
        '!' => self.read_not_equals_or_not_matches()?,
        '<' => self.read_less(),
        '>' => self.read_greater(),
        '"' => self.read_string()?,
        c if c.is_ascii_digit() || c == '-' => self.read_number(),
        c if c.is_alphabetic() || c == '_' => self.read_identifier(),
        other => {
          self.r.advance();
          Token {
            src: other.to_string(),
            kind: TokenKind::Illegal,
            line,
            pos,
          }
        }
      };
      tokens.push(tok);
    }
    Ok(tokens)
  }

  fn skip_whitespace(&mut self) {
    while matches!(self.r.curr, Some(c) if c.is_whitespace()) {
      self.r.advance();
    }
  }

  fn single(&mut self, kind: TokenKind, src: &str) -> Token {
    let (line, pos) = (self.r.line, self.r.pos);
    self.r.advance();
    Token {
      src: src.to_owned(),
      kind,
      line,
      pos,
    }
  }

  fn read_equals(&mut self) -> Token {
    let (line, pos) = (self.r.line, self.r.pos);
    self.r.advance();
    if self.r.curr == Some('=') {
      self.r.advance();
      return Token {
        src: "==".to_owned(),
        kind: TokenKind::Equals,
        line,
        pos,
      };
    }
    Token {
      src: "=".to_owned(),
      kind: TokenKind::Equals,
      line,
      pos,
    }
  }

  fn read_not_equals_or_not_matches(&mut self) -> Result<Token, ParseError> {
    let (line, pos) = (self.r.line, self.r.pos);
    self.r.advance();
    match self.r.curr {
      Some('=') => {
        self.r.advance();
        Ok(Token {
          src: "!=".to_owned(),
          kind: TokenKind::NotEquals,
          line,
          pos,
        })
      }
      Some('~') => {
        self.r.advance();
        Ok(Token {
          src: "!~".to_owned(),
          kind: TokenKind::NotMatches,
          line,
          pos,
        })
      }
      _ => Ok(Token {
        src: "!".to_owned(),
        kind: TokenKind::Illegal,
        line,
        pos,
      }),
    }
  }

  fn read_less(&mut self) -> Token {
    let (line, pos) = (self.r.line, self.r.pos);
    self.r.advance();
    if self.r.curr == Some('=') {
      self.r.advance();
      return Token {
        src: "<=".to_owned(),
        kind: TokenKind::LessOrEqual,
        line,
        pos,
      };
    }
    Token {
      src: "<".to_owned(),
      kind: TokenKind::Less,
      line,
      pos,
    }
  }

  fn read_greater(&mut self) -> Token {
    let (line, pos) = (self.r.line, self.r.pos);
    self.r.advance();
    if self.r.curr == Some('=') {
      self.r.advance();
      return Token {
        src: ">=".to_owned(),
        kind: TokenKind::GreaterOrEqual,
        line,
        pos,
      };
    }
    Token {
      src: ">".to_owned(),
      kind: TokenKind::Greater,
      line,
      pos,
    }
  }

  fn read_number(&mut self) -> Token {
    let (line, pos) = (self.r.line, self.r.pos);
    let mut src = String::new();
    if self.r.curr == Some('-') {
      src.push('-');
      self.r.advance();
    }
    let mut is_float = false;
    while matches!(self.r.curr, Some(c) if c.is_ascii_digit() || c == '.') {
      if self.r.curr == Some('.') {
        is_float = true;
      }
      src.push(self.r.curr.unwrap());
      self.r.advance();
    }
    Token {
      src,
      kind: if is_float {
        TokenKind::Float
      } else {
        TokenKind::Integer
      },
      line,
      pos,
    }
  }

  fn read_identifier(&mut self) -> Token {
    let (line, pos) = (self.r.line, self.r.pos);
    let mut src = String::new();
    while matches!(self.r.curr, Some(c) if c.is_alphanumeric() || c == '_') {
      src.push(self.r.curr.unwrap());
      self.r.advance();
    }
    let kind = match src.to_ascii_lowercase().as_str() {
      "and" => TokenKind::And,
      "or" => TokenKind::Or,
      "not" => TokenKind::Not,
      _ => TokenKind::Ident,
    };
    Token {
      src,
      kind,
      line,
      pos,
    }
  }

  fn read_string(&mut self) -> Result<Token, ParseError> {
    let (line, pos) = (self.r.line, self.r.pos);
    self.r.advance(); // consume opening quote
    let mut src = String::new();
    loop {
      match self.r.curr {
        None => return Err(ParseError::UnexpectedEOS),
        Some('"') => {
          self.r.advance();
          break;
        }
        Some('\\') => {
          self.r.advance();
          match self.r.curr {
            Some('n') => src.push('\n'),
            Some('t') => src.push('\t'),
            Some('r') => src.push('\r'),
            Some('\\') => src.push('\\'),
            Some('"') => src.push('"'),
            Some(other) => src.push(other),
            None => return Err(ParseError::UnexpectedEOS),
          }
          self.r.advance();
        }
        Some('\n') | Some('\t') | Some('\r') => {
          return Ok(Token {
            src,
            kind: TokenKind::Illegal,
            line,
            pos,
          })
        }
        Some(c) => {
          src.push(c);
          self.r.advance();
        }
      }
    }
    Ok(Token {
      src,
      kind: TokenKind::String,
      line,
      pos,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_lex_condition() {
    let tokens = Lexer::new("callsign = \"ABC123\"").parse().unwrap();
    let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
    assert_eq!(
      kinds,
      vec![
        TokenKind::Ident,
        TokenKind::Equals,
        TokenKind::String,
        TokenKind::EOF
      ]
    );
  }

  #[test]
  fn test_lex_not_and_parens() {
    let tokens = Lexer::new("not (alt > 1000)").parse().unwrap();
    let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
    assert_eq!(
      kinds,
      vec![
        TokenKind::Not,
        TokenKind::LeftParen,
        TokenKind::Ident,
        TokenKind::Greater,
        TokenKind::Integer,
        TokenKind::RightParen,
        TokenKind::EOF
      ]
    );
  }
}
