//! 命令文本解析
//!
//! 语法：`name`、`name()` 或 `name(arg, ..., key=value)`。
//! 参数只允许字面量：整数、浮点数、`True/False/true/false`、`None`、整数列表。
//! 标识符、属性访问、表达式、嵌套调用一律是语法错误，文本绝不会被当作代码执行。

use super::CommandError;

/// 参数字面量
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
    List(Vec<i64>),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Bool(_) => "boolean",
            Value::None => "None",
            Value::List(_) => "list",
        }
    }
}

/// 解析后的调用
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub args: Vec<Value>,
    pub kwargs: Vec<(String, Value)>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Eq,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("identifier '{}'", name),
            Token::Int(v) => format!("integer {}", v),
            Token::Float(v) => format!("float {}", v),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::LBracket => "'['".to_string(),
            Token::RBracket => "']'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Eq => "'='".to_string(),
        }
    }
}

fn syntax(position: usize, reason: impl Into<String>) -> CommandError {
    CommandError::Syntax {
        position,
        reason: reason.into(),
    }
}

fn tokenize(text: &str) -> Result<Vec<(usize, Token)>, CommandError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;
        let token = match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            },
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            ',' => Token::Comma,
            '=' => Token::Eq,
            c if c.is_ascii_alphabetic() || c == '_' => {
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push((start, Token::Ident(chars[start..i].iter().collect())));
                continue;
            },
            c if c.is_ascii_digit() || c == '.' || c == '-' || c == '+' => {
                let (token, end) = number(&chars, start)?;
                tokens.push((start, token));
                i = end;
                continue;
            },
            other => return Err(syntax(start, format!("unexpected character '{}'", other))),
        };
        tokens.push((start, token));
        i += 1;
    }
    Ok(tokens)
}

/// 数字字面量：`[+-]digits[.digits][(e|E)[+-]digits]`
fn number(chars: &[char], start: usize) -> Result<(Token, usize), CommandError> {
    let mut i = start;
    if matches!(chars[i], '-' | '+') {
        i += 1;
    }
    let digits_start = i;
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    let mut is_float = false;
    if i < chars.len() && chars[i] == '.' {
        is_float = true;
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }
    let mantissa: String = chars[digits_start..i].iter().filter(|c| **c != '.').collect();
    if mantissa.is_empty() {
        return Err(syntax(start, format!("unexpected character '{}'", chars[start])));
    }
    if i < chars.len() && matches!(chars[i], 'e' | 'E') {
        is_float = true;
        i += 1;
        if i < chars.len() && matches!(chars[i], '-' | '+') {
            i += 1;
        }
        let exp_start = i;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        if exp_start == i {
            return Err(syntax(start, "malformed exponent"));
        }
    }
    if i < chars.len() && (chars[i].is_ascii_alphabetic() || chars[i] == '_' || chars[i] == '.') {
        return Err(syntax(i, format!("unexpected character '{}'", chars[i])));
    }

    let literal: String = chars[start..i].iter().collect();
    let token = if is_float {
        let value = literal
            .parse::<f64>()
            .map_err(|_| syntax(start, format!("invalid number '{}'", literal)))?;
        Token::Float(value)
    } else {
        let value = literal
            .parse::<i64>()
            .map_err(|_| syntax(start, format!("integer out of range '{}'", literal)))?;
        Token::Int(value)
    };
    Ok((token, i))
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(o, _)| *o)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn unexpected(&self, expected: &str) -> CommandError {
        match self.peek() {
            Some(token) => syntax(
                self.offset(),
                format!("expected {}, found {}", expected, token.describe()),
            ),
            None => syntax(self.end, format!("expected {}, found end of input", expected)),
        }
    }

    fn call(&mut self) -> Result<Call, CommandError> {
        let name = match self.peek() {
            Some(Token::Ident(name)) => name.clone(),
            _ => return Err(self.unexpected("command name")),
        };
        self.pos += 1;
        let mut call = Call {
            name,
            args: Vec::new(),
            kwargs: Vec::new(),
        };

        match self.peek() {
            None => return Ok(call),
            Some(Token::LParen) => self.pos += 1,
            Some(_) => return Err(self.unexpected("'('")),
        }

        loop {
            if self.peek() == Some(&Token::RParen) {
                self.pos += 1;
                break;
            }
            self.argument(&mut call)?;
            match self.peek() {
                Some(Token::Comma) => self.pos += 1,
                Some(Token::RParen) => {
                    self.pos += 1;
                    break;
                },
                _ => return Err(self.unexpected("',' or ')'")),
            }
        }

        if self.peek().is_some() {
            return Err(self.unexpected("end of input"));
        }
        Ok(call)
    }

    fn argument(&mut self, call: &mut Call) -> Result<(), CommandError> {
        let keyword = match (self.tokens.get(self.pos), self.tokens.get(self.pos + 1)) {
            (Some((_, Token::Ident(name))), Some((_, Token::Eq))) => Some(name.clone()),
            _ => None,
        };

        match keyword {
            Some(name) => {
                self.pos += 2;
                let value = self.literal()?;
                call.kwargs.push((name, value));
            },
            None => {
                let offset = self.offset();
                let value = self.literal()?;
                if !call.kwargs.is_empty() {
                    return Err(syntax(offset, "positional argument follows keyword argument"));
                }
                call.args.push(value);
            },
        }
        Ok(())
    }

    fn literal(&mut self) -> Result<Value, CommandError> {
        let offset = self.offset();
        if self.peek().is_none() {
            return Err(self.unexpected("literal"));
        }
        match self.next() {
            Some(Token::Int(v)) => Ok(Value::Int(v)),
            Some(Token::Float(v)) => Ok(Value::Float(v)),
            Some(Token::Ident(word)) => match word.as_str() {
                "True" | "true" => Ok(Value::Bool(true)),
                "False" | "false" => Ok(Value::Bool(false)),
                "None" => Ok(Value::None),
                _ => Err(syntax(
                    offset,
                    format!("identifiers are not allowed as arguments: '{}'", word),
                )),
            },
            Some(Token::LBracket) => self.list(),
            _ => {
                self.pos -= 1;
                Err(self.unexpected("literal"))
            },
        }
    }

    fn list(&mut self) -> Result<Value, CommandError> {
        let mut items = Vec::new();
        loop {
            let offset = self.offset();
            match self.next() {
                Some(Token::RBracket) => break,
                Some(Token::Int(v)) => items.push(v),
                Some(token) => {
                    return Err(syntax(
                        offset,
                        format!("list elements must be integers, found {}", token.describe()),
                    ));
                },
                None => return Err(syntax(self.end, "unterminated list")),
            }
            match self.peek() {
                Some(Token::Comma) => self.pos += 1,
                Some(Token::RBracket) => {
                    self.pos += 1;
                    break;
                },
                None => return Err(syntax(self.end, "unterminated list")),
                Some(_) => return Err(self.unexpected("',' or ']'")),
            }
        }
        Ok(Value::List(items))
    }
}

/// 解析命令文本
pub fn parse(text: &str) -> Result<Call, CommandError> {
    let tokens = tokenize(text)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: text.chars().count(),
    };
    parser.call()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syntax_err(text: &str) -> String {
        match parse(text) {
            Err(CommandError::Syntax { reason, .. }) => reason,
            other => panic!("expected syntax error for {:?}, got {:?}", text, other),
        }
    }

    #[test]
    fn test_bare_name() {
        let call = parse("get_sync_motor_position").unwrap();
        assert_eq!(call.name, "get_sync_motor_position");
        assert!(call.args.is_empty());
    }

    #[test]
    fn test_positional_and_keyword() {
        let call = parse("set_led(1, ids=[1, 3])").unwrap();
        assert_eq!(call.name, "set_led");
        assert_eq!(call.args, vec![Value::Int(1)]);
        assert_eq!(
            call.kwargs,
            vec![("ids".to_string(), Value::List(vec![1, 3]))]
        );
    }

    #[test]
    fn test_literals() {
        let call = parse(" set_motor_position( -45.5 , [ 2 ,], ) ").unwrap();
        assert_eq!(call.args, vec![Value::Float(-45.5), Value::List(vec![2])]);

        let call = parse("f(True, false, None, 1e2, +3)").unwrap();
        assert_eq!(
            call.args,
            vec![
                Value::Bool(true),
                Value::Bool(false),
                Value::None,
                Value::Float(100.0),
                Value::Int(3)
            ]
        );
    }

    #[test]
    fn test_rejects_code() {
        assert!(syntax_err("set_led(__import__)").contains("identifiers"));
        assert!(syntax_err("set_led(__import__('os'))").contains("unexpected character"));
        assert!(syntax_err("set_led(os.system)").contains("'.'"));
        assert!(syntax_err("motors.clear()").contains("'.'"));
        assert!(syntax_err("set_led(1+1)").contains("expected"));
        assert!(syntax_err("set_led(\"1\")").contains("unexpected character"));
        assert!(syntax_err("set_led(get_torque())").contains("identifiers"));
    }

    #[test]
    fn test_structure_errors() {
        assert!(syntax_err("set_led(1").contains("end of input"));
        assert!(syntax_err("set_led(1) extra").contains("end of input"));
        assert!(syntax_err("set_led 1").contains("'('"));
        assert!(syntax_err("set_led(ids=[1], 1)").contains("positional"));
        assert!(syntax_err("set_led([1, 2.5])").contains("integers"));
        assert!(syntax_err("set_led([1").contains("unterminated"));
        assert!(syntax_err("(1)").contains("command name"));
        assert!(syntax_err("").contains("command name"));
    }

    #[test]
    fn test_number_errors() {
        assert!(syntax_err("f(99999999999999999999)").contains("out of range"));
        assert!(syntax_err("f(1e)").contains("exponent"));
        assert!(syntax_err("f(12abc)").contains("unexpected character"));
        assert!(syntax_err("f(-)").contains("unexpected character"));
    }

    #[test]
    fn test_error_position() {
        match parse("set_led(1, x)") {
            Err(CommandError::Syntax { position, .. }) => assert_eq!(position, 11),
            other => panic!("unexpected {:?}", other),
        }
    }
}
