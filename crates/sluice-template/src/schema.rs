//! Compact output-schema DSL.
//!
//! Agent nodes declare the shape of their final JSON answer with a small
//! schema language:
//!
//! ```text
//! string
//! number[]
//! {summary: string, files: string[], confidence?: number}
//! ```
//!
//! The equivalent structured form is a JSON value using the same atoms:
//! `{"summary": "string", "files": "string[]"}`. [`Schema::parse`] accepts
//! both. [`Schema::to_wire_schema`] emits the JSON Schema subset that the
//! model API consumes as a tool/input schema.

use serde_json::{Map, Value, json};
use thiserror::Error;

/// Errors raised while parsing a schema source.
#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    /// The schema source is malformed.
    #[error("schema parse error at offset {offset}: {message}")]
    Parse {
        /// Byte offset of the failure.
        offset: usize,
        /// What went wrong.
        message: String,
    },
}

/// Outcome of validating a value against a schema.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether the value conforms.
    pub valid: bool,
    /// Human-readable mismatch descriptions, empty when valid.
    pub errors: Vec<String>,
}

/// A parsed output schema.
#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    String,
    Number,
    Boolean,
    /// Homogeneous array of an element schema.
    Array(Box<Schema>),
    /// Object with named fields.
    Object(Vec<Field>),
}

/// One named field of an object schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field name.
    pub name: String,
    /// Field schema.
    pub schema: Schema,
    /// Whether the field must be present (`name?:` marks optional).
    pub required: bool,
}

impl Schema {
    /// Parse a schema from the string DSL or its JSON structured form.
    ///
    /// The structured form differs from the DSL only in quoting (JSON keys
    /// and atoms are double-quoted), so one parser accepts both, and field
    /// declaration order is preserved either way.
    pub fn parse(source: &str) -> Result<Self, SchemaError> {
        let mut parser = Parser::new(source.trim());
        let schema = parser.parse_type()?;
        parser.expect_end()?;
        Ok(schema)
    }

    /// Validate a value against this schema.
    pub fn validate(&self, value: &Value) -> ValidationResult {
        let mut errors = Vec::new();
        self.check(value, "$", &mut errors);
        ValidationResult {
            valid: errors.is_empty(),
            errors,
        }
    }

    fn check(&self, value: &Value, path: &str, errors: &mut Vec<String>) {
        match self {
            Schema::String => {
                if !value.is_string() {
                    errors.push(format!("expected string at {path}, got {}", kind_of(value)));
                }
            }
            Schema::Number => {
                if !value.is_number() {
                    errors.push(format!("expected number at {path}, got {}", kind_of(value)));
                }
            }
            Schema::Boolean => {
                if !value.is_boolean() {
                    errors.push(format!("expected boolean at {path}, got {}", kind_of(value)));
                }
            }
            Schema::Array(element) => match value.as_array() {
                Some(items) => {
                    for (i, item) in items.iter().enumerate() {
                        element.check(item, &format!("{path}[{i}]"), errors);
                    }
                }
                None => errors.push(format!("expected array at {path}, got {}", kind_of(value))),
            },
            Schema::Object(fields) => match value.as_object() {
                Some(map) => {
                    for field in fields {
                        match map.get(&field.name) {
                            Some(v) => {
                                field
                                    .schema
                                    .check(v, &format!("{path}.{}", field.name), errors);
                            }
                            None if field.required => {
                                errors.push(format!("missing required field {path}.{}", field.name));
                            }
                            None => {}
                        }
                    }
                }
                None => errors.push(format!("expected object at {path}, got {}", kind_of(value))),
            },
        }
    }

    /// Emit the JSON Schema subset understood by the model API.
    pub fn to_wire_schema(&self) -> Value {
        match self {
            Schema::String => json!({"type": "string"}),
            Schema::Number => json!({"type": "number"}),
            Schema::Boolean => json!({"type": "boolean"}),
            Schema::Array(element) => json!({
                "type": "array",
                "items": element.to_wire_schema(),
            }),
            Schema::Object(fields) => {
                let mut properties = Map::new();
                let mut required = Vec::new();
                for field in fields {
                    properties.insert(field.name.clone(), field.schema.to_wire_schema());
                    if field.required {
                        required.push(Value::String(field.name.clone()));
                    }
                }
                let mut obj = Map::new();
                obj.insert("type".into(), Value::String("object".into()));
                obj.insert("properties".into(), Value::Object(properties));
                if !required.is_empty() {
                    obj.insert("required".into(), Value::Array(required));
                }
                Value::Object(obj)
            }
        }
    }

    /// One-line description used in corrective retry instructions.
    pub fn describe(&self) -> String {
        match self {
            Schema::String => "string".into(),
            Schema::Number => "number".into(),
            Schema::Boolean => "boolean".into(),
            Schema::Array(element) => format!("{}[]", element.describe()),
            Schema::Object(fields) => {
                let inner = fields
                    .iter()
                    .map(|f| {
                        let marker = if f.required { "" } else { "?" };
                        format!("{}{}: {}", f.name, marker, f.schema.describe())
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{{{inner}}}")
            }
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DSL Parser
// ─────────────────────────────────────────────────────────────────────────────

struct Parser<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self { source, pos: 0 }
    }

    fn error(&self, message: impl Into<String>) -> SchemaError {
        SchemaError::Parse {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn rest(&self) -> &str {
        &self.source[self.pos..]
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.source.len() - trimmed.len();
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.rest().chars().next()
    }

    fn eat(&mut self, expected: char) -> Result<(), SchemaError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.pos += c.len_utf8();
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected '{expected}', found '{c}'"))),
            None => Err(self.error(format!("expected '{expected}', found end of input"))),
        }
    }

    fn parse_type(&mut self) -> Result<Schema, SchemaError> {
        let mut schema = self.parse_base()?;
        // Array suffixes bind to the whole base type: string[][] is fine.
        loop {
            self.skip_ws();
            if self.rest().starts_with("[]") {
                self.pos += 2;
                schema = Schema::Array(Box::new(schema));
            } else {
                break;
            }
        }
        Ok(schema)
    }

    fn parse_base(&mut self) -> Result<Schema, SchemaError> {
        match self.peek() {
            Some('{') => self.parse_object(),
            // A quoted atom carries a whole type expression: "string[]".
            Some('"') => {
                let offset = self.pos;
                let content = self.parse_quoted()?;
                let mut inner = Parser::new(content.trim());
                let schema = inner.parse_type().map_err(|e| reoffset(e, offset))?;
                inner.expect_end().map_err(|e| reoffset(e, offset))?;
                Ok(schema)
            }
            Some(c) if c.is_ascii_alphabetic() => {
                let word = self.parse_ident()?;
                match word.as_str() {
                    "string" => Ok(Schema::String),
                    "number" => Ok(Schema::Number),
                    "boolean" => Ok(Schema::Boolean),
                    other => Err(self.error(format!("unknown type '{other}'"))),
                }
            }
            Some(c) => Err(self.error(format!("unexpected character '{c}'"))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn parse_object(&mut self) -> Result<Schema, SchemaError> {
        self.eat('{')?;
        let mut fields = Vec::new();
        if self.peek() == Some('}') {
            self.eat('}')?;
            return Ok(Schema::Object(fields));
        }
        loop {
            let mut name = if self.peek() == Some('"') {
                self.parse_quoted()?
            } else {
                self.parse_ident()?
            };
            // Optional marker: `name?:` in the DSL, `"name?":` when quoted.
            let required = if name.ends_with('?') {
                name.truncate(name.len() - 1);
                false
            } else if self.peek() == Some('?') {
                self.eat('?')?;
                false
            } else {
                true
            };
            self.eat(':')?;
            let schema = self.parse_type()?;
            fields.push(Field {
                name,
                schema,
                required,
            });
            match self.peek() {
                Some(',') => {
                    self.eat(',')?;
                }
                Some('}') => {
                    self.eat('}')?;
                    return Ok(Schema::Object(fields));
                }
                Some(c) => return Err(self.error(format!("expected ',' or '}}', found '{c}'"))),
                None => return Err(self.error("unterminated object schema")),
            }
        }
    }

    fn parse_ident(&mut self) -> Result<String, SchemaError> {
        self.skip_ws();
        let rest = self.rest();
        let end = rest
            .char_indices()
            .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        if end == 0 {
            return Err(self.error("expected identifier"));
        }
        let ident = rest[..end].to_string();
        self.pos += end;
        Ok(ident)
    }

    fn parse_quoted(&mut self) -> Result<String, SchemaError> {
        self.eat('"')?;
        let rest = self.rest();
        let end = rest
            .find('"')
            .ok_or_else(|| self.error("unterminated string"))?;
        let content = rest[..end].to_string();
        self.pos += end + 1;
        Ok(content)
    }

    fn expect_end(&mut self) -> Result<(), SchemaError> {
        self.skip_ws();
        if self.rest().is_empty() {
            Ok(())
        } else {
            Err(self.error(format!("trailing input: '{}'", self.rest())))
        }
    }
}

/// Shift an inner parse error's offset to the quoted atom's position in the
/// outer source.
fn reoffset(err: SchemaError, base: usize) -> SchemaError {
    let SchemaError::Parse { offset, message } = err;
    SchemaError::Parse {
        offset: base + offset,
        message,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
