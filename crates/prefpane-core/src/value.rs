use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Choice(String),
    Bytes(Vec<u8>),
}

impl ParamValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Bool(_) => ParamKind::Bool,
            ParamValue::Int(_) => ParamKind::Int,
            ParamValue::Float(_) => ParamKind::Float,
            ParamValue::Str(_) => ParamKind::Str,
            ParamValue::Choice(_) => ParamKind::Choice,
            ParamValue::Bytes(_) => ParamKind::Bytes,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(value) => Some(*value),
            ParamValue::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    /// Text of string and choice values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(value) | ParamValue::Choice(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ParamValue::Bytes(value) => Some(value),
            _ => None,
        }
    }

    /// Parses user supplied text into a value of `kind`.
    pub fn parse(kind: ParamKind, text: &str) -> anyhow::Result<Self> {
        let value = match kind {
            ParamKind::Bool => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => ParamValue::Bool(true),
                "false" | "no" | "off" | "0" => ParamValue::Bool(false),
                other => anyhow::bail!("invalid boolean '{other}'"),
            },
            ParamKind::Int => ParamValue::Int(
                text.trim()
                    .parse()
                    .map_err(|_| anyhow::anyhow!("invalid integer '{text}'"))?,
            ),
            ParamKind::Float => ParamValue::Float(
                text.trim()
                    .parse()
                    .map_err(|_| anyhow::anyhow!("invalid number '{text}'"))?,
            ),
            ParamKind::Str => ParamValue::Str(text.to_string()),
            ParamKind::Choice => ParamValue::Choice(text.to_string()),
            ParamKind::Bytes => ParamValue::Bytes(
                hex::decode(text.trim())
                    .map_err(|err| anyhow::anyhow!("invalid hex bytes: {err}"))?,
            ),
        };
        Ok(value)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(value) => write!(f, "{value}"),
            ParamValue::Int(value) => write!(f, "{value}"),
            ParamValue::Float(value) => write!(f, "{value}"),
            ParamValue::Str(value) | ParamValue::Choice(value) => f.write_str(value),
            ParamValue::Bytes(value) => f.write_str(&hex::encode(value)),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Bool,
    Int,
    Float,
    Str,
    Choice,
    Bytes,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::Bool => "bool",
            ParamKind::Int => "int",
            ParamKind::Float => "float",
            ParamKind::Str => "string",
            ParamKind::Choice => "choice",
            ParamKind::Bytes => "bytes",
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
