// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Chore options and the command-line grammar producing them.
//!
//! Everything after chored's own flags is parsed here. Bare words form the
//! chore path, while flags build up the single options object handed to the
//! chore:
//!
//! - `-s/--string key value` and `--key=value`
//! - `-b/--bool key true|false`, `--flag`, and `--no-flag`
//! - `-n/--num key int`
//! - `-j/--json '{ ... }'`, merged into options
//! - `-e/--env key ENVNAME`, read immediately
//! - `-l/--list` and `-h/--help`
//! - `--` or `-`, passing all remaining arguments as the `args` string array
//!
//! Terse forms like `--key value` and `--key=value` guess booleans and
//! integers. Anything else is kept as a string.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::{
    collections::{btree_map::IntoIter, BTreeMap},
    fmt::{Display, Formatter, Result as FmtResult},
    num::ParseIntError,
};

/// Single option value.
#[derive(Debug, PartialEq, Clone)]
pub enum OptionValue {
    String(String),
    Bool(bool),
    Int(i64),
    Json(Value),

    /// Value taken from environment variable `name`.
    Env { name: String, value: String },
}

impl OptionValue {
    /// Guess type of terse value.
    pub fn guess(value: impl Into<String>) -> Self {
        let value = value.into();
        match value.as_str() {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            _ => match value.parse::<i64>() {
                Ok(int) => Self::Int(int),
                Err(_) => Self::String(value),
            },
        }
    }

    /// Convert into JSON.
    pub fn to_json(&self) -> Value {
        match self {
            Self::String(value) | Self::Env { value, .. } => Value::String(value.clone()),
            Self::Bool(value) => Value::Bool(*value),
            Self::Int(value) => Value::from(*value),
            Self::Json(value) => value.clone(),
        }
    }
}

impl Display for OptionValue {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::String(value) | Self::Env { value, .. } => fmt.write_str(value),
            Self::Bool(value) => write!(fmt, "{value}"),
            Self::Int(value) => write!(fmt, "{value}"),
            Self::Json(Value::String(value)) => fmt.write_str(value),
            Self::Json(value) => write!(fmt, "{value}"),
        }
    }
}

/// Named options handed to a chore.
#[derive(Default, Debug, PartialEq, Clone)]
pub struct Options(BTreeMap<String, OptionValue>);

impl Options {
    /// Construct empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build options from JSON object.
    ///
    /// # Errors
    ///
    /// - Return [`OptionError::NotAnObject`] if `value` is no object.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(map
                .into_iter()
                .map(|(key, value)| (key, OptionValue::Json(value)))
                .collect()),
            Value::Null => Ok(Self::new()),
            other => Err(OptionError::NotAnObject(other.to_string())),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: OptionValue) -> Option<OptionValue> {
        self.0.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Trailing arguments passed after `--`.
    pub fn args(&self) -> Vec<String> {
        match self.0.get("args") {
            Some(OptionValue::Json(Value::Array(args))) => args
                .iter()
                .map(|arg| match arg {
                    Value::String(arg) => arg.clone(),
                    other => other.to_string(),
                })
                .collect(),
            Some(other) => vec![other.to_string()],
            None => Vec::new(),
        }
    }

    /// Layer `overrides` on top of these options.
    pub fn merged(mut self, overrides: Options) -> Self {
        self.0.extend(overrides.0);
        self
    }

    /// Convert into JSON object.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(key, value)| (key.clone(), value.to_json()))
                .collect::<Map<_, _>>(),
        )
    }

    /// Deserialize options into typed chore input.
    ///
    /// # Errors
    ///
    /// - Return [`OptionError::Deserialize`] if options do not fit `T`.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.to_json()).map_err(OptionError::Deserialize)
    }
}

impl FromIterator<(String, OptionValue)> for Options {
    fn from_iter<I: IntoIterator<Item = (String, OptionValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Options {
    type Item = (String, OptionValue);
    type IntoIter = IntoIter<String, OptionValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// What the user asked chored to do.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy)]
pub enum InvocationMode {
    #[default]
    Run,
    List,
    Help,
}

/// Parsed command line of chore invocation.
#[derive(Default, Debug, PartialEq, Clone)]
pub struct Invocation {
    /// Chore path, including module when given.
    pub path: Vec<String>,

    /// Options for chore.
    pub options: Options,

    pub mode: InvocationMode,
}

/// Parse chore command line.
///
/// Environment options are read right away, so a missing variable fails
/// here rather than inside the chore.
///
/// # Errors
///
/// - Return [`OptionError::TooFewArguments`] if a flag lacks its operands.
/// - Return [`OptionError::InvalidBool`] or [`OptionError::InvalidNumber`] for
///   malformed typed values.
/// - Return [`OptionError::InvalidJson`] or [`OptionError::NotAnObject`] for
///   malformed JSON options.
/// - Return [`OptionError::MissingEnv`] if environment variable is unset.
pub fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Invocation> {
    let mut args = args.into_iter().peekable();
    let mut invocation = Invocation::default();

    while let Some(arg) = args.next() {
        let mut operand = |flag: &str| {
            args.next().ok_or_else(|| OptionError::TooFewArguments {
                flag: flag.to_string(),
            })
        };

        match arg.as_str() {
            "-s" | "--string" => {
                let key = operand(&arg)?;
                invocation.options.insert(key, OptionValue::String(operand(&arg)?));
            }
            "-b" | "--bool" => {
                let key = operand(&arg)?;
                let value = match operand(&arg)?.as_str() {
                    "true" => true,
                    "false" => false,
                    other => return Err(OptionError::InvalidBool(other.to_string())),
                };
                invocation.options.insert(key, OptionValue::Bool(value));
            }
            "-n" | "--num" => {
                let key = operand(&arg)?;
                let value = operand(&arg)?;
                let int = value
                    .parse()
                    .map_err(|source| OptionError::InvalidNumber { value, source })?;
                invocation.options.insert(key, OptionValue::Int(int));
            }
            "-j" | "--json" => {
                let json = serde_json::from_str(&operand(&arg)?).map_err(OptionError::InvalidJson)?;
                invocation.options = std::mem::take(&mut invocation.options).merged(Options::from_json(json)?);
            }
            "-e" | "--env" => {
                let key = operand(&arg)?;
                let name = operand(&arg)?;
                let value = std::env::var(&name).map_err(|_| OptionError::MissingEnv {
                    key: key.clone(),
                    name: name.clone(),
                })?;
                invocation.options.insert(key, OptionValue::Env { name, value });
            }
            "-l" | "--list" => invocation.mode = InvocationMode::List,
            "-h" | "--help" => invocation.mode = InvocationMode::Help,
            "--" | "-" => {
                let rest = args.by_ref().map(Value::String).collect();
                invocation.options.insert("args", OptionValue::Json(Value::Array(rest)));
                break;
            }
            terse if terse.starts_with("--") => {
                let terse = &terse[2..];
                if let Some((key, value)) = terse.split_once('=') {
                    invocation.options.insert(key, OptionValue::guess(value));
                } else if let Some(value) = args.next_if(|next| !next.starts_with('-')) {
                    invocation.options.insert(terse, OptionValue::guess(value));
                } else if let Some(key) = terse.strip_prefix("no-") {
                    invocation.options.insert(key, OptionValue::Bool(false));
                } else {
                    invocation.options.insert(terse, OptionValue::Bool(true));
                }
            }
            _ => invocation.path.push(arg),
        }
    }

    Ok(invocation)
}

/// Chore option error types.
#[derive(Debug, thiserror::Error)]
pub enum OptionError {
    /// Flag is missing its operands.
    #[error("too few arguments for {flag}")]
    TooFewArguments { flag: String },

    /// Boolean is neither "true" nor "false".
    #[error("invalid boolean {0:?}")]
    InvalidBool(String),

    /// Number is no integer.
    #[error("invalid integer {value:?}")]
    InvalidNumber {
        value: String,
        #[source]
        source: ParseIntError,
    },

    /// JSON option cannot be parsed.
    #[error("invalid JSON option")]
    InvalidJson(#[source] serde_json::Error),

    /// JSON option is no object.
    #[error("JSON options must be an object, got {0}")]
    NotAnObject(String),

    /// Environment variable behind option is unset.
    #[error("option {key} reads unset environment variable {name}")]
    MissingEnv { key: String, name: String },

    /// Options do not fit what chore accepts.
    #[error("invalid options for chore")]
    Deserialize(#[source] serde_json::Error),
}

/// Friendly result alias :3
type Result<T, E = OptionError> = std::result::Result<T, E>;
