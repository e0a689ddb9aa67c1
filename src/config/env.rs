//! `.env` file support.
//!
//! One `KEY=VALUE` pair per line. Lines starting with `#` and lines without
//! `=` are skipped. Keys and values are trimmed; a value wrapped in double
//! quotes is unquoted with the usual backslash escapes.
//!
//! Typed configuration is filled through [`EnvBindings`], a list of
//! caller-declared `key → field` mappings.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: malformed quoted value")]
    Quote { line: usize },

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("missing required field {0}")]
    Missing(String),
}

/// One `KEY=VALUE` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvPair {
    pub key: String,
    pub value: String,
}

/// Parse `.env` content.
pub fn parse_env(content: &str) -> Result<Vec<EnvPair>, EnvError> {
    let mut pairs = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let mut value = value.trim().to_string();
        if value.len() > 1 && value.starts_with('"') && value.ends_with('"') {
            value = unquote(&value[1..value.len() - 1]).ok_or(EnvError::Quote { line: index + 1 })?;
        }
        pairs.push(EnvPair {
            key: key.to_string(),
            value,
        });
    }
    Ok(pairs)
}

fn unquote(inner: &str) -> Option<String> {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push(match chars.next()? {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                '"' => '"',
                '\\' => '\\',
                _ => return None,
            }),
            '"' => return None,
            c => out.push(c),
        }
    }
    Some(out)
}

/// Read a `.env` file into pairs.
pub fn read_env_file(path: &Path) -> Result<Vec<EnvPair>, EnvError> {
    parse_env(&fs::read_to_string(path)?)
}

/// Export every pair of a `.env` file into the process environment,
/// overwriting existing variables.
pub fn load_env(path: &Path) -> Result<(), EnvError> {
    for pair in read_env_file(path)? {
        std::env::set_var(&pair.key, &pair.value);
    }
    Ok(())
}

type Setter<T> = Box<dyn Fn(&mut T, &str) -> Result<(), String> + Send + Sync>;

struct Binding<T> {
    key: String,
    required: bool,
    set: Setter<T>,
}

/// Declared mappings from `.env` keys onto fields of `T`.
pub struct EnvBindings<T> {
    bindings: Vec<Binding<T>>,
}

impl<T> Default for EnvBindings<T> {
    fn default() -> Self {
        Self { bindings: Vec::new() }
    }
}

impl<T> fmt::Debug for EnvBindings<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.bindings.iter().map(|b| (&b.key, b.required)))
            .finish()
    }
}

impl<T> EnvBindings<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `key` to a field through a parser for its type.
    pub fn bind<V, F>(mut self, key: impl Into<String>, required: bool, set: F) -> Self
    where
        V: FromStr,
        V::Err: fmt::Display,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        self.bindings.push(Binding {
            key: key.into(),
            required,
            set: Box::new(move |target, raw| {
                let value = raw.parse::<V>().map_err(|e| e.to_string())?;
                set(target, value);
                Ok(())
            }),
        });
        self
    }

    pub fn required<V, F>(self, key: impl Into<String>, set: F) -> Self
    where
        V: FromStr,
        V::Err: fmt::Display,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        self.bind(key, true, set)
    }

    pub fn optional<V, F>(self, key: impl Into<String>, set: F) -> Self
    where
        V: FromStr,
        V::Err: fmt::Display,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        self.bind(key, false, set)
    }

    /// Apply pairs onto `target`. Unknown keys are ignored; a required key
    /// that never appears is an error.
    pub fn apply(&self, pairs: &[EnvPair], target: &mut T) -> Result<(), EnvError> {
        let mut seen = HashSet::new();
        for pair in pairs {
            seen.insert(pair.key.as_str());
            for binding in self.bindings.iter().filter(|b| b.key == pair.key) {
                (binding.set)(target, &pair.value).map_err(|reason| EnvError::InvalidValue {
                    key: pair.key.clone(),
                    reason,
                })?;
            }
        }
        match self
            .bindings
            .iter()
            .find(|b| b.required && !seen.contains(b.key.as_str()))
        {
            Some(missing) => Err(EnvError::Missing(missing.key.clone())),
            None => Ok(()),
        }
    }

    /// Read a `.env` file and apply it onto `target`.
    pub fn load(&self, path: &Path, target: &mut T) -> Result<(), EnvError> {
        let pairs = read_env_file(path)?;
        self.apply(&pairs, target)
    }
}
