//! Path template compilation.
//!
//! # Responsibilities
//! - Translate `/users/{id:int}` style templates into anchored regexes
//! - Map placeholder types to their capture bodies
//! - Reject malformed placeholders before a route is registered
//! - Extract named captures into a parameter map
//!
//! # Design Decisions
//! - Literal segments are escaped, so `.` or `+` in a path match themselves
//! - Compilation is pure: same template and options, same regex
//! - Strict-slash is an option on the compiler, not process-wide state

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use regex::Regex;
use thiserror::Error;

/// Path parameters extracted from a matched route, keyed by placeholder name.
pub type Params = HashMap<String, String>;

/// Errors raised while compiling a route template.
#[derive(Debug, Error)]
pub enum RouteError {
    /// Placeholder used a type outside int/str/float/bool/date/datetime.
    #[error("invalid parameter type: {0}")]
    InvalidParamType(String),

    /// Placeholder name is empty or not an identifier.
    #[error("invalid parameter name {name:?} in pattern {pattern:?}")]
    InvalidParamName { pattern: String, name: String },

    /// The generated expression was rejected by the regex engine
    /// (for example a placeholder name used twice).
    #[error("pattern {pattern:?} does not compile: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Placeholder type accepted inside `{name:type}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Int,
    Str,
    Float,
    Bool,
    Date,
    DateTime,
}

impl ParamType {
    /// Regex body emitted inside the named capture group. Classes are ASCII
    /// only so every capture parses with the matching accessor.
    pub fn regex_body(self) -> &'static str {
        match self {
            ParamType::Int => "[0-9]+",
            ParamType::Str => "[0-9A-Za-z_]+",
            ParamType::Float => r"[0-9]+\.[0-9]+",
            ParamType::Bool => "true|false",
            ParamType::Date => "[0-9]{4}-[0-9]{2}-[0-9]{2}",
            ParamType::DateTime => "[0-9]{4}-[0-9]{2}-[0-9]{2} [0-9]{2}:[0-9]{2}:[0-9]{2}",
        }
    }
}

impl FromStr for ParamType {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int" => Ok(ParamType::Int),
            "str" => Ok(ParamType::Str),
            "float" => Ok(ParamType::Float),
            "bool" => Ok(ParamType::Bool),
            "date" => Ok(ParamType::Date),
            "datetime" => Ok(ParamType::DateTime),
            other => Err(RouteError::InvalidParamType(other.to_string())),
        }
    }
}

/// Compiles path templates into [`CompiledPattern`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternCompiler {
    strict_slash: bool,
}

impl PatternCompiler {
    /// Create a compiler. With `strict_slash`, every non-root pattern is
    /// forced to end in `/`.
    pub fn new(strict_slash: bool) -> Self {
        Self { strict_slash }
    }

    pub fn strict_slash(&self) -> bool {
        self.strict_slash
    }

    /// Translate a template into regex source without compiling it.
    pub fn to_regex(&self, template: &str) -> Result<String, RouteError> {
        let segments: Vec<&str> = template.split('/').collect();
        let last = segments.len() - 1;
        let mut regex = String::from("^/");

        for (index, segment) in segments.iter().enumerate() {
            if let Some(inner) = placeholder(segment) {
                let (name, kind) = match inner.split_once(':') {
                    Some((name, kind)) => (name, kind.parse::<ParamType>()?),
                    None => (inner, ParamType::Str),
                };
                if !is_identifier(name) {
                    return Err(RouteError::InvalidParamName {
                        pattern: template.to_string(),
                        name: name.to_string(),
                    });
                }
                regex.push_str("(?P<");
                regex.push_str(name);
                regex.push('>');
                regex.push_str(kind.regex_body());
                regex.push(')');
            } else {
                regex.push_str(&regex::escape(segment));
            }

            if index < last && !segment.is_empty() {
                regex.push('/');
            }
        }

        if self.strict_slash && regex.len() > 2 && !regex.ends_with('/') {
            regex.push('/');
        }
        regex.push('$');
        Ok(regex)
    }

    /// Compile a template into a matcher.
    pub fn compile(&self, template: &str) -> Result<CompiledPattern, RouteError> {
        let source = self.to_regex(template)?;
        CompiledPattern::from_source(template, source)
    }

    /// Matcher for a mount point: `root` itself and everything below it.
    pub fn prefix(&self, root: &str) -> Result<CompiledPattern, RouteError> {
        let trimmed = root.trim_end_matches('/');
        let source = if trimmed.is_empty() {
            String::from("^/.*$")
        } else {
            format!("^{}(?:/.*)?$", regex::escape(trimmed))
        };
        CompiledPattern::from_source(root, source)
    }
}

/// An anchored route matcher with named captures.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    template: String,
    regex: Regex,
}

impl CompiledPattern {
    fn from_source(template: &str, source: String) -> Result<Self, RouteError> {
        let regex = Regex::new(&source).map_err(|source| RouteError::Regex {
            pattern: template.to_string(),
            source,
        })?;
        Ok(Self {
            template: template.to_string(),
            regex,
        })
    }

    /// The template this pattern was compiled from.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// The generated regex source.
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Names of the capture groups, in template order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.regex.capture_names().flatten()
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Match `path` and collect the named captures.
    ///
    /// Returns `None` when the path does not match. A group that did not
    /// participate in the match is left out of the map.
    pub fn captures(&self, path: &str) -> Option<Params> {
        let caps = self.regex.captures(path)?;
        let mut params = Params::new();
        for name in self.regex.capture_names().flatten() {
            if let Some(value) = caps.name(name) {
                params.insert(name.to_string(), value.as_str().to_string());
            }
        }
        Some(params)
    }
}

impl fmt::Display for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.regex.as_str())
    }
}

fn placeholder(segment: &str) -> Option<&str> {
    segment.strip_prefix('{')?.strip_suffix('}')
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(template: &str) -> CompiledPattern {
        PatternCompiler::default().compile(template).unwrap()
    }

    #[test]
    fn test_typed_placeholders_generate_expected_regex() {
        let compiler = PatternCompiler::default();
        assert_eq!(compiler.to_regex("/").unwrap(), "^/$");
        assert_eq!(
            compiler.to_regex("/users/{id:int}").unwrap(),
            "^/users/(?P<id>[0-9]+)$"
        );
        assert_eq!(
            compiler.to_regex("/posts/{slug}/comments").unwrap(),
            "^/posts/(?P<slug>[0-9A-Za-z_]+)/comments$"
        );
        assert_eq!(
            compiler.to_regex("/at/{when:datetime}").unwrap(),
            "^/at/(?P<when>[0-9]{4}-[0-9]{2}-[0-9]{2} [0-9]{2}:[0-9]{2}:[0-9]{2})$"
        );
    }

    #[test]
    fn test_each_type_accepts_legal_and_rejects_illegal_values() {
        let cases = [
            ("/v/{x:int}", "/v/42", "/v/4a"),
            ("/v/{x:str}", "/v/hello_1", "/v/hello-1"),
            ("/v/{x}", "/v/abc", "/v/a.b"),
            ("/v/{x:float}", "/v/3.14", "/v/abc"),
            ("/v/{x:bool}", "/v/true", "/v/yes"),
            ("/v/{x:date}", "/v/2024-01-31", "/v/2024-1-31"),
            ("/v/{x:datetime}", "/v/2024-01-31 10:20:30", "/v/2024-01-31T10:20:30"),
        ];
        for (template, good, bad) in cases {
            let pattern = compile(template);
            assert!(pattern.is_match(good), "{template} should match {good}");
            assert!(!pattern.is_match(bad), "{template} should reject {bad}");
        }

        assert!(!compile("/v/{x:float}").is_match("/v/3"));
        assert!(!compile("/v/{x:bool}").is_match("/v/falsey"));

        // Non-ASCII digits and letters never reach the typed accessors.
        assert!(!compile("/users/{id:int}").is_match("/users/٤٢"));
        assert!(!compile("/v/{x:float}").is_match("/v/٣.١٤"));
        assert!(!compile("/v/{x}").is_match("/v/café"));
        assert!(!compile("/v/{x:date}").is_match("/v/２０２４-01-31"));
    }

    #[test]
    fn test_captures_extract_named_params() {
        let pattern = compile("/users/{id:int}/posts/{slug}");
        let params = pattern.captures("/users/42/posts/hello").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("42"));
        assert_eq!(params.get("slug").map(String::as_str), Some("hello"));
        assert_eq!(params.len(), 2);
        assert!(pattern.captures("/users/abc/posts/hello").is_none());

        let names: Vec<&str> = pattern.param_names().collect();
        assert_eq!(names, vec!["id", "slug"]);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let err = PatternCompiler::default()
            .compile("/users/{id:uuid}")
            .unwrap_err();
        assert!(matches!(err, RouteError::InvalidParamType(ref t) if t == "uuid"));
        assert_eq!(err.to_string(), "invalid parameter type: uuid");
    }

    #[test]
    fn test_bad_names_are_rejected() {
        let compiler = PatternCompiler::default();
        assert!(matches!(
            compiler.compile("/users/{}"),
            Err(RouteError::InvalidParamName { .. })
        ));
        assert!(matches!(
            compiler.compile("/users/{1id:int}"),
            Err(RouteError::InvalidParamName { .. })
        ));
        assert!(matches!(
            compiler.compile("/a/{id}/b/{id}"),
            Err(RouteError::Regex { .. })
        ));
    }

    #[test]
    fn test_literal_segments_are_escaped() {
        let pattern = compile("/files/index.html");
        assert!(pattern.is_match("/files/index.html"));
        assert!(!pattern.is_match("/files/indexXhtml"));

        let plus = compile("/c++/docs");
        assert!(plus.is_match("/c++/docs"));
        assert!(!plus.is_match("/ccc/docs"));
    }

    #[test]
    fn test_strict_slash_appends_trailing_slash() {
        let strict = PatternCompiler::new(true);
        assert_eq!(strict.to_regex("/users").unwrap(), "^/users/$");
        assert_eq!(strict.to_regex("/users/").unwrap(), "^/users/$");
        assert_eq!(strict.to_regex("/").unwrap(), "^/$");

        let loose = PatternCompiler::new(false);
        assert_eq!(loose.to_regex("/users").unwrap(), "^/users$");
        assert_eq!(loose.to_regex("/users/").unwrap(), "^/users/$");
    }

    #[test]
    fn test_empty_segments_collapse() {
        let compiler = PatternCompiler::default();
        assert_eq!(compiler.to_regex("/api//ping").unwrap(), "^/api/ping$");
        assert_eq!(compiler.to_regex("").unwrap(), "^/$");
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let compiler = PatternCompiler::default();
        let a = compiler.to_regex("/a/{b:int}/{c:date}").unwrap();
        let b = compiler.to_regex("/a/{b:int}/{c:date}").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_prefix_matches_mount_point_and_below() {
        let compiler = PatternCompiler::default();
        let pattern = compiler.prefix("/static").unwrap();
        assert!(pattern.is_match("/static"));
        assert!(pattern.is_match("/static/css/site.css"));
        assert!(!pattern.is_match("/statics/x"));

        let root = compiler.prefix("/").unwrap();
        assert!(root.is_match("/anything/at/all"));
    }
}
