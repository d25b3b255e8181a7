//! URL matchers for route patterns.
//!
//! Two matcher families cover route patterns:
//!
//! - **Segment**: a path template mixing literal text with `:name`
//!   placeholders, each optionally constrained inline as `:name#regex#`.
//!   Supports reverse URL building.
//! - **Regex**: a free-form regular expression with named capture groups.
//!   Building is not supported there.
//!
//! Both carry per-field validators and converters applied after a
//! structural match, and a `fluid` flag switching the matcher from
//! whole-string to prefix matching: the unconsumed suffix is captured
//! into the reserved `match_url` field for a mounted sub-router.
//!
//! # Examples
//!
//! ```
//! use gantry_core::matcher::{RouteMatcher, FieldValidator};
//!
//! let mut matcher = RouteMatcher::segment("/user/:id").unwrap();
//! matcher.validate_fields(vec![("id", FieldValidator::from("[0-9]+"))]);
//!
//! assert!(matcher.matches("/user/42").unwrap().is_some());
//! assert!(matcher.matches("/user/abc").unwrap().is_none());
//! ```

use crate::render::Vars;
use crate::Error;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// A callable field validator.
///
/// Receives the captured value, a snapshot of all captures, and the field
/// name. Returning `None` vetoes the whole match; returning `Some(v)`
/// accepts it and replaces the captured value with `v`.
pub type FieldValidatorFn =
    Arc<dyn Fn(&Value, &HashMap<String, Value>, &str) -> Option<Value> + Send + Sync>;

/// A field converter: receives the captured value (if any) and the field
/// name, and returns the value stored back under that field.
pub type FieldConverterFn = Arc<dyn Fn(Option<&Value>, &str) -> Value + Send + Sync>;

/// Per-field validation attached to a matcher.
#[derive(Clone)]
pub enum FieldValidator {
    /// A regex the captured field must satisfy. Segment matchers inject
    /// this into the capture group before compilation; regex matchers
    /// check it against the captured value after the fact.
    Pattern(String),
    /// An arbitrary predicate/replacement function.
    Func(FieldValidatorFn),
}

impl FieldValidator {
    /// Wrap a validation function.
    pub fn func(
        f: impl Fn(&Value, &HashMap<String, Value>, &str) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        FieldValidator::Func(Arc::new(f))
    }
}

impl From<&str> for FieldValidator {
    fn from(pattern: &str) -> Self {
        FieldValidator::Pattern(pattern.to_string())
    }
}

impl From<String> for FieldValidator {
    fn from(pattern: String) -> Self {
        FieldValidator::Pattern(pattern)
    }
}

/// Validators and converters shared by both matcher variants.
#[derive(Clone, Default)]
struct FieldRules {
    validators: Vec<(String, FieldValidator)>,
    converters: Vec<(String, FieldConverterFn)>,
}

impl FieldRules {
    fn add_validators(&mut self, fields: impl IntoIterator<Item = (String, FieldValidator)>) {
        for (field, validator) in fields {
            // Accept both "name" and ":name" spellings for the field key.
            let field = field.trim_start_matches(':').to_string();
            self.validators.push((field, validator));
        }
    }

    fn add_converter(&mut self, field: &str, converter: FieldConverterFn) {
        self.converters
            .push((field.trim_start_matches(':').to_string(), converter));
    }

    /// The first string pattern registered for a field, used by Segment
    /// matchers at compile time.
    fn string_pattern(&self, field: &str) -> Option<&str> {
        self.validators.iter().find_map(|(f, v)| match v {
            FieldValidator::Pattern(p) if f == field => Some(p.as_str()),
            _ => None,
        })
    }

    /// Run validators (in registration order, short-circuit) and then
    /// converters over the capture map. Returns Ok(false) when a
    /// validator vetoes the match.
    ///
    /// `check_patterns` enables post-hoc checking of string patterns, for
    /// matchers that could not inject them into the compiled pattern.
    fn apply(&self, map: &mut HashMap<String, Value>, check_patterns: bool) -> Result<bool, Error> {
        for (field, validator) in &self.validators {
            match validator {
                FieldValidator::Pattern(pattern) => {
                    if !check_patterns {
                        continue;
                    }
                    let value = match map.get(field) {
                        Some(Value::String(s)) => s.clone(),
                        Some(other) => other.to_string(),
                        None => return Ok(false),
                    };
                    let anchored = format!("^(?:{})$", pattern);
                    let re = Regex::new(&anchored)
                        .map_err(|e| Error::Matcher(format!("field {}: {}", field, e)))?;
                    if !re.is_match(&value) {
                        return Ok(false);
                    }
                }
                FieldValidator::Func(f) => {
                    let current = map.get(field).cloned().unwrap_or(Value::Null);
                    let snapshot = map.clone();
                    match f(&current, &snapshot, field) {
                        Some(replacement) => {
                            map.insert(field.clone(), replacement);
                        }
                        None => return Ok(false),
                    }
                }
            }
        }

        for (field, converter) in &self.converters {
            let current = map.get(field).cloned();
            let replacement = converter(current.as_ref(), field);
            map.insert(field.clone(), replacement);
        }

        Ok(true)
    }
}

/// One piece of a parsed segment template.
#[derive(Debug, Clone, PartialEq)]
enum Part {
    Literal(String),
    Param {
        name: String,
        pattern: Option<String>,
    },
}

/// A path-template matcher: literal text mixed with `:name` placeholders.
pub struct Segment {
    template: String,
    parts: Vec<Part>,
    fluid: bool,
    rules: FieldRules,
    compiled: OnceCell<Regex>,
}

impl Segment {
    /// Parse a template like `/user/:id` or `/file/:name#[a-z]+#`.
    ///
    /// An unterminated or empty inline constraint is a construction
    /// error.
    pub fn parse(template: impl Into<String>) -> Result<Self, Error> {
        let template = template.into();
        let parts = Self::parse_parts(&template)?;
        Ok(Self {
            template,
            parts,
            fluid: false,
            rules: FieldRules::default(),
            compiled: OnceCell::new(),
        })
    }

    fn parse_parts(template: &str) -> Result<Vec<Part>, Error> {
        let chars: Vec<char> = template.chars().collect();
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut i = 0;

        while i < chars.len() {
            if chars[i] != ':' {
                literal.push(chars[i]);
                i += 1;
                continue;
            }

            let mut j = i + 1;
            let mut name = String::new();
            while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
                name.push(chars[j]);
                j += 1;
            }
            if name.is_empty() {
                // A bare ':' is ordinary literal text.
                literal.push(':');
                i += 1;
                continue;
            }

            let mut pattern = None;
            if j < chars.len() && chars[j] == '#' {
                let mut k = j + 1;
                let mut inline = String::new();
                while k < chars.len() && chars[k] != '#' {
                    inline.push(chars[k]);
                    k += 1;
                }
                if k >= chars.len() {
                    return Err(Error::Matcher(format!(
                        "unterminated inline constraint for :{} in {}",
                        name, template
                    )));
                }
                if inline.is_empty() {
                    return Err(Error::Matcher(format!(
                        "empty inline constraint for :{} in {}",
                        name, template
                    )));
                }
                pattern = Some(inline);
                j = k + 1;
            }

            if !literal.is_empty() {
                parts.push(Part::Literal(std::mem::take(&mut literal)));
            }
            parts.push(Part::Param { name, pattern });
            i = j;
        }

        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }

        Ok(parts)
    }

    /// The original template text.
    pub fn source(&self) -> &str {
        &self.template
    }

    fn set_fluid(&mut self, fluid: bool) {
        if self.fluid != fluid {
            self.fluid = fluid;
            self.compiled = OnceCell::new();
        }
    }

    fn add_validators(&mut self, fields: impl IntoIterator<Item = (String, FieldValidator)>) {
        self.rules.add_validators(fields);
        // String patterns are injected into the compiled pattern.
        self.compiled = OnceCell::new();
    }

    /// Compile the template, caching the result. Placeholder patterns
    /// are, in order of preference: the inline constraint, a registered
    /// string field validator, or the default (`[^/]+`, or a non-greedy
    /// `.+?` for fluid matchers).
    fn compiled(&self) -> Result<&Regex, Error> {
        self.compiled.get_or_try_init(|| {
            let mut pattern = String::from("^");
            for part in &self.parts {
                match part {
                    Part::Literal(text) => pattern.push_str(&regex::escape(text)),
                    Part::Param {
                        name,
                        pattern: inline,
                    } => {
                        let default = if self.fluid { ".+?" } else { "[^/]+" };
                        let field_pattern = inline
                            .as_deref()
                            .or_else(|| self.rules.string_pattern(name))
                            .unwrap_or(default);
                        pattern.push_str(&format!("(?P<{}>{})", name, field_pattern));
                    }
                }
            }
            if self.fluid {
                pattern.push_str("(?P<match_url>.*)$");
            } else {
                pattern.push('$');
            }
            Regex::new(&pattern)
                .map_err(|e| Error::Matcher(format!("{}: {}", self.template, e)))
        })
    }

    /// Match a URL against the template, returning the capture map on
    /// success. Field validators may veto a structurally matching URL.
    pub fn matches(&self, url: &str) -> Result<Option<HashMap<String, Value>>, Error> {
        let re = self.compiled()?;
        let caps = match re.captures(url) {
            Some(caps) => caps,
            None => return Ok(None),
        };

        let mut map = HashMap::new();
        for name in re.capture_names().flatten() {
            if let Some(m) = caps.name(name) {
                map.insert(name.to_string(), Value::String(m.as_str().to_string()));
            }
        }
        trace!(template = %self.template, url, "segment matched");

        if self.rules.apply(&mut map, false)? {
            Ok(Some(map))
        } else {
            trace!(template = %self.template, url, "field validation vetoed match");
            Ok(None)
        }
    }

    /// Rebuild a URL from the template and a variable map. No validation
    /// or escaping is re-applied.
    pub fn build(&self, vars: &Vars) -> Result<String, Error> {
        let mut url = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(text) => url.push_str(text),
                Part::Param { name, .. } => {
                    let value = vars
                        .get(name)
                        .ok_or_else(|| Error::MissingBuildVar(name.clone()))?;
                    url.push_str(&value_to_string(value));
                }
            }
        }
        Ok(url)
    }
}

/// A free-form regular-expression matcher with named capture groups.
pub struct RegexMatcher {
    source: String,
    fluid: bool,
    rules: FieldRules,
    compiled: OnceCell<Regex>,
}

impl RegexMatcher {
    /// Wrap a regular expression. Compilation is deferred to first use;
    /// an invalid pattern surfaces there as `Error::Matcher`.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            source: pattern.into(),
            fluid: false,
            rules: FieldRules::default(),
            compiled: OnceCell::new(),
        }
    }

    /// The original regular expression text.
    pub fn source(&self) -> &str {
        &self.source
    }

    fn compiled(&self) -> Result<&Regex, Error> {
        self.compiled.get_or_try_init(|| {
            Regex::new(&self.source).map_err(|e| Error::Matcher(format!("{}: {}", self.source, e)))
        })
    }

    /// Match a URL against the expression. String field validators are
    /// checked against the captured values after the structural match,
    /// since this variant does not control pattern construction.
    pub fn matches(&self, url: &str) -> Result<Option<HashMap<String, Value>>, Error> {
        let re = self.compiled()?;
        let caps = match re.captures(url) {
            Some(caps) => caps,
            None => return Ok(None),
        };

        let consumed = caps.get(0).map(|m| m.as_str().to_string()).unwrap_or_default();

        let mut map = HashMap::new();
        for name in re.capture_names().flatten() {
            if let Some(m) = caps.name(name) {
                map.insert(name.to_string(), Value::String(m.as_str().to_string()));
            }
        }
        trace!(pattern = %self.source, url, "regex matched");

        if !self.rules.apply(&mut map, true)? {
            trace!(pattern = %self.source, url, "field validation vetoed match");
            return Ok(None);
        }

        if self.fluid {
            let rest = url.replacen(&consumed, "", 1);
            map.insert("match_url".to_string(), Value::String(rest));
        }

        Ok(Some(map))
    }
}

/// A route's URL matching strategy.
pub enum RouteMatcher {
    Segment(Segment),
    Regex(RegexMatcher),
}

impl RouteMatcher {
    /// Build a segment matcher from a path template.
    pub fn segment(template: impl Into<String>) -> Result<Self, Error> {
        Ok(RouteMatcher::Segment(Segment::parse(template)?))
    }

    /// Build a free-form regex matcher.
    pub fn regex(pattern: impl Into<String>) -> Self {
        RouteMatcher::Regex(RegexMatcher::new(pattern))
    }

    /// Match a URL, returning the capture map on success.
    pub fn matches(&self, url: &str) -> Result<Option<HashMap<String, Value>>, Error> {
        match self {
            RouteMatcher::Segment(m) => m.matches(url),
            RouteMatcher::Regex(m) => m.matches(url),
        }
    }

    /// Rebuild a URL from a variable map. Building is undefined for
    /// regex matchers, which yield an empty string rather than an error.
    pub fn build(&self, vars: &Vars) -> Result<String, Error> {
        match self {
            RouteMatcher::Segment(m) => m.build(vars),
            RouteMatcher::Regex(_) => Ok(String::new()),
        }
    }

    /// Register field validators, keyed by capture name.
    pub fn validate_fields<K, V>(&mut self, fields: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<FieldValidator>,
    {
        let fields = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect::<Vec<_>>();
        match self {
            RouteMatcher::Segment(m) => m.add_validators(fields),
            RouteMatcher::Regex(m) => m.rules.add_validators(fields),
        }
    }

    /// Register a converter applied to a captured field after validation.
    pub fn convert(
        &mut self,
        field: &str,
        f: impl Fn(Option<&Value>, &str) -> Value + Send + Sync + 'static,
    ) {
        let converter: FieldConverterFn = Arc::new(f);
        match self {
            RouteMatcher::Segment(m) => m.rules.add_converter(field, converter),
            RouteMatcher::Regex(m) => m.rules.add_converter(field, converter),
        }
    }

    /// Switch between whole-string and prefix matching.
    pub fn set_fluid(&mut self, fluid: bool) {
        match self {
            RouteMatcher::Segment(m) => m.set_fluid(fluid),
            RouteMatcher::Regex(m) => m.fluid = fluid,
        }
    }

    /// Whether this matcher consumes only a URL prefix.
    pub fn fluid(&self) -> bool {
        match self {
            RouteMatcher::Segment(m) => m.fluid,
            RouteMatcher::Regex(m) => m.fluid,
        }
    }

    /// The original template or regex text.
    pub fn source(&self) -> &str {
        match self {
            RouteMatcher::Segment(m) => m.source(),
            RouteMatcher::Regex(m) => m.source(),
        }
    }
}

/// Conversion into a route matcher, used by route registration.
///
/// Strings parse as segment templates, so registration can fail on a
/// malformed template.
pub trait IntoMatcher {
    fn into_matcher(self) -> Result<RouteMatcher, Error>;
}

impl IntoMatcher for RouteMatcher {
    fn into_matcher(self) -> Result<RouteMatcher, Error> {
        Ok(self)
    }
}

impl IntoMatcher for Segment {
    fn into_matcher(self) -> Result<RouteMatcher, Error> {
        Ok(RouteMatcher::Segment(self))
    }
}

impl IntoMatcher for RegexMatcher {
    fn into_matcher(self) -> Result<RouteMatcher, Error> {
        Ok(RouteMatcher::Regex(self))
    }
}

impl IntoMatcher for &str {
    fn into_matcher(self) -> Result<RouteMatcher, Error> {
        RouteMatcher::segment(self)
    }
}

impl IntoMatcher for String {
    fn into_matcher(self) -> Result<RouteMatcher, Error> {
        RouteMatcher::segment(self)
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn capture(map: &HashMap<String, Value>, key: &str) -> String {
        match map.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => panic!("missing capture {}", key),
        }
    }

    #[test]
    fn test_literal_exact_match() {
        let matcher = RouteMatcher::segment("/about").unwrap();
        assert!(matcher.matches("/about").unwrap().is_some());
        assert!(matcher.matches("/about/team").unwrap().is_none());
        assert!(matcher.matches("/abou").unwrap().is_none());
    }

    #[test]
    fn test_param_capture() {
        let matcher = RouteMatcher::segment("/user/:id").unwrap();
        let caps = matcher.matches("/user/42").unwrap().unwrap();
        assert_eq!(capture(&caps, "id"), "42");
        assert!(matcher.matches("/user/42/edit").unwrap().is_none());
    }

    #[test]
    fn test_inline_constraint() {
        let matcher = RouteMatcher::segment("/file/:name#[a-z]+#").unwrap();
        assert!(matcher.matches("/file/readme").unwrap().is_some());
        assert!(matcher.matches("/file/README").unwrap().is_none());
    }

    #[test]
    fn test_malformed_template() {
        assert!(RouteMatcher::segment("/file/:name#[a-z]+").is_err());
        assert!(RouteMatcher::segment("/file/:name##").is_err());
    }

    #[test]
    fn test_string_validator_injected() {
        let mut matcher = RouteMatcher::segment("/count/:number").unwrap();
        matcher.validate_fields(vec![("number", "[0-9]+")]);
        let caps = matcher.matches("/count/42").unwrap().unwrap();
        assert_eq!(capture(&caps, "number"), "42");
        assert!(matcher.matches("/count/abc").unwrap().is_none());
    }

    #[test]
    fn test_validator_key_colon_prefix() {
        let mut matcher = RouteMatcher::segment("/count/:number").unwrap();
        matcher.validate_fields(vec![(":number", "[0-9]+")]);
        assert!(matcher.matches("/count/abc").unwrap().is_none());
    }

    #[test]
    fn test_func_validator_veto_and_replace() {
        let mut matcher = RouteMatcher::segment("/valid/:valid").unwrap();
        matcher.validate_fields(vec![(
            "valid",
            FieldValidator::func(|value, _all, _field| match value {
                Value::String(s) if s == "ok" => Some(json!("confirmed")),
                _ => None,
            }),
        )]);
        let caps = matcher.matches("/valid/ok").unwrap().unwrap();
        assert_eq!(capture(&caps, "valid"), "confirmed");
        assert!(matcher.matches("/valid/nope").unwrap().is_none());
    }

    #[test]
    fn test_converter() {
        let mut matcher = RouteMatcher::segment("/author/:user").unwrap();
        matcher.validate_fields(vec![(":user", r"\d+")]);
        matcher.convert("user", |value, _field| {
            let id = value
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(0);
            json!({ "id": id, "name": format!("Test User #{}", id) })
        });
        let caps = matcher.matches("/author/7").unwrap().unwrap();
        assert_eq!(caps["user"]["name"], json!("Test User #7"));
    }

    #[test]
    fn test_fluid_prefix_capture() {
        let mut matcher = RouteMatcher::segment("/admin").unwrap();
        matcher.set_fluid(true);
        let caps = matcher.matches("/admin/plugins").unwrap().unwrap();
        assert_eq!(capture(&caps, "match_url"), "/plugins");

        // A fluid matcher still matches the bare prefix.
        let caps = matcher.matches("/admin").unwrap().unwrap();
        assert_eq!(capture(&caps, "match_url"), "");
    }

    #[test]
    fn test_build_round_trip() {
        let matcher = RouteMatcher::segment("/posts/:year/:slug").unwrap();
        let mut vars = Vars::new();
        vars.insert("year".to_string(), json!(2024));
        vars.insert("slug".to_string(), json!("hello-world"));
        let url = matcher.build(&vars).unwrap();
        assert_eq!(url, "/posts/2024/hello-world");

        let caps = matcher.matches(&url).unwrap().unwrap();
        assert_eq!(capture(&caps, "year"), "2024");
        assert_eq!(capture(&caps, "slug"), "hello-world");
    }

    #[test]
    fn test_build_missing_var() {
        let matcher = RouteMatcher::segment("/user/:id").unwrap();
        let result = matcher.build(&Vars::new());
        assert!(matches!(result, Err(Error::MissingBuildVar(_))));
    }

    #[test]
    fn test_regex_matcher_named_groups() {
        let matcher = RouteMatcher::regex(r"^/hiya/(?P<name>.+?)/?$");
        let caps = matcher.matches("/hiya/ada").unwrap().unwrap();
        assert_eq!(capture(&caps, "name"), "ada");
    }

    #[test]
    fn test_regex_matcher_post_hoc_pattern() {
        let mut matcher = RouteMatcher::regex(r"^/number/(?P<number>[0-9a-z]+)$");
        matcher.validate_fields(vec![("number", "[0-9]+")]);
        assert!(matcher.matches("/number/42").unwrap().is_some());
        assert!(matcher.matches("/number/4a2").unwrap().is_none());
    }

    #[test]
    fn test_regex_build_unsupported() {
        let matcher = RouteMatcher::regex(r"^/x/(?P<y>.+)$");
        assert_eq!(matcher.build(&Vars::new()).unwrap(), "");
    }

    #[test]
    fn test_invalid_regex_surfaces_as_error() {
        let matcher = RouteMatcher::regex("(unbalanced");
        assert!(matcher.matches("/x").is_err());
    }

    #[test]
    fn test_colon_without_name_is_literal() {
        let matcher = RouteMatcher::segment("/odd/:/path").unwrap();
        assert!(matcher.matches("/odd/:/path").unwrap().is_some());
        assert!(matcher.matches("/odd/x/path").unwrap().is_none());
    }
}
