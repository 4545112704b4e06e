//! tserve-router: Zero-dependency ordered pattern router
//!
//! Routes are kept in registration order and tried one after another.
//! The first pattern that structurally matches the path wins; there is no
//! priority scheme between static, parameter and wildcard routes.
//!
//! ## Pattern Syntax
//! - `{name}` - Named placeholder, captures a non-empty run within one segment
//! - `*` - Trailing wildcard, captures the rest of the path (slashes included)
//! - anything else is literal text
//!
//! A literal directly after a placeholder acts as a delimiter: the placeholder
//! captures the shortest run that lets the rest of the pattern match.
//!
//! ## Methods
//! Methods are compared case-sensitively. Registering with `*` matches any
//! method.
//!
//! ## Example
//! ```
//! use tserve_router::Router;
//!
//! let mut router = Router::new();
//! router.register("GET", "/test/{match}_*", 0).unwrap();
//!
//! let m = router.find("GET", "/test/some_route").unwrap();
//! assert_eq!(*m.value, 0);
//! assert_eq!(m.captures.get("match"), Some("some"));
//! assert_eq!(m.captures.wildcard(), Some("route"));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::ops::Index;

/// Key under which the wildcard capture is exposed
pub const WILDCARD_KEY: &str = "*";

/// Method filter that matches every request method
pub const ANY_METHOD: &str = "*";

/// Error raised when a route cannot be registered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// `{` without a closing `}`
    UnterminatedPlaceholder(String),
    /// `{}` or a name containing `/` or `{`
    InvalidPlaceholder(String),
    /// The same placeholder name appears twice
    DuplicatePlaceholder(String),
    /// Two placeholders with no literal between them
    AdjacentPlaceholders(String),
    /// `*` appears anywhere but at the very end
    WildcardNotLast(String),
    /// Empty method string
    EmptyMethod,
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::UnterminatedPlaceholder(p) => {
                write!(f, "unterminated placeholder in pattern {p:?}")
            }
            RouteError::InvalidPlaceholder(p) => write!(f, "invalid placeholder in pattern {p:?}"),
            RouteError::DuplicatePlaceholder(name) => {
                write!(f, "placeholder {{{name}}} used more than once")
            }
            RouteError::AdjacentPlaceholders(p) => {
                write!(f, "placeholders must be separated by literal text in pattern {p:?}")
            }
            RouteError::WildcardNotLast(p) => {
                write!(f, "wildcard must be the last token of pattern {p:?}")
            }
            RouteError::EmptyMethod => f.write_str("route method must not be empty"),
        }
    }
}

impl std::error::Error for RouteError {}

/// Values captured by a successful match
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteMatch {
    params: Vec<(String, String)>,
    wildcard: Option<String>,
}

impl RouteMatch {
    /// Look up a capture by placeholder name; `*` returns the wildcard capture
    pub fn get(&self, name: &str) -> Option<&str> {
        if name == WILDCARD_KEY {
            return self.wildcard();
        }
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// The wildcard capture, if the pattern had one
    pub fn wildcard(&self) -> Option<&str> {
        self.wildcard.as_deref()
    }

    /// Placeholder captures in pattern order
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// All captures as a map, the wildcard under `*`
    pub fn to_map(&self) -> HashMap<String, String> {
        let mut map: HashMap<String, String> = self.params.iter().cloned().collect();
        if let Some(rest) = &self.wildcard {
            map.insert(WILDCARD_KEY.to_string(), rest.clone());
        }
        map
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty() && self.wildcard.is_none()
    }
}

impl Index<&str> for RouteMatch {
    type Output = str;

    fn index(&self, name: &str) -> &str {
        self.get(name)
            .unwrap_or_else(|| panic!("no capture named {name:?} in route match"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Placeholder(String),
    Wildcard,
}

/// A compiled route pattern
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    tokens: Vec<Token>,
}

impl Pattern {
    /// Compile a pattern string
    pub fn parse(pattern: &str) -> Result<Self, RouteError> {
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut names: Vec<&str> = Vec::new();
        let mut rest = pattern;

        while let Some(c) = rest.chars().next() {
            match c {
                '{' => {
                    let close = rest
                        .find('}')
                        .ok_or_else(|| RouteError::UnterminatedPlaceholder(pattern.to_string()))?;
                    let name = &rest[1..close];
                    if name.is_empty() || name.contains(['/', '{']) {
                        return Err(RouteError::InvalidPlaceholder(pattern.to_string()));
                    }
                    if names.contains(&name) {
                        return Err(RouteError::DuplicatePlaceholder(name.to_string()));
                    }
                    if literal.is_empty() && matches!(tokens.last(), Some(Token::Placeholder(_))) {
                        return Err(RouteError::AdjacentPlaceholders(pattern.to_string()));
                    }
                    names.push(name);
                    if !literal.is_empty() {
                        tokens.push(Token::Literal(std::mem::take(&mut literal)));
                    }
                    tokens.push(Token::Placeholder(name.to_string()));
                    rest = &rest[close + 1..];
                }
                '*' => {
                    if rest.len() > 1 {
                        return Err(RouteError::WildcardNotLast(pattern.to_string()));
                    }
                    if !literal.is_empty() {
                        tokens.push(Token::Literal(std::mem::take(&mut literal)));
                    }
                    tokens.push(Token::Wildcard);
                    rest = "";
                }
                _ => {
                    literal.push(c);
                    rest = &rest[c.len_utf8()..];
                }
            }
        }
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        Ok(Self {
            source: pattern.to_string(),
            tokens,
        })
    }

    /// The pattern as it was registered
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match a full path against this pattern
    pub fn matches(&self, path: &str) -> Option<RouteMatch> {
        let mut captures = RouteMatch::default();
        Self::match_tokens(&self.tokens, path, &mut captures).then_some(captures)
    }

    fn match_tokens(tokens: &[Token], path: &str, captures: &mut RouteMatch) -> bool {
        let Some((token, rest)) = tokens.split_first() else {
            return path.is_empty();
        };

        match token {
            Token::Literal(text) => match path.strip_prefix(text.as_str()) {
                Some(remaining) => Self::match_tokens(rest, remaining, captures),
                None => false,
            },
            Token::Wildcard => {
                captures.wildcard = Some(path.to_string());
                true
            }
            Token::Placeholder(name) => {
                let segment_end = path.find('/').unwrap_or(path.len());
                let segment = &path[..segment_end];
                // Shortest capture first so a following literal delimits it
                let ends = segment
                    .char_indices()
                    .skip(1)
                    .map(|(i, _)| i)
                    .chain((segment_end > 0).then_some(segment_end));

                for end in ends {
                    captures.params.push((name.clone(), path[..end].to_string()));
                    if Self::match_tokens(rest, &path[end..], captures) {
                        return true;
                    }
                    captures.params.pop();
                }
                false
            }
        }
    }
}

#[derive(Debug)]
struct Route<T> {
    method: String,
    pattern: Pattern,
    value: T,
}

impl<T> Route<T> {
    fn accepts(&self, method: &str) -> bool {
        self.method == ANY_METHOD || self.method == method
    }
}

/// A successful lookup
#[derive(Debug, Clone)]
pub struct Match<'a, T> {
    /// The registered value, usually a handler
    pub value: &'a T,
    /// The pattern that matched
    pub pattern: &'a str,
    /// Captured path values
    pub captures: RouteMatch,
}

/// Ordered (method, pattern, value) router
#[derive(Debug)]
pub struct Router<T> {
    routes: Vec<Route<T>>,
}

impl<T> Router<T> {
    /// Create an empty router
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Register a route; later registrations never shadow earlier ones
    ///
    /// # Example
    /// ```
    /// use tserve_router::Router;
    ///
    /// let mut router = Router::new();
    /// router.register("GET", "/users/{id}", "show").unwrap();
    /// router.register("*", "/static/*", "files").unwrap();
    /// assert!(router.register("GET", "/bad/*/tail", "nope").is_err());
    /// ```
    pub fn register(&mut self, method: &str, pattern: &str, value: T) -> Result<(), RouteError> {
        if method.is_empty() {
            return Err(RouteError::EmptyMethod);
        }
        let pattern = Pattern::parse(pattern)?;
        self.routes.push(Route {
            method: method.to_string(),
            pattern,
            value,
        });
        Ok(())
    }

    /// Find the first registered route matching `method` and `path`
    ///
    /// `path` must not include the query string.
    pub fn find(&self, method: &str, path: &str) -> Option<Match<'_, T>> {
        self.routes
            .iter()
            .filter(|route| route.accepts(method))
            .find_map(|route| {
                route.pattern.matches(path).map(|captures| Match {
                    value: &route.value,
                    pattern: route.pattern.as_str(),
                    captures,
                })
            })
    }

    /// Number of registered routes
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Distinct methods with at least one route, in registration order
    pub fn methods(&self) -> Vec<&str> {
        let mut methods: Vec<&str> = Vec::new();
        for route in &self.routes {
            if !methods.contains(&route.method.as_str()) {
                methods.push(&route.method);
            }
        }
        methods
    }
}

impl<T> Default for Router<T> {
    fn default() -> Self {
        Self::new()
    }
}
