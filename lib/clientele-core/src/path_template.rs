//! Path templates for typed-client bindings.
//!
//! A template like `/items/{id}` is parsed once at registration time, and its
//! placeholders are validated against the parameters supplied at call time.

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

use crate::{Error, Result};

/// Characters percent-encoded inside a substituted path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed path template with named placeholders.
///
/// # Example
///
/// ```
/// use clientele_core::PathTemplate;
///
/// let template = PathTemplate::parse("/items/{id}").expect("valid template");
/// assert_eq!(template.params(), ["id"]);
/// assert_eq!(template.render(&[("id", "42")]).expect("render"), "/items/42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    template: String,
    segments: Vec<Segment>,
    params: Vec<String>,
}

impl PathTemplate {
    /// Parse a template, validating its placeholders.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTemplate`] on unterminated or nested braces,
    /// empty or malformed placeholder names, or duplicate placeholders.
    pub fn parse(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        let mut segments = Vec::new();
        let mut params = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars();

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') => {
                                return Err(Error::invalid_template(
                                    template,
                                    "nested placeholder brace",
                                ));
                            }
                            Some(c) => name.push(c),
                            None => {
                                return Err(Error::invalid_template(
                                    template,
                                    "unterminated placeholder",
                                ));
                            }
                        }
                    }
                    if name.is_empty() {
                        return Err(Error::invalid_template(template, "empty placeholder name"));
                    }
                    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                        return Err(Error::invalid_template(
                            template,
                            format!("invalid placeholder name '{name}'"),
                        ));
                    }
                    if params.contains(&name) {
                        return Err(Error::invalid_template(
                            template,
                            format!("duplicate placeholder '{name}'"),
                        ));
                    }
                    params.push(name.clone());
                    segments.push(Segment::Placeholder(name));
                }
                '}' => {
                    return Err(Error::invalid_template(
                        template,
                        "closing brace without matching open",
                    ));
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            template,
            segments,
            params,
        })
    }

    /// The original template string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Placeholder names in order of appearance.
    #[must_use]
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Substitute placeholders with the given `(name, value)` pairs.
    ///
    /// Values are percent-encoded. Every placeholder must be bound and every
    /// supplied parameter must match a placeholder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] on a missing or unknown parameter.
    pub fn render(&self, params: &[(&str, &str)]) -> Result<String> {
        for (name, _) in params {
            if !self.params.iter().any(|p| p == name) {
                return Err(Error::invalid_request(format!(
                    "unknown path parameter '{name}' for template '{}'",
                    self.template
                )));
            }
        }

        let mut rendered = String::with_capacity(self.template.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => rendered.push_str(text),
                Segment::Placeholder(name) => {
                    let value = params
                        .iter()
                        .find(|(n, _)| n == name)
                        .map(|(_, v)| *v)
                        .ok_or_else(|| {
                            Error::invalid_request(format!(
                                "missing path parameter '{name}' for template '{}'",
                                self.template
                            ))
                        })?;
                    rendered.extend(utf8_percent_encode(value, PATH_SEGMENT));
                }
            }
        }
        Ok(rendered)
    }
}

impl std::fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.template)
    }
}

impl AsRef<str> for PathTemplate {
    fn as_ref(&self) -> &str {
        &self.template
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_collects_params_in_order() {
        let template = PathTemplate::parse("/users/{id}/posts/{post_id}").expect("parse");
        assert_eq!(template.params(), ["id", "post_id"]);
        assert_eq!(template.as_str(), "/users/{id}/posts/{post_id}");
    }

    #[test]
    fn parse_without_placeholders() {
        let template = PathTemplate::parse("/helloworld").expect("parse");
        assert!(template.params().is_empty());
        assert_eq!(template.render(&[]).expect("render"), "/helloworld");
    }

    #[test]
    fn parse_rejects_malformed_templates() {
        assert!(PathTemplate::parse("/items/{").is_err());
        assert!(PathTemplate::parse("/items/{}").is_err());
        assert!(PathTemplate::parse("/items/{a{b}}").is_err());
        assert!(PathTemplate::parse("/items/id}").is_err());
        assert!(PathTemplate::parse("/items/{bad name}").is_err());
        assert!(PathTemplate::parse("/items/{id}/{id}").is_err());
    }

    #[test]
    fn render_substitutes_values() {
        let template = PathTemplate::parse("/items/{id}").expect("parse");
        assert_eq!(template.render(&[("id", "42")]).expect("render"), "/items/42");
    }

    #[test]
    fn render_percent_encodes_values() {
        let template = PathTemplate::parse("/search/{term}").expect("parse");
        let rendered = template.render(&[("term", "a b/c")]).expect("render");
        assert_eq!(rendered, "/search/a%20b%2Fc");
    }

    #[test]
    fn render_rejects_missing_parameter() {
        let template = PathTemplate::parse("/items/{id}").expect("parse");
        let err = template.render(&[]).expect_err("should fail");
        assert!(err.to_string().contains("missing path parameter 'id'"));
    }

    #[test]
    fn render_rejects_unknown_parameter() {
        let template = PathTemplate::parse("/items/{id}").expect("parse");
        let err = template
            .render(&[("id", "1"), ("extra", "2")])
            .expect_err("should fail");
        assert!(err.to_string().contains("unknown path parameter 'extra'"));
    }
}
