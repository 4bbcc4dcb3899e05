//! Path templates such as `/widgets/{id}/parts/{part}`.
//!
//! Placeholders fill whole segments. Rendering escapes each value as a single
//! segment, so a `/` inside a value never changes the route.

use crate::message::escape_component;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// A parsed path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Parses a template. The error text describes the offending segment.
    pub fn parse(template: &str) -> Result<Self, String> {
        let mut segments = Vec::new();
        for part in template.trim_start_matches('/').split('/') {
            let opens = part.matches('{').count();
            let closes = part.matches('}').count();
            if opens == 0 && closes == 0 {
                segments.push(Segment::Literal(part.to_string()));
                continue;
            }
            let inner = part.strip_prefix('{').and_then(|p| p.strip_suffix('}'));
            match inner {
                Some(name) if opens == 1 && closes == 1 && !name.is_empty() => {
                    segments.push(Segment::Field(name.to_string()));
                }
                _ => return Err(format!("segment '{}' must be a literal or a single {{field}}", part)),
            }
        }
        Ok(Self { raw: template.to_string(), segments })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Placeholder field names in order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Renders an escaped path. `value` returns the unescaped text of a field;
    /// the first field without a value is returned as the error.
    pub fn render<'a>(&'a self, value: &mut dyn FnMut(&str) -> Option<String>) -> Result<String, &'a str> {
        let mut path = String::new();
        for segment in &self.segments {
            path.push('/');
            match segment {
                Segment::Literal(text) => path.push_str(text),
                Segment::Field(name) => {
                    let text = value(name).ok_or(name.as_str())?;
                    path.push_str(&escape_component(&text));
                }
            }
        }
        Ok(path)
    }

    /// Matches unescaped request segments, returning `(field, value)` captures.
    pub fn capture(&self, segments: &[String]) -> Option<Vec<(String, String)>> {
        if segments.len() != self.segments.len() {
            return None;
        }
        let mut captures = Vec::new();
        for (template, actual) in self.segments.iter().zip(segments) {
            match template {
                Segment::Literal(text) if text == actual => {}
                Segment::Literal(_) => return None,
                Segment::Field(name) => captures.push((name.clone(), actual.clone())),
            }
        }
        Some(captures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_escapes_values() {
        let template = PathTemplate::parse("/widgets/{id}/parts").unwrap();
        let path = template
            .render(&mut |field| (field == "id").then(|| "a b/c".to_string()))
            .unwrap();
        assert_eq!(path, "/widgets/a%20b%2Fc/parts");
    }

    #[test]
    fn test_render_reports_missing_field() {
        let template = PathTemplate::parse("/widgets/{id}").unwrap();
        assert_eq!(template.render(&mut |_| None), Err("id"));
    }

    #[test]
    fn test_capture() {
        let template = PathTemplate::parse("/widgets/{id}").unwrap();
        let segments = vec!["widgets".to_string(), "a/b".to_string()];
        assert_eq!(template.capture(&segments), Some(vec![("id".into(), "a/b".into())]));
        assert_eq!(template.capture(&["gadgets".to_string(), "x".to_string()]), None);
        assert_eq!(template.capture(&["widgets".to_string()]), None);
    }

    #[test]
    fn test_rejects_partial_placeholders() {
        assert!(PathTemplate::parse("/widgets/v{id}").is_err());
        assert!(PathTemplate::parse("/widgets/{}").is_err());
        assert!(PathTemplate::parse("/widgets/{id").is_err());
    }
}
