//! # Template Renderer
//!
//! A deliberately **small** subset of Go's `text/template`, enough for scan parameters,
//! annotations and labels:
//!
//! * literal text, copied verbatim;
//! * field actions `{{ .Service.Name }}`, resolved against a [`TemplateContext`];
//! * trim markers `{{- ` / ` -}}`, which eat the whitespace next to the action;
//! * comments `{{/* ... */}}`, which render to nothing.
//!
//! There are no functions, pipelines or conditionals. Lookups go through a fixed schema per
//! target kind (see [`context`]) and anything outside of it is rejected.

use std::collections::BTreeMap;
use std::fmt;

use autoscan_common::cluster::TargetKind;
use autoscan_common::error::TemplateError;

pub mod context;

pub use context::{ContainerContext, ServiceContext, TemplateContext};

/// A parsed template, ready to be rendered any number of times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Field(FieldPath),
}

/// Dotted path of a field action, without the leading dot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".{}", self.0)
    }
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments: Vec<Segment> = Vec::new();
        let mut text: String = String::new();
        let mut rest: &str = source;

        while let Some(open) = rest.find("{{") {
            let action_pos: usize = source.len() - rest.len() + open;
            text.push_str(&rest[..open]);

            let after_open: &str = &rest[open + 2..];
            let Some(close) = after_open.find("}}") else {
                return Err(malformed(source, action_pos, "unclosed action"));
            };
            let mut inner: &str = &after_open[..close];
            rest = &after_open[close + 2..];

            if let Some(stripped) = inner.strip_prefix('-')
                && stripped.starts_with(char::is_whitespace)
            {
                let kept: usize = text.trim_end().len();
                text.truncate(kept);
                inner = stripped;
            }
            if let Some(stripped) = inner.strip_suffix('-')
                && stripped.ends_with(char::is_whitespace)
            {
                rest = rest.trim_start();
                inner = stripped;
            }

            let action: &str = inner.trim();
            if action.starts_with("/*") {
                if !action.ends_with("*/") || action.len() < 4 {
                    return Err(malformed(source, action_pos, "unterminated comment"));
                }
                continue;
            }

            let path: FieldPath = parse_field(action)
                .map_err(|reason| malformed(source, action_pos, &reason))?;
            if !text.is_empty() {
                segments.push(Segment::Text(std::mem::take(&mut text)));
            }
            segments.push(Segment::Field(path));
        }

        text.push_str(rest);
        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Every field the template references, in order of appearance.
    pub fn fields(&self) -> impl Iterator<Item = &FieldPath> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Field(path) => Some(path),
            Segment::Text(_) => None,
        })
    }

    /// Fails on the first field that is not part of `kind`'s schema.
    pub fn check_fields(&self, kind: TargetKind) -> Result<(), TemplateError> {
        let schema: &[&str] = context::schema(kind);
        match self.fields().find(|path| !schema.contains(&path.as_str())) {
            Some(path) => Err(TemplateError::UndefinedField {
                template: self.source.clone(),
                field: path.as_str().to_string(),
            }),
            None => Ok(()),
        }
    }

    pub fn render(&self, ctx: &dyn TemplateContext) -> Result<String, TemplateError> {
        let mut out: String = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Field(path) => {
                    let value: String =
                        ctx.lookup(path.as_str())
                            .ok_or_else(|| TemplateError::UndefinedField {
                                template: self.source.clone(),
                                field: path.as_str().to_string(),
                            })?;
                    out.push_str(&value);
                }
            }
        }
        Ok(out)
    }
}

/// Renders each template independently, keeping order.
pub fn render(templates: &[Template], ctx: &dyn TemplateContext) -> Result<Vec<String>, TemplateError> {
    templates.iter().map(|template| template.render(ctx)).collect()
}

/// Renders the values of a keyed template set; keys are copied as-is.
pub fn render_map(
    templates: &BTreeMap<String, Template>,
    ctx: &dyn TemplateContext,
) -> Result<BTreeMap<String, String>, TemplateError> {
    templates
        .iter()
        .map(|(key, template)| Ok((key.clone(), template.render(ctx)?)))
        .collect()
}

fn parse_field(action: &str) -> Result<FieldPath, String> {
    if action.is_empty() {
        return Err("empty action".to_string());
    }
    let Some(path) = action.strip_prefix('.') else {
        return Err(format!("'{action}' is not a field reference"));
    };
    if path.is_empty() {
        return Err("bare '.' is not supported".to_string());
    }
    for ident in path.split('.') {
        if !is_identifier(ident) {
            return Err(format!("'{action}' is not a valid field path"));
        }
    }
    Ok(FieldPath(path.to_string()))
}

fn is_identifier(ident: &str) -> bool {
    let mut chars = ident.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

fn malformed(source: &str, position: usize, reason: &str) -> TemplateError {
    TemplateError::Malformed {
        template: source.to_string(),
        position,
        reason: reason.to_string(),
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
