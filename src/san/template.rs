//! Subject name template rendering
//!
//! Templates use the manifest placeholder syntax `{{.NAME}}`, optionally with
//! inner whitespace and `-` trim markers (`{{- .NAME -}}`). Placeholders are
//! rewritten into minijinja lookups and rendered with strict undefined
//! handling, so a name outside the supported set fails instead of rendering
//! empty into a certificate identity.

use minijinja::{context, Environment, ErrorKind, UndefinedBehavior};
use thiserror::Error;

use crate::config::GenerationSettings;

/// Placeholder for the external domain
pub const DOMAIN: &str = "DOMAIN";

/// Placeholder for the Kubernetes namespace
pub const KUBERNETES_NAMESPACE: &str = "KUBERNETES_NAMESPACE";

/// Placeholder for the service domain suffix
pub const KUBE_SERVICE_DOMAIN_SUFFIX: &str = "KUBE_SERVICE_DOMAIN_SUFFIX";

/// Context variable the rewritten placeholders look names up in
const VALUES: &str = "values";

/// Why a template could not be rendered
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// `{{` without a matching `}}`
    #[error("unterminated placeholder")]
    Unterminated,
    /// Placeholder body is not of the form `.NAME`
    #[error("malformed placeholder '{{{{{0}}}}}'")]
    Malformed(String),
    /// Placeholder name outside the supported set
    #[error("unknown placeholder '{0}'")]
    UnknownPlaceholder(String),
    /// Template engine failure
    #[error("template render error: {0}")]
    Render(String),
}

impl From<minijinja::Error> for TemplateError {
    fn from(err: minijinja::Error) -> Self {
        Self::Render(err.to_string())
    }
}

/// Template rewritten for minijinja plus the names it references, in order
struct Translated {
    source: String,
    names: Vec<String>,
}

fn is_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Emit literal text, quoting anything minijinja would read as a tag
fn push_literal(out: &mut String, text: &str) {
    let mut rest = text;
    while let Some(pos) = rest.find('{') {
        let (head, tail) = rest.split_at(pos);
        out.push_str(head);
        if tail.starts_with("{%") || tail.starts_with("{#") {
            out.push_str(&format!("{{{{ {:?} }}}}", &tail[..2]));
            rest = &tail[2..];
        } else {
            out.push_str(&tail[..1]);
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
}

/// Rewrite `{{ .NAME }}` into `{{ values["NAME"] }}`, keeping trim markers
fn translate(template: &str) -> Result<Translated, TemplateError> {
    let mut source = String::with_capacity(template.len());
    let mut names = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        push_literal(&mut source, &rest[..start]);
        let after_open = &rest[start + 2..];
        let end = after_open.find("}}").ok_or(TemplateError::Unterminated)?;
        let raw = &after_open[..end];

        let (lead, inner) = match raw.strip_prefix('-') {
            Some(inner) if inner.starts_with(char::is_whitespace) => ("-", inner),
            _ => ("", raw),
        };
        let (inner, trail) = match inner.strip_suffix('-') {
            Some(inner) if inner.ends_with(char::is_whitespace) => (inner, "-"),
            _ => (inner, ""),
        };

        let body = inner.trim();
        let name = body
            .strip_prefix('.')
            .filter(|name| is_name(name))
            .ok_or_else(|| TemplateError::Malformed(body.to_string()))?;

        source.push_str(&format!("{{{{{} {}[{:?}] {}}}}}", lead, VALUES, name, trail));
        names.push(name.to_string());
        rest = &after_open[end + 2..];
    }
    push_literal(&mut source, rest);

    Ok(Translated { source, names })
}

fn environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);
    env
}

fn is_supported(name: &str) -> bool {
    matches!(name, DOMAIN | KUBERNETES_NAMESPACE | KUBE_SERVICE_DOMAIN_SUFFIX)
}

/// Substitute every placeholder in `template`
pub fn render(template: &str, settings: &GenerationSettings) -> Result<String, TemplateError> {
    let translated = translate(template)?;
    if translated.names.is_empty() {
        return Ok(template.to_string());
    }

    let ctx = context! {
        values => context! {
            DOMAIN => settings.domain.as_str(),
            KUBERNETES_NAMESPACE => settings.namespace.as_str(),
            KUBE_SERVICE_DOMAIN_SUFFIX => settings.service_domain_suffix.as_str(),
        },
    };

    environment()
        .render_str(&translated.source, ctx)
        .map_err(|err| match err.kind() {
            ErrorKind::UndefinedError => translated
                .names
                .iter()
                .find(|name| !is_supported(name))
                .map(|name| TemplateError::UnknownPlaceholder(name.clone()))
                .unwrap_or_else(|| TemplateError::from(err)),
            _ => TemplateError::from(err),
        })
}
