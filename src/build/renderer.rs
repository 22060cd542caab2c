//! Turns a template plus merged variables into one or more output files.

use std::collections::BTreeMap;
use std::collections::HashMap;

use anyhow::Result;
use regex_lite::Regex;
use tera::{Context, Tera};

use crate::models::{Template, template_kind};

/// Typed render failures, downcast by the API layer for status mapping.
#[derive(Debug)]
pub enum RenderError {
    UnknownTemplateType { template_id: i64, kind: String },
    EmptyPath { template_id: i64 },
    Template { template_id: i64, reason: String },
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::UnknownTemplateType { template_id, kind } => {
                write!(f, "template {}: unknown template type: {}", template_id, kind)
            }
            RenderError::EmptyPath { template_id } => {
                write!(f, "template {} has empty path", template_id)
            }
            RenderError::Template { template_id, reason } => {
                write!(f, "template {} render: {}", template_id, reason)
            }
        }
    }
}

impl std::error::Error for RenderError {}

/// Expands a substituted structured-config document into a file map.
/// When no backend is configured the document is emitted verbatim at the
/// template's own path.
pub trait StructuredBackend: Send + Sync {
    fn expand(&self, document: &str) -> Result<BTreeMap<String, String>>;
}

#[derive(Default)]
pub struct Renderer {
    backend: Option<Box<dyn StructuredBackend>>,
}

impl Renderer {
    pub fn new() -> Self {
        Self { backend: None }
    }

    pub fn with_backend(backend: Box<dyn StructuredBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// Render one template. Returns path -> content; a structured backend
    /// may fan a single template out into several files.
    pub fn render_one(
        &self,
        template: &Template,
        vars: &HashMap<String, String>,
    ) -> Result<BTreeMap<String, String>> {
        let kind = template.kind.trim().to_lowercase();
        match kind.as_str() {
            "" | template_kind::GO => {
                let body = substitute(template.id, &template.body, vars)?;
                let path = clean_path(&template.path);
                if path.is_empty() {
                    return Err(RenderError::EmptyPath {
                        template_id: template.id,
                    }
                    .into());
                }
                let mut out = BTreeMap::new();
                out.insert(path, body);
                Ok(out)
            }
            template_kind::NETJSON => {
                let document = substitute(template.id, &template.body, vars)?;
                if let Some(backend) = &self.backend {
                    return backend.expand(&document);
                }
                let path = clean_path(&template.path);
                if path.is_empty() {
                    return Err(RenderError::EmptyPath {
                        template_id: template.id,
                    }
                    .into());
                }
                let mut out = BTreeMap::new();
                out.insert(path, document);
                Ok(out)
            }
            other => Err(RenderError::UnknownTemplateType {
                template_id: template.id,
                kind: other.to_string(),
            }
            .into()),
        }
    }
}

/// Archive paths are always relative.
fn clean_path(path: &str) -> String {
    path.trim().trim_start_matches('/').to_string()
}

/// Substitute `{{ vars.<key> }}` references. Keys the merged map does not
/// carry are pre-seeded empty so a template never fails on a missing key.
fn substitute(
    template_id: i64,
    body: &str,
    vars: &HashMap<String, String>,
) -> Result<String> {
    let mut seeded: HashMap<&str, &str> = HashMap::with_capacity(vars.len());
    for (k, v) in vars {
        seeded.insert(k, v);
    }
    if let Ok(re) = Regex::new(r"vars\.([A-Za-z_][A-Za-z0-9_]*)") {
        for cap in re.captures_iter(body) {
            if let Some(m) = cap.get(1) {
                seeded.entry(m.as_str()).or_insert("");
            }
        }
    }

    let mut ctx = Context::new();
    ctx.insert("vars", &seeded);

    Tera::one_off(body, &ctx, false).map_err(|e| {
        RenderError::Template {
            template_id,
            reason: e.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn template(id: i64, path: &str, body: &str, kind: &str) -> Template {
        Template {
            id,
            name: format!("t{}", id),
            path: path.to_string(),
            body: body.to_string(),
            kind: kind.to_string(),
            required: false,
            is_default: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn renders_text_template() {
        let r = Renderer::new();
        let t = template(
            1,
            "/etc/config/system",
            "option hostname '{{ vars.hostname }}'\n",
            "go",
        );
        let out = r.render_one(&t, &vars(&[("hostname", "ap-1")])).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out["etc/config/system"], "option hostname 'ap-1'\n");
    }

    #[test]
    fn missing_keys_render_empty() {
        let r = Renderer::new();
        let t = template(2, "etc/x", "a={{ vars.not_set }};b={{ vars.hostname }}", "");
        let out = r.render_one(&t, &vars(&[("hostname", "ap-1")])).unwrap();
        assert_eq!(out["etc/x"], "a=;b=ap-1");
    }

    #[test]
    fn empty_path_is_an_error() {
        let r = Renderer::new();
        let t = template(3, "  /  ", "x", "go");
        let err = r.render_one(&t, &vars(&[])).unwrap_err();
        match err.downcast_ref::<RenderError>() {
            Some(RenderError::EmptyPath { template_id }) => assert_eq!(*template_id, 3),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let r = Renderer::new();
        let t = template(4, "etc/x", "x", "jinja");
        let err = r.render_one(&t, &vars(&[])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RenderError>(),
            Some(RenderError::UnknownTemplateType { .. })
        ));
    }

    #[test]
    fn netjson_without_backend_emits_verbatim() {
        let r = Renderer::new();
        let t = template(
            5,
            "etc/netjson.json",
            r#"{"general":{"hostname":"{{ vars.hostname }}"}}"#,
            "netjson",
        );
        let out = r.render_one(&t, &vars(&[("hostname", "ap-1")])).unwrap();
        assert_eq!(out["etc/netjson.json"], r#"{"general":{"hostname":"ap-1"}}"#);
    }

    #[test]
    fn netjson_backend_fans_out() {
        struct FakeBackend;
        impl StructuredBackend for FakeBackend {
            fn expand(&self, document: &str) -> Result<BTreeMap<String, String>> {
                let mut out = BTreeMap::new();
                out.insert("etc/config/network".to_string(), document.to_string());
                out.insert("etc/config/system".to_string(), "x\n".to_string());
                Ok(out)
            }
        }
        let r = Renderer::with_backend(Box::new(FakeBackend));
        let t = template(6, "", "{}", "netjson");
        let out = r.render_one(&t, &vars(&[])).unwrap();
        assert_eq!(out.len(), 2);
    }
}
