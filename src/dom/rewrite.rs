//! Makes a fetched page usable away from its origin.
//!
//! Resource references become absolute, navigation either loops back
//! through the proxy or opens the original target, policy tags that would
//! fight the injected theme are dropped, and the theme layer is appended.

use url::form_urlencoded;
use url::Url;

use crate::config::ProxyConfig;
use crate::dom::parser::{parse_fragment_into, parse_html};
use crate::dom::serialize::serialize;
use crate::dom::{Document, ElementData, NodeId, NodeKind};
use crate::engine::style::{NavigationMode, StyleResolution};
use crate::net::guard::ResolvedUrl;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteStrategy {
    /// Single URL resolved against the base
    Resource,
    /// Comma-separated `url descriptor` candidates
    SourceSet,
    /// Link target, handled per navigation mode
    Navigation,
}

/// Attributes touched by the rewriter and how.
pub const ATTRIBUTE_RULES: &[(&str, RewriteStrategy)] = &[
    ("src", RewriteStrategy::Resource),
    ("poster", RewriteStrategy::Resource),
    ("data", RewriteStrategy::Resource),
    ("srcset", RewriteStrategy::SourceSet),
    ("href", RewriteStrategy::Navigation),
    ("action", RewriteStrategy::Navigation),
];

/// Navigation values left exactly as authored.
const PASSTHROUGH_PREFIXES: &[&str] = &["javascript:", "mailto:", "tel:"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteError {
    Unparseable,
}

impl std::fmt::Display for RewriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RewriteError::Unparseable => write!(f, "document is empty or not text"),
        }
    }
}

impl std::error::Error for RewriteError {}

/// Per-page inputs to one rewrite pass.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    pub base_url: ResolvedUrl,
    pub navigation: NavigationMode,
    pub active_preset: String,
    pub style_markup: String,
}

impl RewriteContext {
    pub fn new(base_url: ResolvedUrl, style: StyleResolution) -> Self {
        Self {
            base_url,
            navigation: style.navigation,
            active_preset: style.active_preset,
            style_markup: style.markup,
        }
    }
}

pub struct DocumentRewriter {
    proxy_path: String,
    font_stylesheets: Vec<String>,
}

impl DocumentRewriter {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            proxy_path: config.proxy_path.clone(),
            font_stylesheets: config.font_stylesheets.clone(),
        }
    }

    pub fn rewrite(&self, html: &str, ctx: &RewriteContext) -> Result<String, RewriteError> {
        if html.trim().is_empty() || html.contains('\0') {
            return Err(RewriteError::Unparseable);
        }

        let mut doc = parse_html(html);
        let base = ctx.base_url.as_url();

        for id in doc.elements() {
            self.rewrite_element(&mut doc, id, base, ctx);
        }

        strip_policy_tags(&mut doc);
        self.inject_head(&mut doc, ctx);

        serialize(&doc).map_err(|e| {
            log::error!("serializing rewritten document failed: {}", e);
            RewriteError::Unparseable
        })
    }

    fn rewrite_element(&self, doc: &mut Document, id: NodeId, base: &Url, ctx: &RewriteContext) {
        let Some(el) = doc.element_mut(id) else {
            return;
        };

        let mut open_externally = false;
        for (name, strategy) in ATTRIBUTE_RULES {
            let Some(value) = el.attr(name).filter(|v| !v.is_empty()) else {
                continue;
            };
            let rewritten = match strategy {
                RewriteStrategy::Resource => resolve(base, value).ok(),
                RewriteStrategy::SourceSet => Some(rewrite_srcset(base, value)),
                RewriteStrategy::Navigation => {
                    let target = self.navigation_target(base, value, ctx);
                    if target.is_some() && ctx.navigation == NavigationMode::ExternalOpen {
                        open_externally = true;
                    }
                    target
                }
            };
            if let Some(new_value) = rewritten {
                el.set_attr(name, new_value);
            }
        }

        if open_externally {
            el.set_attr("target", "_blank");
        }
    }

    /// New value for an `href`/`action`, or `None` to leave it alone.
    fn navigation_target(&self, base: &Url, value: &str, ctx: &RewriteContext) -> Option<String> {
        let trimmed = value.trim_start();
        if trimmed.starts_with('#') || has_passthrough_scheme(trimmed) {
            return None;
        }

        if let Some(inner) = self.proxied_target(trimmed) {
            return match ctx.navigation {
                NavigationMode::Rewriting => None,
                NavigationMode::ExternalOpen => Some(inner),
            };
        }

        let absolute = resolve(base, value).ok()?;
        match ctx.navigation {
            NavigationMode::Rewriting => Some(self.proxy_call(&absolute, &ctx.active_preset)),
            NavigationMode::ExternalOpen => Some(absolute),
        }
    }

    /// Same-origin URL that feeds `target` back through the proxy.
    pub fn proxy_call(&self, target: &str, preset: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("url", target)
            .append_pair("theme", preset)
            .finish();
        format!("{}?{}", self.proxy_path, query)
    }

    /// The `url` carried by a call [`proxy_call`](Self::proxy_call) produced.
    ///
    /// Only the exact `url` + `theme` shape counts, so a page linking to its
    /// own path that happens to match ours is still treated as a page link.
    fn proxied_target(&self, value: &str) -> Option<String> {
        let query = value.strip_prefix(self.proxy_path.as_str())?.strip_prefix('?')?;
        let mut pairs = form_urlencoded::parse(query.as_bytes());
        let (url, theme) = (pairs.next()?, pairs.next()?);
        if pairs.next().is_some() || url.0 != "url" || theme.0 != "theme" {
            return None;
        }
        Some(url.1.into_owned())
    }

    fn inject_head(&self, doc: &mut Document, ctx: &RewriteContext) {
        let Some(head) = doc.first_element_by_tag("head") else {
            return;
        };
        for href in &self.font_stylesheets {
            let mut link = ElementData::new("link");
            link.set_attr("href", href.as_str());
            link.set_attr("rel", "stylesheet");
            doc.append(head, NodeKind::Element(link));
        }
        parse_fragment_into(doc, head, &ctx.style_markup);
    }
}

fn has_passthrough_scheme(value: &str) -> bool {
    PASSTHROUGH_PREFIXES.iter().any(|prefix| {
        value
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    })
}

/// Standard relative resolution; absolute inputs come back normalized.
fn resolve(base: &Url, value: &str) -> Result<String, url::ParseError> {
    base.join(value).map(String::from)
}

/// Resolve each candidate URL and keep its descriptor, including an empty one.
fn rewrite_srcset(base: &Url, value: &str) -> String {
    value
        .split(',')
        .map(str::trim)
        .filter(|candidate| !candidate.is_empty())
        .map(|candidate| {
            let (url, descriptor) = match candidate.split_once(char::is_whitespace) {
                Some((url, rest)) => (url, rest.trim()),
                None => (candidate, ""),
            };
            let resolved = resolve(base, url).unwrap_or_else(|_| url.to_string());
            format!("{} {}", resolved, descriptor)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Drop CSP `<meta>` tags and every `<base>`.
fn strip_policy_tags(doc: &mut Document) {
    let doomed: Vec<NodeId> = doc
        .elements()
        .into_iter()
        .filter(|id| {
            doc.element(*id).is_some_and(|el| match el.tag() {
                "base" => true,
                "meta" => el
                    .attr("http-equiv")
                    .is_some_and(|v| v.trim().eq_ignore_ascii_case("content-security-policy")),
                _ => false,
            })
        })
        .collect();
    for id in doomed {
        doc.detach(id);
    }
}
