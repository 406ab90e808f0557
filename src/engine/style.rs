//! Theme layer selection.
//!
//! Presets are linked from the stylesheet catalog; ad-hoc stylesheets are
//! inlined. Inlined text may be arbitrarily large and cannot ride along in a
//! rewritten link, so an ad-hoc theme turns proxied navigation off.

use url::form_urlencoded;

use crate::config::ProxyConfig;

/// Requested theme for one proxied page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StyleMode {
    #[default]
    Default,
    Preset(String),
    AdHoc(String),
}

impl StyleMode {
    /// Build from the optional wire fields. A non-empty stylesheet wins over
    /// any preset name; blank values count as absent.
    pub fn from_parts(theme: Option<&str>, custom_css: Option<&str>) -> Self {
        if let Some(css) = custom_css.filter(|css| !css.trim().is_empty()) {
            return StyleMode::AdHoc(css.to_string());
        }
        match theme.map(str::trim).filter(|t| !t.is_empty()) {
            Some(name) => StyleMode::Preset(name.to_string()),
            None => StyleMode::Default,
        }
    }
}

/// Whether outgoing links re-enter the proxy or leave it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationMode {
    Rewriting,
    ExternalOpen,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleResolution {
    /// Markup appended to `<head>`
    pub markup: String,
    pub navigation: NavigationMode,
    /// Preset carried by rewritten links
    pub active_preset: String,
}

pub struct StyleResolver {
    default_preset: String,
    themes_path: String,
}

impl StyleResolver {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            default_preset: config.default_preset.clone(),
            themes_path: config.themes_path.clone(),
        }
    }

    pub fn resolve(&self, mode: &StyleMode) -> StyleResolution {
        match mode {
            StyleMode::AdHoc(css) => StyleResolution {
                markup: format!(
                    r#"<style id="webskin-ai-theme">{}</style>"#,
                    neutralize_style_close(css)
                ),
                navigation: NavigationMode::ExternalOpen,
                active_preset: self.default_preset.clone(),
            },
            StyleMode::Preset(name) if !name.trim().is_empty() => self.preset(name.trim()),
            _ => self.preset(&self.default_preset),
        }
    }

    fn preset(&self, name: &str) -> StyleResolution {
        // Percent-encoding keeps the name inside one path segment and the attribute
        let segment: String = form_urlencoded::byte_serialize(name.as_bytes()).collect();
        StyleResolution {
            markup: format!(
                r#"<link rel="stylesheet" href="{}/{}.css" id="webskin-theme">"#,
                self.themes_path, segment
            ),
            navigation: NavigationMode::Rewriting,
            active_preset: name.to_string(),
        }
    }
}

/// Break every `</style` (any case) so the block cannot be closed early.
fn neutralize_style_close(css: &str) -> String {
    const NEEDLE: &[u8] = b"</style";
    let bytes = css.as_bytes();
    let mut out = String::with_capacity(css.len());
    let mut last = 0;
    let mut i = 0;
    while i + NEEDLE.len() <= bytes.len() {
        if bytes[i..i + NEEDLE.len()].eq_ignore_ascii_case(NEEDLE) {
            out.push_str(&css[last..i]);
            out.push_str("<\\/");
            last = i + 2;
            i += NEEDLE.len();
        } else {
            i += 1;
        }
    }
    out.push_str(&css[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> StyleResolver {
        StyleResolver::new(&ProxyConfig::default())
    }

    #[test]
    fn preset_links_catalog_stylesheet() {
        let res = resolver().resolve(&StyleMode::Preset("neon".into()));
        assert_eq!(
            res.markup,
            r#"<link rel="stylesheet" href="/themes/neon.css" id="webskin-theme">"#
        );
        assert_eq!(res.navigation, NavigationMode::Rewriting);
        assert_eq!(res.active_preset, "neon");
    }

    #[test]
    fn missing_preset_uses_default() {
        let res = resolver().resolve(&StyleMode::Default);
        assert!(res.markup.contains("/themes/pixel.css"));
        assert_eq!(res.active_preset, "pixel");

        let blank = resolver().resolve(&StyleMode::Preset("  ".into()));
        assert_eq!(blank, res);
    }

    #[test]
    fn adhoc_is_inlined_and_disables_proxy_navigation() {
        let res = resolver().resolve(&StyleMode::AdHoc("body { color: red; }".into()));
        assert_eq!(
            res.markup,
            r#"<style id="webskin-ai-theme">body { color: red; }</style>"#
        );
        assert_eq!(res.navigation, NavigationMode::ExternalOpen);
    }

    #[test]
    fn adhoc_cannot_close_its_style_block() {
        let res = resolver().resolve(&StyleMode::AdHoc(
            "a{}</STYLE><script>alert(1)</script>".into(),
        ));
        assert!(!res.markup.to_ascii_lowercase().contains("</style><script>"));
        assert!(res.markup.contains(r"a{}<\/STYLE><script>"));
        assert!(res.markup.ends_with("</style>"));
    }

    #[test]
    fn preset_name_is_encoded() {
        let res = resolver().resolve(&StyleMode::Preset(r#"x"><script>"#.into()));
        assert!(res.markup.contains(r#"href="/themes/x%22%3E%3Cscript%3E.css""#));

        let res = resolver().resolve(&StyleMode::Preset("../admin".into()));
        assert!(res.markup.contains(r#"href="/themes/..%2Fadmin.css""#));
    }

    #[test]
    fn from_parts_prefers_stylesheet_text() {
        assert_eq!(
            StyleMode::from_parts(Some("pixel"), Some("p{}")),
            StyleMode::AdHoc("p{}".into())
        );
        assert_eq!(
            StyleMode::from_parts(Some("pixel"), Some("")),
            StyleMode::Preset("pixel".into())
        );
        assert_eq!(StyleMode::from_parts(None, None), StyleMode::Default);
        assert_eq!(StyleMode::from_parts(Some(" "), None), StyleMode::Default);
    }
}
