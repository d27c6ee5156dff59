use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::context::Context;

fn context_placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*context\.([^{}\s]+)\s*\}\}").expect("valid placeholder regex")
    })
}

fn key_placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("valid placeholder regex")
    })
}

/// Replace `{{context.KEY}}` with the context value.
///
/// Keys that are absent or hold a non-scalar value become `{{UNDEFINED:KEY}}`.
pub fn render_context_placeholders(message: &str, ctx: &Context) -> String {
    context_placeholder()
        .replace_all(message, |caps: &Captures| {
            let key = &caps[1];
            ctx.get_text(key)
                .unwrap_or_else(|| format!("{{{{UNDEFINED:{}}}}}", key))
        })
        .into_owned()
}

/// Replace `{{KEY}}` (or `{{context.KEY}}`) with the context value, or with
/// nothing when the key is absent.
pub fn render_prompt(template: &str, ctx: &Context) -> String {
    key_placeholder()
        .replace_all(template, |caps: &Captures| {
            let key = &caps[1];
            let key = key.strip_prefix("context.").unwrap_or(key);
            ctx.get_text(key).unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_placeholder_present() {
        let mut ctx = Context::new();
        ctx.set("name", "Bob");
        assert_eq!(render_context_placeholders("Hi {{context.name}}", &ctx), "Hi Bob");
    }

    #[test]
    fn test_context_placeholder_absent() {
        let ctx = Context::new();
        assert_eq!(
            render_context_placeholders("Hi {{context.name}}", &ctx),
            "Hi {{UNDEFINED:name}}"
        );
    }

    #[test]
    fn test_context_placeholder_non_scalar() {
        let mut ctx = Context::new();
        ctx.set("tags", serde_json::json!(["a"]));
        ctx.set("count", 3);
        assert_eq!(
            render_context_placeholders("{{context.tags}} / {{ context.count }}", &ctx),
            "{{UNDEFINED:tags}} / 3"
        );
    }

    #[test]
    fn test_other_braces_untouched() {
        let ctx = Context::new();
        assert_eq!(
            render_context_placeholders("{{name}} {single}", &ctx),
            "{{name}} {single}"
        );
    }

    #[test]
    fn test_render_prompt() {
        let mut ctx = Context::new();
        ctx.set("github.issue.title", "Crash on start");
        ctx.set("github.issue.body", "Stack trace...");
        let out = render_prompt(
            "T: {{github.issue.title}}\nB: {{context.github.issue.body}}\nX: {{missing}}",
            &ctx,
        );
        assert_eq!(out, "T: Crash on start\nB: Stack trace...\nX: ");
    }
}
