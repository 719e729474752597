//! Math notation rendering
//!
//! Text fields may embed TeX between `$$` delimiters. [`render_delimited`]
//! finds those spans, hands each one to a [`MathRenderer`] and stitches the
//! result back together with the surrounding text HTML-escaped.
//!
//! ```ignore
//! let html = render_delimited(&MathmlRenderer, "Area: $$\\pi r^2$$")?;
//! assert!(html.unwrap().starts_with("Area: <math"));
//! ```

use latex2mathml::{latex_to_mathml, DisplayStyle};
use once_cell::sync::Lazy;
use regex::Regex;

static MATH_SPAN_REGEX: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"(?s)\$\$(.+?)\$\$"));

/// Prefix latex2mathml writes into its output for unparsable input
const PARSE_ERROR_MARKER: &str = "[PARSE ERROR";

/// Error raised while rendering a math span
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    #[error("unbalanced braces in `{0}`")]
    UnbalancedBraces(String),
    #[error("invalid math `{tex}`: {message}")]
    Syntax { tex: String, message: String },
    #[error("math span pattern failed to compile: {0}")]
    Pattern(String),
}

/// Converts a single TeX expression to markup
pub trait MathRenderer: Send + Sync {
    fn render(&self, tex: &str) -> Result<String, MathError>;
}

/// Renders TeX to MathML
#[derive(Debug, Clone, Copy, Default)]
pub struct MathmlRenderer;

impl MathRenderer for MathmlRenderer {
    fn render(&self, tex: &str) -> Result<String, MathError> {
        let tex = tex.trim();
        check_braces(tex)?;
        let mathml = latex_to_mathml(tex, DisplayStyle::Block).map_err(|e| MathError::Syntax {
            tex: tex.to_string(),
            message: e.to_string(),
        })?;

        // Most parse failures come back inline instead of as an `Err`
        if let Some(start) = mathml.find(PARSE_ERROR_MARKER) {
            let message = mathml[start + 1..]
                .split(']')
                .next()
                .unwrap_or_default()
                .to_string();
            return Err(MathError::Syntax {
                tex: tex.to_string(),
                message,
            });
        }
        Ok(mathml)
    }
}

/// Reject `{`/`}` mismatches, ignoring escaped braces
fn check_braces(tex: &str) -> Result<(), MathError> {
    let mut depth: i32 = 0;
    let mut escaped = false;
    for c in tex.chars() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return Err(MathError::UnbalancedBraces(tex.to_string()));
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(MathError::UnbalancedBraces(tex.to_string()));
    }
    Ok(())
}

/// Render every `$$...$$` span in `text`.
///
/// Returns `Ok(None)` when the text has no span, so callers can leave the
/// rendered field empty. The first failing span aborts the whole field.
pub fn render_delimited(
    renderer: &dyn MathRenderer,
    text: &str,
) -> Result<Option<String>, MathError> {
    let regex = MATH_SPAN_REGEX
        .as_ref()
        .map_err(|e| MathError::Pattern(e.to_string()))?;

    let mut output = String::with_capacity(text.len());
    let mut last = 0;
    let mut found = false;

    for captures in regex.captures_iter(text) {
        let (Some(whole), Some(tex)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        found = true;
        output.push_str(&html_escape(&text[last..whole.start()]));
        output.push_str(&renderer.render(tex.as_str())?);
        last = whole.end();
    }

    if !found {
        return Ok(None);
    }
    output.push_str(&html_escape(&text[last..]));
    Ok(Some(output))
}

/// Escape HTML special characters
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Wraps TeX in a marker element and fails on anything containing `\fail`
    pub struct StubRenderer;

    impl MathRenderer for StubRenderer {
        fn render(&self, tex: &str) -> Result<String, MathError> {
            if tex.contains("\\fail") {
                return Err(MathError::Syntax {
                    tex: tex.to_string(),
                    message: "stub failure".to_string(),
                });
            }
            Ok(format!("<m>{}</m>", tex))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::StubRenderer;
    use super::*;

    #[test]
    fn test_text_without_span_is_not_rendered() {
        assert_eq!(render_delimited(&StubRenderer, "no math here").unwrap(), None);
        assert_eq!(render_delimited(&StubRenderer, "single $$ only").unwrap(), None);
        assert_eq!(render_delimited(&StubRenderer, "$$$$").unwrap(), None);
    }

    #[test]
    fn test_spans_are_rendered_and_text_escaped() {
        let out = render_delimited(&StubRenderer, "a<b $$x^2$$ & $$y$$!")
            .unwrap()
            .unwrap();
        assert_eq!(out, "a&lt;b <m>x^2</m> &amp; <m>y</m>!");
    }

    #[test]
    fn test_span_may_cross_lines() {
        let out = render_delimited(&StubRenderer, "$$a\n+b$$").unwrap().unwrap();
        assert_eq!(out, "<m>a\n+b</m>");
    }

    #[test]
    fn test_render_failure_propagates() {
        let err = render_delimited(&StubRenderer, "ok $$x$$ bad $$\\fail$$").unwrap_err();
        assert!(matches!(err, MathError::Syntax { .. }));
    }

    #[test]
    fn test_mathml_renderer_produces_math_element() {
        let out = render_delimited(&MathmlRenderer, "Area $$\\pi r^2$$")
            .unwrap()
            .unwrap();
        assert!(out.starts_with("Area "));
        assert!(out.contains("<math"));
    }

    #[test]
    fn test_mathml_renderer_rejects_unbalanced_braces() {
        assert_eq!(
            MathmlRenderer.render("\\frac{"),
            Err(MathError::UnbalancedBraces("\\frac{".to_string()))
        );
        assert!(MathmlRenderer.render("a}{b").is_err());
        assert_eq!(check_braces("\\{ a"), Ok(()));
    }

    #[test]
    fn test_mathml_renderer_rejects_malformed_tex() {
        for tex in ["\\undefinedcmd", "x^", "\\frac"] {
            match MathmlRenderer.render(tex) {
                Err(MathError::Syntax { tex: failed, message }) => {
                    assert_eq!(failed, tex);
                    assert!(message.starts_with("PARSE ERROR"), "{}", message);
                }
                other => panic!("{:?} rendered as {:?}", tex, other),
            }
        }
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("<a href=\"x\">'&'</a>"), "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;");
    }
}
