//! Rewrites references to original asset paths into their revisioned names.
//!
//! A reference is any occurrence of a manifest key that is not glued to a
//! longer file name: the characters around it must not be alphanumeric,
//! `_`, `-` or `.`. So `url(../images/logo.png)` and `src="/logo.png"` are
//! rewritten while `mylogo.png` and `logo.png.map` are left alone. Longer
//! keys win over shorter keys at the same position.
//!
//! Revisioned names never contain their original name at a boundary, so
//! rewriting an already rewritten text against the same manifest is a no-op.

use regex::Regex;

use crate::error::RevisionError;
use crate::manifest::RevisionManifest;

/// Outcome of rewriting one text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub text: String,
    pub replaced: usize,
}

/// Reference rewriter compiled from a manifest snapshot.
#[derive(Debug)]
pub struct ReferenceRewriter {
    matcher: Option<Regex>,
    manifest: RevisionManifest,
}

impl ReferenceRewriter {
    pub fn new(manifest: &RevisionManifest) -> Result<Self, RevisionError> {
        let mut originals: Vec<&str> = manifest
            .iter()
            .filter(|(original, revisioned)| !original.is_empty() && original != revisioned)
            .map(|(original, _)| original)
            .collect();
        originals.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));

        let matcher = if originals.is_empty() {
            None
        } else {
            let alternation = originals
                .iter()
                .map(|o| regex::escape(o))
                .collect::<Vec<_>>()
                .join("|");
            Some(Regex::new(&alternation)?)
        };

        Ok(Self {
            matcher,
            manifest: manifest.clone(),
        })
    }

    pub fn rewrite(&self, input: &str) -> Rewrite {
        let Some(matcher) = &self.matcher else {
            return Rewrite {
                text: input.to_string(),
                replaced: 0,
            };
        };

        let mut out = String::with_capacity(input.len());
        let mut copied = 0;
        let mut pos = 0;
        let mut replaced = 0;

        while let Some(m) = matcher.find_at(input, pos) {
            let before = input[..m.start()].chars().next_back();
            let after = input[m.end()..].chars().next();
            let bounded = !before.is_some_and(is_name_char) && !after.is_some_and(is_name_char);

            if !bounded {
                // A shorter key may still start inside the rejected match.
                pos = m.start() + input[m.start()..].chars().next().map_or(1, char::len_utf8);
                continue;
            }

            if let Some(revisioned) = self.manifest.get(m.as_str()) {
                out.push_str(&input[copied..m.start()]);
                out.push_str(revisioned);
                copied = m.end();
                replaced += 1;
            }
            pos = m.end();
        }

        out.push_str(&input[copied..]);
        Rewrite {
            text: out,
            replaced,
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewriter(pairs: &[(&str, &str)]) -> ReferenceRewriter {
        let manifest: RevisionManifest = pairs.iter().copied().collect();
        ReferenceRewriter::new(&manifest).unwrap()
    }

    #[test]
    fn rewrites_css_url() {
        let r = rewriter(&[("images/logo.png", "images/logo-abc.png")]);
        let out = r.rewrite("a { background: url(../images/logo.png); }");
        assert_eq!(out.text, "a { background: url(../images/logo-abc.png); }");
        assert_eq!(out.replaced, 1);
    }

    #[test]
    fn rewrites_every_occurrence_in_html() {
        let r = rewriter(&[
            ("css/site.css", "css/site-111.css"),
            ("js/app.js", "js/app-222.js"),
        ]);
        let html = r#"<link href="/css/site.css"><script src="js/app.js"></script><a href="css/site.css">"#;
        let out = r.rewrite(html);
        assert_eq!(
            out.text,
            r#"<link href="/css/site-111.css"><script src="js/app-222.js"></script><a href="css/site-111.css">"#
        );
        assert_eq!(out.replaced, 3);
    }

    #[test]
    fn leaves_longer_names_alone() {
        let r = rewriter(&[("logo.png", "logo-abc.png")]);
        let input = "mylogo.png logo.png.map my-logo.png";
        assert_eq!(r.rewrite(input).text, input);
    }

    #[test]
    fn prefers_longest_key() {
        let r = rewriter(&[
            ("a.png", "a-1.png"),
            ("img/a.png", "img/a-2.png"),
        ]);
        assert_eq!(r.rewrite("url(img/a.png) url(a.png)").text, "url(img/a-2.png) url(a-1.png)");
    }

    #[test]
    fn shorter_key_found_inside_rejected_longer_match() {
        let r = rewriter(&[
            ("a.png", "a-1.png"),
            ("b/a.png", "b/a-2.png"),
        ]);
        assert_eq!(r.rewrite("xb/a.png").text, "xb/a-1.png");
    }

    #[test]
    fn second_rewrite_is_a_no_op() {
        let r = rewriter(&[
            ("logo.png", "logo-0123456789.png"),
            ("css/a.css", "css/a-9876543210.css"),
        ]);
        let once = r.rewrite(r#"url("logo.png") <link href="css/a.css">"#);
        let twice = r.rewrite(&once.text);
        assert_eq!(twice.text, once.text);
        assert_eq!(twice.replaced, 0);
    }

    #[test]
    fn empty_manifest_returns_input() {
        let r = rewriter(&[]);
        let out = r.rewrite("body {}");
        assert_eq!(out.text, "body {}");
        assert_eq!(out.replaced, 0);
    }

    #[test]
    fn handles_multibyte_text() {
        let r = rewriter(&[("é.png", "é-1.png")]);
        assert_eq!(r.rewrite("ü é.png ü").text, "ü é-1.png ü");
    }
}
