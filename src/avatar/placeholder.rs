//! Synthetic initials avatar.
//!
//! Used when no upstream source produced an image. Pure and deterministic:
//! the same seed always renders the same bytes.

/// Seed used when there is no handle at all.
pub const DEFAULT_SEED: &str = "SR";

/// Edge length of the rendered square, in pixels.
pub const PLACEHOLDER_SIZE: u32 = 160;

pub const PLACEHOLDER_CONTENT_TYPE: &str = "image/svg+xml";

/// Up to two uppercase initials for a seed; [`DEFAULT_SEED`] when the seed is empty.
pub fn initials(seed: &str) -> String {
    let seed = if seed.is_empty() { DEFAULT_SEED } else { seed };
    seed.chars().take(2).collect::<String>().to_uppercase()
}

/// Render the placeholder SVG for `seed`.
pub fn render_placeholder(seed: &str) -> Vec<u8> {
    let text = escape_xml(&initials(seed));
    format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{size}" height="{size}" viewBox="0 0 {size} {size}">
  <defs><linearGradient id="g" x1="0" y1="0" x2="1" y2="1">
    <stop offset="0%" stop-color="#2a3a5c"/><stop offset="100%" stop-color="#162235"/>
  </linearGradient></defs>
  <rect width="100%" height="100%" fill="url(#g)"/>
  <text x="50%" y="52%" dominant-baseline="middle" text-anchor="middle" font-family="Montserrat,Arial,sans-serif" font-size="64" font-weight="700" fill="#eaf2ff">{text}</text>
</svg>"##,
        size = PLACEHOLDER_SIZE,
    )
    .into_bytes()
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered_text(seed: &str) -> String {
        String::from_utf8(render_placeholder(seed)).unwrap()
    }

    #[test]
    fn test_initials() {
        assert_eq!(initials("example_user"), "EX");
        assert_eq!(initials("a"), "A");
        assert_eq!(initials(""), "SR");
        assert_eq!(initials("SR"), "SR");
    }

    #[test]
    fn test_render_is_deterministic() {
        assert_eq!(render_placeholder("someone"), render_placeholder("someone"));
        assert_ne!(render_placeholder("someone"), render_placeholder("other"));
    }

    #[test]
    fn test_render_contains_initials_and_gradient() {
        let svg = rendered_text("example_user");
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("linearGradient"));
        assert!(svg.contains(">EX</text>"));
        assert!(svg.contains(r#"width="160""#));
    }

    #[test]
    fn test_render_empty_seed_uses_default() {
        assert!(rendered_text("").contains(">SR</text>"));
    }

    #[test]
    fn test_render_escapes_markup() {
        let svg = rendered_text("<&");
        assert!(svg.contains(">&lt;&amp;</text>"));
    }
}
