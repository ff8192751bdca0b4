use std::fmt::{self, Display};

use scraper::{Html, Selector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    MetaTag,
    HiddenInput,
}

impl Display for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenSource::MetaTag => write!(f, "meta tag"),
            TokenSource::HiddenInput => write!(f, "hidden input"),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Value of the first `<input name="_token">` in the page, as issued with the login form.
pub fn hidden_input_token(html: &str) -> Option<String> {
    let selector = Selector::parse(r#"input[name="_token"]"#).ok()?;
    let document = Html::parse_document(html);
    let input = document.select(&selector).next()?;
    non_empty(input.value().attr("value"))
}

/// `<meta name="csrf-token">`, only rendered on authenticated pages.
pub fn meta_token(html: &str) -> Option<String> {
    let selector = Selector::parse(r#"meta[name="csrf-token"]"#).ok()?;
    let document = Html::parse_document(html);
    let meta = document.select(&selector).next()?;
    non_empty(meta.value().attr("content"))
}

/// Token for AJAX requests issued from this page: the meta tag when present,
/// otherwise the hidden form input.
pub fn page_token(html: &str) -> Option<(String, TokenSource)> {
    meta_token(html)
        .map(|t| (t, TokenSource::MetaTag))
        .or_else(|| hidden_input_token(html).map(|t| (t, TokenSource::HiddenInput)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{detail_page, home_page};

    #[test]
    fn test_hidden_input_token_from_login_form() {
        let html = home_page(Some("f3kQ9zT0abc"));
        assert_eq!(hidden_input_token(&html), Some("f3kQ9zT0abc".to_string()));
    }

    #[test]
    fn test_hidden_input_missing_or_blank() {
        assert_eq!(hidden_input_token(&home_page(None)), None);
        assert_eq!(
            hidden_input_token(r#"<form><input name="_token" value="  "></form>"#),
            None
        );
        assert_eq!(hidden_input_token(r#"<form><input name="_token"></form>"#), None);
    }

    #[test]
    fn test_page_token_prefers_meta_tag() {
        let html = r#"<html><head><meta name="csrf-token" content="meta-tok"></head>
            <body><form><input type="hidden" name="_token" value="form-tok"></form></body></html>"#;

        assert_eq!(
            page_token(html),
            Some(("meta-tok".to_string(), TokenSource::MetaTag))
        );
    }

    #[test]
    fn test_page_token_falls_back_to_hidden_input() {
        let html = home_page(Some("form-tok"));
        assert_eq!(
            page_token(&html),
            Some(("form-tok".to_string(), TokenSource::HiddenInput))
        );
    }

    #[test]
    fn test_page_token_absent() {
        assert_eq!(page_token(&detail_page(None)), None);
        assert_eq!(page_token(""), None);
    }
}
