//! Operator-supplied cookie input
//!
//! Cookies arrive either as a JSON array (the same shape the probe uses)
//! or as `name=value; name2=value2` pairs copied out of a browser.

use crate::model::Cookie;
use crate::{Result, VantageError};

/// Parses a cookie string in either supported form and resolves default
/// domain/path against the URL the cookies are meant for.
pub fn parse_cookie_string(input: &str, setter_url: &str) -> Result<Vec<Cookie>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let mut cookies = if trimmed.starts_with('[') {
        serde_json::from_str::<Vec<Cookie>>(trimmed)
            .map_err(|e| VantageError::CookieParse(e.to_string()))?
    } else {
        parse_pairs(trimmed)?
    };

    for cookie in &mut cookies {
        cookie.resolve_defaults(setter_url);
    }
    Ok(cookies)
}

fn parse_pairs(input: &str) -> Result<Vec<Cookie>> {
    let mut cookies = Vec::new();
    for pair in input.split(';') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        // form_urlencoded also percent-decodes the value
        let Some((name, value)) = url::form_urlencoded::parse(pair.as_bytes())
            .into_owned()
            .next()
        else {
            return Err(VantageError::CookieParse(format!(
                "malformed cookie pair '{pair}'"
            )));
        };
        if !pair.contains('=') {
            return Err(VantageError::CookieParse(format!(
                "malformed cookie pair '{pair}'"
            )));
        }
        cookies.push(Cookie::new(name.trim(), value.trim()));
    }
    Ok(cookies)
}
