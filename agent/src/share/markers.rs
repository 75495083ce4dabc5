//! Values scraped from the share page's inline scripts

use std::sync::LazyLock;

use regex::Regex;

use crate::errors::AgentError;

static A_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"aKey\s*=\s*'([a-zA-Z0-9]+)'").expect("valid regex"));
static INSTALL_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"installToken\s*=\s*"([a-zA-Z0-9]+)""#).expect("valid regex"));
static TIME_SIGN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"timeSign\s*=\s*'([a-zA-Z0-9]+)'").expect("valid regex"));
static AUTHCODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"var authcode\s*=\s*"(\d+)""#).expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMarkers {
    pub a_key: String,
    /// Empty when the page has none
    pub install_token: String,
    /// Empty when the page has none
    pub time_sign: String,
    /// Decimal digits, "0" when the page has none
    pub authcode: String,
}

impl PageMarkers {
    /// Extract markers from the page body. `aKey` is mandatory.
    pub fn parse(html: &str) -> Result<Self, AgentError> {
        let a_key = capture(&A_KEY, html).ok_or_else(|| {
            AgentError::ResolutionError(
                "Could not find aKey. Page might be invalid or expired.".to_string(),
            )
        })?;

        Ok(Self {
            a_key,
            install_token: capture(&INSTALL_TOKEN, html).unwrap_or_default(),
            time_sign: capture(&TIME_SIGN, html).unwrap_or_default(),
            authcode: capture(&AUTHCODE, html).unwrap_or_else(|| "0".to_string()),
        })
    }

    /// Numeric authcode; values that overflow count as zero
    pub fn authcode_value(&self) -> u64 {
        self.authcode.parse().unwrap_or(0)
    }
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text).map(|caps| caps[1].to_string())
}
