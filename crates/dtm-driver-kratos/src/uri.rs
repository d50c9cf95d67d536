// Generic URI splitting shared by target and method parsing.
//
// Authorities may carry a comma-separated host list (`h1:2379,h2:2379`),
// which URL parsers reject, so the split is done here and each host is
// validated on its own.

use std::borrow::Cow;

use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::DriverError;

/// A URI split into scheme, host and decoded path. Userinfo, query and
/// fragment are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawUri<'a> {
    /// Lower-cased scheme, empty when absent
    pub scheme: String,
    /// Host list between `//` (or `userinfo@`) and the next `/`, if the URI
    /// has an authority
    pub authority: Option<&'a str>,
    /// Percent-decoded path
    pub path: Cow<'a, str>,
}

impl RawUri<'_> {
    pub fn host(&self) -> &str {
        self.authority.unwrap_or_default()
    }
}

pub(crate) fn parse(raw: &str) -> Result<RawUri<'_>, DriverError> {
    if raw.chars().any(|c| c.is_ascii_control()) {
        return Err(DriverError::parse(raw, "invalid control character in URL"));
    }

    let without_fragment = raw.split('#').next().unwrap_or_default();
    let (scheme, rest) = split_scheme(raw, without_fragment)?;
    let rest = rest.split('?').next().unwrap_or_default();

    let (authority, path) = match rest.strip_prefix("//") {
        Some(after) => {
            let end = after.find('/').unwrap_or(after.len());
            (Some(&after[..end]), &after[end..])
        }
        None => (None, rest),
    };

    if scheme.is_empty() && authority.is_none() {
        let first_segment = path.split('/').next().unwrap_or_default();
        if first_segment.contains(':') {
            return Err(DriverError::parse(
                raw,
                "first path segment in URL cannot contain colon",
            ));
        }
    }

    let host = authority.map(strip_userinfo);
    if let Some(host) = host {
        validate_hosts(raw, host)?;
    }

    Ok(RawUri {
        scheme: scheme.to_ascii_lowercase(),
        authority: host,
        path: unescape_path(raw, path)?,
    })
}

fn split_scheme<'a>(raw: &str, input: &'a str) -> Result<(&'a str, &'a str), DriverError> {
    for (i, c) in input.char_indices() {
        match c {
            'a'..='z' | 'A'..='Z' => {}
            '0'..='9' | '+' | '-' | '.' if i > 0 => {}
            ':' if i == 0 => return Err(DriverError::parse(raw, "missing protocol scheme")),
            ':' => return Ok((&input[..i], &input[i + 1..])),
            _ => return Ok(("", input)),
        }
    }
    Ok(("", input))
}

/// Host part of an authority, after the last `@`
fn strip_userinfo(authority: &str) -> &str {
    authority
        .rsplit_once('@')
        .map_or(authority, |(_, host)| host)
}

fn validate_hosts(raw: &str, hosts: &str) -> Result<(), DriverError> {
    for host in hosts.split(',').filter(|h| !h.is_empty()) {
        Url::parse(&format!("dtm://{}", host))
            .map_err(|e| DriverError::parse(raw, format!("invalid host {:?}: {}", host, e)))?;
    }
    Ok(())
}

/// Decode `%XX` escapes; every `%` must start a valid escape
fn unescape_path<'a>(raw: &str, path: &'a str) -> Result<Cow<'a, str>, DriverError> {
    let bytes = path.as_bytes();
    for (i, _) in path.match_indices('%') {
        let valid = bytes
            .get(i + 1..i + 3)
            .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
        if !valid {
            let escape: String = path[i..].chars().take(3).collect();
            return Err(DriverError::parse(
                raw,
                format!("invalid URL escape {:?}", escape),
            ));
        }
    }
    percent_decode_str(path)
        .decode_utf8()
        .map_err(|e| DriverError::parse(raw, format!("invalid URL escape: {}", e)))
}
