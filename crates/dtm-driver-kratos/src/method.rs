//! Splitting of call targets into server and method
//!
//! Two forms are accepted:
//! - `server/method`, split at the first `/`
//! - a full URI such as `discovery://etcdhost:2379/svcA/doThing`, where the
//!   server keeps the first path segment

use crate::error::DriverError;
use crate::uri;

/// Split `uri` into `(server, method)`.
///
/// A malformed full URI yields two empty strings and no error.
pub fn parse_server_method(uri: &str) -> Result<(String, String), DriverError> {
    if !uri.contains("//") {
        let sep = uri
            .find('/')
            .ok_or_else(|| DriverError::BadMethodUri(uri.to_string()))?;
        return Ok((uri[..sep].to_string(), uri[sep..].to_string()));
    }

    let Ok(parsed) = uri::parse(uri) else {
        return Ok((String::new(), String::new()));
    };

    let path: &str = &parsed.path;
    let first = path.chars().next().map_or(0, char::len_utf8);
    let index = path[first..].find('/').map_or(0, |i| i + first);
    let server = format!("{}://{}{}", parsed.scheme, parsed.host(), &path[..index]);
    Ok((server, path[index..].to_string()))
}
