//! Pure parsing of plugin keys and handler keys. No state, no I/O.
use crate::constants::ALIAS_DELIMITER;
use crate::error::{Error, Result};
use crate::plugin_system::source::has_artifact_extension;
use crate::utils::short_stem;

/// Split a plugin key into its source and alias.
///
/// `"github.com/user/repo as name"` yields `("github.com/user/repo", "name")`.
/// Without an explicit alias the alias is derived from the source, see
/// [`default_alias`]. Never fails; degenerate input gives an empty alias.
pub fn parse_key(raw: &str) -> (String, String) {
    let mut parts = raw.split(ALIAS_DELIMITER);
    let source = parts.next().unwrap_or_default().to_string();
    let alias = match parts.next() {
        Some(explicit) => explicit.to_string(),
        None => default_alias(&source),
    };
    (source, alias)
}

/// Explicit alias of a key, if one was given.
pub fn explicit_alias(raw: &str) -> Option<&str> {
    raw.split(ALIAS_DELIMITER).nth(1)
}

/// Derive an alias from a source: the final path segment truncated at the
/// first `-`, then `@`, then `#`. Prebuilt artifacts lose their extensions
/// first.
///
/// `github.com/user/my-plugin@v1.2.0` becomes `my`,
/// `github.com/user/plugin#develop` becomes `plugin`,
/// `./local/foo.so` becomes `foo`.
pub fn default_alias(source: &str) -> String {
    if has_artifact_extension(source) {
        return short_stem(source)
            .map(|stem| truncate_alias(&stem).to_string())
            .unwrap_or_default();
    }
    let name = source.rsplit('/').next().unwrap_or_default();
    truncate_alias(name).to_string()
}

fn truncate_alias(name: &str) -> &str {
    let name = name.split('-').next().unwrap_or_default();
    let name = name.split('@').next().unwrap_or_default();
    name.split('#').next().unwrap_or_default()
}

/// A parsed handler key: `alias.Method(arg1,arg2)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerCall {
    pub alias: String,
    pub method: String,
    /// Raw argument literals, in order. No type coercion happens here.
    pub args: Vec<String>,
}

/// Parse a handler key of the form `alias.Method` or `alias.Method(a,b,c)`.
///
/// Fails with [`Error::MalformedCall`] when the key has no `.` separator or
/// an argument list is opened but never closed.
pub fn parse_handler_key(raw: &str) -> Result<HandlerCall> {
    let malformed = || Error::MalformedCall { key: raw.to_string() };

    let (alias, handler) = raw.split_once('.').ok_or_else(malformed)?;
    let (method, args) = match handler.split_once('(') {
        None => (handler, Vec::new()),
        Some((method, rest)) => {
            let inner = rest.strip_suffix(')').ok_or_else(malformed)?;
            let args = if inner.is_empty() {
                Vec::new()
            } else {
                inner.split(',').map(str::to_string).collect()
            };
            (method, args)
        }
    };

    Ok(HandlerCall {
        alias: alias.to_string(),
        method: method.to_string(),
        args,
    })
}
