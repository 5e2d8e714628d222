//! Directory listing generation

use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::Path;

use super::errors::FsError;

/// Content type of generated listings
pub const LISTING_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Escape text for interpolation into HTML content or a quoted attribute
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Path component of a request URI, with query and fragment removed
///
/// Accepts both origin-form (`/dir/?q`) and absolute-form
/// (`http://host/dir/?q`) URIs. Only a target that does not start with `/`
/// is read as absolute-form, so a scheme inside the query is never taken
/// for the authority.
pub fn uri_path(uri: &str) -> &str {
    let end = uri.find(['?', '#']).unwrap_or(uri.len());
    let uri = &uri[..end];
    let path = if uri.starts_with('/') {
        uri
    } else {
        match uri.find("://") {
            Some(scheme_end) => {
                let rest = &uri[scheme_end + 3..];
                rest.find('/').map_or("/", |path_start| &rest[path_start..])
            }
            None => uri,
        }
    };
    if path.is_empty() {
        "/"
    } else {
        path
    }
}

/// Resolve a child entry name against the listed directory's request path
pub fn child_href(dir_path: &str, name: &str) -> String {
    let base = dir_path.trim_end_matches('/');
    let encoded = urlencoding::encode(name);
    let mut href = String::with_capacity(base.len() + encoded.len() + 1);
    href.push_str(base);
    href.push('/');
    href.push_str(&encoded);
    href
}

/// Sorted names of the immediate children of `dir`
pub fn read_names(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<io::Result<Vec<_>>>()?;
    names.sort();
    Ok(names)
}

/// Render an HTML index of `names` for the directory requested as `request_uri`
pub fn render_names(request_uri: &str, names: &[String]) -> Vec<u8> {
    let base = uri_path(request_uri);
    let title = escape_html(&urlencoding::decode(base).unwrap_or(Cow::Borrowed(base)));

    let mut html = String::with_capacity(128 + names.len() * 64);
    html.push_str(&format!(
        "<html><head><title>{title}</title></head><body><h1>{title}</h1><ul>"
    ));
    if !base.trim_end_matches('/').is_empty() {
        html.push_str(r#"<li><a href="..">..</a></li>"#);
    }
    for name in names {
        html.push_str(&format!(
            r#"<li><a href="{}">{}</a></li>"#,
            escape_html(&child_href(base, name)),
            escape_html(name)
        ));
    }
    html.push_str("</ul></body></html>");
    html.into_bytes()
}

/// Enumerate `dir` and render its listing
pub fn render(dir: &Path, request_uri: &str) -> Result<Vec<u8>, FsError> {
    let names = read_names(dir).map_err(|source| FsError::Listing {
        path: dir.to_path_buf(),
        source,
    })?;
    Ok(render_names(request_uri, &names))
}
