//! URL helpers.

/// Extracts the `host[:port]` part from an absolute http(s) URL.
///
/// Returns `None` when the URL is not absolute http(s) or has no host.
pub fn extract_host(url: &str) -> Option<String> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;

    // host[:port] is until first '/', '?', or '#'.
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let mut host_port = &rest[..end];

    // Strip potential userinfo (user:pass@host).
    if let Some(at) = host_port.rfind('@') {
        host_port = &host_port[at + 1..];
    }

    if host_port.is_empty() {
        None
    } else {
        Some(host_port.to_string())
    }
}

/// Give scheme-relative and bare tracker links an explicit scheme.
pub fn with_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("//") {
        format!("https://{rest}")
    } else if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

/// First run of ASCII digits after the host part, used as a torrent id.
pub fn first_number(url: &str) -> Option<&str> {
    let tail = match extract_host(url) {
        Some(host) => url
            .find(host.as_str())
            .map(|at| &url[at + host.len()..])
            .unwrap_or(url),
        None => url,
    };
    let start = tail.find(|c: char| c.is_ascii_digit())?;
    let digits = &tail[start..];
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    Some(&digits[..end])
}
