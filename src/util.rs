pub(crate) fn urljoin(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

pub(crate) fn append_query(url: &str, params: &[(&str, &str)]) -> String {
    // Values go in verbatim: the API expects literal `*`, `:` and `,`.
    let mut out = url.to_string();
    let sep = if url.contains('?') { '&' } else { '?' };
    out.push(sep);
    let mut first = true;
    for (k, v) in params {
        if !first {
            out.push('&');
        }
        first = false;
        out.push_str(k);
        out.push('=');
        out.push_str(v);
    }
    out
}

/// Masks the value of the `key` query parameter so URLs can be logged.
pub(crate) fn redact_key(url: &str) -> String {
    let Some((head, query)) = url.split_once('?') else {
        return url.to_string();
    };
    let query = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some(("key", v)) if !v.is_empty() => "key=***".to_string(),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{}", head, query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urljoin_trims_slashes() {
        assert_eq!(
            urljoin("https://api.census.gov/data/", "2020/acs/acs5"),
            "https://api.census.gov/data/2020/acs/acs5"
        );
        assert_eq!(urljoin("http://a/", "/b"), "http://a/b");
        assert_eq!(urljoin("http://a", "https://b/c"), "https://b/c");
    }

    #[test]
    fn test_append_query_keeps_wildcards() {
        let url = append_query("http://a/b", &[("get", "NAME"), ("for", "state:*")]);
        assert_eq!(url, "http://a/b?get=NAME&for=state:*");
        let url = append_query(&url, &[("key", "k")]);
        assert_eq!(url, "http://a/b?get=NAME&for=state:*&key=k");
    }

    #[test]
    fn test_redact_key() {
        assert_eq!(
            redact_key("http://a/b?get=NAME&key=abc123"),
            "http://a/b?get=NAME&key=***"
        );
        assert_eq!(redact_key("http://a/b"), "http://a/b");
        assert_eq!(redact_key("http://a/b?key="), "http://a/b?key=");
    }
}
