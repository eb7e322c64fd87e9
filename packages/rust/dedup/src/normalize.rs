//! URL canonicalization used as the deduplication key.

use url::Url;

/// Query parameters that only carry attribution and never change the page.
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "msclkid", "_ga", "ref", "source", "spm"];

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Host without any leading `www.` label, lower-cased.
pub fn bare_host(host: &str) -> String {
    let mut host = host.to_ascii_lowercase();
    while let Some(rest) = host.strip_prefix("www.") {
        if !rest.contains('.') {
            break;
        }
        host = rest.to_string();
    }
    host
}

/// Canonical form of a bookmark URL.
///
/// Lower-cases scheme and host, drops `www.`, the fragment, default ports
/// and tracking parameters, sorts the remaining query pairs and strips a
/// trailing `/` from non-root paths. Unparseable input is returned trimmed
/// and lower-cased. Applying it twice gives the same result as once.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.to_lowercase();
    };

    if let Some(host) = url.host_str().map(bare_host) {
        // Fails only for hosts that cannot change (IPs, opaque hosts).
        let _ = url.set_host(Some(&host));
    }
    url.set_fragment(None);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        pairs.sort();
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed_path = path.trim_end_matches('/');
        url.set_path(if trimmed_path.is_empty() { "/" } else { trimmed_path });
    }

    url.to_string()
}

/// Whether the URL carries any tracking query parameter.
pub fn has_tracking_params(raw: &str) -> bool {
    Url::parse(raw.trim())
        .map(|u| u.query_pairs().any(|(k, _)| is_tracking_param(&k)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tracking_and_fragment() {
        assert_eq!(
            normalize_url("https://www.Example.com/a/b/?utm_source=x&b=2&a=1#top"),
            "https://example.com/a/b?a=1&b=2"
        );
        assert_eq!(
            normalize_url("https://example.com/?fbclid=abc&gclid=def"),
            "https://example.com/"
        );
    }

    #[test]
    fn drops_default_port_and_case() {
        assert_eq!(
            normalize_url("HTTPS://EXAMPLE.com:443/Path"),
            "https://example.com/Path"
        );
        assert_eq!(
            normalize_url("http://example.com:8080/x/"),
            "http://example.com:8080/x"
        );
    }

    #[test]
    fn root_keeps_its_slash() {
        assert_eq!(normalize_url("https://example.com"), "https://example.com/");
        assert_eq!(normalize_url("https://example.com/"), "https://example.com/");
    }

    #[test]
    fn unparseable_is_lowercased() {
        assert_eq!(normalize_url("  Not A URL  "), "not a url");
    }

    #[test]
    fn normalization_is_idempotent() {
        let samples = [
            "https://www.www.example.com/a//?q=a b&utm_medium=m&z=1#frag",
            "https://example.com/search?q=rust%20lang&ref=home",
            "http://Example.COM:80/docs/",
            "https://example.com/?",
            "https://xn--nxasmq6b.com/%E4%B8%AD/",
            "not a url",
        ];
        for raw in samples {
            let once = normalize_url(raw);
            assert_eq!(normalize_url(&once), once, "not idempotent for {raw}");
        }
    }

    #[test]
    fn bare_host_keeps_single_label() {
        assert_eq!(bare_host("WWW.github.com"), "github.com");
        assert_eq!(bare_host("www.com"), "www.com");
    }

    #[test]
    fn detects_tracking_params() {
        assert!(has_tracking_params("https://a.com/?utm_campaign=x"));
        assert!(has_tracking_params("https://a.com/?SPM=1.2"));
        assert!(!has_tracking_params("https://a.com/?page=2"));
    }
}
