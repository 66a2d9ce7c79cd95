use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlRejection {
    #[error("URL is empty")]
    Empty,
    #[error("URL must start with http:// or https://")]
    Scheme,
}

/// Scheme-only check; no network access.
pub fn validate_subscription_url(url: &str) -> Result<(), UrlRejection> {
    let url = url.trim();
    if url.is_empty() {
        return Err(UrlRejection::Empty);
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(UrlRejection::Scheme);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_https() {
        assert!(validate_subscription_url("https://sub.example.com/token").is_ok());
        assert!(validate_subscription_url("  http://10.0.0.1:8080/s ").is_ok());
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(validate_subscription_url("   "), Err(UrlRejection::Empty));
    }

    #[test]
    fn rejects_other_schemes() {
        assert_eq!(
            validate_subscription_url("vless://a@b:1"),
            Err(UrlRejection::Scheme)
        );
        assert_eq!(
            validate_subscription_url("HTTPS://upper.example"),
            Err(UrlRejection::Scheme)
        );
    }
}
