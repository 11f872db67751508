use url::Url;

use crate::ProtocolError;

/// Resolves a `Location` header against the endpoint the request went to.
///
/// Absolute locations are returned unchanged; relative ones are joined
/// following RFC 3986 reference resolution.
pub fn resolve_location(endpoint: &str, location: &str) -> Result<String, ProtocolError> {
    let base = Url::parse(endpoint)
        .map_err(|e| ProtocolError::InvalidUrl(format!("{endpoint}: {e}")))?;
    let resolved = base
        .join(location)
        .map_err(|e| ProtocolError::InvalidUrl(format!("{location}: {e}")))?;
    Ok(resolved.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_location_kept() {
        let url = resolve_location("https://tus.io/files/", "https://cdn.tus.io/abc").unwrap();
        assert_eq!(url, "https://cdn.tus.io/abc");
    }

    #[test]
    fn relative_path_joined() {
        let url = resolve_location("https://tus.io/files/", "abc123").unwrap();
        assert_eq!(url, "https://tus.io/files/abc123");
    }

    #[test]
    fn root_relative_path_joined() {
        let url = resolve_location("https://tus.io/api/files", "/uploads/xyz").unwrap();
        assert_eq!(url, "https://tus.io/uploads/xyz");
    }

    #[test]
    fn invalid_endpoint_rejected() {
        let err = resolve_location("not a url", "abc").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidUrl(_)));
    }
}
