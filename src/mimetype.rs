//! Content type parsing for API payloads.
//!
//! API resources are typed by vendor MIME types such as
//! `application/vnd.example.org.widget+json`. The `+json` suffix selects the
//! payload decoder, while the vendor part selects the resource class.

/// A parsed `type/subtype[+format]` content type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MimeType {
    /// The main type (e.g., `application`).
    pub main_type: String,
    /// The full subtype (e.g., `vnd.example.org.widget+json`).
    pub sub_type: String,
    /// The vendor part of the subtype, empty when there is no `+format`.
    pub vendor: String,
    /// The payload format (e.g., `json`).
    pub format: String,
    /// The resource name from the last vendor segment (e.g., `widget`).
    pub resource: String,
}

impl MimeType {
    /// Parse a content type, ignoring any `;` parameters.
    pub fn parse(mime_type: &str) -> Self {
        let essence = mime_type.split(';').next().unwrap_or_default().trim();
        let (main_type, sub_type) = essence.split_once('/').unwrap_or((essence, ""));

        let (vendor, format) = match sub_type.rsplit_once('+') {
            Some((vendor, format)) => (vendor, format),
            None => ("", sub_type),
        };

        let resource = match vendor.rsplit_once('.') {
            Some((_, last)) => last.replace('-', "_"),
            None => String::new(),
        };

        Self {
            main_type: main_type.to_string(),
            sub_type: sub_type.to_string(),
            vendor: vendor.to_string(),
            format: format.to_string(),
            resource,
        }
    }

    /// The key used to pick a payload decoder: `main_type/format`.
    pub fn decoder_key(&self) -> String {
        format!("{}/{}", self.main_type, self.format)
    }
}

/// Strip the `+format` suffix, leaving the vendor-specific type.
///
/// `application/vnd.example.org.root+json` becomes
/// `application/vnd.example.org.root`. Types without a suffix are returned
/// without parameters but otherwise unchanged.
pub fn rem_mime_format(mime_type: &str) -> &str {
    let essence = mime_type.split(';').next().unwrap_or_default().trim();
    match essence.rsplit_once('+') {
        Some((base, _)) => base,
        None => essence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vendor_type() {
        let mime = MimeType::parse("application/vnd.example.org.review-group+json; charset=utf-8");

        assert_eq!(mime.main_type, "application");
        assert_eq!(mime.sub_type, "vnd.example.org.review-group+json");
        assert_eq!(mime.vendor, "vnd.example.org.review-group");
        assert_eq!(mime.format, "json");
        assert_eq!(mime.resource, "review_group");
        assert_eq!(mime.decoder_key(), "application/json");
    }

    #[test]
    fn test_parse_plain_type() {
        let mime = MimeType::parse("text/x-patch");

        assert_eq!(mime.vendor, "");
        assert_eq!(mime.format, "x-patch");
        assert_eq!(mime.resource, "");
        assert_eq!(mime.decoder_key(), "text/x-patch");
    }

    #[test]
    fn test_rem_mime_format() {
        assert_eq!(
            rem_mime_format("application/vnd.example.org.root+json"),
            "application/vnd.example.org.root"
        );
        assert_eq!(rem_mime_format("application/json"), "application/json");
        assert_eq!(
            rem_mime_format("application/vnd.example.org.root+json; charset=utf-8"),
            "application/vnd.example.org.root"
        );
    }
}
