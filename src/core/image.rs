//! Image reference handling.
//!
//! An image reference identifies one built artifact: optional registry host,
//! repository name, version tag. It is computed once from configuration and
//! shared verbatim by the build and deploy phases so the pushed tag and the
//! remotely pulled tag can never drift apart.

use crate::config::ImageConfig;
use crate::error::{Error, Result};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
    pub repository: String,
    pub tag: String,
}

impl ImageRef {
    /// Resolve the image reference from configuration, with an optional tag
    /// override from the command line taking precedence over the stored tag.
    pub fn from_config(image: &ImageConfig, tag_override: Option<&str>) -> Result<Self> {
        let repository = image.repository.trim();
        if repository.is_empty() {
            return Err(Error::config_missing_key("image.repository", None));
        }

        let tag = tag_override.unwrap_or(image.tag.trim());
        if tag.is_empty() {
            return Err(Error::config_missing_key("image.tag", None));
        }

        let registry = image
            .registry
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        let image_ref = Self {
            registry,
            repository: repository.to_string(),
            tag: tag.to_string(),
        };
        image_ref.validate()?;
        Ok(image_ref)
    }

    /// Parse a canonical reference string: `[registry/]repository:tag`.
    /// The first path segment is treated as a registry when it looks like a
    /// host (contains '.' or ':', or is "localhost") - the docker convention.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |problem: &str| {
            Error::validation_invalid_argument("image", problem, Some(input.to_string()))
        };

        let (path, tag) = match input.rsplit_once(':') {
            // A ':' inside the last path segment is a tag separator; earlier
            // ones belong to a registry port.
            Some((path, tag)) if !tag.contains('/') => (path, tag),
            _ => return Err(invalid("Image reference must include a ':<tag>' suffix")),
        };

        if tag.is_empty() {
            return Err(invalid("Image tag must not be empty"));
        }

        let (registry, repository) = match path.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (Some(first.to_string()), rest.to_string())
            }
            _ => (None, path.to_string()),
        };

        if repository.is_empty() {
            return Err(invalid("Image repository must not be empty"));
        }

        let image_ref = Self {
            registry,
            repository,
            tag: tag.to_string(),
        };
        image_ref.validate()?;
        Ok(image_ref)
    }

    fn validate(&self) -> Result<()> {
        let fields = [
            ("image.registry", self.registry.as_deref().unwrap_or("")),
            ("image.repository", self.repository.as_str()),
            ("image.tag", self.tag.as_str()),
        ];

        for (key, value) in fields {
            if value.chars().any(char::is_whitespace) {
                return Err(Error::config_invalid_value(
                    key,
                    Some(value.to_string()),
                    "Value must not contain whitespace",
                ));
            }
        }

        Ok(())
    }

    /// Canonical reference string used for both `docker push` and the remote
    /// `docker pull`.
    pub fn reference(&self) -> String {
        match &self.registry {
            Some(registry) => format!("{}/{}:{}", registry, self.repository, self.tag),
            None => format!("{}:{}", self.repository, self.tag),
        }
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reference())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn image_config(registry: Option<&str>, repository: &str, tag: &str) -> ImageConfig {
        ImageConfig {
            registry: registry.map(str::to_string),
            repository: repository.to_string(),
            tag: tag.to_string(),
        }
    }

    #[test]
    fn reference_without_registry() {
        let image = ImageRef::from_config(&image_config(None, "acme/checkin", "1.0.0"), None)
            .unwrap();
        assert_eq!(image.reference(), "acme/checkin:1.0.0");
    }

    #[test]
    fn reference_with_registry() {
        let image = ImageRef::from_config(
            &image_config(Some("registry.example.com:5000"), "acme/checkin", "1.0.0"),
            None,
        )
        .unwrap();
        assert_eq!(
            image.reference(),
            "registry.example.com:5000/acme/checkin:1.0.0"
        );
    }

    #[test]
    fn tag_override_takes_precedence() {
        let image =
            ImageRef::from_config(&image_config(None, "acme/checkin", "1.0.0"), Some("2.1.0"))
                .unwrap();
        assert_eq!(image.tag, "2.1.0");
        assert_eq!(image.reference(), "acme/checkin:2.1.0");
    }

    #[test]
    fn missing_repository_is_config_error() {
        let err = ImageRef::from_config(&image_config(None, "", "1.0.0"), None).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigMissingKey);
    }

    #[test]
    fn missing_tag_is_config_error() {
        let err = ImageRef::from_config(&image_config(None, "acme/checkin", ""), None).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigMissingKey);
    }

    #[test]
    fn whitespace_rejected() {
        let err =
            ImageRef::from_config(&image_config(None, "acme/checkin", "1.0 beta"), None)
                .unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigInvalidValue);
    }

    #[test]
    fn parse_plain_repository() {
        let image = ImageRef::parse("acme/checkin:1.0.0").unwrap();
        assert_eq!(image.registry, None);
        assert_eq!(image.repository, "acme/checkin");
        assert_eq!(image.tag, "1.0.0");
    }

    #[test]
    fn parse_with_registry_host() {
        let image = ImageRef::parse("registry.example.com/acme/checkin:1.0.0").unwrap();
        assert_eq!(image.registry.as_deref(), Some("registry.example.com"));
        assert_eq!(image.repository, "acme/checkin");
    }

    #[test]
    fn parse_with_registry_port() {
        let image = ImageRef::parse("localhost:5000/checkin:latest").unwrap();
        assert_eq!(image.registry.as_deref(), Some("localhost:5000"));
        assert_eq!(image.repository, "checkin");
        assert_eq!(image.tag, "latest");
    }

    #[test]
    fn parse_rejects_missing_tag() {
        assert!(ImageRef::parse("acme/checkin").is_err());
        assert!(ImageRef::parse("acme/checkin:").is_err());
    }
}
