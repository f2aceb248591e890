//! Container image reference parsing and version resolution.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{AlgorithmTemplate, Registry, Versions};

/// Worker image used when a template does not name one.
pub const DEFAULT_WORKER_IMAGE: &str = "hkube/worker";

static IMAGE_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?:([^/]+)/)?(?:([^/]+)/)?([^@:/]+)(?:[@:](.+))?$").ok());

#[derive(Debug, Error, PartialEq)]
pub enum ImageError {
    #[error("invalid image reference: {0:?}")]
    Invalid(String),
}

/// `registry/namespace/repository[:tag]`, every part but the repository optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub registry: Option<String>,
    pub namespace: Option<String>,
    pub repository: String,
    pub tag: Option<String>,
}

impl ImageRef {
    pub fn parse(image: &str) -> Result<Self, ImageError> {
        let caps = IMAGE_PATTERN
            .as_ref()
            .and_then(|re| re.captures(image))
            .ok_or_else(|| ImageError::Invalid(image.to_string()))?;
        let part = |i: usize| caps.get(i).map(|m| m.as_str().to_string());

        let mut registry = part(1);
        let mut namespace = part(2);
        let repository = part(3).ok_or_else(|| ImageError::Invalid(image.to_string()))?;
        let tag = part(4);

        // A single leading segment without a host marker is a namespace.
        if namespace.is_none() {
            if let Some(r) = registry.as_deref() {
                if !r.contains([':', '.']) {
                    namespace = registry.take();
                }
            }
        }

        Ok(Self {
            registry,
            namespace,
            repository,
            tag,
        })
    }

    /// Present parts joined with `/`, followed by `:tag` when tagged.
    pub fn name(&self) -> String {
        let mut image = [self.registry.as_deref(), self.namespace.as_deref(), Some(self.repository.as_str())]
            .into_iter()
            .flatten()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        if let Some(tag) = self.tag.as_deref().filter(|t| !t.is_empty()) {
            image.push(':');
            image.push_str(tag);
        }
        image
    }
}

/// Apply the registry override and pin an untagged image to its project version.
pub fn resolve_image(
    image: &str,
    versions: Option<&Versions>,
    registry: Option<&Registry>,
) -> Result<String, ImageError> {
    let mut parsed = ImageRef::parse(image)?;
    if let Some(registry) = registry {
        parsed.registry = Some(registry.registry.clone());
    }
    if parsed.tag.is_none() {
        parsed.tag = versions
            .and_then(|v| v.tag_for(&parsed.repository))
            .map(str::to_string);
    }
    Ok(parsed.name())
}

pub fn resolve_algorithm_image(
    template: &AlgorithmTemplate,
    versions: Option<&Versions>,
    registry: Option<&Registry>,
) -> Result<String, ImageError> {
    resolve_image(&template.algorithm_image, versions, registry)
}

pub fn resolve_worker_image(
    template: &AlgorithmTemplate,
    versions: Option<&Versions>,
    registry: Option<&Registry>,
) -> Result<String, ImageError> {
    let image = template
        .worker_image
        .as_deref()
        .filter(|i| !i.is_empty())
        .unwrap_or(DEFAULT_WORKER_IMAGE);
    resolve_image(image, versions, registry)
}
