//! Root element references and root resolution.
//!
//! The engine never touches the DOM itself. An [`ElementRef`] is an opaque
//! handle (a chain of selectors, empty for the whole document) that the host
//! interprets, and a [`RootResolver`] decides which handle a root-aware brick
//! receives.

use crate::errors::{BrickflowError, PropError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A reference to a page element, expressed as a chain of selectors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementRef {
    selectors: Vec<String>,
}

impl ElementRef {
    /// Returns a reference to the whole document.
    #[must_use]
    pub fn document() -> Self {
        Self::default()
    }

    /// Returns a reference to the element matched by `selector`.
    #[must_use]
    pub fn from_selector(selector: impl Into<String>) -> Self {
        Self {
            selectors: vec![selector.into()],
        }
    }

    /// Returns a reference to `selector` scoped within this element.
    #[must_use]
    pub fn child(&self, selector: impl Into<String>) -> Self {
        let mut selectors = self.selectors.clone();
        selectors.push(selector.into());
        Self { selectors }
    }

    /// Returns true if this references the whole document.
    #[must_use]
    pub fn is_document(&self) -> bool {
        self.selectors.is_empty()
    }

    /// Returns the selector chain.
    #[must_use]
    pub fn selectors(&self) -> &[String] {
        &self.selectors
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_document() {
            write!(f, "document")
        } else {
            write!(f, "{}", self.selectors.join(" >> "))
        }
    }
}

/// How an invocation selects the root element for a root-aware brick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RootMode {
    /// Use the ambient root of the enclosing run.
    #[default]
    Inherit,
    /// Use the whole document regardless of the ambient root.
    Document,
    /// Use the element matched by the invocation's `root` selector.
    Element,
}

impl RootMode {
    /// Returns true for the default mode.
    #[must_use]
    pub fn is_inherit(&self) -> bool {
        matches!(self, Self::Inherit)
    }
}

/// Resolves the concrete root handed to a root-aware brick.
#[async_trait]
pub trait RootResolver: Send + Sync + fmt::Debug {
    /// Resolves `mode` (and its optional selector) against the ambient root.
    async fn resolve(
        &self,
        mode: RootMode,
        selector: Option<&str>,
        ambient: &ElementRef,
    ) -> Result<ElementRef, BrickflowError>;
}

/// The default resolver: chains selectors onto the ambient root.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectorRootResolver;

#[async_trait]
impl RootResolver for SelectorRootResolver {
    async fn resolve(
        &self,
        mode: RootMode,
        selector: Option<&str>,
        ambient: &ElementRef,
    ) -> Result<ElementRef, BrickflowError> {
        match mode {
            RootMode::Inherit => Ok(ambient.clone()),
            RootMode::Document => Ok(ElementRef::document()),
            RootMode::Element => {
                let selector = selector
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| PropError::new("root", "element root mode requires a selector"))?;
                Ok(ambient.child(selector))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_ref_display() {
        assert_eq!(ElementRef::document().to_string(), "document");
        let nested = ElementRef::from_selector("#main").child(".item");
        assert_eq!(nested.to_string(), "#main >> .item");
    }

    #[tokio::test]
    async fn test_selector_resolver_modes() {
        let resolver = SelectorRootResolver;
        let ambient = ElementRef::from_selector("#panel");

        let inherited = resolver.resolve(RootMode::Inherit, None, &ambient).await.unwrap();
        assert_eq!(inherited, ambient);

        let document = resolver
            .resolve(RootMode::Document, Some(".ignored"), &ambient)
            .await
            .unwrap();
        assert!(document.is_document());

        let element = resolver
            .resolve(RootMode::Element, Some("button"), &ambient)
            .await
            .unwrap();
        assert_eq!(element.selectors(), ["#panel", "button"]);
    }

    #[tokio::test]
    async fn test_element_mode_requires_selector() {
        let err = SelectorRootResolver
            .resolve(RootMode::Element, Some("  "), &ElementRef::document())
            .await
            .unwrap_err();

        assert_eq!(err.name(), "PropError");
        assert!(err.is_catchable());
    }

    #[test]
    fn test_root_mode_serde() {
        let mode: RootMode = serde_json::from_str("\"element\"").unwrap();
        assert_eq!(mode, RootMode::Element);
        assert_eq!(serde_json::to_string(&RootMode::Inherit).unwrap(), "\"inherit\"");
    }
}
