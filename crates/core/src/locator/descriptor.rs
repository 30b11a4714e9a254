//! Named, lazily resolved element references.

use std::fmt;
use std::sync::Arc;

use crate::environment::{ElementFilter, ElementHandle, ElementInfo, EnvError, Environment};

/// Post-processing applied to a match before it is returned.
pub type Transform = Arc<dyn Fn(ElementInfo) -> Option<ElementInfo> + Send + Sync>;

/// A named reference to an element, optionally scoped below a parent.
///
/// Descriptors are immutable and cheap to clone. A parent must exist before
/// its child is built, so a descriptor chain is always a finite tree.
///
/// # Example
///
/// ```
/// use tm_core::locator::ElementDescriptor;
///
/// let form = ElementDescriptor::identified_by("login").named("Login form");
/// let submit = ElementDescriptor::query("button").child_of(&form).named("Submit");
///
/// assert_eq!(submit.display_name(), "Submit in Login form");
/// ```
#[derive(Clone)]
pub struct ElementDescriptor {
    inner: Arc<DescriptorInner>,
}

struct DescriptorInner {
    name: String,
    query: String,
    filter: Option<ElementFilter>,
    parent: Option<ElementDescriptor>,
    transform: Option<Transform>,
}

impl ElementDescriptor {
    /// Starts a descriptor matching a tag, `#id` or `.class` query.
    pub fn query(query: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder {
            query: query.into(),
            filter: None,
            parent: None,
            transform: None,
        }
    }

    /// Starts a descriptor matching a DOM id.
    pub fn identified_by(id: impl AsRef<str>) -> DescriptorBuilder {
        Self::query(format!("#{}", id.as_ref()))
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn query_str(&self) -> &str {
        &self.inner.query
    }

    pub fn parent(&self) -> Option<&ElementDescriptor> {
        self.inner.parent.as_ref()
    }

    /// Name qualified by every ancestor, e.g. `Submit in Login form`.
    pub fn display_name(&self) -> String {
        match &self.inner.parent {
            Some(parent) => format!("{} in {}", self.inner.name, parent.display_name()),
            None => self.inner.name.clone(),
        }
    }

    /// The chain from the outermost ancestor down to this descriptor.
    pub fn ancestry(&self) -> Vec<ElementDescriptor> {
        let mut chain = vec![self.clone()];
        let mut current = self.inner.parent.clone();
        while let Some(descriptor) = current {
            current = descriptor.inner.parent.clone();
            chain.push(descriptor);
        }
        chain.reverse();
        chain
    }

    /// Single lookup below `root`, applying the filter and the transform.
    pub async fn resolve(
        &self,
        env: &dyn Environment,
        root: Option<&ElementHandle>,
    ) -> Result<Option<ElementInfo>, EnvError> {
        let found = env
            .query_element(root, &self.inner.query, self.inner.filter.as_ref())
            .await?;
        Ok(match (&self.inner.transform, found) {
            (Some(transform), Some(info)) => transform(info),
            (_, found) => found,
        })
    }

    /// Single lookup of the whole chain from the document root.
    ///
    /// Returns `None` as soon as any ancestor is missing.
    pub async fn resolve_chain(&self, env: &dyn Environment) -> Result<Option<ElementInfo>, EnvError> {
        let mut root: Option<ElementInfo> = None;
        for descriptor in self.ancestry() {
            match descriptor.resolve(env, root.as_ref().map(|info| &info.handle)).await? {
                Some(info) => root = Some(info),
                None => return Ok(None),
            }
        }
        Ok(root)
    }
}

impl fmt::Debug for ElementDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementDescriptor")
            .field("name", &self.inner.name)
            .field("query", &self.inner.query)
            .field("filtered", &self.inner.filter.is_some())
            .field("parent", &self.inner.parent)
            .finish()
    }
}

impl fmt::Display for ElementDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

/// Fluent builder returned by [`ElementDescriptor::query`].
pub struct DescriptorBuilder {
    query: String,
    filter: Option<ElementFilter>,
    parent: Option<ElementDescriptor>,
    transform: Option<Transform>,
}

impl DescriptorBuilder {
    /// Keeps only matches accepted by `filter`.
    pub fn matching(mut self, filter: ElementFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Searches below the element `parent` resolves to.
    pub fn child_of(mut self, parent: &ElementDescriptor) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    pub fn post_process(
        mut self,
        transform: impl Fn(ElementInfo) -> Option<ElementInfo> + Send + Sync + 'static,
    ) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn named(self, name: impl Into<String>) -> ElementDescriptor {
        ElementDescriptor {
            inner: Arc::new(DescriptorInner {
                name: name.into(),
                query: self.query,
                filter: self.filter,
                parent: self.parent,
                transform: self.transform,
            }),
        }
    }
}
