//! Shared access to a dispatcher somewhere inside the root tree.

use std::fmt;
use std::sync::Arc;

trait Project<O>: Send + Sync {
    fn get(&self) -> &O;
}

struct RootNode<O>(Arc<O>);

impl<O: Send + Sync> Project<O> for RootNode<O> {
    fn get(&self) -> &O {
        &self.0
    }
}

struct ChildNode<P: 'static, C: 'static> {
    parent: Owner<P>,
    project: fn(&P) -> &C,
}

impl<P: 'static, C: 'static> Project<C> for ChildNode<P, C> {
    fn get(&self) -> &C {
        (self.project)(self.parent.get())
    }
}

/// Handle onto a node of the dispatcher tree.
///
/// Every handle keeps the root `Arc` alive and re-derives its node through a
/// chain of field projections, so nested dispatchers are shared with their
/// parent instead of cloned.
pub struct Owner<O: 'static> {
    node: Arc<dyn Project<O>>,
}

impl<O: 'static> Clone for Owner<O> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl<O: 'static> fmt::Debug for Owner<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owner")
            .field("type", &std::any::type_name::<O>())
            .finish()
    }
}

impl<O: Send + Sync + 'static> Owner<O> {
    pub fn root(root: Arc<O>) -> Self {
        Self {
            node: Arc::new(RootNode(root)),
        }
    }
}

impl<O: 'static> Owner<O> {
    #[inline]
    #[must_use]
    pub fn get(&self) -> &O {
        self.node.get()
    }

    /// Handle onto a field of this node.
    #[must_use]
    pub fn project<C: 'static>(&self, project: fn(&O) -> &C) -> Owner<C> {
        Owner {
            node: Arc::new(ChildNode {
                parent: self.clone(),
                project,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Inner {
        n: u32,
    }

    struct Outer {
        inner: Inner,
        deep: (Inner, Inner),
    }

    #[test]
    fn test_projection_reaches_shared_field() {
        let root = Arc::new(Outer {
            inner: Inner { n: 1 },
            deep: (Inner { n: 2 }, Inner { n: 3 }),
        });
        let owner = Owner::root(Arc::clone(&root));
        let inner = owner.project(|o| &o.inner);
        let deep = owner.project(|o| &o.deep).project(|d| &d.1);
        assert_eq!(inner.get().n, 1);
        assert_eq!(deep.get().n, 3);
        assert!(std::ptr::eq(inner.get(), &root.inner));
        // handles keep the root alive
        drop(owner);
        assert_eq!(Arc::strong_count(&root), 2);
    }
}
