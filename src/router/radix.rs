//! Radix tree for route matching.
//!
//! Paths are split into segments. Each node represents one segment:
//! - static segments (e.g. `users`) match exactly
//! - parameter segments (e.g. `{id}`) match any single segment
//! - routes are stored at terminal nodes, keyed by HTTP method
//!
//! Static children are always tried before parameter children, so
//! `/users/me` wins over `/users/{id}` regardless of registration order.
//! Lookup is O(k) in the path length rather than O(n) in the route count.

use http::Method;
use std::collections::HashMap;
use std::sync::Arc;

use super::core::{ParamVec, Route};

#[derive(Clone, Default)]
struct RadixNode {
    /// The path segment this node represents (without `/`)
    segment: String,
    /// Routes terminating here, per method
    routes: HashMap<Method, Arc<Route>>,
    /// Parameter name for `{name}` nodes
    param_name: Option<Arc<str>>,
    children: Vec<RadixNode>,
    /// Parameter children; several may coexist with different names
    /// (`/users/{id}/posts` next to `/users/{user_id}/comments`).
    param_children: Vec<RadixNode>,
}

/// `{name}` → `Some("name")`
pub(crate) fn param_name(segment: &str) -> Option<&str> {
    segment
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
}

pub(crate) fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

impl RadixNode {
    fn new(segment: &str) -> Self {
        Self {
            segment: segment.to_string(),
            ..Self::default()
        }
    }

    fn new_param(name: &str) -> Self {
        Self {
            param_name: Some(Arc::from(name)),
            ..Self::default()
        }
    }

    fn insert(&mut self, segments: &[&str], method: Method, route: Arc<Route>) {
        let Some((segment, remaining)) = segments.split_first() else {
            self.routes.insert(method, route);
            return;
        };

        if let Some(name) = param_name(segment) {
            if let Some(child) = self
                .param_children
                .iter_mut()
                .find(|c| c.param_name.as_deref() == Some(name))
            {
                child.insert(remaining, method, route);
                return;
            }
            let mut child = RadixNode::new_param(name);
            child.insert(remaining, method, route);
            self.param_children.push(child);
            return;
        }

        if let Some(child) = self.children.iter_mut().find(|c| c.segment == *segment) {
            child.insert(remaining, method, route);
            return;
        }
        let mut child = RadixNode::new(segment);
        child.insert(remaining, method, route);
        self.children.push(child);
    }

    /// Depth-first search for a terminal node accepted by `accept`,
    /// collecting parameters on the way (and backtracking them on failure).
    fn search<'a>(
        &'a self,
        segments: &[&str],
        params: &mut ParamVec,
        accept: &dyn Fn(&RadixNode) -> bool,
    ) -> Option<&'a RadixNode> {
        let Some((segment, remaining)) = segments.split_first() else {
            return accept(self).then_some(self);
        };

        for child in &self.children {
            if child.segment == *segment {
                if let Some(found) = child.search(remaining, params, accept) {
                    return Some(found);
                }
            }
        }

        for child in &self.param_children {
            if let Some(name) = &child.param_name {
                params.push((Arc::clone(name), (*segment).to_string()));
                if let Some(found) = child.search(remaining, params, accept) {
                    return Some(found);
                }
                params.pop();
            }
        }

        None
    }
}

/// Method-aware radix router.
#[derive(Clone, Default)]
pub struct RadixRouter {
    root: RadixNode,
}

impl RadixRouter {
    pub fn insert(&mut self, route: Arc<Route>) {
        let method = route.entry.method.clone();
        let pattern = route.entry.pattern.clone();
        self.root.insert(&segments(&pattern), method, route);
    }

    /// Match `method` + `path`, returning the route and path parameters.
    #[must_use]
    pub fn route(&self, method: &Method, path: &str) -> Option<(Arc<Route>, ParamVec)> {
        let mut params = ParamVec::new();
        let node = self.root.search(
            &segments(path),
            &mut params,
            &|n: &RadixNode| n.routes.contains_key(method),
        )?;
        node.routes.get(method).map(|r| (Arc::clone(r), params))
    }

    /// Methods registered for the first node matching `path` under any method.
    #[must_use]
    pub fn methods(&self, path: &str) -> Vec<Method> {
        let mut params = ParamVec::new();
        let mut methods: Vec<Method> = self
            .root
            .search(&segments(path), &mut params, &|n: &RadixNode| !n.routes.is_empty())
            .map(|n| n.routes.keys().cloned().collect())
            .unwrap_or_default();
        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        methods
    }
}
