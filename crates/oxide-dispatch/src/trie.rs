//! Path trie.
//!
//! Matching is delegated to a `matchit` radix tree; this module only keeps
//! the per-pattern nodes and their handler chains.

use std::collections::HashMap;

use crate::error::ValidationError;
use crate::request::{Method, PathParams};
use crate::router::Layer;

/// A defined path pattern and the chains registered under it, per method.
#[derive(Clone)]
pub struct TrieNode {
    pattern: String,
    methods: HashMap<Method, Vec<Layer>>,
}

impl TrieNode {
    fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            methods: HashMap::new(),
        }
    }

    /// The pattern this node was defined with.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The chain registered for `method`, if any.
    pub fn chain(&self, method: Method) -> Option<&[Layer]> {
        self.methods.get(&method).map(Vec::as_slice)
    }

    /// Methods with a chain at this node, sorted.
    pub fn methods(&self) -> Vec<Method> {
        let mut methods: Vec<Method> = self.methods.keys().copied().collect();
        methods.sort();
        methods
    }

    /// Appends layers to the chain for `method`, creating it on first use.
    pub(crate) fn append(&mut self, method: Method, layers: impl IntoIterator<Item = Layer>) {
        self.methods.entry(method).or_default().extend(layers);
    }
}

impl std::fmt::Debug for TrieNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrieNode")
            .field("pattern", &self.pattern)
            .field("methods", &self.methods())
            .finish()
    }
}

/// Result of [`PathTrie::matches`].
#[derive(Debug)]
pub struct TrieMatch<'a> {
    /// The matched node.
    pub node: &'a TrieNode,
    /// Parameters extracted from the path.
    pub params: PathParams,
}

/// Path patterns resolved to nodes.
///
/// Pattern syntax:
/// - `/users` - literal path
/// - `/users/{id}` - named parameter
/// - `/files/{*rest}` - catch-all parameter
///
/// # Example
///
/// ```
/// use oxide_dispatch::PathTrie;
///
/// let mut trie = PathTrie::new();
/// trie.define("/posts/{id}/comments/{comment_id}").unwrap();
///
/// let found = trie.matches("/posts/123/comments/456").unwrap();
/// assert_eq!(found.node.pattern(), "/posts/{id}/comments/{comment_id}");
/// assert_eq!(found.params.get("id"), Some("123"));
/// assert_eq!(found.params.get("comment_id"), Some("456"));
/// ```
pub struct PathTrie {
    matcher: matchit::Router<usize>,
    nodes: Vec<TrieNode>,
    index: HashMap<String, usize>,
}

impl PathTrie {
    /// Creates an empty trie.
    pub fn new() -> Self {
        Self {
            matcher: matchit::Router::new(),
            nodes: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Returns the node for `pattern`, defining it first if needed.
    pub fn define(&mut self, pattern: &str) -> Result<&mut TrieNode, ValidationError> {
        if let Some(&id) = self.index.get(pattern) {
            return Ok(&mut self.nodes[id]);
        }

        let id = self.nodes.len();
        self.matcher
            .insert(pattern, id)
            .map_err(|err| ValidationError::Conflict {
                path: pattern.to_string(),
                message: err.to_string(),
            })?;
        self.nodes.push(TrieNode::new(pattern));
        self.index.insert(pattern.to_string(), id);
        Ok(&mut self.nodes[id])
    }

    /// Resolves a concrete path.
    pub fn matches(&self, path: &str) -> Option<TrieMatch<'_>> {
        let found = self.matcher.at(path).ok()?;
        let node = self.nodes.get(*found.value)?;
        Some(TrieMatch {
            node,
            params: found.params.iter().collect(),
        })
    }

    /// Returns the node defined with exactly `pattern`.
    pub fn get(&self, pattern: &str) -> Option<&TrieNode> {
        self.index.get(pattern).map(|&id| &self.nodes[id])
    }

    /// Defined nodes, in definition order.
    pub fn nodes(&self) -> impl Iterator<Item = &TrieNode> {
        self.nodes.iter()
    }

    /// Number of defined patterns.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` when nothing is defined.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Default for PathTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PathTrie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.nodes.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_is_idempotent() {
        let mut trie = PathTrie::new();
        trie.define("/users/{id}").unwrap();
        trie.define("/users/{id}").unwrap();
        assert_eq!(trie.len(), 1);
    }

    #[test]
    fn test_static_and_param() {
        let mut trie = PathTrie::new();
        trie.define("/users").unwrap();
        trie.define("/users/{id}").unwrap();

        let found = trie.matches("/users").unwrap();
        assert_eq!(found.node.pattern(), "/users");
        assert!(found.params.is_empty());

        let found = trie.matches("/users/42").unwrap();
        assert_eq!(found.node.pattern(), "/users/{id}");
        assert_eq!(found.params.get("id"), Some("42"));
    }

    #[test]
    fn test_catch_all() {
        let mut trie = PathTrie::new();
        trie.define("/files/{*rest}").unwrap();
        let found = trie.matches("/files/a/b/c.txt").unwrap();
        assert_eq!(found.params.get("rest"), Some("a/b/c.txt"));
    }

    #[test]
    fn test_no_match() {
        let mut trie = PathTrie::new();
        trie.define("/users").unwrap();
        assert!(trie.matches("/posts").is_none());
        assert!(trie.matches("/users/1").is_none());
    }

    #[test]
    fn test_conflict() {
        let mut trie = PathTrie::new();
        trie.define("/users/{id}").unwrap();
        let err = trie.define("/users/{name}").unwrap_err();
        assert!(matches!(err, ValidationError::Conflict { path, .. } if path == "/users/{name}"));
    }

    #[test]
    fn test_node_methods_sorted() {
        let mut trie = PathTrie::new();
        let node = trie.define("/a").unwrap();
        node.append(Method::Post, Vec::new());
        node.append(Method::Get, Vec::new());
        assert_eq!(trie.get("/a").unwrap().methods(), vec![Method::Get, Method::Post]);
    }
}
