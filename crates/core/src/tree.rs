//! Path-indexed tree of watch points
//!
//! Each node is one path segment and owns its children, so there are no
//! back-pointers: upward work (pruning) is done by recursing down the path.
//! On Windows the volume prefix (`C:`) is its own top-level node.

use crate::error::Error;
use crate::native::NativeWatch;
use crate::watchpoint::WatchPoint;
use smallvec::SmallVec;
use std::collections::{BTreeMap, VecDeque};
use std::ffi::{OsStr, OsString};
use std::path::{Component, Path, PathBuf};

/// Walk control returned by traversal callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Walk {
    /// Keep going
    Continue,
    /// Stop here and treat the walk as successful
    ///
    /// For [`Tree::walk_path`] this ends the walk; for [`Tree::walk_subtree`]
    /// it skips the children of the current node.
    Skip,
}

/// A directory (or file) in the tree
#[derive(Debug, Clone, Default)]
pub struct Node {
    /// Path segment, empty for the root
    name: OsString,
    /// Subscriber registrations at this path
    watchpoint: WatchPoint,
    /// What the backend watches at this path, if anything
    native: Option<NativeWatch>,
    /// Children keyed by segment, ordered for deterministic traversal
    children: BTreeMap<OsString, Node>,
}

impl Node {
    fn new(name: &OsStr) -> Self {
        Self {
            name: name.to_os_string(),
            ..Self::default()
        }
    }

    /// Path segment of this node
    pub fn name(&self) -> &OsStr {
        &self.name
    }

    /// Registrations at this node
    pub fn watchpoint(&self) -> &WatchPoint {
        &self.watchpoint
    }

    /// Mutable registrations at this node
    pub fn watchpoint_mut(&mut self) -> &mut WatchPoint {
        &mut self.watchpoint
    }

    /// Native watch registered at this node
    pub fn native(&self) -> Option<&NativeWatch> {
        self.native.as_ref()
    }

    /// Mutable native watch registered at this node
    pub fn native_mut(&mut self) -> Option<&mut NativeWatch> {
        self.native.as_mut()
    }

    /// Replace the native watch record, returning the previous one
    pub fn set_native(&mut self, native: Option<NativeWatch>) -> Option<NativeWatch> {
        std::mem::replace(&mut self.native, native)
    }

    /// Child with the given segment
    pub fn child(&self, name: &OsStr) -> Option<&Node> {
        self.children.get(name)
    }

    /// Children in segment order
    pub fn children(&self) -> impl Iterator<Item = &Node> {
        self.children.values()
    }

    /// Check if the node carries a registration or a native watch
    pub fn is_watched(&self) -> bool {
        !self.watchpoint.is_empty() || self.native.is_some()
    }

    /// Check if the node holds nothing and can be pruned
    pub fn is_vacant(&self) -> bool {
        !self.is_watched() && self.children.is_empty()
    }
}

/// The tree of watch points
#[derive(Debug, Clone, Default)]
pub struct Tree {
    root: Node,
}

impl Tree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the tree holds no nodes besides the root
    pub fn is_empty(&self) -> bool {
        self.root.is_vacant()
    }

    /// Number of nodes, not counting the root
    pub fn len(&self) -> usize {
        let mut count = 0;
        let mut queue: VecDeque<&Node> = self.root.children().collect();
        while let Some(node) = queue.pop_front() {
            count += 1;
            queue.extend(node.children());
        }
        count
    }

    /// Check if a node exists at `path`
    pub fn contains(&self, path: &Path) -> bool {
        self.get(path).is_ok()
    }

    /// Get or create the node at `path`, creating intermediate nodes
    pub fn add(&mut self, path: &Path) -> Result<&mut Node, Error> {
        let segments = segments(path)?;
        let mut node = &mut self.root;
        for segment in segments {
            node = node
                .children
                .entry(segment.to_os_string())
                .or_insert_with(|| Node::new(segment));
        }
        Ok(node)
    }

    /// Look up the node at `path`
    pub fn get(&self, path: &Path) -> Result<&Node, Error> {
        let segments = segments(path)?;
        let mut node = &self.root;
        for segment in segments {
            node = node
                .child(segment)
                .ok_or_else(|| Error::NotExist(path.to_path_buf()))?;
        }
        Ok(node)
    }

    /// Look up the node at `path` for mutation
    pub fn get_mut(&mut self, path: &Path) -> Result<&mut Node, Error> {
        let segments = segments(path)?;
        let mut node = &mut self.root;
        for segment in segments {
            node = node
                .children
                .get_mut(segment)
                .ok_or_else(|| Error::NotExist(path.to_path_buf()))?;
        }
        Ok(node)
    }

    /// Delete the node at `path` with everything below it, then prune
    /// ancestors left empty
    pub fn del(&mut self, path: &Path) -> Result<(), Error> {
        let node = self.get_mut(path)?;
        node.watchpoint = WatchPoint::new();
        node.native = None;
        node.children.clear();
        self.prune(path)
    }

    /// Remove the node at `path` if vacant, cascading to vacant ancestors
    ///
    /// Climbing stops at the first ancestor that still holds something. A
    /// missing path is not an error.
    pub fn prune(&mut self, path: &Path) -> Result<(), Error> {
        let segments = segments(path)?;
        prune_at(&mut self.root, &segments);
        Ok(())
    }

    /// Visit every existing node from the top of `path` down to its leaf
    ///
    /// The root is visited as `/` only while something is registered on it.
    /// The callback gets the node, its path and whether it is the leaf named
    /// by `path`. The walk ends quietly at the first missing segment.
    pub fn walk_path<E, F>(&self, path: &Path, mut f: F) -> Result<(), E>
    where
        E: From<Error>,
        F: FnMut(&Node, &Path, bool) -> Result<Walk, E>,
    {
        let depth = segments(path)?.len();
        if self.root.is_watched() && f(&self.root, &root_path(), depth == 0)? == Walk::Skip {
            return Ok(());
        }

        let mut node = &self.root;
        let mut current = PathBuf::new();
        let mut level = 0;

        for component in path.components() {
            current.push(component.as_os_str());
            let segment = match component {
                Component::RootDir => continue,
                Component::Prefix(prefix) => prefix.as_os_str(),
                Component::Normal(segment) => segment,
                Component::CurDir | Component::ParentDir => {
                    return Err(Error::NotCanonical(path.to_path_buf()).into())
                }
            };
            node = match node.children.get(segment) {
                Some(child) => child,
                None => return Ok(()),
            };
            level += 1;
            if f(node, &current, level == depth)? == Walk::Skip {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Breadth-first walk over the node at `path` and all its descendants
    ///
    /// Children are visited in segment order. Returning [`Walk::Skip`] keeps
    /// the walk from descending into the current node.
    pub fn walk_subtree<E, F>(&self, path: &Path, mut f: F) -> Result<(), E>
    where
        E: From<Error>,
        F: FnMut(&Node, &Path) -> Result<Walk, E>,
    {
        let start = self.get(path)?;
        let mut queue = VecDeque::new();
        queue.push_back((start, path.to_path_buf()));

        while let Some((node, node_path)) = queue.pop_front() {
            if f(node, &node_path)? == Walk::Skip {
                continue;
            }
            for child in node.children() {
                queue.push_back((child, node_path.join(child.name())));
            }
        }
        Ok(())
    }

    /// Breadth-first walk over every node in the tree
    ///
    /// As with [`Tree::walk_path`], the root is only visited while something
    /// is registered on it.
    pub fn walk<E, F>(&self, mut f: F) -> Result<(), E>
    where
        F: FnMut(&Node, &Path) -> Result<Walk, E>,
    {
        let mut queue: VecDeque<(&Node, PathBuf)> = VecDeque::new();
        if self.root.is_watched() {
            queue.push_back((&self.root, root_path()));
        } else {
            queue.extend(
                self.root
                    .children()
                    .map(|child| (child, top_level_path(child.name()))),
            );
        }

        while let Some((node, node_path)) = queue.pop_front() {
            if f(node, &node_path)? == Walk::Skip {
                continue;
            }
            for child in node.children() {
                queue.push_back((child, node_path.join(child.name())));
            }
        }
        Ok(())
    }
}

/// Path of the root node; only reachable where `/` is absolute
fn root_path() -> PathBuf {
    PathBuf::from(std::path::MAIN_SEPARATOR_STR)
}

/// Absolute path of a node hanging directly off the root
fn top_level_path(name: &OsStr) -> PathBuf {
    let path = PathBuf::from(name);
    match path.components().next() {
        Some(Component::Prefix(_)) => path.join(std::path::MAIN_SEPARATOR_STR),
        _ => Path::new(std::path::MAIN_SEPARATOR_STR).join(name),
    }
}

/// Split an absolute, canonical path into node segments
fn segments(path: &Path) -> Result<SmallVec<[&OsStr; 16]>, Error> {
    if !path.is_absolute() {
        return Err(Error::NotAbsolute(path.to_path_buf()));
    }
    let mut out = SmallVec::new();
    for component in path.components() {
        match component {
            Component::RootDir => {}
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::Normal(segment) => out.push(segment),
            Component::CurDir | Component::ParentDir => {
                return Err(Error::NotCanonical(path.to_path_buf()))
            }
        }
    }
    Ok(out)
}

/// Returns whether `node` became vacant
fn prune_at(node: &mut Node, segments: &[&OsStr]) -> bool {
    if let Some((first, rest)) = segments.split_first() {
        let vacant = match node.children.get_mut(*first) {
            Some(child) => prune_at(child, rest),
            None => false,
        };
        if vacant {
            node.children.remove(*first);
        }
    }
    node.is_vacant()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::watchpoint::SubscriberId;

    const A: SubscriberId = SubscriberId::new(1);

    fn p(s: &str) -> &Path {
        Path::new(s)
    }

    #[test]
    fn test_add_creates_intermediate_nodes() {
        let mut tree = Tree::new();
        tree.add(p("/a/b/c")).unwrap();

        assert!(tree.contains(p("/a")));
        assert!(tree.contains(p("/a/b")));
        assert!(tree.contains(p("/a/b/c")));
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.get(p("/a/b/c")).unwrap().name(), "c");
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut tree = Tree::new();
        tree.add(p("/a/b")).unwrap().watchpoint_mut().add(A, Event::WRITE);
        let node = tree.add(p("/a/b")).unwrap();
        assert_eq!(node.watchpoint().get(A), Some(Event::WRITE));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_get_missing_is_not_exist() {
        let mut tree = Tree::new();
        tree.add(p("/a")).unwrap();
        assert!(matches!(tree.get(p("/a/b")), Err(Error::NotExist(_))));
        assert!(matches!(tree.get(p("relative")), Err(Error::NotAbsolute(_))));
        assert!(matches!(tree.get(p("/a/../b")), Err(Error::NotCanonical(_))));
    }

    #[test]
    fn test_del_prunes_empty_ancestors() {
        let mut tree = Tree::new();
        tree.add(p("/a/b/c")).unwrap().watchpoint_mut().add(A, Event::CREATE);
        tree.del(p("/a/b/c")).unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn test_del_stops_at_non_empty_ancestor() {
        let mut tree = Tree::new();
        tree.add(p("/a")).unwrap().watchpoint_mut().add(A, Event::CREATE);
        tree.add(p("/a/b/c")).unwrap().watchpoint_mut().add(A, Event::WRITE);
        tree.add(p("/a/x")).unwrap().watchpoint_mut().add(A, Event::WRITE);

        tree.del(p("/a/b")).unwrap();
        assert!(!tree.contains(p("/a/b")));
        assert!(tree.contains(p("/a")));
        assert!(tree.contains(p("/a/x")));
    }

    #[test]
    fn test_prune_keeps_nodes_with_native_watch() {
        let mut tree = Tree::new();
        tree.add(p("/a/b"))
            .unwrap()
            .set_native(Some(NativeWatch::Direct(Event::CREATE)));
        tree.prune(p("/a/b")).unwrap();
        assert!(tree.contains(p("/a/b")));

        tree.get_mut(p("/a/b")).unwrap().set_native(None);
        tree.prune(p("/a/b")).unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn test_walk_path_visits_root_to_leaf() {
        let mut tree = Tree::new();
        tree.add(p("/a/b/c")).unwrap();

        let mut seen = Vec::new();
        tree.walk_path::<Error, _>(p("/a/b/c"), |node, path, leaf| {
            seen.push((node.name().to_os_string(), path.to_path_buf(), leaf));
            Ok(Walk::Continue)
        })
        .unwrap();

        assert_eq!(
            seen,
            vec![
                (OsString::from("a"), PathBuf::from("/a"), false),
                (OsString::from("b"), PathBuf::from("/a/b"), false),
                (OsString::from("c"), PathBuf::from("/a/b/c"), true),
            ]
        );
    }

    #[test]
    fn test_walk_path_stops_at_missing_segment_and_skip() {
        let mut tree = Tree::new();
        tree.add(p("/a/b")).unwrap();

        let mut count = 0;
        tree.walk_path::<Error, _>(p("/a/b/c/d"), |_, _, _| {
            count += 1;
            Ok(Walk::Continue)
        })
        .unwrap();
        assert_eq!(count, 2);

        let mut count = 0;
        tree.walk_path::<Error, _>(p("/a/b"), |_, _, _| {
            count += 1;
            Ok(Walk::Skip)
        })
        .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_walk_path_propagates_errors() {
        let mut tree = Tree::new();
        tree.add(p("/a/b")).unwrap();

        let result = tree.walk_path(p("/a/b"), |_, path, _| {
            if path == Path::new("/a") {
                Err(Error::NotExist(path.to_path_buf()))
            } else {
                Ok(Walk::Continue)
            }
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_walk_subtree_is_breadth_first() {
        let mut tree = Tree::new();
        tree.add(p("/r/b/y")).unwrap();
        tree.add(p("/r/a/x")).unwrap();
        tree.add(p("/r/c")).unwrap();

        let mut seen = Vec::new();
        tree.walk_subtree::<Error, _>(p("/r"), |_, path| {
            seen.push(path.to_path_buf());
            Ok(Walk::Continue)
        })
        .unwrap();

        let expected: Vec<PathBuf> = ["/r", "/r/a", "/r/b", "/r/c", "/r/a/x", "/r/b/y"]
            .iter()
            .map(PathBuf::from)
            .collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_walks_visit_watched_root() {
        let mut tree = Tree::new();
        tree.add(p("/")).unwrap().watchpoint_mut().add(A, Event::CREATE | Event::RECURSIVE);
        tree.add(p("/a/b")).unwrap();

        let mut seen = Vec::new();
        tree.walk_path::<Error, _>(p("/a/b"), |_, path, leaf| {
            seen.push((path.to_path_buf(), leaf));
            Ok(Walk::Continue)
        })
        .unwrap();
        assert_eq!(
            seen,
            vec![
                (PathBuf::from("/"), false),
                (PathBuf::from("/a"), false),
                (PathBuf::from("/a/b"), true),
            ]
        );

        let mut seen = Vec::new();
        tree.walk_path::<Error, _>(p("/"), |_, path, leaf| {
            seen.push((path.to_path_buf(), leaf));
            Ok(Walk::Skip)
        })
        .unwrap();
        assert_eq!(seen, vec![(PathBuf::from("/"), true)]);

        let mut seen = Vec::new();
        tree.walk::<Error, _>(|_, path| {
            seen.push(path.to_path_buf());
            Ok(Walk::Continue)
        })
        .unwrap();
        assert_eq!(seen, vec![PathBuf::from("/"), PathBuf::from("/a"), PathBuf::from("/a/b")]);

        tree.get_mut(p("/")).unwrap().watchpoint_mut().del(A);
        let mut count = 0;
        tree.walk_path::<Error, _>(p("/a"), |_, _, _| {
            count += 1;
            Ok(Walk::Continue)
        })
        .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_walk_covers_whole_tree() {
        let mut tree = Tree::new();
        tree.add(p("/r/a")).unwrap();
        tree.add(p("/s")).unwrap();

        let mut seen = Vec::new();
        tree.walk::<Error, _>(|_, path| {
            seen.push(path.to_path_buf());
            Ok(Walk::Continue)
        })
        .unwrap();

        assert_eq!(seen, vec![PathBuf::from("/r"), PathBuf::from("/s"), PathBuf::from("/r/a")]);
    }

    #[test]
    fn test_walk_subtree_skip_prunes_branch() {
        let mut tree = Tree::new();
        tree.add(p("/r/a/x")).unwrap();
        tree.add(p("/r/b/y")).unwrap();

        let mut seen = Vec::new();
        tree.walk_subtree::<Error, _>(p("/r"), |node, path| {
            seen.push(path.to_path_buf());
            Ok(if node.name() == "a" { Walk::Skip } else { Walk::Continue })
        })
        .unwrap();

        assert!(!seen.contains(&PathBuf::from("/r/a/x")));
        assert!(seen.contains(&PathBuf::from("/r/b/y")));
    }
}
