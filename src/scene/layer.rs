//! Ordered child list of a `Layer` node.
//!
//! Children are stored back to front: index 0 is painted first and ends up
//! behind everything else, the last child is painted last and is the first
//! to see pointer events.

use std::rc::Rc;

use crate::scene::node::SceneNode;

#[derive(Default)]
pub struct Layer {
    children: Vec<Rc<SceneNode>>,
}

impl Layer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `node` in front of every existing child.
    pub fn insert_front(&mut self, node: Rc<SceneNode>) {
        self.children.push(node);
    }

    /// Adds `node` behind every existing child.
    pub fn insert_back(&mut self, node: Rc<SceneNode>) {
        self.children.insert(0, node);
    }

    /// Adds `node` directly in front of `existing`.
    ///
    /// Returns false, leaving the layer untouched, if `existing` is not a child.
    pub fn insert_above(&mut self, existing: &Rc<SceneNode>, node: Rc<SceneNode>) -> bool {
        match self.position(existing) {
            Some(i) => {
                self.children.insert(i + 1, node);
                true
            }
            None => false,
        }
    }

    /// Adds `node` directly behind `existing`.
    ///
    /// Returns false, leaving the layer untouched, if `existing` is not a child.
    pub fn insert_below(&mut self, existing: &Rc<SceneNode>, node: Rc<SceneNode>) -> bool {
        match self.position(existing) {
            Some(i) => {
                self.children.insert(i, node);
                true
            }
            None => false,
        }
    }

    /// Removes the first occurrence of `node` in draw order.
    pub fn remove(&mut self, node: &Rc<SceneNode>) -> bool {
        match self.position(node) {
            Some(i) => {
                self.children.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn size(&self) -> usize {
        self.children.len()
    }

    pub fn contains(&self, node: &Rc<SceneNode>) -> bool {
        self.position(node).is_some()
    }

    /// Children in paint order, back-most first.
    pub fn children(&self) -> &[Rc<SceneNode>] {
        &self.children
    }

    fn position(&self, node: &Rc<SceneNode>) -> Option<usize> {
        self.children.iter().position(|c| Rc::ptr_eq(c, node))
    }
}
