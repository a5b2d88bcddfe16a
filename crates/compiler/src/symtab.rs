//! Scoped symbol table.
//!
//! Each [`SymbolTable`] is a binary search tree keyed by name (for
//! `search`) plus a separately maintained declaration-order list (for
//! iteration and, eventually, for walking a function's locals to compute
//! its total activation size). A [`ScopeStack`] is a stack of these,
//! pushed on function/compound entry and popped on exit.

use crate::types::TypeId;
use cx_core::value::{SymbolId, Value};
use std::cmp::Ordering;

/// What a symbol names.
///
/// A node's `kind` may only ever transition `Undefined` -> some concrete
/// kind; nothing downgrades it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefnKind {
    Undefined,
    Constant,
    Type,
    Variable,
    Field,
    ValueParam,
    RefParam,
    Function,
}

/// Per-kind payload carried by a symbol node.
#[derive(Debug, Clone)]
pub enum DefnData {
    None,
    Constant(Value),
    /// Byte offset of a variable/parameter within its activation.
    Variable { offset: i32 },
    Function(FunctionDefn),
}

impl Default for DefnData {
    fn default() -> Self {
        DefnData::None
    }
}

/// A function's descriptor: parameter/local lists, return type, and the
/// location of its compiled code.
#[derive(Debug, Clone, Default)]
pub struct FunctionDefn {
    pub params_head: Option<SymbolId>,
    pub locals_head: Option<SymbolId>,
    pub return_type: Option<TypeId>,
    /// Index into the function's own instruction vector (always 0 once
    /// assembled, but recorded explicitly rather than assumed).
    pub entry: usize,
    /// Total byte size of the activation's locals, computed by the
    /// parser before the VM enters the function.
    pub local_size: i32,
}

/// A node in the symbol table.
#[derive(Debug, Clone)]
pub struct SymbolNode {
    pub name: String,
    pub kind: DefnKind,
    pub type_id: Option<TypeId>,
    pub data: DefnData,
    /// Declaration-order link, used for emission/iteration.
    pub next: Option<SymbolId>,
    left: Option<SymbolId>,
    right: Option<SymbolId>,
}

impl SymbolNode {
    fn new(name: String) -> Self {
        SymbolNode {
            name,
            kind: DefnKind::Undefined,
            type_id: None,
            data: DefnData::None,
            next: None,
            left: None,
            right: None,
        }
    }
}

/// A single scope: a name-keyed BST plus a declaration-order list.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    nodes: Vec<SymbolNode>,
    bst_root: Option<SymbolId>,
    decl_head: Option<SymbolId>,
    decl_tail: Option<SymbolId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable { nodes: Vec::new(), bst_root: None, decl_head: None, decl_tail: None }
    }

    pub fn get(&self, id: SymbolId) -> &SymbolNode {
        &self.nodes[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut SymbolNode {
        &mut self.nodes[id.0 as usize]
    }

    /// BST lookup by name.
    pub fn search(&self, name: &str) -> Option<SymbolId> {
        let mut cur = self.bst_root;
        while let Some(id) = cur {
            let node = &self.nodes[id.0 as usize];
            cur = match name.cmp(node.name.as_str()) {
                Ordering::Equal => return Some(id),
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
            };
        }
        None
    }

    fn insert_bst(&mut self, id: SymbolId) {
        let Some(mut cur) = self.bst_root else {
            self.bst_root = Some(id);
            return;
        };
        let name = self.nodes[id.0 as usize].name.clone();
        loop {
            let node = &self.nodes[cur.0 as usize];
            match name.cmp(node.name.as_str()) {
                Ordering::Less | Ordering::Equal => match node.left {
                    Some(next) => cur = next,
                    None => {
                        self.nodes[cur.0 as usize].left = Some(id);
                        return;
                    }
                },
                Ordering::Greater => match node.right {
                    Some(next) => cur = next,
                    None => {
                        self.nodes[cur.0 as usize].right = Some(id);
                        return;
                    }
                },
            }
        }
    }

    fn append_decl(&mut self, id: SymbolId) {
        match self.decl_tail {
            Some(tail) => self.nodes[tail.0 as usize].next = Some(id),
            None => self.decl_head = Some(id),
        }
        self.decl_tail = Some(id);
    }

    fn alloc(&mut self, name: &str) -> SymbolId {
        let id = SymbolId(self.nodes.len() as u32);
        self.nodes.push(SymbolNode::new(name.to_string()));
        self.insert_bst(id);
        self.append_decl(id);
        id
    }

    /// Returns the existing node for `name`, or creates one with kind
    /// `Undefined`.
    pub fn enter(&mut self, name: &str) -> SymbolId {
        self.search(name).unwrap_or_else(|| self.alloc(name))
    }

    /// Creates a new node for `name`. Returns the existing node as `Err`
    /// if one is already present, so the caller can report a redefined
    /// identifier.
    pub fn enter_new(&mut self, name: &str) -> Result<SymbolId, SymbolId> {
        if let Some(existing) = self.search(name) {
            return Err(existing);
        }
        Ok(self.alloc(name))
    }

    /// Head of the declaration-order list.
    pub fn root(&self) -> Option<SymbolId> {
        self.decl_head
    }

    pub fn iter_decl_order(&self) -> DeclOrderIter<'_> {
        DeclOrderIter { table: self, cur: self.decl_head }
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        SymbolTable::new()
    }
}

pub struct DeclOrderIter<'a> {
    table: &'a SymbolTable,
    cur: Option<SymbolId>,
}

impl<'a> Iterator for DeclOrderIter<'a> {
    type Item = SymbolId;
    fn next(&mut self) -> Option<SymbolId> {
        let id = self.cur?;
        self.cur = self.table.get(id).next;
        Some(id)
    }
}

/// A stack of scopes, innermost last.
pub struct ScopeStack {
    scopes: Vec<SymbolTable>,
}

impl ScopeStack {
    /// Starts with a single global scope.
    pub fn new() -> Self {
        ScopeStack { scopes: vec![SymbolTable::new()] }
    }

    pub fn push(&mut self) {
        self.scopes.push(SymbolTable::new());
    }

    pub fn pop(&mut self) -> SymbolTable {
        assert!(self.scopes.len() > 1, "cannot pop the global scope");
        self.scopes.pop().expect("scope stack non-empty")
    }

    pub fn global(&self) -> &SymbolTable {
        &self.scopes[0]
    }

    pub fn global_mut(&mut self) -> &mut SymbolTable {
        &mut self.scopes[0]
    }

    pub fn innermost(&self) -> &SymbolTable {
        self.scopes.last().expect("scope stack non-empty")
    }

    pub fn innermost_mut(&mut self) -> &mut SymbolTable {
        self.scopes.last_mut().expect("scope stack non-empty")
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Consults innermost to outermost.
    pub fn search_all(&self, name: &str) -> Option<SymbolId> {
        self.scopes.iter().rev().find_map(|scope| scope.search(name))
    }

    /// Which scope (by depth index, 0 = global) owns `name`, if any.
    /// Needed because a `SymbolId` alone is only unique within the scope
    /// that allocated it.
    pub fn scope_of(&self, name: &str) -> Option<usize> {
        self.scopes.iter().enumerate().rev().find(|(_, s)| s.search(name).is_some()).map(|(i, _)| i)
    }

    pub fn scope(&self, depth: usize) -> &SymbolTable {
        &self.scopes[depth]
    }

    pub fn scope_mut(&mut self, depth: usize) -> &mut SymbolTable {
        &mut self.scopes[depth]
    }

    /// `enter` against the innermost scope.
    pub fn enter_local(&mut self, name: &str) -> SymbolId {
        self.innermost_mut().enter(name)
    }
}

impl Default for ScopeStack {
    fn default() -> Self {
        ScopeStack::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_is_idempotent() {
        let mut t = SymbolTable::new();
        let a = t.enter("x");
        let b = t.enter("x");
        assert_eq!(a, b);
    }

    #[test]
    fn enter_new_fails_on_redefinition() {
        let mut t = SymbolTable::new();
        let a = t.enter_new("x").unwrap();
        let err = t.enter_new("x").unwrap_err();
        assert_eq!(a, err);
    }

    #[test]
    fn declaration_order_is_preserved() {
        let mut t = SymbolTable::new();
        t.enter("c");
        t.enter("a");
        t.enter("b");
        let names: Vec<_> = t.iter_decl_order().map(|id| t.get(id).name.clone()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn search_all_prefers_innermost_scope() {
        let mut scopes = ScopeStack::new();
        scopes.global_mut().enter("x");
        scopes.push();
        let inner = scopes.enter_local("x");
        assert_eq!(scopes.search_all("x"), Some(inner));
    }
}
