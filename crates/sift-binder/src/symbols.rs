//! Symbols, declarations, and symbol tables.

use crate::scopes::ScopeId;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use sift_common::Atom;
use sift_syntax::NodeId;

/// Index into the symbol arena.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SymbolId(pub u32);

impl SymbolId {
    pub const NONE: SymbolId = SymbolId(u32::MAX);

    pub fn is_none(self) -> bool {
        self == SymbolId::NONE
    }
}

pub mod symbol_flags {
    pub const NONE: u32 = 0;
    pub const VARIABLE: u32 = 1 << 0;
    pub const PARAMETER: u32 = 1 << 1;
    pub const FUNCTION: u32 = 1 << 2;
    pub const CLASS: u32 = 1 << 3;
    pub const IMPORT: u32 = 1 << 4;
    /// Placeholder created while recovering from malformed input.
    pub const UNKNOWN: u32 = 1 << 5;
}

/// How a declaration introduces its name.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclarationKind {
    Variable,
    Parameter,
    Function,
    Class,
    ImportAlias,
    LoopTarget,
    ExceptBinding,
    ComprehensionTarget,
    Placeholder,
}

/// One declaration site of a symbol. `annotation` is the explicit type
/// annotation expression when the source carries one.
#[derive(Copy, Clone, Debug)]
pub struct Declaration {
    pub node: NodeId,
    pub annotation: NodeId,
    pub kind: DeclarationKind,
}

/// A named entity. Every symbol has at least one declaration; the binder
/// appends further declarations as it encounters re-declarations of the
/// same name in the same scope.
#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: Atom,
    pub flags: u32,
    pub scope: ScopeId,
    pub declarations: Vec<Declaration>,
}

impl Symbol {
    pub fn has_any_flags(&self, flags: u32) -> bool {
        self.flags & flags != 0
    }

    /// First declaration carrying an explicit annotation, if any.
    pub fn annotated_declaration(&self) -> Option<&Declaration> {
        self.declarations.iter().find(|d| !d.annotation.is_none())
    }
}

#[derive(Default)]
pub struct SymbolArena {
    symbols: Vec<Symbol>,
}

impl SymbolArena {
    pub fn new() -> Self {
        SymbolArena::default()
    }

    pub fn alloc(&mut self, symbol: Symbol) -> SymbolId {
        debug_assert!(
            !symbol.declarations.is_empty(),
            "symbol allocated without a declaration"
        );
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(symbol);
        id
    }

    pub fn get(&self, id: SymbolId) -> Option<&Symbol> {
        if id.is_none() {
            return None;
        }
        self.symbols.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: SymbolId) -> Option<&mut Symbol> {
        if id.is_none() {
            return None;
        }
        self.symbols.get_mut(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (SymbolId(i as u32), s))
    }

    pub fn clear(&mut self) {
        self.symbols.clear();
    }
}

/// Name → symbol mapping for one scope.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    map: FxHashMap<Atom, SymbolId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn get(&self, name: Atom) -> Option<SymbolId> {
        self.map.get(&name).copied()
    }

    pub fn has(&self, name: Atom) -> bool {
        self.map.contains_key(&name)
    }

    pub fn set(&mut self, name: Atom, symbol: SymbolId) {
        self.map.insert(name, symbol);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Atom, SymbolId)> + '_ {
        self.map.iter().map(|(&name, &id)| (name, id))
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}
