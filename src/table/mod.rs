
use indexmap::IndexMap;

use crate::error::{CompileError, Result};

/// The value category a name can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Integer,
    Char,
    String,
    Float,
    Boolean,
    Unknown,
}

impl DataType {
    /// Reserved byte width of one value of this type. Untyped declarations
    /// reserve a full word until their first assignment resolves them.
    pub fn size(self) -> i64 {
        match self {
            Self::Char | Self::Boolean => 1,
            Self::Integer | Self::Float => 4,
            Self::String | Self::Unknown => 8,
        }
    }
}

/// Per-name record inside a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub data_type: DataType,
    pub is_function: bool,
    pub size: i64,
    /// Byte offset within the owning scope, assigned at insert time.
    pub address: i64,
    /// Base-pointer-relative offset, resolved at first code-gen use.
    pub relative_address: i64,
}

impl Metadata {
    pub fn variable(data_type: DataType) -> Self {
        Self {
            data_type,
            is_function: false,
            size: data_type.size(),
            address: 0,
            relative_address: -1,
        }
    }

    /// Functions live in the table for lookup only and occupy no stack.
    pub fn function(return_type: DataType) -> Self {
        Self {
            data_type: return_type,
            is_function: true,
            size: 0,
            address: 0,
            relative_address: -1,
        }
    }
}

pub type ScopeId = usize;

/// One node of the lexical scope tree.
#[derive(Debug, Default)]
pub struct Scope {
    symbols: IndexMap<String, Metadata>,
    pub scope_size: i64,
    parent: Option<ScopeId>,
    children: Vec<ScopeId>,
    /// Replay cursor over `children`, used by the code generator.
    cursor: usize,
}

/// The scope tree. Scopes live in an arena and refer to each other by
/// index; `current` walks the tree for both the parser (edit mode) and the
/// code generator (replay mode), which run strictly one after the other.
#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    current: ScopeId,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
            current: 0,
        }
    }

    pub fn current(&self) -> ScopeId {
        self.current
    }

    /// Size of the current scope's frame, the sum of its entry sizes.
    pub fn scope_size(&self) -> i64 {
        self.scopes[self.current].scope_size
    }

    /// Opens a fresh child of the current scope and switches into it.
    pub fn scope_in(&mut self) -> ScopeId {
        let child = self.scopes.len();
        self.scopes.push(Scope {
            parent: Some(self.current),
            ..Scope::default()
        });
        self.scopes[self.current].children.push(child);
        self.current = child;
        child
    }

    /// Returns to the parent scope.
    pub fn scope_out(&mut self) -> Result<ScopeId> {
        let parent = self.scopes[self.current]
            .parent
            .ok_or_else(|| CompileError::runtime("no outer scope to move to", -1))?;
        self.current = parent;
        Ok(parent)
    }

    /// Inserts a name into the current scope. The address is the running
    /// scope size, so addresses are the prefix sums of the entry sizes.
    /// A name already visible anywhere on the lexical chain is rejected.
    pub fn add_symbol(&mut self, name: &str, mut data: Metadata) -> Result<()> {
        if self.lookup(name).is_some() {
            return Err(CompileError::semantic(
                format!("variable '{name}' already exists"),
                -1,
            ));
        }
        let scope = &mut self.scopes[self.current];
        data.address = scope.scope_size;
        scope.scope_size += data.size;
        scope.symbols.insert(name.to_owned(), data);
        Ok(())
    }

    /// Resolves a name from the current scope outwards.
    pub fn lookup(&self, name: &str) -> Option<&Metadata> {
        let mut scope = Some(self.current);
        while let Some(id) = scope {
            if let Some(data) = self.scopes[id].symbols.get(name) {
                return Some(data);
            }
            scope = self.scopes[id].parent;
        }
        None
    }

    fn lookup_mut(&mut self, name: &str) -> Option<&mut Metadata> {
        let mut scope = Some(self.current);
        while let Some(id) = scope {
            if self.scopes[id].symbols.contains_key(name) {
                return self.scopes[id].symbols.get_mut(name);
            }
            scope = self.scopes[id].parent;
        }
        None
    }

    /// Caches the resolved base-pointer offset on the first matching entry.
    pub fn set_relative_address(&mut self, name: &str, value: i64) {
        if let Some(data) = self.lookup_mut(name) {
            data.relative_address = value;
        }
    }

    /// Commits an inferred type onto an UNKNOWN-typed entry.
    pub fn change_type(&mut self, name: &str, data_type: DataType) {
        if let Some(data) = self.lookup_mut(name) {
            data.data_type = data_type;
        }
    }

    /// Replay mode: descends into the next unvisited child of the current
    /// scope, in the order the parser created them.
    pub fn traverse_in(&mut self) -> Result<ScopeId> {
        let scope = &mut self.scopes[self.current];
        let child = *scope
            .children
            .get(scope.cursor)
            .ok_or_else(|| CompileError::runtime("no further scope to traverse into", -1))?;
        scope.cursor += 1;
        self.current = child;
        Ok(child)
    }

    /// Replay mode: resets the exited scope's cursor and returns to the
    /// parent, so a scope replays from its first child if entered again.
    pub fn traverse_out(&mut self) -> Result<ScopeId> {
        let scope = &mut self.scopes[self.current];
        scope.cursor = 0;
        let parent = scope
            .parent
            .ok_or_else(|| CompileError::runtime("no outer scope to traverse out to", -1))?;
        self.current = parent;
        Ok(parent)
    }

    /// Direct entries of a scope, in declaration order.
    pub fn symbols(&self, scope: ScopeId) -> impl Iterator<Item = (&str, &Metadata)> {
        self.scopes[scope]
            .symbols
            .iter()
            .map(|(name, data)| (name.as_str(), data))
    }
}
