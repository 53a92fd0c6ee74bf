//! Type interning for structural deduplication.
//!
//! Converts `TypeKey` structures into lightweight `TypeId` handles:
//! - O(1) type equality (compare ids)
//! - each unique structure stored once
//! - canonical union construction, so structurally equal unions intern to
//!   the same id regardless of construction order
//!
//! Thread-safe behind `RwLock` tables; a shared interner can serve parallel
//! per-file pipelines as a read-mostly structure.

use crate::types::*;
use rustc_hash::{FxHashMap, FxHashSet};
use sift_binder::ScopeId;
use sift_common::{Atom, Interner};
use sift_syntax::NodeId;
use std::hash::Hash;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

struct SliceInterner<T> {
    items: Vec<Arc<[T]>>,
    map: FxHashMap<Arc<[T]>, u32>,
}

impl<T> SliceInterner<T>
where
    T: Eq + Hash,
{
    fn new() -> Self {
        let empty: Arc<[T]> = Arc::from(Vec::new());
        let mut map = FxHashMap::default();
        map.insert(empty.clone(), 0);
        SliceInterner {
            items: vec![empty],
            map,
        }
    }

    fn intern(&mut self, items: Vec<T>) -> u32 {
        if items.is_empty() {
            return 0;
        }
        if let Some(&id) = self.map.get(items.as_slice()) {
            return id;
        }
        let arc: Arc<[T]> = items.into();
        let id = self.items.len() as u32;
        self.items.push(arc.clone());
        self.map.insert(arc, id);
        id
    }

    fn get(&self, id: u32) -> Arc<[T]> {
        self.items[id as usize].clone()
    }
}

struct ValueInterner<T> {
    items: Vec<Arc<T>>,
    map: FxHashMap<Arc<T>, u32>,
}

impl<T> ValueInterner<T>
where
    T: Eq + Hash,
{
    fn new() -> Self {
        ValueInterner {
            items: Vec::new(),
            map: FxHashMap::default(),
        }
    }

    fn intern(&mut self, value: T) -> u32 {
        if let Some(&id) = self.map.get(&value) {
            return id;
        }
        let arc = Arc::new(value);
        let id = self.items.len() as u32;
        self.items.push(arc.clone());
        self.map.insert(arc, id);
        id
    }

    fn get(&self, id: u32) -> Arc<T> {
        self.items[id as usize].clone()
    }
}

#[derive(Default)]
struct KeyTables {
    map: FxHashMap<TypeKey, TypeId>,
    list: Vec<TypeKey>,
}

/// Well-known shapes and instances registered at interner construction.
pub struct Builtins {
    pub object_shape: ClassShapeId,
    pub object_class: TypeId,
    pub object_instance: TypeId,
    pub int_shape: ClassShapeId,
    pub int_instance: TypeId,
    pub float_shape: ClassShapeId,
    pub float_instance: TypeId,
    pub str_shape: ClassShapeId,
    pub str_instance: TypeId,
    pub bool_shape: ClassShapeId,
    pub bool_instance: TypeId,
    pub list_shape: ClassShapeId,
    pub dict_shape: ClassShapeId,
    pub tuple_shape: ClassShapeId,
    pub base_exception_shape: ClassShapeId,
    pub base_exception_instance: TypeId,
    pub exception_shape: ClassShapeId,
    pub exception_instance: TypeId,
    /// Builtin class objects by name, consulted when scope resolution fails.
    by_name: FxHashMap<Atom, TypeId>,
}

impl Builtins {
    fn placeholder() -> Self {
        let nil = ClassShapeId(u32::MAX);
        Builtins {
            object_shape: nil,
            object_class: TypeId::UNKNOWN,
            object_instance: TypeId::UNKNOWN,
            int_shape: nil,
            int_instance: TypeId::UNKNOWN,
            float_shape: nil,
            float_instance: TypeId::UNKNOWN,
            str_shape: nil,
            str_instance: TypeId::UNKNOWN,
            bool_shape: nil,
            bool_instance: TypeId::UNKNOWN,
            list_shape: nil,
            dict_shape: nil,
            tuple_shape: nil,
            base_exception_shape: nil,
            base_exception_instance: TypeId::UNKNOWN,
            exception_shape: nil,
            exception_instance: TypeId::UNKNOWN,
            by_name: FxHashMap::default(),
        }
    }

    pub fn lookup(&self, name: Atom) -> Option<TypeId> {
        self.by_name.get(&name).copied()
    }
}

/// Type interning table.
pub struct TypeInterner {
    strings: Arc<Interner>,
    keys: RwLock<KeyTables>,
    type_lists: RwLock<SliceInterner<TypeId>>,
    class_shapes: RwLock<ValueInterner<ClassShape>>,
    function_shapes: RwLock<ValueInterner<FunctionShape>>,
    recursive_serial: AtomicU32,
    recursive_bindings: RwLock<FxHashMap<TypeId, TypeId>>,
    pub builtins: Builtins,
}

impl TypeInterner {
    pub fn new() -> Self {
        Self::with_strings(Arc::new(Interner::new()))
    }

    /// Build an interner that shares a string interner with the syntax
    /// arena, so atoms from either side compare directly.
    pub fn with_strings(strings: Arc<Interner>) -> Self {
        let mut this = TypeInterner {
            strings,
            keys: RwLock::new(KeyTables::default()),
            type_lists: RwLock::new(SliceInterner::new()),
            class_shapes: RwLock::new(ValueInterner::new()),
            function_shapes: RwLock::new(ValueInterner::new()),
            recursive_serial: AtomicU32::new(0),
            recursive_bindings: RwLock::new(FxHashMap::default()),
            builtins: Builtins::placeholder(),
        };
        this.seed();
        this
    }

    fn seed(&mut self) {
        let intrinsics = [
            TypeKey::Unknown,
            TypeKey::Any,
            TypeKey::Unbound,
            TypeKey::Never,
            TypeKey::None,
        ];
        for (index, key) in intrinsics.into_iter().enumerate() {
            let id = self.intern(key);
            debug_assert_eq!(id.0, index as u32, "intrinsic type id drifted");
        }
        self.builtins = self.seed_builtins();
    }

    fn builtin_shape(&self, name: &str, bases: Vec<TypeId>, params: &[&str]) -> ClassShapeId {
        let type_params = if params.is_empty() {
            TypeListId::EMPTY
        } else {
            let vars: Vec<TypeId> = params
                .iter()
                .map(|p| {
                    self.intern(TypeKey::TypeVar(TypeVarInfo {
                        name: self.intern_str(p),
                        bound: TypeId::UNKNOWN,
                        variance: Variance::Invariant,
                        binder: NodeId::NONE,
                    }))
                })
                .collect();
            self.intern_type_list(vars)
        };
        self.intern_class_shape(ClassShape {
            name: self.intern_str(name),
            node: NodeId::NONE,
            scope: ScopeId::NONE,
            type_params,
            bases: self.intern_type_list(bases),
        })
    }

    fn seed_builtins(&self) -> Builtins {
        let object_shape = self.builtin_shape("object", Vec::new(), &[]);
        let object_class = self.class_type(object_shape, Vec::new());
        let object_instance = self.instance(object_shape, Vec::new());

        let int_shape = self.builtin_shape("int", vec![object_instance], &[]);
        let int_instance = self.instance(int_shape, Vec::new());
        let float_shape = self.builtin_shape("float", vec![object_instance], &[]);
        let float_instance = self.instance(float_shape, Vec::new());
        let str_shape = self.builtin_shape("str", vec![object_instance], &[]);
        let str_instance = self.instance(str_shape, Vec::new());
        let bool_shape = self.builtin_shape("bool", vec![int_instance], &[]);
        let bool_instance = self.instance(bool_shape, Vec::new());

        let list_shape = self.builtin_shape("list", vec![object_instance], &["_T"]);
        let dict_shape = self.builtin_shape("dict", vec![object_instance], &["_K", "_V"]);
        let tuple_shape = self.builtin_shape("tuple", vec![object_instance], &["_Ts"]);

        let base_exception_shape = self.builtin_shape("BaseException", vec![object_instance], &[]);
        let base_exception_instance = self.instance(base_exception_shape, Vec::new());
        let exception_shape =
            self.builtin_shape("Exception", vec![base_exception_instance], &[]);
        let exception_instance = self.instance(exception_shape, Vec::new());

        let mut by_name = FxHashMap::default();
        for (name, shape) in [
            ("object", object_shape),
            ("int", int_shape),
            ("float", float_shape),
            ("str", str_shape),
            ("bool", bool_shape),
            ("list", list_shape),
            ("dict", dict_shape),
            ("tuple", tuple_shape),
            ("BaseException", base_exception_shape),
            ("Exception", exception_shape),
        ] {
            by_name.insert(self.intern_str(name), self.class_type(shape, Vec::new()));
        }

        Builtins {
            object_shape,
            object_class,
            object_instance,
            int_shape,
            int_instance,
            float_shape,
            float_instance,
            str_shape,
            str_instance,
            bool_shape,
            bool_instance,
            list_shape,
            dict_shape,
            tuple_shape,
            base_exception_shape,
            base_exception_instance,
            exception_shape,
            exception_instance,
            by_name,
        }
    }

    // ===== Strings =====

    pub fn strings(&self) -> &Arc<Interner> {
        &self.strings
    }

    pub fn intern_str(&self, text: &str) -> Atom {
        self.strings.intern(text)
    }

    pub fn resolve_atom(&self, atom: Atom) -> Arc<str> {
        self.strings.resolve(atom)
    }

    // ===== Keys =====

    pub fn intern(&self, key: TypeKey) -> TypeId {
        {
            let tables = self.keys.read().unwrap();
            if let Some(&id) = tables.map.get(&key) {
                return id;
            }
        }
        let mut tables = self.keys.write().unwrap();
        if let Some(&id) = tables.map.get(&key) {
            return id;
        }
        let id = TypeId(tables.list.len() as u32);
        tables.list.push(key.clone());
        tables.map.insert(key, id);
        id
    }

    pub fn lookup(&self, id: TypeId) -> Option<TypeKey> {
        let tables = self.keys.read().unwrap();
        tables.list.get(id.0 as usize).cloned()
    }

    // ===== Lists and shapes =====

    pub fn intern_type_list(&self, items: Vec<TypeId>) -> TypeListId {
        TypeListId(self.type_lists.write().unwrap().intern(items))
    }

    pub fn type_list(&self, id: TypeListId) -> Arc<[TypeId]> {
        self.type_lists.read().unwrap().get(id.0)
    }

    pub fn intern_class_shape(&self, shape: ClassShape) -> ClassShapeId {
        ClassShapeId(self.class_shapes.write().unwrap().intern(shape))
    }

    pub fn class_shape(&self, id: ClassShapeId) -> Arc<ClassShape> {
        self.class_shapes.read().unwrap().get(id.0)
    }

    pub fn intern_function_shape(&self, shape: FunctionShape) -> FunctionShapeId {
        FunctionShapeId(self.function_shapes.write().unwrap().intern(shape))
    }

    pub fn function_shape(&self, id: FunctionShapeId) -> Arc<FunctionShape> {
        self.function_shapes.read().unwrap().get(id.0)
    }

    // ===== Constructors =====

    pub fn class_type(&self, shape: ClassShapeId, args: Vec<TypeId>) -> TypeId {
        let args = self.intern_type_list(args);
        self.intern(TypeKey::Class(shape, args))
    }

    pub fn instance(&self, shape: ClassShapeId, args: Vec<TypeId>) -> TypeId {
        let args = self.intern_type_list(args);
        self.intern(TypeKey::Instance(shape, args))
    }

    pub fn function(&self, shape: FunctionShape) -> TypeId {
        let id = self.intern_function_shape(shape);
        self.intern(TypeKey::Function(id))
    }

    pub fn overloaded(&self, members: Vec<TypeId>) -> TypeId {
        let list = self.intern_type_list(members);
        self.intern(TypeKey::Overloaded(list))
    }

    pub fn literal_int(&self, value: i64) -> TypeId {
        self.intern(TypeKey::Literal(LiteralValue::Int(value)))
    }

    pub fn literal_str(&self, value: &str) -> TypeId {
        let atom = self.intern_str(value);
        self.intern(TypeKey::Literal(LiteralValue::Str(atom)))
    }

    pub fn literal_bool(&self, value: bool) -> TypeId {
        self.intern(TypeKey::Literal(LiteralValue::Bool(value)))
    }

    pub fn list_of(&self, element: TypeId) -> TypeId {
        self.instance(self.builtins.list_shape, vec![element])
    }

    pub fn dict_of(&self, key: TypeId, value: TypeId) -> TypeId {
        self.instance(self.builtins.dict_shape, vec![key, value])
    }

    pub fn tuple_of(&self, element: TypeId) -> TypeId {
        self.instance(self.builtins.tuple_shape, vec![element])
    }

    /// The class a literal is an instance of.
    pub fn literal_class_instance(&self, literal: &LiteralValue) -> TypeId {
        match literal {
            LiteralValue::Int(_) => self.builtins.int_instance,
            LiteralValue::Str(_) => self.builtins.str_instance,
            LiteralValue::Bool(_) => self.builtins.bool_instance,
        }
    }

    /// Widen a literal to its class; other types pass through.
    pub fn widen_literal(&self, ty: TypeId) -> TypeId {
        match self.lookup(ty) {
            Some(TypeKey::Literal(value)) => self.literal_class_instance(&value),
            _ => ty,
        }
    }

    // ===== Unions =====

    /// Canonical union construction: flatten nested unions, drop `Never`,
    /// deduplicate, and sort members by id. The result is independent of
    /// argument order; an empty union is `Never` and a singleton collapses
    /// to its member.
    pub fn union(&self, members: Vec<TypeId>) -> TypeId {
        let mut flat: Vec<TypeId> = Vec::new();
        let mut stack = members;
        while let Some(member) = stack.pop() {
            if member == TypeId::NEVER {
                continue;
            }
            match self.lookup(member) {
                Some(TypeKey::Union(list)) => {
                    stack.extend(self.type_list(list).iter().copied());
                }
                _ => flat.push(member),
            }
        }
        flat.sort_unstable();
        flat.dedup();
        match flat.len() {
            0 => TypeId::NEVER,
            1 => flat[0],
            _ => {
                let list = self.intern_type_list(flat);
                self.intern(TypeKey::Union(list))
            }
        }
    }

    pub fn union2(&self, left: TypeId, right: TypeId) -> TypeId {
        self.union(vec![left, right])
    }

    /// Members of a union, or the type itself as a single member.
    pub fn union_members(&self, ty: TypeId) -> Vec<TypeId> {
        match self.lookup(ty) {
            Some(TypeKey::Union(list)) => self.type_list(list).to_vec(),
            _ => vec![ty],
        }
    }

    // ===== Recursive markers =====

    /// Fresh placeholder for an evaluation in progress.
    pub fn fresh_recursive(&self) -> TypeId {
        let serial = self.recursive_serial.fetch_add(1, Ordering::Relaxed);
        self.intern(TypeKey::Recursive(serial))
    }

    /// Patch a marker to its resolution once the outer evaluation finishes.
    pub fn bind_recursive(&self, marker: TypeId, resolved: TypeId) {
        if marker == resolved {
            return;
        }
        self.recursive_bindings
            .write()
            .unwrap()
            .insert(marker, resolved);
    }

    /// Chase marker bindings; unresolved markers and non-markers come back
    /// unchanged. Bounded by a visited set because a marker may resolve to a
    /// structure that embeds the marker itself.
    pub fn resolve_recursive(&self, ty: TypeId) -> TypeId {
        let bindings = self.recursive_bindings.read().unwrap();
        let mut current = ty;
        let mut visited = FxHashSet::default();
        while let Some(&next) = bindings.get(&current) {
            if !visited.insert(current) {
                break;
            }
            current = next;
        }
        current
    }

    /// Structural equality treating a bound marker as its resolution.
    pub fn equivalent(&self, a: TypeId, b: TypeId) -> bool {
        let a = self.resolve_recursive(a);
        let b = self.resolve_recursive(b);
        if a == b {
            return true;
        }
        match (self.lookup(a), self.lookup(b)) {
            (Some(TypeKey::Union(la)), Some(TypeKey::Union(lb))) => {
                let left = self.type_list(la);
                let right = self.type_list(lb);
                left.len() == right.len()
                    && left.iter().all(|&m| {
                        right.iter().any(|&n| {
                            self.resolve_recursive(m) == self.resolve_recursive(n)
                        })
                    })
            }
            _ => false,
        }
    }
}

impl Default for TypeInterner {
    fn default() -> Self {
        TypeInterner::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_dedups_structurally() {
        let db = TypeInterner::new();
        let a = db.literal_int(3);
        let b = db.literal_int(3);
        assert_eq!(a, b);
        assert_ne!(a, db.literal_int(4));
    }

    #[test]
    fn test_union_is_order_independent() {
        let db = TypeInterner::new();
        let int = db.builtins.int_instance;
        let s = db.builtins.str_instance;
        let none = TypeId::NONE;
        let left = db.union(vec![db.union2(int, s), none]);
        let right = db.union(vec![none, db.union2(s, int)]);
        assert_eq!(left, right);
    }

    #[test]
    fn test_union_never_nests_and_dedups() {
        let db = TypeInterner::new();
        let int = db.builtins.int_instance;
        let s = db.builtins.str_instance;
        let inner = db.union2(int, s);
        let outer = db.union(vec![inner, int, s]);
        assert_eq!(outer, inner);
        match db.lookup(outer) {
            Some(TypeKey::Union(list)) => {
                let members = db.type_list(list);
                assert_eq!(members.len(), 2);
                for &member in members.iter() {
                    assert!(!matches!(db.lookup(member), Some(TypeKey::Union(_))));
                }
            }
            other => panic!("expected union, got {:?}", other),
        }
    }

    #[test]
    fn test_union_drops_never_and_collapses_singleton() {
        let db = TypeInterner::new();
        let int = db.builtins.int_instance;
        assert_eq!(db.union(vec![int, TypeId::NEVER]), int);
        assert_eq!(db.union(vec![]), TypeId::NEVER);
    }

    #[test]
    fn test_recursive_marker_binding() {
        let db = TypeInterner::new();
        let marker = db.fresh_recursive();
        let resolved = db.union2(db.builtins.int_instance, db.list_of(marker));
        db.bind_recursive(marker, resolved);
        assert_eq!(db.resolve_recursive(marker), resolved);
        assert!(db.equivalent(marker, resolved));
    }

    #[test]
    fn test_bool_subclasses_int() {
        let db = TypeInterner::new();
        let shape = db.class_shape(db.builtins.bool_shape);
        let bases = db.type_list(shape.bases);
        assert_eq!(bases.as_ref(), &[db.builtins.int_instance]);
    }
}
