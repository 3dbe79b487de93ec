//! Symbol table and user-defined type registry
//!
//! Scopes form a tree held in an arena (`Vec<Scope>`) addressed by
//! [`ScopeId`] indices, so parent links are plain indices rather than owned
//! back-pointers. The table keeps a cursor into the tree, a namespace stack
//! for qualified-name composition, and an overload registry keyed by
//! fully-qualified function name.
//!
//! Within a scope every name maps to at most one [`Symbol`]; functions are
//! the exception, where one name-keyed Symbol fronts a list of
//! [`FunctionSignature`]s in the registry.

use crate::ast::TypeNode;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

pub type ScopeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Variable,
    Function,
    Class,
    Enum,
    Typedef,
    Namespace,
    Template,
    Parameter,
}

/// Symbol-specific flags beyond name/kind/type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolAttributes {
    pub is_static: bool,
    pub is_extern: bool,
    pub is_const: bool,
    pub is_constexpr: bool,
    pub is_inline: bool,
    pub is_virtual: bool,
    pub is_override: bool,
    pub is_struct: bool,
    /// Most recent signature for Function symbols
    pub signature: Option<FunctionSignature>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub symbol_type: TypeNode,
    /// Nesting level of the defining scope; 0 is global
    pub scope_level: usize,
    pub attributes: SymbolAttributes,
}

/// A function signature for the overload registry.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    pub return_type: TypeNode,
    pub parameter_types: Vec<TypeNode>,
    pub is_const: bool,
    pub is_static: bool,
    pub is_virtual: bool,
}

impl FunctionSignature {
    /// Candidate filter used by lookup: overload resolution is name-first,
    /// with only the argument count consulted.
    pub fn matches_arity(&self, arg_count: usize) -> bool {
        self.parameter_types.len() == arg_count
    }
}

#[derive(Debug)]
struct Scope {
    name: String,
    parent: Option<ScopeId>,
    symbols: HashMap<String, Symbol>,
    children: Vec<ScopeId>,
}

/// Symbol table with arena-backed scope management.
#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    current: ScopeId,
    scope_level: usize,
    namespace_stack: Vec<String>,
    current_class: Option<String>,
    overloads: HashMap<String, Vec<FunctionSignature>>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            scopes: vec![Scope {
                name: "global".to_string(),
                parent: None,
                symbols: HashMap::new(),
                children: Vec::new(),
            }],
            current: 0,
            scope_level: 0,
            namespace_stack: Vec::new(),
            current_class: None,
            overloads: HashMap::new(),
        }
    }

    pub fn enter_scope(&mut self, name: &str) {
        let id = self.scopes.len();
        self.scopes.push(Scope {
            name: name.to_string(),
            parent: Some(self.current),
            symbols: HashMap::new(),
            children: Vec::new(),
        });
        self.scopes[self.current].children.push(id);
        self.current = id;
        self.scope_level += 1;
    }

    pub fn exit_scope(&mut self) -> Result<(), String> {
        match self.scopes[self.current].parent {
            Some(parent) => {
                self.current = parent;
                self.scope_level -= 1;
                Ok(())
            }
            None => Err("Cannot exit global scope".to_string()),
        }
    }

    /// Define a new symbol in the current scope.
    pub fn define(
        &mut self,
        name: &str,
        kind: SymbolKind,
        symbol_type: TypeNode,
        attributes: SymbolAttributes,
    ) -> Result<(), String> {
        let scope = &mut self.scopes[self.current];
        if scope.symbols.contains_key(name) {
            return Err(format!(
                "Redefinition of '{}' in scope '{}'",
                name, scope.name
            ));
        }

        scope.symbols.insert(
            name.to_string(),
            Symbol {
                name: name.to_string(),
                kind,
                symbol_type,
                scope_level: self.scope_level,
                attributes,
            },
        );
        Ok(())
    }

    /// Define a function, recording its signature in the overload registry.
    ///
    /// Overloads share a single name-keyed Symbol: if the name already
    /// refers to a function in this scope, only the signature list grows.
    pub fn define_function(
        &mut self,
        name: &str,
        signature: FunctionSignature,
        mut attributes: SymbolAttributes,
    ) -> Result<(), String> {
        let qualified = self.qualified_name(name);
        self.overloads
            .entry(qualified)
            .or_default()
            .push(signature.clone());

        if let Some(existing) = self.scopes[self.current].symbols.get(name) {
            if existing.kind == SymbolKind::Function {
                return Ok(());
            }
            return Err(format!(
                "Redefinition of '{}' in scope '{}'",
                name, self.scopes[self.current].name
            ));
        }

        let return_type = signature.return_type.clone();
        attributes.signature = Some(signature);
        self.define(name, SymbolKind::Function, return_type, attributes)
    }

    /// Look up a symbol, searching the current scope and all parents.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        let mut scope_id = Some(self.current);
        while let Some(id) = scope_id {
            let scope = &self.scopes[id];
            if let Some(symbol) = scope.symbols.get(name) {
                return Some(symbol);
            }
            scope_id = scope.parent;
        }
        None
    }

    /// Look up a symbol in the current scope only.
    pub fn lookup_local(&self, name: &str) -> Option<&Symbol> {
        self.scopes[self.current].symbols.get(name)
    }

    /// Look up a function by name and argument count. Candidates are
    /// filtered by arity; resolution always lands on the single name-keyed
    /// Symbol.
    pub fn lookup_function(&self, name: &str, arg_count: usize) -> Option<&Symbol> {
        let qualified = self.qualified_name(name);
        if let Some(signatures) = self.overloads.get(&qualified)
            && signatures.iter().any(|s| s.matches_arity(arg_count))
        {
            return self.lookup(name);
        }
        self.lookup(name)
    }

    /// Signatures registered for a fully-qualified function name.
    pub fn signatures(&self, qualified_name: &str) -> &[FunctionSignature] {
        self.overloads
            .get(qualified_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn enter_namespace(&mut self, name: &str) {
        self.namespace_stack.push(name.to_string());
        self.enter_scope(&format!("namespace::{}", name));
    }

    pub fn exit_namespace(&mut self) -> Result<(), String> {
        self.namespace_stack.pop();
        self.exit_scope()
    }

    pub fn enter_class(&mut self, name: &str) {
        self.current_class = Some(name.to_string());
        self.enter_scope(&format!("class::{}", name));
    }

    pub fn exit_class(&mut self) -> Result<(), String> {
        self.current_class = None;
        self.exit_scope()
    }

    pub fn enter_function(&mut self, name: &str) {
        self.enter_scope(&format!("function::{}", name));
    }

    pub fn exit_function(&mut self) -> Result<(), String> {
        self.exit_scope()
    }

    /// Fully-qualified name under the current namespace stack.
    pub fn qualified_name(&self, name: &str) -> String {
        if self.namespace_stack.is_empty() {
            return name.to_string();
        }
        let mut parts = self.namespace_stack.clone();
        parts.push(name.to_string());
        parts.join("::")
    }

    pub fn is_global_scope(&self) -> bool {
        self.current == 0
    }

    pub fn scope_level(&self) -> usize {
        self.scope_level
    }

    pub fn current_class(&self) -> Option<&str> {
        self.current_class.as_deref()
    }

    /// The path of named scopes from the root to the cursor.
    pub fn scope_path(&self) -> String {
        let mut parts = Vec::new();
        let mut scope_id = Some(self.current);
        while let Some(id) = scope_id {
            let scope = &self.scopes[id];
            if scope.parent.is_some() {
                parts.push(scope.name.clone());
            }
            scope_id = scope.parent;
        }
        if parts.is_empty() {
            return "global".to_string();
        }
        parts.reverse();
        parts.join("::")
    }

    /// Render the whole scope tree, for debug output.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_scope(0, 0, &mut out);
        out
    }

    fn dump_scope(&self, id: ScopeId, indent: usize, out: &mut String) {
        let scope = &self.scopes[id];
        let prefix = "  ".repeat(indent);
        let _ = writeln!(out, "{}Scope: {}", prefix, scope.name);

        let mut names: Vec<_> = scope.symbols.keys().collect();
        names.sort();
        for name in names {
            let symbol = &scope.symbols[name];
            let _ = writeln!(
                out,
                "{}  {} ({:?}, level={})",
                prefix, symbol.name, symbol.kind, symbol.scope_level
            );
        }

        for &child in &scope.children {
            self.dump_scope(child, indent + 1, out);
        }
    }
}

/// What kind of definition a registered type name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeDefKind {
    Class,
    Struct,
    Enum,
}

/// Registry for user-defined types: classes, structs, and enums, with
/// their members and base-class lists.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<String, TypeDefKind>,
    class_members: HashMap<String, HashMap<String, Symbol>>,
    class_bases: HashMap<String, Vec<String>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    pub fn register_type(&mut self, name: &str, kind: TypeDefKind) -> Result<(), String> {
        if self.types.contains_key(name) {
            return Err(format!("Type '{}' already defined", name));
        }
        self.types.insert(name.to_string(), kind);
        Ok(())
    }

    pub fn register_class(
        &mut self,
        name: &str,
        kind: TypeDefKind,
        base_classes: Vec<String>,
    ) -> Result<(), String> {
        self.register_type(name, kind)?;
        self.class_members.insert(name.to_string(), HashMap::new());
        self.class_bases.insert(name.to_string(), base_classes);
        Ok(())
    }

    pub fn add_class_member(&mut self, class_name: &str, member: Symbol) -> Result<(), String> {
        let members = self
            .class_members
            .get_mut(class_name)
            .ok_or_else(|| format!("Class '{}' not registered", class_name))?;

        if members.contains_key(&member.name) {
            return Err(format!(
                "Member '{}' already exists in class '{}'",
                member.name, class_name
            ));
        }

        members.insert(member.name.clone(), member);
        Ok(())
    }

    pub fn get_class_member(&self, class_name: &str, member_name: &str) -> Option<&Symbol> {
        self.class_members.get(class_name)?.get(member_name)
    }

    pub fn lookup_type(&self, name: &str) -> Option<TypeDefKind> {
        self.types.get(name).copied()
    }

    pub fn is_class(&self, name: &str) -> bool {
        self.class_members.contains_key(name)
    }

    pub fn base_classes(&self, class_name: &str) -> &[String] {
        self.class_bases
            .get(class_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Reflexive-transitive closure over the base-class graph. A visited
    /// set keeps the walk terminating even if the graph has a cycle.
    pub fn is_derived_from(&self, derived: &str, base: &str) -> bool {
        let mut visited = HashSet::new();
        self.is_derived_from_inner(derived, base, &mut visited)
    }

    fn is_derived_from_inner<'a>(
        &'a self,
        derived: &'a str,
        base: &str,
        visited: &mut HashSet<&'a str>,
    ) -> bool {
        if derived == base {
            return true;
        }
        if !visited.insert(derived) {
            return false;
        }
        self.base_classes(derived)
            .iter()
            .any(|b| self.is_derived_from_inner(b, base, visited))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var_symbol(name: &str, level: usize) -> Symbol {
        Symbol {
            name: name.to_string(),
            kind: SymbolKind::Variable,
            symbol_type: TypeNode::primitive("int"),
            scope_level: level,
            attributes: SymbolAttributes::default(),
        }
    }

    fn int_signature(param_count: usize) -> FunctionSignature {
        FunctionSignature {
            return_type: TypeNode::primitive("int"),
            parameter_types: vec![TypeNode::primitive("int"); param_count],
            is_const: false,
            is_static: false,
            is_virtual: false,
        }
    }

    #[test]
    fn test_define_and_lookup() {
        let mut table = SymbolTable::new();
        table
            .define(
                "x",
                SymbolKind::Variable,
                TypeNode::primitive("int"),
                SymbolAttributes::default(),
            )
            .unwrap();

        let symbol = table.lookup("x").unwrap();
        assert_eq!(symbol.kind, SymbolKind::Variable);
        assert_eq!(symbol.scope_level, 0);
    }

    #[test]
    fn test_redefinition_rejected() {
        let mut table = SymbolTable::new();
        table
            .define(
                "x",
                SymbolKind::Variable,
                TypeNode::primitive("int"),
                SymbolAttributes::default(),
            )
            .unwrap();
        let err = table
            .define(
                "x",
                SymbolKind::Variable,
                TypeNode::primitive("double"),
                SymbolAttributes::default(),
            )
            .unwrap_err();
        assert!(err.contains("Redefinition"));
    }

    #[test]
    fn test_shadowing_in_inner_scope() {
        let mut table = SymbolTable::new();
        table
            .define(
                "x",
                SymbolKind::Variable,
                TypeNode::primitive("int"),
                SymbolAttributes::default(),
            )
            .unwrap();

        table.enter_scope("block");
        table
            .define(
                "x",
                SymbolKind::Variable,
                TypeNode::primitive("double"),
                SymbolAttributes::default(),
            )
            .unwrap();

        // Inner definition shadows the outer one
        assert_eq!(
            table.lookup("x").unwrap().symbol_type,
            TypeNode::primitive("double")
        );
        assert_eq!(table.lookup("x").unwrap().scope_level, 1);

        table.exit_scope().unwrap();
        assert_eq!(
            table.lookup("x").unwrap().symbol_type,
            TypeNode::primitive("int")
        );
    }

    #[test]
    fn test_parent_lookup() {
        let mut table = SymbolTable::new();
        table
            .define(
                "global_var",
                SymbolKind::Variable,
                TypeNode::primitive("int"),
                SymbolAttributes::default(),
            )
            .unwrap();
        table.enter_scope("f");
        table.enter_scope("block");
        assert!(table.lookup("global_var").is_some());
        assert!(table.lookup_local("global_var").is_none());
    }

    #[test]
    fn test_exit_global_scope_fails() {
        let mut table = SymbolTable::new();
        assert!(table.exit_scope().is_err());
    }

    #[test]
    fn test_scope_balance() {
        let mut table = SymbolTable::new();
        table.enter_scope("a");
        table.enter_scope("b");
        table.exit_scope().unwrap();
        table.exit_scope().unwrap();
        assert!(table.is_global_scope());
        assert_eq!(table.scope_level(), 0);
    }

    #[test]
    fn test_overloads_share_one_symbol() {
        let mut table = SymbolTable::new();
        table
            .define_function("f", int_signature(1), SymbolAttributes::default())
            .unwrap();
        table
            .define_function("f", int_signature(2), SymbolAttributes::default())
            .unwrap();

        assert_eq!(table.signatures("f").len(), 2);
        assert!(table.lookup("f").is_some());
        assert!(table.lookup_function("f", 1).is_some());
        assert!(table.lookup_function("f", 2).is_some());
        // Wrong arity still falls back to the name-keyed symbol
        assert!(table.lookup_function("f", 5).is_some());
    }

    #[test]
    fn test_function_name_collides_with_variable() {
        let mut table = SymbolTable::new();
        table
            .define(
                "f",
                SymbolKind::Variable,
                TypeNode::primitive("int"),
                SymbolAttributes::default(),
            )
            .unwrap();
        assert!(
            table
                .define_function("f", int_signature(0), SymbolAttributes::default())
                .is_err()
        );
    }

    #[test]
    fn test_qualified_names_in_namespace() {
        let mut table = SymbolTable::new();
        table.enter_namespace("math");
        table.enter_namespace("detail");
        assert_eq!(table.qualified_name("fma"), "math::detail::fma");
        table
            .define_function("fma", int_signature(3), SymbolAttributes::default())
            .unwrap();
        assert_eq!(table.signatures("math::detail::fma").len(), 1);
        table.exit_namespace().unwrap();
        assert_eq!(table.qualified_name("fma"), "math::fma");
        table.exit_namespace().unwrap();
        assert_eq!(table.qualified_name("fma"), "fma");
    }

    #[test]
    fn test_scope_path() {
        let mut table = SymbolTable::new();
        assert_eq!(table.scope_path(), "global");
        table.enter_namespace("util");
        table.enter_function("helper");
        assert_eq!(table.scope_path(), "namespace::util::function::helper");
    }

    #[test]
    fn test_class_context() {
        let mut table = SymbolTable::new();
        table.enter_class("Point");
        assert_eq!(table.current_class(), Some("Point"));
        table.exit_class().unwrap();
        assert_eq!(table.current_class(), None);
    }

    #[test]
    fn test_registry_members() {
        let mut registry = TypeRegistry::new();
        registry
            .register_class("Point", TypeDefKind::Class, vec![])
            .unwrap();
        registry
            .add_class_member("Point", var_symbol("x", 1))
            .unwrap();

        assert!(registry.is_class("Point"));
        assert!(registry.get_class_member("Point", "x").is_some());
        assert!(registry.get_class_member("Point", "missing").is_none());

        let err = registry
            .add_class_member("Point", var_symbol("x", 1))
            .unwrap_err();
        assert!(err.contains("already exists"));
    }

    #[test]
    fn test_registry_duplicate_type() {
        let mut registry = TypeRegistry::new();
        registry.register_type("Color", TypeDefKind::Enum).unwrap();
        assert!(registry.register_type("Color", TypeDefKind::Enum).is_err());
    }

    #[test]
    fn test_is_derived_from() {
        let mut registry = TypeRegistry::new();
        registry
            .register_class("Base", TypeDefKind::Class, vec![])
            .unwrap();
        registry
            .register_class("Middle", TypeDefKind::Class, vec!["Base".to_string()])
            .unwrap();
        registry
            .register_class("Derived", TypeDefKind::Class, vec!["Middle".to_string()])
            .unwrap();

        assert!(registry.is_derived_from("Derived", "Base"));
        assert!(registry.is_derived_from("Derived", "Derived"));
        assert!(!registry.is_derived_from("Base", "Derived"));
    }

    #[test]
    fn test_is_derived_from_terminates_on_cycle() {
        let mut registry = TypeRegistry::new();
        registry
            .register_class("A", TypeDefKind::Class, vec!["B".to_string()])
            .unwrap();
        registry
            .register_class("B", TypeDefKind::Class, vec!["A".to_string()])
            .unwrap();

        assert!(registry.is_derived_from("A", "B"));
        assert!(!registry.is_derived_from("A", "C"));
    }

    #[test]
    fn test_dump_contains_symbols() {
        let mut table = SymbolTable::new();
        table
            .define(
                "x",
                SymbolKind::Variable,
                TypeNode::primitive("int"),
                SymbolAttributes::default(),
            )
            .unwrap();
        table.enter_scope("block");
        let dump = table.dump();
        assert!(dump.contains("Scope: global"));
        assert!(dump.contains("x (Variable, level=0)"));
        assert!(dump.contains("Scope: block"));
    }
}
