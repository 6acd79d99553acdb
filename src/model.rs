//! Read-only symbol model of a set of parsed sources.
//!
//! Types and trait members live in arenas and are referred to by [`TypeId`]
//! and [`MemberId`]. Two members with the same name and signature on
//! unrelated traits are distinct symbols; identity is always the handle.

use indexmap::{IndexMap, IndexSet};
use proc_macro2::LineColumn;

use crate::display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Struct,
    Enum,
    Trait,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Crate,
    Restricted(String),
    Private,
}

impl Visibility {
    /// Keyword form, empty for private items.
    pub fn keyword(&self) -> String {
        match self {
            Visibility::Public => "pub".to_string(),
            Visibility::Crate => "pub(crate)".to_string(),
            Visibility::Restricted(path) if path == "self" || path == "super" => {
                format!("pub({path})")
            }
            Visibility::Restricted(path) => format!("pub(in {path})"),
            Visibility::Private => String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TypeSymbol {
    pub name: String,
    pub module: String,
    pub kind: TypeKind,
    pub visibility: Visibility,
    pub generics: Vec<GenericParam>,
    pub where_clause: Option<String>,
    /// Fields in declaration order. Tuple fields are named by position.
    pub fields: Vec<FieldSymbol>,
    /// Trait items in declaration order.
    pub members: Vec<MemberId>,
    pub supertraits: Vec<TraitRef>,
    /// Trait impls written for this type, keyed by trait.
    pub impls: IndexMap<TypeId, ImplSymbol>,
    /// Index of the source the type was declared in.
    pub source: usize,
}

impl TypeSymbol {
    pub fn path(&self) -> String {
        format!("{}::{}", self.module, self.name)
    }
}

#[derive(Debug, Clone)]
pub struct FieldSymbol {
    pub name: String,
    /// Display form of the declared type.
    pub ty: String,
    /// Trait named by a `dyn Trait` field type, if it resolved in the model.
    pub trait_object: Option<TraitRef>,
}

/// A trait together with the generic arguments it is named with, e.g.
/// `Store<String>` in `Box<dyn Store<String>>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraitRef {
    pub id: TypeId,
    /// Lifetime, type and const arguments as written. Associated item
    /// bindings are not kept.
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ImplSymbol {
    /// `impl<..> Trait<..> for Type<..> where ..` as written.
    pub header: String,
    /// Names of the items written in the impl block.
    pub items: IndexSet<String>,
    /// Where the first impl block for this trait was written.
    pub site: Option<ImplSite>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImplSite {
    pub source: usize,
    /// The `impl` keyword.
    pub start: LineColumn,
    /// The closing brace of the block.
    pub close: LineColumn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Method,
    Const,
    Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenericKind {
    Lifetime,
    Type,
    Const,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericParam {
    pub name: String,
    pub kind: GenericKind,
    /// The parameter as declared, bounds included and default left out.
    pub display: String,
    /// Default of a type or const parameter.
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnType {
    Unit,
    Value {
        display: String,
        /// Type in the model the return type names, ignoring references.
        target: Option<TypeId>,
    },
}

#[derive(Debug, Clone)]
pub struct MemberSymbol {
    pub owner: TypeId,
    pub name: String,
    pub kind: MemberKind,
    pub is_async: bool,
    pub is_unsafe: bool,
    pub generics: Vec<GenericParam>,
    pub where_clause: Option<String>,
    /// Display form of the `self` receiver, if any.
    pub receiver: Option<String>,
    pub params: Vec<Param>,
    pub output: ReturnType,
    pub has_default: bool,
}

impl MemberSymbol {
    pub fn is_generic(&self) -> bool {
        self.generics
            .iter()
            .any(|param| param.kind != GenericKind::Lifetime)
    }
}

/// Where an implementation of a trait member comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Implementation {
    /// Written in the type's impl block for the owning trait.
    Declared,
    /// Provided by the trait's default body.
    Default,
}

#[derive(Debug, Default)]
pub struct TypeModel {
    types: Vec<TypeSymbol>,
    members: Vec<MemberSymbol>,
    by_path: IndexMap<String, TypeId>,
}

impl TypeModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn declare_type(
        &mut self,
        module: &str,
        name: &str,
        kind: TypeKind,
        visibility: Visibility,
    ) -> TypeId {
        let id = TypeId(self.types.len());
        self.types.push(TypeSymbol {
            name: name.to_string(),
            module: module.to_string(),
            kind,
            visibility,
            generics: Vec::new(),
            where_clause: None,
            fields: Vec::new(),
            members: Vec::new(),
            supertraits: Vec::new(),
            impls: IndexMap::new(),
            source: 0,
        });
        self.by_path.entry(format!("{module}::{name}")).or_insert(id);
        id
    }

    pub(crate) fn add_member(&mut self, member: MemberSymbol) -> MemberId {
        let id = MemberId(self.members.len());
        let owner = member.owner;
        self.members.push(member);
        self.types[owner.0].members.push(id);
        id
    }

    pub(crate) fn type_mut(&mut self, id: TypeId) -> &mut TypeSymbol {
        &mut self.types[id.0]
    }

    pub fn ty(&self, id: TypeId) -> &TypeSymbol {
        &self.types[id.0]
    }

    pub fn member(&self, id: MemberId) -> &MemberSymbol {
        &self.members[id.0]
    }

    pub fn lookup(&self, path: &str) -> Option<TypeId> {
        self.by_path.get(path).copied()
    }

    pub fn types(&self) -> impl Iterator<Item = TypeId> + '_ {
        (0..self.types.len()).map(TypeId)
    }

    /// Every trait the type implements: traits with an impl block for it and,
    /// transitively, their supertraits. Ordered by first discovery.
    pub fn all_traits(&self, id: TypeId) -> IndexSet<TypeId> {
        let mut all = IndexSet::new();
        for &tr in self.ty(id).impls.keys() {
            self.collect_supertraits(tr, &mut all);
        }
        all
    }

    /// `tr` followed by its supertraits, depth first in declaration order.
    pub fn trait_with_supertraits(&self, tr: TypeId) -> IndexSet<TypeId> {
        let mut all = IndexSet::new();
        self.collect_supertraits(tr, &mut all);
        all
    }

    fn collect_supertraits(&self, tr: TypeId, acc: &mut IndexSet<TypeId>) {
        if !acc.insert(tr) {
            return;
        }
        for parent in &self.ty(tr).supertraits {
            self.collect_supertraits(parent.id, acc);
        }
    }

    /// Maps the generic parameters of the trait `tr` names to the arguments
    /// it supplies. Lifetimes are keyed with their leading `'`. A parameter
    /// without an argument falls back to its declared default.
    pub fn bindings(&self, tr: &TraitRef) -> IndexMap<String, String> {
        let (lifetimes, others): (Vec<&String>, Vec<&String>) =
            tr.args.iter().partition(|arg| arg.starts_with('\''));
        let mut lifetimes = lifetimes.into_iter();
        let mut others = others.into_iter();

        let mut bindings = IndexMap::new();
        for param in &self.ty(tr.id).generics {
            let arg = match param.kind {
                GenericKind::Lifetime => lifetimes.next().cloned(),
                GenericKind::Type | GenericKind::Const => others.next().cloned().or_else(|| {
                    param
                        .default
                        .as_ref()
                        .map(|default| display::substitute(default, &bindings))
                }),
            };
            if let Some(arg) = arg.filter(|arg| *arg != param.name) {
                bindings.insert(param.name.clone(), arg);
            }
        }
        bindings
    }

    /// `root` followed by its supertraits as `root` sees them: the arguments
    /// of each supertrait bound are expressed in terms of `root`'s own
    /// arguments. Same order as [`TypeModel::trait_with_supertraits`].
    pub fn instantiate(&self, root: &TraitRef) -> IndexMap<TypeId, TraitRef> {
        let mut all = IndexMap::new();
        self.collect_instances(root.clone(), &mut all);
        all
    }

    fn collect_instances(&self, tr: TraitRef, acc: &mut IndexMap<TypeId, TraitRef>) {
        if acc.contains_key(&tr.id) {
            return;
        }
        let bindings = self.bindings(&tr);
        let id = tr.id;
        acc.insert(id, tr);
        for parent in &self.ty(id).supertraits {
            let args = parent
                .args
                .iter()
                .map(|arg| display::substitute(arg, &bindings))
                .collect();
            self.collect_instances(TraitRef { id: parent.id, args }, acc);
        }
    }

    /// Finds what implements trait member `member` for type `ty`.
    pub fn implementation_of(&self, ty: TypeId, member: MemberId) -> Option<Implementation> {
        let member = self.member(member);
        let declared = self
            .ty(ty)
            .impls
            .get(&member.owner)
            .is_some_and(|imp| imp.items.contains(&member.name));
        if declared {
            Some(Implementation::Declared)
        } else if member.has_default {
            Some(Implementation::Default)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(owner: TypeId, name: &str, has_default: bool) -> MemberSymbol {
        MemberSymbol {
            owner,
            name: name.to_string(),
            kind: MemberKind::Method,
            is_async: false,
            is_unsafe: false,
            generics: Vec::new(),
            where_clause: None,
            receiver: Some("&self".to_string()),
            params: Vec::new(),
            output: ReturnType::Unit,
            has_default,
        }
    }

    fn bare(id: TypeId) -> TraitRef {
        TraitRef {
            id,
            args: Vec::new(),
        }
    }

    fn param(name: &str, kind: GenericKind, default: Option<&str>) -> GenericParam {
        GenericParam {
            name: name.to_string(),
            kind,
            display: name.to_string(),
            default: default.map(str::to_string),
        }
    }

    #[test]
    fn implementation_is_looked_up_per_owning_trait() {
        let mut model = TypeModel::new();
        let a = model.declare_type("crate", "A", TypeKind::Trait, Visibility::Public);
        let b = model.declare_type("crate", "B", TypeKind::Trait, Visibility::Public);
        let s = model.declare_type("crate", "S", TypeKind::Struct, Visibility::Public);
        let run_a = model.add_member(method(a, "run", false));
        let run_b = model.add_member(method(b, "run", false));
        let stop_b = model.add_member(method(b, "stop", true));

        let mut imp = ImplSymbol::default();
        imp.items.insert("run".to_string());
        model.type_mut(s).impls.insert(a, imp);

        assert_eq!(model.implementation_of(s, run_a), Some(Implementation::Declared));
        assert_eq!(model.implementation_of(s, run_b), None);
        assert_eq!(model.implementation_of(s, stop_b), Some(Implementation::Default));
    }

    #[test]
    fn all_traits_follows_supertraits_once() {
        let mut model = TypeModel::new();
        let base = model.declare_type("crate", "Base", TypeKind::Trait, Visibility::Public);
        let left = model.declare_type("crate", "Left", TypeKind::Trait, Visibility::Public);
        let right = model.declare_type("crate", "Right", TypeKind::Trait, Visibility::Public);
        let s = model.declare_type("crate", "S", TypeKind::Struct, Visibility::Private);
        model.type_mut(left).supertraits.push(bare(base));
        model.type_mut(right).supertraits.push(bare(base));
        model.type_mut(s).impls.insert(left, ImplSymbol::default());
        model.type_mut(s).impls.insert(right, ImplSymbol::default());

        let all: Vec<_> = model.all_traits(s).into_iter().collect();
        assert_eq!(all, vec![left, base, right]);
    }

    #[test]
    fn supertrait_arguments_follow_the_root_arguments() {
        let mut model = TypeModel::new();
        let named = model.declare_type("crate", "Named", TypeKind::Trait, Visibility::Public);
        let shape = model.declare_type("crate", "Shape", TypeKind::Trait, Visibility::Public);
        model.type_mut(named).generics = vec![param("T", GenericKind::Type, None)];
        model.type_mut(shape).generics = vec![
            param("'a", GenericKind::Lifetime, None),
            param("U", GenericKind::Type, None),
            param("R", GenericKind::Type, Some("Vec<U>")),
        ];
        model.type_mut(shape).supertraits.push(TraitRef {
            id: named,
            args: vec!["&'a [R]".to_string()],
        });

        let root = TraitRef {
            id: shape,
            args: vec!["'static".to_string(), "u8".to_string()],
        };
        let bindings = model.bindings(&root);
        assert_eq!(bindings["'a"], "'static");
        assert_eq!(bindings["U"], "u8");
        assert_eq!(bindings["R"], "Vec<u8>");

        let instances = model.instantiate(&root);
        assert_eq!(instances.keys().copied().collect::<Vec<_>>(), vec![shape, named]);
        assert_eq!(instances[&named].args, vec!["&'static [Vec<u8>]".to_string()]);
    }

    #[test]
    fn visibility_keywords() {
        assert_eq!(Visibility::Public.keyword(), "pub");
        assert_eq!(Visibility::Crate.keyword(), "pub(crate)");
        assert_eq!(Visibility::Restricted("super".into()).keyword(), "pub(super)");
        assert_eq!(Visibility::Restricted("crate::a".into()).keyword(), "pub(in crate::a)");
        assert_eq!(Visibility::Private.keyword(), "");
    }
}
