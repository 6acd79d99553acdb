//! Builds the [`TypeModel`] from parsed sources and finds the structs that
//! carry the marker attribute.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::display;
use crate::error::{Error, Result};
use crate::model::{
    FieldSymbol, GenericKind, GenericParam, ImplSite, ImplSymbol, MemberKind, MemberSymbol, Param,
    ReturnType, TraitRef, TypeId, TypeKind, TypeModel, Visibility,
};

/// One parsed source file mounted at a module path.
pub struct SourceFile {
    pub path: PathBuf,
    pub module: String,
    pub text: String,
    pub file: syn::File,
}

impl SourceFile {
    pub fn parse(path: impl AsRef<Path>, module: &str, text: String) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = syn::parse_file(&text).map_err(|e| Error::parse(&path, e))?;
        Ok(Self {
            path,
            module: module.to_string(),
            text,
            file,
        })
    }

    pub fn read(path: impl AsRef<Path>, module: &str) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::parse(path, module, text)
    }
}

/// A marked struct handed to the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub ty: TypeId,
}

pub struct Compilation {
    pub model: TypeModel,
    pub candidates: Vec<Candidate>,
}

#[derive(Default)]
struct Scope {
    imports: IndexMap<String, Vec<String>>,
    globs: Vec<Vec<String>>,
}

struct Lowering<'a> {
    model: TypeModel,
    scopes: IndexMap<String, Scope>,
    modules: HashSet<String>,
    items: Vec<(String, usize, &'a syn::Item)>,
}

/// Lowers `sources` into a type model and collects the structs annotated with
/// `marker` (a fully qualified attribute path such as `auto_decorator::decorator`).
pub fn build(sources: &[SourceFile], marker: &str) -> Compilation {
    let mut lowering = Lowering {
        model: TypeModel::new(),
        scopes: IndexMap::new(),
        modules: HashSet::new(),
        items: Vec::new(),
    };

    for (index, source) in sources.iter().enumerate() {
        lowering.declare_items(&source.module, index, &source.file.items);
    }
    let items = std::mem::take(&mut lowering.items);
    for (module, source, item) in &items {
        lowering.define(module, *source, item);
    }

    let marker = marker.trim_start_matches("::");
    let mut candidates = Vec::new();
    for (module, _, item) in &items {
        let syn::Item::Struct(item) = item else {
            continue;
        };
        if item.attrs.is_empty() || !lowering.has_marker(module, &item.attrs, marker) {
            continue;
        }
        let Some(ty) = lowering.model.lookup(&format!("{module}::{}", item.ident)) else {
            continue;
        };
        if lowering.model.all_traits(ty).is_empty() {
            trace!(ty = %item.ident, "marked struct implements no trait");
            continue;
        }
        candidates.push(Candidate { ty });
    }
    debug!(
        types = lowering.model.types().count(),
        candidates = candidates.len(),
        "built type model"
    );

    Compilation {
        model: lowering.model,
        candidates,
    }
}

impl<'a> Lowering<'a> {
    fn declare_items(&mut self, module: &str, source: usize, items: &'a [syn::Item]) {
        self.modules.insert(module.to_string());
        self.scopes.entry(module.to_string()).or_default();

        for item in items {
            let declared = match item {
                syn::Item::Struct(s) => Some((&s.ident, TypeKind::Struct, &s.vis)),
                syn::Item::Enum(e) => Some((&e.ident, TypeKind::Enum, &e.vis)),
                syn::Item::Trait(t) => Some((&t.ident, TypeKind::Trait, &t.vis)),
                _ => None,
            };
            if let Some((ident, kind, vis)) = declared {
                let id = self
                    .model
                    .declare_type(module, &ident.to_string(), kind, visibility(vis));
                self.model.type_mut(id).source = source;
            }

            match item {
                syn::Item::Use(item) => {
                    let scope = self.scopes.entry(module.to_string()).or_default();
                    collect_use(Vec::new(), &item.tree, scope);
                }
                syn::Item::Mod(item) => {
                    if let Some((_, content)) = &item.content {
                        let nested = format!("{module}::{}", item.ident);
                        self.declare_items(&nested, source, content);
                    }
                }
                _ => {}
            }
            self.items.push((module.to_string(), source, item));
        }
    }

    fn define(&mut self, module: &str, source: usize, item: &syn::Item) {
        match item {
            syn::Item::Trait(item) => self.define_trait(module, item),
            syn::Item::Struct(item) => self.define_struct(module, item),
            syn::Item::Impl(item) => self.define_impl(module, source, item),
            _ => {}
        }
    }

    fn define_trait(&mut self, module: &str, item: &syn::ItemTrait) {
        let Some(id) = self.model.lookup(&format!("{module}::{}", item.ident)) else {
            return;
        };

        let supertraits: Vec<_> = item
            .supertraits
            .iter()
            .filter_map(|bound| match bound {
                syn::TypeParamBound::Trait(bound) => self.trait_ref(module, &bound.path),
                _ => None,
            })
            .collect();
        let tr = self.model.type_mut(id);
        tr.supertraits = supertraits;
        tr.generics = generic_params(&item.generics);

        for trait_item in &item.items {
            let member = match trait_item {
                syn::TraitItem::Fn(f) => self.lower_fn(module, id, f),
                syn::TraitItem::Const(c) => {
                    associated(id, &c.ident, MemberKind::Const, c.default.is_some())
                }
                syn::TraitItem::Type(t) => {
                    associated(id, &t.ident, MemberKind::Type, t.default.is_some())
                }
                _ => continue,
            };
            self.model.add_member(member);
        }
    }

    fn lower_fn(&self, module: &str, owner: TypeId, item: &syn::TraitItemFn) -> MemberSymbol {
        let sig = &item.sig;
        let generics = generic_params(&sig.generics);

        let mut taken: HashSet<String> = sig
            .inputs
            .iter()
            .filter_map(|input| match input {
                syn::FnArg::Typed(arg) => match &*arg.pat {
                    syn::Pat::Ident(pat) => Some(pat.ident.to_string()),
                    _ => None,
                },
                syn::FnArg::Receiver(_) => None,
            })
            .collect();

        let mut receiver = None;
        let mut params = Vec::new();
        for (index, input) in sig.inputs.iter().enumerate() {
            match input {
                syn::FnArg::Receiver(r) => {
                    let mut r = r.clone();
                    r.attrs.clear();
                    receiver = Some(display::of(&r));
                }
                syn::FnArg::Typed(arg) => {
                    let name = match &*arg.pat {
                        syn::Pat::Ident(pat) if pat.subpat.is_none() => pat.ident.to_string(),
                        _ => {
                            let mut name = format!("arg{index}");
                            while taken.contains(&name) {
                                name.push('_');
                            }
                            taken.insert(name.clone());
                            name
                        }
                    };
                    params.push(Param {
                        name,
                        ty: display::of(&*arg.ty),
                    });
                }
            }
        }

        let output = match &sig.output {
            syn::ReturnType::Default => ReturnType::Unit,
            syn::ReturnType::Type(_, ty) if is_unit(ty) => ReturnType::Unit,
            syn::ReturnType::Type(_, ty) => ReturnType::Value {
                display: display::of(&**ty),
                target: self.named_type(module, ty),
            },
        };

        MemberSymbol {
            owner,
            name: sig.ident.to_string(),
            kind: MemberKind::Method,
            is_async: sig.asyncness.is_some(),
            is_unsafe: sig.unsafety.is_some(),
            generics,
            where_clause: sig.generics.where_clause.as_ref().map(display::of),
            receiver,
            params,
            output,
            has_default: item.default.is_some(),
        }
    }

    fn define_struct(&mut self, module: &str, item: &syn::ItemStruct) {
        let Some(id) = self.model.lookup(&format!("{module}::{}", item.ident)) else {
            return;
        };
        let fields = item
            .fields
            .iter()
            .enumerate()
            .map(|(index, field)| FieldSymbol {
                name: field
                    .ident
                    .as_ref()
                    .map_or_else(|| index.to_string(), ToString::to_string),
                ty: display::of(&field.ty),
                trait_object: trait_object(&field.ty)
                    .into_iter()
                    .find_map(|path| self.trait_ref(module, path)),
            })
            .collect();
        let ty = self.model.type_mut(id);
        ty.fields = fields;
        ty.generics = generic_params(&item.generics);
        ty.where_clause = item.generics.where_clause.as_ref().map(display::of);
    }

    fn define_impl(&mut self, module: &str, source: usize, item: &syn::ItemImpl) {
        let Some((None, trait_path, _)) = &item.trait_ else {
            return;
        };
        let syn::Type::Path(self_ty) = &*item.self_ty else {
            return;
        };
        let (Some(tr), Some(ty)) = (
            self.resolve_type(module, trait_path),
            self.resolve_type(module, &self_ty.path),
        ) else {
            trace!(module, "impl refers to a trait or type outside the model");
            return;
        };
        if self.model.ty(tr).kind != TypeKind::Trait {
            return;
        }

        let imp = self
            .model
            .type_mut(ty)
            .impls
            .entry(tr)
            .or_insert_with(|| ImplSymbol {
                header: impl_header(item, trait_path),
                site: Some(ImplSite {
                    source,
                    start: item.impl_token.span.start(),
                    close: item.brace_token.span.close().start(),
                }),
                ..ImplSymbol::default()
            });
        for impl_item in &item.items {
            let name = match impl_item {
                syn::ImplItem::Fn(f) => f.sig.ident.to_string(),
                syn::ImplItem::Const(c) => c.ident.to_string(),
                syn::ImplItem::Type(t) => t.ident.to_string(),
                _ => continue,
            };
            imp.items.insert(name);
        }
    }

    fn named_type(&self, module: &str, ty: &syn::Type) -> Option<TypeId> {
        match ty {
            syn::Type::Reference(r) => self.named_type(module, &r.elem),
            syn::Type::Paren(p) => self.named_type(module, &p.elem),
            syn::Type::Group(g) => self.named_type(module, &g.elem),
            syn::Type::Path(p) if p.qself.is_none() => self.resolve_type(module, &p.path),
            _ => None,
        }
    }

    fn trait_ref(&self, module: &str, path: &syn::Path) -> Option<TraitRef> {
        let id = self.resolve_type(module, path)?;
        (self.model.ty(id).kind == TypeKind::Trait).then(|| TraitRef {
            id,
            args: trait_args(path),
        })
    }

    fn resolve_type(&self, module: &str, path: &syn::Path) -> Option<TypeId> {
        self.expand(module, path)
            .into_iter()
            .find_map(|full| self.model.lookup(&full.join("::")))
    }

    fn has_marker(&self, module: &str, attrs: &[syn::Attribute], marker: &str) -> bool {
        attrs.iter().any(|attr| {
            self.expand(module, attr.path())
                .iter()
                .any(|full| full.join("::") == marker)
        })
    }

    /// Candidate fully qualified forms of `path` as seen from `module`, most
    /// specific first.
    fn expand(&self, module: &str, path: &syn::Path) -> Vec<Vec<String>> {
        let segments: Vec<String> = path.segments.iter().map(|s| s.ident.to_string()).collect();
        if path.leading_colon.is_some() {
            return vec![segments];
        }
        let Some(first) = segments.first() else {
            return Vec::new();
        };

        let scope = self.scopes.get(module);
        if let Some(imported) = scope.and_then(|scope| scope.imports.get(first)) {
            let mut full = self.normalize(module, imported);
            full.extend_from_slice(&segments[1..]);
            return vec![full];
        }
        if matches!(first.as_str(), "crate" | "self" | "super") {
            return vec![self.normalize(module, &segments)];
        }

        let mut expanded: Vec<Vec<String>> =
            vec![split(module).into_iter().chain(segments.clone()).collect()];
        for glob in scope.map(|scope| scope.globs.as_slice()).unwrap_or_default() {
            let mut full = self.normalize(module, glob);
            full.extend_from_slice(&segments);
            expanded.push(full);
        }
        expanded.push(segments);
        expanded
    }

    /// Makes a `use` path absolute.
    fn normalize(&self, module: &str, path: &[String]) -> Vec<String> {
        let mut base = split(module);
        let mut rest = path;
        match path.first().map(String::as_str) {
            Some("crate") => return path.to_vec(),
            Some("self") => rest = &path[1..],
            Some("super") => {
                while rest.first().map(String::as_str) == Some("super") {
                    base.pop();
                    rest = &rest[1..];
                }
            }
            Some(first) => {
                let local = format!("{module}::{first}");
                if !self.modules.contains(&local) && self.model.lookup(&local).is_none() {
                    return path.to_vec();
                }
            }
            None => return base,
        }
        base.extend_from_slice(rest);
        base
    }
}

fn split(module: &str) -> Vec<String> {
    module.split("::").map(str::to_string).collect()
}

fn collect_use(mut prefix: Vec<String>, tree: &syn::UseTree, scope: &mut Scope) {
    match tree {
        syn::UseTree::Path(p) => {
            prefix.push(p.ident.to_string());
            collect_use(prefix, &p.tree, scope);
        }
        syn::UseTree::Name(n) if n.ident == "self" => {
            if let Some(last) = prefix.last().cloned() {
                scope.imports.insert(last, prefix);
            }
        }
        syn::UseTree::Name(n) => {
            let name = n.ident.to_string();
            prefix.push(name.clone());
            scope.imports.insert(name, prefix);
        }
        syn::UseTree::Rename(r) => {
            prefix.push(r.ident.to_string());
            scope.imports.insert(r.rename.to_string(), prefix);
        }
        syn::UseTree::Glob(_) => scope.globs.push(prefix),
        syn::UseTree::Group(g) => {
            for tree in &g.items {
                collect_use(prefix.clone(), tree, scope);
            }
        }
    }
}

fn generic_params(generics: &syn::Generics) -> Vec<GenericParam> {
    generics
        .params
        .iter()
        .map(|param| {
            let mut declared = param.clone();
            let (name, kind, default) = match &mut declared {
                syn::GenericParam::Lifetime(l) => {
                    (l.lifetime.to_string(), GenericKind::Lifetime, None)
                }
                syn::GenericParam::Type(t) => {
                    t.eq_token = None;
                    let default = t.default.take().map(|ty| display::of(&ty));
                    (t.ident.to_string(), GenericKind::Type, default)
                }
                syn::GenericParam::Const(c) => {
                    c.eq_token = None;
                    let default = c.default.take().map(|expr| display::of(&expr));
                    (c.ident.to_string(), GenericKind::Const, default)
                }
            };
            GenericParam {
                name,
                kind,
                display: display::of(&declared),
                default,
            }
        })
        .collect()
}

/// Generic arguments on the last segment of `path`, associated item
/// bindings left out.
fn trait_args(path: &syn::Path) -> Vec<String> {
    let Some(syn::PathArguments::AngleBracketed(args)) = path.segments.last().map(|s| &s.arguments)
    else {
        return Vec::new();
    };
    args.args
        .iter()
        .filter(|arg| {
            matches!(
                arg,
                syn::GenericArgument::Lifetime(_)
                    | syn::GenericArgument::Type(_)
                    | syn::GenericArgument::Const(_)
            )
        })
        .map(display::of)
        .collect()
}

fn impl_header(item: &syn::ItemImpl, trait_path: &syn::Path) -> String {
    let mut header = format!(
        "impl{} {} for {}",
        display::of(&item.generics),
        display::of(trait_path),
        display::of(&*item.self_ty)
    );
    if let Some(where_clause) = &item.generics.where_clause {
        header.push(' ');
        header.push_str(&display::of(where_clause));
    }
    header
}

fn visibility(vis: &syn::Visibility) -> Visibility {
    match vis {
        syn::Visibility::Public(_) => Visibility::Public,
        syn::Visibility::Inherited => Visibility::Private,
        syn::Visibility::Restricted(r) => {
            let path = display::of(&*r.path);
            match path.as_str() {
                "crate" => Visibility::Crate,
                "self" => Visibility::Private,
                _ => Visibility::Restricted(path),
            }
        }
    }
}

fn associated(
    owner: TypeId,
    ident: &syn::Ident,
    kind: MemberKind,
    has_default: bool,
) -> MemberSymbol {
    MemberSymbol {
        owner,
        name: ident.to_string(),
        kind,
        is_async: false,
        is_unsafe: false,
        generics: Vec::new(),
        where_clause: None,
        receiver: None,
        params: Vec::new(),
        output: ReturnType::Unit,
        has_default,
    }
}

fn is_unit(ty: &syn::Type) -> bool {
    matches!(ty, syn::Type::Tuple(t) if t.elems.is_empty())
}

/// Trait bounds of a `dyn` type, directly or behind a reference, `Box`, `Rc`
/// or `Arc`. Empty for any other type.
fn trait_object(ty: &syn::Type) -> Vec<&syn::Path> {
    match ty {
        syn::Type::Reference(r) => trait_object(&r.elem),
        syn::Type::Paren(p) => trait_object(&p.elem),
        syn::Type::Group(g) => trait_object(&g.elem),
        syn::Type::TraitObject(obj) => obj
            .bounds
            .iter()
            .filter_map(|bound| match bound {
                syn::TypeParamBound::Trait(bound) => Some(&bound.path),
                _ => None,
            })
            .collect(),
        syn::Type::Path(p) if p.qself.is_none() => {
            let Some(last) = p.path.segments.last() else {
                return Vec::new();
            };
            if !matches!(last.ident.to_string().as_str(), "Box" | "Rc" | "Arc") {
                return Vec::new();
            }
            let syn::PathArguments::AngleBracketed(args) = &last.arguments else {
                return Vec::new();
            };
            args.args
                .iter()
                .find_map(|arg| match arg {
                    syn::GenericArgument::Type(inner) => Some(trait_object(inner)),
                    _ => None,
                })
                .unwrap_or_default()
        }
        _ => Vec::new(),
    }
}
