//! Turns a [`Resolution`] into forwarding source text.

use indexmap::IndexMap;

use crate::display::substitute;
use crate::model::{
    GenericKind, MemberId, MemberSymbol, ReturnType, TraitRef, TypeId, TypeModel, Visibility,
};
use crate::resolver::Resolution;

const INDENT: &str = "    ";

/// One generated method that forwards to the delegate field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardingMethod {
    pub member: MemberId,
    pub name: String,
    /// Visibility of the return type when it is declared in the model,
    /// public otherwise. Trait impl items cannot carry a visibility, so it is
    /// never printed; it is kept for callers that inspect a [`Fragment`].
    pub visibility: Visibility,
    pub signature: String,
    pub body: String,
}

impl ForwardingMethod {
    pub fn render(&self, indent: &str) -> String {
        format!(
            "{indent}{} {{\n{indent}{INDENT}{}\n{indent}}}",
            self.signature, self.body
        )
    }
}

/// Forwarding methods for one trait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImplBlock {
    pub trait_id: TypeId,
    pub header: String,
    pub methods: Vec<ForwardingMethod>,
}

impl ImplBlock {
    pub fn render_methods(&self, indent: &str) -> String {
        self.methods
            .iter()
            .map(|method| method.render(indent))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn render(&self, indent: &str) -> String {
        format!(
            "{indent}{} {{\n{}\n{indent}}}",
            self.header,
            self.render_methods(&format!("{indent}{INDENT}"))
        )
    }
}

/// The generated augmentation of one decorator type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub type_name: String,
    pub ty: TypeId,
    pub module: String,
    pub visibility: Visibility,
    pub blocks: Vec<ImplBlock>,
}

impl Fragment {
    pub fn artifact_name(&self) -> String {
        format!("{}.g.rs", self.type_name)
    }

    /// Artifact name that also encodes the module, for types whose plain
    /// name is taken by another type.
    pub fn qualified_artifact_name(&self) -> String {
        format!("{}.{}.g.rs", self.module.replace("::", "."), self.type_name)
    }

    pub fn methods(&self) -> impl Iterator<Item = &ForwardingMethod> {
        self.blocks.iter().flat_map(|block| block.methods.iter())
    }

    pub fn render(&self) -> String {
        let vis = self.visibility.keyword();
        let mut out = String::from("// @generated by auto-decorator. Do not edit.\n");
        out.push_str(&format!("// module: {}\n", self.module));
        if vis.is_empty() {
            out.push_str(&format!("// type: struct {}\n", self.type_name));
        } else {
            out.push_str(&format!("// type: {vis} struct {}\n", self.type_name));
        }
        for block in &self.blocks {
            out.push('\n');
            out.push_str(&block.render(""));
            out.push('\n');
        }
        out
    }
}

/// Builds the forwarding fragment for `resolution`. The resolver never hands
/// over an empty absent set, so every fragment has at least one method.
///
/// Signatures are written in terms of the trait arguments the delegate field
/// names, so `dyn Store<String>` turns `fn get(&self, key: K)` into
/// `fn get(&self, key: String)`.
pub fn synthesize(model: &TypeModel, resolution: &Resolution) -> Fragment {
    let ty = model.ty(resolution.ty);
    let instances = model.instantiate(&resolution.delegate);
    let bindings: IndexMap<TypeId, IndexMap<String, String>> = instances
        .iter()
        .map(|(&id, tr)| (id, model.bindings(tr)))
        .collect();
    let unbound = IndexMap::new();
    let mut blocks: IndexMap<TypeId, ImplBlock> = IndexMap::new();

    for &member in &resolution.absent {
        let symbol = model.member(member);
        let method = ForwardingMethod {
            member,
            name: symbol.name.clone(),
            visibility: visibility(model, symbol),
            signature: signature(symbol, bindings.get(&symbol.owner).unwrap_or(&unbound)),
            body: body(&resolution.field.name, symbol),
        };
        blocks
            .entry(symbol.owner)
            .or_insert_with(|| {
                impl_block(model, resolution.ty, symbol.owner, instances.get(&symbol.owner))
            })
            .methods
            .push(method);
    }

    Fragment {
        type_name: resolution.name.clone(),
        ty: resolution.ty,
        module: ty.module.clone(),
        visibility: ty.visibility.clone(),
        blocks: blocks.into_values().collect(),
    }
}

fn impl_block(
    model: &TypeModel,
    ty: TypeId,
    tr: TypeId,
    instance: Option<&TraitRef>,
) -> ImplBlock {
    let symbol = model.ty(ty);
    let trait_symbol = model.ty(tr);
    let header = match symbol.impls.get(&tr) {
        Some(imp) => imp.header.clone(),
        None => {
            let trait_path = if trait_symbol.module == symbol.module {
                trait_symbol.name.clone()
            } else {
                trait_symbol.path()
            };
            let trait_args: Vec<_> = instance
                .map(|tr| tr.args.iter().map(String::as_str).collect())
                .unwrap_or_default();
            let params: Vec<_> = symbol.generics.iter().map(|p| p.display.as_str()).collect();
            let args: Vec<_> = symbol.generics.iter().map(|p| p.name.as_str()).collect();
            let mut header = format!(
                "impl{} {trait_path}{} for {}{}",
                angled(&params),
                angled(&trait_args),
                symbol.name,
                angled(&args)
            );
            if let Some(where_clause) = &symbol.where_clause {
                header.push(' ');
                header.push_str(where_clause);
            }
            header
        }
    };
    ImplBlock {
        trait_id: tr,
        header,
        methods: Vec::new(),
    }
}

fn angled(items: &[&str]) -> String {
    if items.is_empty() {
        String::new()
    } else {
        format!("<{}>", items.join(", "))
    }
}

fn visibility(model: &TypeModel, member: &MemberSymbol) -> Visibility {
    match &member.output {
        ReturnType::Value {
            target: Some(target),
            ..
        } => model.ty(*target).visibility.clone(),
        _ => Visibility::Public,
    }
}

fn signature(member: &MemberSymbol, bindings: &IndexMap<String, String>) -> String {
    let mut sig = String::new();
    if member.is_async {
        sig.push_str("async ");
    }
    if member.is_unsafe {
        sig.push_str("unsafe ");
    }
    let generics: Vec<_> = member
        .generics
        .iter()
        .map(|p| substitute(&p.display, bindings))
        .collect();
    let generics: Vec<_> = generics.iter().map(String::as_str).collect();
    let inputs: Vec<_> = member
        .receiver
        .iter()
        .cloned()
        .chain(
            member
                .params
                .iter()
                .map(|p| format!("{}: {}", p.name, substitute(&p.ty, bindings))),
        )
        .collect();
    sig.push_str(&format!(
        "fn {}{}({})",
        member.name,
        angled(&generics),
        inputs.join(", ")
    ));
    if let ReturnType::Value { display, .. } = &member.output {
        sig.push_str(" -> ");
        sig.push_str(&substitute(display, bindings));
    }
    if let Some(where_clause) = &member.where_clause {
        sig.push(' ');
        sig.push_str(&substitute(where_clause, bindings));
    }
    sig
}

fn body(field: &str, member: &MemberSymbol) -> String {
    if member.receiver.is_none() {
        return format!(
            "compile_error!(\"Trait function {} must have a `self` receiver to be forwarded.\");",
            member.name
        );
    }

    // `impl Trait` arguments rule out explicit generic arguments
    let has_impl_arg = member.params.iter().any(|p| p.ty.contains("impl "));
    let turbofish = if member.is_generic() && !has_impl_arg {
        let args: Vec<_> = member
            .generics
            .iter()
            .filter(|p| p.kind != GenericKind::Lifetime)
            .map(|p| p.name.as_str())
            .collect();
        format!("::{}", angled(&args))
    } else {
        String::new()
    };
    let args: Vec<_> = member.params.iter().map(|p| p.name.as_str()).collect();

    let mut call = format!("self.{field}.{}{turbofish}({})", member.name, args.join(", "));
    if member.is_async {
        call.push_str(".await");
    }
    if member.is_unsafe {
        call = format!("unsafe {{ {call} }}");
    }
    match member.output {
        ReturnType::Unit => format!("{call};"),
        ReturnType::Value { .. } => call,
    }
}
