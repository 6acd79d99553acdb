use indexmap::IndexSet;
use tracing::{debug, trace};

use crate::cancel::{CancellationToken, Cancelled};
use crate::frontend::Candidate;
use crate::model::{FieldSymbol, MemberId, MemberKind, TraitRef, TypeId, TypeModel};

/// Everything the synthesizer needs to know about one decorator type.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub name: String,
    pub ty: TypeId,
    pub field: FieldSymbol,
    /// The field's trait, with the arguments the field names it with.
    pub delegate: TraitRef,
    /// Trait methods with no implementation on the type, in closure order.
    pub absent: Vec<MemberId>,
}

/// Resolves the delegate field of `candidate` and the trait methods it still
/// lacks. `Ok(None)` means there is nothing to generate.
pub fn resolve(
    model: &TypeModel,
    candidate: Candidate,
    cancel: &CancellationToken,
) -> Result<Option<Resolution>, Cancelled> {
    cancel.check()?;
    let ty = model.ty(candidate.ty);
    let implemented = model.all_traits(candidate.ty);

    let mut delegate = None;
    for field in &ty.fields {
        cancel.check()?;
        if let Some(tr) = field
            .trait_object
            .as_ref()
            .filter(|tr| implemented.contains(&tr.id))
        {
            delegate = Some((field, tr));
            break;
        }
    }
    let Some((field, delegate_trait)) = delegate else {
        debug!(ty = %ty.name, "no field holds a trait the type implements");
        return Ok(None);
    };

    let mut absent = Vec::new();
    for member in interface_members(model, delegate_trait.id) {
        cancel.check()?;
        let symbol = model.member(member);
        if symbol.kind != MemberKind::Method {
            continue;
        }
        match model.implementation_of(candidate.ty, member) {
            Some(implementation) => {
                trace!(ty = %ty.name, method = %symbol.name, ?implementation, "implemented")
            }
            None => absent.push(member),
        }
    }

    if absent.is_empty() {
        debug!(ty = %ty.name, "all trait methods are implemented");
        return Ok(None);
    }
    debug!(ty = %ty.name, field = %field.name, absent = absent.len(), "resolved decorator");
    Ok(Some(Resolution {
        name: ty.name.clone(),
        ty: candidate.ty,
        field: field.clone(),
        delegate: delegate_trait.clone(),
        absent,
    }))
}

/// Members declared on `tr` and on every trait it extends.
pub fn interface_members(model: &TypeModel, tr: TypeId) -> IndexSet<MemberId> {
    model
        .trait_with_supertraits(tr)
        .into_iter()
        .flat_map(|tr| model.ty(tr).members.iter().copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{build, Compilation, SourceFile};

    fn compile(source: &str) -> Compilation {
        let source = SourceFile::parse("lib.rs", "crate", source.to_string()).unwrap();
        build(std::slice::from_ref(&source), "auto_decorator::decorator")
    }

    fn absent_names(source: &str) -> Option<Vec<String>> {
        let compilation = compile(source);
        let candidate = *compilation.candidates.first()?;
        let cancel = CancellationToken::new();
        let resolution = resolve(&compilation.model, candidate, &cancel).unwrap()?;
        Some(
            resolution
                .absent
                .iter()
                .map(|&m| compilation.model.member(m).name.clone())
                .collect(),
        )
    }

    #[test]
    fn partially_implemented_trait() {
        let absent = absent_names(
            r#"
            use auto_decorator::decorator;
            trait I { fn f(&self, x: u8); fn g(&self, y: u8) -> u8; }
            #[decorator] struct T { d: Box<dyn I> }
            impl I for T { fn f(&self, x: u8) {} }
            "#,
        );
        assert_eq!(absent, Some(vec!["g".to_string()]));
    }

    #[test]
    fn no_delegate_field_means_no_resolution() {
        let absent = absent_names(
            r#"
            use auto_decorator::decorator;
            trait I { fn f(&self); fn g(&self); }
            trait Other { fn h(&self); }
            #[decorator] struct T { d: Box<dyn Other>, n: u32 }
            impl I for T { fn f(&self) {} }
            "#,
        );
        assert_eq!(absent, None);
    }

    #[test]
    fn fully_implemented_trait_means_no_resolution() {
        let absent = absent_names(
            r#"
            use auto_decorator::decorator;
            trait I { fn f(&self); fn g(&self); }
            #[decorator] struct T { d: Box<dyn I> }
            impl I for T { fn f(&self) {} fn g(&self) {} }
            "#,
        );
        assert_eq!(absent, None);
    }

    #[test]
    fn grandparent_methods_are_in_the_closure() {
        let absent = absent_names(
            r#"
            use auto_decorator::decorator;
            trait A { fn a(&self); }
            trait B: A { fn b(&self); }
            trait C: B { fn c(&self); }
            #[decorator] struct T { d: Box<dyn C> }
            impl C for T { fn c(&self) {} }
            "#,
        );
        assert_eq!(absent, Some(vec!["b".to_string(), "a".to_string()]));
    }

    #[test]
    fn defaults_and_associated_items_are_never_absent() {
        let absent = absent_names(
            r#"
            use auto_decorator::decorator;
            trait I { type Out; const N: usize; fn f(&self) {} fn g(&self); }
            #[decorator] struct T { d: Box<dyn I<Out = ()>> }
            impl I for T { type Out = (); const N: usize = 1; }
            "#,
        );
        assert_eq!(absent, Some(vec!["g".to_string()]));
    }

    #[test]
    fn same_name_on_unrelated_traits_stays_distinct() {
        let compilation = compile(
            r#"
            use auto_decorator::decorator;
            trait Read { fn close(&self); }
            trait Write { fn close(&self); }
            trait Io: Read + Write {}
            #[decorator] struct T { d: Box<dyn Io> }
            impl Io for T {}
            impl Read for T { fn close(&self) {} }
            "#,
        );
        let model = &compilation.model;
        let cancel = CancellationToken::new();
        let resolution = resolve(model, compilation.candidates[0], &cancel)
            .unwrap()
            .unwrap();

        assert_eq!(resolution.absent.len(), 1);
        let owner = model.member(resolution.absent[0]).owner;
        assert_eq!(model.ty(owner).name, "Write");
    }

    #[test]
    fn first_qualifying_field_is_the_delegate() {
        let compilation = compile(
            r#"
            use auto_decorator::decorator;
            trait I { fn f(&self); }
            #[decorator] struct T { name: String, first: &'static dyn I, second: Box<dyn I> }
            impl I for T {}
            "#,
        );
        let cancel = CancellationToken::new();
        let resolution = resolve(&compilation.model, compilation.candidates[0], &cancel)
            .unwrap()
            .unwrap();
        assert_eq!(resolution.field.name, "first");
    }

    #[test]
    fn delegate_keeps_the_field_trait_arguments() {
        let compilation = compile(
            r#"
            use auto_decorator::decorator;
            trait Store<K> { fn get(&self, key: K) -> Option<K>; }
            #[decorator] struct Cached { inner: Box<dyn Store<String> + Send> }
            impl Store<String> for Cached {}
            "#,
        );
        let cancel = CancellationToken::new();
        let resolution = resolve(&compilation.model, compilation.candidates[0], &cancel)
            .unwrap()
            .unwrap();
        assert_eq!(resolution.delegate.args, vec!["String".to_string()]);
    }

    #[test]
    fn cancellation_aborts_without_a_record() {
        let compilation = compile(
            r#"
            use auto_decorator::decorator;
            trait I { fn f(&self); }
            #[decorator] struct T { d: Box<dyn I> }
            impl I for T {}
            "#,
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = resolve(&compilation.model, compilation.candidates[0], &cancel);
        assert_eq!(result.map(|r| r.is_some()), Err(Cancelled));
    }
}
