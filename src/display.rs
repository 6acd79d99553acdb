//! Display forms for syntax fragments.
//!
//! `TokenStream::to_string` separates every token with a space
//! (`Vec < & str >`). Generated code reproduces signatures verbatim, so types,
//! generics and where-clauses are rendered here the way they would be written
//! by hand.

use indexmap::IndexMap;
use proc_macro2::{Delimiter, Group, Punct, Spacing, TokenStream, TokenTree};
use quote::ToTokens;

/// Renders any syntax node in its display form.
pub fn of<T: ToTokens + ?Sized>(node: &T) -> String {
    tokens(node.to_token_stream())
}

pub fn tokens(stream: TokenStream) -> String {
    let atoms = atoms(stream);
    let mut out = String::new();
    let mut prev: Option<&Atom> = None;
    for atom in &atoms {
        if let Some(prev) = prev {
            if spaced(prev, atom) {
                out.push(' ');
            }
        }
        out.push_str(&atom.text());
        prev = Some(atom);
    }
    out
}

/// Replaces generic parameters in the display form `text` with the arguments
/// bound to them. Lifetimes are keyed with their leading `'`. Identifiers that
/// follow `::` are path segments and are left alone.
pub fn substitute(text: &str, bindings: &IndexMap<String, String>) -> String {
    if bindings.is_empty() {
        return text.to_string();
    }
    let parsed: Option<IndexMap<&str, TokenStream>> = bindings
        .iter()
        .map(|(name, arg)| Some((name.as_str(), arg.parse::<TokenStream>().ok()?)))
        .collect();
    match (parsed, text.parse::<TokenStream>()) {
        (Some(parsed), Ok(stream)) => tokens(replace(stream, &parsed)),
        _ => text.to_string(),
    }
}

fn replace(stream: TokenStream, bindings: &IndexMap<&str, TokenStream>) -> TokenStream {
    let mut out: Vec<TokenTree> = Vec::new();
    let mut iter = stream.into_iter().peekable();
    while let Some(tree) = iter.next() {
        match tree {
            TokenTree::Group(group) => {
                let replaced = Group::new(group.delimiter(), replace(group.stream(), bindings));
                out.push(TokenTree::Group(replaced));
            }
            TokenTree::Punct(punct) if punct.as_char() == '\'' => {
                let key = match iter.peek() {
                    Some(TokenTree::Ident(ident)) => format!("'{ident}"),
                    _ => String::new(),
                };
                match bindings.get(key.as_str()) {
                    Some(arg) => {
                        iter.next();
                        out.extend(arg.clone());
                    }
                    None => out.push(TokenTree::Punct(punct)),
                }
            }
            TokenTree::Ident(ident) if !ends_with_path_sep(&out) => {
                let Some(arg) = bindings.get(ident.to_string().as_str()) else {
                    out.push(TokenTree::Ident(ident));
                    continue;
                };
                // `T::Assoc` needs `<Vec<u8>>::Assoc` once `T` is a longer type
                let before_path_sep =
                    matches!(iter.peek(), Some(TokenTree::Punct(p)) if p.as_char() == ':');
                let qualified = before_path_sep && arg.clone().into_iter().nth(1).is_some();
                if qualified {
                    out.push(TokenTree::Punct(Punct::new('<', Spacing::Alone)));
                    out.extend(arg.clone());
                    out.push(TokenTree::Punct(Punct::new('>', Spacing::Alone)));
                } else {
                    out.extend(arg.clone());
                }
            }
            other => out.push(other),
        }
    }
    out.into_iter().collect()
}

fn ends_with_path_sep(out: &[TokenTree]) -> bool {
    matches!(
        out,
        [.., TokenTree::Punct(a), TokenTree::Punct(b)]
            if a.as_char() == ':' && a.spacing() == Spacing::Joint && b.as_char() == ':'
    )
}

#[derive(Debug)]
enum Atom {
    Word(String),
    Op(String),
    Group(Delimiter, String),
}

impl Atom {
    fn text(&self) -> String {
        match self {
            Atom::Word(word) | Atom::Op(word) => word.clone(),
            Atom::Group(Delimiter::Parenthesis, inner) => format!("({inner})"),
            Atom::Group(Delimiter::Bracket, inner) => format!("[{inner}]"),
            Atom::Group(Delimiter::Brace, inner) if inner.is_empty() => "{}".to_string(),
            Atom::Group(Delimiter::Brace, inner) => format!("{{ {inner} }}"),
            Atom::Group(Delimiter::None, inner) => inner.clone(),
        }
    }
}

const KEYWORDS: &[&str] = &[
    "as", "async", "const", "dyn", "for", "impl", "in", "mut", "unsafe", "where",
];

fn atoms(stream: TokenStream) -> Vec<Atom> {
    let mut atoms = Vec::new();
    let mut iter = stream.into_iter().peekable();
    while let Some(tree) = iter.next() {
        match tree {
            TokenTree::Ident(ident) => atoms.push(Atom::Word(ident.to_string())),
            TokenTree::Literal(lit) => atoms.push(Atom::Word(lit.to_string())),
            TokenTree::Group(group) => {
                atoms.push(Atom::Group(group.delimiter(), tokens(group.stream())))
            }
            TokenTree::Punct(punct) if punct.as_char() == '\'' => {
                // lifetimes lex as a joint `'` followed by an identifier
                let mut lifetime = String::from("'");
                if let Some(TokenTree::Ident(ident)) = iter.peek() {
                    lifetime.push_str(&ident.to_string());
                    iter.next();
                }
                atoms.push(Atom::Word(lifetime));
            }
            TokenTree::Punct(punct) => {
                let mut op = String::from(punct.as_char());
                let mut spacing = punct.spacing();
                while spacing == Spacing::Joint {
                    match iter.peek() {
                        Some(TokenTree::Punct(next)) if next.as_char() != '\'' => {
                            op.push(next.as_char());
                            spacing = next.spacing();
                            iter.next();
                        }
                        _ => break,
                    }
                }
                atoms.push(Atom::Op(op));
            }
        }
    }
    atoms
}

fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

fn spaced(prev: &Atom, next: &Atom) -> bool {
    if let Atom::Op(prev) = prev {
        if prev.ends_with("::")
            || prev.ends_with(['&', '<', '.', '*', '?', '!', '#'])
        {
            return false;
        }
    }

    match next {
        Atom::Op(op) if op.starts_with([',', ';', ':', '>', '.']) => false,
        Atom::Op(op) if op.starts_with('<') => {
            !matches!(prev, Atom::Word(word) if !is_keyword(word))
        }
        Atom::Group(Delimiter::Parenthesis | Delimiter::Bracket, _) => {
            !matches!(prev, Atom::Word(word) if !is_keyword(word) && !word.starts_with('\''))
        }
        _ => true,
    }
}
