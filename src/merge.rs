//! Splices generated fragments into the hand-written sources.
//!
//! A trait impl must be a single block, so forwarding methods are inserted
//! into the existing `impl Trait for Type`, in whichever source and module it
//! was written. The impl is found through the model, so renamed imports and
//! qualified paths in its header make no difference. Without an impl the whole
//! block is appended to the module that declares the type. Everything else in
//! the sources is left byte for byte.

use indexmap::IndexMap;
use proc_macro2::LineColumn;
use tracing::trace;

use crate::frontend::SourceFile;
use crate::model::TypeModel;
use crate::synth::Fragment;

const INDENT: &str = "    ";

struct ModuleSite {
    /// Closing brace of an inline module; `None` for the file itself.
    close: Option<LineColumn>,
    indent: String,
}

struct Insertion {
    offset: usize,
    text: String,
}

/// Merges `fragments` into `sources`, the sources `model` was built from.
/// Returns the index and merged text of every source that changed, in
/// source order.
pub fn merge_fragments(
    model: &TypeModel,
    sources: &[SourceFile],
    fragments: &[Fragment],
) -> Vec<(usize, String)> {
    let lines: Vec<_> = sources.iter().map(|source| Lines::new(&source.text)).collect();
    let mut edits: IndexMap<usize, Vec<Insertion>> = IndexMap::new();

    for fragment in fragments {
        let ty = model.ty(fragment.ty);
        for block in &fragment.blocks {
            let site = ty.impls.get(&block.trait_id).and_then(|imp| imp.site);
            if let Some(site) = site.filter(|site| site.source < lines.len()) {
                let lines = &lines[site.source];
                let indent = lines.indent_of(site.start.line);
                let methods = block.render_methods(&format!("{indent}{INDENT}"));
                edits
                    .entry(site.source)
                    .or_default()
                    .push(lines.before_close(site.close, &indent, &methods));
                continue;
            }

            let Some(source) = sources.get(ty.source) else {
                continue;
            };
            let lines = &lines[ty.source];
            let Some(module) = module_site(lines, source, &ty.module) else {
                trace!(module = %ty.module, "declaring module is not in its source");
                continue;
            };
            let insertion = match module.close {
                Some(close) => {
                    let inner = format!("{}{INDENT}", module.indent);
                    lines.before_close(close, &module.indent, &block.render(&inner))
                }
                None => {
                    let separator = if source.text.ends_with('\n') { "\n" } else { "\n\n" };
                    Insertion {
                        offset: source.text.len(),
                        text: format!("{separator}{}\n", block.render("")),
                    }
                }
            };
            edits.entry(ty.source).or_default().push(insertion);
        }
    }

    edits.sort_keys();
    edits
        .into_iter()
        .map(|(index, insertions)| (index, apply(&sources[index].text, insertions)))
        .collect()
}

fn apply(source: &str, insertions: Vec<Insertion>) -> String {
    let mut merged = source.to_string();
    let mut ordered: Vec<_> = insertions.into_iter().enumerate().collect();
    ordered.sort_by(|(a_seq, a), (b_seq, b)| b.offset.cmp(&a.offset).then(b_seq.cmp(a_seq)));
    for (_, insertion) in ordered {
        merged.insert_str(insertion.offset, &insertion.text);
    }
    merged
}

fn module_site(lines: &Lines, source: &SourceFile, module: &str) -> Option<ModuleSite> {
    if source.module == module {
        return Some(ModuleSite {
            close: None,
            indent: String::new(),
        });
    }
    find_module(lines, &source.module, &source.file.items, module)
}

fn find_module(
    lines: &Lines,
    current: &str,
    items: &[syn::Item],
    target: &str,
) -> Option<ModuleSite> {
    items.iter().find_map(|item| {
        let syn::Item::Mod(item) = item else {
            return None;
        };
        let (brace, content) = item.content.as_ref()?;
        let nested = format!("{current}::{}", item.ident);
        if nested == target {
            Some(ModuleSite {
                close: Some(brace.span.close().start()),
                indent: lines.indent_of(item.mod_token.span.start().line),
            })
        } else {
            find_module(lines, &nested, content, target)
        }
    })
}

struct Lines<'a> {
    source: &'a str,
    starts: Vec<usize>,
}

impl<'a> Lines<'a> {
    fn new(source: &'a str) -> Self {
        let starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { source, starts }
    }

    fn line(&self, line: usize) -> &'a str {
        let start = self.starts[line - 1];
        let end = self.starts.get(line).map_or(self.source.len(), |&next| next - 1);
        &self.source[start..end]
    }

    fn indent_of(&self, line: usize) -> String {
        self.line(line)
            .chars()
            .take_while(|c| c.is_whitespace())
            .collect()
    }

    fn offset(&self, at: LineColumn) -> usize {
        let start = self.starts[at.line - 1];
        start
            + self.line(at.line)
                .char_indices()
                .nth(at.column)
                .map_or(self.line(at.line).len(), |(i, _)| i)
    }

    /// Inserts `body` on its own lines just before the closing brace at `close`.
    fn before_close(&self, close: LineColumn, indent: &str, body: &str) -> Insertion {
        let offset = self.offset(close);
        let line_start = self.starts[close.line - 1];
        if self.source[line_start..offset].trim().is_empty() {
            Insertion {
                offset: line_start,
                text: format!("\n{body}\n"),
            }
        } else {
            Insertion {
                offset,
                text: format!("\n{body}\n{indent}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
    use crate::frontend::build;
    use crate::resolver::resolve;
    use crate::synth::synthesize;
    use pretty_assertions::assert_eq;

    /// Runs generation over `sources` (module, text) and returns every source
    /// after merging, changed or not.
    fn merge_all(sources: &[(&str, &str)]) -> Vec<String> {
        let parsed: Vec<_> = sources
            .iter()
            .enumerate()
            .map(|(index, (module, text))| {
                SourceFile::parse(format!("src{index}.rs"), module, text.to_string()).unwrap()
            })
            .collect();
        let compilation = build(&parsed, "auto_decorator::decorator");
        let cancel = CancellationToken::new();
        let fragments: Vec<_> = compilation
            .candidates
            .iter()
            .filter_map(|&c| resolve(&compilation.model, c, &cancel).unwrap())
            .map(|r| synthesize(&compilation.model, &r))
            .collect();

        let mut texts: Vec<_> = sources.iter().map(|(_, text)| text.to_string()).collect();
        for (index, merged) in merge_fragments(&compilation.model, &parsed, &fragments) {
            texts[index] = merged;
        }
        texts
    }

    fn merge(source: &str) -> String {
        merge_all(&[("crate", source)]).remove(0)
    }

    #[test]
    fn methods_join_the_existing_impl() {
        let source = "use auto_decorator::decorator;

pub trait Logger {
    fn information(&self, message: &str);
    fn error(&self, message: &str);
}

#[decorator]
pub struct MaskLogger {
    original: Box<dyn Logger>,
}

impl Logger for MaskLogger {
    fn error(&self, message: &str) {
        self.original.error(message);
    }
}
";
        assert_eq!(
            merge(source),
            "use auto_decorator::decorator;

pub trait Logger {
    fn information(&self, message: &str);
    fn error(&self, message: &str);
}

#[decorator]
pub struct MaskLogger {
    original: Box<dyn Logger>,
}

impl Logger for MaskLogger {
    fn error(&self, message: &str) {
        self.original.error(message);
    }

    fn information(&self, message: &str) {
        self.original.information(message);
    }
}
"
        );
    }

    #[test]
    fn missing_supertrait_impl_is_appended_inside_the_module() {
        let source = "mod shapes {
    use auto_decorator::decorator;
    pub trait Named { fn name(&self) -> String; }
    pub trait Shape: Named { fn area(&self) -> f64; }
    #[decorator]
    pub struct Scaled { shape: Box<dyn Shape> }
    impl Shape for Scaled {}
}
";
        assert_eq!(
            merge(source),
            "mod shapes {
    use auto_decorator::decorator;
    pub trait Named { fn name(&self) -> String; }
    pub trait Shape: Named { fn area(&self) -> f64; }
    #[decorator]
    pub struct Scaled { shape: Box<dyn Shape> }
    impl Shape for Scaled {
        fn area(&self) -> f64 {
            self.shape.area()
        }
    }

    impl Named for Scaled {
        fn name(&self) -> String {
            self.shape.name()
        }
    }
}
"
        );
    }

    #[test]
    fn merged_source_needs_no_further_generation() {
        let source = "use auto_decorator::decorator;
trait I { fn f(&self); fn g(&self) -> u8; }
#[decorator]
struct T { d: Box<dyn I> }
impl I for T { fn f(&self) {} }";
        let merged = merge(source);
        assert_eq!(merge(&merged), merged);
    }

    #[test]
    fn renamed_trait_import_still_finds_the_impl() {
        let source = "mod api {
    pub trait Logger {
        fn a(&self);
        fn b(&self);
    }
}
use api::Logger as Log;
use auto_decorator::decorator;
#[decorator]
struct M {
    d: Box<dyn Log>,
}
impl Log for M {
    fn a(&self) {}
}
";
        assert_eq!(
            merge(source),
            "mod api {
    pub trait Logger {
        fn a(&self);
        fn b(&self);
    }
}
use api::Logger as Log;
use auto_decorator::decorator;
#[decorator]
struct M {
    d: Box<dyn Log>,
}
impl Log for M {
    fn a(&self) {}

    fn b(&self) {
        self.d.b();
    }
}
"
        );
    }

    #[test]
    fn impl_in_another_source_is_extended_in_place() {
        let lib = "use auto_decorator::decorator;
pub trait Logger {
    fn a(&self);
    fn b(&self);
}
#[decorator]
pub struct M {
    pub d: Box<dyn Logger>,
}
";
        let impls = "use crate::{Logger, M};

mod inner {
    impl crate::Logger for crate::M {
        fn a(&self) {}
    }
}
";
        let merged = merge_all(&[("crate", lib), ("crate::impls", impls)]);
        assert_eq!(merged[0], lib);
        assert_eq!(
            merged[1],
            "use crate::{Logger, M};

mod inner {
    impl crate::Logger for crate::M {
        fn a(&self) {}

        fn b(&self) {
            self.d.b();
        }
    }
}
"
        );
    }
}
