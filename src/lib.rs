//! Generates forwarding trait methods for decorator structs.
//!
//! A struct marked with `#[decorator]` that implements a trait and holds a
//! `dyn Trait` field of that same trait gets every trait method it does not
//! write itself forwarded to the field:
//!
//! ```
//! use auto_decorator::{CancellationToken, Generator, MemorySink};
//!
//! let source = r#"
//!     use auto_decorator::decorator;
//!
//!     pub trait Logger {
//!         fn information(&self, message: &str);
//!         fn error(&self, message: &str);
//!     }
//!
//!     #[decorator]
//!     pub struct MaskLogger {
//!         original: Box<dyn Logger>,
//!     }
//!
//!     impl Logger for MaskLogger {
//!         fn error(&self, message: &str) {
//!             self.original.error(&message.replace(|c: char| c.is_ascii_digit(), "*"));
//!         }
//!     }
//! "#;
//!
//! let mut sink = MemorySink::new();
//! Generator::new()
//!     .source("logging.rs", "crate", source)
//!     .run(&mut sink, &CancellationToken::new())
//!     .unwrap();
//!
//! let generated = sink.get("MaskLogger.g.rs").unwrap();
//! assert!(generated.contains("self.original.information(message);"));
//! ```

pub mod cancel;
pub mod display;
pub mod error;
pub mod frontend;
pub mod merge;
pub mod model;
pub mod pipeline;
pub mod resolver;
pub mod synth;

pub use cancel::{CancellationToken, Cancelled};
pub use error::{Error, Result};
pub use pipeline::{ArtifactSink, DirSink, Generator, MemorySink, Report};

#[cfg(feature = "macros")]
pub use auto_decorator_proc_macros::decorator;
