//! Lectern: an embeddable Scheme runtime.
//!
//! Source text is read into [`Value`]s and evaluated by a trampolined
//! interpreter whose continuations live on the heap, so `call/cc`
//! continuations stay resumable after the call that captured them returns.
//! Lambdas are compiled lazily into trees of Rust closures on first
//! application; a body the compiler cannot handle stays interpreted.
//!
//! ```no_run
//! use lectern::{Runtime, RuntimeConfig};
//!
//! let rt = Runtime::new(RuntimeConfig::default());
//! let value = rt.eval_str("(define (fact n) (if (= n 0) 1 (* n (fact (- n 1))))) (fact 5)");
//! assert_eq!(value.unwrap().to_string(), "120");
//! ```

mod bootstrap;
pub mod config;
pub mod environment;
pub mod error;
pub mod expander;
pub mod host;
pub mod interner;
pub mod interpreter;
pub mod jit;
pub mod language;
pub mod lexer;
pub mod native;
pub mod numeric;
pub mod parser;
pub mod printer;
pub mod runtime;
pub mod stdlib;
mod syntax;

pub use config::RuntimeConfig;
pub use environment::Env;
pub use error::{Error, Result};
pub use host::{BufferSink, Fetcher, FileFetcher, OutputSink, StdoutSink};
pub use interner::Symbol;
pub use language::{CompileState, LambdaCell, Value, cons, list_from_vec};
pub use numeric::Number;
pub use printer::display_string;
pub use runtime::Runtime;
