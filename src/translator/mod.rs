//! Intrinsic function evaluation for templates.
//!
//! Translators dereference template expressions against parameter sets and
//! carry the taint flags that mark values as changing at update time.

mod arena;
mod evaluator;

pub use arena::{StackIdentity, TranslatorArena};
pub use evaluator::{AllowedFunctions, OUTPUTS_ATTRIBUTE_PREFIX, Translator};
