//! The expression language used in brick configurations.
//!
//! A configuration value is either a literal, a template string, a variable
//! reference or a nested pipeline. Resolution is pure: it never performs I/O
//! and is safe to run speculatively for previews and static analysis.

mod path;
mod resolver;
mod template;
mod value;

pub use path::{PathSegment, VariablePath};
pub use resolver::{is_truthy, render_args, resolve, resolve_optional};
pub use template::{stringify, Template, TemplateEngine};
pub use value::{ConfigValue, ConfigValueError, TYPE_KEY, VALUE_KEY};
