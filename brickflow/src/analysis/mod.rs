//! Static analyses over pipeline configurations.
//!
//! Every analysis is built on [`PipelineVisitor`], whose traversal order and
//! position paths match the executor's, so findings and trace errors land on
//! the exact invocation and field that produced them.

mod annotation;
mod mod_variables;
mod trace_errors;
mod validation;
mod visitor;

pub use annotation::{Annotation, AnnotationSeverity};
pub use mod_variables::{collect_mod_variable_names, ModVariableCollector};
pub use trace_errors::annotate_trace_errors;
pub use validation::{validate_pipeline, PipelineValidator};
pub use visitor::{visit_pipeline, walk_invocation, walk_pipeline, Ancestor, PipelineVisitor};
