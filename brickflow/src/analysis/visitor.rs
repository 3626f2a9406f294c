//! Depth-first pipeline traversal.

use crate::pipeline::{BrickInvocation, Pipeline, PositionPath};

/// An enclosing invocation on the path from the root to a visited one.
#[derive(Debug, Clone)]
pub struct Ancestor<'a> {
    /// The enclosing invocation.
    pub invocation: &'a BrickInvocation,
    /// Its position.
    pub position: PositionPath,
    /// The configuration field holding the nested pipeline (e.g. `if`).
    pub field: String,
}

/// Hooks called while walking a pipeline tree.
///
/// Override [`PipelineVisitor::visit_invocation`] to inspect invocations.
/// Overriding [`PipelineVisitor::visit_pipeline`] without calling
/// [`walk_pipeline`] prunes the subtree.
pub trait PipelineVisitor<'a> {
    /// Called for every invocation before its nested pipelines are walked.
    fn visit_invocation(
        &mut self,
        invocation: &'a BrickInvocation,
        position: &PositionPath,
        ancestors: &[Ancestor<'a>],
    );

    /// Called for every pipeline, including the root.
    fn visit_pipeline(
        &mut self,
        pipeline: &'a Pipeline,
        position: &PositionPath,
        ancestors: &[Ancestor<'a>],
    ) {
        walk_pipeline(self, pipeline, position, ancestors);
    }
}

/// Visits every invocation of a pipeline and, depth first, its nested
/// pipelines.
pub fn walk_pipeline<'a, V>(
    visitor: &mut V,
    pipeline: &'a Pipeline,
    position: &PositionPath,
    ancestors: &[Ancestor<'a>],
) where
    V: PipelineVisitor<'a> + ?Sized,
{
    for (index, invocation) in pipeline.invocations().iter().enumerate() {
        let position = position.child_index(index);
        visitor.visit_invocation(invocation, &position, ancestors);
        walk_invocation(visitor, invocation, &position, ancestors);
    }
}

/// Visits the nested pipelines of one invocation in configuration order.
pub fn walk_invocation<'a, V>(
    visitor: &mut V,
    invocation: &'a BrickInvocation,
    position: &PositionPath,
    ancestors: &[Ancestor<'a>],
) where
    V: PipelineVisitor<'a> + ?Sized,
{
    for (field, pipeline) in invocation.nested_pipelines() {
        let mut chain = ancestors.to_vec();
        chain.push(Ancestor {
            invocation,
            position: position.clone(),
            field: field.clone(),
        });
        visitor.visit_pipeline(pipeline, &position.join_field(&field), &chain);
    }
}

/// Walks a top-level pipeline.
pub fn visit_pipeline<'a, V>(visitor: &mut V, pipeline: &'a Pipeline)
where
    V: PipelineVisitor<'a> + ?Sized,
{
    visitor.visit_pipeline(pipeline, &PositionPath::root(), &[]);
}
