//! Compiler - turns provider output into a validated step graph

use crate::context::{CompileContext, Manifest};
use crate::error::CompileError;
use crate::graph::StepGraph;
use crate::step::BoxedStep;
use anyhow::Result;

/// Translator from one configuration section to steps
///
/// Providers are stateless: everything they need comes from the
/// [`CompileContext`], and everything they produce is returned as steps.
pub trait Provider: Send + Sync {
    /// Stable provider name, also the first segment of its step IDs
    fn name(&self) -> &str;

    /// Emit the steps for this provider's section of the manifest
    ///
    /// Returning an empty list when the section is absent is expected.
    fn compile(&self, ctx: &CompileContext) -> Result<Vec<BoxedStep>>;
}

/// Registry of providers, run in registration order
#[derive(Default)]
pub struct Compiler {
    providers: Vec<Box<dyn Provider>>,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider; earlier providers claim step IDs first
    pub fn register_provider(&mut self, provider: impl Provider + 'static) {
        self.providers.push(Box::new(provider));
    }

    /// Builder-style variant of [`Compiler::register_provider`]
    pub fn with_provider(mut self, provider: impl Provider + 'static) -> Self {
        self.register_provider(provider);
        self
    }

    /// Names of the registered providers, in order
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Compile a manifest with a default context
    pub fn compile(&self, config: Manifest) -> Result<StepGraph, CompileError> {
        self.compile_with_context(&CompileContext::new(config))
    }

    /// Run every provider, assemble their steps and validate the result
    ///
    /// Any provider error, duplicate step ID, missing dependency or cycle
    /// aborts compilation; no partially built graph is returned.
    pub fn compile_with_context(&self, ctx: &CompileContext) -> Result<StepGraph, CompileError> {
        let mut graph = StepGraph::new();

        for provider in &self.providers {
            let name = provider.name();
            let steps = provider
                .compile(ctx)
                .map_err(|source| CompileError::Provider {
                    provider: name.to_string(),
                    source,
                })?;
            log::debug!("Provider {name} emitted {} steps", steps.len());

            for step in steps {
                let id = step.id().clone();
                graph
                    .add(step)
                    .map_err(|source| CompileError::DuplicateStep {
                        provider: name.to_string(),
                        id,
                        source,
                    })?;
            }
        }

        graph.validate()?;
        graph.topological_sort()?;
        log::debug!("Compiled {} steps from {} providers", graph.len(), self.providers.len());

        Ok(graph)
    }
}
