//! Shader Module Cache
//!
//! Backend shader modules keyed by the xxh3-128 of their final text, and
//! [`ShaderProgram`]s (the modules of one processed shader) keyed by the
//! processed shader's content key. Program ids are interned from that content
//! key, so they stay stable when the cache is rebuilt after device loss.
//!
//! Compiler messages arrive asynchronously. Each new module spawns a task on
//! the device's local executor that logs them with source context.

use std::rc::Rc;

use futures::executor::LocalSpawner;
use futures::task::LocalSpawnExt;
use rustc_hash::FxHashMap;
use xxhash_rust::xxh3::xxh3_128;

use crate::device::backend::GpuBackend;
use crate::shader::diagnostics::log_messages;
use crate::shader::{ProcessedShader, ProcessedStages};
use crate::utils::KeyInterner;

/// Compiled stages of one processed shader.
pub enum ProgramStages<B: GpuBackend> {
    Render {
        vertex: B::ShaderModule,
        fragment: B::ShaderModule,
    },
    Compute {
        compute: B::ShaderModule,
    },
}

pub struct ShaderProgram<B: GpuBackend> {
    id: u32,
    name: String,
    stages: ProgramStages<B>,
}

impl<B: GpuBackend> ShaderProgram<B> {
    /// Content-derived identity used in pipeline keys.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn stages(&self) -> &ProgramStages<B> {
        &self.stages
    }
}

pub struct ShaderModuleCache<B: GpuBackend> {
    modules: FxHashMap<u128, B::ShaderModule>,
    programs: FxHashMap<u128, Rc<ShaderProgram<B>>>,
    context_lines: usize,
}

impl<B: GpuBackend> ShaderModuleCache<B> {
    #[must_use]
    pub fn new(context_lines: usize) -> Self {
        Self {
            modules: FxHashMap::default(),
            programs: FxHashMap::default(),
            context_lines,
        }
    }

    /// Module compiled from `source`, created on first request.
    pub fn module(
        &mut self,
        backend: &B,
        label: &str,
        source: &str,
        spawner: &LocalSpawner,
    ) -> B::ShaderModule {
        let hash = xxh3_128(source.as_bytes());
        if let Some(module) = self.modules.get(&hash) {
            return module.clone();
        }

        log::debug!("Compiling shader module '{label}' ({hash:032x})");
        let module = backend.create_shader_module(label, source);

        let messages = backend.compilation_messages(&module);
        let label = label.to_string();
        let source = source.to_string();
        let context = self.context_lines;
        let report = async move {
            let messages = messages.await;
            if !messages.is_empty() {
                log_messages(&label, &source, &messages, context);
            }
        };
        if let Err(err) = spawner.spawn_local(report) {
            log::error!("Failed to schedule shader diagnostics: {err}");
        }

        self.modules.insert(hash, module.clone());
        module
    }

    /// Program of a processed shader, compiling missing modules.
    pub fn program(
        &mut self,
        backend: &B,
        keys: &mut KeyInterner,
        name: &str,
        processed: &ProcessedShader,
        spawner: &LocalSpawner,
    ) -> Rc<ShaderProgram<B>> {
        let content_key = processed.content_key();
        if let Some(program) = self.programs.get(&content_key) {
            return Rc::clone(program);
        }

        let stages = match &processed.stages {
            ProcessedStages::Render { vertex, fragment } => ProgramStages::Render {
                vertex: self.module(backend, &format!("{name} (vertex)"), vertex, spawner),
                fragment: self.module(backend, &format!("{name} (fragment)"), fragment, spawner),
            },
            ProcessedStages::Compute { compute } => ProgramStages::Compute {
                compute: self.module(backend, &format!("{name} (compute)"), compute, spawner),
            },
        };
        let program = Rc::new(ShaderProgram {
            id: keys.intern(&format!("program:{content_key:032x}")),
            name: name.to_string(),
            stages,
        });
        self.programs.insert(content_key, Rc::clone(&program));
        program
    }

    #[must_use]
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    pub fn clear(&mut self) {
        self.modules.clear();
        self.programs.clear();
    }
}
