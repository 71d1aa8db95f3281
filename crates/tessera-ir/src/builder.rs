use crate::ir::{Buffer, Function, Module, Param, Stmt};
use crate::types::ScalarType;
use rustc_hash::FxHashSet;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("buffer `{0}` is declared more than once")]
    DuplicateBuffer(String),

    #[error("function `{0}` is defined more than once")]
    DuplicateFunction(String),

    #[error("function `{function}` has two parameters named `{param}`")]
    DuplicateParam { function: String, param: String },
}

/// Incrementally assembles a [`Module`].
///
/// Only name uniqueness is checked here; everything else (unknown buffers,
/// type mismatches) is reported when the backend lowers the module.
#[derive(Debug)]
pub struct ModuleBuilder {
    module: Module,
}

impl ModuleBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { module: Module::new(name) }
    }

    pub fn buffer(mut self, buffer: Buffer) -> Self {
        self.module.buffers.push(buffer);
        self
    }

    pub fn function(mut self, function: Function) -> Self {
        self.module.functions.push(function);
        self
    }

    pub fn build(self) -> Result<Module, BuildError> {
        let mut buffers = FxHashSet::default();
        for buffer in &self.module.buffers {
            if !buffers.insert(buffer.name.as_str()) {
                return Err(BuildError::DuplicateBuffer(buffer.name.clone()));
            }
        }
        let mut functions = FxHashSet::default();
        for function in &self.module.functions {
            if !functions.insert(function.name.as_str()) {
                return Err(BuildError::DuplicateFunction(function.name.clone()));
            }
            let mut params = FxHashSet::default();
            for param in &function.params {
                if !params.insert(param.name.as_str()) {
                    return Err(BuildError::DuplicateParam {
                        function: function.name.clone(),
                        param: param.name.clone(),
                    });
                }
            }
        }
        Ok(self.module)
    }
}

/// Builder for a single [`Function`].
#[derive(Debug)]
pub struct FunctionBuilder {
    function: Function,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            function: Function { name: name.into(), params: Vec::new(), ret: None, body: Vec::new() },
        }
    }

    pub fn param(mut self, param: Param) -> Self {
        self.function.params.push(param);
        self
    }

    pub fn returns(mut self, ty: ScalarType) -> Self {
        self.function.ret = Some(ty);
        self
    }

    pub fn stmt(mut self, stmt: Stmt) -> Self {
        self.function.body.push(stmt);
        self
    }

    pub fn build(self) -> Function {
        self.function
    }
}
