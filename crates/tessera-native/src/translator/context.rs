use crate::error::CodegenError;
use crate::translator::types::translate_scalar_type;
use cranelift_codegen::ir::Value;
use cranelift_frontend::{FunctionBuilder, Variable};
use rustc_hash::FxHashMap;
use tessera_ir::ScalarType;

/// What a name in the function body refers to.
#[derive(Debug, Clone, Copy)]
pub enum Binding {
    /// Scalar parameter, `Let` binding or loop variable.
    Scalar { var: Variable, ty: ScalarType },
    /// Buffer parameter: the data pointer from the entry block.
    Buffer { ptr: Value, dtype: ScalarType },
}

/// State kept while translating one function body.
///
/// Scopes are a stack: loop bodies push one, so loop variables and `Let`s
/// inside a loop shadow outer names only until the loop ends.
pub struct TranslationContext<'a> {
    function: &'a str,
    ret: Option<ScalarType>,
    scopes: Vec<FxHashMap<String, Binding>>,
    next_var: u32,
}

impl<'a> TranslationContext<'a> {
    pub fn new(function: &'a str, ret: Option<ScalarType>) -> Self {
        Self { function, ret, scopes: vec![FxHashMap::default()], next_var: 0 }
    }

    pub fn function_name(&self) -> &str {
        self.function
    }

    pub fn return_type(&self) -> Option<ScalarType> {
        self.ret
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn bind(&mut self, name: &str, binding: Binding) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), binding);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Binding> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name).copied())
    }

    /// Declares a fresh frontend variable of `ty`.
    pub fn new_variable(&mut self, builder: &mut FunctionBuilder, ty: ScalarType) -> Variable {
        let var = Variable::from_u32(self.next_var);
        self.next_var += 1;
        builder.declare_var(var, translate_scalar_type(ty));
        var
    }

    pub fn scalar(&self, name: &str) -> Result<(Variable, ScalarType), CodegenError> {
        match self.lookup(name) {
            Some(Binding::Scalar { var, ty }) => Ok((var, ty)),
            _ => Err(CodegenError::UnknownVariable {
                function: self.function.to_string(),
                var: name.to_string(),
            }),
        }
    }

    pub fn buffer(&self, name: &str) -> Result<(Value, ScalarType), CodegenError> {
        match self.lookup(name) {
            Some(Binding::Buffer { ptr, dtype }) => Ok((ptr, dtype)),
            _ => Err(CodegenError::UnknownBuffer {
                function: self.function.to_string(),
                buffer: name.to_string(),
            }),
        }
    }

    pub fn expect_type(&self, expected: ScalarType, found: ScalarType) -> Result<(), CodegenError> {
        if expected == found {
            Ok(())
        } else {
            Err(CodegenError::TypeMismatch { function: self.function.to_string(), expected, found })
        }
    }
}
