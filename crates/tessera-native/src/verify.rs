//! Verification of native units.
//!
//! Every function goes through Cranelift's IR verifier. On top of that the
//! unit is checked for consistency between function bodies and the
//! declaration table they are written against.

use crate::error::VerifyError;
use crate::unit::NativeUnit;
use cranelift_codegen::ir::{ExternalName, Function};
use cranelift_codegen::isa::TargetIsa;
use cranelift_codegen::print_errors::pretty_verifier_error;

pub fn verify_function(name: &str, func: &Function, isa: &dyn TargetIsa) -> Result<(), VerifyError> {
    cranelift_codegen::verifier::verify_function(func, isa).map_err(|errors| VerifyError::Function {
        name: name.to_string(),
        report: pretty_verifier_error(func, None, errors),
    })
}

/// Verifies every function of `unit` and its references into the declaration table.
pub fn verify_unit(unit: &NativeUnit, isa: &dyn TargetIsa) -> Result<(), VerifyError> {
    let decls = unit.context();
    for (id, func) in unit.module().functions() {
        let name = &decls.decl(id).name;
        verify_function(name, func, isa)?;

        for ext in func.dfg.ext_funcs.values() {
            let ExternalName::User(name_ref) = ext.name else {
                continue;
            };
            let user = &func.params.user_named_funcs()[name_ref];
            let callee = match decls.try_decl(user.index) {
                Some(decl) if user.namespace == 0 => decl,
                _ => {
                    return Err(VerifyError::DanglingReference {
                        function: name.clone(),
                        index: user.index,
                    })
                }
            };
            if func.dfg.signatures[ext.signature] != callee.signature {
                return Err(VerifyError::CallSignature {
                    function: name.clone(),
                    callee: callee.name.clone(),
                });
            }
        }
    }

    for (id, decl) in decls.decls() {
        if decl.kind.is_defined_here() && unit.module().function(id).is_none() {
            return Err(VerifyError::MissingDefinition(decl.name.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptLevel;
    use crate::host::build_isa;
    use crate::unit::DeclKind;
    use cranelift_codegen::ir::{types, InstBuilder};
    use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};

    #[test]
    fn test_wrong_return_type_is_reported() {
        let isa = build_isa(OptLevel::None, false).unwrap();
        let mut unit = NativeUnit::new("bad", isa.as_ref());
        let sig = unit.context().make_signature(&[], Some(types::I64));
        let id = unit.declare("f", DeclKind::Export, sig).unwrap();
        let mut func = unit.context().new_function(id);
        {
            let mut fctx = FunctionBuilderContext::new();
            let mut b = FunctionBuilder::new(&mut func, &mut fctx);
            let entry = b.create_block();
            b.switch_to_block(entry);
            b.seal_block(entry);
            let v = b.ins().f32const(1.0);
            b.ins().return_(&[v]);
            b.finalize();
        }
        unit.define(id, func).unwrap();
        let err = verify_unit(&unit, isa.as_ref()).unwrap_err();
        assert!(matches!(err, VerifyError::Function { ref name, .. } if name == "f"));
    }

    #[test]
    fn test_declared_but_undefined_is_reported() {
        let isa = build_isa(OptLevel::None, false).unwrap();
        let mut unit = NativeUnit::new("m", isa.as_ref());
        let sig = unit.context().make_signature(&[], None);
        unit.declare("ghost", DeclKind::Export, sig).unwrap();
        assert_eq!(
            verify_unit(&unit, isa.as_ref()),
            Err(VerifyError::MissingDefinition("ghost".to_string()))
        );
    }
}
