use crate::unit::NativeContext;
use cranelift_codegen::ir::{types, Signature, Type};
use tessera_ir::{Function as IrFunction, ParamKind, ScalarType};

/// Translates a scalar type into a Cranelift IR type.
pub fn translate_scalar_type(ty: ScalarType) -> Type {
    match ty {
        ScalarType::I32 => types::I32,
        ScalarType::I64 => types::I64,
        ScalarType::F32 => types::F32,
        ScalarType::F64 => types::F64,
    }
}

/// Native signature of a function: scalars by value, buffers as data pointers.
pub fn translate_signature(ctx: &NativeContext, function: &IrFunction) -> Signature {
    let params: Vec<Type> = function
        .params
        .iter()
        .map(|p| match p.kind {
            ParamKind::Scalar(ty) => translate_scalar_type(ty),
            ParamKind::Buffer(_) => ctx.pointer_type(),
        })
        .collect();
    ctx.make_signature(&params, function.ret.map(translate_scalar_type))
}
