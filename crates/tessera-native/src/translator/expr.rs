use crate::error::CodegenError;
use crate::translator::context::TranslationContext;
use crate::translator::types::translate_scalar_type;
use crate::unit::{DeclKind, NativeContext};
use cranelift_codegen::ir::condcodes::{FloatCC, IntCC};
use cranelift_codegen::ir::{types, InstBuilder, MemFlags, Value};
use cranelift_frontend::FunctionBuilder;
use tessera_ir::{BinaryOp, CmpOp, Expr, ScalarType};

/// Translates an expression, returning its value and scalar type.
pub fn translate_expr(
    builder: &mut FunctionBuilder,
    ctx: &mut TranslationContext,
    decls: &mut NativeContext,
    expr: &Expr,
) -> Result<(Value, ScalarType), CodegenError> {
    match expr {
        Expr::IntImm { value, ty } => {
            if ty.is_float() {
                return Err(CodegenError::TypeMismatch {
                    function: ctx.function_name().to_string(),
                    expected: ScalarType::I64,
                    found: *ty,
                });
            }
            Ok((builder.ins().iconst(translate_scalar_type(*ty), *value), *ty))
        }
        Expr::FloatImm { value, ty } => {
            let v = match ty {
                ScalarType::F32 => builder.ins().f32const(*value as f32),
                ScalarType::F64 => builder.ins().f64const(*value),
                other => {
                    return Err(CodegenError::TypeMismatch {
                        function: ctx.function_name().to_string(),
                        expected: ScalarType::F64,
                        found: *other,
                    })
                }
            };
            Ok((v, *ty))
        }
        Expr::Var(name) => {
            let (var, ty) = ctx.scalar(name)?;
            Ok((builder.use_var(var), ty))
        }
        Expr::Load { buffer, index } => {
            let (addr, dtype) = element_address(builder, ctx, decls, buffer, index)?;
            let v = builder.ins().load(translate_scalar_type(dtype), MemFlags::trusted(), addr, 0);
            Ok((v, dtype))
        }
        Expr::Binary { op, lhs, rhs } => {
            let (l, lty) = translate_expr(builder, ctx, decls, lhs)?;
            let (r, rty) = translate_expr(builder, ctx, decls, rhs)?;
            ctx.expect_type(lty, rty)?;
            Ok((translate_binary(builder, *op, lty, l, r), lty))
        }
        Expr::Select { cmp, lhs, rhs, then, otherwise } => {
            let (l, lty) = translate_expr(builder, ctx, decls, lhs)?;
            let (r, rty) = translate_expr(builder, ctx, decls, rhs)?;
            ctx.expect_type(lty, rty)?;
            let cond = translate_compare(builder, *cmp, lty, l, r);
            let (t, tty) = translate_expr(builder, ctx, decls, then)?;
            let (e, ety) = translate_expr(builder, ctx, decls, otherwise)?;
            ctx.expect_type(tty, ety)?;
            Ok((builder.ins().select(cond, t, e), tty))
        }
        Expr::Cast { value, to } => {
            let (v, from) = translate_expr(builder, ctx, decls, value)?;
            Ok((translate_cast(builder, v, from, *to), *to))
        }
        Expr::Call { callee, args, ret } => {
            let mut values = Vec::with_capacity(args.len());
            let mut params = Vec::with_capacity(args.len());
            for arg in args {
                let (v, ty) = translate_expr(builder, ctx, decls, arg)?;
                values.push(v);
                params.push(translate_scalar_type(ty));
            }
            let sig = decls.make_signature(&params, Some(translate_scalar_type(*ret)));
            let id = decls.declare(callee, DeclKind::Import, sig)?;
            let func_ref = decls.declare_func_in_func(id, builder.func);
            let call = builder.ins().call(func_ref, &values);
            Ok((builder.inst_results(call)[0], *ret))
        }
    }
}

/// Address of element `index` of `buffer`, plus the buffer's element type.
pub fn element_address(
    builder: &mut FunctionBuilder,
    ctx: &mut TranslationContext,
    decls: &mut NativeContext,
    buffer: &str,
    index: &Expr,
) -> Result<(Value, ScalarType), CodegenError> {
    let (base, dtype) = ctx.buffer(buffer)?;
    let (idx, idx_ty) = translate_expr(builder, ctx, decls, index)?;
    let idx = match idx_ty {
        ScalarType::I64 => idx,
        ScalarType::I32 => builder.ins().sextend(types::I64, idx),
        found => {
            return Err(CodegenError::NonIntegerIndex {
                function: ctx.function_name().to_string(),
                buffer: buffer.to_string(),
                found,
            })
        }
    };
    let offset = builder.ins().imul_imm(idx, dtype.size_bytes() as i64);
    Ok((builder.ins().iadd(base, offset), dtype))
}

fn translate_binary(builder: &mut FunctionBuilder, op: BinaryOp, ty: ScalarType, l: Value, r: Value) -> Value {
    let ins = builder.ins();
    if ty.is_float() {
        match op {
            BinaryOp::Add => ins.fadd(l, r),
            BinaryOp::Sub => ins.fsub(l, r),
            BinaryOp::Mul => ins.fmul(l, r),
            BinaryOp::Div => ins.fdiv(l, r),
            BinaryOp::Min => ins.fmin(l, r),
            BinaryOp::Max => ins.fmax(l, r),
        }
    } else {
        match op {
            BinaryOp::Add => ins.iadd(l, r),
            BinaryOp::Sub => ins.isub(l, r),
            BinaryOp::Mul => ins.imul(l, r),
            BinaryOp::Div => ins.sdiv(l, r),
            BinaryOp::Min => ins.smin(l, r),
            BinaryOp::Max => ins.smax(l, r),
        }
    }
}

fn translate_compare(builder: &mut FunctionBuilder, cmp: CmpOp, ty: ScalarType, l: Value, r: Value) -> Value {
    if ty.is_float() {
        let cc = match cmp {
            CmpOp::Eq => FloatCC::Equal,
            CmpOp::Ne => FloatCC::NotEqual,
            CmpOp::Lt => FloatCC::LessThan,
            CmpOp::Le => FloatCC::LessThanOrEqual,
            CmpOp::Gt => FloatCC::GreaterThan,
            CmpOp::Ge => FloatCC::GreaterThanOrEqual,
        };
        builder.ins().fcmp(cc, l, r)
    } else {
        let cc = match cmp {
            CmpOp::Eq => IntCC::Equal,
            CmpOp::Ne => IntCC::NotEqual,
            CmpOp::Lt => IntCC::SignedLessThan,
            CmpOp::Le => IntCC::SignedLessThanOrEqual,
            CmpOp::Gt => IntCC::SignedGreaterThan,
            CmpOp::Ge => IntCC::SignedGreaterThanOrEqual,
        };
        builder.ins().icmp(cc, l, r)
    }
}

/// Numeric conversion. Float to int saturates instead of trapping.
pub fn translate_cast(builder: &mut FunctionBuilder, v: Value, from: ScalarType, to: ScalarType) -> Value {
    let to_ty = translate_scalar_type(to);
    match (from, to) {
        _ if from == to => v,
        (ScalarType::I32, ScalarType::I64) => builder.ins().sextend(to_ty, v),
        (ScalarType::I64, ScalarType::I32) => builder.ins().ireduce(to_ty, v),
        (ScalarType::F32, ScalarType::F64) => builder.ins().fpromote(to_ty, v),
        (ScalarType::F64, ScalarType::F32) => builder.ins().fdemote(to_ty, v),
        (f, _) if f.is_int() => builder.ins().fcvt_from_sint(to_ty, v),
        _ => builder.ins().fcvt_to_sint_sat(to_ty, v),
    }
}
