use crate::error::CodegenError;
use crate::runtime_support::{BUFFER_BYTES, BUFFER_MALLOC, ROUND_UP};
use crate::unit::{DeclId, DeclKind, NativeUnit};
use cranelift_codegen::ir::{types, InstBuilder};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use tessera_ir::{Buffer, BUFFER_ALIGNMENT};

/// Emits `<buffer>_create() -> ptr`, which allocates zeroed storage for the buffer.
///
/// ```text
/// bytes = tessera_buffer_bytes(numel, elem_size)
/// size  = tessera_round_up(bytes, 64)
/// ptr   = tessera_buffer_malloc(size, 64)
/// ```
pub fn translate_buffer(
    builder_ctx: &mut FunctionBuilderContext,
    unit: &mut NativeUnit,
    buffer: &Buffer,
) -> Result<DeclId, CodegenError> {
    // The rounded size must still be a valid allocation layout.
    let fits = buffer
        .size_bytes()
        .and_then(|bytes| bytes.checked_next_multiple_of(BUFFER_ALIGNMENT))
        .is_some_and(|size| size <= isize::MAX as usize);
    let numel = match buffer.numel() {
        Some(numel) if fits => numel,
        _ => return Err(CodegenError::BufferTooLarge(buffer.name.clone())),
    };

    let helper = |name: &str| {
        unit.context()
            .local(name)
            .ok_or_else(|| CodegenError::MissingRuntimeSupport(name.to_string()))
    };
    let bytes_id = helper(BUFFER_BYTES)?;
    let round_up_id = helper(ROUND_UP)?;

    let ptr_ty = unit.context().pointer_type();
    let malloc_sig = unit.context().make_signature(&[ptr_ty, ptr_ty], Some(ptr_ty));
    let malloc_id = unit.declare(BUFFER_MALLOC, DeclKind::Import, malloc_sig)?;

    let ctor_sig = unit.context().make_signature(&[], Some(ptr_ty));
    let id = unit.declare(&buffer.constructor_name(), DeclKind::Export, ctor_sig)?;

    let mut func = unit.context().new_function(id);
    let bytes_ref = unit.context().declare_func_in_func(bytes_id, &mut func);
    let round_up_ref = unit.context().declare_func_in_func(round_up_id, &mut func);
    let malloc_ref = unit.context().declare_func_in_func(malloc_id, &mut func);

    {
        let mut builder = FunctionBuilder::new(&mut func, builder_ctx);
        let entry_block = builder.create_block();
        builder.switch_to_block(entry_block);
        builder.seal_block(entry_block);

        let numel = builder.ins().iconst(types::I64, numel as i64);
        let elem_size = builder.ins().iconst(types::I64, buffer.dtype.size_bytes() as i64);
        let call = builder.ins().call(bytes_ref, &[numel, elem_size]);
        let bytes = builder.inst_results(call)[0];

        let align = builder.ins().iconst(types::I64, BUFFER_ALIGNMENT as i64);
        let call = builder.ins().call(round_up_ref, &[bytes, align]);
        let size = builder.inst_results(call)[0];

        let call = builder.ins().call(malloc_ref, &[size, align]);
        let ptr = builder.inst_results(call)[0];
        builder.ins().return_(&[ptr]);
        builder.finalize();
    }

    log::trace!("buffer constructor `{}`:\n{}", buffer.constructor_name(), func.display());
    unit.define(id, func)?;
    Ok(id)
}
