//! Built-in helpers every unit starts with.
//!
//! The helpers are CLIF text parsed into each fresh unit as local functions,
//! so they are compiled with the module and never clash across units.

use crate::error::RuntimeSupportError;
use crate::unit::{DeclKind, NativeUnit};
use cranelift_codegen::ir::UserFuncName;

/// `bytes = numel * elem_size`.
pub const BUFFER_BYTES: &str = "tessera_buffer_bytes";
/// `round_up(n, align)` for a power-of-two `align`.
pub const ROUND_UP: &str = "tessera_round_up";
/// Runtime allocation kernel, resolved through the symbol registry.
pub const BUFFER_MALLOC: &str = "tessera_buffer_malloc";

pub const RUNTIME_SUPPORT: &str = r#"
function %tessera_buffer_bytes(i64, i64) -> i64 {
block0(v0: i64, v1: i64):
    v2 = imul v0, v1
    return v2
}

function %tessera_round_up(i64, i64) -> i64 {
block0(v0: i64, v1: i64):
    v2 = iadd v0, v1
    v3 = iadd_imm v2, -1
    v4 = ineg v1
    v5 = band v3, v4
    return v5
}
"#;

/// Parses [`RUNTIME_SUPPORT`] into `unit`.
pub fn load(unit: &mut NativeUnit) -> Result<(), RuntimeSupportError> {
    load_text(unit, RUNTIME_SUPPORT)
}

/// Parses CLIF `text` and adds every function in it to `unit` as a local.
///
/// Functions are renamed to their declaration index and switched to the
/// unit's calling convention. Their names live in the unit's local table,
/// so user functions may reuse them.
pub fn load_text(unit: &mut NativeUnit, text: &str) -> Result<(), RuntimeSupportError> {
    let functions = cranelift_reader::parse_functions(text)?;
    for mut func in functions {
        let name = func.name.to_string().trim_start_matches('%').to_string();
        func.signature.call_conv = unit.context().call_conv();
        let id = unit.declare(&name, DeclKind::Local, func.signature.clone())?;
        func.name = UserFuncName::user(0, id.as_u32());
        unit.define(id, func)?;
        log::trace!("runtime support `{}` loaded as u0:{}", name, id.as_u32());
    }
    Ok(())
}
