//! Host target bootstrap.
//!
//! Probing the host is done once per process no matter how many engines are
//! created; every engine then builds its own ISA from the recorded result.

use crate::config::OptLevel;
use crate::error::NativeError;
use cranelift_codegen::ir::types;
use cranelift_codegen::isa::OwnedTargetIsa;
use cranelift_codegen::settings::{self, Configurable};
use std::sync::OnceLock;

/// What the one-time probe learned about the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTarget {
    pub triple: String,
}

static HOST: OnceLock<Result<HostTarget, String>> = OnceLock::new();

/// Initializes native code generation for the host. Idempotent.
///
/// Fails if Cranelift has no backend for the host or the host pointer type
/// is not 64 bits wide (generated buffer code assumes `i64` pointers).
pub fn initialize() -> Result<&'static HostTarget, NativeError> {
    HOST.get_or_init(probe)
        .as_ref()
        .map_err(|msg| NativeError::UnsupportedHost(msg.clone()))
}

fn probe() -> Result<HostTarget, String> {
    let isa = build_isa(OptLevel::None, false).map_err(|e| e.to_string())?;
    if isa.pointer_type() != types::I64 {
        return Err(format!("pointer type is {}, expected i64", isa.pointer_type()));
    }
    let triple = isa.triple().to_string();
    log::info!("initialized native target {}", triple);
    Ok(HostTarget { triple })
}

/// Builds a host ISA with the given optimization level.
///
/// Calls are never colocated and code is not PIC: the JIT patches absolute
/// addresses into the loaded code.
pub fn build_isa(opt_level: OptLevel, enable_verifier: bool) -> Result<OwnedTargetIsa, NativeError> {
    let mut flag_builder = settings::builder();
    flag_builder.set("use_colocated_libcalls", "false")?;
    flag_builder.set("is_pic", "false")?;
    flag_builder.set("opt_level", opt_level.as_setting())?;
    flag_builder.set("enable_verifier", if enable_verifier { "true" } else { "false" })?;
    let flags = settings::Flags::new(flag_builder);

    let isa_builder = cranelift_native::builder()
        .map_err(|e| NativeError::IsaSetupError(format!("Host target lookup failed: {}", e)))?;
    isa_builder
        .finish(flags)
        .map_err(|e| NativeError::IsaSetupError(format!("ISA construction failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_is_idempotent() {
        let first = initialize().unwrap();
        let second = initialize().unwrap();
        assert!(std::ptr::eq(first, second));
        assert!(!first.triple.is_empty());
    }

    #[test]
    fn test_isa_carries_opt_level() {
        let isa = build_isa(OptLevel::SpeedAndSize, true).unwrap();
        assert_eq!(isa.flags().opt_level(), settings::OptLevel::SpeedAndSize);
        assert!(isa.flags().enable_verifier());
        assert!(!isa.flags().is_pic());
    }
}
