use crate::config::{OptLevel, Pass};
use crate::error::NativeError;
use crate::host::build_isa;
use crate::unit::NativeUnit;
use cranelift_codegen::control::ControlPlane;
use cranelift_codegen::ir::Function;
use cranelift_codegen::isa::OwnedTargetIsa;
use cranelift_codegen::{CodegenResult, Context};

/// Runs Cranelift's optimization passes over every function of a unit, in place.
///
/// Failures are logged and leave the function as far as it got; they show
/// up when the unit is verified again.
pub struct ModuleOptimizer {
    isa: OwnedTargetIsa,
    level: OptLevel,
    passes: Vec<Pass>,
}

impl ModuleOptimizer {
    pub fn new(level: OptLevel, passes: Vec<Pass>) -> Result<Self, NativeError> {
        let isa = build_isa(level, false)?;
        Ok(Self { isa, level, passes })
    }

    pub fn apply(&self, unit: &mut NativeUnit) {
        let identifier = unit.identifier().to_string();
        for (id, func) in unit.module_mut().functions_mut() {
            let mut ctx = Context::for_function(std::mem::replace(func, Function::new()));
            if let Err(err) = self.run(&mut ctx) {
                log::warn!("optimizing u0:{} of `{}` failed: {}", id.as_u32(), identifier, err);
            }
            *func = ctx.func;
        }
        log::debug!("optimized `{}` at level {}", identifier, self.level);
    }

    fn run(&self, ctx: &mut Context) -> CodegenResult<()> {
        let isa = self.isa.as_ref();
        if self.passes.is_empty() {
            return ctx.optimize(isa, &mut ControlPlane::default());
        }
        for pass in &self.passes {
            match pass {
                Pass::Pipeline => ctx.optimize(isa, &mut ControlPlane::default())?,
                Pass::Unreachable => {
                    ctx.compute_cfg();
                    ctx.compute_domtree();
                    ctx.eliminate_unreachable_code(isa)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime_support;
    use crate::verify::verify_unit;

    #[test]
    fn test_optimized_unit_still_verifies() {
        for passes in [vec![], vec![Pass::Unreachable, Pass::Pipeline], vec![Pass::Pipeline]] {
            let optimizer = ModuleOptimizer::new(OptLevel::Speed, passes).unwrap();
            let mut unit = NativeUnit::new("opt", optimizer.isa.as_ref());
            runtime_support::load(&mut unit).unwrap();
            optimizer.apply(&mut unit);
            verify_unit(&unit, optimizer.isa.as_ref()).unwrap();
        }
    }
}
