//! KernelLowering: turns kernel definitions into target source text.
//!
//! Lowering is a pure function of the definition. Each backend also
//! produces the declaration header of a kernel and of the wrapper that
//! calls a composed sequence of kernels.
//!
//! - `loopy` — the loop-IR text handed to the external kernel compiler
//! - `c` — sequential C with an OpenMP batch loop
//! - `opencl` — OpenCL C, one work-item per condition or per lane

mod c;
mod loopy;
mod opencl;
mod source;

use crate::compose::WrapperDefinition;
use crate::config::Lang;
use crate::ir::DType;
use crate::kernel::KernelDefinition;

pub use c::CLowering;
pub use loopy::LoopyLowering;
pub use opencl::OpenClLowering;

/// Lowers kernel definitions into source text for one target.
pub trait KernelLowering {
    /// The target name (e.g. "loopy", "c", "opencl").
    fn target_name(&self) -> &str;

    /// Complete source of one kernel.
    fn lower(&self, kernel: &KernelDefinition) -> String;

    /// Declaration of one kernel's signature.
    fn declaration(&self, kernel: &KernelDefinition) -> String;

    /// The wrapper calling a composed sequence of kernels.
    fn lower_wrapper(&self, wrapper: &WrapperDefinition) -> String;

    fn wrapper_declaration(&self, wrapper: &WrapperDefinition) -> String;

    /// A one-line comment in the target syntax.
    fn comment(&self, text: &str) -> String;

    /// Program-level text placed before every kernel.
    fn preamble(&self, _kernels: &[&KernelDefinition]) -> String {
        String::new()
    }
}

/// Create a kernel-lowering backend for the given target name.
pub fn create_kernel_lowering(target: &str) -> Option<Box<dyn KernelLowering>> {
    match target {
        "loopy" | "ir" => Some(Box::new(LoopyLowering::new())),
        "c" => Some(Box::new(CLowering::new())),
        "opencl" | "cl" => Some(Box::new(OpenClLowering::new())),
        _ => None,
    }
}

/// The source backend for a configured language.
pub fn lowering_for(lang: Lang) -> Box<dyn KernelLowering> {
    match lang {
        Lang::C => Box::new(CLowering::new()),
        Lang::OpenCl => Box::new(OpenClLowering::new()),
    }
}

/// C spelling of an element type, shared by host code.
pub fn source_type(dtype: DType) -> &'static str {
    source::ctype(dtype)
}
