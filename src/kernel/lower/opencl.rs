//! OpenCL lowering.
//!
//! Kernels become plain device functions; only the composed wrapper is a
//! `__kernel`. The batch index comes from the global id, or from the group
//! and local ids when a loop is split onto lanes.

use super::source::{
    constant_tables, signature, uses_atomics, wrapper_function, wrapper_signature, Flavor,
    SourceWriter,
};
use super::KernelLowering;
use crate::compose::WrapperDefinition;
use crate::kernel::KernelDefinition;

const ATOMIC_ADD: &str = "\
void atomic_add_f64(__global double *addr, double delta)
{
    union { ulong u; double f; } old, next;
    do {
        old.f = *addr;
        next.f = old.f + delta;
    } while (atom_cmpxchg((volatile __global ulong *)addr, old.u, next.u) != old.u);
}";

pub struct OpenClLowering;

impl OpenClLowering {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OpenClLowering {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelLowering for OpenClLowering {
    fn target_name(&self) -> &str {
        "opencl"
    }

    fn lower(&self, kernel: &KernelDefinition) -> String {
        let mut out = constant_tables(kernel, Flavor::OpenCl);
        if !out.is_empty() {
            out.push(String::new());
        }
        out.push(SourceWriter::new(kernel, Flavor::OpenCl).function());
        out.join("\n")
    }

    fn declaration(&self, kernel: &KernelDefinition) -> String {
        format!("{};", signature(kernel, Flavor::OpenCl))
    }

    fn lower_wrapper(&self, wrapper: &WrapperDefinition) -> String {
        wrapper_function(wrapper, Flavor::OpenCl)
    }

    fn wrapper_declaration(&self, wrapper: &WrapperDefinition) -> String {
        format!("{};", wrapper_signature(wrapper, Flavor::OpenCl))
    }

    fn comment(&self, text: &str) -> String {
        format!("// {}", text)
    }

    fn preamble(&self, kernels: &[&KernelDefinition]) -> String {
        let mut lines = vec!["#pragma OPENCL EXTENSION cl_khr_fp64 : enable".to_string()];
        if kernels.iter().any(|k| uses_atomics(k)) {
            lines.push("#pragma OPENCL EXTENSION cl_khr_int64_base_atomics : enable".to_string());
            lines.push(String::new());
            lines.push(ATOMIC_ADD.to_string());
        }
        lines.join("\n")
    }
}
