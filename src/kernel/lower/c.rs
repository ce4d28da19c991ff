//! C lowering: one function per kernel, the batch loop under OpenMP.

use super::source::{constant_tables, signature, wrapper_function, wrapper_signature, Flavor, SourceWriter};
use super::KernelLowering;
use crate::compose::WrapperDefinition;
use crate::kernel::KernelDefinition;

pub struct CLowering;

impl CLowering {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CLowering {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelLowering for CLowering {
    fn target_name(&self) -> &str {
        "c"
    }

    fn lower(&self, kernel: &KernelDefinition) -> String {
        let mut out = constant_tables(kernel, Flavor::C);
        if !out.is_empty() {
            out.push(String::new());
        }
        out.push(SourceWriter::new(kernel, Flavor::C).function());
        out.join("\n")
    }

    fn declaration(&self, kernel: &KernelDefinition) -> String {
        format!("{};", signature(kernel, Flavor::C))
    }

    fn lower_wrapper(&self, wrapper: &WrapperDefinition) -> String {
        wrapper_function(wrapper, Flavor::C)
    }

    fn wrapper_declaration(&self, wrapper: &WrapperDefinition) -> String {
        format!("{};", wrapper_signature(wrapper, Flavor::C))
    }

    fn comment(&self, text: &str) -> String {
        format!("/* {} */", text)
    }

    fn preamble(&self, _kernels: &[&KernelDefinition]) -> String {
        "#include <math.h>".to_string()
    }
}
