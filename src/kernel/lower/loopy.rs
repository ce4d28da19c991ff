//! Loop-IR text for the external polyhedral kernel compiler.
//!
//! ```text
//! kernel simple_a_only
//! domains:
//!     {[j]: 0 <= j < n}
//!     {[i]: 0 <= i < 4}
//! args:
//!     global int32 n (read-only)
//!     global float64[n, 4] kf
//! temporaries:
//!     global float64[4] A (read-only) = [1.0, 2.0, 3.0, 4.0]
//! instructions:
//!     for j
//!         for i
//!             <int32> pos = i {id=map_pos}
//!             <int32> idx = i {id=map_idx}
//!             kf[j, idx] = A[pos]
//!         end
//!     end
//! ```

use super::KernelLowering;
use crate::compose::{BarrierKind, WrapperDefinition, WrapperStep};
use crate::config::MemoryLayout;
use crate::ir::expr::format_float;
use crate::ir::stmt::render_loopy;
use crate::ir::{ArgDecl, Initializer, LoopyDialect};
use crate::kernel::KernelDefinition;

pub struct LoopyLowering;

impl LoopyLowering {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LoopyLowering {
    fn default() -> Self {
        Self::new()
    }
}

fn arg_line(decl: &ArgDecl, layout: MemoryLayout) -> String {
    let mut line = decl.to_string();
    if decl.shape.len() > 1 && layout == MemoryLayout::ColumnMajor {
        line.push_str(" order=F");
    }
    line
}

fn temporary_line(decl: &ArgDecl) -> String {
    let mut line = format!("{} {} {}", decl.scope, decl.signature(), decl.name);
    if decl.read_only {
        line.push_str(" (read-only)");
    }
    if let Some(init) = &decl.initializer {
        let values: Vec<String> = match init {
            Initializer::F64(v) => v.iter().map(|x| format_float(*x)).collect(),
            Initializer::I32(v) => v.iter().map(|x| x.to_string()).collect(),
        };
        line.push_str(&format!(" = [{}]", values.join(", ")));
    }
    line
}

impl KernelLowering for LoopyLowering {
    fn target_name(&self) -> &str {
        "loopy"
    }

    fn lower(&self, kernel: &KernelDefinition) -> String {
        let mut out = vec![format!("kernel {}", kernel.name), "domains:".to_string()];
        for domain in &kernel.domains {
            out.push(format!("    {}", domain.to_set()));
        }
        out.push("args:".to_string());
        for arg in &kernel.args {
            out.push(format!("    {}", arg_line(arg, kernel.layout)));
        }
        if !kernel.temporaries.is_empty() {
            out.push("temporaries:".to_string());
            for temp in &kernel.temporaries {
                out.push(format!("    {}", temporary_line(temp)));
            }
        }
        if !kernel.assumptions.is_empty() {
            out.push("assumptions:".to_string());
            for assumption in &kernel.assumptions {
                out.push(format!("    {}", assumption));
            }
        }
        if !kernel.parameters.is_empty() {
            out.push("parameters:".to_string());
            for (name, value) in &kernel.parameters {
                out.push(format!("    {} = {}", name, format_float(*value)));
            }
        }
        out.push("instructions:".to_string());
        render_loopy(&kernel.body, 1, &LoopyDialect, &mut out);
        let transforms = kernel.plan.transforms();
        if !transforms.is_empty() {
            out.push("transforms:".to_string());
            for t in transforms {
                out.push(format!("    {}", t));
            }
        }
        out.join("\n")
    }

    fn declaration(&self, kernel: &KernelDefinition) -> String {
        let names: Vec<&str> = kernel.args.iter().map(|a| a.name.as_str()).collect();
        format!("{}({})", kernel.name, names.join(", "))
    }

    fn lower_wrapper(&self, wrapper: &WrapperDefinition) -> String {
        let mut out = vec![format!("kernel {}", wrapper.name), "args:".to_string()];
        for arg in &wrapper.args {
            out.push(format!("    {}", arg));
        }
        out.push("calls:".to_string());
        let mut previous: Option<String> = None;
        for (n, step) in wrapper.steps.iter().enumerate() {
            let (text, id) = match step {
                WrapperStep::Call { kernel, args } => {
                    (format!("{}({})", kernel, args.join(", ")), format!("call_{}", kernel))
                }
                WrapperStep::Barrier(kind) => {
                    let text = match kind {
                        BarrierKind::Global => "... gbarrier",
                        BarrierKind::Local => "... lbarrier",
                    };
                    (text.to_string(), format!("barrier_{}", n))
                }
            };
            let dep = match &previous {
                Some(p) => format!(", dep={}", p),
                None => String::new(),
            };
            out.push(format!("    {} {{id={}{}}}", text, id, dep));
            previous = Some(id);
        }
        out.join("\n")
    }

    fn wrapper_declaration(&self, wrapper: &WrapperDefinition) -> String {
        let names: Vec<&str> = wrapper.args.iter().map(|a| a.name.as_str()).collect();
        format!("{}({})", wrapper.name, names.join(", "))
    }

    fn comment(&self, text: &str) -> String {
        format!("# {}", text)
    }
}
