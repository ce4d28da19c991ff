//! Host-side memory bookkeeping for a composed kernel.
//!
//! The caller owns the host copies (`h_` prefix) of the input and output
//! arrays. The manager owns one device buffer (`d_` prefix) per array
//! argument of the wrapper, moves inputs in before the call and outputs back
//! after it, and fills arrays that need a constant starting value.
//!
//! Rate-constant output needs no starting value; [`MemoryManager::set_init`]
//! is the hook for downstream kernels that accumulate into their outputs.

use indexmap::IndexMap;

use super::ComposedKernel;
use crate::config::Lang;
use crate::ir::{ArgDecl, DType, Dim};
use crate::kernel::lower::source_type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayRole {
    /// Copied host to device before the call.
    Input,
    /// Copied device to host after the call.
    Output,
    InOut,
    /// Scratch between kernels; lives on the device only.
    Device,
}

impl ArrayRole {
    fn copies_in(self) -> bool {
        matches!(self, ArrayRole::Input | ArrayRole::InOut)
    }

    fn copies_out(self) -> bool {
        matches!(self, ArrayRole::Output | ArrayRole::InOut)
    }

    pub fn on_host(self) -> bool {
        self != ArrayRole::Device
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManagedArray {
    pub decl: ArgDecl,
    pub role: ArrayRole,
    /// Value every element is set to before the first kernel runs.
    pub init: Option<f64>,
}

impl ManagedArray {
    pub fn host_name(&self) -> String {
        format!("h_{}", self.decl.name)
    }

    pub fn device_name(&self) -> String {
        format!("d_{}", self.decl.name)
    }

    /// Element count as C text.
    fn count(&self) -> String {
        let dims: Vec<String> = self.decl.shape.iter().map(|d| d.to_string()).collect();
        if self.decl.shape.iter().all(|d| matches!(d, Dim::Const(_))) {
            let n: usize = self
                .decl
                .shape
                .iter()
                .map(|d| match d {
                    Dim::Const(v) => *v,
                    Dim::Param(_) => 1,
                })
                .product();
            return n.to_string();
        }
        dims.join(" * ")
    }

    fn bytes(&self) -> String {
        format!("{} * sizeof({})", self.count(), source_type(self.decl.dtype))
    }
}

/// Tracks the arrays of one composed kernel and writes the host code that
/// allocates, fills, transfers and frees them.
#[derive(Debug, Clone)]
pub struct MemoryManager {
    lang: Lang,
    arrays: IndexMap<String, ManagedArray>,
}

impl MemoryManager {
    pub fn new(lang: Lang) -> Self {
        Self {
            lang,
            arrays: IndexMap::new(),
        }
    }

    /// Track every array argument of `composed`.
    ///
    /// Arrays no kernel writes are inputs; arrays written and named in
    /// `outputs` are outputs; other written arrays stay on the device.
    pub fn for_kernel(lang: Lang, composed: &ComposedKernel, outputs: &[&str]) -> Self {
        let mut written: Vec<String> = Vec::new();
        for kernel in &composed.kernels {
            written.extend(kernel.written_args());
        }
        for name in &composed.externals {
            if let Some(def) = composed.kernel(name) {
                written.extend(def.written_args());
            }
        }

        let mut manager = Self::new(lang);
        for decl in composed.wrapper.args.iter().filter(|a| !a.is_scalar()) {
            let is_written = written.iter().any(|w| w == &decl.name);
            let is_output = outputs.contains(&decl.name.as_str());
            let role = match (is_written, is_output) {
                (false, false) => ArrayRole::Input,
                (false, true) => ArrayRole::InOut,
                (true, true) => ArrayRole::Output,
                (true, false) => ArrayRole::Device,
            };
            manager.add(decl.clone(), role);
        }
        manager
    }

    pub fn add(&mut self, decl: ArgDecl, role: ArrayRole) {
        self.arrays.insert(
            decl.name.clone(),
            ManagedArray {
                decl,
                role,
                init: None,
            },
        );
    }

    /// Require `name` to start filled with `value`. False if untracked.
    pub fn set_init(&mut self, name: &str, value: f64) -> bool {
        match self.arrays.get_mut(name) {
            Some(array) => {
                array.init = Some(value);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&ManagedArray> {
        self.arrays.get(name)
    }

    pub fn arrays(&self) -> impl Iterator<Item = &ManagedArray> {
        self.arrays.values()
    }

    pub fn inputs(&self) -> Vec<&str> {
        self.names(|a| a.role.copies_in())
    }

    pub fn outputs(&self) -> Vec<&str> {
        self.names(|a| a.role.copies_out())
    }

    /// Arrays the caller passes in from the host.
    pub fn host_arrays(&self) -> Vec<&str> {
        self.names(|a| a.role.on_host())
    }

    pub fn device_only(&self) -> Vec<&str> {
        self.names(|a| !a.role.on_host())
    }

    fn names(&self, keep: impl Fn(&ManagedArray) -> bool) -> Vec<&str> {
        self.arrays
            .values()
            .filter(|a| keep(a))
            .map(|a| a.decl.name.as_str())
            .collect()
    }

    fn check(call: String) -> String {
        format!("check_err({});", call)
    }

    /// Declarations of the device buffers.
    pub fn definitions(&self) -> Vec<String> {
        self.arrays
            .values()
            .map(|a| match self.lang {
                Lang::C => format!("{} *{};", source_type(a.decl.dtype), a.device_name()),
                Lang::OpenCl => format!("cl_mem {};", a.device_name()),
            })
            .collect()
    }

    pub fn allocations(&self) -> Vec<String> {
        let mut out = Vec::new();
        for a in self.arrays.values() {
            match self.lang {
                Lang::C => {
                    let ty = source_type(a.decl.dtype);
                    out.push(format!(
                        "{} = ({} *)malloc({});",
                        a.device_name(),
                        ty,
                        a.bytes()
                    ));
                }
                Lang::OpenCl => {
                    let flags = match a.role {
                        ArrayRole::Input => "CL_MEM_READ_ONLY",
                        _ => "CL_MEM_READ_WRITE",
                    };
                    out.push(format!(
                        "{} = clCreateBuffer(context, {}, {}, NULL, &return_code);",
                        a.device_name(),
                        flags,
                        a.bytes()
                    ));
                    out.push("check_err(return_code);".to_string());
                }
            }
            if let Some(value) = a.init {
                out.extend(self.fill(a, value));
            }
        }
        out
    }

    fn fill(&self, a: &ManagedArray, value: f64) -> Vec<String> {
        match (self.lang, a.decl.dtype) {
            (Lang::C, _) if value == 0.0 => {
                vec![format!("memset({}, 0, {});", a.device_name(), a.bytes())]
            }
            (Lang::C, dtype) => vec![
                format!("for (size_t k = 0; k < {}; ++k)", a.count()),
                format!(
                    "    {}[k] = {};",
                    a.device_name(),
                    fill_literal(dtype, value)
                ),
            ],
            (Lang::OpenCl, dtype) => vec![
                format!(
                    "{} fill_{} = {};",
                    source_type(dtype),
                    a.decl.name,
                    fill_literal(dtype, value)
                ),
                Self::check(format!(
                    "clEnqueueFillBuffer(queue, {}, &fill_{}, sizeof({}), 0, {}, 0, NULL, NULL)",
                    a.device_name(),
                    a.decl.name,
                    source_type(dtype),
                    a.bytes()
                )),
            ],
        }
    }

    /// Host to device copies of the inputs.
    pub fn transfers_in(&self) -> Vec<String> {
        self.arrays
            .values()
            .filter(|a| a.role.copies_in())
            .map(|a| match self.lang {
                Lang::C => format!("memcpy({}, {}, {});", a.device_name(), a.host_name(), a.bytes()),
                Lang::OpenCl => Self::check(format!(
                    "clEnqueueWriteBuffer(queue, {}, CL_TRUE, 0, {}, {}, 0, NULL, NULL)",
                    a.device_name(),
                    a.bytes(),
                    a.host_name()
                )),
            })
            .collect()
    }

    /// Device to host copies of the outputs.
    pub fn transfers_out(&self) -> Vec<String> {
        self.arrays
            .values()
            .filter(|a| a.role.copies_out())
            .map(|a| match self.lang {
                Lang::C => format!("memcpy({}, {}, {});", a.host_name(), a.device_name(), a.bytes()),
                Lang::OpenCl => Self::check(format!(
                    "clEnqueueReadBuffer(queue, {}, CL_TRUE, 0, {}, {}, 0, NULL, NULL)",
                    a.device_name(),
                    a.bytes(),
                    a.host_name()
                )),
            })
            .collect()
    }

    pub fn frees(&self) -> Vec<String> {
        self.arrays
            .values()
            .map(|a| match self.lang {
                Lang::C => format!("free({});", a.device_name()),
                Lang::OpenCl => Self::check(format!("clReleaseMemObject({})", a.device_name())),
            })
            .collect()
    }
}

fn fill_literal(dtype: DType, value: f64) -> String {
    match dtype {
        DType::F64 => crate::ir::expr::format_float(value),
        DType::I32 => format!("{}", value as i32),
    }
}
