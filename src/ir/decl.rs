//! Loop domains and argument declarations.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Bound {
    Const(i64),
    Param(String),
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Const(v) => write!(f, "{}", v),
            Bound::Param(p) => write!(f, "{}", p),
        }
    }
}

impl From<i64> for Bound {
    fn from(v: i64) -> Self {
        Bound::Const(v)
    }
}

impl From<usize> for Bound {
    fn from(v: usize) -> Self {
        Bound::Const(v as i64)
    }
}

impl From<&str> for Bound {
    fn from(p: &str) -> Self {
        Bound::Param(p.to_string())
    }
}

/// `lower <= iname < upper`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoopDomain {
    pub iname: String,
    pub lower: Bound,
    pub upper: Bound,
}

impl LoopDomain {
    pub fn new(iname: &str, lower: impl Into<Bound>, upper: impl Into<Bound>) -> Self {
        Self {
            iname: iname.to_string(),
            lower: lower.into(),
            upper: upper.into(),
        }
    }

    /// Integer-set form, e.g. `{[k]: 0 <= k < 4}`.
    pub fn to_set(&self) -> String {
        format!("{{[{}]: {}}}", self.iname, self)
    }

    /// Trip count when both bounds are constant.
    pub fn const_len(&self) -> Option<i64> {
        match (&self.lower, &self.upper) {
            (Bound::Const(lo), Bound::Const(hi)) => Some((hi - lo).max(0)),
            _ => None,
        }
    }
}

impl fmt::Display for LoopDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <= {} < {}", self.lower, self.iname, self.upper)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F64,
    I32,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F64 => write!(f, "float64"),
            DType::I32 => write!(f, "int32"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    Private,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => write!(f, "global"),
            Scope::Private => write!(f, "private"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dim {
    Const(usize),
    Param(String),
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Const(v) => write!(f, "{}", v),
            Dim::Param(p) => write!(f, "{}", p),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Initializer {
    F64(Vec<f64>),
    I32(Vec<i32>),
}

impl Initializer {
    pub fn len(&self) -> usize {
        match self {
            Initializer::F64(v) => v.len(),
            Initializer::I32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn values_f64(&self) -> Vec<f64> {
        match self {
            Initializer::F64(v) => v.clone(),
            Initializer::I32(v) => v.iter().map(|&x| x as f64).collect(),
        }
    }
}

/// A kernel argument or temporary.
///
/// Global declarations without an initializer are kernel arguments supplied
/// by the caller; everything else is a temporary owned by the kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgDecl {
    pub name: String,
    /// Empty for scalars.
    pub shape: Vec<Dim>,
    pub dtype: DType,
    pub scope: Scope,
    pub initializer: Option<Initializer>,
    pub read_only: bool,
}

impl ArgDecl {
    /// A read-write global array argument.
    pub fn global(name: &str, shape: Vec<Dim>, dtype: DType) -> Self {
        Self {
            name: name.to_string(),
            shape,
            dtype,
            scope: Scope::Global,
            initializer: None,
            read_only: false,
        }
    }

    /// A scalar integer argument, e.g. the problem size.
    pub fn value(name: &str) -> Self {
        Self {
            read_only: true,
            ..Self::global(name, Vec::new(), DType::I32)
        }
    }

    pub fn private(name: &str, shape: Vec<Dim>, dtype: DType) -> Self {
        Self {
            scope: Scope::Private,
            ..Self::global(name, shape, dtype)
        }
    }

    /// A read-only global table with constant contents.
    pub fn constant(name: &str, shape: Vec<usize>, init: Initializer) -> Self {
        let dtype = match init {
            Initializer::F64(_) => DType::F64,
            Initializer::I32(_) => DType::I32,
        };
        Self {
            name: name.to_string(),
            shape: shape.into_iter().map(Dim::Const).collect(),
            dtype,
            scope: Scope::Global,
            initializer: Some(init),
            read_only: true,
        }
    }

    pub fn constant_f64(name: &str, values: Vec<f64>) -> Self {
        Self::constant(name, vec![values.len()], Initializer::F64(values))
    }

    pub fn constant_i32(name: &str, values: Vec<i32>) -> Self {
        Self::constant(name, vec![values.len()], Initializer::I32(values))
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn is_argument(&self) -> bool {
        self.scope == Scope::Global && self.initializer.is_none()
    }

    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }

    /// Shape and dtype agree.
    pub fn same_type(&self, other: &ArgDecl) -> bool {
        self.shape == other.shape && self.dtype == other.dtype
    }

    /// `float64[53, n]`-style type description.
    pub fn signature(&self) -> String {
        if self.shape.is_empty() {
            return self.dtype.to_string();
        }
        let dims: Vec<String> = self.shape.iter().map(|d| d.to_string()).collect();
        format!("{}[{}]", self.dtype, dims.join(", "))
    }
}

impl fmt::Display for ArgDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.scope, self.signature(), self.name)?;
        if self.read_only {
            write!(f, " (read-only)")?;
        }
        if let Some(init) = &self.initializer {
            write!(f, " = <{} values>", init.len())?;
        }
        Ok(())
    }
}
