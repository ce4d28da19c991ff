//! Code-generation options.
//!
//! Options come from defaults, an optional `kforge.toml`-style file, and
//! finally command-line flags, each layer overriding the previous one.
//!
//! ```toml
//! [codegen]
//! specialization = "full"
//! split_rate_kernels = true
//! memory_layout = "column-major"
//! lang = "opencl"
//!
//! [vector]
//! width = 8
//! layout = "deep"
//! ```


use std::fmt;
use std::path::Path;
use std::str::FromStr;

use tracing::warn;

use crate::error::{Error, Result};
use crate::ir::{Bound, Dim};

pub use crate::classify::SpecializationMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VectorLayout {
    #[default]
    None,
    /// Lanes across the batch of conditions.
    Wide,
    /// Lanes across the reaction index.
    Deep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryLayout {
    #[default]
    RowMajor,
    ColumnMajor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Lang {
    C,
    #[default]
    OpenCl,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProblemSize {
    /// Runtime problem size passed as a kernel argument of this name.
    Symbolic(String),
    Fixed(usize),
}

impl Default for ProblemSize {
    fn default() -> Self {
        ProblemSize::Symbolic("n".to_string())
    }
}

impl ProblemSize {
    /// Batch dimension of array shapes.
    pub fn dim(&self) -> Dim {
        match self {
            ProblemSize::Symbolic(name) => Dim::Param(name.clone()),
            ProblemSize::Fixed(n) => Dim::Const(*n),
        }
    }

    /// Upper bound of the batch loop.
    pub fn bound(&self) -> Bound {
        match self {
            ProblemSize::Symbolic(name) => Bound::Param(name.clone()),
            ProblemSize::Fixed(n) => Bound::Const(*n as i64),
        }
    }

    pub fn param(&self) -> Option<&str> {
        match self {
            ProblemSize::Symbolic(name) => Some(name),
            ProblemSize::Fixed(_) => None,
        }
    }
}

macro_rules! keyword_enum {
    ($ty:ty, $what:literal, { $($text:literal => $variant:expr),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok($variant),)+
                    _ => Err(Error::Config(format!("unknown {} '{}'", $what, s))),
                }
            }
        }
    };
}

keyword_enum!(VectorLayout, "vector layout", {
    "none" => VectorLayout::None,
    "wide" => VectorLayout::Wide,
    "deep" => VectorLayout::Deep,
});

keyword_enum!(MemoryLayout, "memory layout", {
    "row-major" => MemoryLayout::RowMajor,
    "C" => MemoryLayout::RowMajor,
    "column-major" => MemoryLayout::ColumnMajor,
    "F" => MemoryLayout::ColumnMajor,
});

keyword_enum!(Lang, "language", {
    "c" => Lang::C,
    "opencl" => Lang::OpenCl,
});

impl fmt::Display for VectorLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorLayout::None => write!(f, "none"),
            VectorLayout::Wide => write!(f, "wide"),
            VectorLayout::Deep => write!(f, "deep"),
        }
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lang::C => write!(f, "c"),
            Lang::OpenCl => write!(f, "opencl"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodegenOptions {
    pub specialization: SpecializationMode,
    pub vector_width: Option<usize>,
    pub vector_layout: VectorLayout,
    pub split_rate_kernels: bool,
    pub memory_layout: MemoryLayout,
    pub lang: Lang,
    pub use_atomics: bool,
    pub unroll: Option<usize>,
    pub ilp: bool,
    pub problem_size: ProblemSize,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            specialization: SpecializationMode::default(),
            vector_width: None,
            vector_layout: VectorLayout::None,
            split_rate_kernels: true,
            memory_layout: MemoryLayout::RowMajor,
            lang: Lang::OpenCl,
            use_atomics: false,
            unroll: None,
            ilp: false,
            problem_size: ProblemSize::default(),
        }
    }
}

impl CodegenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_specialization(mut self, mode: SpecializationMode) -> Self {
        self.specialization = mode;
        self
    }

    pub fn with_vector(mut self, layout: VectorLayout, width: usize) -> Self {
        self.vector_layout = layout;
        self.vector_width = Some(width);
        self
    }

    pub fn with_split_rate_kernels(mut self, split: bool) -> Self {
        self.split_rate_kernels = split;
        self
    }

    pub fn with_lang(mut self, lang: Lang) -> Self {
        self.lang = lang;
        self
    }

    pub fn with_memory_layout(mut self, layout: MemoryLayout) -> Self {
        self.memory_layout = layout;
        self
    }

    pub fn with_problem_size(mut self, size: ProblemSize) -> Self {
        self.problem_size = size;
        self
    }

    pub fn with_atomics(mut self, use_atomics: bool) -> Self {
        self.use_atomics = use_atomics;
        self
    }

    /// Lane width when a vector layout is active.
    pub fn lane_width(&self) -> Option<usize> {
        match self.vector_layout {
            VectorLayout::None => None,
            _ => self.vector_width,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.vector_width == Some(0) {
            return Err(Error::Config("vector width must be positive".to_string()));
        }
        if self.vector_layout != VectorLayout::None && self.vector_width.is_none() {
            return Err(Error::Config(format!(
                "{} vectorization needs a vector width",
                self.vector_layout
            )));
        }
        if self.vector_layout != VectorLayout::None && self.lang == Lang::C {
            return Err(Error::Config(
                "the C target cannot be vectorized; drop the vector layout".to_string(),
            ));
        }
        if self.unroll.is_some() && self.ilp {
            return Err(Error::Config(
                "unroll and ilp are mutually exclusive".to_string(),
            ));
        }
        if self.unroll == Some(0) {
            return Err(Error::Config("unroll factor must be positive".to_string()));
        }
        if self.problem_size == ProblemSize::Fixed(0) {
            return Err(Error::Config("fixed problem size must be positive".to_string()));
        }
        Ok(())
    }

    /// Load options from a file, starting from the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read '{}': {}", path.display(), e))
        })?;
        let mut options = Self::default();
        options.apply_toml(&content)?;
        Ok(options)
    }

    /// Apply `key = value` settings from `[codegen]` and `[vector]` sections.
    pub fn apply_toml(&mut self, content: &str) -> Result<()> {
        let mut section = String::new();
        for (lineno, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.starts_with('#') || trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('[') && trimmed.ends_with(']') {
                section = trimmed[1..trimmed.len() - 1].trim().to_string();
                continue;
            }
            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(Error::Config(format!(
                    "line {}: expected 'key = value'",
                    lineno + 1
                )));
            };
            let key = key.trim();
            let value = value.split('#').next().unwrap_or("").trim().trim_matches('"');

            match (section.as_str(), key) {
                ("codegen", "specialization") => self.specialization = value.parse()?,
                ("codegen", "split_rate_kernels") => {
                    self.split_rate_kernels = parse_bool(key, value)?
                }
                ("codegen", "memory_layout") => self.memory_layout = value.parse()?,
                ("codegen", "lang") => self.lang = value.parse()?,
                ("codegen", "use_atomics") => self.use_atomics = parse_bool(key, value)?,
                ("codegen", "unroll") => self.unroll = Some(parse_usize(key, value)?),
                ("codegen", "ilp") => self.ilp = parse_bool(key, value)?,
                ("codegen", "problem_size") => {
                    self.problem_size = match value.parse::<usize>() {
                        Ok(n) => ProblemSize::Fixed(n),
                        Err(_) => ProblemSize::Symbolic(value.to_string()),
                    }
                }
                ("vector", "width") => self.vector_width = Some(parse_usize(key, value)?),
                ("vector", "layout") => self.vector_layout = value.parse()?,
                _ => warn!(section = %section, key, "ignoring unknown option"),
            }
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(Error::Config(format!(
            "'{}' must be true or false, got '{}'",
            key, value
        ))),
    }
}

fn parse_usize(key: &str, value: &str) -> Result<usize> {
    value.parse().map_err(|_| {
        Error::Config(format!(
            "'{}' must be a non-negative integer, got '{}'",
            key, value
        ))
    })
}
