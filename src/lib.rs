//! Rate-constant kernel generation for chemical-kinetics mechanisms.
//!
//! A mechanism is classified into rate-law families, each family becomes
//! one or more tagged-instruction kernels over compact index maps, and the
//! kernels are composed into a single vectorized unit with the barriers
//! their data flow needs.
//!
//! ```no_run
//! use kforge::{generate, CodegenOptions, Mechanism};
//! use kforge::kernel::lower::create_kernel_lowering;
//!
//! let mech = Mechanism::load("gri30.json".as_ref())?;
//! let generated = generate(&mech, &CodegenOptions::default())?;
//! if let Some(loopy) = create_kernel_lowering("loopy") {
//!     println!("{}", generated.composed.source(loopy.as_ref()));
//! }
//! # Ok::<(), kforge::Error>(())
//! ```

pub mod classify;
pub mod compose;
pub mod config;
pub mod error;
pub mod ir;
pub mod kernel;
pub mod mapping;
pub mod mechanism;
pub mod pipeline;
pub mod rates;

pub use classify::{Classification, ReactionClassifier, SpecializationMode};
pub use compose::{ComposedKernel, KernelComposer, KernelGraph, MemoryManager};
pub use config::CodegenOptions;
pub use error::{Error, Result};
pub use kernel::{KernelAssembler, KernelInfo};
pub use mapping::{IndexMap, IndexMapBuilder};
pub use mechanism::Mechanism;
pub use pipeline::{generate, Generated};
pub use rates::RateExpressionBuilder;
