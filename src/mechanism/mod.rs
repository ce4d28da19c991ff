//! In-memory mechanism records.
//!
//! A mechanism is an ordered species list plus an ordered reaction list.
//! Reactions are immutable once loaded; every later stage refers to them by
//! their position in `Mechanism::reactions` (the global reaction index).
//!
//! Records are already parsed: the JSON form accepted by [`Mechanism::from_json`]
//! is a serde view of these structs, not a mechanism file format.


use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Universal gas constant in J/(kmol·K).
pub const RU: f64 = 8314.4621;

// ─── Rate-law parameters ───────────────────────────────────────────

/// Modified Arrhenius parameters `k = A·T^b·exp(−Ea/(R·T))`.
///
/// `ea` is in J/kmol, consistent with [`RU`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Arrhenius {
    pub a: f64,
    pub b: f64,
    pub ea: f64,
}

impl Arrhenius {
    pub fn new(a: f64, b: f64, ea: f64) -> Self {
        Self { a, b, ea }
    }

    /// Activation temperature `Ea / R`.
    pub fn activation_temperature(&self) -> f64 {
        self.ea / RU
    }

    /// Direct evaluation at temperature `t`.
    pub fn eval(&self, t: f64) -> f64 {
        self.a * t.powf(self.b) * (-self.ea / (RU * t)).exp()
    }

    fn check(&self, reaction: usize, what: &str) -> Result<()> {
        if !(self.a.is_finite() && self.b.is_finite() && self.ea.is_finite()) {
            return Err(Error::validation(
                reaction,
                format!("{} Arrhenius parameters must be finite", what),
            ));
        }
        Ok(())
    }
}

/// One breakpoint of a pressure-log table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlogEntry {
    /// Pressure in Pa.
    pub pressure: f64,
    pub rate: Arrhenius,
}

/// Chebyshev rate-law parameters.
///
/// `coeffs[m][k]` multiplies `T_m(Tred)·T_k(Pred)`: rows are temperature
/// degrees, columns pressure degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chebyshev {
    pub coeffs: Vec<Vec<f64>>,
    pub t_min: f64,
    pub t_max: f64,
    pub p_min: f64,
    pub p_max: f64,
}

impl Chebyshev {
    pub fn n_temperature(&self) -> usize {
        self.coeffs.len()
    }

    pub fn n_pressure(&self) -> usize {
        self.coeffs.first().map_or(0, Vec::len)
    }
}

/// Collision-partner specification of a pressure-dependent reaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThirdBody {
    /// Every species at its listed efficiency, unlisted species at 1.
    Mix { efficiencies: Vec<(usize, f64)> },
    /// Every species at efficiency 1.
    Unity,
    /// A single enhancing species.
    Species { species: usize },
}

/// Which limit the falloff parameter set describes.
///
/// `Low` marks a unimolecular falloff reaction (the extra set is k0 and the
/// main rate is kinf); `High` marks a chemically-activated reaction (the
/// extra set is kinf and the main rate is k0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FalloffLimit {
    Low(Arrhenius),
    High(Arrhenius),
}

impl FalloffLimit {
    pub fn rate(&self) -> &Arrhenius {
        match self {
            FalloffLimit::Low(rate) | FalloffLimit::High(rate) => rate,
        }
    }

    pub fn is_chemically_activated(&self) -> bool {
        matches!(self, FalloffLimit::High(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Troe {
    pub a: f64,
    pub t3: f64,
    pub t1: f64,
    /// Optional fourth parameter; zero when absent.
    pub t2: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sri {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    /// Multiplicative factor; 1 when absent.
    pub d: f64,
    /// Temperature exponent; 0 when absent.
    pub e: f64,
}

/// Falloff blending function.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBlending", into = "RawBlending")]
pub enum Blending {
    Lindemann,
    Troe(Troe),
    Sri(Sri),
}

impl Blending {
    /// Build a blending function from its kind name and positional parameters.
    pub fn from_params(kind: &str, params: &[f64]) -> Result<Self> {
        match (kind, params.len()) {
            ("lindemann", 0) => Ok(Blending::Lindemann),
            ("troe", 3) | ("troe", 4) => Ok(Blending::Troe(Troe {
                a: params[0],
                t3: params[1],
                t1: params[2],
                t2: params.get(3).copied().unwrap_or(0.0),
            })),
            ("sri", 3) | ("sri", 5) => Ok(Blending::Sri(Sri {
                a: params[0],
                b: params[1],
                c: params[2],
                d: params.get(3).copied().unwrap_or(1.0),
                e: params.get(4).copied().unwrap_or(0.0),
            })),
            ("lindemann", n) | ("troe", n) | ("sri", n) => Err(Error::unsupported(
                format!("{} blending", kind),
                format!("{} parameters given", n),
            )),
            _ => Err(Error::unsupported(
                "blending",
                format!("unrecognized blending-function kind '{}'", kind),
            )),
        }
    }

    pub fn kind(&self) -> BlendingKind {
        match self {
            Blending::Lindemann => BlendingKind::Lindemann,
            Blending::Troe(_) => BlendingKind::Troe,
            Blending::Sri(_) => BlendingKind::Sri,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendingKind {
    Lindemann,
    Troe,
    Sri,
}

impl fmt::Display for BlendingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlendingKind::Lindemann => write!(f, "lindemann"),
            BlendingKind::Troe => write!(f, "troe"),
            BlendingKind::Sri => write!(f, "sri"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawBlending {
    kind: String,
    #[serde(default)]
    params: Vec<f64>,
}

impl TryFrom<RawBlending> for Blending {
    type Error = Error;

    fn try_from(raw: RawBlending) -> Result<Self> {
        Blending::from_params(&raw.kind, &raw.params)
    }
}

impl From<Blending> for RawBlending {
    fn from(blending: Blending) -> Self {
        let params = match blending {
            Blending::Lindemann => Vec::new(),
            Blending::Troe(t) => vec![t.a, t.t3, t.t1, t.t2],
            Blending::Sri(s) => vec![s.a, s.b, s.c, s.d, s.e],
        };
        RawBlending {
            kind: blending.kind().to_string(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Falloff {
    pub limit: FalloffLimit,
    pub blending: Blending,
    pub third_body: ThirdBody,
}

/// Rate law of one reaction, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RateLaw {
    Elementary {
        rate: Arrhenius,
    },
    ThirdBody {
        rate: Arrhenius,
        third_body: ThirdBody,
    },
    Falloff {
        rate: Arrhenius,
        falloff: Falloff,
    },
    Plog {
        entries: Vec<PlogEntry>,
    },
    Chebyshev(Chebyshev),
}

impl RateLaw {
    /// The Arrhenius set evaluated by the simple-rate kernels, if any.
    pub fn base_rate(&self) -> Option<&Arrhenius> {
        match self {
            RateLaw::Elementary { rate }
            | RateLaw::ThirdBody { rate, .. }
            | RateLaw::Falloff { rate, .. } => Some(rate),
            RateLaw::Plog { .. } | RateLaw::Chebyshev(_) => None,
        }
    }

    pub fn third_body(&self) -> Option<&ThirdBody> {
        match self {
            RateLaw::ThirdBody { third_body, .. } => Some(third_body),
            RateLaw::Falloff { falloff, .. } => Some(&falloff.third_body),
            _ => None,
        }
    }
}

// ─── Reactions ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    #[serde(default)]
    pub equation: String,
    /// `(species index, stoichiometric coefficient)` pairs.
    pub reactants: Vec<(usize, f64)>,
    pub products: Vec<(usize, f64)>,
    #[serde(default)]
    pub reversible: bool,
    #[serde(default)]
    pub duplicate: bool,
    pub rate: RateLaw,
}

impl Reaction {
    pub fn new(rate: RateLaw) -> Self {
        Self {
            equation: String::new(),
            reactants: Vec::new(),
            products: Vec::new(),
            reversible: false,
            duplicate: false,
            rate,
        }
    }

    pub fn with_reactants(mut self, reactants: Vec<(usize, f64)>) -> Self {
        self.reactants = reactants;
        self
    }

    pub fn with_products(mut self, products: Vec<(usize, f64)>) -> Self {
        self.products = products;
        self
    }

    pub fn reversible(mut self) -> Self {
        self.reversible = true;
        self
    }

    pub fn duplicate(mut self) -> Self {
        self.duplicate = true;
        self
    }

    /// True if every reactant and product coefficient is a whole number.
    pub fn has_integer_stoichiometry(&self) -> bool {
        self.reactants
            .iter()
            .chain(&self.products)
            .all(|&(_, nu)| nu.fract() == 0.0)
    }

    /// Check that the fields required by the reaction's kind are present
    /// and well formed.
    pub fn validate(&self, index: usize, n_species: usize) -> Result<()> {
        if self.reactants.is_empty() {
            return Err(Error::validation(index, "no reactants"));
        }
        for &(sp, nu) in self.reactants.iter().chain(&self.products) {
            if sp >= n_species {
                return Err(Error::validation(
                    index,
                    format!("species index {} out of range ({} species)", sp, n_species),
                ));
            }
            if !(nu.is_finite() && nu > 0.0) {
                return Err(Error::validation(
                    index,
                    format!("stoichiometric coefficient {} of species {}", nu, sp),
                ));
            }
        }

        match &self.rate {
            RateLaw::Elementary { rate } => rate.check(index, "rate"),
            RateLaw::ThirdBody { rate, third_body } => {
                rate.check(index, "rate")?;
                check_third_body(third_body, index, n_species)
            }
            RateLaw::Falloff { rate, falloff } => {
                rate.check(index, "rate")?;
                falloff.limit.rate().check(index, "falloff limit")?;
                check_third_body(&falloff.third_body, index, n_species)?;
                check_blending(&falloff.blending, index)
            }
            RateLaw::Plog { entries } => check_plog(entries, index),
            RateLaw::Chebyshev(cheb) => check_chebyshev(cheb, index),
        }
    }
}

fn check_third_body(third_body: &ThirdBody, index: usize, n_species: usize) -> Result<()> {
    match third_body {
        ThirdBody::Unity => Ok(()),
        ThirdBody::Species { species } => {
            if *species >= n_species {
                return Err(Error::validation(
                    index,
                    format!("third-body species {} out of range", species),
                ));
            }
            Ok(())
        }
        ThirdBody::Mix { efficiencies } => {
            let mut seen = vec![false; n_species];
            for &(sp, eff) in efficiencies {
                if sp >= n_species {
                    return Err(Error::validation(
                        index,
                        format!("third-body efficiency for unknown species {}", sp),
                    ));
                }
                if seen[sp] {
                    return Err(Error::validation(
                        index,
                        format!("species {} has two third-body efficiencies", sp),
                    ));
                }
                if !eff.is_finite() {
                    return Err(Error::validation(
                        index,
                        format!("third-body efficiency of species {} is not finite", sp),
                    ));
                }
                seen[sp] = true;
            }
            Ok(())
        }
    }
}

fn check_blending(blending: &Blending, index: usize) -> Result<()> {
    match blending {
        Blending::Lindemann => Ok(()),
        Blending::Troe(t) => {
            if t.t3 == 0.0 || t.t1 == 0.0 {
                return Err(Error::validation(index, "Troe T3 and T1 must be non-zero"));
            }
            Ok(())
        }
        Blending::Sri(s) => {
            if s.c == 0.0 {
                return Err(Error::validation(index, "SRI c must be non-zero"));
            }
            Ok(())
        }
    }
}

fn check_plog(entries: &[PlogEntry], index: usize) -> Result<()> {
    if entries.is_empty() {
        return Err(Error::validation(index, "pressure-log table has no breakpoints"));
    }
    for entry in entries {
        entry.rate.check(index, "pressure-log")?;
        if !(entry.pressure.is_finite() && entry.pressure > 0.0) {
            return Err(Error::validation(
                index,
                format!("pressure-log breakpoint {} is not positive", entry.pressure),
            ));
        }
    }
    if entries.windows(2).any(|w| w[1].pressure <= w[0].pressure) {
        return Err(Error::validation(
            index,
            "pressure-log breakpoints must be strictly increasing",
        ));
    }
    Ok(())
}

fn check_chebyshev(cheb: &Chebyshev, index: usize) -> Result<()> {
    let n_pres = cheb.n_pressure();
    if cheb.coeffs.is_empty() || n_pres == 0 {
        return Err(Error::validation(index, "empty Chebyshev coefficient matrix"));
    }
    if cheb.coeffs.iter().any(|row| row.len() != n_pres) {
        return Err(Error::validation(
            index,
            "Chebyshev coefficient rows differ in length",
        ));
    }
    if cheb.coeffs.iter().flatten().any(|c| !c.is_finite()) {
        return Err(Error::validation(index, "Chebyshev coefficient is not finite"));
    }
    if !(cheb.t_min > 0.0 && cheb.t_min < cheb.t_max) {
        return Err(Error::validation(
            index,
            format!("Chebyshev temperature limits [{}, {}]", cheb.t_min, cheb.t_max),
        ));
    }
    if !(cheb.p_min > 0.0 && cheb.p_min < cheb.p_max) {
        return Err(Error::validation(
            index,
            format!("Chebyshev pressure limits [{}, {}]", cheb.p_min, cheb.p_max),
        ));
    }
    Ok(())
}

// ─── Mechanism ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mechanism {
    pub species: Vec<String>,
    pub reactions: Vec<Reaction>,
}

impl Mechanism {
    pub fn new(species: Vec<String>, reactions: Vec<Reaction>) -> Self {
        Self { species, reactions }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load already-parsed mechanism records from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn n_species(&self) -> usize {
        self.species.len()
    }

    pub fn n_reactions(&self) -> usize {
        self.reactions.len()
    }

    /// Index of the species whose concentration the kernels never store
    /// explicitly; its third-body efficiency is folded into a default.
    pub fn last_species(&self) -> Option<usize> {
        self.species.len().checked_sub(1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.species.is_empty() {
            return Err(Error::Config("mechanism has no species".to_string()));
        }
        for (i, reaction) in self.reactions.iter().enumerate() {
            reaction.validate(i, self.species.len())?;
        }
        Ok(())
    }
}
