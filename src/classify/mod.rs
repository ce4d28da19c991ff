//! ReactionClassifier: partitions reactions into rate-law groups.
//!
//! Groups overlap on purpose. Every elementary, third-body and falloff
//! reaction is in the simple group (it needs a base Arrhenius evaluation),
//! and falloff reactions are also third-body members.
//!
//! Each member of a tiered family gets a specialization tier, a pure
//! function of `(b, Ea, mode)`:
//!
//! ```text
//! mode    b=0,Ea=0  b∈ℤ∖0,Ea=0  b≠0,Ea=0  b=0,Ea≠0  b≠0,Ea≠0
//! fixed   0         0           0         0         0
//! hybrid  0         1           2         2         2
//! full    0         1           2         3         4
//! ```

pub mod third_body;

use std::fmt;
use std::str::FromStr;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::mechanism::{
    Arrhenius, BlendingKind, Blending, Chebyshev, Mechanism, PlogEntry, RateLaw, Sri, ThirdBody,
    Troe,
};

pub use third_body::{rewrite_efficiencies, EfficiencyRewrite};

// ─── Tiers ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SpecializationMode {
    /// One form for every reaction.
    Fixed,
    /// Direct multiply, integer power, or the full exponential.
    #[default]
    Hybrid,
    /// Every form, dropping zero terms.
    Full,
}

impl SpecializationMode {
    /// Closed forms indexed by tier.
    pub fn forms(self) -> &'static [ArrheniusForm] {
        use ArrheniusForm::*;
        match self {
            SpecializationMode::Fixed => &[Full],
            SpecializationMode::Hybrid => &[AOnly, BetaInt, Full],
            SpecializationMode::Full => &[AOnly, BetaInt, BetaExp, TaExp, Full],
        }
    }

    pub fn form(self, tier: Tier) -> ArrheniusForm {
        self.forms()
            .get(tier.0 as usize)
            .copied()
            .unwrap_or(ArrheniusForm::Full)
    }
}

impl fmt::Display for SpecializationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecializationMode::Fixed => write!(f, "fixed"),
            SpecializationMode::Hybrid => write!(f, "hybrid"),
            SpecializationMode::Full => write!(f, "full"),
        }
    }
}

impl FromStr for SpecializationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fixed" => Ok(SpecializationMode::Fixed),
            "hybrid" => Ok(SpecializationMode::Hybrid),
            "full" => Ok(SpecializationMode::Full),
            _ => Err(Error::Config(format!(
                "unknown specialization mode '{}' (expected fixed, hybrid or full)",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tier(pub u8);

/// Closed form of a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrheniusForm {
    /// `kf = A`
    AOnly,
    /// `kf = A·T^b` by repeated multiplication, `b` integer.
    BetaInt,
    /// `kf = exp(lnA + b·lnT)`
    BetaExp,
    /// `kf = exp(lnA − Ta/T)`
    TaExp,
    /// `kf = exp(lnA + b·lnT − Ta/T)`
    Full,
}

impl ArrheniusForm {
    /// True for the forms that exponentiate `ln A`.
    pub fn is_exponential(self) -> bool {
        matches!(
            self,
            ArrheniusForm::BetaExp | ArrheniusForm::TaExp | ArrheniusForm::Full
        )
    }
}

impl fmt::Display for ArrheniusForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrheniusForm::AOnly => write!(f, "a_only"),
            ArrheniusForm::BetaInt => write!(f, "beta_int"),
            ArrheniusForm::BetaExp => write!(f, "beta_exp"),
            ArrheniusForm::TaExp => write!(f, "ta_exp"),
            ArrheniusForm::Full => write!(f, "full"),
        }
    }
}

/// Tier of an Arrhenius parameter set under `mode`.
pub fn assign_tier(b: f64, ea: f64, mode: SpecializationMode) -> Tier {
    let b_zero = b == 0.0;
    let ea_zero = ea == 0.0;
    let b_int = !b_zero && b.fract() == 0.0;
    let tier = match mode {
        SpecializationMode::Fixed => 0,
        SpecializationMode::Hybrid => match (b_zero, ea_zero) {
            (true, true) => 0,
            (false, true) if b_int => 1,
            _ => 2,
        },
        SpecializationMode::Full => match (b_zero, ea_zero) {
            (true, true) => 0,
            (false, true) if b_int => 1,
            (false, true) => 2,
            (true, false) => 3,
            (false, false) => 4,
        },
    };
    Tier(tier)
}

// ─── Groups ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKind {
    Simple,
    Plog,
    Chebyshev,
    ThirdBody,
    Falloff,
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKind::Simple => write!(f, "simple"),
            GroupKind::Plog => write!(f, "plog"),
            GroupKind::Chebyshev => write!(f, "cheb"),
            GroupKind::ThirdBody => write!(f, "thd"),
            GroupKind::Falloff => write!(f, "fall"),
        }
    }
}

/// Ordered global reaction indices of one rate-law family.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLawGroup {
    pub kind: GroupKind,
    pub members: Vec<usize>,
}

/// Tiered Arrhenius parameters of a family.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArrheniusTable {
    /// Global reaction index of each row.
    pub members: Vec<usize>,
    pub rates: Vec<Arrhenius>,
    pub tiers: Vec<Tier>,
}

impl ArrheniusTable {
    fn push(&mut self, reaction: usize, rate: Arrhenius, mode: SpecializationMode) {
        self.members.push(reaction);
        self.tiers.push(assign_tier(rate.b, rate.ea, mode));
        self.rates.push(rate);
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Row positions of the members in `tier`.
    pub fn positions_of(&self, tier: Tier) -> Vec<usize> {
        self.tiers
            .iter()
            .enumerate()
            .filter(|(_, &t)| t == tier)
            .map(|(p, _)| p)
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlogTable {
    pub members: Vec<usize>,
    pub tables: Vec<Vec<PlogEntry>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChebyshevTable {
    pub members: Vec<usize>,
    pub params: Vec<Chebyshev>,
}

/// Third-body kind with its kernel-side code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThirdBodyKind {
    Mix,
    Species,
    Unity,
}

impl ThirdBodyKind {
    pub fn code(self) -> i32 {
        match self {
            ThirdBodyKind::Mix => 0,
            ThirdBodyKind::Species => 1,
            ThirdBodyKind::Unity => 2,
        }
    }
}

/// Flattened third-body efficiencies, one row per third-body member.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThirdBodyTable {
    pub members: Vec<usize>,
    pub kinds: Vec<ThirdBodyKind>,
    /// Number of `(species, efficiency)` entries per member.
    pub species_counts: Vec<usize>,
    /// Exclusive prefix sum of `species_counts`.
    pub offsets: Vec<usize>,
    pub species: Vec<usize>,
    pub efficiencies: Vec<f64>,
    pub eff_last: Vec<f64>,
}

impl ThirdBodyTable {
    fn push(&mut self, reaction: usize, third_body: &ThirdBody, last_species: usize) {
        let (kind, eff_last, entries) = match third_body {
            ThirdBody::Mix { efficiencies } => {
                let rewrite = rewrite_efficiencies(efficiencies, last_species);
                (ThirdBodyKind::Mix, rewrite.eff_last, rewrite.entries)
            }
            ThirdBody::Unity => (ThirdBodyKind::Unity, 1.0, Vec::new()),
            ThirdBody::Species { species } => (ThirdBodyKind::Species, 1.0, vec![(*species, 1.0)]),
        };
        self.members.push(reaction);
        self.kinds.push(kind);
        self.offsets.push(self.species.len());
        self.species_counts.push(entries.len());
        self.eff_last.push(eff_last);
        for (sp, eff) in entries {
            self.species.push(sp);
            self.efficiencies.push(eff);
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TroeTable {
    /// Falloff-group positions of the Troe members.
    pub positions: Vec<usize>,
    pub params: Vec<Troe>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SriTable {
    pub positions: Vec<usize>,
    pub params: Vec<Sri>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FalloffTable {
    pub members: Vec<usize>,
    /// True where the extra parameter set is the high-pressure limit.
    pub chemically_activated: Vec<bool>,
    /// Arrhenius evaluation of the extra parameter set, written to `kf_fall`.
    pub base: ArrheniusTable,
    pub blending: Vec<BlendingKind>,
    pub troe: TroeTable,
    pub sri: SriTable,
    pub lindemann: Vec<usize>,
    /// Position of each falloff member in the third-body table.
    pub third_body_positions: Vec<usize>,
}

impl FalloffTable {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Species/coefficient table of one reaction direction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoichTable {
    pub species_counts: Vec<usize>,
    pub species: Vec<usize>,
    pub nu: Vec<f64>,
    pub all_integer: bool,
}

impl StoichTable {
    fn new() -> Self {
        Self {
            all_integer: true,
            ..Self::default()
        }
    }

    fn push(&mut self, entries: &[(usize, f64)]) {
        self.species_counts.push(entries.len());
        for &(sp, nu) in entries {
            self.species.push(sp);
            self.nu.push(nu);
            if nu.fract() != 0.0 {
                self.all_integer = false;
            }
        }
    }
}

/// Everything the rate builders need, derived once from the mechanism.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub mode: SpecializationMode,
    pub n_species: usize,
    pub n_reactions: usize,
    pub simple: ArrheniusTable,
    pub plog: PlogTable,
    pub cheb: ChebyshevTable,
    pub third_body: ThirdBodyTable,
    pub falloff: FalloffTable,
    /// Reactant table over every reaction.
    pub fwd: StoichTable,
    /// Product table over the reversible reactions.
    pub rev: StoichTable,
    pub rev_map: Vec<usize>,
}

impl Classification {
    pub fn groups(&self) -> Vec<RateLawGroup> {
        vec![
            RateLawGroup {
                kind: GroupKind::Simple,
                members: self.simple.members.clone(),
            },
            RateLawGroup {
                kind: GroupKind::Plog,
                members: self.plog.members.clone(),
            },
            RateLawGroup {
                kind: GroupKind::Chebyshev,
                members: self.cheb.members.clone(),
            },
            RateLawGroup {
                kind: GroupKind::ThirdBody,
                members: self.third_body.members.clone(),
            },
            RateLawGroup {
                kind: GroupKind::Falloff,
                members: self.falloff.members.clone(),
            },
        ]
    }

    /// True when falloff position `p` is not third-body position `p`.
    pub fn falloff_needs_thd_map(&self) -> bool {
        self.falloff.members != self.third_body.members
    }
}

// ─── Classifier ────────────────────────────────────────────────────

pub struct ReactionClassifier {
    mode: SpecializationMode,
}

impl ReactionClassifier {
    pub fn new(mode: SpecializationMode) -> Self {
        Self { mode }
    }

    pub fn classify(&self, mech: &Mechanism) -> Result<Classification> {
        let n_species = mech.n_species();
        let last_species = mech.last_species().unwrap_or(0);
        let mut simple = ArrheniusTable::default();
        let mut plog = PlogTable::default();
        let mut cheb = ChebyshevTable::default();
        let mut third_body = ThirdBodyTable::default();
        let mut falloff = FalloffTable::default();
        let mut fwd = StoichTable::new();
        let mut rev = StoichTable::new();
        let mut rev_map = Vec::new();

        for (i, reaction) in mech.reactions.iter().enumerate() {
            fwd.push(&reaction.reactants);
            if reaction.reversible {
                rev.push(&reaction.products);
                rev_map.push(i);
            }

            match &reaction.rate {
                RateLaw::Elementary { rate } => {
                    check_prefactor(i, rate, reaction.duplicate)?;
                    simple.push(i, *rate, self.mode);
                }
                RateLaw::ThirdBody { rate, third_body: tb } => {
                    check_prefactor(i, rate, reaction.duplicate)?;
                    simple.push(i, *rate, self.mode);
                    third_body.push(i, tb, last_species);
                }
                RateLaw::Falloff { rate, falloff: fall } => {
                    check_prefactor(i, rate, reaction.duplicate)?;
                    let limit = fall.limit.rate();
                    check_prefactor(i, limit, reaction.duplicate)?;
                    simple.push(i, *rate, self.mode);
                    third_body.push(i, &fall.third_body, last_species);

                    let position = falloff.members.len();
                    falloff.members.push(i);
                    falloff
                        .chemically_activated
                        .push(fall.limit.is_chemically_activated());
                    falloff.base.push(i, *limit, self.mode);
                    falloff.blending.push(fall.blending.kind());
                    match fall.blending {
                        Blending::Lindemann => falloff.lindemann.push(position),
                        Blending::Troe(params) => {
                            falloff.troe.positions.push(position);
                            falloff.troe.params.push(params);
                        }
                        Blending::Sri(params) => {
                            falloff.sri.positions.push(position);
                            falloff.sri.params.push(params);
                        }
                    }
                }
                RateLaw::Plog { entries } => {
                    for entry in entries {
                        if entry.rate.a <= 0.0 {
                            return Err(Error::unsupported(
                                format!("reaction {}", i),
                                format!(
                                    "pressure-log pre-exponential factor {} cannot be log-interpolated",
                                    entry.rate.a
                                ),
                            ));
                        }
                    }
                    plog.members.push(i);
                    plog.tables.push(entries.clone());
                }
                RateLaw::Chebyshev(params) => {
                    cheb.members.push(i);
                    cheb.params.push(params.clone());
                }
            }
        }

        falloff.third_body_positions = falloff
            .members
            .iter()
            .filter_map(|r| third_body.members.iter().position(|t| t == r))
            .collect();

        debug!(
            mode = %self.mode,
            simple = simple.len(),
            plog = plog.members.len(),
            cheb = cheb.members.len(),
            thd = third_body.len(),
            fall = falloff.len(),
            "classified reactions"
        );

        Ok(Classification {
            mode: self.mode,
            n_species,
            n_reactions: mech.n_reactions(),
            simple,
            plog,
            cheb,
            third_body,
            falloff,
            fwd,
            rev,
            rev_map,
        })
    }
}

fn check_prefactor(reaction: usize, rate: &Arrhenius, duplicate: bool) -> Result<()> {
    if rate.a == 0.0 {
        return Err(Error::unsupported(
            format!("reaction {}", reaction),
            "zero pre-exponential factor",
        ));
    }
    if rate.a < 0.0 && !duplicate {
        warn!(
            reaction,
            a = rate.a,
            "negative pre-exponential factor on a non-duplicate reaction"
        );
    }
    Ok(())
}
