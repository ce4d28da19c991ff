//! Third-body efficiency rewriting.
//!
//! Kernels never read the concentration of the mechanism's last species.
//! They compute the effective collision-partner concentration as
//!
//! ```text
//! [X] = eff_last · Σ conc_all + Σ_k eff'_k · conc_k
//! ```
//!
//! where `Σ conc_all = P / (R·T)`. [`rewrite_efficiencies`] turns an explicit
//! efficiency list (unlisted species at 1) into that form.

/// Efficiency list in default-plus-exceptions form.
#[derive(Debug, Clone, PartialEq)]
pub struct EfficiencyRewrite {
    /// Efficiency applied to the total concentration.
    pub eff_last: f64,
    /// Corrections relative to `eff_last`, sorted by species, never
    /// containing the last species.
    pub entries: Vec<(usize, f64)>,
}

impl EfficiencyRewrite {
    /// Effective concentration for a full concentration vector
    /// (`conc.len()` species, last one included).
    pub fn effective_concentration(&self, conc: &[f64]) -> f64 {
        let total: f64 = conc.iter().sum();
        self.eff_last * total
            + self
                .entries
                .iter()
                .map(|&(sp, eff)| eff * conc[sp])
                .sum::<f64>()
    }
}

/// Rewrite an explicit efficiency list, `last` being the mechanism's last
/// species (see [`Mechanism::last_species`](crate::mechanism::Mechanism::last_species)).
///
/// Its efficiency (1 if unlisted) becomes `eff_last` and is
/// subtracted from every listed entry. When `eff_last != 1` the unlisted
/// species are added back at `1 - eff_last`.
pub fn rewrite_efficiencies(explicit: &[(usize, f64)], last: usize) -> EfficiencyRewrite {
    let eff_last = explicit
        .iter()
        .find(|&&(sp, _)| sp == last)
        .map_or(1.0, |&(_, eff)| eff);

    let mut listed: Vec<(usize, f64)> = explicit
        .iter()
        .filter(|&&(sp, _)| sp != last)
        .map(|&(sp, eff)| (sp, eff - eff_last))
        .collect();

    if eff_last != 1.0 {
        let mut full: Vec<(usize, f64)> = (0..last).map(|sp| (sp, 1.0 - eff_last)).collect();
        for &(sp, eff) in &listed {
            full[sp].1 = eff;
        }
        listed = full;
    } else {
        listed.sort_by_key(|&(sp, _)| sp);
    }

    EfficiencyRewrite {
        eff_last,
        entries: listed,
    }
}
