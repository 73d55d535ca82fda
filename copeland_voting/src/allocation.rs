//! Funding allocation over a ranked result list.
//!
//! The shipped strategy is a deliberately simple greedy walk: it is easy to
//! audit by hand against the published ranking, which matters more here than
//! squeezing the last dollar out of the budgets. A knapsack-style optimizer
//! can be swapped in through [`AllocationStrategy`] without touching the
//! tournament code.

use log::debug;

use std::collections::HashMap;

use crate::config::{Budgets, FundingInfo, FundingType, OptionKind, VoteOption};

/// Decides a funding tier for every option of a ranked list.
///
/// `ranked` is the final ranking, best first, without the sentinel. The
/// returned vector is aligned with it.
pub trait AllocationStrategy {
    fn allocate(
        &self,
        ranked: &[&VoteOption],
        funding: &HashMap<String, FundingInfo>,
        budgets: &Budgets,
        two_year_slots: u32,
    ) -> Vec<FundingType>;
}

/// Single greedy pass per tier, in rank order. Budgets are hard ceilings:
/// an option that does not fit is marked [`FundingType::None`] and its
/// amount is never reclaimed from an earlier reservation.
pub struct GreedyAllocator;

impl GreedyAllocator {
    fn base_name<'a>(option: &'a VoteOption) -> &'a str {
        match &option.kind {
            OptionKind::Extended { base } => base.as_str(),
            _ => option.name.as_str(),
        }
    }

    fn standard_amount(funding: &HashMap<String, FundingInfo>, base: &str) -> u128 {
        // A missing entry or amount always fits.
        funding.get(base).map(|f| f.standard).unwrap_or(0)
    }

    fn extended_amount(funding: &HashMap<String, FundingInfo>, base: &str) -> u128 {
        funding.get(base).and_then(|f| f.extended).unwrap_or(0)
    }

    fn eligible_two_year(funding: &HashMap<String, FundingInfo>, base: &str) -> bool {
        funding.get(base).map(|f| f.eligible_two_year).unwrap_or(false)
    }
}

impl AllocationStrategy for GreedyAllocator {
    fn allocate(
        &self,
        ranked: &[&VoteOption],
        funding: &HashMap<String, FundingInfo>,
        budgets: &Budgets,
        two_year_slots: u32,
    ) -> Vec<FundingType> {
        let mut decisions: Vec<FundingType> = vec![FundingType::None; ranked.len()];

        // Standard tier first: an extended grant can never be funded without
        // its base grant, so the base decisions must exist before any
        // extended option is considered, wherever the siblings rank.
        let mut spent_standard: u128 = 0;
        for (pos, option) in ranked.iter().enumerate() {
            if !matches!(option.kind, OptionKind::Standard) {
                continue;
            }
            let amount = Self::standard_amount(funding, Self::base_name(option));
            if amount > budgets.standard || spent_standard > budgets.standard - amount {
                debug!(
                    "allocate: standard budget exhausted at {:?} (requested {}, spent {})",
                    option.name, amount, spent_standard
                );
            } else {
                decisions[pos] = FundingType::Std;
                spent_standard += amount;
            }
        }

        // Extended tier: walk in rank order, gated on the sibling decision.
        // The first `two_year_slots` gated-in options may take two-year
        // funding if they are marked eligible.
        let mut spent_extended: u128 = 0;
        let mut slots_seen: u32 = 0;
        for (pos, option) in ranked.iter().enumerate() {
            let base = match &option.kind {
                OptionKind::Extended { base } => base.as_str(),
                _ => continue,
            };
            let sibling_funded = ranked
                .iter()
                .enumerate()
                .find(|(_, o)| matches!(o.kind, OptionKind::Standard) && o.name == base)
                .map(|(p, _)| decisions[p] == FundingType::Std)
                .unwrap_or(false);
            if !sibling_funded {
                debug!(
                    "allocate: {:?} not considered, base grant {:?} unfunded",
                    option.name, base
                );
                continue;
            }

            let in_two_year_window = slots_seen < two_year_slots;
            slots_seen += 1;

            let amount = Self::extended_amount(funding, base);
            if amount > budgets.extended || spent_extended > budgets.extended - amount {
                debug!(
                    "allocate: extended budget exhausted at {:?} (requested {}, spent {})",
                    option.name, amount, spent_extended
                );
                continue;
            }
            decisions[pos] = if in_two_year_window && Self::eligible_two_year(funding, base) {
                FundingType::Ext2Y
            } else {
                FundingType::Ext1Y
            };
            spent_extended += amount;
        }

        decisions
    }
}
