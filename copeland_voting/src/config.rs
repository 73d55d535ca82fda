// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;

/// A stable identifier for an option in a grant round.
///
/// Identity is always carried by the id, never by the position of the option
/// in a list.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct OptionId(pub u32);

/// The role of an option on the ballot.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum OptionKind {
    /// A single-year (base) funding request.
    Standard,
    /// A multi-year funding request, tied to the standard request with the
    /// given base name.
    Extended { base: String },
    /// The approval cutoff pseudo-option. Everything a voter ranks below it
    /// is rejected by that voter.
    Sentinel,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct VoteOption {
    pub id: OptionId,
    pub name: String,
    pub kind: OptionKind,
}

impl VoteOption {
    pub fn standard(id: u32, name: &str) -> VoteOption {
        VoteOption {
            id: OptionId(id),
            name: name.to_string(),
            kind: OptionKind::Standard,
        }
    }

    pub fn extended(id: u32, name: &str, base: &str) -> VoteOption {
        VoteOption {
            id: OptionId(id),
            name: name.to_string(),
            kind: OptionKind::Extended {
                base: base.to_string(),
            },
        }
    }

    pub fn sentinel(id: u32, name: &str) -> VoteOption {
        VoteOption {
            id: OptionId(id),
            name: name.to_string(),
            kind: OptionKind::Sentinel,
        }
    }
}

/// The weight of a ballot, in integer base units of the governance token.
///
/// Floating point is never used for weights: totals decide funding outcomes
/// and may not drift.
#[derive(Eq, PartialEq, Debug, Clone, Copy, PartialOrd, Ord, Hash)]
pub struct VotingPower(pub u128);

impl VotingPower {
    pub const ZERO: VotingPower = VotingPower(0);

    pub(crate) fn checked_add(self, rhs: VotingPower) -> Option<VotingPower> {
        self.0.checked_add(rhs.0).map(VotingPower)
    }
}

/// A validated ranking: a permutation assigning each option of the round a
/// unique rank in `1..=N`.
///
/// Construction is the only place where the shape is checked; the rest of
/// the engine can then index without any "not found" sentinel values.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Ranking {
    // ranks[i] is the rank of the option at canonical position i.
    pub(crate) ranks: Vec<u32>,
}

impl Ranking {
    /// Builds a ranking from `(option id, rank)` pairs.
    ///
    /// Every option of the round must appear exactly once and the ranks must
    /// form a permutation of `1..=N`.
    pub fn new(pairs: &[(OptionId, u32)], options: &[VoteOption]) -> Result<Ranking, TallyError> {
        let n = options.len();
        if pairs.len() != n {
            return Err(TallyError::NotAPermutation {
                detail: format!("expected {} ranked options, got {}", n, pairs.len()),
            });
        }
        let mut ranks: Vec<u32> = vec![0; n];
        for (oid, rank) in pairs {
            let pos = options.iter().position(|o| o.id == *oid).ok_or_else(|| {
                TallyError::UnknownOption {
                    detail: format!("option id {:?} is not part of this round", oid),
                }
            })?;
            if ranks[pos] != 0 {
                return Err(TallyError::NotAPermutation {
                    detail: format!("option id {:?} is ranked twice", oid),
                });
            }
            if *rank < 1 || *rank > n as u32 {
                return Err(TallyError::NotAPermutation {
                    detail: format!("rank {} for option id {:?} is out of 1..={}", rank, oid, n),
                });
            }
            ranks[pos] = *rank;
        }
        let mut seen = vec![false; n];
        for r in ranks.iter() {
            if seen[(r - 1) as usize] {
                return Err(TallyError::NotAPermutation {
                    detail: format!("rank {} is assigned twice", r),
                });
            }
            seen[(r - 1) as usize] = true;
        }
        Ok(Ranking { ranks })
    }

    /// Builds a ranking from option ids listed in order of preference
    /// (most preferred first).
    pub fn from_order(order: &[OptionId], options: &[VoteOption]) -> Result<Ranking, TallyError> {
        let pairs: Vec<(OptionId, u32)> = order
            .iter()
            .enumerate()
            .map(|(idx, oid)| (*oid, (idx + 1) as u32))
            .collect();
        Ranking::new(&pairs, options)
    }

    /// The rank of the option at canonical position `pos` (1 is best).
    pub fn rank_at(&self, pos: usize) -> u32 {
        self.ranks[pos]
    }
}

/// One ranked ballot, weighted by the voter's voting power.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Ballot {
    pub voter: String,
    pub weight: VotingPower,
    pub ranking: Ranking,
}

/// The funding request attached to a base proposal name.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct FundingInfo {
    /// Amount requested by the extended (multi-year) variant, if any.
    pub extended: Option<u128>,
    /// Amount requested by the standard (single-year) variant.
    pub standard: u128,
    /// Whether the extended variant may be granted two-year funding.
    pub eligible_two_year: bool,
}

/// Hard budget ceilings for the two funding tiers.
///
/// Unsigned by construction: a negative figure must be rejected wherever
/// budgets are parsed, it is never clamped here.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct Budgets {
    pub standard: u128,
    pub extended: u128,
}

/// What to do with a malformed ballot.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum BallotPolicy {
    /// Fail the whole tally on the first malformed ballot.
    Strict,
    /// Skip the ballot, record it in the outcome and log a warning.
    SkipMalformed,
}

/// The rules that govern one tally.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct TallyRules {
    pub ballot_policy: BallotPolicy,
    /// How many extended options, counted in rank order among those whose
    /// standard sibling was funded, may receive two-year funding.
    pub two_year_slots: u32,
}

impl TallyRules {
    pub const DEFAULT_RULES: TallyRules = TallyRules {
        ballot_policy: BallotPolicy::Strict,
        two_year_slots: 10,
    };
}

// ******** Output data structures *********

/// The funding tier granted to an option.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum FundingType {
    /// Extended request funded for two years.
    Ext2Y,
    /// Extended request funded for one year.
    Ext1Y,
    /// Standard request funded.
    Std,
    /// Not funded.
    None,
}

/// An exact average of voting power: the total weight and the number of
/// ballots it was accumulated over.
///
/// Kept as a ratio so that comparisons stay exact; display layers may round.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct AveragePower {
    pub total: u128,
    pub ballots: u64,
}

impl AveragePower {
    pub const ZERO: AveragePower = AveragePower {
        total: 0,
        ballots: 0,
    };

    /// Exact comparison of `total / ballots` against `other`, without
    /// floating point. An empty average compares as zero.
    pub fn cmp_exact(&self, other: &AveragePower) -> std::cmp::Ordering {
        cmp_ratio(self.total, self.ballots, other.total, other.ballots)
    }

    /// The rounded-down integer mean, for display.
    pub fn mean_floor(&self) -> u128 {
        if self.ballots == 0 {
            0
        } else {
            self.total / self.ballots as u128
        }
    }
}

/// Compares a/b against c/d exactly. Zero denominators compare as zero.
pub(crate) fn cmp_ratio(a: u128, b: u64, c: u128, d: u64) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (b, d) {
        (0, 0) => return Ordering::Equal,
        (0, _) => return 0u128.cmp(&c.min(1)),
        (_, 0) => return a.min(1).cmp(&0u128),
        _ => {}
    }
    let (q1, r1) = (a / b as u128, a % b as u128);
    let (q2, r2) = (c / d as u128, c % d as u128);
    match q1.cmp(&q2) {
        Ordering::Equal => {
            // r1 < b and r2 < d, both fit in u64, so the cross products
            // cannot overflow u128.
            (r1 * d as u128).cmp(&(r2 * b as u128))
        }
        other => other,
    }
}

/// One head-to-head comparison, seen from the side of the option that owns
/// the result row.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct PairwiseComparison {
    pub opponent: OptionId,
    pub opponent_name: String,
    /// Weight accumulated for this option against the opponent.
    pub weight_for: VotingPower,
    /// Weight accumulated for the opponent.
    pub weight_against: VotingPower,
    /// Weight of ballots that ranked both sides equally.
    pub tied_weight: VotingPower,
    /// The pair winner after tie resolution, if any.
    pub winner: Option<OptionId>,
}

/// The audited result for one option, in final rank order.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct OptionResult {
    pub id: OptionId,
    pub name: String,
    /// 1-based position in the final ranking.
    pub rank: u32,
    pub funding_type: FundingType,
    pub copeland_score: u32,
    /// Pairs won strictly on aggregated weight.
    pub total_wins: u32,
    /// Pairs lost strictly on aggregated weight.
    pub total_losses: u32,
    /// Mean weight of the ballots that approved this option.
    pub avg_power_for: AveragePower,
    /// Mean weight of the remaining ballots.
    pub avg_power_against: AveragePower,
    /// Head-to-head detail, sorted by descending win margin.
    pub comparisons: Vec<PairwiseComparison>,
}

/// A ballot that was skipped under [`BallotPolicy::SkipMalformed`].
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct SkippedBallot {
    pub voter: String,
    pub reason: String,
}

/// The full outcome of a tally: results in rank order, plus every ballot
/// that was skipped. Skips are surfaced here, never dropped silently.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct TallyOutcome {
    pub results: Vec<OptionResult>,
    pub skipped: Vec<SkippedBallot>,
}

/// Errors that prevent a tally from completing.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum TallyError {
    /// The option list is empty or contains only the sentinel.
    EmptyRound,
    /// Two options share an id or a name.
    DuplicateOption { detail: String },
    /// More than one sentinel option was declared.
    MultipleSentinels,
    /// An extended option does not have exactly one standard sibling.
    MissingSibling { extended: String, base: String },
    /// A ranking is not a permutation of the round's options.
    NotAPermutation { detail: String },
    /// A ballot or ranking references an option outside the round.
    UnknownOption { detail: String },
    /// A malformed ballot under [`BallotPolicy::Strict`].
    MalformedBallot { voter: String, detail: String },
    /// Accumulated voting power exceeded the representable range.
    WeightOverflow,
}

impl Error for TallyError {}

impl Display for TallyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TallyError::EmptyRound => write!(f, "no votable options in this round"),
            TallyError::DuplicateOption { detail } => write!(f, "duplicate option: {}", detail),
            TallyError::MultipleSentinels => write!(f, "more than one sentinel option declared"),
            TallyError::MissingSibling { extended, base } => write!(
                f,
                "extended option {:?} has no standard sibling with base name {:?}",
                extended, base
            ),
            TallyError::NotAPermutation { detail } => {
                write!(f, "ranking is not a permutation: {}", detail)
            }
            TallyError::UnknownOption { detail } => write!(f, "unknown option: {}", detail),
            TallyError::MalformedBallot { voter, detail } => {
                write!(f, "malformed ballot from {:?}: {}", voter, detail)
            }
            TallyError::WeightOverflow => {
                write!(f, "total voting power exceeds the representable range")
            }
        }
    }
}
