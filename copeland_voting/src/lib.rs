mod allocation;
pub mod builder;
mod config;
pub mod quick_start;

use log::{debug, info, warn};

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

pub use crate::allocation::*;
pub use crate::config::*;

// **** Private structures ****

/// Canonical view of the round: options in input order, with the sentinel
/// and the extended/standard sibling links resolved once.
#[derive(Debug, Clone)]
struct RoundIndex {
    options: Vec<VoteOption>,
    // Canonical position of the sentinel, if the round has one.
    sentinel: Option<usize>,
    // For extended options, the canonical position of the standard sibling.
    sibling: Vec<Option<usize>>,
    // Canonical positions of all non-sentinel options.
    contenders: Vec<usize>,
}

/// Where an option stands on one normalized ballot.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
enum Standing {
    /// Approved by this voter, with its effective rank (lower is better).
    Approved(u32),
    /// Ranked at or below the cutoff by this voter.
    Rejected,
}

/// Accumulated weight for one unordered pair of contenders.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
struct PairTally {
    a_weight: u128,
    a_ballots: u64,
    b_weight: u128,
    b_ballots: u64,
    tied_weight: u128,
    tied_ballots: u64,
}

/// Decision for one pair after tie resolution: the canonical position of the
/// winner, if any.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
struct PairDecision {
    winner: Option<usize>,
}

/// Runs the full tally: normalization, pairwise tournament, Copeland
/// scoring, funding allocation and reporting.
///
/// Arguments:
/// * `coll` the ballots to process
/// * `options` the options of the round, in canonical order
/// * `funding` the funding requests, keyed by base proposal name
/// * `budgets` the two tier ceilings
/// * `rules` ballot policy and two-year slot count
pub fn run_copeland_tally(
    coll: &[Ballot],
    options: &[VoteOption],
    funding: &HashMap<String, FundingInfo>,
    budgets: &Budgets,
    rules: &TallyRules,
) -> Result<TallyOutcome, TallyError> {
    run_copeland_tally_with(coll, options, funding, budgets, rules, &GreedyAllocator)
}

/// Same as [`run_copeland_tally`], with an explicit allocation strategy.
pub fn run_copeland_tally_with(
    coll: &[Ballot],
    options: &[VoteOption],
    funding: &HashMap<String, FundingInfo>,
    budgets: &Budgets,
    rules: &TallyRules,
    strategy: &dyn AllocationStrategy,
) -> Result<TallyOutcome, TallyError> {
    info!(
        "run_copeland_tally: processing {:?} ballots over {:?} options",
        coll.len(),
        options.len()
    );

    let index = build_round_index(options)?;
    for pos in index.contenders.iter() {
        info!(
            "Option {}: {}",
            index.options[*pos].id.0, index.options[*pos].name
        );
    }

    let (accepted, skipped) = check_ballots(coll, &index, rules.ballot_policy)?;
    debug!(
        "run_copeland_tally: accepted {:?} ballots, skipped {:?}",
        accepted.len(),
        skipped.len()
    );

    // No expressed preferences: report every contender with zero statistics
    // in canonical order, nothing funded.
    if accepted.is_empty() {
        let results = index
            .contenders
            .iter()
            .enumerate()
            .map(|(rank_pos, pos)| empty_result(&index.options[*pos], (rank_pos + 1) as u32))
            .collect();
        return Ok(TallyOutcome { results, skipped });
    }

    let tournament = run_tournament(&accepted, &index)?;
    let decisions = decide_pairs(&index, &tournament);
    let order = rank_contenders(&index, &tournament, &decisions);

    let ranked: Vec<&VoteOption> = order.iter().map(|pos| &index.options[*pos]).collect();
    let funding_types = strategy.allocate(&ranked, funding, budgets, rules.two_year_slots);

    let results = build_results(&index, &tournament, &decisions, &order, &funding_types);
    Ok(TallyOutcome { results, skipped })
}

// **** Round validation ****

fn build_round_index(options: &[VoteOption]) -> Result<RoundIndex, TallyError> {
    let mut ids: HashSet<OptionId> = HashSet::new();
    let mut names: HashSet<&str> = HashSet::new();
    for o in options.iter() {
        if !ids.insert(o.id) {
            return Err(TallyError::DuplicateOption {
                detail: format!("id {:?} used by more than one option", o.id),
            });
        }
        if !names.insert(o.name.as_str()) {
            return Err(TallyError::DuplicateOption {
                detail: format!("name {:?} used by more than one option", o.name),
            });
        }
    }

    let mut sentinel: Option<usize> = None;
    for (pos, o) in options.iter().enumerate() {
        if let OptionKind::Sentinel = o.kind {
            if sentinel.is_some() {
                return Err(TallyError::MultipleSentinels);
            }
            sentinel = Some(pos);
        }
    }

    let mut sibling: Vec<Option<usize>> = vec![None; options.len()];
    for (pos, o) in options.iter().enumerate() {
        if let OptionKind::Extended { base } = &o.kind {
            let std_pos = options
                .iter()
                .position(|c| c.kind == OptionKind::Standard && c.name == *base);
            match std_pos {
                Some(p) => sibling[pos] = Some(p),
                None => {
                    return Err(TallyError::MissingSibling {
                        extended: o.name.clone(),
                        base: base.clone(),
                    })
                }
            }
        }
    }

    let contenders: Vec<usize> = options
        .iter()
        .enumerate()
        .filter_map(|(pos, o)| match o.kind {
            OptionKind::Sentinel => None,
            _ => Some(pos),
        })
        .collect();
    if contenders.is_empty() {
        return Err(TallyError::EmptyRound);
    }

    Ok(RoundIndex {
        options: options.to_vec(),
        sentinel,
        sibling,
        contenders,
    })
}

fn check_ballots(
    coll: &[Ballot],
    index: &RoundIndex,
    policy: BallotPolicy,
) -> Result<(Vec<Ballot>, Vec<SkippedBallot>), TallyError> {
    let mut accepted: Vec<Ballot> = Vec::new();
    let mut skipped: Vec<SkippedBallot> = Vec::new();
    let n = index.options.len();
    for b in coll.iter() {
        if b.ranking.ranks.len() != n {
            let detail = format!(
                "ranking covers {} options, round has {}",
                b.ranking.ranks.len(),
                n
            );
            match policy {
                BallotPolicy::Strict => {
                    return Err(TallyError::MalformedBallot {
                        voter: b.voter.clone(),
                        detail,
                    })
                }
                BallotPolicy::SkipMalformed => {
                    warn!("check_ballots: skipping ballot from {:?}: {}", b.voter, detail);
                    skipped.push(SkippedBallot {
                        voter: b.voter.clone(),
                        reason: detail,
                    });
                    continue;
                }
            }
        }
        accepted.push(b.clone());
    }
    Ok((accepted, skipped))
}

// **** Ballot normalization ****

/// Resolves the approval cutoff and the extended-implies-standard promotion
/// rule for one ballot.
fn normalize_ballot(index: &RoundIndex, ranking: &Ranking) -> Vec<Standing> {
    let cutoff: Option<u32> = index.sentinel.map(|pos| ranking.rank_at(pos));

    let mut standings: Vec<Standing> = index
        .options
        .iter()
        .enumerate()
        .map(|(pos, o)| match o.kind {
            OptionKind::Sentinel => Standing::Rejected,
            _ => {
                let raw = ranking.rank_at(pos);
                match cutoff {
                    Some(c) if raw > c => Standing::Rejected,
                    _ => Standing::Approved(raw),
                }
            }
        })
        .collect();

    // Wanting the multi-year grant implies wanting the base grant at least
    // as much: an approved extended option pulls its standard sibling to the
    // slot just above it, displacing without reordering.
    for pos in 0..index.options.len() {
        let ext_rank = match (&index.options[pos].kind, standings[pos]) {
            (OptionKind::Extended { .. }, Standing::Approved(e)) => e,
            _ => continue,
        };
        let std_pos = index.sibling[pos].expect("validated at construction");
        match standings[std_pos] {
            Standing::Approved(st) if st < ext_rank => {
                // The voter already prefers the base grant.
            }
            Standing::Approved(st) => {
                for (q, s) in standings.iter_mut().enumerate() {
                    if q == std_pos {
                        continue;
                    }
                    if let Standing::Approved(r) = s {
                        if *r >= ext_rank && *r < st {
                            *s = Standing::Approved(*r + 1);
                        }
                    }
                }
                standings[std_pos] = Standing::Approved(ext_rank);
            }
            Standing::Rejected => {
                for (q, s) in standings.iter_mut().enumerate() {
                    if q == std_pos {
                        continue;
                    }
                    if let Standing::Approved(r) = s {
                        if *r >= ext_rank {
                            *s = Standing::Approved(*r + 1);
                        }
                    }
                }
                standings[std_pos] = Standing::Approved(ext_rank);
            }
        }
    }

    standings
}

// **** Pairwise tournament ****

struct Tournament {
    // Triangular storage over canonical positions: entry for (i, j), i < j.
    pairs: Vec<PairTally>,
    n: usize,
    // Per-option approval statistics over all accepted ballots.
    approving_weight: Vec<u128>,
    approving_ballots: Vec<u64>,
    total_weight: u128,
    total_ballots: u64,
}

impl Tournament {
    fn pair(&self, i: usize, j: usize) -> &PairTally {
        debug_assert!(i < j);
        &self.pairs[i * self.n + j]
    }

    fn pair_mut(&mut self, i: usize, j: usize) -> &mut PairTally {
        debug_assert!(i < j);
        &mut self.pairs[i * self.n + j]
    }

    /// Weight for `a` against `b`, oriented; any order of arguments.
    fn weight_for(&self, a: usize, b: usize) -> u128 {
        if a < b {
            self.pair(a, b).a_weight
        } else {
            self.pair(b, a).b_weight
        }
    }

    fn tied_weight(&self, a: usize, b: usize) -> u128 {
        if a < b {
            self.pair(a, b).tied_weight
        } else {
            self.pair(b, a).tied_weight
        }
    }
}

fn run_tournament(coll: &[Ballot], index: &RoundIndex) -> Result<Tournament, TallyError> {
    let n = index.options.len();
    let mut t = Tournament {
        pairs: vec![PairTally::default(); n * n],
        n,
        approving_weight: vec![0; n],
        approving_ballots: vec![0; n],
        total_weight: 0,
        total_ballots: 0,
    };

    for ballot in coll.iter() {
        let standings = normalize_ballot(index, &ballot.ranking);
        let w = ballot.weight.0;

        t.total_weight = t
            .total_weight
            .checked_add(w)
            .ok_or(TallyError::WeightOverflow)?;
        t.total_ballots += 1;

        for pos in index.contenders.iter() {
            if let Standing::Approved(_) = standings[*pos] {
                t.approving_weight[*pos] = t.approving_weight[*pos]
                    .checked_add(w)
                    .ok_or(TallyError::WeightOverflow)?;
                t.approving_ballots[*pos] += 1;
            }
        }

        for (ci, i) in index.contenders.iter().enumerate() {
            for j in index.contenders.iter().skip(ci + 1) {
                let slot = t.pair_mut(*i, *j);
                match (standings[*i], standings[*j]) {
                    (Standing::Rejected, Standing::Rejected) => {
                        // This ballot expresses nothing about the pair.
                    }
                    (Standing::Approved(_), Standing::Rejected) => {
                        slot.a_weight =
                            slot.a_weight.checked_add(w).ok_or(TallyError::WeightOverflow)?;
                        slot.a_ballots += 1;
                    }
                    (Standing::Rejected, Standing::Approved(_)) => {
                        slot.b_weight =
                            slot.b_weight.checked_add(w).ok_or(TallyError::WeightOverflow)?;
                        slot.b_ballots += 1;
                    }
                    (Standing::Approved(ri), Standing::Approved(rj)) => match ri.cmp(&rj) {
                        Ordering::Less => {
                            slot.a_weight =
                                slot.a_weight.checked_add(w).ok_or(TallyError::WeightOverflow)?;
                            slot.a_ballots += 1;
                        }
                        Ordering::Greater => {
                            slot.b_weight =
                                slot.b_weight.checked_add(w).ok_or(TallyError::WeightOverflow)?;
                            slot.b_ballots += 1;
                        }
                        Ordering::Equal => {
                            slot.tied_weight = slot
                                .tied_weight
                                .checked_add(w)
                                .ok_or(TallyError::WeightOverflow)?;
                            slot.tied_ballots += 1;
                        }
                    },
                }
            }
        }
    }

    Ok(t)
}

// **** Copeland scoring ****

fn decide_pairs(index: &RoundIndex, t: &Tournament) -> HashMap<(usize, usize), PairDecision> {
    let mut decisions: HashMap<(usize, usize), PairDecision> = HashMap::new();
    for (ci, i) in index.contenders.iter().enumerate() {
        for j in index.contenders.iter().skip(ci + 1) {
            let p = t.pair(*i, *j);
            let winner = match p.a_weight.cmp(&p.b_weight) {
                Ordering::Greater => Some(*i),
                Ordering::Less => Some(*j),
                Ordering::Equal => {
                    // Equal aggregated weight: each side's bucket average is
                    // its win weight plus the tied weight, over the matching
                    // ballot counts. The sums stay within the round total,
                    // so they cannot overflow.
                    let a_bucket = AveragePower {
                        total: p.a_weight + p.tied_weight,
                        ballots: p.a_ballots + p.tied_ballots,
                    };
                    let b_bucket = AveragePower {
                        total: p.b_weight + p.tied_weight,
                        ballots: p.b_ballots + p.tied_ballots,
                    };
                    match a_bucket.cmp_exact(&b_bucket) {
                        Ordering::Greater => Some(*i),
                        Ordering::Less => Some(*j),
                        Ordering::Equal => None,
                    }
                }
            };
            decisions.insert((*i, *j), PairDecision { winner });
        }
    }
    decisions
}

/// Final ranking: Copeland score descending, then total approving weight
/// descending, then option id ascending.
fn rank_contenders(
    index: &RoundIndex,
    t: &Tournament,
    decisions: &HashMap<(usize, usize), PairDecision>,
) -> Vec<usize> {
    let scores = copeland_scores(index, decisions);
    let mut order = index.contenders.clone();
    order.sort_by(|a, b| {
        scores[*b]
            .cmp(&scores[*a])
            .then_with(|| t.approving_weight[*b].cmp(&t.approving_weight[*a]))
            .then_with(|| index.options[*a].id.cmp(&index.options[*b].id))
    });
    order
}

fn copeland_scores(
    index: &RoundIndex,
    decisions: &HashMap<(usize, usize), PairDecision>,
) -> Vec<u32> {
    let mut scores = vec![0u32; index.options.len()];
    for d in decisions.values() {
        if let Some(w) = d.winner {
            scores[w] += 1;
        }
    }
    scores
}

// **** Result reporting ****

fn empty_result(option: &VoteOption, rank: u32) -> OptionResult {
    OptionResult {
        id: option.id,
        name: option.name.clone(),
        rank,
        funding_type: FundingType::None,
        copeland_score: 0,
        total_wins: 0,
        total_losses: 0,
        avg_power_for: AveragePower::ZERO,
        avg_power_against: AveragePower::ZERO,
        comparisons: Vec::new(),
    }
}

fn build_results(
    index: &RoundIndex,
    t: &Tournament,
    decisions: &HashMap<(usize, usize), PairDecision>,
    order: &[usize],
    funding_types: &[FundingType],
) -> Vec<OptionResult> {
    let scores = copeland_scores(index, decisions);
    let mut results: Vec<OptionResult> = Vec::new();

    for (rank_pos, pos) in order.iter().enumerate() {
        let mut comparisons: Vec<PairwiseComparison> = Vec::new();
        let mut total_wins = 0u32;
        let mut total_losses = 0u32;

        for opp in index.contenders.iter() {
            if opp == pos {
                continue;
            }
            let weight_for = t.weight_for(*pos, *opp);
            let weight_against = t.weight_for(*opp, *pos);
            match weight_for.cmp(&weight_against) {
                Ordering::Greater => total_wins += 1,
                Ordering::Less => total_losses += 1,
                Ordering::Equal => {}
            }
            let key = if pos < opp { (*pos, *opp) } else { (*opp, *pos) };
            let winner = decisions
                .get(&key)
                .and_then(|d| d.winner)
                .map(|w| index.options[w].id);
            comparisons.push(PairwiseComparison {
                opponent: index.options[*opp].id,
                opponent_name: index.options[*opp].name.clone(),
                weight_for: VotingPower(weight_for),
                weight_against: VotingPower(weight_against),
                tied_weight: VotingPower(t.tied_weight(*pos, *opp)),
                winner,
            });
        }

        // Audit display order: best win margin first, opponent id as the
        // stable secondary key.
        comparisons.sort_by(|a, b| {
            cmp_margin(
                a.weight_for.0,
                a.weight_against.0,
                b.weight_for.0,
                b.weight_against.0,
            )
            .reverse()
            .then_with(|| a.opponent.cmp(&b.opponent))
        });

        let approving_weight = t.approving_weight[*pos];
        let approving_ballots = t.approving_ballots[*pos];
        results.push(OptionResult {
            id: index.options[*pos].id,
            name: index.options[*pos].name.clone(),
            rank: (rank_pos + 1) as u32,
            funding_type: funding_types[rank_pos],
            copeland_score: scores[*pos],
            total_wins,
            total_losses,
            avg_power_for: AveragePower {
                total: approving_weight,
                ballots: approving_ballots,
            },
            avg_power_against: AveragePower {
                total: t.total_weight - approving_weight,
                ballots: t.total_ballots - approving_ballots,
            },
            comparisons,
        });
    }

    results
}

/// Compares the margins `(f1 - g1)` and `(f2 - g2)` without leaving u128.
fn cmp_margin(f1: u128, g1: u128, f2: u128, g2: u128) -> Ordering {
    let s1 = f1.cmp(&g1);
    let s2 = f2.cmp(&g2);
    match (s1, s2) {
        (Ordering::Equal, Ordering::Equal) => Ordering::Equal,
        _ if s1 != s2 => s1.cmp(&s2),
        (Ordering::Greater, _) => (f1 - g1).cmp(&(f2 - g2)),
        (Ordering::Less, _) => (g1 - f1).cmp(&(g2 - f2)).reverse(),
        _ => Ordering::Equal,
    }
}
