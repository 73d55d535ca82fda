/*!

# Quick start

This example tallies a small grant round end to end: three teams, each with a
standard (single-year) request, one of them also asking for an extended
(multi-year) grant, and a "none below" cutoff option.

```
use std::collections::HashMap;

use copeland_voting::{
    run_copeland_tally, Budgets, FundingInfo, FundingType, OptionId, Ranking, Ballot,
    TallyRules, VoteOption, VotingPower,
};
# use copeland_voting::TallyError;

// The options of the round, in the order they appeared on the ballot.
let options = vec![
    VoteOption::standard(1, "Indexers"),
    VoteOption::extended(2, "Indexers (Extended)", "Indexers"),
    VoteOption::standard(3, "Tooling"),
    VoteOption::standard(4, "Docs"),
    VoteOption::sentinel(5, "None below"),
];

// Funding requests, keyed by base proposal name, in base token units.
let mut funding = HashMap::new();
funding.insert(
    "Indexers".to_string(),
    FundingInfo { extended: Some(500_000), standard: 300_000, eligible_two_year: true },
);
funding.insert(
    "Tooling".to_string(),
    FundingInfo { extended: None, standard: 200_000, eligible_two_year: false },
);
funding.insert(
    "Docs".to_string(),
    FundingInfo { extended: None, standard: 150_000, eligible_two_year: false },
);

// Two ballots. Ids are listed most preferred first; everything after the
// sentinel is rejected by that voter.
let ids = |order: &[u32]| order.iter().map(|i| OptionId(*i)).collect::<Vec<_>>();
let ballots = vec![
    Ballot {
        voter: "0x1111".to_string(),
        weight: VotingPower(1_000),
        ranking: Ranking::from_order(&ids(&[2, 1, 3, 5, 4]), &options)?,
    },
    Ballot {
        voter: "0x2222".to_string(),
        weight: VotingPower(400),
        ranking: Ranking::from_order(&ids(&[3, 4, 1, 2, 5]), &options)?,
    },
];

let budgets = Budgets { standard: 650_000, extended: 500_000 };
let outcome = run_copeland_tally(
    &ballots,
    &options,
    &funding,
    &budgets,
    &TallyRules::DEFAULT_RULES,
)?;

// Results come back in final rank order, with funding decisions attached.
assert_eq!(outcome.results[0].name, "Indexers");
assert_eq!(outcome.results[0].funding_type, FundingType::Std);
let extended = outcome.results.iter().find(|r| r.name == "Indexers (Extended)").unwrap();
assert_eq!(extended.funding_type, FundingType::Ext2Y);

# Ok::<(), TallyError>(())
```

Weights are plain integers in the token's base units; the engine never uses
floating point internally. The two averages on each result row come back as
exact `total / ballots` ratios, so presentation layers choose their own
rounding.

*/
