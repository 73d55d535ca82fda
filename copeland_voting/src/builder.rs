pub use crate::config::*;

use log::warn;

/// A builder for assembling a tally input ballot by ballot.
///
/// The builder applies the ballot policy while raw rankings are converted,
/// so malformed submissions are either rejected immediately or recorded as
/// skipped, depending on the rules.
///
/// ```
/// use copeland_voting::builder::Builder;
/// use copeland_voting::{OptionId, TallyRules, VoteOption};
/// # use copeland_voting::TallyError;
///
/// let options = vec![
///     VoteOption::standard(1, "Team A"),
///     VoteOption::standard(2, "Team B"),
/// ];
/// let mut builder = Builder::new(&TallyRules::DEFAULT_RULES, &options)?;
/// builder.add_ballot("voter-1", 100, &[OptionId(1), OptionId(2)])?;
///
/// # Ok::<(), TallyError>(())
/// ```
pub struct Builder {
    pub(crate) rules: TallyRules,
    pub(crate) options: Vec<VoteOption>,
    pub(crate) ballots: Vec<Ballot>,
    pub(crate) skipped: Vec<SkippedBallot>,
}

impl Builder {
    pub fn new(rules: &TallyRules, options: &[VoteOption]) -> Result<Builder, TallyError> {
        Ok(Builder {
            rules: rules.clone(),
            options: options.to_vec(),
            ballots: Vec::new(),
            skipped: Vec::new(),
        })
    }

    /// Adds a ballot given the option ids in order of preference, most
    /// preferred first.
    pub fn add_ballot(
        &mut self,
        voter: &str,
        weight: u128,
        order: &[OptionId],
    ) -> Result<(), TallyError> {
        match Ranking::from_order(order, &self.options) {
            Ok(ranking) => self.add_ballot_2(&Ballot {
                voter: voter.to_string(),
                weight: VotingPower(weight),
                ranking,
            }),
            Err(e) => match self.rules.ballot_policy {
                BallotPolicy::Strict => Err(TallyError::MalformedBallot {
                    voter: voter.to_string(),
                    detail: e.to_string(),
                }),
                BallotPolicy::SkipMalformed => {
                    warn!("add_ballot: skipping ballot from {:?}: {}", voter, e);
                    self.skipped.push(SkippedBallot {
                        voter: voter.to_string(),
                        reason: e.to_string(),
                    });
                    Ok(())
                }
            },
        }
    }

    /// Adds a pre-validated ballot as-is.
    pub fn add_ballot_2(&mut self, ballot: &Ballot) -> Result<(), TallyError> {
        self.ballots.push(ballot.clone());
        Ok(())
    }

    /// Runs the tally over everything added so far.
    pub fn tally(
        &self,
        funding: &std::collections::HashMap<String, FundingInfo>,
        budgets: &Budgets,
    ) -> Result<TallyOutcome, TallyError> {
        let mut outcome =
            crate::run_copeland_tally(&self.ballots, &self.options, funding, budgets, &self.rules)?;
        // Ballots skipped at submission time are part of the outcome too.
        let mut skipped = self.skipped.clone();
        skipped.extend(outcome.skipped);
        outcome.skipped = skipped;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn builder_applies_the_skip_policy() {
        let options = vec![
            VoteOption::standard(1, "Team A"),
            VoteOption::standard(2, "Team B"),
        ];
        let rules = TallyRules {
            ballot_policy: BallotPolicy::SkipMalformed,
            ..TallyRules::DEFAULT_RULES
        };
        let mut builder = Builder::new(&rules, &options).unwrap();
        builder
            .add_ballot("good", 10, &[OptionId(1), OptionId(2)])
            .unwrap();
        // Unknown option id: skipped, not an error.
        builder
            .add_ballot("bad", 10, &[OptionId(1), OptionId(9)])
            .unwrap();
        let outcome = builder
            .tally(
                &HashMap::new(),
                &Budgets {
                    standard: 0,
                    extended: 0,
                },
            )
            .unwrap();
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].voter, "bad");
        assert_eq!(outcome.results[0].name, "Team A");
    }

    #[test]
    fn builder_rejects_malformed_under_strict() {
        let options = vec![
            VoteOption::standard(1, "Team A"),
            VoteOption::standard(2, "Team B"),
        ];
        let mut builder = Builder::new(&TallyRules::DEFAULT_RULES, &options).unwrap();
        let err = builder
            .add_ballot("v", 10, &[OptionId(1), OptionId(1)])
            .unwrap_err();
        assert!(matches!(err, TallyError::MalformedBallot { .. }));
    }
}
