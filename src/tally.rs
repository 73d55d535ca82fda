use log::{debug, info, warn};

use copeland_voting::builder::Builder;
use copeland_voting::*;
use snafu::{prelude::*, Snafu};

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::tally::config_reader::*;

pub mod io_ballots;

#[derive(Debug, Snafu)]
pub enum CliError {
    #[snafu(display("Error opening file {path}"))]
    OpeningFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON in {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Could not read {value} as a token amount"))]
    ParsingAmount { value: String },
    #[snafu(display(""))]
    MissingParentDir {},
    #[snafu(display("No ballots file given on the command line or in the round description"))]
    MissingBallotsPath {},

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type CliResult<T> = Result<T, CliError>;

pub mod config_reader {
    use crate::tally::*;

    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct RoundOption {
        pub id: u32,
        pub name: String,
        /// One of "standard" (the default), "extended" or "noneBelow".
        pub kind: Option<String>,
        /// For extended options, the name of the standard proposal they extend.
        pub base: Option<String>,
    }

    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct RoundFunding {
        #[serde(rename = "ext")]
        _ext: Option<JSValue>,
        #[serde(rename = "std")]
        _std: JSValue,
        #[serde(rename = "isEligibleFor2Y")]
        pub is_eligible_for_2y: Option<bool>,
    }

    impl RoundFunding {
        pub fn ext_amount(&self) -> CliResult<Option<u128>> {
            match &self._ext {
                None | Some(JSValue::Null) => Ok(None),
                Some(x) => Ok(Some(read_js_u128(x)?)),
            }
        }

        pub fn std_amount(&self) -> CliResult<u128> {
            read_js_u128(&self._std)
        }
    }

    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct RoundBudgets {
        #[serde(rename = "standard")]
        _standard: JSValue,
        #[serde(rename = "extended")]
        _extended: JSValue,
    }

    impl RoundBudgets {
        pub fn standard(&self) -> CliResult<u128> {
            read_js_u128(&self._standard)
        }

        pub fn extended(&self) -> CliResult<u128> {
            read_js_u128(&self._extended)
        }
    }

    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct RoundRules {
        #[serde(rename = "ballotPolicy")]
        pub ballot_policy: Option<String>,
        #[serde(rename = "twoYearSlots")]
        pub two_year_slots: Option<u32>,
    }

    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct RoundConfig {
        #[serde(rename = "roundName")]
        pub round_name: String,
        #[serde(rename = "ballotsPath")]
        pub ballots_path: Option<String>,
        pub options: Vec<RoundOption>,
        #[serde(rename = "fundingInfo")]
        pub funding_info: HashMap<String, RoundFunding>,
        pub budgets: RoundBudgets,
        pub rules: Option<RoundRules>,
    }

    pub fn read_summary(path: String) -> CliResult<JSValue> {
        let contents = fs::read_to_string(path.clone()).context(OpeningFileSnafu {
            path: path.clone(),
        })?;
        debug!("read content: {:?}", contents);
        let js: JSValue =
            serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
        Ok(js)
    }

    /// Amounts are accepted as JSON numbers or as decimal strings. Strings are
    /// the reliable form for amounts above 2^53 in base token units.
    pub fn read_js_u128(x: &JSValue) -> CliResult<u128> {
        match x {
            JSValue::Number(n) => n
                .as_u64()
                .map(|v| v as u128)
                .context(ParsingAmountSnafu {
                    value: n.to_string(),
                }),
            JSValue::String(s) => s
                .parse::<u128>()
                .ok()
                .context(ParsingAmountSnafu { value: s.clone() }),
            x => None.context(ParsingAmountSnafu {
                value: x.to_string(),
            }),
        }
    }
}

fn validate_options(raw: &[RoundOption]) -> CliResult<Vec<VoteOption>> {
    let mut res: Vec<VoteOption> = Vec::new();
    for o in raw.iter() {
        let opt = match o.kind.as_deref().unwrap_or("standard") {
            "standard" => VoteOption::standard(o.id, &o.name),
            "extended" => match &o.base {
                Some(base) => VoteOption::extended(o.id, &o.name, base),
                None => {
                    whatever!("Extended option {:?} is missing its base proposal name", o.name)
                }
            },
            "noneBelow" => VoteOption::sentinel(o.id, &o.name),
            x => {
                whatever!("Unknown option kind {:?} for option {:?}", x, o.name)
            }
        };
        res.push(opt);
    }
    Ok(res)
}

fn validate_rules(raw: &Option<RoundRules>) -> CliResult<TallyRules> {
    let mut rules = TallyRules::DEFAULT_RULES;
    if let Some(r) = raw {
        rules.ballot_policy = match r.ballot_policy.as_deref() {
            None | Some("strict") => BallotPolicy::Strict,
            Some("skipMalformed") => BallotPolicy::SkipMalformed,
            Some(x) => {
                whatever!("Unknown ballot policy {:?}", x)
            }
        };
        if let Some(slots) = r.two_year_slots {
            rules.two_year_slots = slots;
        }
    }
    Ok(rules)
}

fn validate_funding(
    raw: &HashMap<String, RoundFunding>,
) -> CliResult<HashMap<String, FundingInfo>> {
    let mut res: HashMap<String, FundingInfo> = HashMap::new();
    for (name, rf) in raw.iter() {
        res.insert(
            name.clone(),
            FundingInfo {
                extended: rf.ext_amount()?,
                standard: rf.std_amount()?,
                eligible_two_year: rf.is_eligible_for_2y.unwrap_or(false),
            },
        );
    }
    Ok(res)
}

fn funding_type_label(ft: FundingType) -> &'static str {
    match ft {
        FundingType::Ext2Y => "EXT2Y",
        FundingType::Ext1Y => "EXT1Y",
        FundingType::Std => "STD",
        FundingType::None => "None",
    }
}

fn result_rows_to_json(outcome: &TallyOutcome) -> Vec<JSValue> {
    let mut l: Vec<JSValue> = Vec::new();
    for r in outcome.results.iter() {
        let comparisons: Vec<JSValue> = r
            .comparisons
            .iter()
            .map(|c| {
                json!({
                    "opponent": c.opponent_name,
                    "weightFor": c.weight_for.0.to_string(),
                    "weightAgainst": c.weight_against.0.to_string(),
                    "tiedWeight": c.tied_weight.0.to_string(),
                    "winner": c.winner.map(|id| id.0),
                })
            })
            .collect();
        l.push(json!({
            "rank": r.rank,
            "name": r.name,
            "fundingType": funding_type_label(r.funding_type),
            "copelandScore": r.copeland_score.to_string(),
            "totalWins": r.total_wins,
            "totalLosses": r.total_losses,
            "avgPowerFor": r.avg_power_for.mean_floor().to_string(),
            "avgPowerAgainst": r.avg_power_against.mean_floor().to_string(),
            "comparisons": comparisons,
        }));
    }
    l
}

fn build_summary_js(config: &RoundConfig, outcome: &TallyOutcome) -> JSValue {
    let skipped: Vec<JSValue> = outcome
        .skipped
        .iter()
        .map(|s| json!({"voter": s.voter, "reason": s.reason}))
        .collect();
    json!({
        "config": { "round": config.round_name },
        "results": result_rows_to_json(outcome),
        "skipped": skipped,
    })
}

fn resolve_ballots_path(
    config_path: &str,
    config: &RoundConfig,
    cli_override: Option<String>,
) -> CliResult<String> {
    if let Some(p) = cli_override {
        return Ok(p);
    }
    let lpath = config
        .ballots_path
        .clone()
        .context(MissingBallotsPathSnafu {})?;
    let root_p = Path::new(config_path)
        .parent()
        .context(MissingParentDirSnafu {})?;
    let p: PathBuf = [root_p.as_os_str().to_str().unwrap_or(""), lpath.as_str()]
        .iter()
        .collect();
    Ok(p.as_path().display().to_string())
}

pub fn run_tally(
    config_path: String,
    ballots_path: Option<String>,
    out_path: Option<String>,
    check_summary_path: Option<String>,
) -> CliResult<()> {
    let config_str = fs::read_to_string(config_path.clone()).context(OpeningFileSnafu {
        path: config_path.clone(),
    })?;
    let config: RoundConfig = serde_json::from_str(&config_str).context(ParsingJsonSnafu {
        path: config_path.clone(),
    })?;
    info!("config: {:?}", config);

    let options = validate_options(&config.options)?;
    let rules = validate_rules(&config.rules)?;
    let funding = validate_funding(&config.funding_info)?;
    let budgets = Budgets {
        standard: config.budgets.standard()?,
        extended: config.budgets.extended()?,
    };

    let ballots_p = resolve_ballots_path(config_path.as_str(), &config, ballots_path)?;
    let parsed_ballots = io_ballots::read_ballots_file(ballots_p)?;
    info!("read {} ballots", parsed_ballots.len());

    let mut builder = match Builder::new(&rules, &options) {
        Ok(b) => b,
        Err(e) => {
            whatever!("Invalid round description: {}", e)
        }
    };
    for pb in parsed_ballots.iter() {
        let order: Vec<OptionId> = pb.choice.iter().map(|i| OptionId(*i)).collect();
        if let Err(e) = builder.add_ballot(&pb.voter, pb.weight, &order) {
            whatever!("Counting error on ballot from {:?}: {}", pb.voter, e)
        }
    }

    let outcome = match builder.tally(&funding, &budgets) {
        Ok(x) => x,
        Err(e) => {
            whatever!("Counting error: {}", e)
        }
    };

    // Assemble the final json
    let result_js = build_summary_js(&config, &outcome);
    let pretty_js_stats = serde_json::to_string_pretty(&result_js).context(ParsingJsonSnafu {
        path: "<summary>".to_string(),
    })?;

    match out_path.as_deref() {
        None | Some("stdout") => {
            println!("{}", pretty_js_stats);
        }
        Some(p) => {
            fs::write(p, pretty_js_stats.as_str()).context(OpeningFileSnafu {
                path: p.to_string(),
            })?;
        }
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = check_summary_path {
        let summary_ref = read_summary(summary_p)?;
        info!("summary: {:?}", summary_ref);
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(ParsingJsonSnafu {
                path: "<reference>".to_string(),
            })?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference string");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            whatever!("Difference detected between calculated summary and reference summary")
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_config(ballots_path: Option<&str>) -> String {
        let ballots = match ballots_path {
            Some(p) => format!(r#""ballotsPath": "{}","#, p),
            None => "".to_string(),
        };
        format!(
            r#"{{
                "roundName": "test round",
                {}
                "options": [
                    {{"id": 1, "name": "Team A"}},
                    {{"id": 2, "name": "Team A (Extended)", "kind": "extended", "base": "Team A"}},
                    {{"id": 3, "name": "Team B"}},
                    {{"id": 4, "name": "None below", "kind": "noneBelow"}}
                ],
                "fundingInfo": {{
                    "Team A": {{"ext": "500000", "std": 300000, "isEligibleFor2Y": true}},
                    "Team B": {{"ext": null, "std": 200000}}
                }},
                "budgets": {{"standard": "600000", "extended": "500000"}},
                "rules": {{"ballotPolicy": "skipMalformed", "twoYearSlots": 10}}
            }}"#,
            ballots
        )
    }

    #[test]
    fn round_config_parses_and_validates() {
        let config: RoundConfig = serde_json::from_str(round_config(None).as_str()).unwrap();
        let options = validate_options(&config.options).unwrap();
        assert_eq!(options.len(), 4);
        assert_eq!(options[0], VoteOption::standard(1, "Team A"));
        assert_eq!(
            options[1],
            VoteOption::extended(2, "Team A (Extended)", "Team A")
        );
        assert_eq!(options[3], VoteOption::sentinel(4, "None below"));

        let rules = validate_rules(&config.rules).unwrap();
        assert_eq!(rules.ballot_policy, BallotPolicy::SkipMalformed);
        assert_eq!(rules.two_year_slots, 10);

        let funding = validate_funding(&config.funding_info).unwrap();
        assert_eq!(funding["Team A"].extended, Some(500_000));
        assert_eq!(funding["Team A"].standard, 300_000);
        assert!(funding["Team A"].eligible_two_year);
        assert_eq!(funding["Team B"].extended, None);
        assert!(!funding["Team B"].eligible_two_year);

        assert_eq!(config.budgets.standard().unwrap(), 600_000);
        assert_eq!(config.budgets.extended().unwrap(), 500_000);
    }

    #[test]
    fn extended_option_requires_a_base() {
        let raw = vec![RoundOption {
            id: 1,
            name: "X (Extended)".to_string(),
            kind: Some("extended".to_string()),
            base: None,
        }];
        assert!(validate_options(&raw).is_err());
    }

    #[test]
    fn unknown_option_kind_is_rejected() {
        let raw = vec![RoundOption {
            id: 1,
            name: "X".to_string(),
            kind: Some("ranked".to_string()),
            base: None,
        }];
        assert!(validate_options(&raw).is_err());
    }

    #[test]
    fn amounts_parse_from_numbers_and_strings() {
        assert_eq!(read_js_u128(&json!(42)).unwrap(), 42);
        // Above 2^64, only the string form works.
        assert_eq!(
            read_js_u128(&json!("36893488147419103232")).unwrap(),
            36_893_488_147_419_103_232
        );
        assert!(read_js_u128(&json!(-1)).is_err());
        assert!(read_js_u128(&json!("1.5")).is_err());
        assert!(read_js_u128(&json!(null)).is_err());
    }

    #[test]
    fn summary_encodes_weights_as_strings() {
        let config: RoundConfig = serde_json::from_str(round_config(None).as_str()).unwrap();
        let options = validate_options(&config.options).unwrap();
        let rules = validate_rules(&config.rules).unwrap();
        let funding = validate_funding(&config.funding_info).unwrap();
        let budgets = Budgets {
            standard: config.budgets.standard().unwrap(),
            extended: config.budgets.extended().unwrap(),
        };

        let mut builder = Builder::new(&rules, &options).unwrap();
        builder
            .add_ballot("0x1", 1000, &[OptionId(2), OptionId(1), OptionId(3), OptionId(4)])
            .unwrap();
        builder
            .add_ballot("0x2", 400, &[OptionId(3), OptionId(4), OptionId(1), OptionId(2)])
            .unwrap();
        let outcome = builder.tally(&funding, &budgets).unwrap();

        let js = build_summary_js(&config, &outcome);
        assert_eq!(js["config"]["round"], json!("test round"));
        let rows = js["results"].as_array().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["rank"], json!(1));
        assert!(rows[0]["copelandScore"].is_string());
        assert!(rows[0]["comparisons"][0]["weightFor"].is_string());
        assert_eq!(js["skipped"], json!([]));
    }

    #[test]
    fn run_tally_end_to_end_with_files() {
        let dir = std::env::temp_dir().join("grantcount_e2e_test");
        fs::create_dir_all(&dir).unwrap();
        let config_p = dir.join("round.json");
        let ballots_p = dir.join("ballots.json");
        let out_p = dir.join("summary.json");
        fs::write(&config_p, round_config(Some("ballots.json"))).unwrap();
        fs::write(
            &ballots_p,
            r#"{"ballots": [
                {"voter": "0x1", "weight": "1000", "choice": [2, 1, 3, 4]},
                {"voter": "0x2", "weight": 400, "choice": [3, 4, 1, 2]}
            ]}"#,
        )
        .unwrap();

        run_tally(
            config_p.display().to_string(),
            None,
            Some(out_p.display().to_string()),
            None,
        )
        .unwrap();

        let js = read_summary(out_p.display().to_string()).unwrap();
        let rows = js["results"].as_array().unwrap();
        assert_eq!(rows[0]["name"], json!("Team A"));
        assert_eq!(rows[0]["fundingType"], json!("STD"));
        let ext_row = rows
            .iter()
            .find(|r| r["name"] == json!("Team A (Extended)"))
            .unwrap();
        assert_eq!(ext_row["fundingType"], json!("EXT2Y"));

        // The summary we just wrote is its own reference.
        run_tally(
            config_p.display().to_string(),
            None,
            Some("stdout".to_string()),
            Some(out_p.display().to_string()),
        )
        .unwrap();
    }
}
