use crate::tally::*;

/// A ballot, as parsed from the ballots file.
/// This is before checking the choices against the round's options.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ParsedBallot {
    pub voter: String,
    pub weight: u128,
    pub choice: Vec<u32>,
}

/// Reads a ballots file: either an object with a top-level "ballots" array or
/// a bare array of ballots. Each ballot carries the voter address, the voting
/// power (number or decimal string) and the option ids in order of preference,
/// most preferred first.
pub fn read_ballots_file(path: String) -> CliResult<Vec<ParsedBallot>> {
    info!("Attempting to read ballots file {:?}", path);
    let contents = fs::read_to_string(path.clone()).context(OpeningFileSnafu {
        path: path.clone(),
    })?;
    let js: JSValue =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    let rows = match &js {
        JSValue::Array(l) => l.as_slice(),
        JSValue::Object(_) => match js["ballots"].as_array() {
            Some(l) => l.as_slice(),
            None => {
                whatever!("The ballots file has no top-level ballots array")
            }
        },
        _ => {
            whatever!("The ballots file is neither an array nor an object")
        }
    };
    let mut res: Vec<ParsedBallot> = Vec::new();
    for row in rows.iter() {
        res.push(read_ballot(row)?);
    }
    Ok(res)
}

fn read_ballot(row: &JSValue) -> CliResult<ParsedBallot> {
    let voter = match row["voter"].as_str() {
        Some(s) => s.to_string(),
        None => {
            whatever!("Ballot is missing a voter address: {:?}", row)
        }
    };
    let weight = read_js_u128(&row["weight"])?;
    let choice = match row["choice"].as_array() {
        Some(l) => {
            let mut ids: Vec<u32> = Vec::new();
            for elt in l.iter() {
                match elt.as_u64() {
                    Some(x) if x <= u32::MAX as u64 => ids.push(x as u32),
                    _ => {
                        whatever!("Ballot from {:?} has an invalid choice entry {:?}", voter, elt)
                    }
                }
            }
            ids
        }
        None => {
            whatever!("Ballot from {:?} is missing its choice array", voter)
        }
    };
    debug!("ballot from {:?}: weight {} choice {:?}", voter, weight, choice);
    Ok(ParsedBallot {
        voter,
        weight,
        choice,
    })
}
