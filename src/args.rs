use clap::Parser;

/// This is a Copeland grant round tabulation program.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The file containing the round description in JSON format: options,
    /// funding requests, budgets and counting rules. For more information about the file
    /// format, read the documentation.
    #[clap(short, long, value_parser)]
    pub config: String,

    /// (file path or empty) The file containing the ballots in JSON format. If not specified,
    /// the path is taken from the ballotsPath field of the round description, resolved
    /// relative to the round description file.
    #[clap(short, long, value_parser)]
    pub ballots: Option<String>,

    /// (file path) A reference file containing the outcome of a round in JSON format. If
    /// provided, grantcount will check that the tabulated output matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary of the round will be written
    /// in JSON format to the given location.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
