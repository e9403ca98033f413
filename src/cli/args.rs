use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "reflectprobe",
    version,
    about = "reflected-parameter probe for XSS triage",
    long_about = "reflectprobe requests candidate URLs concurrently and reports the ones whose response body reflects the marker.\n\nExamples:\n  reflectprobe harvest -d target.tld\n  reflectprobe scan -w results/target.tld.txt -t 20 -o vulnerable.txt\n  reflectprobe scan -w urls.txt --config ~/.reflectprobe/config.yml\n\nTip: harvest writes URLs with every parameter set to the marker, ready for scan."
)]
pub struct CliArgs {
    #[arg(
        short = 'C',
        long = "config",
        global = true,
        value_name = "FILE",
        help = "Path to config file (defaults to ~/.reflectprobe/config.yml)."
    )]
    pub config: Option<String>,

    #[arg(
        short = 'n',
        long = "no-color",
        global = true,
        help = "Disable colored output."
    )]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Probe candidate URLs for a reflected marker.
    Scan(ScanArgs),
    /// Mine parameterized URLs for a domain from the Wayback Machine.
    Harvest(HarvestArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    #[arg(
        short = 'w',
        long = "wordlist",
        value_name = "FILE",
        help_heading = "Input",
        help = "File with candidate URLs (one per line)."
    )]
    pub wordlist: Option<String>,

    #[arg(
        short = 'm',
        long = "marker",
        value_name = "STRING",
        help_heading = "Input",
        help = "Marker searched for in response bodies (default xss<>)."
    )]
    pub marker: Option<String>,

    #[arg(
        short = 't',
        long = "threads",
        visible_alias = "workers",
        value_name = "N",
        help_heading = "Performance",
        help = "Number of concurrent workers (default 10)."
    )]
    pub threads: Option<usize>,

    #[arg(
        short = 'r',
        long = "rate",
        value_name = "RPS",
        help_heading = "Performance",
        help = "Request rate limit shared by all workers (requests per second)."
    )]
    pub rate: Option<u32>,

    #[arg(
        short = 'T',
        long = "timeout",
        value_name = "SECONDS",
        help_heading = "HTTP",
        help = "Per-request timeout in seconds (default 10)."
    )]
    pub timeout: Option<u64>,

    #[arg(
        short = 'p',
        long = "proxy",
        value_name = "URL",
        help_heading = "HTTP",
        help = "HTTP proxy URL (e.g. http://127.0.0.1:8080)."
    )]
    pub proxy: Option<String>,

    #[arg(
        short = 'H',
        long = "header",
        value_name = "HEADER",
        help_heading = "HTTP",
        help = "Add a header to all requests (format: 'Key: Value')."
    )]
    pub header: Option<String>,

    #[arg(
        short = 'F',
        long = "follow-redirects",
        help_heading = "HTTP",
        help = "Follow HTTP redirects."
    )]
    pub follow_redirects: bool,

    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        help_heading = "Output",
        help = "Write vulnerable URLs to a file (truncated at start)."
    )]
    pub output: Option<String>,

    #[arg(
        short = 'A',
        long = "output-format",
        value_name = "FORMAT",
        help_heading = "Output",
        help = "Final report format printed to stdout (text or json)."
    )]
    pub output_format: Option<String>,

    #[arg(
        long = "json",
        help_heading = "Output",
        help = "Shorthand for --output-format json."
    )]
    pub json: bool,

    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        help_heading = "Output",
        help = "Increase verbosity (-v shows clean URLs, -vv also failed requests)."
    )]
    pub verbose: u8,

    #[arg(
        short = 's',
        long = "silent",
        help_heading = "Output",
        help = "Hide the banner and progress line."
    )]
    pub silent: bool,
}

#[derive(Args, Debug, Clone)]
pub struct HarvestArgs {
    #[arg(
        short = 'd',
        long = "domain",
        value_name = "DOMAIN",
        help_heading = "Input",
        help = "Domain name to fetch related URLs for."
    )]
    pub domain: Option<String>,

    #[arg(
        short = 'l',
        long = "list",
        value_name = "FILE",
        help_heading = "Input",
        help = "File containing a list of domain names."
    )]
    pub list: Option<String>,

    #[arg(
        short = 'p',
        long = "placeholder",
        value_name = "STRING",
        help_heading = "Input",
        help = "Placeholder for parameter values (default xss<>)."
    )]
    pub placeholder: Option<String>,

    #[arg(
        short = 'e',
        long = "extensions",
        value_name = "EXTENSIONS",
        help_heading = "Input",
        help = "Extensions to ignore, separated by commas (replaces the built-in list)."
    )]
    pub extensions: Option<String>,

    #[arg(
        long = "proxy",
        value_name = "URL",
        help_heading = "HTTP",
        help = "Proxy address for web requests."
    )]
    pub proxy: Option<String>,

    #[arg(
        short = 's',
        long = "stream",
        help_heading = "Output",
        help = "Stream kept URLs to stdout (status lines stay on stderr)."
    )]
    pub stream: bool,

    #[arg(
        short = 'O',
        long = "output-dir",
        value_name = "DIR",
        help_heading = "Output",
        help = "Directory for per-domain result files (default results)."
    )]
    pub output_dir: Option<String>,
}
