use std::collections::HashMap;
use std::io::Write;

use clap::{error::ErrorKind, CommandFactory, Parser};

use crate::cli::args::{CliArgs, Command, HarvestArgs, ScanArgs};
use crate::cli::validation;
use crate::config::{self, ConfigFile};
use crate::harvest::{self, HarvestOptions, TokioSleeper};
use crate::output::{self, format_kv_line, OutputFormat};
use crate::probe;
use crate::runner::{CandidateSource, Options, Runner};
use crate::utils;

fn print_banner() {
    const BANNER: &str = r#"
            __ _           _                       _
  _ __ ___ / _| | ___  ___| |_ _ __  _ __ ___  ___| |__   ___
 | '__/ _ \ |_| |/ _ \/ __| __| '_ \| '__/ _ \/ _ \ '_ \ / _ \
 | | |  __/  _| |  __/ (__| |_| |_) | | | (_) | (_) | |_) |  __/
 |_|  \___|_| |_|\___|\___|\__| .__/|_|  \___/ \___/|_.__/ \___|
                              |_|
       v0.1.0 - reflected parameter probe
    "#;
    eprint!("{}", BANNER);
    eprintln!();
}

fn render_custom_help(cmd: &clap::Command, usage: &str) -> String {
    let mut out = String::new();

    if let Some(version) = cmd.get_version() {
        out.push_str(cmd.get_name());
        out.push(' ');
        out.push_str(version);
        out.push('\n');
    } else {
        out.push_str(usage);
        out.push('\n');
    }

    if let Some(about) = cmd.get_about() {
        out.push_str(&about.to_string());
        out.push('\n');
    }

    if let Some(long_about) = cmd.get_long_about() {
        out.push('\n');
        out.push_str(&long_about.to_string());
        out.push('\n');
    }

    out.push('\n');
    out.push_str("Usage: ");
    out.push_str(usage);
    if cmd.has_subcommands() {
        out.push_str(" <COMMAND>");
    }
    out.push_str(" [OPTIONS]\n\n");

    let commands: Vec<&clap::Command> = cmd
        .get_subcommands()
        .filter(|sub| !sub.is_hide_set() && sub.get_name() != "help")
        .collect();
    if !commands.is_empty() {
        out.push_str("Commands:\n");
        for sub in commands {
            out.push_str(&format!("  {:<10}", sub.get_name()));
            if let Some(about) = sub.get_about() {
                out.push_str(&about.to_string());
            }
            out.push('\n');
        }
        out.push('\n');
    }

    let mut sections: Vec<(String, Vec<&clap::Arg>)> = Vec::new();
    let mut section_idx: HashMap<String, usize> = HashMap::new();

    for arg in cmd.get_arguments() {
        if arg.is_hide_set() {
            continue;
        }

        let heading = arg.get_help_heading().unwrap_or("Options").to_string();

        let idx = match section_idx.get(&heading).copied() {
            Some(i) => i,
            None => {
                sections.push((heading.clone(), Vec::new()));
                let i = sections.len() - 1;
                section_idx.insert(heading, i);
                i
            }
        };

        sections[idx].1.push(arg);
    }

    for (heading, args) in sections {
        out.push_str(&heading);
        out.push_str(":\n");

        for arg in args {
            let mut parts: Vec<String> = Vec::new();

            if let Some(short) = arg.get_short() {
                parts.push(format!("-{short}"));
            }

            if let Some(long) = arg.get_long() {
                parts.push(format!("--{long}"));
            }

            if let Some(aliases) = arg.get_visible_aliases() {
                for alias in aliases {
                    let rendered = format!("--{alias}");
                    if !parts.iter().any(|p| p == &rendered) {
                        parts.push(rendered);
                    }
                }
            }

            let mut flags = parts.join(", ");

            if arg.get_action().takes_values() {
                let value_name = arg
                    .get_value_names()
                    .and_then(|names| names.first())
                    .map(|name| name.as_str())
                    .unwrap_or("VALUE");
                flags.push_str(&format!(" <{value_name}>"));
            }

            out.push_str("  ");
            out.push_str(&flags);
            out.push('\n');

            if let Some(help) = arg.get_help() {
                let help = help.to_string();
                if !help.trim().is_empty() {
                    out.push_str("          ");
                    out.push_str(help.trim());
                    out.push('\n');
                }
            }

            out.push('\n');
        }
    }

    out
}

/// Renders help for the subcommand named on the command line, or the top level.
fn help_for(argv: &[String]) -> String {
    let mut cmd = CliArgs::command();
    cmd.build();
    let name = cmd.get_name().to_string();
    let sub = argv
        .iter()
        .skip(1)
        .find_map(|a| cmd.find_subcommand(a.as_str()).cloned());
    match sub {
        Some(sub) => {
            let usage = format!("{name} {}", sub.get_name());
            render_custom_help(&sub, &usage)
        }
        None => render_custom_help(&cmd, &name),
    }
}

#[derive(Clone, Debug)]
struct ScanRun {
    options: Options,
    format: OutputFormat,
    silent: bool,
    no_color: bool,
}

fn build_scan_config(args: ScanArgs, no_color: bool, cfg: ConfigFile) -> Result<ScanRun, String> {
    validation::validate_scan(&args)?;

    let wordlist = args
        .wordlist
        .or(cfg.wordlist)
        .filter(|w| !w.trim().is_empty())
        .ok_or_else(|| "a wordlist is required (-w/--wordlist)".to_string())?;

    let marker = args
        .marker
        .or(cfg.marker)
        .unwrap_or_else(|| probe::DEFAULT_MARKER.to_string());
    if marker.is_empty() {
        return Err("marker must not be empty".to_string());
    }

    let workers = args.threads.or(cfg.threads).unwrap_or(10);
    if workers == 0 {
        return Err("invalid threads, expected at least 1".to_string());
    }
    let timeout_seconds = args.timeout.or(cfg.timeout).unwrap_or(10);
    let rate = args.rate.or(cfg.rate).filter(|r| *r > 0);
    let proxy = args.proxy.or(cfg.proxy).filter(|p| !p.trim().is_empty());
    let header = args.header.or(cfg.header).filter(|h| !h.trim().is_empty());
    let follow_redirects = args.follow_redirects || cfg.follow_redirects.unwrap_or(false);
    let output = args.output.or(cfg.output).filter(|o| !o.trim().is_empty());
    let verbose = if args.verbose > 0 {
        args.verbose
    } else {
        cfg.verbose.unwrap_or(0)
    };
    let silent = args.silent || cfg.silent.unwrap_or(false);

    let format = if args.json {
        OutputFormat::Json
    } else {
        let raw = args
            .output_format
            .or(cfg.output_format)
            .unwrap_or_else(|| "text".to_string());
        OutputFormat::parse(&raw)
            .ok_or_else(|| format!("invalid output format '{raw}', expected text or json"))?
    };

    Ok(ScanRun {
        options: Options {
            candidates: CandidateSource::FilePath(config::expand_tilde_string(&wordlist)),
            output,
            marker,
            workers,
            timeout_seconds,
            proxy,
            header,
            follow_redirects,
            rate,
            verbose,
            show_progress: !silent,
        },
        format,
        silent,
        no_color: no_color || cfg.no_color.unwrap_or(false),
    })
}

#[derive(Clone, Debug)]
struct HarvestRun {
    domain: Option<String>,
    list: Option<String>,
    options: HarvestOptions,
    no_color: bool,
}

fn build_harvest_config(
    args: HarvestArgs,
    no_color: bool,
    cfg: ConfigFile,
) -> Result<HarvestRun, String> {
    validation::validate_harvest(&args)?;

    let domain = args.domain.filter(|d| !d.trim().is_empty());
    let list = args.list.filter(|l| !l.trim().is_empty());
    if domain.is_none() && list.is_none() {
        return Err("please provide a domain (-d) or a list of domains (-l)".to_string());
    }

    let harvest_cfg = cfg.harvest;
    let extensions = match args.extensions.or(harvest_cfg.extensions) {
        Some(raw) => utils::parse_extensions_csv(&raw)
            .map_err(|e| format!("invalid extensions '{raw}': {e}"))?,
        None => utils::default_extensions(),
    };
    let placeholder = args
        .placeholder
        .or(harvest_cfg.placeholder)
        .unwrap_or_else(|| probe::DEFAULT_MARKER.to_string());
    if placeholder.is_empty() {
        return Err("placeholder must not be empty".to_string());
    }
    let proxy = args
        .proxy
        .or(harvest_cfg.proxy)
        .or(cfg.proxy)
        .filter(|p| !p.trim().is_empty());
    let output_dir = args
        .output_dir
        .or(harvest_cfg.output_dir)
        .map(|d| config::expand_tilde_string(&d))
        .unwrap_or_else(|| "results".to_string());
    let stream = args.stream || harvest_cfg.stream.unwrap_or(false);

    Ok(HarvestRun {
        domain,
        list,
        options: HarvestOptions {
            extensions,
            placeholder,
            proxy,
            stream,
            output_dir,
            ..HarvestOptions::default()
        },
        no_color: no_color || cfg.no_color.unwrap_or(false),
    })
}

fn format_opt_value<'a>(v: Option<&'a str>, default: &'a str) -> &'a str {
    match v {
        Some(v) if !v.trim().is_empty() => v,
        _ => default,
    }
}

fn format_bool(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Runs a scan and writes the final report to `out`. Banner, settings and
/// per-candidate lines go to stderr, so `out` carries nothing but the report.
async fn run_scan_async(run: ScanRun, out: &mut (dyn Write + Send)) -> Result<(), String> {
    if run.no_color {
        colored::control::set_override(false);
    }

    let opts = &run.options;
    if !run.silent {
        print_banner();
        let wordlist = match &opts.candidates {
            CandidateSource::FilePath(path) => path.as_str(),
            CandidateSource::Inline(_) => "inline",
        };
        eprintln!("{}", format_kv_line("Wordlist", wordlist));
        eprintln!("{}", format_kv_line("Marker", &opts.marker));
        eprintln!("{}", format_kv_line("Threads", &opts.workers.to_string()));
        eprintln!(
            "{}",
            format_kv_line("Timeout", &format!("{}s", opts.timeout_seconds))
        );
        let rate = opts.rate.map(|r| format!("{r}/s"));
        eprintln!(
            "{}",
            format_kv_line("Rate", format_opt_value(rate.as_deref(), "unlimited"))
        );
        eprintln!(
            "{}",
            format_kv_line("Proxy", format_opt_value(opts.proxy.as_deref(), "none"))
        );
        eprintln!(
            "{}",
            format_kv_line("Header", format_opt_value(opts.header.as_deref(), "none"))
        );
        eprintln!(
            "{}",
            format_kv_line("Redirects", format_bool(opts.follow_redirects))
        );
        eprintln!(
            "{}",
            format_kv_line("Output", format_opt_value(opts.output.as_deref(), "none"))
        );
        eprintln!();
    }

    let runner = Runner::new(run.options).map_err(|e| e.to_string())?;
    let report = runner.run().await.map_err(|e| e.to_string())?;

    let mut rendered = output::render(&report, run.format);
    if run.format == OutputFormat::Json {
        rendered.push('\n');
    }
    out.write_all(rendered.as_bytes())
        .and_then(|_| out.flush())
        .map_err(|e| format!("failed to write report: {e}"))
}

async fn run_harvest_async(run: HarvestRun) -> Result<(), String> {
    if run.no_color {
        colored::control::set_override(false);
    }
    print_banner();

    let mut options = run.options;
    options.domains = match (run.domain, run.list) {
        (Some(domain), _) => vec![domain.trim().to_string()],
        (None, Some(list)) => harvest::load_domains(&list)
            .await
            .map_err(|e| e.to_string())?,
        (None, None) => Vec::new(),
    };

    let summaries = harvest::run_harvest(&options, &TokioSleeper, &mut std::io::stdout())
        .await
        .map_err(|e| e.to_string())?;

    let saved: usize = summaries.iter().map(|s| s.saved).sum();
    eprintln!();
    eprintln!(
        "{}",
        format_kv_line(
            "Harvested",
            &format!("{} domain(s), {saved} parameterized URL(s)", summaries.len())
        )
    );
    Ok(())
}

pub fn run_cli() -> Result<(), String> {
    let argv: Vec<String> = std::env::args().collect();
    let args = match CliArgs::try_parse_from(&argv) {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                print!("{}", help_for(&argv));
                return Ok(());
            }
            ErrorKind::DisplayVersion => {
                let cmd = CliArgs::command();
                print!("{}", cmd.render_version());
                return Ok(());
            }
            _ => return Err(e.to_string()),
        },
    };

    let cfg = match args.config.as_deref() {
        Some(path) => config::load_config(&config::expand_tilde(path), false)?,
        None => match config::default_config_path() {
            Some(path) => config::load_config(&path, true)?,
            None => ConfigFile::default(),
        },
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to build runtime: {e}"))?;

    match args.command {
        Command::Scan(scan) => {
            let run = build_scan_config(scan, args.no_color, cfg)?;
            rt.block_on(run_scan_async(run, &mut std::io::stdout()))
        }
        Command::Harvest(harvest) => {
            let run = build_harvest_config(harvest, args.no_color, cfg)?;
            rt.block_on(run_harvest_async(run))
        }
    }
}

#[cfg(test)]
mod cli_tests {
    use super::*;
    use crate::config::HarvestConfig;

    fn scan_args(argv: &[&str]) -> (ScanArgs, bool) {
        let mut full = vec!["reflectprobe", "scan"];
        full.extend_from_slice(argv);
        let args = CliArgs::parse_from(full);
        match args.command {
            Command::Scan(scan) => (scan, args.no_color),
            Command::Harvest(_) => panic!("expected scan"),
        }
    }

    fn harvest_args(argv: &[&str]) -> (HarvestArgs, bool) {
        let mut full = vec!["reflectprobe", "harvest"];
        full.extend_from_slice(argv);
        let args = CliArgs::parse_from(full);
        match args.command {
            Command::Harvest(harvest) => (harvest, args.no_color),
            Command::Scan(_) => panic!("expected harvest"),
        }
    }

    #[test]
    fn scan_defaults_match_documented_values() {
        let (args, no_color) = scan_args(&["-w", "/tmp/urls.txt"]);
        let run = build_scan_config(args, no_color, ConfigFile::default()).unwrap();
        assert_eq!(run.options.workers, 10);
        assert_eq!(run.options.timeout_seconds, 10);
        assert_eq!(run.options.marker, "xss<>");
        assert_eq!(run.options.rate, None);
        assert_eq!(run.options.output, None);
        assert_eq!(run.options.verbose, 0);
        assert!(run.options.show_progress);
        assert_eq!(run.format, OutputFormat::Text);
        assert!(matches!(
            run.options.candidates,
            CandidateSource::FilePath(ref p) if p == "/tmp/urls.txt"
        ));
    }

    #[test]
    fn scan_flags_override_config() {
        let (args, no_color) = scan_args(&[
            "-w", "/tmp/urls.txt", "-t", "4", "-o", "hits.txt", "-m", "zz<>", "-vv", "--json",
            "-s",
        ]);
        let cfg = ConfigFile {
            threads: Some(50),
            marker: Some("cfg".to_string()),
            output: Some("cfg.txt".to_string()),
            timeout: Some(3),
            ..ConfigFile::default()
        };
        let run = build_scan_config(args, no_color, cfg).unwrap();
        assert_eq!(run.options.workers, 4);
        assert_eq!(run.options.marker, "zz<>");
        assert_eq!(run.options.output.as_deref(), Some("hits.txt"));
        assert_eq!(run.options.timeout_seconds, 3);
        assert_eq!(run.options.verbose, 2);
        assert_eq!(run.format, OutputFormat::Json);
        assert!(run.silent);
        assert!(!run.options.show_progress);
    }

    #[test]
    fn scan_wordlist_can_come_from_config() {
        let (args, no_color) = scan_args(&[]);
        let cfg = ConfigFile {
            wordlist: Some("/srv/urls.txt".to_string()),
            ..ConfigFile::default()
        };
        let run = build_scan_config(args, no_color, cfg).unwrap();
        assert!(matches!(
            run.options.candidates,
            CandidateSource::FilePath(ref p) if p == "/srv/urls.txt"
        ));
    }

    #[test]
    fn scan_without_wordlist_is_rejected() {
        let (args, no_color) = scan_args(&[]);
        let err = build_scan_config(args, no_color, ConfigFile::default()).unwrap_err();
        assert!(err.contains("wordlist"));
    }

    #[test]
    fn scan_rejects_zero_threads_and_empty_marker() {
        let (args, no_color) = scan_args(&["-w", "u.txt", "-t", "0"]);
        assert!(build_scan_config(args, no_color, ConfigFile::default()).is_err());

        let (args, no_color) = scan_args(&["-w", "u.txt"]);
        let cfg = ConfigFile {
            marker: Some(String::new()),
            ..ConfigFile::default()
        };
        assert!(build_scan_config(args, no_color, cfg).is_err());
    }

    #[test]
    fn workers_alias_is_accepted() {
        let (args, _) = scan_args(&["-w", "u.txt", "--workers", "7"]);
        assert_eq!(args.threads, Some(7));
    }

    #[test]
    fn harvest_requires_domain_or_list() {
        let (args, no_color) = harvest_args(&[]);
        assert!(build_harvest_config(args, no_color, ConfigFile::default()).is_err());

        let (args, no_color) = harvest_args(&["-d", "a.tld", "-l", "domains.txt"]);
        assert!(build_harvest_config(args, no_color, ConfigFile::default()).is_err());
    }

    #[test]
    fn harvest_defaults_and_overrides() {
        let (args, no_color) = harvest_args(&["-d", "example.com", "-e", "PNG,.js", "-s"]);
        let cfg = ConfigFile {
            harvest: HarvestConfig {
                placeholder: Some("FUZZ".to_string()),
                ..HarvestConfig::default()
            },
            ..ConfigFile::default()
        };
        let run = build_harvest_config(args, no_color, cfg).unwrap();
        assert_eq!(run.domain.as_deref(), Some("example.com"));
        assert_eq!(run.options.extensions, vec!["png".to_string(), "js".to_string()]);
        assert_eq!(run.options.placeholder, "FUZZ");
        assert_eq!(run.options.output_dir, "results");
        assert!(run.options.stream);
    }

    #[test]
    fn harvest_short_p_is_the_placeholder() {
        let (args, no_color) = harvest_args(&["-d", "example.com", "-p", "FUZZ"]);
        let run = build_harvest_config(args, no_color, ConfigFile::default()).unwrap();
        assert_eq!(run.options.placeholder, "FUZZ");
        assert_eq!(run.options.proxy, None);

        let (args, _) = harvest_args(&["-d", "example.com", "--proxy", "http://127.0.0.1:8080"]);
        assert_eq!(args.proxy.as_deref(), Some("http://127.0.0.1:8080"));
    }

    #[test]
    fn help_is_rendered_per_subcommand() {
        let argv: Vec<String> = ["reflectprobe", "scan", "--help"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let help = help_for(&argv);
        assert!(help.contains("Usage: reflectprobe scan [OPTIONS]"));
        assert!(help.contains("--wordlist <FILE>"));
        assert!(help.contains("Performance:"));

        let top = help_for(&["reflectprobe".to_string()]);
        assert!(top.contains("Commands:"));
        assert!(top.contains("harvest"));
    }

    #[tokio::test]
    async fn json_report_is_the_only_thing_on_the_report_writer() {
        let mut server = mockito::Server::new_async().await;
        let _reflect = server
            .mock("GET", "/a")
            .match_query(mockito::Matcher::Any)
            .with_body("echo xss<>")
            .create_async()
            .await;
        let _plain = server
            .mock("GET", "/b")
            .match_query(mockito::Matcher::Any)
            .with_body("nothing")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let wordlist = dir.path().join("list.txt");
        let hit = format!("{}/a?q=xss<>", server.url());
        std::fs::write(&wordlist, format!("{hit}\n{}/b?q=1\n", server.url())).unwrap();
        let wordlist = wordlist.to_string_lossy().to_string();

        for extra in [&["-s", "--json"][..], &["--json", "-vv"][..]] {
            let mut argv = vec!["-w", wordlist.as_str()];
            argv.extend_from_slice(extra);
            let (args, no_color) = scan_args(&argv);
            let run = build_scan_config(args, no_color, ConfigFile::default()).unwrap();

            let mut out: Vec<u8> = Vec::new();
            run_scan_async(run, &mut out).await.unwrap();

            let report: serde_json::Value = serde_json::from_slice(&out).unwrap();
            assert_eq!(report["vulnerable"], serde_json::json!([hit.clone()]));
            assert_eq!(report["processed"], 2);
            assert_eq!(report["clean"], 1);
        }
    }
}
