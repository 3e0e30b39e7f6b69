//! `vrt` command line runner

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vrt_core::{derive_variants, HostPattern, Run, RunConfig, RunReport, TestDecl};

fn cli() -> Command {
    Command::new("vrt")
        .version(vrt_core::VERSION)
        .about("Visual regression testing of CDN-delivered images")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log at debug level"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("run")
                .about("Run every declared test against the test CDN")
                .arg(
                    Arg::new("config")
                        .long("config")
                        .short('c')
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Path to the TOML run configuration"),
                )
                .arg(
                    Arg::new("base-url")
                        .long("base-url")
                        .help("Override the site base URL"),
                )
                .arg(
                    Arg::new("live-cdn-host")
                        .long("live-cdn-host")
                        .help("Override the live CDN host pattern (regex)"),
                )
                .arg(
                    Arg::new("test-cdn-host")
                        .long("test-cdn-host")
                        .help("Override the test CDN host"),
                )
                .arg(
                    Arg::new("max-diff")
                        .long("max-diff")
                        .value_parser(value_parser!(f64))
                        .help("Override the highest passing mismatch percentage"),
                )
                .arg(
                    Arg::new("local-test")
                        .long("local-test")
                        .action(ArgAction::SetTrue)
                        .help("Mirror full-size images into the image path"),
                )
                .arg(
                    Arg::new("image-path")
                        .long("image-path")
                        .value_parser(value_parser!(PathBuf))
                        .help("Override the local image cache root"),
                )
                .arg(
                    Arg::new("test")
                        .long("test")
                        .action(ArgAction::Append)
                        .value_name("PATH=SELECTOR")
                        .help("Declare an additional test"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the report as JSON"),
                ),
        )
        .subcommand(
            Command::new("derive")
                .about("Print the URL variants derived from a delivery URL")
                .arg(Arg::new("url").required(true).help("Delivery image URL"))
                .arg(
                    Arg::new("test-cdn-host")
                        .long("test-cdn-host")
                        .required(true)
                        .help("Test CDN host"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Layer command line overrides on top of the file configuration
fn apply_overrides(mut config: RunConfig, args: &ArgMatches) -> Result<RunConfig> {
    if let Some(base_url) = args.get_one::<String>("base-url") {
        config.base_url.clone_from(base_url);
    }
    if let Some(pattern) = args.get_one::<String>("live-cdn-host") {
        config.live_cdn_host = HostPattern::new(pattern)?;
    }
    if let Some(host) = args.get_one::<String>("test-cdn-host") {
        config.test_cdn_host.clone_from(host);
    }
    if let Some(max) = args.get_one::<f64>("max-diff") {
        config.max_diff_percentage = *max;
    }
    if args.get_flag("local-test") {
        config.local_test = true;
    }
    if let Some(path) = args.get_one::<PathBuf>("image-path") {
        config.image_path.clone_from(path);
    }
    if let Some(tests) = args.get_many::<String>("test") {
        for raw in tests {
            let decl: TestDecl = raw.parse()?;
            config.tests.push(decl);
        }
    }

    config.validate()?;
    Ok(config)
}

fn print_text(report: &RunReport<'_>) {
    for case in report.tests {
        match &case.error {
            Some(error) => println!("ERROR {} [{}]: {error}", case.path, case.selector),
            None => {
                let tally = case.tally(report.max_diff_percentage);
                println!(
                    "{} {} [{}]: {} passed, {} failed, {} indeterminate",
                    if tally.failed == 0 { "OK   " } else { "FAIL " },
                    case.path,
                    case.selector,
                    tally.passed,
                    tally.failed,
                    tally.indeterminate
                );
            }
        }
    }

    let summary = &report.summary;
    println!();
    println!(
        "{} tests ({} errored), {} images: {} passed, {} failed, {} indeterminate",
        summary.tests,
        summary.tests_errored,
        summary.images.total(),
        summary.images.passed,
        summary.images.failed,
        summary.images.indeterminate
    );
}

async fn run_command(args: &ArgMatches) -> Result<i32> {
    let path = args
        .get_one::<PathBuf>("config")
        .context("--config is required")?;
    let config = RunConfig::load(path).with_context(|| format!("loading {}", path.display()))?;
    let config = apply_overrides(config, args)?;

    if config.tests.is_empty() {
        bail!("no tests declared in {} or via --test", path.display());
    }

    let mut run = Run::new(&config)?;
    let summary = run.execute().await;

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&run.report())?);
    } else {
        print_text(&run.report());
    }

    Ok(summary.exit_code())
}

fn derive_command(args: &ArgMatches) -> Result<i32> {
    let url = args.get_one::<String>("url").context("URL is required")?;
    let host = args
        .get_one::<String>("test-cdn-host")
        .context("--test-cdn-host is required")?;
    let variants = derive_variants(url, host)?;

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&variants)?);
    } else {
        println!("original:  {}", variants.original_url);
        println!("full size: {}", variants.full_size_url.as_deref().unwrap_or("-"));
        println!("test:      {}", variants.test_url);
    }
    Ok(0)
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("verbose"), matches.get_flag("log-json"));

    let outcome = match matches.subcommand() {
        Some(("run", args)) => run_command(args).await,
        Some(("derive", args)) => derive_command(args),
        _ => Ok(2),
    };

    match outcome {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("error: {err:#}");
            std::process::exit(2);
        }
    }
}
