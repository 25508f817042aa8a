use std::env;
use std::path::PathBuf;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub months: Option<u32>,
    pub sources: Vec<String>,
}

pub fn parse_args() -> Result<CliArgs, String> {
    parse_from(env::args().skip(1))
}

fn parse_from<I>(args: I) -> Result<CliArgs, String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut parsed = CliArgs::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let value = args
                    .next()
                    .ok_or_else(|| "missing value for --config".to_string())?;
                parsed.config = Some(PathBuf::from(value));
            }
            "--months" => {
                let value = args
                    .next()
                    .ok_or_else(|| "missing value for --months".to_string())?;
                let months = value
                    .parse::<u32>()
                    .ok()
                    .filter(|months| *months > 0)
                    .ok_or_else(|| format!("invalid months value: {value}"))?;
                parsed.months = Some(months);
            }
            "--source" => {
                let value = args
                    .next()
                    .ok_or_else(|| "missing value for --source".to_string())?;
                parsed.sources.push(value);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                return Err(format!("unknown argument: {arg}"));
            }
        }
    }

    Ok(parsed)
}

pub fn print_help() {
    println!(
        "Billing report ingest\n\n\
Usage:\n  billing-ingest [--config <path>] [--months <n>] [--source <provider_id>]...\n\n\
Options:\n  --config <path>       Config file to load (created with defaults if missing)\n  --months <n>          Ingest the current and previous n-1 billing months\n  --source <id>         Only run the source with this provider id (repeatable)\n  -h, --help            Show this help message\n\n\
Logging is controlled with RUST_LOG (default: info).\n"
    );
}
