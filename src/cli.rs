use anyhow::Result;

const DEFAULT_TASKS_LIMIT: i64 = 20;

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum CliCommand {
    Onboard {
        ips: Vec<String>,
        location: String,
        username: Option<String>,
        password: Option<String>,
        secret: Option<String>,
        platform: Option<String>,
        device_type: Option<String>,
        role: Option<String>,
        port: Option<u16>,
        timeout: Option<u64>,
        concurrency: Option<usize>,
        continue_on_failure: bool,
    },
    Locations {
        add: Option<String>,
        description: Option<String>,
    },
    Devices,
    Tasks {
        limit: i64,
    },
    Help,
    Version,
}

pub(crate) fn version_text() -> String {
    format!("netonboard {}", env!("CARGO_PKG_VERSION"))
}

pub(crate) fn usage_text() -> String {
    format!(
        "{version}
Network Device Onboarding CLI

Usage:
  netonboard onboard --ip <ADDR> --location <NAME> [options]
  netonboard locations [--add <NAME> [--description <TEXT>]]
  netonboard devices
  netonboard tasks [--limit <N>]
  netonboard --help
  netonboard --version

Options:
      --ip <ADDR>            Target IP or hostname (repeat for a batch)
  -l, --location <NAME>      Inventory location for onboarded devices
  -u, --username <USER>      SSH username (default: NETONBOARD_USERNAME)
  -p, --password <PASS>      SSH password (default: NETONBOARD_PASSWORD)
      --secret <SECRET>      Enable secret for privileged commands
      --platform <NAME>      Platform hint, e.g. cisco_ios (skips autodetection)
      --device-type <MODEL>  Device type override for the onboarded device
      --role <ROLE>          Role for created devices (default: network)
      --port <N>             SSH port (default: 22)
      --timeout <SECS>       Per-step network timeout (default: 30)
      --concurrency <N>      Parallel attempts for a batch (default: 8)
      --continue-on-failure  Skip hostname conflicts instead of failing
      --add <NAME>           Locations: create this location
      --description <TEXT>   Locations: description for --add
      --limit <N>            Tasks: number of rows to show (default: {default_limit})
  -h, --help                 Show this help text
  -V, --version              Show version",
        version = version_text(),
        default_limit = DEFAULT_TASKS_LIMIT
    )
}

fn parse_u16_arg(flag: &str, raw: &str) -> Result<u16> {
    raw.parse::<u16>().ok().filter(|v| *v > 0).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid value for {}: '{}'. Expected a positive integer.\n\n{}",
            flag,
            raw,
            usage_text()
        )
    })
}

fn parse_u64_arg(flag: &str, raw: &str) -> Result<u64> {
    raw.parse::<u64>().ok().filter(|v| *v > 0).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid value for {}: '{}'. Expected a positive integer.\n\n{}",
            flag,
            raw,
            usage_text()
        )
    })
}

fn parse_usize_arg(flag: &str, raw: &str) -> Result<usize> {
    raw.parse::<usize>().ok().filter(|v| *v > 0).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid value for {}: '{}'. Expected a positive integer.\n\n{}",
            flag,
            raw,
            usage_text()
        )
    })
}

fn parse_i64_arg(flag: &str, raw: &str) -> Result<i64> {
    raw.parse::<i64>().ok().filter(|v| *v > 0).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid value for {}: '{}'. Expected a positive integer.\n\n{}",
            flag,
            raw,
            usage_text()
        )
    })
}

fn next_value<I, S>(iter: &mut I, flag: &str) -> Result<String>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    iter.next()
        .map(|v| v.as_ref().to_string())
        .ok_or_else(|| anyhow::anyhow!("Missing value for {}.\n\n{}", flag, usage_text()))
}

fn eq_value(arg: &str, flag: &str) -> Result<String> {
    let value = arg.split_once('=').map(|(_, v)| v).unwrap_or_default();
    if value.is_empty() {
        return Err(anyhow::anyhow!(
            "Missing value for {}.\n\n{}",
            flag,
            usage_text()
        ));
    }
    Ok(value.to_string())
}

pub(crate) fn parse_cli_args<I, S>(args: I) -> Result<CliCommand>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut iter = args.into_iter();
    let _program_name = iter.next();

    let mut command: Option<String> = None;
    let mut ips: Vec<String> = Vec::new();
    let mut location: Option<String> = None;
    let mut username: Option<String> = None;
    let mut password: Option<String> = None;
    let mut secret: Option<String> = None;
    let mut platform: Option<String> = None;
    let mut device_type: Option<String> = None;
    let mut role: Option<String> = None;
    let mut port: Option<u16> = None;
    let mut timeout: Option<u64> = None;
    let mut concurrency: Option<usize> = None;
    let mut continue_on_failure = false;
    let mut add: Option<String> = None;
    let mut description: Option<String> = None;
    let mut limit: Option<i64> = None;

    while let Some(arg) = iter.next() {
        let arg = arg.as_ref();
        match arg {
            "-h" | "--help" => return Ok(CliCommand::Help),
            "-V" | "--version" => return Ok(CliCommand::Version),
            "onboard" | "locations" | "devices" | "tasks" => {
                if command.as_deref().is_some_and(|existing| existing != arg) {
                    return Err(anyhow::anyhow!(
                        "Multiple commands provided. Use only one command.\n\n{}",
                        usage_text()
                    ));
                }
                command = Some(arg.to_string());
            }
            "--ip" => ips.push(next_value(&mut iter, "--ip")?),
            "-l" | "--location" => location = Some(next_value(&mut iter, "--location")?),
            "-u" | "--username" => username = Some(next_value(&mut iter, "--username")?),
            "-p" | "--password" => password = Some(next_value(&mut iter, "--password")?),
            "--secret" => secret = Some(next_value(&mut iter, "--secret")?),
            "--platform" => platform = Some(next_value(&mut iter, "--platform")?),
            "--device-type" => device_type = Some(next_value(&mut iter, "--device-type")?),
            "--role" => role = Some(next_value(&mut iter, "--role")?),
            "--port" => {
                let value = next_value(&mut iter, "--port")?;
                port = Some(parse_u16_arg("--port", &value)?);
            }
            "--timeout" => {
                let value = next_value(&mut iter, "--timeout")?;
                timeout = Some(parse_u64_arg("--timeout", &value)?);
            }
            "--concurrency" => {
                let value = next_value(&mut iter, "--concurrency")?;
                concurrency = Some(parse_usize_arg("--concurrency", &value)?);
            }
            "--continue-on-failure" => continue_on_failure = true,
            "--add" => add = Some(next_value(&mut iter, "--add")?),
            "--description" => description = Some(next_value(&mut iter, "--description")?),
            "--limit" => {
                let value = next_value(&mut iter, "--limit")?;
                limit = Some(parse_i64_arg("--limit", &value)?);
            }
            _ if arg.starts_with("--ip=") => ips.push(eq_value(arg, "--ip")?),
            _ if arg.starts_with("--location=") => location = Some(eq_value(arg, "--location")?),
            _ if arg.starts_with("--username=") => username = Some(eq_value(arg, "--username")?),
            _ if arg.starts_with("--password=") => password = Some(eq_value(arg, "--password")?),
            _ if arg.starts_with("--secret=") => secret = Some(eq_value(arg, "--secret")?),
            _ if arg.starts_with("--platform=") => platform = Some(eq_value(arg, "--platform")?),
            _ if arg.starts_with("--device-type=") => {
                device_type = Some(eq_value(arg, "--device-type")?)
            }
            _ if arg.starts_with("--role=") => role = Some(eq_value(arg, "--role")?),
            _ if arg.starts_with("--port=") => {
                port = Some(parse_u16_arg("--port", &eq_value(arg, "--port")?)?)
            }
            _ if arg.starts_with("--timeout=") => {
                timeout = Some(parse_u64_arg("--timeout", &eq_value(arg, "--timeout")?)?)
            }
            _ if arg.starts_with("--concurrency=") => {
                concurrency = Some(parse_usize_arg(
                    "--concurrency",
                    &eq_value(arg, "--concurrency")?,
                )?)
            }
            _ if arg.starts_with("--add=") => add = Some(eq_value(arg, "--add")?),
            _ if arg.starts_with("--description=") => {
                description = Some(eq_value(arg, "--description")?)
            }
            _ if arg.starts_with("--limit=") => {
                limit = Some(parse_i64_arg("--limit", &eq_value(arg, "--limit")?)?)
            }
            _ => {
                return Err(anyhow::anyhow!(
                    "Unknown argument: {arg}\n\n{}",
                    usage_text()
                ));
            }
        }
    }

    let has_onboard_flags = !ips.is_empty()
        || location.is_some()
        || username.is_some()
        || password.is_some()
        || secret.is_some()
        || platform.is_some()
        || device_type.is_some()
        || role.is_some()
        || port.is_some()
        || timeout.is_some()
        || concurrency.is_some()
        || continue_on_failure;

    match command.as_deref() {
        None => {
            if has_onboard_flags || add.is_some() || description.is_some() || limit.is_some() {
                return Err(anyhow::anyhow!(
                    "No command provided. Flags require a command.\n\n{}",
                    usage_text()
                ));
            }
            Ok(CliCommand::Help)
        }
        Some("onboard") => {
            if add.is_some() || description.is_some() || limit.is_some() {
                return Err(anyhow::anyhow!(
                    "--add/--description/--limit are not valid with onboard.\n\n{}",
                    usage_text()
                ));
            }
            if ips.is_empty() {
                return Err(anyhow::anyhow!(
                    "onboard requires at least one --ip.\n\n{}",
                    usage_text()
                ));
            }
            let location = location.ok_or_else(|| {
                anyhow::anyhow!("onboard requires --location.\n\n{}", usage_text())
            })?;
            Ok(CliCommand::Onboard {
                ips,
                location,
                username,
                password,
                secret,
                platform,
                device_type,
                role,
                port,
                timeout,
                concurrency,
                continue_on_failure,
            })
        }
        Some("locations") => {
            if has_onboard_flags || limit.is_some() {
                return Err(anyhow::anyhow!(
                    "Onboard flags are not valid with locations.\n\n{}",
                    usage_text()
                ));
            }
            if description.is_some() && add.is_none() {
                return Err(anyhow::anyhow!(
                    "--description is only valid together with --add.\n\n{}",
                    usage_text()
                ));
            }
            Ok(CliCommand::Locations { add, description })
        }
        Some("devices") => {
            if has_onboard_flags || add.is_some() || description.is_some() || limit.is_some() {
                return Err(anyhow::anyhow!(
                    "devices takes no flags.\n\n{}",
                    usage_text()
                ));
            }
            Ok(CliCommand::Devices)
        }
        Some("tasks") => {
            if has_onboard_flags || add.is_some() || description.is_some() {
                return Err(anyhow::anyhow!(
                    "Only --limit is valid with tasks.\n\n{}",
                    usage_text()
                ));
            }
            Ok(CliCommand::Tasks {
                limit: limit.unwrap_or(DEFAULT_TASKS_LIMIT),
            })
        }
        Some(other) => Err(anyhow::anyhow!(
            "Unknown command: {other}\n\n{}",
            usage_text()
        )),
    }
}
