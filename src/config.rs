/// This file contains the tunable fault parameters shared by the library and
/// the logic necessary to formulate a coherent Config for the demo binary. We
/// use the `clap` crate and parse args here
use clap::{Arg, ArgAction, Command};

use crate::err::FaultErr;

/// Default probability that a frame is dropped
pub const DEFAULT_DROP_RATE: f64 = 0.20;

/// Default probability that a frame is corrupted then delivered
pub const DEFAULT_CORRUPT_RATE: f64 = 0.30;

/// Default floor for element overwrites per corrupted frame
pub const DEFAULT_MIN_MUTATIONS: usize = 1;

/// Default ceiling for element overwrites per corrupted frame
pub const DEFAULT_MAX_MUTATIONS: usize = 5;

/// Default target for the demo session
const DEFAULT_TARGET: &str = "ws://localhost:8080/play?gameId=demo";

/// Default number of frames the demo sends
const DEFAULT_FRAMES: usize = 1_000;

/// Default number of frames between stat reports
const DEFAULT_STAT_INTERVAL: usize = 250;

/// Thresholds the fault injector and corruption engine run with. A draw below
/// `drop_rate` drops, a draw below `drop_rate + corrupt_rate` corrupts, and the
/// rest pass through.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaultParams {
    pub drop_rate: f64,
    pub corrupt_rate: f64,
    pub min_mutations: usize,
    pub max_mutations: usize,
}

impl Default for FaultParams {
    fn default() -> Self {
        FaultParams {
            drop_rate: DEFAULT_DROP_RATE,
            corrupt_rate: DEFAULT_CORRUPT_RATE,
            min_mutations: DEFAULT_MIN_MUTATIONS,
            max_mutations: DEFAULT_MAX_MUTATIONS,
        }
    }
}

impl FaultParams {
    pub fn validate(&self) -> Result<(), FaultErr> {
        let in_unit = |rate: f64| (0.0..=1.0).contains(&rate);
        if !in_unit(self.drop_rate) {
            return Err(FaultErr::config(&format!(
                "Drop rate {} outside [0, 1]",
                self.drop_rate
            )));
        }

        if !in_unit(self.corrupt_rate) {
            return Err(FaultErr::config(&format!(
                "Corrupt rate {} outside [0, 1]",
                self.corrupt_rate
            )));
        }

        if self.drop_rate + self.corrupt_rate > 1.0 {
            return Err(FaultErr::config("Drop and corrupt rates sum above 1"));
        }

        if self.min_mutations > self.max_mutations {
            return Err(FaultErr::config(&format!(
                "Mutation range {}..={} is empty",
                self.min_mutations, self.max_mutations
            )));
        }

        Ok(())
    }
}

// Struct that contains all of the configurable information the demo binary
// needs to drive a session
#[derive(Clone, Debug)]
pub struct Config {
    pub target: String,
    pub protocols: Option<Vec<String>>,
    pub frames: usize,
    pub seed: Option<u64>,
    pub enabled: bool,
    pub echo: bool,
    pub stat_interval: usize,
    pub params: FaultParams,
}

// Parse an optional numeric flag, naming it in the error
fn parse_opt<T: std::str::FromStr>(
    matches: &clap::ArgMatches,
    name: &str,
) -> Result<Option<T>, FaultErr> {
    match matches.get_one::<String>(name) {
        None => Ok(None),
        Some(str_repr) => {
            let Ok(value) = str_repr.parse::<T>() else {
                return Err(FaultErr::config(&format!("Invalid --{} value", name)));
            };

            Ok(Some(value))
        }
    }
}

fn command() -> Command {
    Command::new("wirefault")
    .version("0.0.1")
    .about("Drives a loopback socket session through the fault-injecting interceptor")
    .arg(Arg::new("target")
        .long("target")
        .value_name("URL")
        .help("Connection target, a 'gameId=' component binds a session"))
    .arg(Arg::new("protocols")
        .long("protocols")
        .value_name("PROTOCOLS")
        .help("Sub-protocols to request")
        .num_args(1..)
        .value_delimiter(','))
    .arg(Arg::new("frames")
        .long("frames")
        .value_name("COUNT")
        .help("Number of frames to send (1000 default)"))
    .arg(Arg::new("seed")
        .long("seed")
        .value_name("SEED")
        .help("Optional seed for the fault pRNG (u64)"))
    .arg(Arg::new("disable")
        .long("disable")
        .help("Start with fault injection disabled")
        .action(ArgAction::SetTrue))
    .arg(Arg::new("echo")
        .long("echo")
        .help("Echo sent frames back as inbound messages")
        .action(ArgAction::SetTrue))
    .arg(Arg::new("drop-rate")
        .long("drop-rate")
        .value_name("RATE")
        .help("Probability a frame is dropped (0.20 default)"))
    .arg(Arg::new("corrupt-rate")
        .long("corrupt-rate")
        .value_name("RATE")
        .help("Probability a frame is corrupted (0.30 default)"))
    .arg(Arg::new("min-mutations")
        .long("min-mutations")
        .value_name("COUNT")
        .help("Fewest element overwrites per corrupted frame (1 default)"))
    .arg(Arg::new("max-mutations")
        .long("max-mutations")
        .value_name("COUNT")
        .help("Most element overwrites per corrupted frame (5 default)"))
    .arg(Arg::new("stat-interval")
        .long("stat-interval")
        .value_name("FRAMES")
        .help("Number of frames in between stat reports (250 default)"))
}

pub fn parse_args() -> Result<Config, FaultErr> {
    config_from(command().get_matches())
}

pub fn parse_from<I, T>(args: I) -> Result<Config, FaultErr>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let Ok(matches) = command().try_get_matches_from(args) else {
        return Err(FaultErr::config("Unable to parse arguments"));
    };

    config_from(matches)
}

fn config_from(matches: clap::ArgMatches) -> Result<Config, FaultErr> {
    let target = matches
        .get_one::<String>("target")
        .cloned()
        .unwrap_or_else(|| DEFAULT_TARGET.to_string());

    let protocols = matches
        .get_many::<String>("protocols")
        .map(|values| values.cloned().collect());

    let enabled = !matches.get_flag("disable");
    let echo = matches.get_flag("echo");

    let frames = parse_opt::<usize>(&matches, "frames")?.unwrap_or(DEFAULT_FRAMES);
    let seed = parse_opt::<u64>(&matches, "seed")?;
    let stat_interval =
        parse_opt::<usize>(&matches, "stat-interval")?.unwrap_or(DEFAULT_STAT_INTERVAL);
    if stat_interval == 0 {
        return Err(FaultErr::config("Invalid --stat-interval value"));
    }

    let defaults = FaultParams::default();
    let params = FaultParams {
        drop_rate: parse_opt(&matches, "drop-rate")?.unwrap_or(defaults.drop_rate),
        corrupt_rate: parse_opt(&matches, "corrupt-rate")?.unwrap_or(defaults.corrupt_rate),
        min_mutations: parse_opt(&matches, "min-mutations")?.unwrap_or(defaults.min_mutations),
        max_mutations: parse_opt(&matches, "max-mutations")?.unwrap_or(defaults.max_mutations),
    };
    params.validate()?;

    // Create and return Config
    Ok(Config {
        target,
        protocols,
        frames,
        seed,
        enabled,
        echo,
        stat_interval,
        params,
    })
}
