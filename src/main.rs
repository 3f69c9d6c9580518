mod commandline;
mod daemon;
mod mqtt;

use anyhow::{Context, Result};
use bmslink_lib::bms::{self, Bms};
use bmslink_lib::fleet::FleetTelemetry;
use clap::Parser;
use commandline::{CliArgs, CliCommands};
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use serde::Serialize;
use std::{fmt::Debug, ops::Deref, panic};

fn logging_init(loglevel: LevelFilter) -> Result<LoggerHandle> {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .with_context(|| "Cannot init logging")?
        .start()
        .with_context(|| "Cannot start logging")?;

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown>", 0, 0));
        let cause = panic_info
            .payload()
            .downcast_ref::<String>()
            .map(String::deref);
        let cause = cause.unwrap_or_else(|| {
            panic_info
                .payload()
                .downcast_ref::<&str>()
                .copied()
                .unwrap_or("<cause unknown>")
        });

        error!(
            "Thread '{}' panicked at {}:{}:{}: {}",
            std::thread::current().name().unwrap_or("<unknown>"),
            filename,
            line,
            column,
            cause
        );
    }));
    Ok(log_handle)
}

fn print_value<T: Serialize + Debug>(label: &str, value: &T, json: bool) -> Result<()> {
    if json {
        let json = serde_json::to_string_pretty(value)
            .with_context(|| format!("Cannot serialize {label}"))?;
        println!("{json}");
    } else {
        println!("{label}: {value:#?}");
    }
    Ok(())
}

macro_rules! print_value {
    ($label:literal, $value:expr, $json:expr) => {
        print_value(
            $label,
            &$value.with_context(|| concat!("Cannot get ", $label))?,
            $json,
        )?
    };
}

fn main() -> Result<()> {
    let args = CliArgs::parse();

    let _log_handle = logging_init(args.verbose.log_level_filter())?;

    let config = args.bms_config();
    let mut bms = bms::connect(&config).with_context(|| {
        format!(
            "Cannot connect to {} BMS over {}",
            config.family, config.connection
        )
    })?;

    let json = args.json;
    match args.command {
        CliCommands::Analog => print_value!("analog values", bms.poll_analog(), json),
        CliCommands::Warnings => print_value!("warnings", bms.poll_warnings(), json),
        CliCommands::Fleet => {
            let packs = bms
                .poll_analog()
                .with_context(|| "Cannot get analog values")?;
            let fleet = FleetTelemetry::aggregate(&packs, config.data_refresh_interval);
            print_value("fleet", &fleet, json)?;
        }
        CliCommands::PackQuantity => print_value!("pack quantity", bms.pack_quantity(), json),
        CliCommands::SoftwareVersion { pack } => {
            print_value!("software version", bms.software_version(pack), json)
        }
        CliCommands::ProductInfo { pack } => {
            print_value!("product info", bms.product_info(pack), json)
        }
        CliCommands::Daemon { output } => daemon::run(bms, &config, output)?,
    }

    Ok(())
}
