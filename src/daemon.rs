use anyhow::{Context, Result};
use bmslink_lib::bms::Bms;
use bmslink_lib::config::BmsConfig;
use bmslink_lib::fleet::FleetTelemetry;
use bmslink_lib::sink::{self, Metadata, Sink};
use log::{error, info, warn};
use std::time::Instant;

use crate::{commandline, mqtt};

/// Prints every value to the standard output, one block per cycle.
#[derive(Debug, Default)]
pub struct ConsoleSink {
    in_cycle: bool,
}

impl ConsoleSink {
    fn begin(&mut self) {
        if !self.in_cycle {
            println!("--- Data at {} ---", chrono::Local::now().to_rfc3339());
            self.in_cycle = true;
        }
    }
}

impl Sink for ConsoleSink {
    fn publish_numeric(
        &mut self,
        name: &str,
        value: f64,
        unit: &str,
        _metadata: &Metadata,
    ) -> bmslink_lib::Result<()> {
        self.begin();
        println!("{name}: {value} {unit}");
        Ok(())
    }

    fn publish_boolean(
        &mut self,
        name: &str,
        value: bool,
        _metadata: &Metadata,
    ) -> bmslink_lib::Result<()> {
        self.begin();
        println!("{name}: {value}");
        Ok(())
    }

    fn publish_event(&mut self, name: &str, value: &str) -> bmslink_lib::Result<()> {
        self.begin();
        println!("{name}: {value}");
        Ok(())
    }

    fn flush(&mut self) -> bmslink_lib::Result<()> {
        if self.in_cycle {
            println!("--------------------------");
            self.in_cycle = false;
        }
        Ok(())
    }
}

/// One polling cycle: analog values, the fleet view, then the warnings.
fn poll_cycle(
    bms: &mut dyn Bms,
    sink: &mut dyn Sink,
    config: &BmsConfig,
) -> bmslink_lib::Result<()> {
    let packs = bms.poll_analog()?;
    for pack in &packs {
        sink::publish_pack(sink, pack)?;
    }
    let fleet = FleetTelemetry::aggregate(&packs, config.data_refresh_interval);
    sink::publish_fleet(sink, &fleet)?;

    match bms.poll_warnings() {
        Ok(states) => {
            for state in &states {
                if state.has_alarm() {
                    warn!("Pack {} reports active alarms", state.pack);
                }
                sink::publish_warnings(sink, state)?;
            }
        }
        Err(err) if err.is_transport() => return Err(err),
        Err(err) => warn!("No warning data in this cycle ({err})"),
    }
    sink.flush()
}

pub fn run(
    mut bms: Box<dyn Bms>,
    config: &BmsConfig,
    output: commandline::DaemonOutput,
) -> Result<()> {
    let interval = config.data_refresh_interval;
    info!(
        "Starting daemon mode: bms={}, output={output:?}, interval={interval:?}",
        bms.name()
    );

    let mut sink: Box<dyn Sink> = match &output {
        commandline::DaemonOutput::Console => Box::new(ConsoleSink::default()),
        commandline::DaemonOutput::Mqtt {
            config_file,
            format,
        } => {
            let mqtt_config = mqtt::MqttConfig::load(config_file)
                .with_context(|| format!("Failed to open MQTT config file at '{config_file}'"))?;
            info!("Successfully loaded MQTT config from {config_file}: {mqtt_config:?}");
            let mqtt_sink = mqtt::MqttSink::new(mqtt_config, format.clone())
                .with_context(|| "Failed to create MQTT publisher")?;
            info!("MQTT Publisher created successfully.");
            Box::new(mqtt_sink)
        }
    };

    loop {
        let started = Instant::now();
        match poll_cycle(bms.as_mut(), sink.as_mut(), config) {
            Ok(()) => {}
            Err(err) if err.is_transport() => {
                warn!("Transport failed ({err}), reconnecting");
                match bmslink_lib::transport::open(config) {
                    Ok(transport) => bms.reconnect(transport),
                    Err(err) => error!("Cannot reconnect: {err}"),
                }
            }
            Err(err) => {
                warn!("No data in this cycle ({err})");
                if let Err(err) = sink.flush() {
                    error!("{err}");
                }
            }
        }
        std::thread::sleep(interval.saturating_sub(started.elapsed()));
    }
}
