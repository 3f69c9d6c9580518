mod common;

use bmslink_lib::ascii::{Command, ALL_PACKS, PACE_LV_V1, PACE_RS485, TDT_RS232};
use bmslink_lib::bms::{AsciiBms, Bms};
use bmslink_lib::config::{BmsConfig, Family};
use bmslink_lib::transport::ReceiveMode;
use bmslink_lib::warning::WarningCode;
use bmslink_lib::Error;
use common::{ascii_response, Reply, ScriptedTransport};
use std::time::Duration;

// 4 cells, 2 temperatures, -2.00 A, 13.300 V, 50.00 Ah of 100.00 Ah,
// 12 cycles, 105.00 Ah design
const PACK: &str = "040CE40CF00CDA0CE4020B730AADFF3833F41388022710000C2904";
const WARNINGS: &str = "020001018500020040402000310203080180";

fn config(family: Family, packs: Vec<u8>) -> BmsConfig {
    BmsConfig {
        family,
        packs,
        data_refresh_interval: Duration::from_secs(10),
        ..Default::default()
    }
}

fn analog(address: u8) -> Reply {
    Reply::Data(ascii_response(address, &format!("0001{PACK}")))
}

#[test]
fn poll_analog_per_pack_test() {
    let transport = ScriptedTransport::new([analog(1), analog(2)]);
    let mut bms = AsciiBms::new(
        Box::new(transport.clone()),
        &PACE_LV_V1,
        config(Family::PaceLvV1, vec![1, 2]),
    );

    let packs = bms.poll_analog().unwrap();
    assert_eq!(packs.len(), 2);
    assert_eq!(packs[0].pack, 1);
    assert_eq!(packs[1].pack, 2);
    assert_eq!(packs[1].cell_voltages, vec![3300, 3312, 3290, 3300]);
    assert_eq!(packs[1].soc, 50.0);
    let energy = packs[0].energy.unwrap();
    assert_eq!(energy.charged, 0.0);
    assert_eq!(energy.discharged, 0.07389);

    assert_eq!(
        transport.sent(),
        vec![
            PACE_LV_V1.encode_request(Command::Analog, 1),
            PACE_LV_V1.encode_request(Command::Analog, 2),
        ]
    );
    assert!(transport
        .0
        .borrow()
        .modes
        .iter()
        .all(|mode| *mode == ReceiveMode::Line));
}

#[test]
fn poll_analog_all_packs_test() {
    let info = format!("0002{PACK}{PACK}");
    let transport = ScriptedTransport::new([Reply::Data(ascii_response(0x00, &info))]);
    let mut bms = AsciiBms::new(
        Box::new(transport.clone()),
        &PACE_RS485,
        config(Family::PaceRs485, Vec::new()),
    );

    let packs = bms.poll_analog().unwrap();
    assert_eq!(packs.iter().map(|p| p.pack).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(transport.sent(), vec![b"~25004642E002FFFD06\r".to_vec()]);
    assert_eq!(
        PACE_RS485.encode_request(Command::Analog, ALL_PACKS),
        b"~25004642E002FFFD06\r"
    );
}

#[test]
fn retry_test() {
    let mut corrupted = ascii_response(1, &format!("0001{PACK}"));
    let last = corrupted.len() - 1;
    corrupted[last] = if corrupted[last] == b'0' { b'1' } else { b'0' };
    let transport =
        ScriptedTransport::new([Reply::Data(corrupted), Reply::Timeout, analog(1)]);
    let mut bms = AsciiBms::new(
        Box::new(transport.clone()),
        &PACE_LV_V1,
        config(Family::PaceLvV1, vec![1]),
    );

    assert_eq!(bms.poll_analog().unwrap().len(), 1);
    assert_eq!(transport.sent().len(), 3);
}

#[test]
fn failed_pack_is_skipped_test() {
    let transport = ScriptedTransport::new([
        Reply::Timeout,
        Reply::Timeout,
        Reply::Timeout,
        analog(2),
    ]);
    let mut bms = AsciiBms::new(
        Box::new(transport.clone()),
        &PACE_LV_V1,
        config(Family::PaceLvV1, vec![1, 2]),
    );

    let packs = bms.poll_analog().unwrap();
    assert_eq!(packs.len(), 1);
    assert_eq!(packs[0].pack, 2);
    assert_eq!(transport.sent().len(), 4);
}

#[test]
fn no_data_test() {
    let transport = ScriptedTransport::default();
    let mut bms = AsciiBms::new(
        Box::new(transport.clone()),
        &PACE_LV_V1,
        config(Family::PaceLvV1, vec![1, 2]),
    );

    assert!(matches!(bms.poll_analog(), Err(Error::NoData(_))));
    assert_eq!(transport.sent().len(), 6);
}

#[test]
fn transport_error_is_not_retried_test() {
    let transport = ScriptedTransport::new([Reply::Broken]);
    let mut bms = AsciiBms::new(
        Box::new(transport.clone()),
        &PACE_LV_V1,
        config(Family::PaceLvV1, vec![1, 2]),
    );

    let err = bms.poll_analog().unwrap_err();
    assert!(err.is_transport());
    assert_eq!(transport.sent().len(), 1);

    // a fresh transport continues where the broken one stopped
    let replacement = ScriptedTransport::new([analog(1), analog(2)]);
    bms.reconnect(Box::new(replacement.clone()));
    assert_eq!(bms.poll_analog().unwrap().len(), 2);
    assert_eq!(replacement.sent().len(), 2);
}

#[test]
fn tdt_pack_mismatch_test() {
    // pack 2 answers with a pack count of 1
    let transport = ScriptedTransport::new([analog(1), analog(2), analog(2), analog(2)]);
    let mut bms = AsciiBms::new(
        Box::new(transport.clone()),
        &TDT_RS232,
        config(Family::Tdt, vec![1, 2]),
    );

    let packs = bms.poll_analog().unwrap();
    assert_eq!(packs.len(), 1);
    assert_eq!(packs[0].pack, 1);
    assert_eq!(transport.sent().len(), 4);
}

#[test]
fn poll_warnings_test() {
    let transport = ScriptedTransport::new([Reply::Data(ascii_response(
        1,
        &format!("0001{WARNINGS}"),
    ))]);
    let mut bms = AsciiBms::new(
        Box::new(transport),
        &PACE_LV_V1,
        config(Family::PaceLvV1, Vec::new()),
    );

    let states = bms.poll_warnings().unwrap();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].pack, 1);
    assert_eq!(
        states[0].cell_warnings,
        vec![WarningCode::Normal, WarningCode::BelowLowerLimit]
    );
    assert!(states[0].has_alarm());
}

#[test]
fn auxiliary_commands_test() {
    let version: String = "PACE V1.2"
        .bytes()
        .map(|b| format!("{b:02X}"))
        .collect();
    let transport = ScriptedTransport::new([
        Reply::Data(ascii_response(1, "02")),
        Reply::Data(ascii_response(1, &version)),
    ]);
    let mut bms = AsciiBms::new(
        Box::new(transport.clone()),
        &PACE_LV_V1,
        config(Family::PaceLvV1, Vec::new()),
    );

    assert_eq!(bms.pack_quantity().unwrap(), 2);
    assert_eq!(bms.software_version(1).unwrap(), "PACE V1.2");
    assert_eq!(
        transport.sent(),
        vec![
            PACE_LV_V1.encode_request(Command::PackQuantity, 1),
            PACE_LV_V1.encode_request(Command::SoftwareVersion, 1),
        ]
    );
}
