mod common;

use bmslink_lib::bms::{Bms, JkBms};
use bmslink_lib::config::{BmsConfig, Family};
use bmslink_lib::telemetry::{CellExtreme, Energy};
use bmslink_lib::Error;
use common::ModbusSlave;

fn jk_config(slave_address: Option<u8>) -> BmsConfig {
    BmsConfig {
        family: Family::Jk,
        slave_address,
        ..Default::default()
    }
}

fn simulated_board(address: u8) -> ModbusSlave {
    let mut slave = ModbusSlave::new(address);
    slave.set(0x1200, &[3300, 3310, 3290, 3305]);
    // 21.5, -10.1, 200.0 (dropped), 0.0, 25.0 and a MOS sensor at 30.0 °C
    slave.set(0x129C, &[215]);
    slave.set(0x129E, &[0xFF9B]);
    slave.set(0x12F8, &[2000]);
    slave.set(0x12FA, &[0]);
    slave.set(0x12FC, &[250]);
    slave.set(0x128A, &[300]);
    // -1500 mA, 53260 mV, 79890 mW
    slave.set(0x1298, &[0xFFFF, 0xFA24]);
    slave.set(0x1290, &[0x0000, 0xD00C]);
    slave.set(0x1294, &[0x0001, 0x3812]);
    slave.set(0x12A0, &[0x0001, 0x0080]);
    slave.set(0x12A4, &[120]);
    // balancing active, 87 %
    slave.set(0x12A6, &[0x0157]);
    // 87000 mAh of 100000 mAh
    slave.set(0x12A8, &[0x0001, 0x53D8]);
    slave.set(0x12AC, &[0x0001, 0x86A0]);
    slave.set(0x12B0, &[0x0000, 42]);
    slave.set(0x12B8, &[0x6400]);
    slave.set(0x1410, &[0x5631, 0x3941, 0x0000, 0x0000]);
    slave.set(0x1418, &[0x3131, 0x2E58, 0x5700, 0x0000]);
    slave
}

#[test]
fn poll_analog_test() {
    let slave = simulated_board(0x01);
    let requests = slave.requests.clone();
    let mut bms = JkBms::new(Box::new(slave), jk_config(Some(0x01)));

    let packs = bms.poll_analog().unwrap();
    assert_eq!(packs.len(), 1);
    let pack = &packs[0];
    assert_eq!(pack.pack, 1);
    assert_eq!(pack.cell_voltages, vec![3300, 3310, 3290, 3305]);
    assert_eq!(pack.cell_min, Some(CellExtreme { voltage: 3290, cell: 3 }));
    assert_eq!(pack.cell_max, Some(CellExtreme { voltage: 3310, cell: 2 }));
    assert_eq!(pack.temperatures, vec![21.5, -10.1, 0.0, 25.0, 30.0]);
    assert_eq!(pack.current, -1.5);
    assert_eq!(pack.voltage, 53.26);
    // the power register is unsigned, the sign follows the current
    assert_eq!(pack.power, -0.0799);
    assert_eq!(pack.soc, 87.0);
    assert_eq!(pack.soh, 100.0);
    assert_eq!(pack.cycle_count, 42);
    assert_eq!(pack.remaining_capacity, 87.0);
    assert_eq!(pack.full_capacity, 100.0);
    assert_eq!(pack.design_capacity, 100.0);
    assert_eq!(pack.balance_current, Some(0.12));
    assert_eq!(pack.hardware_version.as_deref(), Some("V19A"));
    assert_eq!(pack.software_version.as_deref(), Some("11.XW"));
    // the first sample only starts the integration
    assert_eq!(pack.energy, Some(Energy::default()));

    let requests = requests.borrow();
    assert!(requests.iter().all(|request| request[0] == 0x01));
    assert_eq!(&requests[0][..6], &[0x01, 0x03, 0x12, 0x00, 0x00, 0x20]);
}

#[test]
fn address_detection_test() {
    let slave = simulated_board(0x01);
    let requests = slave.requests.clone();
    let mut bms = JkBms::new(Box::new(slave), jk_config(None));

    assert_eq!(bms.poll_analog().unwrap()[0].voltage, 53.26);
    assert_eq!(bms.slave_address(), 0x01);

    let requests = requests.borrow();
    // BatVol probed at 0x00, then at 0x01
    assert_eq!(&requests[0][..4], &[0x00, 0x03, 0x12, 0x90]);
    assert_eq!(&requests[1][..4], &[0x01, 0x03, 0x12, 0x90]);
    assert!(requests[2..].iter().all(|request| request[0] == 0x01));
}

#[test]
fn address_detection_fails_test() {
    let slave = simulated_board(0x05);
    let mut bms = JkBms::new(Box::new(slave), jk_config(None));

    assert!(matches!(bms.poll_analog(), Err(Error::NoResponse)));
    assert_eq!(bms.slave_address(), 0x00);
}

#[test]
fn poll_warnings_test() {
    let slave = simulated_board(0x00);
    let mut bms = JkBms::new(Box::new(slave), jk_config(Some(0x00)));

    let states = bms.poll_warnings().unwrap();
    assert_eq!(states.len(), 1);
    let state = &states[0];
    assert_eq!(state.cell_warnings.len(), 4);
    assert_eq!(state.temperature_warnings.len(), 5);
    assert_eq!(state.protect_state_1.active(), vec!["protect_short_circuit"]);
    assert_eq!(state.fault_state.active(), vec!["fault_charge_MOS"]);
    // flags the firmware does not report stay off
    assert_eq!(state.protect_state_2.get("status_fully_charged"), Some(false));
    assert!(state.has_alarm());
}

#[test]
fn auxiliary_commands_test() {
    let slave = simulated_board(0x00);
    let mut bms = JkBms::new(Box::new(slave), jk_config(Some(0x00)));

    assert_eq!(bms.pack_quantity().unwrap(), 1);
    assert_eq!(bms.software_version(1).unwrap(), "11.XW");
    assert_eq!(bms.product_info(1).unwrap().bms, "V19A");
}
