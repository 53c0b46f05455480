//! 广播发现

use crate::bus::Bus;
use crate::error::DriverError;
use hand_bus::BusAdapter;
use hand_protocol::MAX_ID;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// 发现的设备
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub id: u8,
    pub model: u16,
    pub firmware: u8,
}

/// 广播 Ping 直到至少 `expected` 个设备回复
///
/// - 回复可能乱序到达，结果按 ID 升序排列
/// - 最多尝试 `attempts` 次；仍不足则返回 `DriverError::DiscoveryFailed`，
///   不会无限重试
/// - `expected` 为 0 时至少需要一个设备
pub fn discover<A: BusAdapter>(
    bus: &mut Bus<A>,
    expected: usize,
    attempts: usize,
) -> Result<Vec<DiscoveredDevice>, DriverError> {
    let expected = expected.max(1);
    let mut best: Vec<DiscoveredDevice> = Vec::new();

    for attempt in 1..=attempts.max(1) {
        let replies = bus.ping_broadcast()?;

        // BTreeMap 去重并按 ID 排序
        let mut found = BTreeMap::new();
        for status in replies {
            if status.id > MAX_ID || !status.is_ok() {
                debug!("Ignoring ping reply from id {}", status.id);
                continue;
            }
            match status.ping_info() {
                Ok((model, firmware)) => {
                    found.insert(
                        status.id,
                        DiscoveredDevice {
                            id: status.id,
                            model,
                            firmware,
                        },
                    );
                },
                Err(e) => debug!("Malformed ping reply from id {}: {}", status.id, e),
            }
        }
        let devices: Vec<DiscoveredDevice> = found.into_values().collect();

        if devices.len() >= expected {
            let ids: Vec<u8> = devices.iter().map(|d| d.id).collect();
            info!("Found actuator ids {:?}", ids);
            return Ok(devices);
        }

        debug!(
            "Discovery attempt {}/{}: {} of {} actuators responded",
            attempt,
            attempts,
            devices.len(),
            expected
        );
        if devices.len() > best.len() {
            best = devices;
        }
    }

    let found: Vec<u8> = best.iter().map(|d| d.id).collect();
    warn!(
        "Cannot find {} actuators, only {:?} responded",
        expected, found
    );
    Err(DriverError::DiscoveryFailed { expected, found })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BusConfig;
    use hand_bus::VirtualBus;
    use hand_protocol::{Instruction, MODEL_MX_28};

    #[test]
    fn test_discover_sorted() {
        let (adapter, handle) = VirtualBus::with_servos(1_000_000, &[9, 3, 7]);
        handle.set_ping_order(&[7, 9, 3]);
        let mut bus = Bus::new(adapter, BusConfig::default());

        let devices = discover(&mut bus, 3, 10).unwrap();
        let ids: Vec<u8> = devices.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![3, 7, 9]);
        assert!(devices.iter().all(|d| d.model == MODEL_MX_28));
    }

    #[test]
    fn test_discover_retries_until_expected() {
        let (adapter, handle) = VirtualBus::with_servos(1_000_000, &[1, 2]);
        handle.fail_comm(2, 2);
        let mut bus = Bus::new(adapter, BusConfig::default());

        let devices = discover(&mut bus, 2, 10).unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(handle.sent_count(Instruction::Ping), 3);
    }

    #[test]
    fn test_discover_short_is_failure() {
        let (adapter, handle) = VirtualBus::with_servos(1_000_000, &[1, 2]);
        let mut bus = Bus::new(adapter, BusConfig::default());

        let err = discover(&mut bus, 3, 4).unwrap_err();
        match err {
            DriverError::DiscoveryFailed { expected, found } => {
                assert_eq!(expected, 3);
                assert_eq!(found, vec![1, 2]);
            },
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(handle.sent_count(Instruction::Ping), 4);
    }

    #[test]
    fn test_discover_empty_bus() {
        let (adapter, _handle) = VirtualBus::new(1_000_000);
        let mut bus = Bus::new(adapter, BusConfig::default());
        let err = discover(&mut bus, 0, 2).unwrap_err();
        assert!(matches!(err, DriverError::DiscoveryFailed { expected: 1, .. }));
    }
}
