//! 单寄存器事务
//!
//! 每个事务是一次 `(ID, 寄存器, 操作)` 请求，执行时最多尝试 [`RETRY_BUDGET`] 次。
//! 一次尝试成功的条件：总线交换完成，且设备回报的错误字节为 0。
//!
//! 失败分为两类，重试策略相同，但必须区分：
//! - `CommLayer`: 超时、CRC 错误、帧错误
//! - `Device`: 交换成功但设备回报非零错误码

use crate::bus::Bus;
use hand_bus::{BusAdapter, BusError};
use hand_protocol::{InstructionPacket, ProtocolError, Register, StatusError};
use smallvec::SmallVec;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// 每个事务的尝试次数
pub const RETRY_BUDGET: usize = 5;

/// 事务操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    /// 写入已换算为设备单位的原始值
    Write(u32),
}

/// 单寄存器事务
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub id: u8,
    pub register: Register,
    pub operation: Operation,
    payload: SmallVec<[u8; 4]>,
}

impl Transaction {
    /// 读取事务（寄存器必须可读）
    pub fn read(id: u8, register: &Register) -> Result<Self, ProtocolError> {
        if !register.access.is_readable() {
            return Err(ProtocolError::AccessDenied {
                register: register.name,
                access: "readable",
            });
        }
        Ok(Self {
            id,
            register: *register,
            operation: Operation::Read,
            payload: SmallVec::new(),
        })
    }

    /// 写入事务（寄存器必须可写，值必须严格落在声明宽度内）
    pub fn write(id: u8, register: &Register, value: u32) -> Result<Self, ProtocolError> {
        let payload = register.encode(value)?;
        Ok(Self {
            id,
            register: *register,
            operation: Operation::Write(value),
            payload,
        })
    }

    /// 有符号写入：按声明宽度截断为补码
    ///
    /// 值必须能用该宽度的有符号整数表示。
    pub fn write_signed(id: u8, register: &Register, value: i32) -> Result<Self, ProtocolError> {
        let bits = register.width.bytes() as u32 * 8;
        let (min, max) = if bits >= 32 {
            (i32::MIN as i64, i32::MAX as i64)
        } else {
            (-(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1)
        };
        if (value as i64) < min || (value as i64) > max {
            return Err(ProtocolError::WidthMismatch {
                register: register.name,
                width: register.width.bytes(),
                value: value as u32,
            });
        }
        let raw = (value as u32) & register.width.max_value();
        Self::write(id, register, raw)
    }

    fn packet(&self) -> InstructionPacket {
        match self.operation {
            Operation::Read => InstructionPacket::read(
                self.id,
                self.register.address,
                self.register.width.bytes() as u16,
            ),
            Operation::Write(_) => {
                InstructionPacket::write(self.id, self.register.address, &self.payload)
            },
        }
    }
}

/// 设备回报的故障（原始错误字节）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFault {
    pub error: u8,
}

impl DeviceFault {
    pub fn status_error(&self) -> StatusError {
        StatusError::from(self.error)
    }
}

impl fmt::Display for DeviceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status_error())
    }
}

/// 失败分类
#[derive(Debug)]
pub enum FailureKind {
    /// 总线层失败（超时/CRC/帧错误/总线关闭）
    CommLayer(BusError),
    /// 设备回报非零错误码
    Device(DeviceFault),
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::CommLayer(e) => write!(f, "communication error: {}", e),
            FailureKind::Device(fault) => write!(f, "device error: {}", fault),
        }
    }
}

/// 重试耗尽后的事务失败
#[derive(Error, Debug)]
#[error(
    "Transaction failed on id {id}, register {register} (address {address}) after {attempts} attempt(s): {kind}"
)]
pub struct TransactionFailure {
    pub id: u8,
    pub register: &'static str,
    pub address: u16,
    pub attempts: usize,
    pub kind: FailureKind,
}

impl TransactionFailure {
    pub fn is_comm_layer(&self) -> bool {
        matches!(self.kind, FailureKind::CommLayer(_))
    }

    pub fn is_device(&self) -> bool {
        matches!(self.kind, FailureKind::Device(_))
    }

    /// 总线已关闭等不可恢复的失败
    pub fn is_fatal(&self) -> bool {
        matches!(&self.kind, FailureKind::CommLayer(e) if e.is_fatal())
    }
}

/// 事务执行器
#[derive(Debug, Clone, Copy)]
pub struct Executor {
    retry_budget: usize,
}

impl Executor {
    pub fn new() -> Self {
        Self {
            retry_budget: RETRY_BUDGET,
        }
    }

    pub fn retry_budget(&self) -> usize {
        self.retry_budget
    }

    /// 执行事务
    ///
    /// # 返回
    /// - 读取：`Ok(Some(value))`，按声明宽度解释的无符号小端整数
    /// - 写入：`Ok(None)`
    /// - 重试耗尽：`Err(TransactionFailure)`，携带最后一次失败的分类
    ///
    /// 总线已关闭等致命错误不再重试，立即返回。
    pub fn execute<A: BusAdapter>(
        &self,
        bus: &mut Bus<A>,
        transaction: &Transaction,
    ) -> Result<Option<u32>, TransactionFailure> {
        let packet = transaction.packet();
        let register = &transaction.register;
        let mut last = None;

        for attempt in 1..=self.retry_budget {
            let kind = match bus.exchange(&packet) {
                Ok(status) if status.is_ok() => match transaction.operation {
                    Operation::Write(_) => return Ok(None),
                    Operation::Read => match register.decode(&status.params) {
                        Ok(value) => return Ok(Some(value)),
                        Err(e) => FailureKind::CommLayer(BusError::Protocol(e)),
                    },
                },
                Ok(status) => FailureKind::Device(DeviceFault {
                    error: status.error,
                }),
                Err(e) => {
                    let fatal = e.is_fatal();
                    let kind = FailureKind::CommLayer(e);
                    if fatal {
                        last = Some((attempt, kind));
                        break;
                    }
                    kind
                },
            };
            debug!(
                "Attempt {}/{} on id {} {} failed: {}",
                attempt, self.retry_budget, transaction.id, register.name, kind
            );
            last = Some((attempt, kind));
        }

        let (attempts, kind) = last.unwrap_or((
            0,
            FailureKind::CommLayer(BusError::Timeout),
        ));
        let failure = TransactionFailure {
            id: transaction.id,
            register: register.name,
            address: register.address,
            attempts,
            kind,
        };
        warn!("{}", failure);
        Err(failure)
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BusConfig;
    use hand_bus::VirtualBus;
    use hand_protocol::{DeviceErrorCode, map};

    fn bus(ids: &[u8]) -> (Bus<VirtualBus>, hand_bus::VirtualBusHandle) {
        let (adapter, handle) = VirtualBus::with_servos(1_000_000, ids);
        (Bus::new(adapter, BusConfig::default()), handle)
    }

    #[test]
    fn test_transaction_validation() {
        assert!(Transaction::read(1, &map::GOAL_POSITION).is_err());
        assert!(Transaction::write(1, &map::PRESENT_LOAD, 0).is_err());
        assert!(Transaction::write(1, &map::LED, 2).is_ok());
        assert!(matches!(
            Transaction::write(1, &map::LED, 256),
            Err(ProtocolError::WidthMismatch { .. })
        ));
    }

    #[test]
    fn test_write_signed_twos_complement() {
        let tx = Transaction::write_signed(1, &map::GOAL_PWM, -885).unwrap();
        assert_eq!(tx.operation, Operation::Write(0xFC8B));

        let tx = Transaction::write_signed(1, &map::GOAL_POSITION, -1).unwrap();
        assert_eq!(tx.operation, Operation::Write(u32::MAX));

        assert!(Transaction::write_signed(1, &map::GOAL_PWM, 40_000).is_err());
        assert!(Transaction::write_signed(1, &map::GOAL_PWM, -40_000).is_err());
    }

    #[test]
    fn test_read_returns_value() {
        let (mut bus, _handle) = bus(&[1]);
        let tx = Transaction::read(1, &map::PRESENT_VOLTAGE).unwrap();
        assert_eq!(Executor::new().execute(&mut bus, &tx).unwrap(), Some(120));
    }

    #[test]
    fn test_write_returns_none() {
        let (mut bus, handle) = bus(&[1]);
        let tx = Transaction::write(1, &map::LED, 1).unwrap();
        assert_eq!(Executor::new().execute(&mut bus, &tx).unwrap(), None);
        assert_eq!(handle.register(1, &map::LED), Some(1));
    }

    #[test]
    fn test_device_error_classified() {
        let (mut bus, handle) = bus(&[1]);
        handle.device_error_always(1, DeviceErrorCode::DataLimitError);
        let tx = Transaction::write(1, &map::LED, 1).unwrap();
        let failure = Executor::new().execute(&mut bus, &tx).unwrap_err();
        assert!(failure.is_device());
        assert_eq!(failure.attempts, RETRY_BUDGET);
        assert_eq!(failure.address, 65);
        let text = failure.to_string();
        assert!(text.contains("id 1"), "{}", text);
        assert!(text.contains("address 65"), "{}", text);
    }

    #[test]
    fn test_comm_error_classified() {
        let (mut bus, handle) = bus(&[1]);
        handle.fail_comm_always(1);
        let tx = Transaction::read(1, &map::PRESENT_LOAD).unwrap();
        let failure = Executor::new().execute(&mut bus, &tx).unwrap_err();
        assert!(failure.is_comm_layer());
        assert!(!failure.is_fatal());
    }

    #[test]
    fn test_closed_bus_not_retried() {
        let (mut bus, _handle) = bus(&[1]);
        bus.close();
        let tx = Transaction::read(1, &map::PRESENT_LOAD).unwrap();
        let failure = Executor::new().execute(&mut bus, &tx).unwrap_err();
        assert!(failure.is_fatal());
        assert_eq!(failure.attempts, 1);
    }
}
