//! 模拟总线
//!
//! 进程内模拟若干舵机，所有指令与回复都经过真实的编解码器往返，
//! 上层可以在没有硬件的情况下测试完整协议栈。
//!
//! 故障注入通过可克隆的 [`VirtualBusHandle`] 控制：
//!
//! ```ignore
//! use hand_bus::{BusAdapter, VirtualBus};
//! use hand_protocol::InstructionPacket;
//!
//! let (mut bus, handle) = VirtualBus::with_servos(1_000_000, &[1, 2]);
//! handle.fail_comm(2, 1);
//!
//! bus.send(&InstructionPacket::ping(2)).unwrap();
//! assert!(bus.receive().is_err());
//! bus.send(&InstructionPacket::ping(2)).unwrap();
//! assert_eq!(bus.receive().unwrap().id, 2);
//! ```

use crate::{BusAdapter, BusError};
use hand_protocol::{
    BROADCAST_ID, BaudRate, DeviceErrorCode, Instruction, InstructionPacket, MODEL_MX_28,
    PacketDecoder, RawFrame, Register, StatusPacket, map,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::trace;

const TABLE_SIZE: usize = 256;

/// 注入次数：剩余 N 次或永久
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Budget {
    Times(usize),
    Always,
}

impl Budget {
    /// 消耗一次，返回本次是否触发
    fn take(slot: &mut Option<Budget>) -> bool {
        match slot {
            None => false,
            Some(Budget::Always) => true,
            Some(Budget::Times(n)) => {
                *n -= 1;
                if *n == 0 {
                    *slot = None;
                }
                true
            },
        }
    }

    fn new(times: usize) -> Option<Budget> {
        (times > 0).then_some(Budget::Times(times))
    }
}

#[derive(Debug, Default)]
struct Injection {
    /// 丢弃指令（无回复，上层看到超时）
    comm: Option<Budget>,
    /// 回复 CRC 损坏
    corrupt: Option<Budget>,
    /// 回复设备错误码（不执行指令）
    device: Option<(u8, Budget)>,
    /// 同步读取时不回复
    sync_drop: Option<Budget>,
    /// 写入指定值时回复设备错误码：(地址, 值, 错误码)
    write_value: Option<(u16, u32, u8)>,
}

/// 模拟舵机
#[derive(Debug, Clone)]
pub struct VirtualServo {
    pub id: u8,
    pub model: u16,
    pub firmware: u8,
    table: [u8; TABLE_SIZE],
}

impl VirtualServo {
    /// 新建舵机：位置模式、扭矩关闭、电压 12.0V
    pub fn new(id: u8, baud: BaudRate) -> Self {
        let mut servo = Self {
            id,
            model: MODEL_MX_28,
            firmware: 0x26,
            table: [0u8; TABLE_SIZE],
        };
        servo.poke(&map::BAUD_RATE, baud.code() as u32);
        servo.poke(&map::OPERATING_MODE, 4);
        servo.poke(&map::VELOCITY_LIMIT, 265);
        servo.poke(&map::PRESENT_VOLTAGE, 120);
        servo
    }

    pub fn with_model(mut self, model: u16) -> Self {
        self.model = model;
        self
    }

    /// 直接读取控制表（不经过总线）
    pub fn peek(&self, register: &Register) -> u32 {
        let start = register.address as usize;
        let mut buf = [0u8; 4];
        let width = register.width.bytes();
        buf[..width].copy_from_slice(&self.table[start..start + width]);
        u32::from_le_bytes(buf)
    }

    /// 直接写入控制表（不经过总线，也不检查权限）
    pub fn poke(&mut self, register: &Register, value: u32) {
        let start = register.address as usize;
        let width = register.width.bytes();
        self.table[start..start + width].copy_from_slice(&value.to_le_bytes()[..width]);
    }

    fn torque_enabled(&self) -> bool {
        self.peek(&map::TORQUE_ENABLE) != 0
    }

    fn baud_code(&self) -> u8 {
        self.table[map::BAUD_RATE.address as usize]
    }

    fn read(&self, address: u16, length: u16) -> Result<Vec<u8>, DeviceErrorCode> {
        let start = address as usize;
        let end = start + length as usize;
        if end > TABLE_SIZE {
            return Err(DeviceErrorCode::DataRangeError);
        }
        Ok(self.table[start..end].to_vec())
    }

    fn write(&mut self, address: u16, data: &[u8]) -> Result<(), DeviceErrorCode> {
        let start = address as usize;
        let end = start + data.len();
        if end > TABLE_SIZE {
            return Err(DeviceErrorCode::DataRangeError);
        }
        if address < map::EEPROM_END && self.torque_enabled() {
            return Err(DeviceErrorCode::AccessError);
        }
        self.table[start..end].copy_from_slice(data);

        // 扭矩开启时目标位置立即到达
        let goal = map::GOAL_POSITION.address as usize;
        if self.torque_enabled() && start <= goal && goal < end {
            let value = self.peek(&map::GOAL_POSITION);
            self.poke(&map::PRESENT_POSITION, value);
        }
        Ok(())
    }
}

#[derive(Debug)]
struct BusState {
    /// 按加入顺序保存（广播 Ping 默认按此顺序回复）
    servos: Vec<VirtualServo>,
    baud: u32,
    open: bool,
    ping_order: Option<Vec<u8>>,
    injections: BTreeMap<u8, Injection>,
    rx: VecDeque<u8>,
    sent: Vec<InstructionPacket>,
}

impl BusState {
    fn servo_mut(&mut self, id: u8) -> Option<&mut VirtualServo> {
        self.servos.iter_mut().find(|s| s.id == id)
    }

    /// 舵机是否能在当前总线波特率下收到指令
    fn hears(&self, servo: &VirtualServo) -> bool {
        BaudRate::from_bps(self.baud).is_ok_and(|b| b.code() == servo.baud_code())
    }

    fn hears_id(&self, id: u8) -> bool {
        self.servos
            .iter()
            .find(|s| s.id == id)
            .is_some_and(|s| self.hears(s))
    }

    fn reply(&mut self, status: StatusPacket) {
        let mut bytes = status.encode();
        let corrupt = self
            .injections
            .get_mut(&status.id)
            .is_some_and(|inj| Budget::take(&mut inj.corrupt));
        if corrupt && let Some(last) = bytes.last_mut() {
            *last ^= 0xFF;
        }
        trace!("VIRTUAL RX {}", hex::encode(&bytes));
        self.rx.extend(bytes);
    }

    fn dispatch(&mut self, packet: InstructionPacket) {
        match packet.instruction {
            Instruction::Ping if packet.id == BROADCAST_ID => self.broadcast_ping(),
            Instruction::SyncRead => self.sync_read(&packet),
            Instruction::Write if packet.id == BROADCAST_ID => {
                let ids: Vec<u8> = self.servos.iter().map(|s| s.id).collect();
                for id in ids {
                    // 广播写入无回复
                    let _ = self.unicast(id, &packet);
                }
            },
            _ => {
                if let Some(status) = self.unicast(packet.id, &packet) {
                    self.reply(status);
                }
            },
        }
    }

    fn broadcast_ping(&mut self) {
        let order: Vec<u8> = match &self.ping_order {
            Some(order) => order.clone(),
            None => self.servos.iter().map(|s| s.id).collect(),
        };
        for id in order {
            let heard = self.hears_id(id);
            if !heard || self.take_comm(id) {
                continue;
            }
            if let Some(servo) = self.servos.iter().find(|s| s.id == id) {
                let [lo, hi] = servo.model.to_le_bytes();
                let status = StatusPacket::new(id, 0, &[lo, hi, servo.firmware]);
                self.reply(status);
            }
        }
    }

    fn sync_read(&mut self, packet: &InstructionPacket) {
        let Some((address, length)) = packet.read_span() else {
            return;
        };
        let ids: Vec<u8> = packet.params[4..].to_vec();
        for id in ids {
            let heard = self.hears_id(id);
            if !heard || self.take_comm(id) {
                continue;
            }
            let dropped = self
                .injections
                .get_mut(&id)
                .is_some_and(|inj| Budget::take(&mut inj.sync_drop));
            if dropped {
                continue;
            }
            if let Some(servo) = self.servos.iter().find(|s| s.id == id) {
                let status = match servo.read(address, length) {
                    Ok(data) => StatusPacket::new(id, 0, &data),
                    Err(code) => StatusPacket::new(id, code as u8, &[]),
                };
                self.reply(status);
            }
        }
    }

    fn take_comm(&mut self, id: u8) -> bool {
        self.injections
            .get_mut(&id)
            .is_some_and(|inj| Budget::take(&mut inj.comm))
    }

    fn take_device(&mut self, id: u8) -> Option<u8> {
        let inj = self.injections.get_mut(&id)?;
        let (code, budget) = inj.device.as_mut()?;
        let code = *code;
        let mut slot = Some(*budget);
        let hit = Budget::take(&mut slot);
        inj.device = slot.map(|b| (code, b));
        hit.then_some(code)
    }

    fn take_write_value(&self, id: u8, packet: &InstructionPacket) -> Option<u8> {
        let (address, value, code) = self.injections.get(&id)?.write_value?;
        if packet.instruction != Instruction::Write || packet.params.len() < 3 {
            return None;
        }
        let target = u16::from_le_bytes([packet.params[0], packet.params[1]]);
        let data = &packet.params[2..];
        let mut bytes = [0u8; 4];
        let n = data.len().min(4);
        bytes[..n].copy_from_slice(&data[..n]);
        (target == address && u32::from_le_bytes(bytes) == value).then_some(code)
    }

    /// 处理单播指令，返回需要回复的状态包
    fn unicast(&mut self, id: u8, packet: &InstructionPacket) -> Option<StatusPacket> {
        let heard = self.hears_id(id);
        if !heard || self.take_comm(id) {
            return None;
        }
        if let Some(code) = self.take_device(id) {
            return Some(StatusPacket::new(id, code, &[]));
        }

        if let Some(code) = self.take_write_value(id, packet) {
            return Some(StatusPacket::new(id, code, &[]));
        }

        let servo = self.servo_mut(id)?;
        let result = match packet.instruction {
            Instruction::Ping => {
                let [lo, hi] = servo.model.to_le_bytes();
                Ok(vec![lo, hi, servo.firmware])
            },
            Instruction::Read => match packet.read_span() {
                Some((address, length)) => servo.read(address, length),
                None => Err(DeviceErrorCode::DataLengthError),
            },
            Instruction::Write if packet.params.len() >= 2 => {
                let address = u16::from_le_bytes([packet.params[0], packet.params[1]]);
                servo.write(address, &packet.params[2..]).map(|_| Vec::new())
            },
            Instruction::Write => Err(DeviceErrorCode::DataLengthError),
            _ => Err(DeviceErrorCode::InstructionError),
        };

        Some(match result {
            Ok(params) => StatusPacket::new(id, 0, &params),
            Err(code) => StatusPacket::new(id, code as u8, &[]),
        })
    }
}

/// 模拟总线控制句柄
#[derive(Debug, Clone)]
pub struct VirtualBusHandle {
    state: Arc<Mutex<BusState>>,
}

impl VirtualBusHandle {
    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 添加舵机（波特率与总线当前波特率一致）
    pub fn add_servo(&self, id: u8) {
        let mut state = self.lock();
        let baud = BaudRate::from_bps(state.baud).unwrap_or(BaudRate::Baud1M);
        state.servos.retain(|s| s.id != id);
        state.servos.push(VirtualServo::new(id, baud));
    }

    /// 添加自定义舵机
    pub fn insert_servo(&self, servo: VirtualServo) {
        let mut state = self.lock();
        state.servos.retain(|s| s.id != servo.id);
        state.servos.push(servo);
    }

    pub fn remove_servo(&self, id: u8) {
        self.lock().servos.retain(|s| s.id != id);
    }

    pub fn servo_ids(&self) -> Vec<u8> {
        self.lock().servos.iter().map(|s| s.id).collect()
    }

    /// 读取寄存器（不经过总线）
    pub fn register(&self, id: u8, register: &Register) -> Option<u32> {
        self.lock()
            .servos
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.peek(register))
    }

    /// 写入寄存器（不经过总线）
    pub fn set_register(&self, id: u8, register: &Register, value: u32) {
        if let Some(servo) = self.lock().servo_mut(id) {
            servo.poke(register, value);
        }
    }

    /// 设置当前位置（原始单位，有符号）
    pub fn set_present_position(&self, id: u8, raw: i32) {
        self.set_register(id, &map::PRESENT_POSITION, raw as u32);
    }

    pub fn torque_enabled(&self, id: u8) -> bool {
        self.register(id, &map::TORQUE_ENABLE)
            .is_some_and(|v| v != 0)
    }

    /// 接下来 `times` 条发往 `id` 的指令丢失
    pub fn fail_comm(&self, id: u8, times: usize) {
        self.lock().injections.entry(id).or_default().comm = Budget::new(times);
    }

    /// 发往 `id` 的指令全部丢失
    pub fn fail_comm_always(&self, id: u8) {
        self.lock().injections.entry(id).or_default().comm = Some(Budget::Always);
    }

    /// 接下来 `times` 个来自 `id` 的回复 CRC 损坏
    pub fn corrupt_replies(&self, id: u8, times: usize) {
        self.lock().injections.entry(id).or_default().corrupt = Budget::new(times);
    }

    /// 接下来 `times` 条发往 `id` 的指令返回设备错误码
    pub fn device_error(&self, id: u8, code: DeviceErrorCode, times: usize) {
        self.lock().injections.entry(id).or_default().device =
            Budget::new(times).map(|b| (code as u8, b));
    }

    /// 发往 `id` 的指令全部返回设备错误码
    pub fn device_error_always(&self, id: u8, code: DeviceErrorCode) {
        self.lock().injections.entry(id).or_default().device = Some((code as u8, Budget::Always));
    }

    /// 向 `id` 的 `register` 写入 `value` 时一律返回设备错误码
    pub fn reject_write_value(
        &self,
        id: u8,
        register: &Register,
        value: u32,
        code: DeviceErrorCode,
    ) {
        self.lock().injections.entry(id).or_default().write_value =
            Some((register.address, value, code as u8));
    }

    /// 接下来 `times` 轮同步读取中 `id` 不回复
    pub fn drop_sync_replies(&self, id: u8, times: usize) {
        self.lock().injections.entry(id).or_default().sync_drop = Budget::new(times);
    }

    /// 清除全部故障注入
    pub fn clear_faults(&self) {
        self.lock().injections.clear();
    }

    /// 广播 Ping 的回复顺序
    pub fn set_ping_order(&self, order: &[u8]) {
        self.lock().ping_order = Some(order.to_vec());
    }

    /// 向接收缓冲注入任意字节（噪声）
    pub fn inject_bytes(&self, bytes: &[u8]) {
        self.lock().rx.extend(bytes.iter().copied());
    }

    /// 模拟总线被外部关闭
    pub fn close(&self) {
        self.lock().open = false;
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    pub fn baud_rate(&self) -> u32 {
        self.lock().baud
    }

    /// 已发送的全部指令包
    pub fn sent(&self) -> Vec<InstructionPacket> {
        self.lock().sent.clone()
    }

    /// 某一指令的发送次数
    pub fn sent_count(&self, instruction: Instruction) -> usize {
        self.lock()
            .sent
            .iter()
            .filter(|p| p.instruction == instruction)
            .count()
    }

    /// 发往 `id` 的某一寄存器的写入次数
    pub fn write_count(&self, id: u8, register: &Register) -> usize {
        self.lock()
            .sent
            .iter()
            .filter(|p| {
                p.instruction == Instruction::Write
                    && (p.id == id || p.id == BROADCAST_ID)
                    && p.params.len() >= 2
                    && u16::from_le_bytes([p.params[0], p.params[1]]) == register.address
            })
            .count()
    }

    pub fn reset_sent(&self) {
        self.lock().sent.clear();
    }
}

/// 模拟总线
#[derive(Debug)]
pub struct VirtualBus {
    handle: VirtualBusHandle,
    decoder: PacketDecoder,
}

impl VirtualBus {
    /// 新建空总线
    pub fn new(baud: u32) -> (Self, VirtualBusHandle) {
        let handle = VirtualBusHandle {
            state: Arc::new(Mutex::new(BusState {
                servos: Vec::new(),
                baud,
                open: true,
                ping_order: None,
                injections: BTreeMap::new(),
                rx: VecDeque::new(),
                sent: Vec::new(),
            })),
        };
        let bus = Self {
            handle: handle.clone(),
            decoder: PacketDecoder::new(),
        };
        (bus, handle)
    }

    /// 新建总线并按顺序挂载舵机
    pub fn with_servos(baud: u32, ids: &[u8]) -> (Self, VirtualBusHandle) {
        let (bus, handle) = Self::new(baud);
        for &id in ids {
            handle.add_servo(id);
        }
        (bus, handle)
    }

    pub fn handle(&self) -> VirtualBusHandle {
        self.handle.clone()
    }
}

impl BusAdapter for VirtualBus {
    fn send(&mut self, packet: &InstructionPacket) -> Result<(), BusError> {
        let mut state = self.handle.lock();
        if !state.open {
            return Err(BusError::Closed);
        }

        // 设备侧按字节重新解码，保证经过真实编解码器
        let bytes = packet.encode();
        trace!("VIRTUAL TX {}", hex::encode(&bytes));
        let frame = RawFrame::parse(&bytes)?;
        let decoded = InstructionPacket::try_from(frame)?;

        state.sent.push(decoded.clone());
        state.dispatch(decoded);
        Ok(())
    }

    fn receive(&mut self) -> Result<StatusPacket, BusError> {
        {
            let mut state = self.handle.lock();
            if !state.open {
                return Err(BusError::Closed);
            }
            let bytes: Vec<u8> = state.rx.drain(..).collect();
            self.decoder.push(&bytes);
        }
        // 模拟总线不等待：没有完整包即视为超时
        self.decoder.next_status()?.ok_or(BusError::Timeout)
    }

    fn set_receive_timeout(&mut self, _timeout: Duration) {}

    fn clear(&mut self) -> Result<(), BusError> {
        self.decoder.clear();
        self.handle.lock().rx.clear();
        Ok(())
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<(), BusError> {
        BaudRate::from_bps(baud).map_err(|_| BusError::UnsupportedBaud(baud))?;
        let mut state = self.handle.lock();
        state.baud = baud;
        state.open = true;
        state.rx.clear();
        self.decoder.clear();
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.handle.lock().baud
    }

    fn close(&mut self) {
        self.handle.lock().open = false;
    }

    fn is_open(&self) -> bool {
        self.handle.lock().open
    }
}
