//! 监控轮询
//!
//! 固定节拍轮流刷新位置、负载、扭矩、模式；节拍之间发送用户命令
//! （没有待发命令时发送空命令保活，顺带取回最新图像帧）。

use crate::client::Requester;
use crate::error::ServerError;
use crate::wire::Reply;
use hand_client::OperatingMode;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// 默认刷新节拍
pub const DEFAULT_TICK: Duration = Duration::from_millis(250);

/// 默认命令队列容量
pub const COMMAND_QUEUE_CAPACITY: usize = 10;

/// 刷新操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOp {
    Positions,
    Loads,
    Torques,
    Modes,
}

impl RefreshOp {
    /// 对应的命令文本
    pub fn command(self) -> &'static str {
        match self {
            RefreshOp::Positions => "get_motor_position()",
            RefreshOp::Loads => "get_load()",
            RefreshOp::Torques => "get_torque()",
            RefreshOp::Modes => "get_mode()",
        }
    }
}

/// 刷新序列状态机：持有有序操作表与当前下标，每个节拍前进一步
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshCycle {
    ops: Vec<RefreshOp>,
    index: usize,
}

impl RefreshCycle {
    /// 负载变化最快，穿插在其他刷新之间
    pub const DEFAULT_ORDER: [RefreshOp; 6] = [
        RefreshOp::Positions,
        RefreshOp::Loads,
        RefreshOp::Torques,
        RefreshOp::Loads,
        RefreshOp::Modes,
        RefreshOp::Loads,
    ];

    /// 空操作表退回默认顺序
    pub fn new(ops: Vec<RefreshOp>) -> Self {
        let ops = if ops.is_empty() {
            Self::DEFAULT_ORDER.to_vec()
        } else {
            ops
        };
        Self { ops, index: 0 }
    }

    pub fn current(&self) -> RefreshOp {
        self.ops[self.index]
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn ops(&self) -> &[RefreshOp] {
        &self.ops
    }

    /// 返回当前操作并前进到下一个
    pub fn advance(&mut self) -> RefreshOp {
        let op = self.ops[self.index];
        self.index = (self.index + 1) % self.ops.len();
        op
    }
}

impl Default for RefreshCycle {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ORDER.to_vec())
    }
}

/// 待发命令队列
///
/// 满时新命令替换队尾，只保留用户最近的意图。
#[derive(Debug, Clone)]
pub struct CommandQueue {
    items: VecDeque<String>,
    capacity: usize,
}

impl CommandQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, command: impl Into<String>) {
        let command = command.into();
        if self.items.len() >= self.capacity {
            if let Some(last) = self.items.back_mut() {
                debug!("Command queue full, replacing {:?}", last);
                *last = command;
            }
        } else {
            self.items.push_back(command);
        }
    }

    pub fn pop(&mut self) -> Option<String> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new(COMMAND_QUEUE_CAPACITY)
    }
}

/// 单个舵机的最新读数
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotorView {
    pub position: Option<f64>,
    pub load: Option<f64>,
    pub torque: Option<bool>,
    pub mode: Option<OperatingMode>,
}

/// 解析回复开头的方括号列表：`[1.0, None, 3]` → `[Some("1.0"), None, Some("3")]`
pub fn parse_list(text: &str) -> Option<Vec<Option<String>>> {
    let body = text.strip_prefix('[')?;
    let end = body.find(']')?;
    let body = body[..end].trim();
    if body.is_empty() {
        return Some(Vec::new());
    }
    Some(
        body.split(',')
            .map(str::trim)
            .map(|item| (item != "None").then(|| item.to_string()))
            .collect(),
    )
}

/// 单步结果
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// 执行了一次刷新
    Refreshed { op: RefreshOp, reply: Reply },
    /// 发送了用户命令（空字符串为保活）
    Command { command: String, reply: Reply },
}

impl StepOutcome {
    pub fn reply(&self) -> &Reply {
        match self {
            StepOutcome::Refreshed { reply, .. } | StepOutcome::Command { reply, .. } => reply,
        }
    }
}

/// 监控轮询器
pub struct Supervisor<R: Requester> {
    requester: R,
    cycle: RefreshCycle,
    queue: CommandQueue,
    motors: Vec<MotorView>,
    tick: Duration,
    last_refresh: Option<Instant>,
}

impl<R: Requester> Supervisor<R> {
    pub fn new(requester: R, motors: usize) -> Self {
        Self {
            requester,
            cycle: RefreshCycle::default(),
            queue: CommandQueue::default(),
            motors: vec![MotorView::default(); motors],
            tick: DEFAULT_TICK,
            last_refresh: None,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_cycle(mut self, cycle: RefreshCycle) -> Self {
        self.cycle = cycle;
        self
    }

    pub fn with_queue(mut self, queue: CommandQueue) -> Self {
        self.queue = queue;
        self
    }

    pub fn motors(&self) -> &[MotorView] {
        &self.motors
    }

    pub fn cycle(&self) -> &RefreshCycle {
        &self.cycle
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn requester_mut(&mut self) -> &mut R {
        &mut self.requester
    }

    /// 排队一条用户命令
    pub fn submit(&mut self, command: impl Into<String>) {
        self.queue.push(command);
    }

    /// 执行一步：节拍到达则刷新，否则发送下一条命令
    pub fn step(&mut self) -> Result<StepOutcome, ServerError> {
        let due = self
            .last_refresh
            .is_none_or(|last| last.elapsed() >= self.tick);

        if due {
            let op = self.cycle.advance();
            let result = self.requester.request(op.command());
            self.last_refresh = Some(Instant::now());
            let reply = result?;
            self.apply(op, &reply.text)?;
            Ok(StepOutcome::Refreshed { op, reply })
        } else {
            let command = self.queue.pop().unwrap_or_default();
            let reply = self.requester.request(&command)?;
            Ok(StepOutcome::Command { command, reply })
        }
    }

    /// 循环执行直到关闭标志置位；每步结果交给回调
    pub fn run(
        &mut self,
        shutdown: &AtomicBool,
        mut on_step: impl FnMut(&Result<StepOutcome, ServerError>),
    ) {
        while !shutdown.load(Ordering::SeqCst) {
            let outcome = self.step();
            on_step(&outcome);
        }
    }

    fn apply(&mut self, op: RefreshOp, text: &str) -> Result<(), ServerError> {
        let items = parse_list(text).ok_or_else(|| ServerError::MalformedReply(text.to_string()))?;
        if self.motors.len() < items.len() {
            self.motors.resize(items.len(), MotorView::default());
        }

        for (motor, item) in self.motors.iter_mut().zip(&items) {
            let Some(item) = item else {
                continue;
            };
            let parsed = match op {
                RefreshOp::Positions => item.parse::<f64>().map(|v| motor.position = Some(v)).is_ok(),
                RefreshOp::Loads => item.parse::<f64>().map(|v| motor.load = Some(v)).is_ok(),
                RefreshOp::Torques => item
                    .parse::<u8>()
                    .map(|v| motor.torque = Some(v != 0))
                    .is_ok(),
                RefreshOp::Modes => item
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| OperatingMode::from_index(i).ok())
                    .map(|mode| motor.mode = Some(mode))
                    .is_some(),
            };
            if !parsed {
                warn!("Ignoring unparsable {:?} item {:?}", op, item);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 记录请求并按命令返回固定文本
    struct Scripted {
        sent: Vec<String>,
    }

    impl Requester for Scripted {
        fn request(&mut self, text: &str) -> Result<Reply, ServerError> {
            self.sent.push(text.to_string());
            let body = match text {
                "get_motor_position()" => "[45.01, -12.5]",
                "get_load()" => "[3.2, None]",
                "get_torque()" => "[1, 0]",
                "get_mode()" => "[2, 0]",
                "" => "[#]: None",
                _ => "[1, 2]",
            };
            Ok(Reply::new(format!("{} (cam_t: 0.000 eval_t: 0.000)", body), vec![1]))
        }
    }

    fn supervisor(tick: Duration) -> Supervisor<Scripted> {
        Supervisor::new(Scripted { sent: Vec::new() }, 2).with_tick(tick)
    }

    #[test]
    fn test_refresh_cycle_order() {
        let mut cycle = RefreshCycle::default();
        let ops: Vec<RefreshOp> = (0..7).map(|_| cycle.advance()).collect();
        assert_eq!(&ops[..6], &RefreshCycle::DEFAULT_ORDER);
        assert_eq!(ops[6], RefreshOp::Positions);
        assert_eq!(cycle.index(), 1);
    }

    #[test]
    fn test_refresh_cycle_empty_falls_back() {
        let cycle = RefreshCycle::new(Vec::new());
        assert_eq!(cycle.ops(), &RefreshCycle::DEFAULT_ORDER);
        assert_eq!(cycle.current(), RefreshOp::Positions);
    }

    #[test]
    fn test_command_queue_replaces_last_when_full() {
        let mut queue = CommandQueue::new(3);
        for i in 0..5 {
            queue.push(format!("cmd{}", i));
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop().as_deref(), Some("cmd0"));
        assert_eq!(queue.pop().as_deref(), Some("cmd1"));
        assert_eq!(queue.pop().as_deref(), Some("cmd4"));
        assert!(queue.is_empty());
        assert_eq!(CommandQueue::default().capacity(), COMMAND_QUEUE_CAPACITY);
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(
            parse_list("[1, None, 3] (cam_t: 0.001 eval_t: 0.002)"),
            Some(vec![Some("1".into()), None, Some("3".into())])
        );
        assert_eq!(parse_list("[] (cam_t: 0.000)"), Some(vec![]));
        assert_eq!(parse_list("[#]: None"), Some(vec![Some("#".into())]));
        assert_eq!(parse_list("no list"), None);
        assert_eq!(parse_list("[unterminated"), None);
    }

    #[test]
    fn test_first_step_refreshes() {
        let mut sup = supervisor(Duration::from_secs(3600));
        let outcome = sup.step().unwrap();
        assert!(matches!(
            outcome,
            StepOutcome::Refreshed {
                op: RefreshOp::Positions,
                ..
            }
        ));
        assert_eq!(sup.motors()[0].position, Some(45.01));
        assert_eq!(sup.motors()[1].position, Some(-12.5));
    }

    #[test]
    fn test_commands_between_ticks() {
        let mut sup = supervisor(Duration::from_secs(3600));
        sup.step().unwrap();
        sup.submit("set_torque(1)");

        let outcome = sup.step().unwrap();
        assert_eq!(
            outcome,
            StepOutcome::Command {
                command: "set_torque(1)".into(),
                reply: outcome.reply().clone()
            }
        );
        // 队列空时发送保活命令
        match sup.step().unwrap() {
            StepOutcome::Command { command, reply } => {
                assert_eq!(command, "");
                assert!(reply.text.starts_with("[#]: None"));
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_refresh_updates_view() {
        let mut sup = supervisor(Duration::ZERO);
        for _ in 0..RefreshCycle::DEFAULT_ORDER.len() {
            sup.step().unwrap();
        }
        let motors = sup.motors();
        assert_eq!(motors[0].load, Some(3.2));
        assert_eq!(motors[1].load, None);
        assert_eq!(motors[0].torque, Some(true));
        assert_eq!(motors[1].torque, Some(false));
        assert_eq!(motors[0].mode, Some(OperatingMode::Pwm));
        assert_eq!(motors[1].mode, Some(OperatingMode::Position));
        assert_eq!(
            sup.requester_mut().sent,
            vec![
                "get_motor_position()",
                "get_load()",
                "get_torque()",
                "get_load()",
                "get_mode()",
                "get_load()"
            ]
        );
    }

    #[test]
    fn test_malformed_refresh_reply() {
        struct Broken;
        impl Requester for Broken {
            fn request(&mut self, _text: &str) -> Result<Reply, ServerError> {
                Ok(Reply::new("[!]: Wrong Command!", vec![]))
            }
        }
        let mut sup = Supervisor::new(Broken, 1);
        // 方括号内容无法解析：记录警告，视图不变
        sup.step().unwrap();
        assert_eq!(sup.motors()[0], MotorView::default());

        struct NoList;
        impl Requester for NoList {
            fn request(&mut self, _text: &str) -> Result<Reply, ServerError> {
                Ok(Reply::new("garbage", vec![]))
            }
        }
        let mut sup = Supervisor::new(NoList, 1);
        assert!(matches!(sup.step(), Err(ServerError::MalformedReply(_))));
    }
}
