//! 命令白名单
//!
//! 命令名 → (参数表, 构造函数)。不在表内的名字一律拒绝。

use super::{Call, Command, CommandError, Value};
use hand_client::{BaudRate, Degrees, OperatingMode, PwmPercent, Rpm};
use hand_protocol::MAX_ID;

/// 参数类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// 开关：`0/1` 或布尔值
    Flag,
    /// 运行模式序号：0 位置、1 速度、2 PWM
    ModeIndex,
    /// 数值（整数或浮点）
    Number,
    /// 波特率（bps）
    Baud,
    /// 舵机数量（正整数）
    Count,
    /// ID 列表
    Ids,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
}

impl ParamSpec {
    const fn required(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    const fn optional(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }
}

const IDS: ParamSpec = ParamSpec::optional("ids", ParamKind::Ids);

/// 白名单条目
pub struct CommandSpec {
    pub name: &'static str,
    pub params: &'static [ParamSpec],
    pub summary: &'static str,
    build: fn(&Args) -> Result<Command, CommandError>,
}

impl CommandSpec {
    /// 调用形式，如 `set_led(mode, ids=None)`
    pub fn usage(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| {
                if p.required {
                    p.name.to_string()
                } else {
                    format!("{}=None", p.name)
                }
            })
            .collect();
        format!("{}({})", self.name, params.join(", "))
    }
}

impl std::fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

/// 全部允许的命令
pub static COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "set_led",
        params: &[ParamSpec::required("mode", ParamKind::Flag), IDS],
        summary: "Turn LEDs on (1) or off (0)",
        build: build_set_led,
    },
    CommandSpec {
        name: "set_torque",
        params: &[ParamSpec::required("mode", ParamKind::Flag), IDS],
        summary: "Enable (1) or disable (0) torque",
        build: build_set_torque,
    },
    CommandSpec {
        name: "get_torque",
        params: &[IDS],
        summary: "Read torque state",
        build: |a| Ok(Command::GetTorque { ids: a.ids(0)? }),
    },
    CommandSpec {
        name: "set_mode",
        params: &[ParamSpec::required("mode", ParamKind::ModeIndex), IDS],
        summary: "Set operating mode: 0 position, 1 velocity, 2 PWM",
        build: build_set_mode,
    },
    CommandSpec {
        name: "get_mode",
        params: &[IDS],
        summary: "Read operating mode index",
        build: |a| Ok(Command::GetMode { ids: a.ids(0)? }),
    },
    CommandSpec {
        name: "get_voltage",
        params: &[IDS],
        summary: "Read supply voltage (V)",
        build: |a| Ok(Command::GetVoltage { ids: a.ids(0)? }),
    },
    CommandSpec {
        name: "get_load",
        params: &[IDS],
        summary: "Read load (%)",
        build: |a| Ok(Command::GetLoad { ids: a.ids(0)? }),
    },
    CommandSpec {
        name: "get_motor_position",
        params: &[IDS],
        summary: "Read present position (degrees)",
        build: |a| Ok(Command::GetMotorPosition { ids: a.ids(0)? }),
    },
    CommandSpec {
        name: "get_sync_motor_position",
        params: &[],
        summary: "Read all positions in one sync-read exchange",
        build: |_| Ok(Command::GetSyncMotorPosition),
    },
    CommandSpec {
        name: "get_velocity_limit",
        params: &[IDS],
        summary: "Read velocity limit (raw, 0~1023)",
        build: |a| Ok(Command::GetVelocityLimit { ids: a.ids(0)? }),
    },
    CommandSpec {
        name: "set_motor_position",
        params: &[ParamSpec::required("goal", ParamKind::Number), IDS],
        summary: "Set goal position (degrees)",
        build: |a| {
            Ok(Command::SetMotorPosition {
                goal: Degrees(a.number(0)?),
                ids: a.ids(1)?,
            })
        },
    },
    CommandSpec {
        name: "set_motor_velocity",
        params: &[ParamSpec::required("goal", ParamKind::Number), IDS],
        summary: "Set goal velocity (rpm, -229~229)",
        build: |a| {
            Ok(Command::SetMotorVelocity {
                goal: Rpm(a.number(0)?),
                ids: a.ids(1)?,
            })
        },
    },
    CommandSpec {
        name: "set_motor_pwm",
        params: &[ParamSpec::required("goal", ParamKind::Number), IDS],
        summary: "Set goal PWM (%, negative reverses)",
        build: |a| {
            Ok(Command::SetMotorPwm {
                goal: PwmPercent(a.number(0)?),
                ids: a.ids(1)?,
            })
        },
    },
    CommandSpec {
        name: "set_motor_baudrate",
        params: &[ParamSpec::required("baud", ParamKind::Baud), IDS],
        summary: "Change baud rate, reopen the bus and rediscover",
        build: |a| {
            Ok(Command::SetMotorBaudrate {
                baud: a.baud(0)?,
                ids: a.ids(1)?,
            })
        },
    },
    CommandSpec {
        name: "get_motor_baudrate",
        params: &[IDS],
        summary: "Read baud rate (bps)",
        build: |a| Ok(Command::GetMotorBaudrate { ids: a.ids(0)? }),
    },
    CommandSpec {
        name: "find_motors",
        params: &[ParamSpec::optional("n_motors", ParamKind::Count)],
        summary: "Rediscover actuators",
        build: |a| {
            Ok(Command::FindMotors {
                expected: a.count(0)?,
            })
        },
    },
    CommandSpec {
        name: "config_sync_read",
        params: &[],
        summary: "Rebuild the sync-read poll group",
        build: |_| Ok(Command::ConfigSyncRead),
    },
];

fn build_set_led(a: &Args) -> Result<Command, CommandError> {
    Ok(Command::SetLed {
        on: a.flag(0)?,
        ids: a.ids(1)?,
    })
}

fn build_set_torque(a: &Args) -> Result<Command, CommandError> {
    Ok(Command::SetTorque {
        enable: a.flag(0)?,
        ids: a.ids(1)?,
    })
}

fn build_set_mode(a: &Args) -> Result<Command, CommandError> {
    Ok(Command::SetMode {
        mode: a.mode(0)?,
        ids: a.ids(1)?,
    })
}

/// 按名字查找
pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|spec| spec.name == name)
}

/// 绑定参数并构造命令
pub fn resolve(call: &Call) -> Result<Command, CommandError> {
    let spec = lookup(&call.name).ok_or_else(|| CommandError::UnknownCommand(call.name.clone()))?;

    if call.args.len() > spec.params.len() {
        return Err(CommandError::TooManyArguments {
            command: spec.name,
            max: spec.params.len(),
            given: call.args.len(),
        });
    }

    let mut values: Vec<Option<Value>> = vec![None; spec.params.len()];
    for (slot, value) in values.iter_mut().zip(&call.args) {
        *slot = Some(value.clone());
    }
    for (name, value) in &call.kwargs {
        let index = spec
            .params
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| CommandError::UnknownArgument {
                command: spec.name,
                name: name.clone(),
            })?;
        if values[index].is_some() {
            return Err(CommandError::DuplicateArgument {
                command: spec.name,
                name: spec.params[index].name,
            });
        }
        values[index] = Some(value.clone());
    }
    for (param, value) in spec.params.iter().zip(&values) {
        if param.required && value.is_none() {
            return Err(CommandError::MissingArgument {
                command: spec.name,
                name: param.name,
            });
        }
    }

    (spec.build)(&Args { spec, values })
}

/// 已绑定的参数
pub struct Args {
    spec: &'static CommandSpec,
    values: Vec<Option<Value>>,
}

impl Args {
    fn invalid(&self, index: usize, reason: impl Into<String>) -> CommandError {
        CommandError::InvalidArgument {
            command: self.spec.name,
            name: self.spec.params[index].name,
            reason: reason.into(),
        }
    }

    fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index).and_then(Option::as_ref)
    }

    fn int(&self, index: usize) -> Result<i64, CommandError> {
        match self.value(index) {
            Some(Value::Int(v)) => Ok(*v),
            Some(other) => Err(self.invalid(index, format!("expected integer, got {}", other.kind()))),
            None => Err(self.invalid(index, "expected integer, got nothing")),
        }
    }

    fn flag(&self, index: usize) -> Result<bool, CommandError> {
        match self.value(index) {
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::Int(0)) => Ok(false),
            Some(Value::Int(1)) => Ok(true),
            Some(Value::Int(v)) => Err(self.invalid(index, format!("expected 0 or 1, got {}", v))),
            Some(other) => Err(self.invalid(index, format!("expected 0 or 1, got {}", other.kind()))),
            None => Err(self.invalid(index, "expected 0 or 1, got nothing")),
        }
    }

    fn mode(&self, index: usize) -> Result<OperatingMode, CommandError> {
        let value = self.int(index)?;
        usize::try_from(value)
            .ok()
            .and_then(|i| OperatingMode::from_index(i).ok())
            .ok_or_else(|| self.invalid(index, format!("mode index must be 0, 1 or 2, got {}", value)))
    }

    fn number(&self, index: usize) -> Result<f64, CommandError> {
        let value = match self.value(index) {
            Some(Value::Int(v)) => *v as f64,
            Some(Value::Float(v)) => *v,
            Some(other) => {
                return Err(self.invalid(index, format!("expected number, got {}", other.kind())));
            },
            None => return Err(self.invalid(index, "expected number, got nothing")),
        };
        if !value.is_finite() {
            return Err(self.invalid(index, "number must be finite"));
        }
        Ok(value)
    }

    fn baud(&self, index: usize) -> Result<BaudRate, CommandError> {
        let value = self.int(index)?;
        u32::try_from(value)
            .ok()
            .and_then(|bps| BaudRate::from_bps(bps).ok())
            .ok_or_else(|| {
                self.invalid(
                    index,
                    format!("unsupported baud rate {} (57600, 115200, 1000000)", value),
                )
            })
    }

    fn count(&self, index: usize) -> Result<Option<usize>, CommandError> {
        match self.value(index) {
            None | Some(Value::None) => Ok(None),
            // 总线上最多 MAX_ID + 1 个地址
            Some(Value::Int(v)) if (1..=MAX_ID as i64 + 1).contains(v) => Ok(Some(*v as usize)),
            Some(Value::Int(v)) => Err(self.invalid(
                index,
                format!("count {} out of range 1~{}", v, MAX_ID as i64 + 1),
            )),
            Some(other) => Err(self.invalid(index, format!("expected integer, got {}", other.kind()))),
        }
    }

    fn ids(&self, index: usize) -> Result<Option<Vec<u8>>, CommandError> {
        match self.value(index) {
            None | Some(Value::None) => Ok(None),
            Some(Value::List(items)) => items
                .iter()
                .map(|&id| {
                    u8::try_from(id)
                        .ok()
                        .filter(|id| *id <= MAX_ID)
                        .ok_or_else(|| self.invalid(index, format!("id {} out of range 0~{}", id, MAX_ID)))
                })
                .collect::<Result<Vec<u8>, _>>()
                .map(Some),
            Some(other) => Err(self.invalid(index, format!("expected list of ids, got {}", other.kind()))),
        }
    }
}
