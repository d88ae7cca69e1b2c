pub mod command;
pub mod device;
pub mod event;
pub mod execution;
pub mod rule;
pub mod session;

pub use command::{CommandStatus, DeviceCommand};
pub use device::{Device, HostClient};
pub use event::{Event, EventKind};
pub use execution::{ExecutionStatus, RuleExecution};
pub use rule::{Action, ActionKind, Condition, Operator, Rule, RuleLogic, RuleStatus};
pub use session::{LivestreamSession, SessionStatus};
