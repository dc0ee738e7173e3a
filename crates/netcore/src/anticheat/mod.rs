mod validator;

pub use validator::{AntiCheatRecord, AntiCheatValidator, MovementVerdict, RejectReason};
