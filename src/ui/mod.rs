//! 交互层：选择能力抽象与控制台实现。

pub mod noui;
pub mod selection;
