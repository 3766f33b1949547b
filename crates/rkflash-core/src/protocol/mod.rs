//! Rockchip USB boot protocol wire format
//!
//! This module contains the opcode tables and the request/response frame
//! codec. Executing a command against a device is done by
//! [`Session::execute`](crate::session::Session::execute).

pub mod frame;
pub mod opcodes;

pub use frame::{Command, CommandBlock, Request, Response, SizeField};
pub use opcodes::{Direction, Opcode};
