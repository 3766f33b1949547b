//! Device memory access through the loader

use super::MEMORY_CHUNK;
use crate::error::Result;
use crate::progress::Progress;
use crate::protocol::frame::Command;
use crate::protocol::opcodes::Opcode;
use crate::session::{BootMode, DataPhase, Session};
use crate::transport::Transport;

// The loader takes the length from the size field; the frame's transfer
// length stays zero for memory commands.
fn memory_command(opcode: Opcode, addr: u32, len: usize) -> Command {
    Command::new(opcode).address(addr).size(len as u16)
}

impl<T: Transport> Session<T> {
    /// Read `buf.len()` bytes of device memory starting at `addr`
    pub fn read_memory<P: Progress + ?Sized>(
        &mut self,
        addr: u32,
        buf: &mut [u8],
        progress: &mut P,
    ) -> Result<()> {
        self.require_mode(BootMode::Loader)?;
        progress.start(buf.len() as u64);
        let mut chunk_addr = addr;
        for chunk in buf.chunks_mut(MEMORY_CHUNK) {
            let len = chunk.len();
            let cmd = memory_command(Opcode::ReadSdram, chunk_addr, len);
            self.execute(&cmd, DataPhase::In(chunk))?;
            chunk_addr = chunk_addr.wrapping_add(len as u32);
            progress.update(len as u64);
        }
        progress.stop();
        Ok(())
    }

    /// Write `data` to device memory starting at `addr`
    pub fn write_memory<P: Progress + ?Sized>(
        &mut self,
        addr: u32,
        data: &[u8],
        progress: &mut P,
    ) -> Result<()> {
        self.require_mode(BootMode::Loader)?;
        progress.start(data.len() as u64);
        let mut chunk_addr = addr;
        for chunk in data.chunks(MEMORY_CHUNK) {
            let cmd = memory_command(Opcode::WriteSdram, chunk_addr, chunk.len());
            self.execute(&cmd, DataPhase::Out(chunk))?;
            chunk_addr = chunk_addr.wrapping_add(chunk.len() as u32);
            progress.update(chunk.len() as u64);
        }
        progress.stop();
        Ok(())
    }
}
