//! Bit-exact framing of a call onto a byte stream.
//!
//! A frame is the 192-byte control block, a buffer count, one 48-byte
//! descriptor per buffer, and then the payload of every buffer with a
//! nonzero transfer size (send sizes travel towards the server, receive
//! sizes travel back). The same codec serves both call directions; the
//! [`Role`] decides which transfer size applies.

use crate::protocol::buffer::{
    BD_EYECATCHER, BD_LOCATION_INLINE, BD_VERSION, BUFFER_DESCRIPTOR_LEN, Buffer, BufferKind,
};
use crate::protocol::control_block::{CB_EYECATCHER, CB_VERSION, ControlBlock, RESPONSE_EOF};
use crate::{AdaError, AdaResult};
use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};

// sanity bound against absurd counts from a corrupt frame
const MAX_BUFFERS: u32 = 64;

/// Byte order of a wire frame or record payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireOrder {
    LittleEndian,
    BigEndian,
}

impl WireOrder {
    /// The byte order of the machine this code runs on.
    #[must_use]
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Self::BigEndian
        } else {
            Self::LittleEndian
        }
    }
}

/// Which side of the call this codec invocation serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Emits send sizes, parses receive sizes.
    Client,
    /// Emits receive sizes, parses send sizes.
    Server,
}

/// Serializes a call frame onto `w`.
///
/// In the client role, each descriptor's receive size is first raised to
/// the declared buffer size so the server knows how much it may return.
///
/// # Errors
/// `AdaError::Io` when the sink fails.
pub fn emit_call(
    cb: &ControlBlock,
    buffers: &mut [Buffer],
    role: Role,
    order: WireOrder,
    w: &mut dyn std::io::Write,
) -> AdaResult<()> {
    if role == Role::Client {
        for buffer in buffers.iter_mut() {
            let size = buffer.size();
            buffer.set_recv_size(size);
        }
    }
    match order {
        WireOrder::LittleEndian => emit::<LittleEndian>(cb, buffers, role, w),
        WireOrder::BigEndian => emit::<BigEndian>(cb, buffers, role, w),
    }
}

/// Deserializes a call frame from `r`.
///
/// In the client role the buffer section is skipped when the control
/// block's response is worse than end-of-file, because the server does not
/// send it then. In the server role the buffer list is rebuilt from the
/// advertised count.
///
/// # Errors
/// `AdaError::Io` when the source fails, `AdaError::Corrupt` when an
/// eyecatcher or count is wrong.
pub fn parse_call(
    cb: &mut ControlBlock,
    buffers: &mut Vec<Buffer>,
    role: Role,
    order: WireOrder,
    r: &mut dyn std::io::Read,
) -> AdaResult<()> {
    match order {
        WireOrder::LittleEndian => parse::<LittleEndian>(cb, buffers, role, r),
        WireOrder::BigEndian => parse::<BigEndian>(cb, buffers, role, r),
    }
}

fn emit<B: ByteOrder>(
    cb: &ControlBlock,
    buffers: &[Buffer],
    role: Role,
    w: &mut dyn std::io::Write,
) -> AdaResult<()> {
    emit_control_block::<B>(cb, w)?;
    w.write_u32::<B>(buffers.len() as u32)?;
    for buffer in buffers {
        emit_descriptor::<B>(buffer, w)?;
    }
    for buffer in buffers {
        let payload = match role {
            Role::Client => buffer.to_send(),
            Role::Server => buffer.received(),
        };
        if !payload.is_empty() {
            w.write_all(payload)?;
        }
    }
    trace!(
        "emitted {} frame with {} buffers",
        String::from_utf8_lossy(&cb.command),
        buffers.len()
    );
    Ok(())
}

fn parse<B: ByteOrder>(
    cb: &mut ControlBlock,
    buffers: &mut Vec<Buffer>,
    role: Role,
    r: &mut dyn std::io::Read,
) -> AdaResult<()> {
    parse_control_block::<B>(cb, r)?;
    if role == Role::Client && cb.response > RESPONSE_EOF {
        // negative responses come without a buffer section
        return Ok(());
    }

    let count = r.read_u32::<B>()?;
    if count > MAX_BUFFERS {
        return Err(AdaError::Corrupt("implausible buffer count"));
    }
    match role {
        Role::Client => {
            if count as usize != buffers.len() {
                return Err(AdaError::Corrupt("buffer count changed in reply"));
            }
            for buffer in buffers.iter_mut() {
                parse_descriptor_into::<B>(buffer, r)?;
            }
            for buffer in buffers.iter_mut() {
                if buffer.recv_size() > buffer.size() {
                    return Err(AdaError::Corrupt("receive size exceeds buffer size"));
                }
                let len = buffer.recv_size() as usize;
                if len > 0 {
                    if buffer.raw_data().len() < len {
                        buffer.allocate(len);
                    }
                    r.read_exact(&mut buffer.raw_data_mut()[..len])?;
                }
            }
        }
        Role::Server => {
            buffers.clear();
            for _ in 0..count {
                buffers.push(parse_descriptor_new::<B>(r)?);
            }
            for buffer in buffers.iter_mut() {
                let len = buffer.send_size() as usize;
                if len > buffer.raw_data().len() {
                    return Err(AdaError::Corrupt("send size exceeds buffer size"));
                }
                if len > 0 {
                    r.read_exact(&mut buffer.raw_data_mut()[..len])?;
                }
            }
        }
    }
    Ok(())
}

fn emit_control_block<B: ByteOrder>(
    cb: &ControlBlock,
    w: &mut dyn std::io::Write,
) -> AdaResult<()> {
    w.write_u8(cb.typ)?;
    w.write_u8(0)?;
    w.write_all(&cb.version)?;
    w.write_u16::<B>(cb.block_len)?;
    w.write_all(&cb.command)?;
    w.write_u16::<B>(0)?;
    w.write_u16::<B>(cb.response)?;
    w.write_all(&cb.command_id)?;
    w.write_u32::<B>(cb.dbid)?;
    w.write_u32::<B>(cb.file_nr)?;
    w.write_u64::<B>(cb.isn)?;
    w.write_u64::<B>(cb.isn_lower_limit)?;
    w.write_u64::<B>(cb.isn_quantity)?;
    w.write_all(&cb.options)?;
    w.write_all(&cb.additions1)?;
    w.write_all(&cb.additions2)?;
    w.write_all(&cb.additions3)?;
    w.write_all(&cb.additions4)?;
    w.write_all(&cb.additions5)?;
    w.write_all(&cb.additions6)?;
    w.write_all(&[0; 4])?;
    w.write_u64::<B>(cb.error_offset)?;
    w.write_all(&cb.error_char)?;
    w.write_u16::<B>(cb.error_device)?;
    w.write_u8(0)?;
    w.write_u8(cb.error_buffer_id)?;
    w.write_u16::<B>(cb.error_sub)?;
    w.write_u16::<B>(cb.sub_response)?;
    w.write_u16::<B>(cb.sub_error)?;
    w.write_all(&cb.sub_detail)?;
    w.write_u64::<B>(cb.compressed_len)?;
    w.write_u64::<B>(cb.decompressed_len)?;
    w.write_u64::<B>(cb.command_time)?;
    w.write_all(&cb.user_area)?;
    w.write_all(&[0; 24])?;
    Ok(())
}

fn parse_control_block<B: ByteOrder>(
    cb: &mut ControlBlock,
    r: &mut dyn std::io::Read,
) -> AdaResult<()> {
    cb.typ = r.read_u8()?;
    let _reserved = r.read_u8()?;
    r.read_exact(&mut cb.version)?;
    if cb.version != [CB_EYECATCHER, CB_VERSION] {
        return Err(AdaError::Corrupt("control block version mismatch"));
    }
    cb.block_len = r.read_u16::<B>()?;
    r.read_exact(&mut cb.command)?;
    let _reserved = r.read_u16::<B>()?;
    cb.response = r.read_u16::<B>()?;
    r.read_exact(&mut cb.command_id)?;
    cb.dbid = r.read_u32::<B>()?;
    cb.file_nr = r.read_u32::<B>()?;
    cb.isn = r.read_u64::<B>()?;
    cb.isn_lower_limit = r.read_u64::<B>()?;
    cb.isn_quantity = r.read_u64::<B>()?;
    r.read_exact(&mut cb.options)?;
    r.read_exact(&mut cb.additions1)?;
    r.read_exact(&mut cb.additions2)?;
    r.read_exact(&mut cb.additions3)?;
    r.read_exact(&mut cb.additions4)?;
    r.read_exact(&mut cb.additions5)?;
    r.read_exact(&mut cb.additions6)?;
    r.read_exact(&mut [0_u8; 4])?;
    cb.error_offset = r.read_u64::<B>()?;
    r.read_exact(&mut cb.error_char)?;
    cb.error_device = r.read_u16::<B>()?;
    let _reserved = r.read_u8()?;
    cb.error_buffer_id = r.read_u8()?;
    cb.error_sub = r.read_u16::<B>()?;
    cb.sub_response = r.read_u16::<B>()?;
    cb.sub_error = r.read_u16::<B>()?;
    r.read_exact(&mut cb.sub_detail)?;
    cb.compressed_len = r.read_u64::<B>()?;
    cb.decompressed_len = r.read_u64::<B>()?;
    cb.command_time = r.read_u64::<B>()?;
    r.read_exact(&mut cb.user_area)?;
    r.read_exact(&mut [0_u8; 24])?;
    Ok(())
}

fn emit_descriptor<B: ByteOrder>(buffer: &Buffer, w: &mut dyn std::io::Write) -> AdaResult<()> {
    w.write_u16::<B>(BUFFER_DESCRIPTOR_LEN)?;
    w.write_all(&[BD_EYECATCHER, BD_VERSION])?;
    w.write_u8(buffer.kind().id())?;
    w.write_u8(0)?;
    w.write_u8(BD_LOCATION_INLINE)?;
    w.write_all(&[0; 9])?;
    w.write_u64::<B>(buffer.size())?;
    w.write_u64::<B>(buffer.send_size())?;
    w.write_u64::<B>(buffer.recv_size())?;
    w.write_u64::<B>(0)?;
    Ok(())
}

fn parse_descriptor_fields<B: ByteOrder>(
    r: &mut dyn std::io::Read,
) -> AdaResult<(BufferKind, u64, u64, u64)> {
    let len = r.read_u16::<B>()?;
    if len != BUFFER_DESCRIPTOR_LEN {
        return Err(AdaError::Corrupt("buffer descriptor length mismatch"));
    }
    let mut version = [0_u8; 2];
    r.read_exact(&mut version)?;
    Buffer::validate_descriptor(version)?;
    let kind = BufferKind::from_id(r.read_u8()?);
    let _reserved = r.read_u8()?;
    let _location = r.read_u8()?;
    r.read_exact(&mut [0_u8; 9])?;
    let size = r.read_u64::<B>()?;
    let send = r.read_u64::<B>()?;
    let recv = r.read_u64::<B>()?;
    let _address = r.read_u64::<B>()?;
    Ok((kind, size, send, recv))
}

fn parse_descriptor_into<B: ByteOrder>(
    buffer: &mut Buffer,
    r: &mut dyn std::io::Read,
) -> AdaResult<()> {
    let (kind, _size, send, recv) = parse_descriptor_fields::<B>(r)?;
    if kind.id() != buffer.kind().id() {
        return Err(AdaError::Corrupt("buffer kind changed in reply"));
    }
    buffer.set_send_size(send);
    buffer.set_recv_size(recv);
    Ok(())
}

fn parse_descriptor_new<B: ByteOrder>(r: &mut dyn std::io::Read) -> AdaResult<Buffer> {
    let (kind, size, send, recv) = parse_descriptor_fields::<B>(r)?;
    let mut buffer = Buffer::with_capacity(kind, size as usize);
    buffer.set_send_size(send);
    buffer.set_recv_size(recv);
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::{Role, WireOrder, emit_call, parse_call};
    use crate::protocol::{Buffer, BufferKind, CommandCode, ControlBlock};

    fn sample_call() -> (ControlBlock, Vec<Buffer>) {
        let mut cb = ControlBlock::new(177);
        cb.prepare_command(CommandCode::L2);
        cb.file_nr = 11;
        cb.isn = 42;
        let buffers = vec![
            Buffer::from_text(BufferKind::Format, "AA,8,A."),
            Buffer::with_capacity(BufferKind::Record, 64),
        ];
        (cb, buffers)
    }

    #[test]
    fn client_to_server_round_trip() {
        let (cb, mut buffers) = sample_call();
        let mut frame = Vec::new();
        emit_call(&cb, &mut buffers, Role::Client, WireOrder::LittleEndian, &mut frame).unwrap();
        // control block + count + 2 descriptors + format payload
        assert_eq!(frame.len(), 192 + 4 + 2 * 48 + 7);

        let mut parsed_cb = ControlBlock::new(0);
        let mut parsed_buffers = Vec::new();
        parse_call(
            &mut parsed_cb,
            &mut parsed_buffers,
            Role::Server,
            WireOrder::LittleEndian,
            &mut frame.as_slice(),
        )
        .unwrap();
        assert_eq!(parsed_cb.command, *b"L2");
        assert_eq!(parsed_cb.dbid, 177);
        assert_eq!(parsed_cb.isn, 42);
        assert_eq!(parsed_buffers.len(), 2);
        assert_eq!(&parsed_buffers[0].raw_data()[..7], b"AA,8,A.");
        assert_eq!(parsed_buffers[1].recv_size(), 64);
    }

    #[test]
    fn server_to_client_round_trip() {
        let (mut cb, mut buffers) = sample_call();
        // pretend the server filled the record buffer
        cb.response = 0;
        cb.isn = 43;
        buffers[0].set_recv_size(0);
        buffers[1].provide(b"0123456789");

        let mut frame = Vec::new();
        emit_call(&cb, &mut buffers, Role::Server, WireOrder::BigEndian, &mut frame).unwrap();

        let (mut client_cb, mut client_buffers) = sample_call();
        parse_call(
            &mut client_cb,
            &mut client_buffers,
            Role::Client,
            WireOrder::BigEndian,
            &mut frame.as_slice(),
        )
        .unwrap();
        assert_eq!(client_cb.isn, 43);
        assert_eq!(client_buffers[1].received(), b"0123456789");
    }

    #[test]
    fn negative_response_skips_buffers() {
        let mut cb = ControlBlock::new(1);
        cb.prepare_command(CommandCode::L1);
        cb.response = 113;

        let mut frame = Vec::new();
        emit_call(&cb, &mut [], Role::Server, WireOrder::LittleEndian, &mut frame).unwrap();
        // cut the frame right after the control block: the client must not
        // look for a buffer section behind a negative response
        frame.truncate(192);

        let mut parsed = ControlBlock::new(0);
        let mut buffers = vec![Buffer::with_capacity(BufferKind::Record, 8)];
        parse_call(
            &mut parsed,
            &mut buffers,
            Role::Client,
            WireOrder::LittleEndian,
            &mut frame.as_slice(),
        )
        .unwrap();
        assert_eq!(parsed.response, 113);
    }

    #[test]
    fn implausible_receive_size_is_rejected() {
        let (mut cb, mut buffers) = sample_call();
        cb.response = 0;
        buffers[0].set_recv_size(0);
        buffers[1].set_recv_size(u64::MAX);
        let mut frame = Vec::new();
        emit_call(&cb, &mut buffers, Role::Server, WireOrder::LittleEndian, &mut frame).unwrap();

        let (mut client_cb, mut client_buffers) = sample_call();
        let e = parse_call(
            &mut client_cb,
            &mut client_buffers,
            Role::Client,
            WireOrder::LittleEndian,
            &mut frame.as_slice(),
        )
        .unwrap_err();
        assert!(matches!(e, crate::AdaError::Corrupt(_)));
    }

    #[test]
    fn corrupt_eyecatcher_is_detected() {
        let (cb, mut buffers) = sample_call();
        let mut frame = Vec::new();
        emit_call(&cb, &mut buffers, Role::Client, WireOrder::LittleEndian, &mut frame).unwrap();
        frame[2] = b'X';

        let mut parsed = ControlBlock::new(0);
        let mut parsed_buffers = Vec::new();
        let e = parse_call(
            &mut parsed,
            &mut parsed_buffers,
            Role::Server,
            WireOrder::LittleEndian,
            &mut frame.as_slice(),
        )
        .unwrap_err();
        assert!(matches!(e, crate::AdaError::Corrupt(_)));
    }
}
