//! `FlowMsg` — a typed view over an `Mbuf`'s header and payload.
//!
//! The header occupies the driver's fixed-size "private info" region
//! (`MBUF_HEAD_MAX_SIZE` bytes) laid out, from low to high offset:
//! `[0..64)` user-data scratch, byte `128` the end-of-sequence sentinel,
//! and the trailing `MSG_INFO_SIZE` bytes holding [`MsgInfo`].

use std::convert::TryInto;

use gehete_drv_core::types::{
    DataFlag, MBUF_HEAD_EOS_POS, MBUF_HEAD_MAX_SIZE, MBUF_USER_DATA_SIZE, END_OF_SEQUENCE_FLAG,
};
use gehete_drv_core::{self as core, Mbuf};

use crate::error::{Error, Result};

/// Fixed-size control block trailing every Mbuf's private-info region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MsgInfo {
    pub trans_id: u64,
    pub ret_code: i32,
    pub data_flag: u32,
    pub msg_type: u32,
    pub start_time: u64,
    pub end_time: u64,
    pub flags: u32,
}

pub const MSG_INFO_SIZE: usize = 8 + 4 + 4 + 4 + 8 + 8 + 4;
const MSG_INFO_OFFSET: usize = MBUF_HEAD_MAX_SIZE - MSG_INFO_SIZE;

impl MsgInfo {
    fn to_bytes(self) -> [u8; MSG_INFO_SIZE] {
        let mut buf = [0u8; MSG_INFO_SIZE];
        let mut off = 0;
        macro_rules! put {
            ($val:expr) => {{
                let bytes = $val.to_le_bytes();
                buf[off..off + bytes.len()].copy_from_slice(&bytes);
                off += bytes.len();
            }};
        }
        put!(self.trans_id);
        put!(self.ret_code);
        put!(self.data_flag);
        put!(self.msg_type);
        put!(self.start_time);
        put!(self.end_time);
        put!(self.flags);
        buf
    }

    fn from_bytes(buf: &[u8; MSG_INFO_SIZE]) -> MsgInfo {
        let mut off = 0;
        macro_rules! take {
            ($ty:ty) => {{
                let size = std::mem::size_of::<$ty>();
                let mut arr = [0u8; 8];
                arr[..size].copy_from_slice(&buf[off..off + size]);
                off += size;
                <$ty>::from_le_bytes(arr[..size].try_into().unwrap())
            }};
        }
        MsgInfo {
            trans_id: take!(u64),
            ret_code: take!(i32),
            data_flag: take!(u32),
            msg_type: take!(u32),
            start_time: take!(u64),
            end_time: take!(u64),
            flags: take!(u32),
        }
    }

    pub fn has_custom_trans_id(&self) -> bool {
        self.data_flag & DataFlag::CUSTOM_TRANS_ID.bits() != 0
    }

    pub fn has_null_data(&self) -> bool {
        self.data_flag & DataFlag::NULL_DATA.bits() != 0
    }
}

/// Reads the `MsgInfo` trailer out of a private-info region.
pub fn read_msg_info(priv_buf: &[u8]) -> Result<MsgInfo> {
    check_priv_len(priv_buf)?;
    let slice: &[u8; MSG_INFO_SIZE] = priv_buf[MSG_INFO_OFFSET..MSG_INFO_OFFSET + MSG_INFO_SIZE]
        .try_into().expect("MSG_INFO_OFFSET..+MSG_INFO_SIZE is exactly MSG_INFO_SIZE bytes");
    Ok(MsgInfo::from_bytes(slice))
}

/// Writes `info` into the `MsgInfo` trailer of a private-info region.
pub fn write_msg_info(priv_buf: &mut [u8], info: &MsgInfo) -> Result<()> {
    check_priv_len(priv_buf)?;
    priv_buf[MSG_INFO_OFFSET..MSG_INFO_OFFSET + MSG_INFO_SIZE].copy_from_slice(&info.to_bytes());
    Ok(())
}

/// `true` iff the header's end-of-sequence byte is set.
pub fn is_eos(priv_buf: &[u8]) -> Result<bool> {
    check_priv_len(priv_buf)?;
    Ok(priv_buf[MBUF_HEAD_EOS_POS] == END_OF_SEQUENCE_FLAG)
}

/// Sets or clears the end-of-sequence byte.
pub fn set_eos(priv_buf: &mut [u8], eos: bool) -> Result<()> {
    check_priv_len(priv_buf)?;
    priv_buf[MBUF_HEAD_EOS_POS] = if eos { END_OF_SEQUENCE_FLAG } else { 0 };
    Ok(())
}

/// Reads `len` bytes of user-data starting at `offset` (must fit in the
/// 64-byte scratch region).
pub fn read_user_data(priv_buf: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    check_priv_len(priv_buf)?;
    check_user_data_bounds(offset, len)?;
    Ok(&priv_buf[offset..offset + len])
}

/// Writes `data` into the user-data scratch region at `offset`.
pub fn write_user_data(priv_buf: &mut [u8], offset: usize, data: &[u8]) -> Result<()> {
    check_priv_len(priv_buf)?;
    check_user_data_bounds(offset, data.len())?;
    priv_buf[offset..offset + data.len()].copy_from_slice(data);
    Ok(())
}

fn check_priv_len(priv_buf: &[u8]) -> Result<()> {
    if priv_buf.len() < MBUF_HEAD_MAX_SIZE {
        return Err(Error::String(format!(
            "mbuf private-info region is {} bytes, need at least {}",
            priv_buf.len(), MBUF_HEAD_MAX_SIZE)));
    }
    Ok(())
}

fn check_user_data_bounds(offset: usize, len: usize) -> Result<()> {
    if offset + len > MBUF_USER_DATA_SIZE {
        return Err(Error::String(format!(
            "user data offset {} + len {} exceeds the {} byte scratch region",
            offset, len, MBUF_USER_DATA_SIZE)));
    }
    Ok(())
}

/// A polymorphic payload view over an Mbuf.
pub enum FlowMsg {
    /// A tensor payload with a parsed runtime descriptor.
    Tensor { mbuf: Mbuf, desc_len: usize },
    /// An opaque byte payload with no tensor interpretation.
    Raw { mbuf: Mbuf },
    /// A control pulse carrying no payload (EOS or null-data).
    Empty { mbuf: Mbuf },
}

impl FlowMsg {
    pub fn mbuf(&self) -> Mbuf {
        match *self {
            FlowMsg::Tensor { mbuf, .. } | FlowMsg::Raw { mbuf } | FlowMsg::Empty { mbuf } => mbuf,
        }
    }

    /// Allocates a new Mbuf sized for `desc_len` bytes of tensor descriptor
    /// plus `payload_len` bytes of tensor data, and returns a `Tensor` view
    /// over it with a zeroed header.
    pub fn alloc_tensor(desc_len: usize, payload_len: usize) -> Result<FlowMsg> {
        let mbuf = core::mbuf_alloc(desc_len + payload_len)?;
        let priv_buf = core::mbuf_priv_info(mbuf)?;
        set_eos(priv_buf, false)?;
        write_msg_info(priv_buf, &MsgInfo::default())?;
        Ok(FlowMsg::Tensor { mbuf, desc_len })
    }

    /// Sets the transaction id in the header, toggling the
    /// `CUSTOM_TRANS_ID` flag bit to match whether it's nonzero.
    pub fn set_transaction_id(&self, trans_id: u64) -> Result<()> {
        let priv_buf = core::mbuf_priv_info(self.mbuf())?;
        let mut info = read_msg_info(priv_buf)?;
        info.trans_id = trans_id;
        if trans_id != 0 {
            info.data_flag |= DataFlag::CUSTOM_TRANS_ID.bits();
        } else {
            info.data_flag &= !DataFlag::CUSTOM_TRANS_ID.bits();
        }
        write_msg_info(priv_buf, &info)
    }

    /// Marks this message as a null-data control pulse.
    pub fn set_null_data(&self) -> Result<()> {
        let priv_buf = core::mbuf_priv_info(self.mbuf())?;
        let mut info = read_msg_info(priv_buf)?;
        info.data_flag |= DataFlag::NULL_DATA.bits();
        write_msg_info(priv_buf, &info)
    }

    pub fn msg_info(&self) -> Result<MsgInfo> {
        read_msg_info(core::mbuf_priv_info(self.mbuf())?)
    }

    pub fn is_eos(&self) -> Result<bool> {
        is_eos(core::mbuf_priv_info(self.mbuf())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_priv_buf() -> [u8; MBUF_HEAD_MAX_SIZE] {
        [0u8; MBUF_HEAD_MAX_SIZE]
    }

    #[test]
    fn msg_info_round_trips() {
        let mut buf = sample_priv_buf();
        let info = MsgInfo {
            trans_id: 42,
            ret_code: -3,
            data_flag: DataFlag::CUSTOM_TRANS_ID.bits(),
            msg_type: 1,
            start_time: 100,
            end_time: 200,
            flags: 7,
        };
        write_msg_info(&mut buf, &info).unwrap();
        assert_eq!(read_msg_info(&buf).unwrap(), info);
    }

    #[test]
    fn eos_byte_round_trips() {
        let mut buf = sample_priv_buf();
        assert!(!is_eos(&buf).unwrap());
        set_eos(&mut buf, true).unwrap();
        assert!(is_eos(&buf).unwrap());
        set_eos(&mut buf, false).unwrap();
        assert!(!is_eos(&buf).unwrap());
    }

    #[test]
    fn user_data_round_trips_at_any_valid_offset() {
        let mut buf = sample_priv_buf();
        write_user_data(&mut buf, 10, b"hello").unwrap();
        assert_eq!(read_user_data(&buf, 10, 5).unwrap(), b"hello");
    }

    #[test]
    fn user_data_out_of_bounds_is_param_invalid() {
        let mut buf = sample_priv_buf();
        assert!(write_user_data(&mut buf, 60, b"too long").is_err());
    }

    #[test]
    fn custom_trans_id_flag_tracks_bits() {
        let info = MsgInfo { data_flag: DataFlag::CUSTOM_TRANS_ID.bits(), ..Default::default() };
        assert!(info.has_custom_trans_id());
        assert!(!info.has_null_data());
    }
}
