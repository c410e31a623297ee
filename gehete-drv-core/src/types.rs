//! Vocabulary types shared by every `gehete-drv-core` wrapper function:
//! status codes, queue/device enums, and the Mbuf header bitflags.

use enum_primitive::enum_from_primitive;

enum_from_primitive! {
    /// Outcome of a single driver call, restated from the taxonomy in the
    /// error-handling design: most variants map 1:1 onto an `rtError_t`
    /// returned by `gehete-drv-sys`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Status {
        Success = 0,
        QueueFull = 107_020,
        QueueEmpty = 107_021,
        Timeout = 107_022,
        FeatureNotSupport = 107_023,
        Failed = 1,
    }
}

impl Status {
    pub fn from_rt_error(code: i32) -> Status {
        match code {
            0 => Status::Success,
            107_020 => Status::QueueFull,
            107_021 => Status::QueueEmpty,
            107_022 => Status::Timeout,
            107_023 => Status::FeatureNotSupport,
            _ => Status::Failed,
        }
    }

    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueWorkMode {
    Pull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Npu,
    Cpu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueDeployMode {
    Local,
    Client,
}

bitflags::bitflags! {
    /// `MsgInfo.data_flag` bits (see §3/§4.C of the spec).
    pub struct DataFlag: u32 {
        const CUSTOM_TRANS_ID = 0b0000_0001;
        const NULL_DATA       = 0b0000_0010;
    }
}

pub const MBUF_HEAD_MAX_SIZE: usize = 256;
pub const MBUF_HEAD_EOS_POS: usize = 128;
pub const MBUF_USER_DATA_SIZE: usize = 64;
pub const END_OF_SEQUENCE_FLAG: u8 = 0x5A;

pub const QUEUE_OP_TIMEOUT_MS: i32 = 10 * 60 * 1000;
pub const ENQUEUE_WAIT_SLICE_MS: u32 = 100;
pub const DEQUEUE_WAIT_SLICE_MS: u32 = 1_000;
pub const EVENT_GROUP_ID_MBUF: u32 = 3;
pub const EVENT_GROUP_ID_AICPU: u32 = 10;
pub const COPY_THREAD_POOL_SIZE: usize = 8;
pub const MULTI_THREAD_COPY_UNIT: usize = 20 * 1024 * 1024;
pub const MULTI_THREAD_COPY_ALIGN: usize = 2 * 1024 * 1024;
pub const MAX_QUEUE_NAME_LEN: usize = 127;
